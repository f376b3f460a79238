use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("no public ip address could be discovered")]
    NoPublicIp,

    #[error("collector responded with status {0}")]
    UnexpectedStatus(u16),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}
