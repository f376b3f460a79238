use crate::error::ClientError;
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, warn};

const LOOPBACK: &str = "lo";
const ZERO_MAC: &str = "00:00:00:00:00:00";

/// First non-empty hardware address under `net_class_dir`, in interface name
/// order, skipping loopback.
pub async fn first_mac_address(net_class_dir: &Path) -> Option<String> {
    let mut entries = match tokio::fs::read_dir(net_class_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %net_class_dir.display(), error = %e, "no interface directory");
            return None;
        }
    };

    let mut interfaces = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if name != LOOPBACK {
            interfaces.push(name);
        }
    }
    interfaces.sort();

    for name in interfaces {
        let path = net_class_dir.join(&name).join("address");
        let Ok(address) = tokio::fs::read_to_string(&path).await else {
            continue;
        };
        let address = address.trim();
        if !address.is_empty() && address != ZERO_MAC {
            return Some(address.to_string());
        }
    }

    None
}

/// Parses the plain-text body of an IP echo endpoint.
pub fn parse_ip(body: &str) -> Option<IpAddr> {
    let cleaned: String = body
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\\')
        .collect();
    cleaned.parse().ok()
}

/// Asks each endpoint in turn and returns the first parseable address.
pub async fn discover_public_ip(
    http: &reqwest::Client,
    endpoints: &[String],
) -> Result<IpAddr, ClientError> {
    for endpoint in endpoints {
        let body = match fetch_text(http, endpoint).await {
            Ok(body) => body,
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "failed to obtain public ip address");
                continue;
            }
        };

        match parse_ip(&body) {
            Some(ip) => {
                debug!(endpoint = %endpoint, ip = %ip, "discovered public ip address");
                return Ok(ip);
            }
            None => warn!(endpoint = %endpoint, "endpoint returned an unparseable ip address"),
        }
    }

    Err(ClientError::NoPublicIp)
}

async fn fetch_text(http: &reqwest::Client, endpoint: &str) -> Result<String, ClientError> {
    let response = http.get(endpoint).send().await?.error_for_status()?;
    Ok(response.text().await?)
}
