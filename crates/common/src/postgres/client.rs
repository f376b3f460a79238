use crate::postgres::PostgresConfig;
use anyhow::{anyhow, Result};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::{CancelToken, NoTls, Row};
use tracing::{debug, warn};

/// PostgreSQL client wrapper with connection pooling
#[derive(Clone)]
pub struct PostgresClient {
    pool: Pool,
}

impl PostgresClient {
    /// Creates a new PostgreSQL client with connection pooling
    ///
    /// # Arguments
    /// * `host` - Database host (e.g., "localhost")
    /// * `port` - Database port (e.g., 5432)
    /// * `database` - Database name
    /// * `username` - Database username
    /// * `password` - Database password
    /// * `max_pool_size` - Maximum number of connections in the pool
    pub fn new(
        host: &str,
        port: u16,
        database: &str,
        username: &str,
        password: &str,
        max_pool_size: usize,
    ) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(host.to_string());
        cfg.port = Some(port);
        cfg.dbname = Some(database.to_string());
        cfg.user = Some(username.to_string());
        cfg.password = Some(password.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        pool.resize(max_pool_size);

        Ok(Self { pool })
    }

    pub fn from_config(config: &PostgresConfig) -> Result<Self> {
        Self::new(
            &config.host,
            config.port,
            &config.database,
            &config.username,
            &config.password,
            config.max_pool_size,
        )
    }

    /// Pings the database to verify connectivity
    pub async fn ping(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.execute("SELECT 1", &[]).await?;
        debug!("postgreSQL connection successful");
        Ok(())
    }

    /// Gets a connection from the pool
    pub async fn get_connection(&self) -> Result<deadpool_postgres::Client> {
        Ok(self.pool.get().await?)
    }
}

/// Pooled connection running a statement that is cancelled on the server
/// if it does not finish.
///
/// An unfinished connection never goes back to the pool, so a late cancel
/// request cannot land on another caller's statement.
pub(crate) struct CancelOnDrop {
    conn: Option<deadpool_postgres::Client>,
    token: CancelToken,
}

impl CancelOnDrop {
    pub fn new(conn: deadpool_postgres::Client) -> Self {
        let token = conn.cancel_token();
        Self {
            conn: Some(conn),
            token,
        }
    }

    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| anyhow!("connection already released"))?;
        Ok(conn.query(sql, params).await?)
    }

    /// Returns the connection to the pool.
    pub fn release(mut self) {
        self.conn.take();
    }

    /// Detaches the connection and waits for the server to accept the cancel.
    pub async fn cancel(mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let detached = deadpool_postgres::Object::take(conn);
        send_cancel(&self.token).await;
        drop(detached);
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let detached = deadpool_postgres::Object::take(conn);

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let token = self.token.clone();
                runtime.spawn(async move {
                    send_cancel(&token).await;
                    drop(detached);
                });
            }
            Err(_) => warn!("no runtime available to cancel in-flight query"),
        }
    }
}

async fn send_cancel(token: &CancelToken) {
    match token.cancel_query(NoTls).await {
        Ok(()) => debug!("in-flight query cancelled"),
        Err(e) => warn!(error = %e, "failed to cancel in-flight query"),
    }
}
