use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;

/// Something that can open a database handle and check that it is alive.
#[async_trait]
pub trait Connector: Send + Sync {
    type Handle: Send + Sync;

    async fn open(&self) -> anyhow::Result<Self::Handle>;
    async fn ping(&self, handle: &Self::Handle) -> anyhow::Result<()>;
    async fn close(&self, handle: Self::Handle);
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Zero is treated as a single attempt.
    pub max_retries: u32,
    pub retry_interval: Duration,
    pub connect_timeout: Duration,
}

impl RetryPolicy {
    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

impl From<&DatabaseConfig> for RetryPolicy {
    fn from(cfg: &DatabaseConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            retry_interval: cfg.retry_interval,
            connect_timeout: cfg.connect_timeout,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("connect deadline of {timeout:?} expired after {attempts} attempt(s)")]
    Cancelled { attempts: u32, timeout: Duration },

    #[error("could not establish database connection after {attempts} attempt(s)")]
    Exhausted {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

/// Opens a handle through `connector`, retrying until it answers a ping, the
/// policy runs out of attempts, or `deadline` passes.
pub async fn connect_with_retries<C: Connector>(
    connector: &C,
    policy: &RetryPolicy,
    deadline: Instant,
) -> Result<C::Handle, ConnectError> {
    let max_attempts = policy.attempts();
    let cancelled = |attempts| ConnectError::Cancelled {
        attempts,
        timeout: policy.connect_timeout,
    };
    let mut last_err = anyhow::anyhow!("no connection attempt was made");

    for attempt in 1..=max_attempts {
        if Instant::now() >= deadline {
            return Err(cancelled(attempt - 1));
        }
        debug!(attempt, max_attempts, "connecting to database");

        match try_once(connector, policy, deadline).await {
            Ok(handle) => {
                info!(attempt, "database connection established");
                return Ok(handle);
            }
            Err(e) => {
                warn!(attempt, max_attempts, error = %e, "database connection attempt failed");
                last_err = e;
            }
        }

        if Instant::now() >= deadline {
            return Err(cancelled(attempt));
        }
        if attempt == max_attempts {
            break;
        }
        let wake = Instant::now() + policy.retry_interval;
        if wake >= deadline {
            sleep_until(deadline).await;
            return Err(cancelled(attempt));
        }
        sleep_until(wake).await;
    }

    Err(ConnectError::Exhausted {
        attempts: max_attempts,
        source: last_err,
    })
}

async fn try_once<C: Connector>(
    connector: &C,
    policy: &RetryPolicy,
    deadline: Instant,
) -> anyhow::Result<C::Handle> {
    let handle = timeout_at(deadline, connector.open())
        .await
        .context("open timed out")??;

    // a single ping may not outlive the retry interval
    let ping_deadline = deadline.min(Instant::now() + policy.retry_interval);
    let pinged = match timeout_at(ping_deadline, connector.ping(&handle)).await {
        Ok(res) => res,
        Err(_) => Err(anyhow::anyhow!("ping timed out")),
    };

    match pinged {
        Ok(()) => Ok(handle),
        Err(e) => {
            connector.close(handle).await;
            Err(e)
        }
    }
}

/// Postgres pool connector.
pub struct PgConnector {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl PgConnector {
    pub fn new(cfg: &DatabaseConfig) -> Self {
        Self {
            url: cfg.url.clone(),
            max_connections: cfg.max_connections,
            acquire_timeout: cfg.retry_interval,
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Handle = PgPool;

    async fn open(&self) -> anyhow::Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_lazy(&self.url)
            .context("invalid database url")?;
        Ok(pool)
    }

    async fn ping(&self, pool: &PgPool) -> anyhow::Result<()> {
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .context("ping database")?;
        Ok(())
    }

    async fn close(&self, pool: PgPool) {
        debug!("closing dangling database pool");
        pool.close().await;
    }
}
