//! Ledger stored as a single string value in redis.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};

use super::{StatusBackend, StatusLedger};
use crate::errors::StatusError;

/// Upper bound for establishing the connection, retries included.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for a single GET or SET.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

const CONNECT_RETRIES: usize = 2;

async fn bounded<T, E>(
    limit: Duration,
    what: &str,
    future: impl Future<Output = Result<T, E>>,
) -> Result<T, StatusError>
where
    StatusError: From<E>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result.map_err(StatusError::from),
        Err(_) => Err(StatusError::Backend {
            backend: "redis".to_string(),
            message: format!("{what} timed out after {}s", limit.as_secs()),
        }),
    }
}

pub struct RedisBackend {
    conn: ConnectionManager,
    key: String,
}

impl RedisBackend {
    pub async fn connect(url: &str, key: &str) -> Result<Self, StatusError> {
        let client = redis::Client::open(url)?;
        let config = ConnectionManagerConfig::new().set_number_of_retries(CONNECT_RETRIES);
        let conn = bounded(
            CONNECT_TIMEOUT,
            "connecting",
            ConnectionManager::new_with_config(client, config),
        )
        .await?;
        Ok(Self::new(conn, key))
    }

    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Self {
        Self { conn, key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl StatusBackend for RedisBackend {
    fn name(&self) -> &str {
        "redis"
    }

    async fn persist(&self, document: &str) -> Result<(), StatusError> {
        let mut conn = self.conn.clone();
        let mut set = redis::cmd("SET");
        set.arg(&self.key).arg(document);
        let () = bounded(COMMAND_TIMEOUT, "SET", set.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn load(&self) -> Result<StatusLedger, StatusError> {
        let mut conn = self.conn.clone();
        let mut get = redis::cmd("GET");
        get.arg(&self.key);
        let document: Option<String> =
            bounded(COMMAND_TIMEOUT, "GET", get.query_async(&mut conn)).await?;

        match document {
            Some(text) => StatusLedger::from_json(&text),
            None => Ok(StatusLedger::new()),
        }
    }
}
