//! Redis-backed queue store.

use super::QueueStore;
use crate::error::{CrewError, Result};
use redis::{Client, Connection, RedisError};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A single synchronous Redis connection shared behind a mutex.
///
/// A blocked `BLPOP` holds the connection, so a worker and a dispatcher should
/// each open their own store.
pub struct RedisQueueStore {
    url: String,
    conn: Mutex<Connection>,
}

impl RedisQueueStore {
    /// Connect to the store at `url` (e.g. `redis://127.0.0.1:6379`).
    pub fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| {
            CrewError::ConfigError(format!("invalid queue url '{}': {}", url, e))
        })?;
        let conn = client
            .get_connection_with_timeout(CONNECT_TIMEOUT)
            .map_err(|e| {
                CrewError::Connectivity(format!(
                    "cannot reach queue store at {}: {}\n\n\
                     Is the queue container running? Try `crew up` or set CREW_QUEUE_URL.",
                    url, e
                ))
            })?;
        debug!(url, "connected to queue store");

        Ok(Self {
            url: url.to_string(),
            conn: Mutex::new(conn),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CrewError::QueueError("queue connection lock poisoned".to_string()))
    }

    fn map_err(&self, op: &str, key: &str, err: RedisError) -> CrewError {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            CrewError::Connectivity(format!("{} {} on {}: {}", op, key, self.url, err))
        } else {
            CrewError::QueueError(format!("{} {}: {}", op, key, err))
        }
    }
}

impl QueueStore for RedisQueueStore {
    fn ping(&self) -> Result<()> {
        let mut conn = self.conn()?;
        redis::cmd("PING")
            .query::<String>(&mut *conn)
            .map(|_| ())
            .map_err(|e| self.map_err("PING", "", e))
    }

    fn push(&self, key: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn()?;
        redis::cmd("RPUSH")
            .arg(key)
            .arg(payload)
            .query::<i64>(&mut *conn)
            .map(|_| ())
            .map_err(|e| self.map_err("RPUSH", key, e))
    }

    fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let mut conn = self.conn()?;

        // BLPOP treats 0 as "wait forever".
        if timeout.is_zero() {
            return redis::cmd("LPOP")
                .arg(key)
                .query::<Option<String>>(&mut *conn)
                .map_err(|e| self.map_err("LPOP", key, e));
        }

        redis::cmd("BLPOP")
            .arg(key)
            .arg(timeout.as_secs_f64())
            .query::<Option<(String, String)>>(&mut *conn)
            .map(|popped| popped.map(|(_, payload)| payload))
            .map_err(|e| self.map_err("BLPOP", key, e))
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn()?;
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .query::<i64>(&mut *conn)
            .map(|_| ())
            .map_err(|e| self.map_err("EXPIRE", key, e))
    }

    fn depth(&self, key: &str) -> Result<usize> {
        let mut conn = self.conn()?;
        redis::cmd("LLEN")
            .arg(key)
            .query::<usize>(&mut *conn)
            .map_err(|e| self.map_err("LLEN", key, e))
    }

    fn peek(&self, key: &str, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        let stop = i64::try_from(count).unwrap_or(i64::MAX) - 1;
        redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(stop)
            .query::<Vec<String>>(&mut *conn)
            .map_err(|e| self.map_err("LRANGE", key, e))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        redis::cmd("DEL")
            .arg(key)
            .query::<i64>(&mut *conn)
            .map(|removed| removed > 0)
            .map_err(|e| self.map_err("DEL", key, e))
    }
}
