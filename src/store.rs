//! Redis store handle and the atomic script executor.
//!
//! All admission state lives in the store; this module owns the connection
//! handling and the run-by-hash protocol: try `EVALSHA` first, and when the
//! store does not know the script, upload the source, verify the hash it
//! reports against the one computed at startup, then run by hash again.
//! The per-handle memo of confirmed hashes is an optimization only; every
//! call is prepared to reload on a miss, so a flushed script cache heals
//! itself transparently.

use crate::error::{RateGateError, RateGateResult};
use crate::scripts::AtomicScript;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

pub struct RedisStore {
    client: Client,
    connection_timeout: Duration,
    confirmed: RwLock<HashSet<String>>,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> RateGateResult<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            RateGateError::Transport(format!("failed to create redis client: {}", e))
        })?;

        info!("redis store handle created for {}", redis_url);

        Ok(Self {
            client,
            connection_timeout: Duration::from_secs(5),
            confirmed: RwLock::new(HashSet::new()),
        })
    }

    async fn connection(&self) -> RateGateResult<MultiplexedConnection> {
        timeout(
            self.connection_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| RateGateError::Transport("connection timeout".to_string()))?
        .map_err(|e| RateGateError::Transport(format!("failed to get connection: {}", e)))
    }

    pub async fn ping(&self) -> RateGateResult<()> {
        let mut conn = self.connection().await?;
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(RateGateError::from)?;

        if response == "PONG" {
            debug!("redis ping successful");
            Ok(())
        } else {
            Err(RateGateError::Transport(
                "unexpected ping response".to_string(),
            ))
        }
    }

    /// Run a catalogue script against `keys`/`args` as one atomic step.
    pub async fn run_script(
        &self,
        script: &AtomicScript,
        keys: &[String],
        args: &[String],
    ) -> RateGateResult<redis::Value> {
        let mut conn = self.connection().await?;

        match self.eval_by_hash(&mut conn, script, keys, args).await {
            Ok(value) => Ok(value),
            Err(err) if err.kind() == redis::ErrorKind::NoScriptError => {
                warn!(
                    script = script.name(),
                    "script missing from the store cache, reloading"
                );
                self.load_and_verify(&mut conn, script).await?;
                self.eval_by_hash(&mut conn, script, keys, args)
                    .await
                    .map_err(RateGateError::from)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn eval_by_hash(
        &self,
        conn: &mut MultiplexedConnection,
        script: &AtomicScript,
        keys: &[String],
        args: &[String],
    ) -> redis::RedisResult<redis::Value> {
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(script.hash()).arg(keys.len());
        for key in keys {
            cmd.arg(key);
        }
        for arg in args {
            cmd.arg(arg);
        }
        cmd.query_async(conn).await
    }

    async fn load_and_verify(
        &self,
        conn: &mut MultiplexedConnection,
        script: &AtomicScript,
    ) -> RateGateResult<()> {
        let loaded: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(script.source())
            .query_async(conn)
            .await
            .map_err(RateGateError::from)?;

        if !loaded.eq_ignore_ascii_case(script.hash()) {
            error!(
                script = script.name(),
                expected = script.hash(),
                actual = %loaded,
                "script source drift detected"
            );
            return Err(RateGateError::ScriptDrift {
                script: script.name(),
                expected: script.hash().to_string(),
                actual: loaded,
            });
        }

        self.confirmed.write().await.insert(loaded);
        debug!(script = script.name(), "script loaded and verified");
        Ok(())
    }

    /// Whether a script has been confirmed present in the store cache by
    /// this handle. Purely observational.
    pub async fn is_confirmed(&self, script: &AtomicScript) -> bool {
        self.confirmed.read().await.contains(script.hash())
    }

    /// Upload every catalogue script. Optional: the executor reloads on
    /// miss anyway, but a warm cache removes the first-call hiccup.
    pub async fn preload(&self, scripts: &[&'static AtomicScript]) -> RateGateResult<usize> {
        let mut conn = self.connection().await?;
        for script in scripts {
            self.load_and_verify(&mut conn, script).await?;
        }
        Ok(scripts.len())
    }

    /// Remove one member from a sorted set. Used for gate lease release;
    /// a missing member is not an error.
    pub async fn remove_member(&self, key: &str, member: &str) -> RateGateResult<u64> {
        let mut conn = self.connection().await?;
        let removed: u64 = conn
            .zrem(key, member)
            .await
            .map_err(RateGateError::from)?;
        debug!(key, member, removed, "removed sorted-set member");
        Ok(removed)
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection_timeout", &self.connection_timeout)
            .finish_non_exhaustive()
    }
}
