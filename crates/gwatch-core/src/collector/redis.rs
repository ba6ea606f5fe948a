//! Redis client counting via a deadpool-redis pool

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use parking_lot::RwLock;
use tracing::debug;

use super::RedisCollector;
use crate::config::RedisMonitorConfig;
use crate::error::{Error, Result};

/// Commands issued by monitoring connections, excluded from the client count
const PROBE_COMMANDS: [&str; 4] = ["cmd=client|list", "cmd=info", "cmd=ping", "cmd=NULL"];

/// [`RedisCollector`] backed by a lazily created connection pool
pub struct PoolRedisCollector {
    config: RedisMonitorConfig,
    pool: RwLock<Option<Pool>>,
}

impl PoolRedisCollector {
    /// Create a collector; nothing connects until [`init`](RedisCollector::init)
    pub fn new(config: RedisMonitorConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    fn url(&self) -> String {
        let auth = if self.config.password.is_empty() {
            String::new()
        } else {
            format!(":{}@", urlencoding::encode(&self.config.password))
        };
        format!("redis://{auth}{}/{}", self.config.addr, self.config.db)
    }

    async fn connection(&self, pool: &Pool) -> Result<Connection> {
        tokio::time::timeout(self.config.timeout, pool.get())
            .await
            .map_err(|_| Error::collector(format!("Redis {} connect timed out", self.config.addr)))?
            .map_err(|e| Error::collector(format!("Redis {}: {e}", self.config.addr)))
    }

    async fn query<T: redis::FromRedisValue>(&self, conn: &mut Connection, cmd: &redis::Cmd) -> Result<T> {
        let value = tokio::time::timeout(self.config.timeout, cmd.query_async(conn))
            .await
            .map_err(|_| Error::collector("Redis command timed out"))??;
        Ok(value)
    }
}

#[async_trait]
impl RedisCollector for PoolRedisCollector {
    async fn init(&self) -> Result<()> {
        let pool = PoolConfig::from_url(self.url())
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::collector(format!("Redis pool: {e}")))?;

        let mut conn = self.connection(&pool).await?;
        let pong: String = self.query(&mut conn, &redis::cmd("PING")).await?;
        debug!(addr = %self.config.addr, reply = %pong, "Redis reachable");

        *self.pool.write() = Some(pool);
        Ok(())
    }

    async fn client_count(&self) -> Result<i64> {
        let pool = self
            .pool
            .read()
            .clone()
            .ok_or_else(|| Error::collector("Redis pool not initialised"))?;
        let mut conn = self.connection(&pool).await?;

        let mut info_cmd = redis::cmd("INFO");
        info_cmd.arg("clients");
        let info: String = self.query(&mut conn, &info_cmd).await?;
        let total = parse_connected_clients(&info)?;

        let mut list_cmd = redis::cmd("CLIENT");
        list_cmd.arg("LIST");
        // The raw count is still useful when CLIENT LIST is not permitted.
        let probes = match self.query::<String>(&mut conn, &list_cmd).await {
            Ok(list) => count_probe_connections(&list),
            Err(e) => {
                debug!(error = %e, "CLIENT LIST failed, using raw count");
                0
            }
        };

        Ok((total - probes).max(0))
    }
}

fn parse_connected_clients(info: &str) -> Result<i64> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("connected_clients:"))
        .ok_or_else(|| Error::collector("connected_clients missing from INFO clients"))?
        .trim()
        .parse::<i64>()
        .map_err(|e| Error::collector(format!("invalid connected_clients: {e}")))
}

fn count_probe_connections(list: &str) -> i64 {
    let count = list
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| PROBE_COMMANDS.iter().any(|cmd| line.contains(cmd)))
        .count();
    i64::try_from(count).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_connected_clients() {
        let info = "# Clients\r\nconnected_clients:12\r\nblocked_clients:0\r\n";
        assert_eq!(parse_connected_clients(info).unwrap(), 12);
        assert!(parse_connected_clients("# Clients\r\n").is_err());
    }

    #[test]
    fn test_count_probe_connections() {
        let list = "\
id=3 addr=10.0.0.1:5000 age=100 idle=0 flags=N db=0 cmd=get
id=4 addr=10.0.0.2:5001 age=1 idle=0 flags=N db=0 cmd=client|list
id=5 addr=10.0.0.2:5002 age=1 idle=0 flags=N db=0 cmd=ping
";
        assert_eq!(count_probe_connections(list), 2);
    }

    #[test]
    fn test_url_includes_password_and_db() {
        let collector = PoolRedisCollector::new(RedisMonitorConfig {
            addr: "10.0.0.5:6379".to_string(),
            password: "p@ss".to_string(),
            db: 2,
            ..Default::default()
        });
        assert_eq!(collector.url(), "redis://:p%40ss@10.0.0.5:6379/2");
    }

    #[tokio::test]
    async fn test_init_fails_when_unreachable() {
        let collector = PoolRedisCollector::new(RedisMonitorConfig {
            addr: "127.0.0.1:1".to_string(),
            timeout: Duration::from_millis(500),
            ..Default::default()
        });
        assert!(collector.init().await.is_err());
        assert!(collector.client_count().await.is_err());
    }
}
