use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// 服务器的运行参数，从环境变量读取
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub tick: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: SocketAddr::from(([0, 0, 0, 0], 25917)),
            tick: Duration::from_millis(1000),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        let addr = read_env("DUEL_ARENA_ADDR").unwrap_or(default.addr);
        let tick = read_env::<u64>("DUEL_ARENA_TICK_MS")
            .map(|ms| Duration::from_millis(ms.max(1)))
            .unwrap_or(default.tick);
        ServerConfig { addr, tick }
    }
}

/// 变量不存在时返回 None，格式错误时记录警告并返回 None
fn read_env<T: FromStr>(key: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("环境变量 {}={} 无法解析: {}，使用默认值", key, raw, e);
            None
        }
    }
}
