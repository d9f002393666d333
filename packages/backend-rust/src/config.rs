use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use chrono::{FixedOffset, Offset, Utc};

use crate::logging::LoggingConfig;
use crate::memory::review::DEFAULT_MAX_BATCH_SIZE;
use crate::memory::stats::DEFAULT_WINDOW_DAYS;

const DEFAULT_DATABASE_URL: &str = "sqlite:./data/memory.db?mode=rwc";
const DEFAULT_DUE_LIMIT_MAX: usize = 200;
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub logging: LoggingConfig,
    pub database_url: String,
    pub memory: MemoryConfig,
}

/// Settings the memory core reads.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub stats_window_days: u32,
    pub utc_offset_minutes: i32,
    pub max_batch_size: usize,
    pub due_limit_max: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            stats_window_days: DEFAULT_WINDOW_DAYS,
            utc_offset_minutes: 0,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            due_limit_max: DEFAULT_DUE_LIMIT_MAX,
        }
    }
}

impl MemoryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let utc_offset_minutes = env_parse::<i32>("MEMORY_UTC_OFFSET_MINUTES")
            .filter(|m| m.abs() <= MAX_UTC_OFFSET_MINUTES)
            .unwrap_or(defaults.utc_offset_minutes);

        Self {
            stats_window_days: env_parse::<u32>("MEMORY_STATS_WINDOW_DAYS")
                .filter(|d| *d > 0)
                .unwrap_or(defaults.stats_window_days),
            utc_offset_minutes,
            max_batch_size: env_parse::<usize>("MEMORY_MAX_BATCH_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_batch_size),
            due_limit_max: env_parse::<usize>("MEMORY_DUE_LIMIT_MAX")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.due_limit_max),
        }
    }

    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

impl Config {
    pub fn from_env() -> Self {
        let port = env_parse::<u16>("PORT").unwrap_or(3000);

        let host = env_parse::<IpAddr>("HOST").unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        Self {
            host,
            port,
            logging: LoggingConfig::from_env(),
            database_url,
            memory: MemoryConfig::from_env(),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_offset_from_minutes() {
        let config = MemoryConfig {
            utc_offset_minutes: 480,
            ..MemoryConfig::default()
        };
        assert_eq!(config.local_offset().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn defaults_match_core_constants() {
        let config = MemoryConfig::default();
        assert_eq!(config.stats_window_days, 30);
        assert_eq!(config.max_batch_size, 500);
        assert_eq!(config.local_offset().local_minus_utc(), 0);
    }
}
