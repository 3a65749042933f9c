use std::env;

use crate::stream::LogConfig;

pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:5000";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_address: String,
    pub log: LogConfig,
}

impl Config {
    /// Only the bind address comes from the environment; log settings keep
    /// their defaults (`./logs`, 7 archives, `info` on both streams).
    pub fn from_env() -> Self {
        Config {
            server_address: env::var("SERVER_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_SERVER_ADDRESS.to_string()),
            log: LogConfig::default(),
        }
    }
}
