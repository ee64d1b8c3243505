use std::path::PathBuf;

use crate::booking::OverlapPolicy;

/// Process settings, read once from `STAYCHAIN_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub overlap_policy: OverlapPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8000,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            overlap_policy: OverlapPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable numbers fall back to defaults;
    /// an unknown overlap policy is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let defaults = Self::default();
        let overlap_policy = match lookup("STAYCHAIN_OVERLAP_POLICY") {
            Some(raw) => raw.parse::<OverlapPolicy>()?,
            None => defaults.overlap_policy,
        };
        Ok(Self {
            bind: lookup("STAYCHAIN_BIND").unwrap_or(defaults.bind),
            port: lookup("STAYCHAIN_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            data_dir: lookup("STAYCHAIN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_connections: lookup("STAYCHAIN_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_connections),
            compact_threshold: lookup("STAYCHAIN_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            metrics_port: lookup("STAYCHAIN_METRICS_PORT").and_then(|s| s.parse().ok()),
            overlap_policy,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
