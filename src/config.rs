// TOML file plus environment overrides, loaded once at startup via the
// `config` crate.
use serde::{Deserialize, Serialize};

use crate::errors::TangramError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // No automatic retry; a failed fetch surfaces to the caller, who
        // can opt into retrying per source.
        RetryPolicy {
            max_attempts: 0,
            backoff_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TangramConfig {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_cache_capacity")]
    pub default_cache_capacity_bytes: u64,
    #[serde(default)]
    pub network_retry: RetryPolicy,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_miter_limit")]
    pub default_miter_limit: f32,
}

fn default_worker_threads() -> usize {
    num_cpus::get().min(4)
}

fn default_cache_capacity() -> u64 {
    32 * 1024 * 1024
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_miter_limit() -> f32 {
    3.0
}

impl Default for TangramConfig {
    fn default() -> Self {
        TangramConfig {
            worker_threads: default_worker_threads(),
            default_cache_capacity_bytes: default_cache_capacity(),
            network_retry: RetryPolicy::default(),
            request_timeout_ms: default_timeout_ms(),
            default_miter_limit: default_miter_limit(),
        }
    }
}

/// Loads `tangram.toml` (and `tangram.local.toml`) layered with `TANGRAM__*`
/// environment variables. An optional `.env` is read first via `dotenvy`.
pub fn load_config() -> Result<TangramConfig, TangramError> {
    let _ = dotenvy::dotenv();

    let builder = config::Config::builder()
        .add_source(config::File::with_name("tangram").required(false))
        .add_source(config::File::with_name("tangram.local").required(false))
        .add_source(
            config::Environment::with_prefix("TANGRAM")
                .separator("__")
                .try_parsing(true),
        );

    let cfg = builder.build()?;
    log::info!("tangram config loaded");
    Ok(cfg.try_deserialize().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = TangramConfig::default();
        assert!(cfg.worker_threads >= 1);
        assert_eq!(cfg.network_retry.max_attempts, 0);
    }
}
