//! Configuration management for modelkit.
//!
//! Loads configuration from environment variables (with `.env` support):
//! - Server bind address
//! - Storage tree root for project artifacts
//! - Export archive tuning (compression level, chunking, back-pressure)

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root of the per-project storage trees: `{root}/{project_id}/...`
    pub root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Deflate level, 0 (store-like) to 9 (best).
    pub compression_level: i64,
    /// Upper bound for one chunk handed to the response body.
    pub chunk_size: usize,
    /// Number of chunks that may be queued ahead of the client.
    pub channel_capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            compression_level: 9,
            chunk_size: 64 * 1024,
            channel_capacity: 8,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = ExportConfig::default();

        Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0"),
                port: env_or("PORT", "8770").parse().unwrap_or(8770),
            },
            storage: StorageConfig {
                root: PathBuf::from(env_or("STORAGE_ROOT", "./data/projects")),
            },
            export: ExportConfig {
                compression_level: env_or("EXPORT_COMPRESSION_LEVEL", "9")
                    .parse::<i64>()
                    .map(clamp_level)
                    .unwrap_or(defaults.compression_level),
                chunk_size: env_or("EXPORT_CHUNK_SIZE", "65536")
                    .parse()
                    .ok()
                    .filter(|size| *size > 0)
                    .unwrap_or(defaults.chunk_size),
                channel_capacity: env_or("EXPORT_CHANNEL_CAPACITY", "8")
                    .parse()
                    .ok()
                    .filter(|cap| *cap > 0)
                    .unwrap_or(defaults.channel_capacity),
            },
        }
    }
}

/// Deflate only understands levels 0..=9.
fn clamp_level(level: i64) -> i64 {
    level.clamp(0, 9)
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_level() {
        assert_eq!(clamp_level(-3), 0);
        assert_eq!(clamp_level(6), 6);
        assert_eq!(clamp_level(42), 9);
    }

    #[test]
    fn test_export_defaults() {
        let cfg = ExportConfig::default();
        assert_eq!(cfg.compression_level, 9);
        assert_eq!(cfg.chunk_size, 65536);
        assert_eq!(cfg.channel_capacity, 8);
    }
}
