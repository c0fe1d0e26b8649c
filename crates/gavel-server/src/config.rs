use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Key-value store selection
    #[serde(default)]
    pub redis: RedisConfig,
    /// Cache service configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Lock strategy configuration
    #[serde(default)]
    pub lock: LockConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Redis validation
        if self.redis.enabled && self.redis.url.is_empty() {
            return Err("redis.enabled=true requires redis.url".into());
        }
        for url in &self.redis.quorum_urls {
            if url::Url::parse(url).is_err() {
                return Err(format!("redis.quorum_urls entry '{url}' is not a valid URL"));
            }
        }
        if self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        if self.redis.default_ttl_ms == 0 {
            return Err("redis.default_ttl_ms must be > 0".into());
        }
        // Cache validation
        if self.cache.default_timeout_ms == 0 {
            return Err("cache.default_timeout_ms must be > 0".into());
        }
        if self.cache.default_ttl_ms == 0 || self.cache.bucket_ttl_ms == 0 {
            return Err("cache ttls must be > 0".into());
        }
        // Lock validation
        if self.lock.spin.delay_ms == 0 {
            return Err("lock.spin.delay_ms must be > 0".into());
        }
        if self.lock.spin.ttl_ms == 0 || self.lock.quorum.ttl_ms == 0 {
            return Err("lock ttls must be > 0".into());
        }
        if !(0.0..1.0).contains(&self.lock.quorum.drift_factor) {
            return Err("lock.quorum.drift_factor must be in [0, 1)".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (falls back to the in-memory store without it)
    /// Default: false (single-instance deployments)
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// TTL applied to plain writes without an explicit TTL
    #[serde(default = "default_store_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Independent nodes for the quorum lock. Empty means the primary store
    /// is the single quorum node.
    #[serde(default)]
    pub quorum_urls: Vec<String>,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_store_ttl_ms() -> u64 {
    10_000
}

impl RedisConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            default_ttl_ms: default_store_ttl_ms(),
            quorum_urls: Vec::new(),
        }
    }
}

/// Cache service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Upper bound for a single cache read
    #[serde(default = "default_cache_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Entry TTL when the policy does not set one
    #[serde(default = "default_cache_ttl_ms")]
    pub default_ttl_ms: u64,

    /// TTL of bucket member sets
    #[serde(default = "default_bucket_ttl_ms")]
    pub bucket_ttl_ms: u64,

    /// Failures tolerated before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Window after the first failure during which the circuit stays open
    #[serde(default = "default_failure_ttl_ms")]
    pub failure_ttl_ms: u64,

    /// Gzip JSON payloads before writing
    #[serde(default)]
    pub enable_compression: bool,

    /// JSON mode unless the policy says otherwise
    #[serde(default = "default_serializable")]
    pub default_serializable: bool,
}

fn default_cache_timeout_ms() -> u64 {
    500
}
fn default_cache_ttl_ms() -> u64 {
    60_000
}
fn default_bucket_ttl_ms() -> u64 {
    60_000
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_failure_ttl_ms() -> u64 {
    5000
}
fn default_serializable() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_cache_timeout_ms(),
            default_ttl_ms: default_cache_ttl_ms(),
            bucket_ttl_ms: default_bucket_ttl_ms(),
            failure_threshold: default_failure_threshold(),
            failure_ttl_ms: default_failure_ttl_ms(),
            enable_compression: false,
            default_serializable: default_serializable(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LockConfig {
    #[serde(default)]
    pub spin: SpinLockConfig,
    #[serde(default)]
    pub quorum: QuorumLockConfig,
}

/// Single-node spin lock settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinLockConfig {
    #[serde(default = "default_spin_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_lock_ttl_ms")]
    pub ttl_ms: u64,
    #[serde(default = "default_spin_timeout_ms")]
    pub timeout_ms: u64,
    /// Release only when the key still holds our token
    #[serde(default = "default_verify_owner")]
    pub verify_owner: bool,
}

fn default_spin_delay_ms() -> u64 {
    200
}
fn default_lock_ttl_ms() -> u64 {
    500
}
fn default_spin_timeout_ms() -> u64 {
    5000
}
fn default_verify_owner() -> bool {
    true
}

impl Default for SpinLockConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_spin_delay_ms(),
            ttl_ms: default_lock_ttl_ms(),
            timeout_ms: default_spin_timeout_ms(),
            verify_owner: default_verify_owner(),
        }
    }
}

/// Redlock-style quorum lock settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumLockConfig {
    #[serde(default = "default_drift_factor")]
    pub drift_factor: f64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,
    #[serde(default = "default_extension_threshold_ms")]
    pub automatic_extension_threshold_ms: u64,
    #[serde(default = "default_lock_ttl_ms")]
    pub ttl_ms: u64,
}

fn default_drift_factor() -> f64 {
    0.01
}
fn default_retry_count() -> u32 {
    20
}
fn default_retry_delay_ms() -> u64 {
    200
}
fn default_retry_jitter_ms() -> u64 {
    200
}
fn default_extension_threshold_ms() -> u64 {
    500
}

impl Default for QuorumLockConfig {
    fn default() -> Self {
        Self {
            drift_factor: default_drift_factor(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
            automatic_extension_threshold_ms: default_extension_threshold_ms(),
            ttl_ms: default_lock_ttl_ms(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                let default_path = PathBuf::from("gavel.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., GAVEL__CACHE__DEFAULT_TTL_MS=30000
        builder = builder.add_source(
            Environment::with_prefix("GAVEL")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
