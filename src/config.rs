use crate::error::ConfigError;
use crate::scheduler::CronExpr;
use crate::store::NewMirror;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Mirrors provisioned at startup: (name, enable key, upstream key, default upstream)
const KNOWN_MIRRORS: [(&str, &str, &str, &str); 3] = [
    (
        "freebsd",
        "FREEBSD_ENABLED",
        "FREEBSD_UPSTREAM",
        "rsync://ftp.freebsd.org/FreeBSD/",
    ),
    (
        "netbsd",
        "NETBSD_ENABLED",
        "NETBSD_UPSTREAM",
        "rsync://ftp.netbsd.org/pub/NetBSD/",
    ),
    (
        "openbsd",
        "OPENBSD_ENABLED",
        "OPENBSD_UPSTREAM",
        "rsync://ftp.openbsd.org/pub/OpenBSD/",
    ),
];

/// Service configuration sourced from the environment.
///
/// Schedule, bandwidth, timeout and startup-sync values here are only the
/// fallbacks; the `settings` table overrides them at runtime.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_path: PathBuf,
    pub db_pool_size: u32,
    pub db_connect_attempts: u32,
    pub db_connect_backoff: Duration,

    pub schedule: CronExpr,
    pub bandwidth_limit_kbs: u32,
    pub timeout: Duration,
    /// Wall-clock cap on one transfer; `None` = unlimited
    pub max_runtime: Option<Duration>,
    pub sync_on_startup: bool,
    pub poll_interval: Duration,
    pub error_backoff: Duration,

    pub rsync_binary: PathBuf,
    pub data_path: PathBuf,
    pub mirrors: Vec<NewMirror>,

    pub health_addr: SocketAddr,

    pub log_level: String,
    /// `None` disables file logging
    pub log_dir: Option<PathBuf>,
    pub log_max_files: usize,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let data_path = PathBuf::from(env.string("MIRROR_DATA_PATH", "/data/mirrors"));
        let mut mirrors = Vec::with_capacity(KNOWN_MIRRORS.len());
        for (name, enabled_key, upstream_key, default_upstream) in KNOWN_MIRRORS {
            let mirror = NewMirror::new(
                name,
                name,
                env.string(upstream_key, default_upstream),
                data_path.join(name).to_string_lossy(),
            )
            .with_enabled(env.bool(enabled_key, true)?);
            mirrors.push(mirror);
        }

        let schedule_text = env.string("SYNC_SCHEDULE", "0 4 * * *");
        let schedule = CronExpr::parse(&schedule_text).map_err(|e| ConfigError::InvalidValue {
            key: "SYNC_SCHEDULE",
            value: schedule_text.clone(),
            reason: e.to_string(),
        })?;

        let max_runtime = env.parse::<u64>("SYNC_MAX_RUNTIME", 0)?;

        Ok(Self {
            database_path: PathBuf::from(
                env.string("MIRROR_SYNC_DATABASE", "/var/lib/mirror-sync/mirrors.db"),
            ),
            db_pool_size: env.parse("MIRROR_SYNC_DB_POOL_SIZE", 4)?,
            db_connect_attempts: env.parse("MIRROR_SYNC_DB_CONNECT_ATTEMPTS", 30)?,
            db_connect_backoff: env.seconds("MIRROR_SYNC_DB_CONNECT_BACKOFF", 2)?,
            schedule,
            bandwidth_limit_kbs: env.parse("SYNC_BANDWIDTH_LIMIT", 0)?,
            timeout: env.seconds("SYNC_TIMEOUT", 600)?,
            max_runtime: (max_runtime > 0).then(|| Duration::from_secs(max_runtime)),
            sync_on_startup: env.bool("SYNC_ON_STARTUP", false)?,
            poll_interval: env.seconds("SYNC_POLL_INTERVAL", 10)?,
            error_backoff: env.seconds("SYNC_ERROR_BACKOFF", 5)?,
            rsync_binary: PathBuf::from(env.string("RSYNC_BINARY", "rsync")),
            data_path,
            mirrors,
            health_addr: env.parse("HEALTH_ADDR", SocketAddr::from(([0, 0, 0, 0], 8001)))?,
            log_level: env.string("LOG_LEVEL", "info"),
            log_dir: env.optional("LOG_DIR").map(PathBuf::from),
            log_max_files: env.parse("LOG_MAX_FILES", 5)?,
        })
    }
}

/// Parse the boolean spellings accepted in configuration and settings
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Value of `key`; blank values count as unset
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn seconds(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parse(key, default).map(Duration::from_secs)
    }

    fn bool(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => parse_bool(&value).ok_or_else(|| ConfigError::InvalidValue {
                key,
                value,
                reason: "expected true/false, yes/no, on/off or 1/0".to_string(),
            }),
        }
    }
}
