/// Default retention delay: one year (52 weeks) in seconds.
pub const DEFAULT_RETENTION_DELAY_SECS: u64 = 31_449_600;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (job locks)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 10)
    pub db_max_connections: u32,

    /// Public base URL of the host LMS, used to build module links
    pub host_base_url: String,

    /// Base URL of the host REST API (course directory + messaging)
    pub host_api_url: String,

    /// Bearer token presented to the host REST API
    pub host_api_token: Option<String>,

    /// Per-request timeout for host API calls in seconds (default: 30)
    pub host_timeout_secs: u64,

    /// HS256 secret used to verify service tokens on the ingest API
    pub jwt_secret: String,

    /// Ingest API listen port (default: 3000)
    pub api_port: u16,

    /// Seconds between drain passes (default: 60)
    pub drain_interval_secs: u64,

    /// Seconds between retention sweeps (default: 86400)
    pub sweep_interval_secs: u64,

    /// Age in seconds after which sent notifications are purged. `0` disables purging.
    pub retention_delay_secs: u64,

    /// Course ids that should never appear in a feed.
    ///
    /// Parsed from a `|`-separated list. Not applied by any job yet.
    pub blacklist_course_ids: Vec<i64>,

    /// Upper bound on how long a job lock survives a crashed holder (default: 600)
    pub job_lock_ttl_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "10")?,
            host_base_url: std::env::var("HOST_BASE_URL")
                .unwrap_or_else(|_| "http://localhost".to_string())
                .trim_end_matches('/')
                .to_string(),
            host_api_url: std::env::var("HOST_API_URL")
                .unwrap_or_else(|_| "http://localhost/api".to_string())
                .trim_end_matches('/')
                .to_string(),
            host_api_token: std::env::var("HOST_API_TOKEN").ok(),
            host_timeout_secs: parse_var("HOST_TIMEOUT_SECS", "30")?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            api_port: parse_var("API_PORT", "3000")?,
            drain_interval_secs: parse_var("DRAIN_INTERVAL_SECS", "60")?,
            sweep_interval_secs: parse_var("SWEEP_INTERVAL_SECS", "86400")?,
            retention_delay_secs: parse_var(
                "RETENTION_DELAY_SECS",
                &DEFAULT_RETENTION_DELAY_SECS.to_string(),
            )?,
            blacklist_course_ids: parse_course_id_list(
                &std::env::var("BLACKLIST_COURSE_IDS").unwrap_or_default(),
            )?,
            job_lock_ttl_secs: parse_var("JOB_LOCK_TTL_SECS", "600")?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> anyhow::Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                name,
                std::any::type_name::<T>()
            )
        })
}

/// Parse a `|`-separated list of course ids. Blank segments are ignored.
pub fn parse_course_id_list(raw: &str) -> anyhow::Result<Vec<i64>> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| anyhow::anyhow!("Invalid course id '{}' in BLACKLIST_COURSE_IDS", s))
        })
        .collect()
}
