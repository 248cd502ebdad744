use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use ipnet::IpNet;
use quietgate_core::AppError;
use quietgate_domain::{DEFAULT_COLLECTION, ThrottleConfig, validate_key_segment};
use tracing_subscriber::EnvFilter;

const DEFAULT_REDIS_KEY_PREFIX: &str = "quietgate";
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Record store selected through `STORE_BACKEND`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackendConfig {
    Memory,
    Postgres { database_url: String },
    Redis { redis_url: String, key_prefix: String },
}

impl StoreBackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
            Self::Redis { .. } => "redis",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub api_host: String,
    pub api_port: u16,
    pub store_backend: StoreBackendConfig,
    pub database_max_connections: u32,
    pub throttle: ThrottleConfig,
    pub trusted_proxies: Vec<IpNet>,
    pub admin_token: Option<String>,
    pub allowed_origin: Option<String>,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        let mut config = Self::from_lookup(|name| env::var(name).ok())?;
        config.migrate_only = migrate_only;
        Ok(config)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_host = non_empty("API_HOST").unwrap_or_else(|| "127.0.0.1".to_owned());
        let api_port = non_empty("API_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let store_backend = match non_empty("STORE_BACKEND")
            .unwrap_or_else(|| "memory".to_owned())
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => StoreBackendConfig::Memory,
            "postgres" => StoreBackendConfig::Postgres {
                database_url: non_empty("DATABASE_URL").ok_or_else(|| {
                    AppError::Configuration(
                        "DATABASE_URL is required when STORE_BACKEND=postgres".to_owned(),
                    )
                })?,
            },
            "redis" => StoreBackendConfig::Redis {
                redis_url: non_empty("REDIS_URL").ok_or_else(|| {
                    AppError::Configuration(
                        "REDIS_URL is required when STORE_BACKEND=redis".to_owned(),
                    )
                })?,
                key_prefix: parse_redis_key_prefix(non_empty("REDIS_KEY_PREFIX"))?,
            },
            other => {
                return Err(AppError::Configuration(format!(
                    "STORE_BACKEND must be one of 'memory', 'postgres' or 'redis', got '{other}'"
                )));
            }
        };

        let database_max_connections =
            parse_optional::<u32>("DATABASE_MAX_CONNECTIONS", non_empty("DATABASE_MAX_CONNECTIONS"))?
                .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS);

        let throttle = ThrottleConfig::new(
            non_empty("THROTTLE_COLLECTION").unwrap_or_else(|| DEFAULT_COLLECTION.to_owned()),
            parse_optional::<u32>("THROTTLE_MAX_PER_DAY", non_empty("THROTTLE_MAX_PER_DAY"))?,
            parse_optional::<u64>("THROTTLE_QUIET_TIME_MS", non_empty("THROTTLE_QUIET_TIME_MS"))?,
        )?;

        let trusted_proxies = non_empty("TRUSTED_PROXIES")
            .map(|value| parse_trusted_proxies(&value))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            migrate_only: false,
            api_host,
            api_port,
            store_backend,
            database_max_connections,
            throttle,
            trusted_proxies,
            admin_token: non_empty("ADMIN_TOKEN"),
            allowed_origin: non_empty("ALLOWED_ORIGIN"),
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Configuration(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_optional<T>(name: &str, value: Option<String>) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|value| {
            value.trim().parse::<T>().map_err(|error| {
                AppError::Configuration(format!("invalid {name} '{value}': {error}"))
            })
        })
        .transpose()
}

fn parse_redis_key_prefix(value: Option<String>) -> Result<String, AppError> {
    let prefix = value.unwrap_or_else(|| DEFAULT_REDIS_KEY_PREFIX.to_owned());
    validate_key_segment("REDIS_KEY_PREFIX", &prefix)?;
    Ok(prefix)
}

fn parse_trusted_proxies(value: &str) -> Result<Vec<IpNet>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            IpNet::from_str(entry)
                .or_else(|_| IpAddr::from_str(entry).map(IpNet::from))
                .map_err(|error| {
                    AppError::Configuration(format!("invalid TRUSTED_PROXIES entry '{entry}': {error}"))
                })
        })
        .collect()
}
