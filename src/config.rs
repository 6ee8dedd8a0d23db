//! Layered configuration: `configuration/base.yaml` plus an
//! environment-specific overlay, plus the four literal environment
//! variables the relay's external interface is defined in terms of
//! (`PORT`, `REDIS_ADDR`, `REDIS_PASS`, `REDIS_DB`).

use config::{Config, ConfigError, File, Source};
use serde::Deserialize;

/// Top-level settings tree, deserialized from the layered YAML sources.
#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub redis: RedisSettings,
    pub limits: LimitSettings,
    pub runtime: RuntimeSettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RedisSettings {
    pub addr: String,
    pub password: String,
    pub db: i64,
}

/// Data-model constants from the queue/message domain.
#[derive(Deserialize, Clone, Debug)]
pub struct LimitSettings {
    pub queue_ttl_secs: u64,
    pub message_ttl_secs: u64,
    pub max_queue_depth: u64,
    pub max_msg_bytes: usize,
    pub default_window_limit: u64,
    pub max_window_limit: u64,
}

/// Everything that is not a hard protocol constant but still should not be a
/// literal buried in code: request deadlines, sweep cadence, WS keep-alive.
#[derive(Deserialize, Clone, Debug)]
pub struct RuntimeSettings {
    pub request_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub sweep_interval_secs: u64,
    pub ws_ping_interval_secs: u64,
    pub ws_pong_timeout_secs: u64,
}

/// The possible runtime environment for our application.
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn from_env() -> Result<Self, String> {
        std::env::var("APP_ENVIRONMENT")
            .unwrap_or_else(|_| "local".into())
            .try_into()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{other} is not a supported environment. Use either `local` or `production`."
            )),
        }
    }
}

/// Load configuration from `{prefix}configuration/{base,environment}.yaml`,
/// then apply the four literal environment variable overrides the relay's
/// external interface names.
pub fn get_configuration(prefix: &str) -> Result<Settings, ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join(format!("{prefix}configuration"));
    let environment = Environment::from_env().map_err(ConfigError::Message)?;

    let settings = get_configuration_impl(
        File::from(configuration_directory.join("base")).required(true),
        File::from(configuration_directory.join(environment.as_str())).required(false),
    )?;
    Ok(apply_env_overrides(settings))
}

/// Load configuration from in-memory YAML strings, for tests.
pub fn get_configuration_from_str(base: &str, environment: &str) -> Result<Settings, ConfigError> {
    let settings = get_configuration_impl(
        File::from_str(base, config::FileFormat::Yaml),
        File::from_str(environment, config::FileFormat::Yaml),
    )?;
    Ok(apply_env_overrides(settings))
}

fn get_configuration_impl(
    base: impl Source + Send + Sync + 'static,
    environment: impl Source + Send + Sync + 'static,
) -> Result<Settings, ConfigError> {
    let builder = Config::builder().add_source(base).add_source(environment);
    builder.build()?.try_deserialize()
}

/// `PORT`, `REDIS_ADDR`, `REDIS_PASS`, `REDIS_DB` are read directly rather
/// than through a prefixed `config::Environment` source, because the
/// relay's documented surface names them unprefixed.
fn apply_env_overrides(mut settings: Settings) -> Settings {
    if let Ok(port) = std::env::var("PORT") {
        if let Ok(port) = port.parse() {
            settings.application.port = port;
        }
    }
    if let Ok(addr) = std::env::var("REDIS_ADDR") {
        settings.redis.addr = addr;
    }
    if let Ok(pass) = std::env::var("REDIS_PASS") {
        settings.redis.password = pass;
    }
    if let Ok(db) = std::env::var("REDIS_DB") {
        if let Ok(db) = db.parse() {
            settings.redis.db = db;
        }
    }
    settings
}
