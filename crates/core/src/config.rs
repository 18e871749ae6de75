use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::booking::InviteDefaults;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub policy: PolicyClientConfig,
    pub orchestrator: OrchestratorConfig,
    pub booking: BookingConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PolicyClientConfig {
    pub provider: PolicyProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl PolicyClientConfig {
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
    }
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub history_limit: u32,
    pub max_policy_steps: u32,
}

#[derive(Clone, Debug)]
pub struct BookingConfig {
    pub default_location: String,
    pub default_subject: String,
}

impl BookingConfig {
    pub fn invite_defaults(&self) -> InviteDefaults {
        InviteDefaults {
            subject: self.default_subject.clone(),
            location: self.default_location.clone(),
            ..InviteDefaults::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl PolicyProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub policy_provider: Option<PolicyProvider>,
    pub policy_model: Option<String>,
    pub policy_api_key: Option<String>,
    pub history_limit: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let invite = InviteDefaults::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://meetbook.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            policy: PolicyClientConfig {
                provider: PolicyProvider::Ollama,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                timeout_secs: 60,
                max_retries: 2,
            },
            orchestrator: OrchestratorConfig { history_limit: 20, max_policy_steps: 8 },
            booking: BookingConfig {
                default_location: invite.location,
                default_subject: invite.subject,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for PolicyProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported policy provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("meetbook.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Base URL of the policy endpoint, falling back to the provider default.
    pub fn policy_base_url(&self) -> String {
        self.policy.resolved_base_url()
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(policy) = patch.policy {
            if let Some(provider) = policy.provider {
                self.policy.provider = provider;
            }
            if let Some(api_key) = policy.api_key {
                self.policy.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = policy.base_url {
                self.policy.base_url = Some(base_url);
            }
            if let Some(model) = policy.model {
                self.policy.model = model;
            }
            if let Some(timeout_secs) = policy.timeout_secs {
                self.policy.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = policy.max_retries {
                self.policy.max_retries = max_retries;
            }
        }

        if let Some(orchestrator) = patch.orchestrator {
            if let Some(history_limit) = orchestrator.history_limit {
                self.orchestrator.history_limit = history_limit;
            }
            if let Some(max_policy_steps) = orchestrator.max_policy_steps {
                self.orchestrator.max_policy_steps = max_policy_steps;
            }
        }

        if let Some(booking) = patch.booking {
            if let Some(default_location) = booking.default_location {
                self.booking.default_location = default_location;
            }
            if let Some(default_subject) = booking.default_subject {
                self.booking.default_subject = default_subject;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("MEETBOOK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("MEETBOOK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("MEETBOOK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("MEETBOOK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("MEETBOOK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MEETBOOK_POLICY_PROVIDER") {
            self.policy.provider = value.parse()?;
        }
        if let Some(value) = read_env("MEETBOOK_POLICY_API_KEY") {
            self.policy.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("MEETBOOK_POLICY_BASE_URL") {
            self.policy.base_url = Some(value);
        }
        if let Some(value) = read_env("MEETBOOK_POLICY_MODEL") {
            self.policy.model = value;
        }
        if let Some(value) = read_env("MEETBOOK_POLICY_TIMEOUT_SECS") {
            self.policy.timeout_secs = parse_u64("MEETBOOK_POLICY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("MEETBOOK_POLICY_MAX_RETRIES") {
            self.policy.max_retries = parse_u32("MEETBOOK_POLICY_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("MEETBOOK_ORCHESTRATOR_HISTORY_LIMIT") {
            self.orchestrator.history_limit =
                parse_u32("MEETBOOK_ORCHESTRATOR_HISTORY_LIMIT", &value)?;
        }
        if let Some(value) = read_env("MEETBOOK_ORCHESTRATOR_MAX_POLICY_STEPS") {
            self.orchestrator.max_policy_steps =
                parse_u32("MEETBOOK_ORCHESTRATOR_MAX_POLICY_STEPS", &value)?;
        }

        if let Some(value) = read_env("MEETBOOK_BOOKING_DEFAULT_LOCATION") {
            self.booking.default_location = value;
        }
        if let Some(value) = read_env("MEETBOOK_BOOKING_DEFAULT_SUBJECT") {
            self.booking.default_subject = value;
        }

        if let Some(value) = read_env("MEETBOOK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MEETBOOK_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("MEETBOOK_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("MEETBOOK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("MEETBOOK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("MEETBOOK_LOGGING_LEVEL").or_else(|| read_env("MEETBOOK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MEETBOOK_LOGGING_FORMAT").or_else(|| read_env("MEETBOOK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(provider) = overrides.policy_provider {
            self.policy.provider = provider;
        }
        if let Some(model) = overrides.policy_model {
            self.policy.model = model;
        }
        if let Some(api_key) = overrides.policy_api_key {
            self.policy.api_key = Some(secret_value(api_key));
        }
        if let Some(history_limit) = overrides.history_limit {
            self.orchestrator.history_limit = history_limit;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_policy(&self.policy)?;
        validate_orchestrator(&self.orchestrator)?;
        validate_booking(&self.booking)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("meetbook.toml"), PathBuf::from("config/meetbook.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_policy(policy: &PolicyClientConfig) -> Result<(), ConfigError> {
    if policy.timeout_secs == 0 || policy.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "policy.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if policy.model.trim().is_empty() {
        return Err(ConfigError::Validation("policy.model must not be empty".to_string()));
    }

    // Local ollama endpoints accept unauthenticated requests.
    if policy.provider == PolicyProvider::OpenAi {
        let missing = policy
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "policy.api_key is required for the openai provider".to_string(),
            ));
        }
    }

    if let Some(base_url) = policy.base_url.as_deref().filter(|url| !url.trim().is_empty()) {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "policy.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_orchestrator(orchestrator: &OrchestratorConfig) -> Result<(), ConfigError> {
    if orchestrator.history_limit == 0 || orchestrator.history_limit > 200 {
        return Err(ConfigError::Validation(
            "orchestrator.history_limit must be in range 1..=200".to_string(),
        ));
    }

    if orchestrator.max_policy_steps == 0 || orchestrator.max_policy_steps > 32 {
        return Err(ConfigError::Validation(
            "orchestrator.max_policy_steps must be in range 1..=32".to_string(),
        ));
    }

    Ok(())
}

fn validate_booking(booking: &BookingConfig) -> Result<(), ConfigError> {
    if booking.default_location.trim().is_empty() {
        return Err(ConfigError::Validation(
            "booking.default_location must not be empty".to_string(),
        ));
    }
    if booking.default_subject.trim().is_empty() {
        return Err(ConfigError::Validation(
            "booking.default_subject must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    policy: Option<PolicyPatch>,
    orchestrator: Option<OrchestratorPatch>,
    booking: Option<BookingPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyPatch {
    provider: Option<PolicyProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct OrchestratorPatch {
    history_limit: Option<u32>,
    max_policy_steps: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct BookingPatch {
    default_location: Option<String>,
    default_subject: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
