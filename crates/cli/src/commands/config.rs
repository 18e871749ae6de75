use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use meetbook_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let field = |key, env_key, value: String| Field { key, env_key, value };
    vec![
        field("database.url", "MEETBOOK_DATABASE_URL", config.database.url.clone()),
        field(
            "database.max_connections",
            "MEETBOOK_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            "MEETBOOK_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        field("policy.provider", "MEETBOOK_POLICY_PROVIDER", config.policy.provider.as_str().to_string()),
        field("policy.model", "MEETBOOK_POLICY_MODEL", config.policy.model.clone()),
        field("policy.base_url", "MEETBOOK_POLICY_BASE_URL", config.policy_base_url()),
        field(
            "policy.api_key",
            "MEETBOOK_POLICY_API_KEY",
            if config.policy.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
        ),
        field(
            "policy.timeout_secs",
            "MEETBOOK_POLICY_TIMEOUT_SECS",
            config.policy.timeout_secs.to_string(),
        ),
        field(
            "policy.max_retries",
            "MEETBOOK_POLICY_MAX_RETRIES",
            config.policy.max_retries.to_string(),
        ),
        field(
            "orchestrator.history_limit",
            "MEETBOOK_ORCHESTRATOR_HISTORY_LIMIT",
            config.orchestrator.history_limit.to_string(),
        ),
        field(
            "orchestrator.max_policy_steps",
            "MEETBOOK_ORCHESTRATOR_MAX_POLICY_STEPS",
            config.orchestrator.max_policy_steps.to_string(),
        ),
        field(
            "booking.default_location",
            "MEETBOOK_BOOKING_DEFAULT_LOCATION",
            config.booking.default_location.clone(),
        ),
        field(
            "booking.default_subject",
            "MEETBOOK_BOOKING_DEFAULT_SUBJECT",
            config.booking.default_subject.clone(),
        ),
        field("server.bind_address", "MEETBOOK_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        field(
            "server.health_check_port",
            "MEETBOOK_SERVER_HEALTH_CHECK_PORT",
            config.server.health_check_port.to_string(),
        ),
        field("logging.level", "MEETBOOK_LOGGING_LEVEL", config.logging.level.clone()),
        field("logging.format", "MEETBOOK_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("meetbook.toml"), PathBuf::from("config/meetbook.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
