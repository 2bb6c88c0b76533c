use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ticketdesk_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let unset = || "<unset>".to_string();
    let fields = vec![
        field(
            "aws.region",
            config.aws.region.clone().unwrap_or_else(unset),
            &["TICKETDESK_AWS_REGION"],
        ),
        field(
            "aws.profile",
            config.aws.profile.clone().unwrap_or_else(unset),
            &["TICKETDESK_AWS_PROFILE"],
        ),
        field(
            "aws.endpoint_url",
            config.aws.endpoint_url.clone().unwrap_or_else(unset),
            &["TICKETDESK_AWS_ENDPOINT_URL"],
        ),
        field("agent.name", config.agent.name.clone(), &["TICKETDESK_AGENT_NAME"]),
        field(
            "agent.foundation_model",
            config.agent.foundation_model.clone(),
            &["TICKETDESK_AGENT_FOUNDATION_MODEL"],
        ),
        field(
            "agent.knowledge_base_id",
            config.agent.knowledge_base_id.clone().unwrap_or_else(unset),
            &["TICKETDESK_AGENT_KNOWLEDGE_BASE_ID"],
        ),
        field("table.name", config.table.name.clone(), &["TICKETDESK_TABLE_NAME"]),
        field(
            "table.key_attribute",
            config.table.key_attribute.clone(),
            &["TICKETDESK_TABLE_KEY_ATTRIBUTE"],
        ),
        field("function.name", config.function_name(), &["TICKETDESK_FUNCTION_NAME"]),
        field(
            "function.artifact_path",
            config.function.artifact_path.display().to_string(),
            &["TICKETDESK_FUNCTION_ARTIFACT_PATH"],
        ),
        field(
            "function.runtime",
            config.function.runtime.clone(),
            &["TICKETDESK_FUNCTION_RUNTIME"],
        ),
        field(
            "function.handler",
            config.function.handler.clone(),
            &["TICKETDESK_FUNCTION_HANDLER"],
        ),
        field(
            "function.timeout_secs",
            config.function.timeout_secs.to_string(),
            &["TICKETDESK_FUNCTION_TIMEOUT_SECS"],
        ),
        field(
            "function.architecture",
            config.function.architecture.clone(),
            &["TICKETDESK_FUNCTION_ARCHITECTURE"],
        ),
        field(
            "function.memory_mb",
            config.function.memory_mb.to_string(),
            &["TICKETDESK_FUNCTION_MEMORY_MB"],
        ),
        field(
            "provisioning.propagation_delay_secs",
            config.provisioning.propagation_delay_secs.to_string(),
            &["TICKETDESK_PROVISIONING_PROPAGATION_DELAY_SECS"],
        ),
        field(
            "provisioning.table_poll_interval_ms",
            config.provisioning.table_poll_interval_ms.to_string(),
            &["TICKETDESK_PROVISIONING_TABLE_POLL_INTERVAL_MS"],
        ),
        field(
            "provisioning.table_poll_attempts",
            config.provisioning.table_poll_attempts.to_string(),
            &["TICKETDESK_PROVISIONING_TABLE_POLL_ATTEMPTS"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["TICKETDESK_LOGGING_LEVEL", "TICKETDESK_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["TICKETDESK_LOGGING_FORMAT", "TICKETDESK_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for Field { key, value, env_keys } in fields {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    Field { key, value, env_keys }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("ticketdesk.toml"), PathBuf::from("config/ticketdesk.toml")]
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
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
