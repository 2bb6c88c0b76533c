use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::resources::{validate_agent_name, ResourceNames};
use crate::domain::ticket::TICKET_KEY_ATTRIBUTE;

pub const TABLE_NAME_ENV: &str = "TICKET_TABLE_NAME";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub aws: AwsConfig,
    pub agent: AgentConfig,
    pub table: TableConfig,
    pub function: FunctionConfig,
    pub provisioning: ProvisioningConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Default)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub name: String,
    pub foundation_model: String,
    pub knowledge_base_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TableConfig {
    pub name: String,
    pub key_attribute: String,
}

#[derive(Clone, Debug)]
pub struct FunctionConfig {
    /// Defaults to `{agent}-lambda` when unset.
    pub name: Option<String>,
    pub artifact_path: PathBuf,
    pub runtime: String,
    pub handler: String,
    pub timeout_secs: u32,
    pub architecture: String,
    pub memory_mb: u32,
}

#[derive(Clone, Debug)]
pub struct ProvisioningConfig {
    pub propagation_delay_secs: u64,
    pub table_poll_interval_ms: u64,
    pub table_poll_attempts: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
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
    pub region: Option<String>,
    pub agent_name: Option<String>,
    pub foundation_model: Option<String>,
    pub knowledge_base_id: Option<String>,
    pub table_name: Option<String>,
    pub function_name: Option<String>,
    pub artifact_path: Option<PathBuf>,
    pub propagation_delay_secs: Option<u64>,
    pub log_level: Option<String>,
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
        Self {
            aws: AwsConfig::default(),
            agent: AgentConfig {
                name: String::new(),
                foundation_model: String::new(),
                knowledge_base_id: None,
            },
            table: TableConfig {
                name: "it_support_tickets".to_string(),
                key_attribute: TICKET_KEY_ATTRIBUTE.to_string(),
            },
            function: FunctionConfig {
                name: None,
                artifact_path: PathBuf::from("target/lambda/ticketdesk-handler/bootstrap"),
                runtime: "provided.al2023".to_string(),
                handler: "bootstrap".to_string(),
                timeout_secs: 60,
                architecture: "x86_64".to_string(),
                memory_mb: 128,
            },
            provisioning: ProvisioningConfig {
                propagation_delay_secs: 10,
                table_poll_interval_ms: 2_000,
                table_poll_attempts: 60,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("ticketdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn function_name(&self) -> String {
        self.function
            .name
            .clone()
            .unwrap_or_else(|| ResourceNames::default_function_name(&self.agent.name))
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(aws) = patch.aws {
            if aws.region.is_some() {
                self.aws.region = aws.region;
            }
            if aws.profile.is_some() {
                self.aws.profile = aws.profile;
            }
            if aws.endpoint_url.is_some() {
                self.aws.endpoint_url = aws.endpoint_url;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(name) = agent.name {
                self.agent.name = name;
            }
            if let Some(foundation_model) = agent.foundation_model {
                self.agent.foundation_model = foundation_model;
            }
            if agent.knowledge_base_id.is_some() {
                self.agent.knowledge_base_id = agent.knowledge_base_id;
            }
        }

        if let Some(table) = patch.table {
            if let Some(name) = table.name {
                self.table.name = name;
            }
            if let Some(key_attribute) = table.key_attribute {
                self.table.key_attribute = key_attribute;
            }
        }

        if let Some(function) = patch.function {
            if function.name.is_some() {
                self.function.name = function.name;
            }
            if let Some(artifact_path) = function.artifact_path {
                self.function.artifact_path = artifact_path;
            }
            if let Some(runtime) = function.runtime {
                self.function.runtime = runtime;
            }
            if let Some(handler) = function.handler {
                self.function.handler = handler;
            }
            if let Some(timeout_secs) = function.timeout_secs {
                self.function.timeout_secs = timeout_secs;
            }
            if let Some(architecture) = function.architecture {
                self.function.architecture = architecture;
            }
            if let Some(memory_mb) = function.memory_mb {
                self.function.memory_mb = memory_mb;
            }
        }

        if let Some(provisioning) = patch.provisioning {
            if let Some(delay) = provisioning.propagation_delay_secs {
                self.provisioning.propagation_delay_secs = delay;
            }
            if let Some(interval) = provisioning.table_poll_interval_ms {
                self.provisioning.table_poll_interval_ms = interval;
            }
            if let Some(attempts) = provisioning.table_poll_attempts {
                self.provisioning.table_poll_attempts = attempts;
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
        if let Some(value) = read_env("TICKETDESK_AWS_REGION") {
            self.aws.region = Some(value);
        }
        if let Some(value) = read_env("TICKETDESK_AWS_PROFILE") {
            self.aws.profile = Some(value);
        }
        if let Some(value) = read_env("TICKETDESK_AWS_ENDPOINT_URL") {
            self.aws.endpoint_url = Some(value);
        }

        if let Some(value) = read_env("TICKETDESK_AGENT_NAME") {
            self.agent.name = value;
        }
        if let Some(value) = read_env("TICKETDESK_AGENT_FOUNDATION_MODEL") {
            self.agent.foundation_model = value;
        }
        if let Some(value) = read_env("TICKETDESK_AGENT_KNOWLEDGE_BASE_ID") {
            self.agent.knowledge_base_id = Some(value);
        }

        if let Some(value) = read_env("TICKETDESK_TABLE_NAME") {
            self.table.name = value;
        }
        if let Some(value) = read_env("TICKETDESK_TABLE_KEY_ATTRIBUTE") {
            self.table.key_attribute = value;
        }

        if let Some(value) = read_env("TICKETDESK_FUNCTION_NAME") {
            self.function.name = Some(value);
        }
        if let Some(value) = read_env("TICKETDESK_FUNCTION_ARTIFACT_PATH") {
            self.function.artifact_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("TICKETDESK_FUNCTION_RUNTIME") {
            self.function.runtime = value;
        }
        if let Some(value) = read_env("TICKETDESK_FUNCTION_HANDLER") {
            self.function.handler = value;
        }
        if let Some(value) = read_env("TICKETDESK_FUNCTION_TIMEOUT_SECS") {
            self.function.timeout_secs = parse_u32("TICKETDESK_FUNCTION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TICKETDESK_FUNCTION_ARCHITECTURE") {
            self.function.architecture = value;
        }
        if let Some(value) = read_env("TICKETDESK_FUNCTION_MEMORY_MB") {
            self.function.memory_mb = parse_u32("TICKETDESK_FUNCTION_MEMORY_MB", &value)?;
        }

        if let Some(value) = read_env("TICKETDESK_PROVISIONING_PROPAGATION_DELAY_SECS") {
            self.provisioning.propagation_delay_secs =
                parse_u64("TICKETDESK_PROVISIONING_PROPAGATION_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("TICKETDESK_PROVISIONING_TABLE_POLL_INTERVAL_MS") {
            self.provisioning.table_poll_interval_ms =
                parse_u64("TICKETDESK_PROVISIONING_TABLE_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("TICKETDESK_PROVISIONING_TABLE_POLL_ATTEMPTS") {
            self.provisioning.table_poll_attempts =
                parse_u32("TICKETDESK_PROVISIONING_TABLE_POLL_ATTEMPTS", &value)?;
        }

        let log_level =
            read_env("TICKETDESK_LOGGING_LEVEL").or_else(|| read_env("TICKETDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TICKETDESK_LOGGING_FORMAT").or_else(|| read_env("TICKETDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if overrides.region.is_some() {
            self.aws.region = overrides.region;
        }
        if let Some(agent_name) = overrides.agent_name {
            self.agent.name = agent_name;
        }
        if let Some(foundation_model) = overrides.foundation_model {
            self.agent.foundation_model = foundation_model;
        }
        if overrides.knowledge_base_id.is_some() {
            self.agent.knowledge_base_id = overrides.knowledge_base_id;
        }
        if let Some(table_name) = overrides.table_name {
            self.table.name = table_name;
        }
        if overrides.function_name.is_some() {
            self.function.name = overrides.function_name;
        }
        if let Some(artifact_path) = overrides.artifact_path {
            self.function.artifact_path = artifact_path;
        }
        if let Some(delay) = overrides.propagation_delay_secs {
            self.provisioning.propagation_delay_secs = delay;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_agent(&self.agent)?;
        validate_table(&self.table)?;
        validate_function(&self.function, &self.function_name())?;
        validate_provisioning(&self.provisioning)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Settings the deployed handler reads from its function environment.
#[derive(Clone, Debug)]
pub struct HandlerConfig {
    pub table_name: String,
    pub logging: LoggingConfig,
}

impl HandlerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let table_name = read_env(TABLE_NAME_ENV).ok_or_else(|| {
            ConfigError::Validation(format!("{TABLE_NAME_ENV} must be set for the ticket handler"))
        })?;

        let mut logging = LoggingConfig { level: "info".to_string(), format: LogFormat::Json };
        if let Some(value) = read_env("TICKETDESK_LOG_LEVEL") {
            logging.level = value;
        }
        if let Some(value) = read_env("TICKETDESK_LOG_FORMAT") {
            logging.format = value.parse()?;
        }
        validate_logging(&logging)?;

        Ok(Self { table_name, logging })
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("ticketdesk.toml"), PathBuf::from("config/ticketdesk.toml")]
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

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "agent.name is required (set it in ticketdesk.toml or TICKETDESK_AGENT_NAME)"
                .to_string(),
        ));
    }
    validate_agent_name(&agent.name)
        .map_err(|error| ConfigError::Validation(format!("agent.name: {error}")))?;

    if agent.foundation_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "agent.foundation_model is required (for example `anthropic.claude-3-haiku-20240307-v1:0`)"
                .to_string(),
        ));
    }

    if let Some(knowledge_base_id) = &agent.knowledge_base_id {
        if knowledge_base_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "agent.knowledge_base_id must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_table(table: &TableConfig) -> Result<(), ConfigError> {
    let name = table.name.as_str();
    let valid_chars =
        name.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
    if !(3..=255).contains(&name.len()) || !valid_chars {
        return Err(ConfigError::Validation(
            "table.name must be 3..=255 characters of [A-Za-z0-9_.-]".to_string(),
        ));
    }

    if table.key_attribute != TICKET_KEY_ATTRIBUTE {
        return Err(ConfigError::Validation(format!(
            "table.key_attribute must be `{TICKET_KEY_ATTRIBUTE}`, got `{}`",
            table.key_attribute
        )));
    }

    Ok(())
}

fn validate_function(function: &FunctionConfig, resolved_name: &str) -> Result<(), ConfigError> {
    let valid_chars =
        resolved_name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if resolved_name.is_empty() || resolved_name.len() > 64 || !valid_chars {
        return Err(ConfigError::Validation(
            "function.name must be 1..=64 characters of [A-Za-z0-9_-]".to_string(),
        ));
    }

    if function.timeout_secs == 0 || function.timeout_secs > 900 {
        return Err(ConfigError::Validation(
            "function.timeout_secs must be in range 1..=900".to_string(),
        ));
    }

    if !(128..=10_240).contains(&function.memory_mb) {
        return Err(ConfigError::Validation(
            "function.memory_mb must be in range 128..=10240".to_string(),
        ));
    }

    match function.architecture.as_str() {
        "x86_64" | "arm64" => {}
        _ => {
            return Err(ConfigError::Validation(
                "function.architecture must be one of x86_64|arm64".to_string(),
            ))
        }
    }

    if function.runtime.trim().is_empty() || function.handler.trim().is_empty() {
        return Err(ConfigError::Validation(
            "function.runtime and function.handler must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_provisioning(provisioning: &ProvisioningConfig) -> Result<(), ConfigError> {
    if provisioning.table_poll_attempts == 0 {
        return Err(ConfigError::Validation(
            "provisioning.table_poll_attempts must be greater than zero".to_string(),
        ));
    }

    if provisioning.propagation_delay_secs > 300 {
        return Err(ConfigError::Validation(
            "provisioning.propagation_delay_secs must be in range 0..=300".to_string(),
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
    aws: Option<AwsPatch>,
    agent: Option<AgentPatch>,
    table: Option<TablePatch>,
    function: Option<FunctionPatch>,
    provisioning: Option<ProvisioningPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AwsPatch {
    region: Option<String>,
    profile: Option<String>,
    endpoint_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    name: Option<String>,
    foundation_model: Option<String>,
    knowledge_base_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TablePatch {
    name: Option<String>,
    key_attribute: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionPatch {
    name: Option<String>,
    artifact_path: Option<PathBuf>,
    runtime: Option<String>,
    handler: Option<String>,
    timeout_secs: Option<u32>,
    architecture: Option<String>,
    memory_mb: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ProvisioningPatch {
    propagation_delay_secs: Option<u64>,
    table_poll_interval_ms: Option<u64>,
    table_poll_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
