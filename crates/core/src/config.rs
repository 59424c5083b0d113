use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crm::{PipelineStages, DEAL_TO_CONTACT_ASSOCIATION_TYPE};
use crate::pricing::PriceTable;
use crate::token::DEFAULT_TTL_SECONDS;

pub const MIN_TOKEN_SECRET_BYTES: usize = 16;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub crm: CrmConfig,
    pub email: EmailConfig,
    pub token: TokenConfig,
    pub pricing: PriceTable,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub base_url: String,
    pub access_token: SecretString,
    pub timeout_secs: u64,
    pub pipeline_id: String,
    pub stage_new: String,
    pub stage_quote_sent: String,
    pub stage_accepted: String,
    pub association_type_id: u32,
}

impl CrmConfig {
    pub fn stages(&self) -> PipelineStages {
        PipelineStages {
            pipeline_id: self.pipeline_id.clone(),
            new: self.stage_new.clone(),
            quote_sent: self.stage_quote_sent.clone(),
            accepted: self.stage_accepted.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub from_email: String,
    pub template_id: String,
    pub sandbox: bool,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub secret: SecretString,
    pub ttl_secs: i64,
    pub accept_url_base: String,
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
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub crm_base_url: Option<String>,
    pub crm_access_token: Option<String>,
    pub email_base_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_sandbox: Option<bool>,
    pub token_secret: Option<String>,
    pub token_ttl_secs: Option<i64>,
    pub accept_url_base: Option<String>,
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
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            crm: CrmConfig {
                base_url: "https://api.hubapi.com".to_string(),
                access_token: String::new().into(),
                timeout_secs: 10,
                pipeline_id: String::new(),
                stage_new: String::new(),
                stage_quote_sent: String::new(),
                stage_accepted: String::new(),
                association_type_id: DEAL_TO_CONTACT_ASSOCIATION_TYPE,
            },
            email: EmailConfig {
                base_url: "https://api.sendgrid.com".to_string(),
                api_key: String::new().into(),
                from_email: String::new(),
                template_id: String::new(),
                sandbox: false,
                timeout_secs: 10,
            },
            token: TokenConfig {
                secret: String::new().into(),
                ttl_secs: DEFAULT_TTL_SECONDS,
                accept_url_base: "http://localhost:8080/api/accept".to_string(),
            },
            pricing: PriceTable::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("qnc.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(crm) = patch.crm {
            if let Some(base_url) = crm.base_url {
                self.crm.base_url = base_url;
            }
            if let Some(access_token) = crm.access_token {
                self.crm.access_token = secret_value(access_token);
            }
            if let Some(timeout_secs) = crm.timeout_secs {
                self.crm.timeout_secs = timeout_secs;
            }
            if let Some(pipeline_id) = crm.pipeline_id {
                self.crm.pipeline_id = pipeline_id;
            }
            if let Some(stage_new) = crm.stage_new {
                self.crm.stage_new = stage_new;
            }
            if let Some(stage_quote_sent) = crm.stage_quote_sent {
                self.crm.stage_quote_sent = stage_quote_sent;
            }
            if let Some(stage_accepted) = crm.stage_accepted {
                self.crm.stage_accepted = stage_accepted;
            }
            if let Some(association_type_id) = crm.association_type_id {
                self.crm.association_type_id = association_type_id;
            }
        }

        if let Some(email) = patch.email {
            if let Some(base_url) = email.base_url {
                self.email.base_url = base_url;
            }
            if let Some(api_key) = email.api_key {
                self.email.api_key = secret_value(api_key);
            }
            if let Some(from_email) = email.from_email {
                self.email.from_email = from_email;
            }
            if let Some(template_id) = email.template_id {
                self.email.template_id = template_id;
            }
            if let Some(sandbox) = email.sandbox {
                self.email.sandbox = sandbox;
            }
            if let Some(timeout_secs) = email.timeout_secs {
                self.email.timeout_secs = timeout_secs;
            }
        }

        if let Some(token) = patch.token {
            if let Some(secret) = token.secret {
                self.token.secret = secret_value(secret);
            }
            if let Some(ttl_secs) = token.ttl_secs {
                self.token.ttl_secs = ttl_secs;
            }
            if let Some(accept_url_base) = token.accept_url_base {
                self.token.accept_url_base = accept_url_base;
            }
        }

        // File tables are merged over the built-in prices tier by tier.
        if let Some(pricing) = patch.pricing {
            if let Some(currency) = pricing.currency {
                self.pricing.set_currency(currency);
            }
            for (service_type, tiers) in pricing.services {
                for (bedroom_tier, amount) in tiers {
                    self.pricing.set_price(service_type.clone(), bedroom_tier, amount);
                }
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
        if let Some(value) = read_env("QNC_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("QNC_SERVER_PORT") {
            self.server.port = parse_u16("QNC_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("QNC_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("QNC_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("QNC_CRM_BASE_URL") {
            self.crm.base_url = value;
        }
        if let Some(value) = read_env("QNC_CRM_ACCESS_TOKEN") {
            self.crm.access_token = secret_value(value);
        }
        if let Some(value) = read_env("QNC_CRM_TIMEOUT_SECS") {
            self.crm.timeout_secs = parse_u64("QNC_CRM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("QNC_CRM_PIPELINE_ID") {
            self.crm.pipeline_id = value;
        }
        if let Some(value) = read_env("QNC_CRM_STAGE_NEW") {
            self.crm.stage_new = value;
        }
        if let Some(value) = read_env("QNC_CRM_STAGE_QUOTE_SENT") {
            self.crm.stage_quote_sent = value;
        }
        if let Some(value) = read_env("QNC_CRM_STAGE_ACCEPTED") {
            self.crm.stage_accepted = value;
        }
        if let Some(value) = read_env("QNC_CRM_ASSOCIATION_TYPE_ID") {
            self.crm.association_type_id = parse_u32("QNC_CRM_ASSOCIATION_TYPE_ID", &value)?;
        }

        if let Some(value) = read_env("QNC_EMAIL_BASE_URL") {
            self.email.base_url = value;
        }
        if let Some(value) = read_env("QNC_EMAIL_API_KEY") {
            self.email.api_key = secret_value(value);
        }
        if let Some(value) = read_env("QNC_EMAIL_FROM_EMAIL") {
            self.email.from_email = value;
        }
        if let Some(value) = read_env("QNC_EMAIL_TEMPLATE_ID") {
            self.email.template_id = value;
        }
        if let Some(value) = read_env("QNC_EMAIL_SANDBOX") {
            self.email.sandbox = parse_bool("QNC_EMAIL_SANDBOX", &value)?;
        }
        if let Some(value) = read_env("QNC_EMAIL_TIMEOUT_SECS") {
            self.email.timeout_secs = parse_u64("QNC_EMAIL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("QNC_TOKEN_SECRET") {
            self.token.secret = secret_value(value);
        }
        if let Some(value) = read_env("QNC_TOKEN_TTL_SECS") {
            self.token.ttl_secs = parse_i64("QNC_TOKEN_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("QNC_TOKEN_ACCEPT_URL_BASE") {
            self.token.accept_url_base = value;
        }

        if let Some(value) = read_env("QNC_PRICING_CURRENCY") {
            self.pricing.set_currency(value);
        }

        let log_level = read_env("QNC_LOGGING_LEVEL").or_else(|| read_env("QNC_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("QNC_LOGGING_FORMAT").or_else(|| read_env("QNC_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(crm_base_url) = overrides.crm_base_url {
            self.crm.base_url = crm_base_url;
        }
        if let Some(crm_access_token) = overrides.crm_access_token {
            self.crm.access_token = secret_value(crm_access_token);
        }
        if let Some(email_base_url) = overrides.email_base_url {
            self.email.base_url = email_base_url;
        }
        if let Some(email_api_key) = overrides.email_api_key {
            self.email.api_key = secret_value(email_api_key);
        }
        if let Some(email_sandbox) = overrides.email_sandbox {
            self.email.sandbox = email_sandbox;
        }
        if let Some(token_secret) = overrides.token_secret {
            self.token.secret = secret_value(token_secret);
        }
        if let Some(token_ttl_secs) = overrides.token_ttl_secs {
            self.token.ttl_secs = token_ttl_secs;
        }
        if let Some(accept_url_base) = overrides.accept_url_base {
            self.token.accept_url_base = accept_url_base;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_crm(&self.crm)?;
        validate_email(&self.email)?;
        validate_token(&self.token)?;
        validate_pricing(&self.pricing)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("qnc.toml"), PathBuf::from("config/qnc.toml")]
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

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address is required".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    validate_http_url("crm.base_url", &crm.base_url)?;

    if crm.access_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.access_token is required. Create a HubSpot private app with crm.objects.contacts and crm.objects.deals scopes (QNC_CRM_ACCESS_TOKEN)".to_string(),
        ));
    }

    validate_timeout("crm.timeout_secs", crm.timeout_secs)?;

    let stage_keys = [
        ("crm.pipeline_id", &crm.pipeline_id, "QNC_CRM_PIPELINE_ID"),
        ("crm.stage_new", &crm.stage_new, "QNC_CRM_STAGE_NEW"),
        ("crm.stage_quote_sent", &crm.stage_quote_sent, "QNC_CRM_STAGE_QUOTE_SENT"),
        ("crm.stage_accepted", &crm.stage_accepted, "QNC_CRM_STAGE_ACCEPTED"),
    ];
    for (key, value, env_key) in stage_keys {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{key} is required. Copy it from HubSpot > Settings > Objects > Deals > Pipelines ({env_key})"
            )));
        }
    }

    if crm.association_type_id == 0 {
        return Err(ConfigError::Validation(
            "crm.association_type_id must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_email(email: &EmailConfig) -> Result<(), ConfigError> {
    validate_http_url("email.base_url", &email.base_url)?;

    if email.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "email.api_key is required (QNC_EMAIL_API_KEY)".to_string(),
        ));
    }

    if !email.from_email.contains('@') {
        return Err(ConfigError::Validation(
            "email.from_email must be a verified sender address (QNC_EMAIL_FROM_EMAIL)"
                .to_string(),
        ));
    }

    if email.template_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "email.template_id is required. Use the dynamic template id (`d-...`) (QNC_EMAIL_TEMPLATE_ID)"
                .to_string(),
        ));
    }

    validate_timeout("email.timeout_secs", email.timeout_secs)
}

fn validate_token(token: &TokenConfig) -> Result<(), ConfigError> {
    let secret = token.secret.expose_secret();
    if secret.is_empty() {
        return Err(ConfigError::Validation(
            "token.secret is required (QNC_TOKEN_SECRET)".to_string(),
        ));
    }
    if secret.len() < MIN_TOKEN_SECRET_BYTES {
        return Err(ConfigError::Validation(format!(
            "token.secret must be at least {MIN_TOKEN_SECRET_BYTES} bytes long"
        )));
    }

    if token.ttl_secs <= 0 {
        return Err(ConfigError::Validation(
            "token.ttl_secs must be greater than zero".to_string(),
        ));
    }

    validate_http_url("token.accept_url_base", &token.accept_url_base)
}

fn validate_pricing(pricing: &PriceTable) -> Result<(), ConfigError> {
    if pricing.currency().trim().is_empty() {
        return Err(ConfigError::Validation("pricing.currency must not be empty".to_string()));
    }
    pricing.validate().map_err(|error| ConfigError::Validation(format!("pricing: {error}")))
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

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn validate_timeout(key: &str, timeout_secs: u64) -> Result<(), ConfigError> {
    if timeout_secs == 0 || timeout_secs > 300 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=300")));
    }
    Ok(())
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

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    crm: Option<CrmPatch>,
    email: Option<EmailPatch>,
    token: Option<TokenPatch>,
    pricing: Option<PricingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    base_url: Option<String>,
    access_token: Option<String>,
    timeout_secs: Option<u64>,
    pipeline_id: Option<String>,
    stage_new: Option<String>,
    stage_quote_sent: Option<String>,
    stage_accepted: Option<String>,
    association_type_id: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    from_email: Option<String>,
    template_id: Option<String>,
    sandbox: Option<bool>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenPatch {
    secret: Option<String>,
    ttl_secs: Option<i64>,
    accept_url_base: Option<String>,
}

/// `[pricing]` holds `currency` plus one sub-table per service type,
/// e.g. `[pricing.standard] studio = 89.00`.
#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    currency: Option<String>,
    #[serde(flatten)]
    services: BTreeMap<String, BTreeMap<String, Decimal>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const REQUIRED_VARS: [(&str, &str); 9] = [
        ("QNC_CRM_ACCESS_TOKEN", "pat-na1-test"),
        ("QNC_CRM_PIPELINE_ID", "default"),
        ("QNC_CRM_STAGE_NEW", "appointmentscheduled"),
        ("QNC_CRM_STAGE_QUOTE_SENT", "presentationscheduled"),
        ("QNC_CRM_STAGE_ACCEPTED", "closedwon"),
        ("QNC_EMAIL_API_KEY", "SG.test"),
        ("QNC_EMAIL_FROM_EMAIL", "quotes@example.com"),
        ("QNC_EMAIL_TEMPLATE_ID", "d-123"),
        ("QNC_TOKEN_SECRET", "a-test-secret-of-32-bytes-length"),
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn set_required_vars() {
        for (key, value) in REQUIRED_VARS {
            env::set_var(key, value);
        }
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn clear_required_vars() {
        for (key, _) in REQUIRED_VARS {
            env::remove_var(key);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::remove_var("QNC_CRM_ACCESS_TOKEN");
        env::set_var("TEST_HUBSPOT_TOKEN", "pat-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("qnc.toml");
            fs::write(
                &path,
                r#"
[crm]
access_token = "${TEST_HUBSPOT_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.crm.access_token.expose_secret() == "pat-from-env",
                "crm token should be interpolated from environment",
            )
        })();

        clear_required_vars();
        clear_vars(&["TEST_HUBSPOT_TOKEN"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("qnc.toml");
        fs::write(&path, "[token]\nsecret = \"${QNC_TEST_UNSET_VARIABLE}\"\n")
            .map_err(|err| err.to_string())?;

        let error = match AppConfig::load(LoadOptions {
            config_path: Some(path),
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected interpolation failure".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(
                error,
                ConfigError::MissingEnvInterpolation { ref var } if var == "QNC_TEST_UNSET_VARIABLE"
            ),
            "error should name the missing variable",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("QNC_LOG_LEVEL", "warn");
        env::set_var("QNC_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )
        })();

        clear_required_vars();
        clear_vars(&["QNC_LOG_LEVEL", "QNC_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("QNC_CRM_BASE_URL", "http://crm-from-env.test");
        env::set_var("QNC_TOKEN_TTL_SECS", "600");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("qnc.toml");
            fs::write(
                &path,
                r#"
[crm]
base_url = "http://crm-from-file.test"
timeout_secs = 5

[token]
ttl_secs = 120
accept_url_base = "https://from-file.test/api/accept"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    accept_url_base: Some("https://from-override.test/api/accept".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.token.accept_url_base == "https://from-override.test/api/accept",
                "override accept url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.crm.base_url == "http://crm-from-env.test",
                "env crm base url should win over file",
            )?;
            ensure(config.token.ttl_secs == 600, "env ttl should win over file")?;
            ensure(config.crm.timeout_secs == 5, "file timeout should win over default")?;
            ensure(config.email.timeout_secs == 10, "email timeout should keep its default")
        })();

        clear_required_vars();
        clear_vars(&["QNC_CRM_BASE_URL", "QNC_TOKEN_TTL_SECS"]);
        result
    }

    #[test]
    fn pricing_file_tables_merge_over_defaults() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("qnc.toml");
            fs::write(
                &path,
                r#"
[pricing]
currency = "EUR"

[pricing.standard]
studio = 95.50

[pricing.move_out]
studio = "210.00"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let studio = config
                .pricing
                .quote("standard", "studio")
                .map_err(|err| format!("standard studio should be priced: {err}"))?;
            ensure(studio.amount == Decimal::new(9_550, 2), "file price should replace default")?;
            ensure(studio.currency == "EUR", "file currency should apply")?;
            ensure(studio.formatted() == "€95.50", "eur amount should format with symbol")?;

            let untouched = config
                .pricing
                .quote("deep", "4br")
                .map_err(|err| format!("deep 4br should keep default: {err}"))?;
            ensure(untouched.amount == Decimal::new(27_900, 2), "unlisted tiers keep defaults")?;
            ensure(
                config.pricing.quote("move_out", "studio").is_ok(),
                "new service tables are added",
            )
        })();

        clear_required_vars();
        result
    }

    #[test]
    fn negative_price_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("qnc.toml");
            fs::write(&path, "[pricing.deep]\n2br = -1\n").map_err(|err| err.to_string())?;

            let error = match AppConfig::load(LoadOptions {
                config_path: Some(path),
                ..LoadOptions::default()
            }) {
                Ok(_) => return Err("expected negative price to be rejected".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("deep.2br")),
                "validation failure should name the offending price",
            )
        })();

        clear_required_vars();
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::remove_var("QNC_CRM_STAGE_QUOTE_SENT");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("crm.stage_quote_sent")
            );
            ensure(has_message, "validation failure should mention crm.stage_quote_sent")
        })();

        clear_required_vars();
        result
    }

    #[test]
    fn short_token_secret_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("QNC_TOKEN_SECRET", "dev_secret");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected short secret to be rejected".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("token.secret")),
                "validation failure should mention token.secret",
            )
        })();

        clear_required_vars();
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("QNC_SERVER_PORT", "eighty");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected invalid port to be rejected".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "QNC_SERVER_PORT"),
                "error should name the env key",
            )
        })();

        clear_required_vars();
        clear_vars(&["QNC_SERVER_PORT"]);
        result
    }

    #[test]
    fn required_file_must_exist() -> Result<(), String> {
        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let missing = dir.path().join("absent.toml");

        let error = match AppConfig::load(LoadOptions {
            config_path: Some(missing.clone()),
            require_file: true,
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected missing file error".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::MissingConfigFile(ref path) if *path == missing),
            "error should carry the expected path",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("pat-na1-test"), "debug output should not contain crm token")?;
            ensure(!debug.contains("SG.test"), "debug output should not contain email key")?;
            ensure(
                !debug.contains("a-test-secret-of-32-bytes-length"),
                "debug output should not contain token secret",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(config.crm.stages().quote_sent == "presentationscheduled", "stages are mapped")
        })();

        clear_required_vars();
        result
    }
}
