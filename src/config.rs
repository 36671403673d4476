use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::Path;

use crate::quotas::MAX_LOOKBACK_MINUTES;
use crate::types::{Config, EmailConfig, LimitOverrides, NotifyPolicy, OverridesFile, ThresholdOverrides};

pub const DEFAULT_SERVICES: &str = "ec2,elasticloadbalancing,lambda,rds,vpc";

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn load_config() -> Result<Config> {
    load_config_with_env(&SystemEnvironment)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_percent<E: EnvironmentProvider>(env: &E, key: &str, default: f64) -> Result<f64> {
    let raw = env.get_var(key).unwrap_or_else(|| default.to_string());
    let value: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid {}", key))?;
    if !(value > 0.0 && value.is_finite()) {
        return Err(anyhow!("{} must be a positive percentage, got {}", key, raw));
    }
    Ok(value)
}

fn recipients<E: EnvironmentProvider>(env: &E, key: &str, default: Vec<String>) -> Result<Vec<String>> {
    match env.get_var(key) {
        None => Ok(default),
        Some(raw) => {
            let list = split_list(&raw);
            if list.is_empty() {
                return Err(anyhow!("{} must list at least one address", key));
            }
            Ok(list)
        }
    }
}

pub fn load_overrides_file(path: &Path) -> Result<OverridesFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read OVERRIDES_FILE {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid OVERRIDES_FILE {}", path.display()))
}

pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<Config> {
    let services = split_list(&env.get_var("SERVICES").unwrap_or_else(|| DEFAULT_SERVICES.to_string()));
    if services.is_empty() {
        return Err(anyhow!("SERVICES must name at least one service code (comma-separated)"));
    }

    let warning_threshold = parse_percent(env, "WARNING_THRESHOLD", 80.0)?;
    let critical_threshold = parse_percent(env, "CRITICAL_THRESHOLD", 99.0)?;
    if warning_threshold > critical_threshold {
        return Err(anyhow!(
            "WARNING_THRESHOLD ({}) must not exceed CRITICAL_THRESHOLD ({})",
            warning_threshold,
            critical_threshold
        ));
    }

    let mut overrides = match env.get_var("OVERRIDES_FILE") {
        Some(path) => load_overrides_file(Path::new(&path))?,
        None => OverridesFile::default(),
    };
    if let Some(raw) = env.get_var("LIMIT_OVERRIDES") {
        overrides.limit_overrides =
            serde_json::from_str::<LimitOverrides>(&raw).context("Invalid LIMIT_OVERRIDES")?;
    }
    if let Some(raw) = env.get_var("THRESHOLD_OVERRIDES") {
        overrides.threshold_overrides =
            serde_json::from_str::<ThresholdOverrides>(&raw).context("Invalid THRESHOLD_OVERRIDES")?;
    }

    let defaults = EmailConfig::default();
    let email = EmailConfig {
        sender: env.get_var("EMAIL_SOURCE").unwrap_or(defaults.sender),
        warning_subject: env.get_var("EMAIL_SUBJECT_WARNING").unwrap_or(defaults.warning_subject),
        critical_subject: env.get_var("EMAIL_SUBJECT_CRITICAL").unwrap_or(defaults.critical_subject),
        warning_recipients: recipients(env, "EMAIL_TO_WARNING", defaults.warning_recipients)?,
        critical_recipients: recipients(env, "EMAIL_TO_CRITICAL", defaults.critical_recipients)?,
    };

    let notify_policy = match env.get_var("ISOLATE_NOTIFICATIONS") {
        Some(v) if matches!(v.as_str(), "1" | "true" | "TRUE" | "True") => NotifyPolicy::Isolated,
        _ => NotifyPolicy::FailFast,
    };

    let usage_lookback_minutes: i64 = env.get_var("USAGE_LOOKBACK_MINUTES")
        .unwrap_or_else(|| "15".to_string())
        .parse()
        .ok()
        .filter(|m| (1..=MAX_LOOKBACK_MINUTES).contains(m))
        .unwrap_or(15);

    Ok(Config {
        services,
        warning_threshold,
        critical_threshold,
        limit_overrides: overrides.limit_overrides,
        threshold_overrides: overrides.threshold_overrides,
        email,
        notify_policy,
        usage_lookback_minutes,
    })
}
