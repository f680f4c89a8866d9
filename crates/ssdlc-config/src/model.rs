use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ssdlc_utils::error::ConfigError;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Command-line flag (highest precedence)
    Cli,
    /// Environment variable
    Env,
    /// Configuration file at the given path
    ConfigFile(PathBuf),
    /// `Config::builder()`
    Programmatic,
    /// Built-in default
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::Env => write!(f, "env"),
            Self::ConfigFile(path) => write!(f, "config ({})", path.display()),
            Self::Programmatic => write!(f, "programmatic"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Which LLM backend drives stages and intent classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    #[default]
    Gemini,
    /// Canned responses, no network
    DryRun,
}

impl LlmProvider {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::DryRun => "dry-run",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gemini" => Ok(Self::Gemini),
            "dry-run" | "dry_run" => Ok(Self::DryRun),
            other => Err(ConfigError::InvalidValue {
                key: "llm.provider".to_string(),
                value: format!("unknown provider '{other}' (expected 'gemini' or 'dry-run')"),
            }),
        }
    }
}

/// How far one user turn drives the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepMode {
    /// Keep executing routed stages until `Complete` or an abort
    #[default]
    UntilComplete,
    /// Execute at most one stage per turn
    SingleStage,
}

impl StepMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UntilComplete => "until-complete",
            Self::SingleStage => "single-stage",
        }
    }
}

impl FromStr for StepMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "until-complete" => Ok(Self::UntilComplete),
            "single-stage" => Ok(Self::SingleStage),
            other => Err(ConfigError::InvalidValue {
                key: "workflow.step_mode".to_string(),
                value: format!(
                    "unknown step mode '{other}' (expected 'until-complete' or 'single-stage')"
                ),
            }),
        }
    }
}

/// Who answers when retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscalationMode {
    /// Ask the operator on the terminal
    #[default]
    Prompt,
    /// Always continue without the stage's document
    Continue,
    /// Always abort the stage
    Abort,
}

impl EscalationMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Continue => "continue",
            Self::Abort => "abort",
        }
    }
}

impl FromStr for EscalationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(Self::Prompt),
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            other => Err(ConfigError::InvalidValue {
                key: "workflow.escalation".to_string(),
                value: format!(
                    "unknown escalation mode '{other}' (expected 'prompt', 'continue' or 'abort')"
                ),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            model: DEFAULT_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 300,
        }
    }
}

impl LlmSettings {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry policy knobs.
///
/// `max_attempts` counts total invocations, the first one included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub max_jitter_secs: u64,
    pub extra_wait_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 10,
            max_delay_secs: 120,
            max_jitter_secs: 5,
            extra_wait_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentSettings {
    /// Ask the model first; when false only the keyword fallback runs
    pub use_model: bool,
    pub timeout_secs: u64,
}

impl Default for IntentSettings {
    fn default() -> Self {
        Self {
            use_model: true,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Directory holding the persisted stage documents
    pub output_dir: PathBuf,
    pub step_mode: StepMode,
    pub escalation: EscalationMode,
    pub write_receipts: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            step_mode: StepMode::UntilComplete,
            escalation: EscalationMode::Prompt,
            write_receipts: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    pub verbose: bool,
}

/// Effective configuration after precedence has been applied.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub llm: LlmSettings,
    pub retry: RetrySettings,
    pub intent: IntentSettings,
    pub workflow: WorkflowSettings,
    pub logging: LoggingSettings,
    /// Source of every tracked key, e.g. `"retry.max_attempts"`
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// `[llm]` as written in the TOML file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct LlmSection {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RetrySection {
    pub max_attempts: Option<u32>,
    pub base_delay_secs: Option<u64>,
    pub max_delay_secs: Option<u64>,
    pub max_jitter_secs: Option<u64>,
    pub extra_wait_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct IntentSection {
    pub use_model: Option<bool>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct WorkflowSection {
    pub output_dir: Option<PathBuf>,
    pub step_mode: Option<String>,
    pub escalation: Option<String>,
    pub write_receipts: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct LoggingSection {
    pub verbose: Option<bool>,
}

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlConfig {
    pub llm: Option<LlmSection>,
    pub retry: Option<RetrySection>,
    pub intent: Option<IntentSection>,
    pub workflow: Option<WorkflowSection>,
    pub logging: Option<LoggingSection>,
}
