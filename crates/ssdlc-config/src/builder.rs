use std::path::PathBuf;

use ssdlc_utils::error::ConfigError;

use super::{Config, ConfigSource, EscalationMode, LlmProvider, StepMode};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// Skips discovery entirely: no file, no environment.
    ///
    /// ```rust
    /// use ssdlc_config::{Config, LlmProvider};
    ///
    /// let config = Config::builder()
    ///     .provider(LlmProvider::DryRun)
    ///     .max_attempts(2)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.retry.max_attempts, 2);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Fluent builder for [`Config`].
///
/// Values set here are attributed to [`ConfigSource::Programmatic`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    provider: Option<LlmProvider>,
    model: Option<String>,
    max_attempts: Option<u32>,
    base_delay_secs: Option<u64>,
    max_delay_secs: Option<u64>,
    max_jitter_secs: Option<u64>,
    extra_wait_secs: Option<u64>,
    use_intent_model: Option<bool>,
    output_dir: Option<PathBuf>,
    step_mode: Option<StepMode>,
    escalation: Option<EscalationMode>,
    write_receipts: Option<bool>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn provider(mut self, provider: LlmProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    #[must_use]
    pub fn base_delay_secs(mut self, secs: u64) -> Self {
        self.base_delay_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn max_delay_secs(mut self, secs: u64) -> Self {
        self.max_delay_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn max_jitter_secs(mut self, secs: u64) -> Self {
        self.max_jitter_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn extra_wait_secs(mut self, secs: u64) -> Self {
        self.extra_wait_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn use_intent_model(mut self, enabled: bool) -> Self {
        self.use_intent_model = Some(enabled);
        self
    }

    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn step_mode(mut self, mode: StepMode) -> Self {
        self.step_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn escalation(mut self, mode: EscalationMode) -> Self {
        self.escalation = Some(mode);
        self
    }

    #[must_use]
    pub fn write_receipts(mut self, enabled: bool) -> Self {
        self.write_receipts = Some(enabled);
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        let mut mark = |key: &str| {
            config
                .source_attribution
                .insert(key.to_string(), ConfigSource::Programmatic);
        };

        if self.provider.is_some() {
            mark("llm.provider");
        }
        if self.model.is_some() {
            mark("llm.model");
        }
        if self.max_attempts.is_some() {
            mark("retry.max_attempts");
        }
        if self.base_delay_secs.is_some() {
            mark("retry.base_delay_secs");
        }
        if self.max_delay_secs.is_some() {
            mark("retry.max_delay_secs");
        }
        if self.max_jitter_secs.is_some() {
            mark("retry.max_jitter_secs");
        }
        if self.extra_wait_secs.is_some() {
            mark("retry.extra_wait_secs");
        }
        if self.use_intent_model.is_some() {
            mark("intent.use_model");
        }
        if self.output_dir.is_some() {
            mark("workflow.output_dir");
        }
        if self.step_mode.is_some() {
            mark("workflow.step_mode");
        }
        if self.escalation.is_some() {
            mark("workflow.escalation");
        }
        if self.write_receipts.is_some() {
            mark("workflow.write_receipts");
        }

        if let Some(v) = self.provider {
            config.llm.provider = v;
        }
        if let Some(v) = self.model {
            config.llm.model = v;
        }
        if let Some(v) = self.max_attempts {
            config.retry.max_attempts = v;
        }
        if let Some(v) = self.base_delay_secs {
            config.retry.base_delay_secs = v;
        }
        if let Some(v) = self.max_delay_secs {
            config.retry.max_delay_secs = v;
        }
        if let Some(v) = self.max_jitter_secs {
            config.retry.max_jitter_secs = v;
        }
        if let Some(v) = self.extra_wait_secs {
            config.retry.extra_wait_secs = v;
        }
        if let Some(v) = self.use_intent_model {
            config.intent.use_model = v;
        }
        if let Some(v) = self.output_dir {
            config.workflow.output_dir = v;
        }
        if let Some(v) = self.step_mode {
            config.workflow.step_mode = v;
        }
        if let Some(v) = self.escalation {
            config.workflow.escalation = v;
        }
        if let Some(v) = self.write_receipts {
            config.workflow.write_receipts = v;
        }

        config.validate()?;
        Ok(config)
    }
}
