use super::discovery::TRACKED_KEYS;
use super::{Config, ConfigSource};

impl Config {
    /// Value of a tracked key rendered as a string.
    #[must_use]
    pub fn value_of(&self, key: &str) -> Option<String> {
        let value = match key {
            "llm.provider" => self.llm.provider.as_str().to_string(),
            "llm.model" => self.llm.model.clone(),
            "llm.api_key_env" => self.llm.api_key_env.clone(),
            "llm.base_url" => self.llm.base_url.clone(),
            "llm.timeout_secs" => self.llm.timeout_secs.to_string(),
            "retry.max_attempts" => self.retry.max_attempts.to_string(),
            "retry.base_delay_secs" => self.retry.base_delay_secs.to_string(),
            "retry.max_delay_secs" => self.retry.max_delay_secs.to_string(),
            "retry.max_jitter_secs" => self.retry.max_jitter_secs.to_string(),
            "retry.extra_wait_secs" => self.retry.extra_wait_secs.to_string(),
            "intent.use_model" => self.intent.use_model.to_string(),
            "intent.timeout_secs" => self.intent.timeout_secs.to_string(),
            "workflow.output_dir" => self.workflow.output_dir.display().to_string(),
            "workflow.step_mode" => self.workflow.step_mode.as_str().to_string(),
            "workflow.escalation" => self.workflow.escalation.as_str().to_string(),
            "workflow.write_receipts" => self.workflow.write_receipts.to_string(),
            "logging.verbose" => self.logging.verbose.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Effective configuration as `(key, value, source)` rows in a stable order.
    #[must_use]
    pub fn effective_config(&self) -> Vec<(String, String, String)> {
        TRACKED_KEYS
            .iter()
            .filter_map(|key| {
                let value = self.value_of(key)?;
                let source = self
                    .source_attribution
                    .get(*key)
                    .unwrap_or(&ConfigSource::Default)
                    .to_string();
                Some(((*key).to_string(), value, source))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_config_covers_every_tracked_key() {
        let config = Config::default();
        let rows = config.effective_config();
        assert_eq!(rows.len(), TRACKED_KEYS.len());
        assert_eq!(rows[0].0, "llm.provider");
        assert_eq!(rows[0].1, "gemini");
        assert_eq!(rows[0].2, "default");
    }

    #[test]
    fn test_value_of_unknown_key() {
        assert!(Config::default().value_of("retry.nope").is_none());
    }
}
