use ssdlc_utils::error::ConfigError;

use super::Config;

const MAX_ATTEMPTS_LIMIT: u32 = 10;
const MAX_DELAY_LIMIT_SECS: u64 = 3600;

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

impl Config {
    /// Validate configuration values
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be greater than 0"));
        }
        if retry.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(invalid(
                "retry.max_attempts",
                format!("exceeds maximum limit of {MAX_ATTEMPTS_LIMIT}"),
            ));
        }
        if retry.max_delay_secs > MAX_DELAY_LIMIT_SECS {
            return Err(invalid(
                "retry.max_delay_secs",
                format!("exceeds maximum limit of {MAX_DELAY_LIMIT_SECS} seconds"),
            ));
        }
        if retry.base_delay_secs > retry.max_delay_secs {
            return Err(invalid(
                "retry.base_delay_secs",
                format!(
                    "{} is larger than retry.max_delay_secs ({})",
                    retry.base_delay_secs, retry.max_delay_secs
                ),
            ));
        }
        if retry.extra_wait_secs > MAX_DELAY_LIMIT_SECS {
            return Err(invalid(
                "retry.extra_wait_secs",
                format!("exceeds maximum limit of {MAX_DELAY_LIMIT_SECS} seconds"),
            ));
        }

        if self.llm.timeout_secs == 0 {
            return Err(invalid("llm.timeout_secs", "must be greater than 0"));
        }
        if self.intent.timeout_secs == 0 {
            return Err(invalid("intent.timeout_secs", "must be greater than 0"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(invalid("llm.model", "must not be empty"));
        }
        if self.llm.api_key_env.trim().is_empty() {
            return Err(invalid("llm.api_key_env", "must not be empty"));
        }
        if !self.llm.base_url.starts_with("http://") && !self.llm.base_url.starts_with("https://")
        {
            return Err(invalid(
                "llm.base_url",
                format!("'{}' is not an http(s) URL", self.llm.base_url),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of(err: ConfigError) -> String {
        match err {
            ConfigError::InvalidValue { key, .. } => key,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_max_attempts_bounds() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert_eq!(key_of(config.validate().unwrap_err()), "retry.max_attempts");

        config.retry.max_attempts = 11;
        assert_eq!(key_of(config.validate().unwrap_err()), "retry.max_attempts");

        config.retry.max_attempts = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_base_delay_must_not_exceed_cap() {
        let mut config = Config::default();
        config.retry.base_delay_secs = 200;
        assert_eq!(key_of(config.validate().unwrap_err()), "retry.base_delay_secs");
    }

    #[test]
    fn test_max_delay_limit() {
        let mut config = Config::default();
        config.retry.max_delay_secs = 3601;
        assert_eq!(key_of(config.validate().unwrap_err()), "retry.max_delay_secs");
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = Config::default();
        config.llm.timeout_secs = 0;
        assert_eq!(key_of(config.validate().unwrap_err()), "llm.timeout_secs");

        let mut config = Config::default();
        config.intent.timeout_secs = 0;
        assert_eq!(key_of(config.validate().unwrap_err()), "intent.timeout_secs");
    }

    #[test]
    fn test_base_url_scheme() {
        let mut config = Config::default();
        config.llm.base_url = "ftp://example.com".to_string();
        assert_eq!(key_of(config.validate().unwrap_err()), "llm.base_url");
    }
}
