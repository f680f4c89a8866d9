use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use ssdlc_utils::error::ConfigError;
use tracing::debug;

use super::{CliArgs, Config, ConfigSource, EscalationMode, LlmProvider, StepMode, TomlConfig};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "SSDLC_CONFIG";

/// Environment variable overriding `llm.provider`.
const PROVIDER_ENV_VAR: &str = "SSDLC_LLM_PROVIDER";

/// Keys tracked for source attribution, in display order.
pub(crate) const TRACKED_KEYS: &[&str] = &[
    "llm.provider",
    "llm.model",
    "llm.api_key_env",
    "llm.base_url",
    "llm.timeout_secs",
    "retry.max_attempts",
    "retry.base_delay_secs",
    "retry.max_delay_secs",
    "retry.max_jitter_secs",
    "retry.extra_wait_secs",
    "intent.use_model",
    "intent.timeout_secs",
    "workflow.output_dir",
    "workflow.step_mode",
    "workflow.escalation",
    "workflow.write_receipts",
    "logging.verbose",
];

/// Assigns `value` to `slot` when present and records where it came from.
fn apply<T>(
    slot: &mut T,
    value: Option<T>,
    key: &str,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if let Some(value) = value {
        *slot = value;
        attribution.insert(key.to_string(), source.clone());
    }
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory for config file discovery when no
    /// explicit path is given.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = env::current_dir().map_err(|e| {
            ConfigError::InvalidFile(format!("cannot determine current directory: {e}"))
        })?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory.
    ///
    /// Path-driven variant used by tests to avoid depending on the process
    /// working directory.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        for key in TRACKED_KEYS {
            config
                .source_attribution
                .insert((*key).to_string(), ConfigSource::Default);
        }

        let config_path = match &cli_args.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => match env::var_os(CONFIG_ENV_VAR) {
                Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
                _ => Self::discover_config_file_from(start_dir),
            },
        };

        if let Some(path) = &config_path {
            debug!(path = %path.display(), "Loading configuration file");
            let file_config = Self::load_config_file(path)?;
            config.apply_file(file_config, ConfigSource::ConfigFile(path.clone()))?;
        }

        if let Ok(provider) = env::var(PROVIDER_ENV_VAR)
            && !provider.is_empty()
        {
            let provider: LlmProvider = provider.parse()?;
            apply(
                &mut config.llm.provider,
                Some(provider),
                "llm.provider",
                &ConfigSource::Env,
                &mut config.source_attribution,
            );
        }

        config.apply_cli(cli_args)?;
        config.validate()?;

        Ok(config)
    }

    fn apply_file(&mut self, file: TomlConfig, source: ConfigSource) -> Result<(), ConfigError> {
        let attr = &mut self.source_attribution;

        if let Some(llm) = file.llm {
            let provider = llm.provider
                .as_deref()
                .map(str::parse::<LlmProvider>)
                .transpose()?;
            apply(&mut self.llm.provider, provider, "llm.provider", &source, attr);
            apply(&mut self.llm.model, llm.model, "llm.model", &source, attr);
            apply(
                &mut self.llm.api_key_env,
                llm.api_key_env,
                "llm.api_key_env",
                &source,
                attr,
            );
            apply(&mut self.llm.base_url, llm.base_url, "llm.base_url", &source, attr);
            apply(
                &mut self.llm.timeout_secs,
                llm.timeout_secs,
                "llm.timeout_secs",
                &source,
                attr,
            );
        }

        if let Some(retry) = file.retry {
            apply(
                &mut self.retry.max_attempts,
                retry.max_attempts,
                "retry.max_attempts",
                &source,
                attr,
            );
            apply(
                &mut self.retry.base_delay_secs,
                retry.base_delay_secs,
                "retry.base_delay_secs",
                &source,
                attr,
            );
            apply(
                &mut self.retry.max_delay_secs,
                retry.max_delay_secs,
                "retry.max_delay_secs",
                &source,
                attr,
            );
            apply(
                &mut self.retry.max_jitter_secs,
                retry.max_jitter_secs,
                "retry.max_jitter_secs",
                &source,
                attr,
            );
            apply(
                &mut self.retry.extra_wait_secs,
                retry.extra_wait_secs,
                "retry.extra_wait_secs",
                &source,
                attr,
            );
        }

        if let Some(intent) = file.intent {
            apply(
                &mut self.intent.use_model,
                intent.use_model,
                "intent.use_model",
                &source,
                attr,
            );
            apply(
                &mut self.intent.timeout_secs,
                intent.timeout_secs,
                "intent.timeout_secs",
                &source,
                attr,
            );
        }

        if let Some(workflow) = file.workflow {
            let step_mode = workflow.step_mode
                .as_deref()
                .map(str::parse::<StepMode>)
                .transpose()?;
            let escalation = workflow.escalation
                .as_deref()
                .map(str::parse::<EscalationMode>)
                .transpose()?;
            apply(
                &mut self.workflow.output_dir,
                workflow.output_dir,
                "workflow.output_dir",
                &source,
                attr,
            );
            apply(
                &mut self.workflow.step_mode,
                step_mode,
                "workflow.step_mode",
                &source,
                attr,
            );
            apply(
                &mut self.workflow.escalation,
                escalation,
                "workflow.escalation",
                &source,
                attr,
            );
            apply(
                &mut self.workflow.write_receipts,
                workflow.write_receipts,
                "workflow.write_receipts",
                &source,
                attr,
            );
        }

        if let Some(logging) = file.logging {
            apply(
                &mut self.logging.verbose,
                logging.verbose,
                "logging.verbose",
                &source,
                attr,
            );
        }

        Ok(())
    }

    fn apply_cli(&mut self, cli: &CliArgs) -> Result<(), ConfigError> {
        let source = ConfigSource::Cli;
        let attr = &mut self.source_attribution;

        if cli.dry_run {
            apply(
                &mut self.llm.provider,
                Some(LlmProvider::DryRun),
                "llm.provider",
                &source,
                attr,
            );
        }
        apply(&mut self.llm.model, cli.model.clone(), "llm.model", &source, attr);
        apply(
            &mut self.retry.max_attempts,
            cli.max_attempts,
            "retry.max_attempts",
            &source,
            attr,
        );
        apply(
            &mut self.logging.verbose,
            cli.verbose,
            "logging.verbose",
            &source,
            attr,
        );
        apply(
            &mut self.workflow.output_dir,
            cli.output_dir.clone(),
            "workflow.output_dir",
            &source,
            attr,
        );
        let step_mode = cli.step_mode
            .as_deref()
            .map(str::parse::<StepMode>)
            .transpose()?;
        apply(
            &mut self.workflow.step_mode,
            step_mode,
            "workflow.step_mode",
            &source,
            attr,
        );
        let escalation = cli.escalation
            .as_deref()
            .map(str::parse::<EscalationMode>)
            .transpose()?;
        apply(
            &mut self.workflow.escalation,
            escalation,
            "workflow.escalation",
            &source,
            attr,
        );

        Ok(())
    }

    /// Walk upward from `start_dir` looking for `.ssdlc/config.toml`.
    ///
    /// Stops at a repository root marker (`.git`, `.hg`, `.svn`) or the
    /// filesystem root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);

        while let Some(dir) = current {
            let candidate = dir.join(".ssdlc").join("config.toml");
            if candidate.is_file() {
                return Some(candidate);
            }
            if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists()
            {
                break;
            }
            current = dir.parent();
        }

        None
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::InvalidFile(format!("failed to read {}: {e}", path.display()))
            }
        })?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))
    }
}
