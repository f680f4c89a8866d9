use std::path::PathBuf;

/// Overrides taken from the command line.
///
/// Every field is optional; `None` leaves the file or default value in place.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub model: Option<String>,
    pub max_attempts: Option<u32>,
    pub verbose: Option<bool>,
    pub dry_run: bool,
    pub output_dir: Option<PathBuf>,
    pub step_mode: Option<String>,
    pub escalation: Option<String>,
}
