//! Process exit codes for the `ssdlc` binary.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `STAGE_ABORTED` | A stage was aborted or cancelled |
//! | 70 | `LLM_FAILURE` | The LLM backend failed outside a stage |

/// Type-safe exit code.
///
/// # Example
///
/// ```rust
/// use ssdlc_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::from_i32(3), ExitCode::STAGE_ABORTED);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - operation completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid arguments or configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Stage aborted - the operator aborted a stage or cancelled a wait
    pub const STAGE_ABORTED: ExitCode = ExitCode(3);

    /// LLM failure - the backend could not be used
    pub const LLM_FAILURE: ExitCode = ExitCode(70);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        // Exit statuses are truncated to a byte by the OS anyway.
        std::process::ExitCode::from(u8::try_from(code.0).unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values_are_stable() {
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
        assert_eq!(ExitCode::INTERNAL.as_i32(), 1);
        assert_eq!(ExitCode::CLI_ARGS.as_i32(), 2);
        assert_eq!(ExitCode::STAGE_ABORTED.as_i32(), 3);
        assert_eq!(ExitCode::LLM_FAILURE.as_i32(), 70);
        assert_eq!(i32::from(ExitCode::LLM_FAILURE), 70);
    }
}
