use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// `StageId` names one ordered unit of the document-production workflow.
///
/// # Stage Order
///
/// ```text
/// Interview → Environment → Security → Design → Generation
/// ```
///
/// Each stage produces exactly one document, stored under
/// [`document_key`](Self::document_key) and persisted under
/// [`persisted_name`](Self::persisted_name).
///
/// # Example
///
/// ```rust
/// use ssdlc_utils::types::StageId;
///
/// assert_eq!(StageId::Interview.as_str(), "interview");
/// assert_eq!(StageId::Interview.next(), Some(StageId::Environment));
/// assert_eq!(StageId::Generation.next(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    /// Requirements interview with the user.
    Interview,
    /// Runtime and deployment environment requirements.
    Environment,
    /// Security requirements derived from the interview and environment.
    Security,
    /// System design built on every earlier document.
    Design,
    /// Code and documentation generation from the full document set.
    Generation,
}

impl StageId {
    /// All stages in canonical order.
    pub const ALL: [StageId; 5] = [
        StageId::Interview,
        StageId::Environment,
        StageId::Security,
        StageId::Design,
        StageId::Generation,
    ];

    /// Canonical lowercase name used in logs, receipts and CLI output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Interview => "interview",
            Self::Environment => "environment",
            Self::Security => "security",
            Self::Design => "design",
            Self::Generation => "generation",
        }
    }

    /// Human-readable title.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Interview => "Interview",
            Self::Environment => "Environment Requirements",
            Self::Security => "Security Requirements",
            Self::Design => "System Design",
            Self::Generation => "Generation",
        }
    }

    /// Key of the stage's document in the document store.
    #[must_use]
    pub const fn document_key(&self) -> &'static str {
        match self {
            Self::Interview => "interview_results",
            Self::Environment => "environment_requirements",
            Self::Security => "security_requirements",
            Self::Design => "system_design",
            Self::Generation => "generation_output",
        }
    }

    /// Stable file name of the stage's persisted document.
    #[must_use]
    pub const fn persisted_name(&self) -> &'static str {
        match self {
            Self::Interview => "Interview_Results.json",
            Self::Environment => "Environment_Requirements.json",
            Self::Security => "Security_Requirements.json",
            Self::Design => "System_Design.json",
            Self::Generation => "Generation_Output.json",
        }
    }

    /// Zero-based position in canonical order.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Interview => 0,
            Self::Environment => 1,
            Self::Security => 2,
            Self::Design => 3,
            Self::Generation => 4,
        }
    }

    /// The stage that follows this one, or `None` for the last stage.
    #[must_use]
    pub fn next(&self) -> Option<StageId> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Whether a persisted document marks this stage as done on resumption.
    ///
    /// Generation output is always regenerated, so only the four document
    /// stages before it count.
    #[must_use]
    pub const fn resumable(&self) -> bool {
        !matches!(self, Self::Generation)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageId::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

/// Position of a session in the workflow.
///
/// `None` and `Complete` are markers, not stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "stage")]
pub enum CurrentStage {
    #[default]
    None,
    Active(StageId),
    Complete,
}

impl CurrentStage {
    #[must_use]
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::Active(stage) => Some(*stage),
            Self::None | Self::Complete => None,
        }
    }
}

impl fmt::Display for CurrentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Active(stage) => f.write_str(stage.as_str()),
            Self::Complete => f.write_str("complete"),
        }
    }
}

/// Classification of a failed external call.
///
/// Drives the retry policy: `RateLimited` waits for the server-suggested
/// delay, `ServiceUnavailable` and `InternalTransient` back off exponentially,
/// `Unclassified` is never retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimited { retry_after: Duration },
    ServiceUnavailable,
    InternalTransient,
    Unclassified,
}

impl ErrorClass {
    /// Stable label for logs and receipts.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::ServiceUnavailable => "service_unavailable",
            Self::InternalTransient => "internal_transient",
            Self::Unclassified => "unclassified",
        }
    }

    /// Whether the retry coordinator may retry this class on its own.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unclassified)
    }

    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { retry_after } => {
                write!(f, "rate_limited (retry after {}s)", retry_after.as_secs())
            }
            other => f.write_str(other.label()),
        }
    }
}
