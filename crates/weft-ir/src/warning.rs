use serde::Serialize;

/// Non-fatal condition found while transcoding. Every warning is also logged
/// through `tracing` at the point it is raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub kind: WarningKind,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// A class is referenced by markup but never declared.
    MissingClass,
    /// A `var()` reference has neither a definition nor a fallback.
    UnresolvedVariable,
    /// An element without a matching closing tag was dropped.
    DroppedSubtree,
    /// Embed CSS is over the size budget.
    EmbedSize,
    /// Embed CSS failed to parse.
    EmbedParse,
    /// A repair suggestion or patch was refused or could not apply.
    RejectedPatch,
    /// The repair service gave no usable answer.
    RepairFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
        }
    }
}
