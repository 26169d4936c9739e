//! Error types for description processing, assembly and scene management
//!
//! Fatal errors (structural, unsupported feature, numeric degeneracy) abort the
//! whole build and carry the link/joint names needed to fix the input.
//! Reference-resolution and lifecycle-consistency problems are reported through
//! `tracing` and skipped; their variants exist so callers can still surface them.

use std::path::PathBuf;
use thiserror::Error;

/// Violations of the rooted-tree invariant of a robot description
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("duplicated link name '{0}'")]
    DuplicateLink(String),

    #[error("duplicated joint name '{0}'")]
    DuplicateJoint(String),

    #[error("joint '{joint}' references unknown link '{link}'")]
    UnknownLink { joint: String, link: String },

    #[error("link '{link}' has multiple parents: joint '{second}' claims it after joint '{first}'")]
    MultipleParents {
        link: String,
        first: String,
        second: String,
    },

    #[error("description has no root link")]
    MissingRoot,

    #[error("multiple root links detected: {}", .0.join(", "))]
    MultipleRoots(Vec<String>),

    #[error("kinematic loop detected involving links: {}", .0.join(", "))]
    KinematicLoop(Vec<String>),
}

/// Error category, mirrors the propagation policy of each error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Structural,
    UnsupportedFeature,
    NumericDegeneracy,
    ReferenceResolution,
    LifecycleConsistency,
    Description,
    Io,
    Config,
    Engine,
}

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid kinematic structure: {0}")]
    Structural(#[from] StructuralError),

    #[error("joint '{joint}': unsupported joint type '{kind}'")]
    UnsupportedFeature { joint: String, kind: String },

    #[error("numerically degenerate transform for {context}: {detail}")]
    NumericDegeneracy { context: String, detail: String },

    #[error("failed to resolve reference '{reference}' for '{owner}'")]
    ReferenceResolution { owner: String, reference: String },

    #[error("lifecycle inconsistency: {0}")]
    LifecycleConsistency(String),

    #[error("invalid description: {0}")]
    Description(String),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("physics engine error: {0}")]
    Engine(String),
}

impl SimError {
    pub fn numeric(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NumericDegeneracy {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub fn unsupported(joint: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            joint: joint.into(),
            kind: kind.into(),
        }
    }

    pub fn description(message: impl Into<String>) -> Self {
        Self::Description(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Structural(_) => ErrorCategory::Structural,
            Self::UnsupportedFeature { .. } => ErrorCategory::UnsupportedFeature,
            Self::NumericDegeneracy { .. } => ErrorCategory::NumericDegeneracy,
            Self::ReferenceResolution { .. } => ErrorCategory::ReferenceResolution,
            Self::LifecycleConsistency(_) => ErrorCategory::LifecycleConsistency,
            Self::Description(_) => ErrorCategory::Description,
            Self::Io { .. } => ErrorCategory::Io,
            Self::Config(_) => ErrorCategory::Config,
            Self::Engine(_) => ErrorCategory::Engine,
        }
    }

    /// Whether the error must abort the build operation that raised it
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.category(),
            ErrorCategory::ReferenceResolution | ErrorCategory::LifecycleConsistency
        )
    }
}

/// Result type for artisim operations
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_message_names_links() {
        let err = SimError::from(StructuralError::MultipleParents {
            link: "forearm".into(),
            first: "elbow".into(),
            second: "elbow_dup".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("forearm"));
        assert!(msg.contains("elbow_dup"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_non_fatal_categories() {
        let err = SimError::ReferenceResolution {
            owner: "head_camera".into(),
            reference: "missing_link".into(),
        };
        assert_eq!(err.category(), ErrorCategory::ReferenceResolution);
        assert!(!err.is_fatal());
        assert!(!SimError::LifecycleConsistency("x".into()).is_fatal());
    }

    #[test]
    fn test_loop_lists_every_link() {
        let err = StructuralError::KinematicLoop(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "kinematic loop detected involving links: a, b");
    }
}
