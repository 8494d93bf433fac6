//! Error taxonomy for the visualization pipeline

use std::path::PathBuf;

/// Every way a single reply can fail to become a fragment.
///
/// All variants except an exhausted `ArtifactWriteFailed` are turn-local:
/// the conversation continues and previously appended fragments are untouched.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no balanced JSON object found in model reply")]
    ExtractionFailed,

    #[error("extracted text is not valid JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("unrecognized chart type: {0}")]
    UnrecognizedChartType(String),

    #[error("spec validation failed: {0}")]
    ValidationFailed(String),

    #[error("dataset binding failed: {0}")]
    BindingFailed(String),

    #[error("failed to write artifact {path}: {source}")]
    ArtifactWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Short stage name surfaced to the user / HTTP caller
    pub fn stage(&self) -> &'static str {
        match self {
            Self::ExtractionFailed => "extraction",
            Self::ParseError(_) => "parse",
            Self::UnrecognizedChartType(_) => "chart_type",
            Self::ValidationFailed(_) => "validation",
            Self::BindingFailed(_) => "binding",
            Self::ArtifactWriteFailed { .. } => "artifact_write",
        }
    }

    /// Only artifact I/O (after retries) ends the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ArtifactWriteFailed { .. })
    }

    pub(crate) fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ArtifactWriteFailed {
            path: path.into(),
            source,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_write_failures_are_fatal() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(PipelineError::write_failed("out.html", io).is_fatal());
        assert!(!PipelineError::ExtractionFailed.is_fatal());
        assert!(!PipelineError::ValidationFailed("x".into()).is_fatal());
        assert!(!PipelineError::UnrecognizedChartType("scatter3d".into()).is_fatal());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(PipelineError::BindingFailed("empty".into()).stage(), "binding");
        let parse = serde_json::from_str::<serde_json::Value>("{oops}").unwrap_err();
        assert_eq!(PipelineError::from(parse).stage(), "parse");
    }
}
