//! Error handling for the prerender pipeline.
//!
//! This module provides a unified error type and result type for all
//! pipeline operations. Failures of the external toolchain keep their
//! captured diagnostics (see [`mathbake_render::RenderError`]).

use std::fmt;

use mathbake_render::RenderError;

use crate::document::EquationKind;

/// Pipeline error type
#[derive(Debug, Clone)]
pub enum PipelineError {
    /// Macro config block present but not repairable into valid JSON.
    MacroParse { message: String },
    /// A single equation failed to compile or convert.
    Render {
        kind: EquationKind,
        ordinal: usize,
        source: RenderError,
    },
    /// IO error (image files, output document)
    IoError { message: String },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::MacroParse { message } => {
                write!(f, "macro extraction failed: {}", message)
            }
            PipelineError::Render {
                kind,
                ordinal,
                source,
            } => {
                write!(f, "{} equation {} failed: {}", kind, ordinal, source)
            }
            PipelineError::IoError { message } => {
                write!(f, "IO error: {}", message)
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Render { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IoError {
            message: err.to_string(),
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

// Convenience constructors for errors
impl PipelineError {
    pub fn macro_parse(message: impl Into<String>) -> Self {
        PipelineError::MacroParse {
            message: message.into(),
        }
    }

    pub fn render(kind: EquationKind, ordinal: usize, source: RenderError) -> Self {
        PipelineError::Render {
            kind,
            ordinal,
            source,
        }
    }
}
