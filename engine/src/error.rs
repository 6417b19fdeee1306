//! Error types for the renderer.
//!
//! Failures are handled where they occur: most of these values end up in a
//! log line rather than crossing the `Renderer` boundary. GPU context creation
//! is the exception and is returned to the caller.

use std::fmt;
use std::path::PathBuf;

use crate::scene::EntityId;

/// Stage of program construction that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStage {
    /// Reading the WGSL source from disk.
    Source,
    /// Compiling the shader module.
    Compile,
    /// Linking the module into a render pipeline.
    Link,
}

impl fmt::Display for ProgramStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Compile => write!(f, "compile"),
            Self::Link => write!(f, "link"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to read shader `{}`: {source}", path.display())]
    ShaderIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("program `{program}` failed at {stage} stage: {message}")]
    Program {
        program: &'static str,
        stage: ProgramStage,
        message: String,
    },

    #[error("framebuffer `{name}` is incomplete: {reason}")]
    IncompleteFramebuffer { name: String, reason: String },

    #[error("entity {entity} has no {missing} component")]
    MissingComponent {
        entity: EntityId,
        missing: &'static str,
    },

    #[error("invalid texture data `{label}`: {reason}")]
    InvalidTextureData { label: String, reason: String },

    #[error("no compatible GPU adapter: {0}")]
    AdapterUnavailable(String),

    #[error("failed to create GPU device: {0}")]
    DeviceCreation(String),

    #[error("failed to create surface: {0}")]
    SurfaceCreation(String),

    #[error("failed to read render settings `{}`: {source}", path.display())]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse render settings: {0}")]
    SettingsParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_error_names_stage() {
        let err = RenderError::Program {
            program: "deferred_lighting",
            stage: ProgramStage::Link,
            message: "entry point not found".into(),
        };
        let text = err.to_string();
        assert!(text.contains("deferred_lighting"));
        assert!(text.contains("link"));
        assert!(text.contains("entry point not found"));
    }

    #[test]
    fn test_framebuffer_error_names_framebuffer() {
        let err = RenderError::IncompleteFramebuffer {
            name: "G-Buffer".into(),
            reason: "no attachments".into(),
        };
        assert!(err.to_string().contains("G-Buffer"));
    }
}
