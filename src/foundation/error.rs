use std::path::{Path, PathBuf};

pub type OneoffResult<T> = Result<T, OneoffError>;

#[derive(thiserror::Error, Debug)]
pub enum OneoffError {
    #[error("missing resource: {what} '{}'", path.display())]
    MissingResource { what: String, path: PathBuf },

    #[error("compile error in '{name}': {message}")]
    Compile { name: String, message: String },

    #[error("audio decode error: {0}")]
    AudioDecode(String),

    #[error("resource load error: {0}")]
    ResourceLoad(String),

    #[error("{tool} exited with status {status}: {stderr}")]
    ExternalTool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("gpu error: {0}")]
    Gpu(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OneoffError {
    pub fn missing(what: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self::MissingResource {
            what: what.into(),
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn compile(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compile {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn audio(msg: impl Into<String>) -> Self {
        Self::AudioDecode(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::ResourceLoad(msg.into())
    }

    pub fn external(
        tool: impl Into<String>,
        status: impl std::fmt::Display,
        stderr: impl AsRef<[u8]>,
    ) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            status: status.to_string(),
            stderr: String::from_utf8_lossy(stderr.as_ref()).trim().to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Whether a discovery loop may log this error and move on to the next candidate.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Compile { .. } | Self::ResourceLoad(_))
    }
}
