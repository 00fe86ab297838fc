use std::error::Error as StdError;
use thiserror::Error;

pub type CamResult<T> = Result<T, CamError>;

#[derive(Debug, Error)]
pub enum CamError {
    #[error("camera init failed: {message}")]
    CameraInit { message: String },
    #[error("capture failed: {message}")]
    Capture { message: String },
    #[error("encoder '{encoder}' failed: {message}")]
    Encoder { encoder: String, message: String },
    #[error("invalid configuration: {message}")]
    Config { message: String },
    #[error("http server error: {message}")]
    Http { message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl CamError {
    pub fn camera_init(message: impl Into<String>) -> Self {
        Self::CameraInit {
            message: message.into(),
        }
    }

    pub fn capture(message: impl Into<String>) -> Self {
        Self::Capture {
            message: message.into(),
        }
    }

    pub fn encoder(encoder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encoder {
            encoder: encoder.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Only a failed camera makes the whole process give up.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CameraInit { .. })
    }
}
