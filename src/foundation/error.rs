use std::path::{Path, PathBuf};

/// Convenience result type used across reelcast.
pub type ReelcastResult<T> = Result<T, ReelcastError>;

/// Top-level error taxonomy used by render APIs.
///
/// Every variant except [`ReelcastError::BackgroundLoad`] aborts the render. Background failures
/// are recovered by the background layer itself (solid black) and only surface here when a
/// caller asks for the background explicitly.
#[derive(thiserror::Error, Debug)]
pub enum ReelcastError {
    /// Invalid configuration or input layout (ratios, trims, missing first frame).
    #[error("config error: {0}")]
    Config(String),

    /// An image in the timeline could not be read or decoded.
    #[error("asset decode error: '{}': {msg}", path.display())]
    AssetDecode {
        /// Source file of the failing asset.
        path: PathBuf,
        /// Decoder diagnostic.
        msg: String,
    },

    /// Background image/video could not be loaded.
    #[error("background load error: {0}")]
    BackgroundLoad(String),

    /// External encoder process failure. Carries the tool's diagnostic output verbatim.
    #[error("encoder error: {0}")]
    Encoder(String),

    /// Render was cancelled before encoding started.
    #[error("render cancelled before encoding started")]
    Cancelled,

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelcastError {
    /// Build a [`ReelcastError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`ReelcastError::AssetDecode`] value.
    pub fn asset_decode(path: &Path, msg: impl Into<String>) -> Self {
        Self::AssetDecode {
            path: path.to_path_buf(),
            msg: msg.into(),
        }
    }

    /// Build a [`ReelcastError::BackgroundLoad`] value.
    pub fn background_load(msg: impl Into<String>) -> Self {
        Self::BackgroundLoad(msg.into())
    }

    /// Build a [`ReelcastError::Encoder`] value.
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    /// Return `true` for errors that the render may recover from locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::BackgroundLoad(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
