// ============================================================================
// ENGINE ERRORS — one taxonomy for every fallible engine call
// ============================================================================
//
// Every error is raised before any buffer or cache is touched, so a failed
// call always leaves the Workspace exactly as it was.

use crate::history::OperationFamily;

/// Errors reported by the pixel engine and its I/O edges.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The operation needs a base image and none is loaded.
    #[error("no image loaded")]
    NoImageLoaded,

    /// A caller-supplied parameter is out of range (non-finite, non-positive,
    /// even where odd is required, ...).
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Restore was requested for a family with nothing captured.
    #[error("no snapshot captured for the {0} family")]
    NoSnapshot(OperationFamily),

    /// The message does not fit into the carrier image.
    #[error("message needs {needed} bytes but the image can hold {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },

    /// The carrier image holds no decodable message.
    #[error("no hidden message found")]
    NoMessageFound,

    /// A computed buffer no longer matches the current base image.
    #[error("computed buffer is stale: the base image changed since it was computed")]
    StaleComputation,

    /// Raw pixel data does not match its declared geometry.
    #[error("pixel data is {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("file system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Shorthand for building an [`EngineError::InvalidParameter`].
    /// Rejections are mirrored to the session log.
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        crate::log_warn!("rejected parameter `{}`: {}", name, reason);
        EngineError::InvalidParameter { name, reason }
    }
}

/// Require a finite, strictly positive float.
pub(crate) fn require_positive(name: &'static str, value: f32) -> Result<f32> {
    if !value.is_finite() {
        return Err(EngineError::invalid(name, format!("must be finite, got {}", value)));
    }
    if value <= 0.0 {
        return Err(EngineError::invalid(name, format!("must be positive, got {}", value)));
    }
    Ok(value)
}

/// Require an odd size no smaller than `min`.
pub(crate) fn require_odd(name: &'static str, value: u32, min: u32) -> Result<u32> {
    if value < min {
        return Err(EngineError::invalid(name, format!("must be at least {}, got {}", min, value)));
    }
    if value % 2 == 0 {
        return Err(EngineError::invalid(name, format!("must be odd, got {}", value)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_rejects_nan_zero_and_negative() {
        assert!(require_positive("gamma", f32::NAN).is_err());
        assert!(require_positive("gamma", f32::INFINITY).is_err());
        assert!(require_positive("gamma", 0.0).is_err());
        assert!(require_positive("gamma", -1.0).is_err());
        assert_eq!(require_positive("gamma", 2.2).unwrap(), 2.2);
    }

    #[test]
    fn odd_rejects_even_and_small() {
        assert!(require_odd("size", 4, 3).is_err());
        assert!(require_odd("size", 1, 3).is_err());
        assert_eq!(require_odd("size", 1, 1).unwrap(), 1);
        assert_eq!(require_odd("size", 7, 3).unwrap(), 7);
    }

    #[test]
    fn messages_name_the_parameter() {
        let err = require_positive("gain", -2.0).unwrap_err();
        assert!(err.to_string().contains("gain"));
        let err = EngineError::NoSnapshot(OperationFamily::Rotation);
        assert_eq!(err.to_string(), "no snapshot captured for the rotation family");
    }
}
