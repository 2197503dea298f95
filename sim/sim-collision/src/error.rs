//! Error types for collision detection operations.

use thiserror::Error;

/// Result type for collision operations.
pub type Result<T> = std::result::Result<T, CollisionError>;

/// Errors that can occur when driving a broadphase or building shapes.
///
/// Numerical trouble inside GJK is never reported through this type; the
/// narrow phase recovers internally and reports "no contact" instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CollisionError {
    /// The proxy pool is full.
    #[error("proxy capacity exceeded: all {capacity} handles are in use")]
    CapacityExceeded {
        /// Maximum number of proxies the pool holds.
        capacity: usize,
    },

    /// A handle refers to a destroyed proxy or was issued by another pool.
    #[error("stale proxy handle: slot {index} generation {generation}")]
    StaleHandle {
        /// Slot index carried by the handle.
        index: u32,
        /// Generation carried by the handle.
        generation: u32,
    },

    /// An AABB is inverted or contains non-finite coordinates.
    #[error("invalid AABB: {reason}")]
    InvalidAabb {
        /// Description of what's wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid shape parameters.
    #[error("invalid shape: {reason}")]
    InvalidShape {
        /// Description of what's wrong.
        reason: String,
    },
}

impl CollisionError {
    /// Create a capacity exceeded error.
    #[must_use]
    pub fn capacity_exceeded(capacity: usize) -> Self {
        Self::CapacityExceeded { capacity }
    }

    /// Create an invalid AABB error.
    #[must_use]
    pub fn invalid_aabb(reason: impl Into<String>) -> Self {
        Self::InvalidAabb {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid shape error.
    #[must_use]
    pub fn invalid_shape(reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            reason: reason.into(),
        }
    }

    /// Check if this is a capacity error.
    #[must_use]
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// Check if this is a stale handle error.
    #[must_use]
    pub fn is_stale_handle(&self) -> bool {
        matches!(self, Self::StaleHandle { .. })
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}
