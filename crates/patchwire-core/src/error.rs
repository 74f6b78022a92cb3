//! Error types for unit construction and worker lifecycle.
//!
//! Everything in here is reported from non-real-time code. The block path
//! never returns an error; it falls back to silence, zero, or the last good
//! value instead.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while building units, routers, channels, and workers.
#[derive(Debug, Error)]
pub enum Error {
    /// A bus was declared with zero channels.
    #[error("bus '{bus}' declares no channels")]
    EmptyBus {
        /// Name of the offending bus.
        bus: String,
    },

    /// A bus was declared with more channels than the runtime supports.
    #[error("bus '{bus}' declares {count} channels, maximum is {max}")]
    TooManyChannels {
        /// Name of the offending bus.
        bus: String,
        /// Declared channel count.
        count: usize,
        /// Supported maximum.
        max: usize,
    },

    /// A binding referenced a bus index that was never declared.
    #[error("unknown bus index {0}")]
    UnknownBus(usize),

    /// A binding referenced a channel past the end of its bus.
    #[error("channel {channel} out of range for bus '{bus}' ({count} channels)")]
    ChannelOutOfRange {
        /// Name of the bus.
        bus: String,
        /// Requested channel.
        channel: usize,
        /// Channel count of the bus.
        count: usize,
    },

    /// Two bindings were registered for the same parameter.
    #[error("parameter '{0}' is bound more than once")]
    DuplicateBinding(String),

    /// Two parameters of one unit share an id or string id.
    #[error("parameter '{0}' is declared more than once")]
    DuplicateParameter(String),

    /// A name did not match any parameter of the unit.
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    /// A parameter range is empty, inverted, or not finite.
    #[error("invalid range for parameter '{name}': [{min}, {max}]")]
    InvalidRange {
        /// Parameter name.
        name: String,
        /// Declared minimum.
        min: f32,
        /// Declared maximum.
        max: f32,
    },

    /// A modulation span or range constant is unusable.
    #[error("invalid modulation for parameter '{name}': {reason}")]
    InvalidModulation {
        /// Parameter name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A cross-thread channel was requested with no capacity.
    #[error("channel capacity must be greater than zero")]
    ZeroCapacity,

    /// Building a snapshot failed; the previous snapshot stays published.
    #[error("snapshot build failed: {0}")]
    SnapshotBuild(String),

    /// A persisted property could not be applied to a unit.
    #[error("invalid state property '{key}': {reason}")]
    InvalidState {
        /// Property key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker '{name}': {source}")]
    WorkerSpawn {
        /// Worker name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A worker did not observe its stop flag in time.
    #[error("worker '{name}' did not stop within {timeout:?}")]
    WorkerTimeout {
        /// Worker name.
        name: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A worker thread panicked instead of exiting cleanly.
    #[error("worker '{0}' panicked")]
    WorkerPanicked(String),
}

/// Result alias for construction-time operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid-modulation error.
    pub fn invalid_modulation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidModulation {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-state error.
    pub fn invalid_state(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidState {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that describe a bad unit declaration.
    ///
    /// These must be fixed before the unit can ever be processed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::EmptyBus { .. }
                | Error::TooManyChannels { .. }
                | Error::UnknownBus(_)
                | Error::ChannelOutOfRange { .. }
                | Error::DuplicateBinding(_)
                | Error::DuplicateParameter(_)
                | Error::UnknownParameter(_)
                | Error::InvalidRange { .. }
                | Error::InvalidModulation { .. }
                | Error::ZeroCapacity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn duplicate_binding_display() {
        let err = Error::DuplicateBinding("attack".to_string());
        assert_eq!(err.to_string(), "parameter 'attack' is bound more than once");
    }

    #[test]
    fn channel_out_of_range_display() {
        let err = Error::ChannelOutOfRange {
            bus: "mod".to_string(),
            channel: 7,
            count: 4,
        };
        assert_eq!(
            err.to_string(),
            "channel 7 out of range for bus 'mod' (4 channels)"
        );
    }

    #[test]
    fn worker_spawn_exposes_source() {
        let err = Error::WorkerSpawn {
            name: "decoder".to_string(),
            source: std::io::Error::other("no threads"),
        };
        assert!(err.source().is_some());
    }

    #[test]
    fn configuration_classification() {
        assert!(Error::ZeroCapacity.is_configuration());
        assert!(Error::UnknownBus(3).is_configuration());
        assert!(!Error::SnapshotBuild("x".into()).is_configuration());
        assert!(
            !Error::WorkerTimeout {
                name: "w".into(),
                timeout: Duration::from_millis(5),
            }
            .is_configuration()
        );
    }
}
