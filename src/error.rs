//! Error type shared by every FIFO flavour.

use thiserror::Error;

/// Errors surfaced by the FIFOs, the double buffer and the device bridge.
///
/// The type is `Clone` so the same injected error can be handed to both
/// FIFOs of a [`DoubleBuffer`](crate::DoubleBuffer) and raised on either side.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FifoError {
    /// A write asked for more space than is currently available.
    #[error("could not write {requested} instances to fifo: there is only space for {available}")]
    Capacity { requested: usize, available: usize },

    /// A read asked for more data than is currently stored.
    #[error("could not read {requested} instances from fifo: only {available} available")]
    Underflow { requested: usize, available: usize },

    /// A caller-supplied size or count is outside the configured bounds.
    #[error("{what} is {value}, limit is {limit}")]
    Argument {
        what: &'static str,
        value: usize,
        limit: usize,
    },

    /// A blocked (or about to block) call was cancelled from outside.
    #[error("aborted: {0}")]
    Aborted(String),

    /// The fifo could not be created.
    #[error("cannot create fifo of size {max_fill_count}: {reason}")]
    Construction {
        max_fill_count: usize,
        reason: &'static str,
    },

    /// The audio device could not be opened or started.
    #[cfg(feature = "cpal_sink")]
    #[error("audio device error: {0}")]
    Device(String),
}

impl FifoError {
    /// Shorthand for an injected cancellation error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = FifoError> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_counts() {
        let err = FifoError::Capacity { requested: 5, available: 3 };
        assert_eq!(
            err.to_string(),
            "could not write 5 instances to fifo: there is only space for 3"
        );

        let err = FifoError::aborted("shutdown");
        assert_eq!(err.to_string(), "aborted: shutdown");
    }
}
