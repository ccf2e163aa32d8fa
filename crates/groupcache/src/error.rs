// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::ByteViewError;

/// Error type for boxed failures reported by value producers and peers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared form of [`BoxError`], cloned into every waiter of a deduplicated load.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Convenience alias for results produced by this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by cache groups and their registry.
///
/// The error is cheap to clone so that one failed load can be reported to every caller that
/// was waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A group with this name is already registered.
    #[error("duplicate registration of group {0:?}")]
    DuplicateGroup(String),

    /// A registry hook or factory was registered a second time.
    #[error("{0} is already configured")]
    AlreadyConfigured(&'static str),

    /// No group with this name is registered.
    #[error("no such group: {0:?}")]
    NoSuchGroup(String),

    /// The value producer failed for a key.
    #[error("loading key {key:?} failed")]
    Load {
        /// Key being loaded.
        key: String,
        /// Failure reported by the value producer.
        #[source]
        source: SharedError,
    },

    /// A remote peer failed to return a key.
    #[error("fetching key {key:?} from peer failed")]
    Peer {
        /// Key being fetched.
        key: String,
        /// Failure reported by the peer transport.
        #[source]
        source: SharedError,
    },

    /// A sink could not be read or written.
    #[error("sink error: {0}")]
    Sink(String),

    /// A byte view was sliced out of range.
    #[error(transparent)]
    View(#[from] ByteViewError),
}

impl Error {
    pub(crate) fn load(key: &str, source: BoxError) -> Self {
        Self::Load {
            key: key.to_owned(),
            source: Arc::from(source),
        }
    }

    pub(crate) fn peer(key: &str, source: BoxError) -> Self {
        Self::Peer {
            key: key.to_owned(),
            source: Arc::from(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn load_error_keeps_its_source() {
        let err = Error::load("k", "backend down".into());

        assert_eq!(err.to_string(), "loading key \"k\" failed");
        let source = err.source().expect("load errors carry a source");
        assert_eq!(source.to_string(), "backend down");
    }

    #[test]
    fn clones_share_the_source() {
        let err = Error::peer("k", "timeout".into());
        let clone = err.clone();

        match (err, clone) {
            (Error::Peer { source: a, .. }, Error::Peer { source: b, .. }) => assert!(Arc::ptr_eq(&a, &b)),
            _ => unreachable!("both errors are peer errors"),
        }
    }

    #[test]
    fn view_errors_convert() {
        let err = Error::from(ByteViewError::InvalidOffset { offset: 3, len: 1 });
        assert_eq!(err.to_string(), "offset 3 is past the end of a 1-byte view");
    }
}
