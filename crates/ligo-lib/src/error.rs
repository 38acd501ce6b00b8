//! Unified error type for the ligo-lib crate.
//!
//! [`LigoError`] wraps transport failures ([`TransportError`]) and the
//! accessory-level error kinds (handshake ordering, identity strings,
//! session state, configuration). `From` impls allow `?` to propagate
//! across module boundaries seamlessly.

use std::fmt;

use crate::accessory::{StringFailure, StringIndex};
use crate::transport::TransportError;

/// Unified error type for ligo-lib operations.
#[derive(Debug)]
pub enum LigoError {
    /// USB transport error (enumerate, open, claim, transfer).
    Transport(TransportError),
    /// An identity string was rejected or only partially sent.
    Identity {
        index: StringIndex,
        failure: StringFailure,
    },
    /// Handshake step issued out of order.
    Handshake(String),
    /// The session has no IN or OUT endpoint to transfer on.
    EndpointsMissing,
    /// An accessory session is already open in this context.
    SessionActive,
    /// No accessory session is open.
    NoSession,
    /// No matching device is attached.
    NotFound(String),
    /// Gave up waiting for something to happen.
    Timeout(String),
    /// Configuration validation error.
    Config(String),
    /// Standard I/O error (config persistence, stdin/stdout streaming).
    Io(std::io::Error),
}

impl LigoError {
    /// Raw status code for errors that carry one.
    ///
    /// Transport errors yield their negative status; a short identity
    /// transfer yields the byte count it actually sent.
    pub fn code(&self) -> Option<i32> {
        match self {
            LigoError::Transport(e) => Some(e.code()),
            LigoError::Identity { failure, .. } => Some(failure.code()),
            _ => None,
        }
    }
}

impl fmt::Display for LigoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LigoError::Transport(e) => write!(f, "{e}"),
            LigoError::Identity { index, failure } => {
                write!(f, "Sending {index} string failed: {failure}")
            }
            LigoError::Handshake(e) => write!(f, "Handshake error: {e}"),
            LigoError::EndpointsMissing => {
                write!(f, "Device has no usable bulk IN/OUT endpoint pair")
            }
            LigoError::SessionActive => write!(f, "An accessory session is already open"),
            LigoError::NoSession => write!(f, "No accessory session is open"),
            LigoError::NotFound(e) => write!(f, "Device not found: {e}"),
            LigoError::Timeout(e) => write!(f, "Timed out: {e}"),
            LigoError::Config(e) => write!(f, "Config error: {e}"),
            LigoError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for LigoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LigoError::Transport(e) => Some(e),
            LigoError::Identity { failure, .. } => Some(failure),
            LigoError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for LigoError {
    fn from(e: TransportError) -> Self {
        LigoError::Transport(e)
    }
}

impl From<std::io::Error> for LigoError {
    fn from(e: std::io::Error) -> Self {
        LigoError::Io(e)
    }
}

/// Crate-level Result alias using [`LigoError`].
pub type Result<T> = std::result::Result<T, LigoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_transport_error() {
        let e: LigoError = TransportError::NoDevice.into();
        assert!(matches!(e, LigoError::Transport(TransportError::NoDevice)));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: LigoError = io_err.into();
        assert!(matches!(e, LigoError::Io(_)));
    }

    #[test]
    fn display_transport_error() {
        let e = LigoError::Transport(TransportError::Timeout);
        assert_eq!(e.to_string(), "Transfer timed out");
    }

    #[test]
    fn display_identity_error() {
        let e = LigoError::Identity {
            index: StringIndex::Description,
            failure: StringFailure::Short {
                expected: 12,
                actual: 4,
            },
        };
        assert_eq!(
            e.to_string(),
            "Sending description string failed: short transfer: sent 4 of 12 bytes"
        );
    }

    #[test]
    fn display_config_error() {
        let e = LigoError::Config("model is empty".into());
        assert_eq!(e.to_string(), "Config error: model is empty");
    }

    #[test]
    fn code_for_transport_and_identity() {
        assert_eq!(LigoError::Transport(TransportError::Pipe).code(), Some(-9));
        let short = LigoError::Identity {
            index: StringIndex::Model,
            failure: StringFailure::Short {
                expected: 6,
                actual: 3,
            },
        };
        assert_eq!(short.code(), Some(3));
        assert_eq!(LigoError::NoSession.code(), None);
    }

    #[test]
    fn source_chains_transport_error() {
        let e = LigoError::Transport(TransportError::Access("usb:1/004".into()));
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("usb:1/004"));
    }

    #[test]
    fn source_none_for_string_variants() {
        let e = LigoError::Handshake("test".into());
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn question_mark_propagation_transport_to_ligo() {
        fn inner() -> crate::transport::Result<()> {
            Err(TransportError::NoDevice)
        }
        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }
        let err = outer().unwrap_err();
        assert!(matches!(err, LigoError::Transport(TransportError::NoDevice)));
    }
}
