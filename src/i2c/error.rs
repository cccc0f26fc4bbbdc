// Licensed under the Apache-2.0 license

//! Error taxonomy of the session driver.

use crate::i2c::common::BusStatus;
use crate::i2c::traits::CopyFault;
use core::fmt;

/// Errors reported by configuration, transfer and session management calls.
///
/// Validation and precondition failures leave the session untouched and
/// may be retried with corrected input. `IoCopyFailure` aborts the call
/// in flight; no partial result is exposed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionError {
    /// A configuration value or transfer size violates its constraint.
    InvalidArgument,
    /// The transfer variant selected by the flags was never configured.
    InvalidState,
    /// Unknown control request code.
    UnsupportedRequest,
    /// Copying to or from caller memory failed.
    IoCopyFailure,
    /// The bus abstraction reported a failed transaction.
    Bus(BusStatus),
    /// All session slots are in use.
    TooManySessions,
    /// Stale or foreign session handle.
    InvalidSession,
}

impl SessionError {
    /// Negative POSIX code a host adapter hands back to the caller.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::InvalidArgument => -22, // EINVAL
            Self::InvalidState => -77, // EBADFD
            Self::UnsupportedRequest => -25, // ENOTTY
            Self::IoCopyFailure => -14, // EFAULT
            Self::Bus(_) => -5, // EIO
            Self::TooManySessions => -16, // EBUSY
            Self::InvalidSession => -9, // EBADF
        }
    }
}

impl From<CopyFault> for SessionError {
    fn from(_: CopyFault) -> Self {
        Self::IoCopyFailure
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::InvalidState => write!(f, "transfer precondition not configured"),
            Self::UnsupportedRequest => write!(f, "unsupported control request"),
            Self::IoCopyFailure => write!(f, "caller memory transfer failed"),
            Self::Bus(status) => write!(f, "bus transaction failed ({status})"),
            Self::TooManySessions => write!(f, "all session slots in use"),
            Self::InvalidSession => write!(f, "invalid session handle"),
        }
    }
}
