//! Error taxonomy for the audio core. Mirrors the six error kinds of the
//! propagation policy: most are absorbed internally and only logged: only
//! `InvalidParameter` and `ThreadFailure` are meant to reach a caller.

use std::fmt::{self, Debug, Display, Formatter};

/// A contract violation at an API boundary. Always recoverable by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidParameter {
    /// A numeric value fell outside its documented valid range.
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },
    /// An index or handle did not refer to a live entity.
    UnknownHandle { kind: &'static str },
    /// A play-range invariant (`from <= position <= to`) was violated by the caller.
    InvalidPlayRange { from: f32, to: f32 },
}

impl Display for InvalidParameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            InvalidParameter::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(
                f,
                "parameter `{field}` = {value} is out of range [{min}, {max}]"
            ),
            InvalidParameter::UnknownHandle { kind } => {
                write!(f, "handle does not refer to a live {kind}")
            }
            InvalidParameter::InvalidPlayRange { from, to } => {
                write!(f, "invalid play range: from={from} > to={to}")
            }
        }
    }
}

impl std::error::Error for InvalidParameter {}

/// The backend refused to create a resource. Never surfaced: handled by the
/// owning pool, which shrinks its estimated capacity and falls back to
/// eviction or to doing nothing this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OutOfBackendResource {
    pub resource: &'static str,
}

impl Display for OutOfBackendResource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "backend refused to allocate a {}", self.resource)
    }
}

impl std::error::Error for OutOfBackendResource {}

/// A decoder produced less data than requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeFailure {
    pub requested: usize,
    pub produced: usize,
}

impl Display for DecodeFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "decoder produced {} of {} requested bytes",
            self.produced, self.requested
        )
    }
}

impl std::error::Error for DecodeFailure {}

/// Any backend call that reports failure. Logged; the call is retried next
/// frame on fresh state.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendError {
    pub operation: &'static str,
    pub detail: String,
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "backend call `{}` failed: {}", self.operation, self.detail)
    }
}

impl std::error::Error for BackendError {}

/// A PCM cache entry failed to parse. The entry is deleted and the source
/// re-decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheCorruption {
    HeaderMismatch,
    TruncatedBlob { expected: u64, found: u64 },
    Deserialize(String),
}

impl Display for CacheCorruption {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CacheCorruption::HeaderMismatch => write!(f, "cache header failed validation"),
            CacheCorruption::TruncatedBlob { expected, found } => write!(
                f,
                "cache blob truncated: expected {expected} bytes, found {found}"
            ),
            CacheCorruption::Deserialize(msg) => write!(f, "cache header deserialize failed: {msg}"),
        }
    }
}

impl std::error::Error for CacheCorruption {}

/// An uncaught error inside the audio thread body. Cleanup still proceeds;
/// the main thread tears down the module on the next synchronization.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadFailure {
    pub reason: String,
}

impl Display for ThreadFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "audio thread failed: {}", self.reason)
    }
}

impl std::error::Error for ThreadFailure {}

/// Umbrella error returned at the engine module boundary
/// (`init`, `process_audio`, `set_active_microphone`).
#[derive(Debug, Clone, PartialEq)]
pub enum AuralError {
    InvalidParameter(InvalidParameter),
    OutOfBackendResource(OutOfBackendResource),
    DecodeFailure(DecodeFailure),
    BackendError(BackendError),
    CacheCorruption(CacheCorruption),
    ThreadFailure(ThreadFailure),
}

impl Display for AuralError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AuralError::InvalidParameter(e) => Display::fmt(e, f),
            AuralError::OutOfBackendResource(e) => Display::fmt(e, f),
            AuralError::DecodeFailure(e) => Display::fmt(e, f),
            AuralError::BackendError(e) => Display::fmt(e, f),
            AuralError::CacheCorruption(e) => Display::fmt(e, f),
            AuralError::ThreadFailure(e) => Display::fmt(e, f),
        }
    }
}

impl std::error::Error for AuralError {}

macro_rules! from_variant {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for AuralError {
            fn from(value: $ty) -> Self {
                AuralError::$variant(value)
            }
        }
    };
}

from_variant!(InvalidParameter, InvalidParameter);
from_variant!(OutOfBackendResource, OutOfBackendResource);
from_variant!(DecodeFailure, DecodeFailure);
from_variant!(BackendError, BackendError);
from_variant!(CacheCorruption, CacheCorruption);
from_variant!(ThreadFailure, ThreadFailure);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_is_non_empty_for_every_kind() {
        let errors: Vec<AuralError> = vec![
            InvalidParameter::InvalidPlayRange { from: 2.0, to: 1.0 }.into(),
            OutOfBackendResource { resource: "source" }.into(),
            DecodeFailure { requested: 10, produced: 3 }.into(),
            BackendError { operation: "queue_buffer", detail: "oom".into() }.into(),
            CacheCorruption::HeaderMismatch.into(),
            ThreadFailure { reason: "panic".into() }.into(),
        ];
        for e in errors {
            assert!(!e.to_string().is_empty());
        }
    }
}
