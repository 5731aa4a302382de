//! Typed coordination failures
//!
//! Protocol errors are matchable so tests (and the pipeline's abort path) can
//! tell a timed-out barrier from a corrupt record. Every variant names the
//! resource or condition that failed; the application layer wraps these in
//! `anyhow` context where more narrative is useful.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the file-based coordination protocol.
#[derive(Debug, Error)]
pub enum CoordError {
    /// The named lock could not be acquired within its bound.
    #[error("timed out acquiring lock '{name}' after {waited:?}")]
    LockTimeout { name: String, waited: Duration },

    /// The cohort never filled up: fewer workers joined than configured.
    #[error("timed out waiting for cohort: {joined} of {expected} workers joined after {waited:?}")]
    BarrierTimeout {
        joined: u32,
        expected: u32,
        waited: Duration,
    },

    /// The leader never broadcast the awaited signal.
    #[error("timed out waiting for {awaiting} signal after {waited:?}")]
    SignalTimeout {
        awaiting: &'static str,
        waited: Duration,
    },

    /// START was observed but the dispatch record never appeared.
    #[error("timed out waiting for dispatch record after {waited:?}")]
    DispatchTimeout { waited: Duration },

    /// More workers joined than the configured cohort size allows.
    #[error("invalid worker identifier {id}: cohort size is {cohort}")]
    IdentityOutOfRange { id: u32, cohort: u32 },

    /// The leader attempted a broadcast the state machine forbids.
    #[error("illegal signal transition {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    /// A shared record exists but does not parse.
    #[error("malformed {what} record at {path}: {details}")]
    Corrupt {
        what: &'static str,
        path: PathBuf,
        details: String,
    },

    /// An underlying filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl CoordError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        CoordError::Io {
            context: context.into(),
            source,
        }
    }
}
