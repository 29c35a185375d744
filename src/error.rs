//! Error types for pidns.
//!
//! `PidnsError` covers the failures a caller is expected to show to a user:
//! rejected input, duplicate keys, protected sources and missing records.
//! Plumbing failures (I/O, serialization) travel as `anyhow::Error`.

use thiserror::Error;

use crate::model::ListKind;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum PidnsError {
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },

    #[error("Block list with URL {0} already exists")]
    DuplicateSource(String),

    #[error("Domain {domain} already in {kind}")]
    DuplicateEntry { kind: ListKind, domain: String },

    #[error("Cannot remove predefined block list: {0}")]
    ProtectedSource(String),

    #[error("Block list {0} not found")]
    SourceNotFound(u64),

    #[error("{kind} entry {id} not found")]
    EntryNotFound { kind: ListKind, id: u64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T, E = PidnsError> = std::result::Result<T, E>;
