//! Error types for fasttrie
//!
//! `SchemaError` is fatal at parse time, `DecodeError` is per-record and is
//! turned into a skip by the builder, `BuildError` aborts a build and
//! `ReadError` covers opening and querying built bytes.

use std::io;
use std::path::PathBuf;

/// Malformed format string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("incorrect format string '{0}'")]
    NoViableParse(String),

    #[error("bad escape '{escape}' in '{format}'")]
    BadEscape { escape: String, format: String },

    #[error("separator {inner:?} of '{node}' collides with enclosing separator {outer:?}")]
    SeparatorCollision {
        node: String,
        inner: String,
        outer: String,
    },
}

/// A record does not match its schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("invalid '{code}' value {token:?}")]
    BadNumber { code: char, token: String },

    #[error("expected separator {expected:?}")]
    UnmetSeparator { expected: String },

    #[error("missing pair separator {expected:?}")]
    MissingSeparator { expected: String },

    #[error("{0} trailing byte(s) after value")]
    TrailingInput(usize),

    #[error("value does not match schema node {0}")]
    ShapeMismatch(u32),
}

/// Errors that abort a build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("staging area {name} in {dir:?}: {source}")]
    Staging {
        name: String,
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("node {ordinal} produced {actual} instance(s), expected {expected}")]
    InstanceMismatch {
        ordinal: u32,
        expected: u64,
        actual: u64,
    },

    #[error("value re-encoding failed: {0}")]
    Encode(#[from] DecodeError),
}

/// Errors opening or querying a built container.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("not a fasttrie container (bad magic)")]
    InvalidMagic,

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    #[error("container was built with format {found:?}, not {expected:?}")]
    FormatMismatch { expected: String, found: String },

    #[error("truncated data at byte {0}")]
    Truncated(usize),

    #[error("unexpected section tag {found} for node {ordinal}")]
    UnexpectedSection { ordinal: u32, found: u8 },

    #[error("section belongs to node {found}, expected node {expected}")]
    OrdinalMismatch { expected: u32, found: u32 },

    #[error("corrupt section for node {ordinal}: {message}")]
    Corrupt { ordinal: u32, message: String },

    #[error("instance {index} out of range ({count} instance(s))")]
    InstanceOutOfRange { index: u64, count: u64 },

    #[error("lookup requires a T(...) or H(...) root, got '{0}'")]
    NotKeyed(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("at JSON path {path} → {message}")]
    Invalid { path: String, message: String },
}
