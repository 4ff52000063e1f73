//! Format-string driven text codecs and compact trie/hash containers.
//!
//! A format string such as `T(l)\n(c*)\n` is parsed by [`grammar::parse`]
//! into a [`SchemaNode`] tree. The [`Builder`] streams delimited text through
//! that tree into a container file, and an [`Archive`] reads instances back
//! or answers point lookups.

pub mod builder;
pub mod codec;
pub mod config;
pub mod error;
pub mod grammar;
pub mod reader;
pub mod records;
pub mod schema;
pub mod staging;
pub mod store;
pub mod value;

pub use builder::{BuildSummary, Builder};
pub use config::{BuildConfig, StagingMode};
pub use error::{BuildError, ConfigError, DecodeError, ReadError, SchemaError};
pub use reader::{Archive, embedded_format};
pub use schema::{Prim, SchemaKind, SchemaNode, Sep};
pub use value::{Scalar, Value};
