//! Schema-driven structured configuration
//!
//! `schemaconf` loads hierarchical, apache-style configuration files
//! against a compiled schema. A schema declares section types, the keys
//! and nested sections each type admits, cardinality bounds, defaults,
//! and datatype conversions. Loading produces a fully converted
//! [`Value`] tree plus a [`CompositeHandler`] carrying the handler
//! entries collected along the way.
//!
//! The usual flow:
//!
//! 1. Build a [`Schema`] with [`SchemaBuilder`].
//! 2. Load text or a file with [`ConfigLoader`].
//! 3. Walk the returned [`Value`] / [`SectionValue`] tree, and
//!    optionally dispatch handlers through a [`HandlerRegistry`].
//!
//! Configuration sources support `%define` with `$name` substitution,
//! `%include` for file composition, and `%import` to pull registered
//! schema [`Component`]s into the schema for a single load.

mod builder;
mod config;
mod datatypes;
mod error;
mod loader;
mod matcher;
mod parser;
mod schema;
mod substitution;
mod types;

pub use builder::{
    ChildDecl, Component, KeyDecl, MultiKeyDecl, MultiSectionDecl, SchemaBuilder, SectionDecl,
    SectionTypeDecl,
};
pub use config::{MAX_INCLUDE_DEPTH, MAX_SECTION_DEPTH};
pub use datatypes::{
    range_checked, regex_checked, Conversion, ConversionResult, Registry, SectionConversion,
};
pub use error::{ConfigError, Result};
pub use loader::{
    ComponentRegistry, CompositeHandler, ConfigLoader, HandlerFn, HandlerRegistry, SchemaCache,
};
pub use matcher::{HandlerList, SchemaMatcher, SectionMatcher};
pub use schema::{
    AbstractType, ChildInfo, ChildName, KeyDefault, KeyInfo, MaxOccurs, Schema, SectionInfo,
    SectionType, TypeDef, ValueInfo,
};
pub use substitution::{is_name, substitute};
pub use types::{AddressFamily, InetAddress, Position, SectionValue, SocketAddress, Value};

/// Crate version, from the package manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
