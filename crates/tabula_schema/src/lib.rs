//! # Tabula Schema - record layout model and canonical encoding
//!
//! This crate is the data half of Tabula: a schema-described,
//! variable-length binary record format and the buffer store that
//! edits records of it without generated per-type code.
//!
//! ## Key Concepts
//!
//! - **Schema**: an arena of object definitions (tables and structs)
//!   plus enum and union definitions. Fields reference other objects
//!   by index, so recursive table types are representable.
//! - **Value**: a dynamic, serializable value tree mirroring one
//!   record instance.
//! - **Encoding**: the canonical byte layout. Re-encoding a decoded
//!   record always reproduces the same bytes, so canonicalization is
//!   a fixed point.
//! - **RecordBuffer**: owns one encoded record and applies targeted
//!   field patches, rebuilding the whole buffer when a patch changes
//!   the size of variable-length content.

pub mod decode;
pub mod encode;
pub mod schema;
pub mod store;
pub mod value;

pub use decode::{decode_record, DecodeError};
pub use encode::{encode_record, EncodeError};
pub use schema::{
    EnumDef, EnumEntry, EnumIndex, FieldDef, FieldKind, ObjectDef, ObjectIndex, ScalarKind,
    Schema, SchemaError, UnionDef, UnionIndex, UnionVariant,
};
pub use store::{FieldPath, PatchError, PatchOutcome, PathStep, RecordBuffer};
pub use value::{TableValue, Value};
