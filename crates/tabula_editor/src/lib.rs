//! # Tabula Editor - reflection-driven record editing
//!
//! The editing half of Tabula: given a [`tabula_schema::Schema`] and
//! one encoded record, present every field as editable text and write
//! accepted edits back into the binary, in place where the size
//! permits and by rebuilding the record where it does not.
//!
//! ## Key Concepts
//!
//! - **RecordEditor**: the facade. Owns the canonical record copy and
//!   the session state; hosts call `update` once per frame and `draw`
//!   with their widget collaborator.
//! - **FieldVisitor**: the presentation seam. The core never draws;
//!   it describes fields as text rows and reacts to the responses.
//! - **Codec**: the text forms. Scalars, enum names, union tags and
//!   angle-bracket struct literals like `< 1, < 2, 3 >, 4 >`.
//! - **Traversal**: one recursive walk in five modes (check, three
//!   draw flavors, commit), so presentation and mutation always agree
//!   on field order and identity.

pub mod codec;
pub mod config;
pub mod editor;
pub mod session;
pub mod traverse;

use thiserror::Error;

pub use codec::ParseError;
pub use config::EditorConfig;
pub use editor::RecordEditor;
pub use session::EditSession;
pub use traverse::{FieldAction, FieldResponse, FieldRow, FieldVisitor, VisitMode, WalkOutcome};

/// Editor-level failures. Parse failures of typed text are not here;
/// they mark the field and leave the entry pending.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("no record loaded")]
    NoData,
    /// Schema and buffer disagree mid-walk. Programmer error; the
    /// pass aborts rather than continuing past the offending field.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error(transparent)]
    Schema(#[from] tabula_schema::SchemaError),
    #[error(transparent)]
    Decode(#[from] tabula_schema::DecodeError),
    #[error(transparent)]
    Patch(#[from] tabula_schema::PatchError),
}
