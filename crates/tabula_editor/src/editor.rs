//! The record editor facade.
//!
//! One [`RecordEditor`] owns a canonical copy of one binary record
//! plus the session state around it, and drives the shared traversal
//! in the right modes: commit and check during [`RecordEditor::update`],
//! one of the draw modes during [`RecordEditor::draw`].

use std::sync::Arc;

use tabula_schema::{ObjectIndex, RecordBuffer, Schema, SchemaError};

use crate::config::EditorConfig;
use crate::session::EditSession;
use crate::traverse::{FieldVisitor, VisitMode, WalkOutcome, Walker};
use crate::EditError;

pub struct RecordEditor {
    config: EditorConfig,
    schema: Arc<Schema>,
    buffer: RecordBuffer,
    session: EditSession,
}

impl RecordEditor {
    /// Create an editor for records of the named root table,
    /// optionally ingesting an initial record.
    ///
    /// Validates the whole schema up front, so traversal and commit
    /// can index into it without re-checking referential integrity.
    pub fn new(
        config: EditorConfig,
        schema: Arc<Schema>,
        root_type: &str,
        initial: Option<&[u8]>,
    ) -> Result<Self, EditError> {
        schema.validate()?;
        let root = schema
            .object_by_name(root_type)
            .filter(|i| !schema.object(*i).is_struct)
            .ok_or_else(|| EditError::Schema(SchemaError::UnknownObject(root_type.to_string())))?;
        log::debug!("record editor created for root type '{root_type}'");
        let mut editor = Self {
            config,
            schema,
            buffer: RecordBuffer::new(root),
            session: EditSession::new(),
        };
        if initial.is_some() {
            editor.set_record(initial)?;
        }
        Ok(editor)
    }

    /// Load a record (or clear with `None`). The editor keeps its own
    /// canonical copy; the caller's buffer is never retained or
    /// touched. All session state from the previous record is
    /// dropped, except expansion preferences.
    pub fn set_record(&mut self, raw: Option<&[u8]>) -> Result<(), EditError> {
        self.buffer.replace(&self.schema, raw)?;
        self.session.reset_for_new_record();
        Ok(())
    }

    pub fn has_data(&self) -> bool {
        self.buffer.has_data()
    }

    /// Copy the canonical record out, e.g. to persist it after a
    /// modification notification. `None` without data.
    pub fn export_copy(&self) -> Option<Vec<u8>> {
        self.buffer.export_copy()
    }

    /// Per-frame upkeep: run any requested commit, then refresh the
    /// pending-edit flag. Call once per frame, before `draw`.
    pub fn update(&mut self) -> Result<(), EditError> {
        if !self.buffer.has_data() {
            self.session.set_edits_pending(false);
            return Ok(());
        }
        if self.session.take_commit_request() && !self.config.read_only {
            self.commit_edits()?;
        }
        self.session.set_edits_pending(false);
        self.walk(VisitMode::CheckEdits, None)?;
        Ok(())
    }

    /// Present the record through `visitor`. The mode follows the
    /// configuration: read-only, auto-commit or manual-commit.
    /// Without data this draws nothing.
    pub fn draw(&mut self, visitor: &mut dyn FieldVisitor) -> Result<(), EditError> {
        if !self.buffer.has_data() {
            return Ok(());
        }
        let mode = if self.config.read_only {
            VisitMode::DrawReadOnly
        } else if self.config.auto_commit {
            VisitMode::DrawEditAuto
        } else {
            VisitMode::DrawEditManual
        };
        self.session.set_focused(None);
        self.walk(mode, Some(visitor))?;
        Ok(())
    }

    /// Ask for a commit on the next `update`, as the manual-mode
    /// apply affordance does.
    pub fn request_commit(&mut self) {
        self.session.request_commit();
    }

    /// Has any commit landed in the buffer since the flag was last
    /// cleared? Hosts poll this to know when to re-read the record.
    pub fn is_modified(&self) -> bool {
        self.session.is_modified()
    }

    /// Acknowledge the modification; also forgets which fields were
    /// committed.
    pub fn clear_modified(&mut self) {
        self.session.clear_modified();
    }

    /// Ids of the fields committed since `clear_modified`.
    pub fn committed_fields(&self) -> impl Iterator<Item = &str> {
        self.session.committed_fields().iter().map(String::as_str)
    }

    /// Does any typed-but-uncommitted text differ from the buffer?
    /// Refreshed by `update`.
    pub fn has_pending_edits(&self) -> bool {
        self.session.edits_pending()
    }

    /// Is a field currently focused for typing? Hosts use this to
    /// suppress global keyboard shortcuts.
    pub fn editing_in_progress(&self) -> bool {
        self.session.focused().is_some()
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut EditorConfig {
        &mut self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn root_type(&self) -> ObjectIndex {
        self.buffer.root()
    }

    /// Run the commit pass until it completes without resizing.
    /// Every resize consumed at least one pending entry, so the loop
    /// terminates.
    fn commit_edits(&mut self) -> Result<(), EditError> {
        loop {
            match self.walk(VisitMode::CommitEdits, None)? {
                WalkOutcome::Resized => continue,
                WalkOutcome::Completed => return Ok(()),
            }
        }
    }

    fn walk<'a>(
        &'a mut self,
        mode: VisitMode,
        visitor: Option<&'a mut dyn FieldVisitor>,
    ) -> Result<WalkOutcome, EditError> {
        let mut walker = Walker {
            schema: &self.schema,
            config: &self.config,
            mode,
            session: &mut self.session,
            visitor,
        };
        walker.run(&mut self.buffer)
    }
}
