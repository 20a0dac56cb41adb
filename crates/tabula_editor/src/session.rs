//! Edit session state - per-field text the user has typed but not
//! yet committed, plus the presentation and notification bookkeeping
//! around it.
//!
//! One session belongs to one editor instance. Pending entries are
//! keyed by the traversal's stable field ids, so they survive frames
//! and buffer rebuilds. The whole session resets when the record is
//! replaced.

use std::collections::{HashMap, HashSet};

/// In-progress edits and related per-field state.
#[derive(Clone, Debug, Default)]
pub struct EditSession {
    /// Field id -> candidate text not yet applied to the buffer.
    pending: HashMap<String, String>,
    /// Subtable ids whose nested view is currently shown.
    expanded: HashSet<String>,
    /// Field ids committed to the buffer since the modified flag was
    /// last cleared.
    committed: HashSet<String>,
    /// Field ids whose pending text failed to parse at the last
    /// commit attempt. Presentation only.
    parse_errors: HashSet<String>,
    /// True once any committed write has occurred. Cleared only by
    /// `clear_modified`.
    modified: bool,
    /// Set by a check pass when any pending entry differs from the
    /// buffer's canonical text.
    edits_pending: bool,
    /// Field currently being typed into, if any.
    focused: Option<String>,
    /// A draw pass asked for the next update to commit.
    commit_requested: bool,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_text(&self, id: &str) -> Option<&str> {
        self.pending.get(id).map(String::as_str)
    }

    /// Accept freshly typed text for a field. Typing again clears
    /// any stale parse-error mark.
    pub fn set_pending(&mut self, id: &str, text: String) {
        self.parse_errors.remove(id);
        self.pending.insert(id.to_string(), text);
    }

    /// Drop a pending entry without committing it.
    pub fn revert(&mut self, id: &str) {
        self.pending.remove(id);
        self.parse_errors.remove(id);
    }

    /// A successful commit: the entry is applied, no longer pending.
    pub fn complete_commit(&mut self, id: &str) {
        self.pending.remove(id);
        self.parse_errors.remove(id);
        self.committed.insert(id.to_string());
        self.modified = true;
    }

    pub fn mark_parse_error(&mut self, id: &str) {
        self.parse_errors.insert(id.to_string());
    }

    pub fn has_parse_error(&self, id: &str) -> bool {
        self.parse_errors.contains(id)
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    pub fn toggle_expanded(&mut self, id: &str) {
        if !self.expanded.remove(id) {
            self.expanded.insert(id.to_string());
        }
    }

    pub fn request_commit(&mut self) {
        self.commit_requested = true;
    }

    pub fn take_commit_request(&mut self) -> bool {
        std::mem::take(&mut self.commit_requested)
    }

    pub fn set_edits_pending(&mut self, pending: bool) {
        self.edits_pending = pending;
    }

    /// Does any pending entry differ from the buffer? Refreshed by
    /// the check pass each update.
    pub fn edits_pending(&self) -> bool {
        self.edits_pending
    }

    pub fn set_focused(&mut self, id: Option<String>) {
        self.focused = id;
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Drain the modified notification once the host has consumed
    /// the new buffer. Leaves pending edits and expansion alone.
    pub fn clear_modified(&mut self) {
        self.modified = false;
        self.committed.clear();
    }

    pub fn committed_fields(&self) -> &HashSet<String> {
        &self.committed
    }

    /// Reset for a new record: pending edits, error marks, the
    /// modified flag and the committed set all go; expansion state
    /// is presentation preference and survives.
    pub fn reset_for_new_record(&mut self) {
        self.pending.clear();
        self.parse_errors.clear();
        self.committed.clear();
        self.modified = false;
        self.edits_pending = false;
        self.focused = None;
        self.commit_requested = false;
    }
}
