//! Traversal engine - one recursive walk over schema and buffer,
//! parameterized by mode.
//!
//! The same walk backs the pending-edit check, all three draw modes
//! and the commit pass, so presentation and mutation can never
//! disagree about field order or identity. Ids are dotted paths from
//! the configured root id (`record.pos`, `record.tags[2]`,
//! `record.gear:Weapon.damage`) and stay stable across frames and
//! rebuilds.
//!
//! Commit mode aborts with [`WalkOutcome::Resized`] as soon as a
//! patch rebuilds the buffer: every table position held by the walk
//! is stale at that point and the caller restarts from the root.

use crate::codec::{self, ParseError};
use crate::config::EditorConfig;
use crate::session::EditSession;
use crate::EditError;
use tabula_schema::{
    decode, EnumIndex, FieldKind, FieldPath, ObjectIndex, PatchError, PatchOutcome, PathStep,
    RecordBuffer, ScalarKind, Schema, UnionIndex, Value,
};

/// What one pass over the record does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitMode {
    /// Compare pending edits against canonical text. No mutation,
    /// no drawing.
    CheckEdits,
    /// Draw edit fields that commit when the user finishes editing.
    DrawEditAuto,
    /// Draw edit fields with an explicit apply affordance.
    DrawEditManual,
    /// Draw labels only; accept no input.
    DrawReadOnly,
    /// Write accepted edits to the buffer.
    CommitEdits,
}

impl VisitMode {
    pub fn is_draw(self) -> bool {
        matches!(self, Self::DrawEditAuto | Self::DrawEditManual | Self::DrawReadOnly)
    }

    pub fn is_draw_edit(self) -> bool {
        matches!(self, Self::DrawEditAuto | Self::DrawEditManual)
    }
}

/// Discrete signal from the widget collaborator for one field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FieldAction {
    #[default]
    None,
    /// The user finished editing (auto mode) or pressed apply
    /// (manual mode).
    Commit,
    /// The user discarded the pending edit.
    Revert,
}

/// What the widget collaborator reports back for one field.
#[derive(Clone, Debug, Default)]
pub struct FieldResponse {
    /// Freshly typed text, if the user changed the field.
    pub new_text: Option<String>,
    pub action: FieldAction,
    /// The field currently has keyboard focus.
    pub focused: bool,
}

/// One leaf field as presented to the widget collaborator.
#[derive(Clone, Copy, Debug)]
pub struct FieldRow<'a> {
    /// Stable id within the traversal tree.
    pub id: &'a str,
    pub label: &'a str,
    /// Type annotation; empty unless `show_types` is set.
    pub type_hint: &'a str,
    /// Pending text if any, otherwise canonical text.
    pub text: &'a str,
    pub editable: bool,
    /// The shown text differs from the buffer.
    pub pending: bool,
    /// The pending text failed to parse at the last commit.
    pub error: bool,
}

/// Presentation hooks. The core never draws; it describes fields and
/// reacts to the collaborator's responses.
pub trait FieldVisitor {
    fn field(&mut self, row: FieldRow<'_>) -> FieldResponse;

    /// A subtable (or vector) header. Return `true` to toggle its
    /// expansion.
    fn subtable(&mut self, id: &str, label: &str, type_hint: &str, expanded: bool) -> bool {
        let _ = (id, label, type_hint, expanded);
        false
    }
}

/// How a pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkOutcome {
    Completed,
    /// A commit rebuilt the buffer; restart from the root.
    Resized,
}

/// Leaf category, carrying what the codec needs.
enum LeafKind {
    Scalar(ScalarKind),
    Enum(ScalarKind, EnumIndex),
    Str,
    Struct(ObjectIndex),
    UnionTag(UnionIndex),
}

pub(crate) struct Walker<'a> {
    pub schema: &'a Schema,
    pub config: &'a EditorConfig,
    pub mode: VisitMode,
    pub session: &'a mut EditSession,
    pub visitor: Option<&'a mut dyn FieldVisitor>,
}

impl Walker<'_> {
    /// Run one pass. In commit mode the buffer may be mutated; any
    /// rebuild aborts the pass with `Resized`.
    pub fn run(&mut self, buffer: &mut RecordBuffer) -> Result<WalkOutcome, EditError> {
        if !buffer.has_data() {
            return Err(EditError::NoData);
        }
        let root = buffer.root();
        let pos = decode::root_table_pos(buffer.bytes())?;
        let root_id = self.config.root_id.clone();
        self.walk_table(buffer, root, pos, &root_id, &FieldPath::root())
    }

    fn walk_table(
        &mut self,
        buffer: &mut RecordBuffer,
        object: ObjectIndex,
        table_pos: usize,
        id: &str,
        path: &FieldPath,
    ) -> Result<WalkOutcome, EditError> {
        let schema = self.schema;
        for (i, field) in schema.object(object).fields.iter().enumerate() {
            let field_id = format!("{id}.{}", field.name);
            let field_path = path.child(PathStep::Field(i));
            let payload = decode::field_payload_pos(buffer.bytes(), table_pos, i)?;
            match &field.kind {
                FieldKind::Scalar(kind) => {
                    let value = match payload {
                        Some(p) => decode::read_scalar(buffer.bytes(), p, *kind)?,
                        None => default_scalar(*kind),
                    };
                    let (text, leaf) = match field.enumeration {
                        Some(ei) => (
                            codec::enum_to_text(schema.enum_def(ei), &value),
                            LeafKind::Enum(*kind, ei),
                        ),
                        None => (codec::scalar_to_text(*kind, &value), LeafKind::Scalar(*kind)),
                    };
                    let hint = self.type_hint(&field.kind, field.enumeration);
                    if self.leaf(buffer, &field_id, &field.name, &hint, text, &field_path, leaf)?
                        == WalkOutcome::Resized
                    {
                        return Ok(WalkOutcome::Resized);
                    }
                }
                FieldKind::Str => {
                    let text = match payload {
                        Some(p) => decode::read_str(buffer.bytes(), p)?.to_string(),
                        None => String::new(),
                    };
                    let hint = self.type_hint(&field.kind, None);
                    if self.leaf(
                        buffer,
                        &field_id,
                        &field.name,
                        &hint,
                        text,
                        &field_path,
                        LeafKind::Str,
                    )? == WalkOutcome::Resized
                    {
                        return Ok(WalkOutcome::Resized);
                    }
                }
                FieldKind::Struct(si) => {
                    let value = match payload {
                        Some(p) => decode::read_struct(schema, buffer.bytes(), p, *si)?,
                        None => default_struct(schema, *si),
                    };
                    let text =
                        codec::struct_to_text(schema, *si, value.as_struct().unwrap_or(&[]));
                    let hint = self.type_hint(&field.kind, None);
                    if self.leaf(
                        buffer,
                        &field_id,
                        &field.name,
                        &hint,
                        text,
                        &field_path,
                        LeafKind::Struct(*si),
                    )? == WalkOutcome::Resized
                    {
                        return Ok(WalkOutcome::Resized);
                    }
                }
                FieldKind::Table(ti) => {
                    let Some(p) = payload else { continue };
                    let sub = decode::table_pos_at(buffer.bytes(), p)?;
                    let hint = self.type_hint(&field.kind, None);
                    if self.subtable_header(&field_id, &field.name, &hint) {
                        if self.walk_table(buffer, *ti, sub, &field_id, &field_path)?
                            == WalkOutcome::Resized
                        {
                            return Ok(WalkOutcome::Resized);
                        }
                    }
                }
                FieldKind::Vector(elem) => {
                    let Some(p) = payload else { continue };
                    let hint = self.type_hint(&field.kind, None);
                    if !self.subtable_header(&field_id, &field.name, &hint) {
                        continue;
                    }
                    let len = decode::vector_len(buffer.bytes(), p)?;
                    for j in 0..len {
                        let elem_id = format!("{field_id}[{j}]");
                        let elem_path = field_path.child(PathStep::Element(j));
                        let at =
                            decode::vector_elem_pos(schema, buffer.bytes(), p, elem, j)?;
                        let outcome = self.vector_element(
                            buffer, elem, &elem_id, at, &elem_path,
                        )?;
                        if outcome == WalkOutcome::Resized {
                            return Ok(WalkOutcome::Resized);
                        }
                    }
                }
                FieldKind::Union(ui) => {
                    let Some(p) = payload else { continue };
                    let (tag, sub) = decode::read_union(buffer.bytes(), p)?;
                    let def = schema.union_def(*ui);
                    let text = codec::union_tag_to_text(def, tag);
                    let hint = self.type_hint(&field.kind, None);
                    if self.leaf(
                        buffer,
                        &field_id,
                        &field.name,
                        &hint,
                        text,
                        &field_path,
                        LeafKind::UnionTag(*ui),
                    )? == WalkOutcome::Resized
                    {
                        return Ok(WalkOutcome::Resized);
                    }
                    let Some(sub) = sub else { continue };
                    let Some(variant) = def.variant(tag) else {
                        return Err(EditError::SchemaMismatch(format!(
                            "union tag {tag} in field {field_id}"
                        )));
                    };
                    let variant_id = format!("{field_id}:{}", variant.name);
                    let variant_path = field_path.child(PathStep::Variant);
                    if self.subtable_header(&variant_id, &variant.name, &hint) {
                        if self.walk_table(
                            buffer,
                            variant.object,
                            sub,
                            &variant_id,
                            &variant_path,
                        )? == WalkOutcome::Resized
                        {
                            return Ok(WalkOutcome::Resized);
                        }
                    }
                }
            }
        }
        Ok(WalkOutcome::Completed)
    }

    fn vector_element(
        &mut self,
        buffer: &mut RecordBuffer,
        elem: &FieldKind,
        id: &str,
        at: usize,
        path: &FieldPath,
    ) -> Result<WalkOutcome, EditError> {
        let schema = self.schema;
        let label = id.rsplit('.').next().unwrap_or(id);
        match elem {
            FieldKind::Scalar(kind) => {
                let value = decode::read_scalar(buffer.bytes(), at, *kind)?;
                let text = codec::scalar_to_text(*kind, &value);
                self.leaf(buffer, id, label, "", text, path, LeafKind::Scalar(*kind))
            }
            FieldKind::Str => {
                let text = decode::read_str(buffer.bytes(), at)?.to_string();
                self.leaf(buffer, id, label, "", text, path, LeafKind::Str)
            }
            FieldKind::Struct(si) => {
                let value = decode::read_struct(schema, buffer.bytes(), at, *si)?;
                let text = codec::struct_to_text(schema, *si, value.as_struct().unwrap_or(&[]));
                self.leaf(buffer, id, label, "", text, path, LeafKind::Struct(*si))
            }
            FieldKind::Table(ti) => {
                let sub = decode::table_pos_at(buffer.bytes(), at)?;
                if self.subtable_header(id, label, "") {
                    self.walk_table(buffer, *ti, sub, id, path)
                } else {
                    Ok(WalkOutcome::Completed)
                }
            }
            _ => Err(EditError::SchemaMismatch(format!(
                "unsupported vector element at {id}"
            ))),
        }
    }

    /// Handle one leaf field according to the current mode.
    fn leaf(
        &mut self,
        buffer: &mut RecordBuffer,
        id: &str,
        label: &str,
        type_hint: &str,
        canonical: String,
        path: &FieldPath,
        kind: LeafKind,
    ) -> Result<WalkOutcome, EditError> {
        match self.mode {
            VisitMode::CheckEdits => {
                if let Some(pending) = self.session.pending_text(id) {
                    if pending != canonical {
                        self.session.set_edits_pending(true);
                    }
                }
            }
            VisitMode::DrawEditAuto | VisitMode::DrawEditManual | VisitMode::DrawReadOnly => {
                let editable = self.mode.is_draw_edit();
                let pending = self
                    .session
                    .pending_text(id)
                    .filter(|p| *p != canonical);
                let shown = pending.unwrap_or(canonical.as_str()).to_string();
                let row = FieldRow {
                    id,
                    label,
                    type_hint,
                    text: &shown,
                    editable,
                    pending: pending.is_some(),
                    error: self.session.has_parse_error(id),
                };
                let Some(visitor) = self.visitor.as_deref_mut() else {
                    return Ok(WalkOutcome::Completed);
                };
                let response = visitor.field(row);
                if editable {
                    if let Some(text) = response.new_text {
                        self.session.set_pending(id, text);
                    }
                    if response.focused {
                        self.session.set_focused(Some(id.to_string()));
                    }
                    match response.action {
                        FieldAction::Commit => self.session.request_commit(),
                        FieldAction::Revert => self.session.revert(id),
                        FieldAction::None => {}
                    }
                }
            }
            VisitMode::CommitEdits => {
                let Some(pending) = self.session.pending_text(id).map(str::to_string) else {
                    return Ok(WalkOutcome::Completed);
                };
                if pending == canonical {
                    // Nothing to write; the entry is already canonical.
                    self.session.revert(id);
                    return Ok(WalkOutcome::Completed);
                }
                match self.parse_leaf(&kind, &pending) {
                    Ok(value) => match buffer.apply_patch(self.schema, path, value) {
                        Ok(PatchOutcome::InPlace) => self.session.complete_commit(id),
                        Ok(PatchOutcome::Rebuilt) => {
                            self.session.complete_commit(id);
                            log::debug!("commit of {id} resized the record, restarting");
                            return Ok(WalkOutcome::Resized);
                        }
                        Err(PatchError::NoData) => return Err(EditError::NoData),
                        Err(e) => return Err(e.into()),
                    },
                    Err(e) => {
                        log::warn!("field {id}: {e}");
                        self.session.mark_parse_error(id);
                    }
                }
            }
        }
        Ok(WalkOutcome::Completed)
    }

    fn parse_leaf(&self, kind: &LeafKind, text: &str) -> Result<Value, ParseError> {
        match kind {
            LeafKind::Scalar(k) => codec::parse_scalar(text, *k),
            LeafKind::Enum(k, ei) => codec::parse_enum(text, self.schema.enum_def(*ei), *k),
            LeafKind::Str => Ok(Value::Str(text.to_string())),
            LeafKind::Struct(si) => codec::parse_struct_text(self.schema, *si, text),
            LeafKind::UnionTag(ui) => {
                let tag = codec::parse_union_tag(text, self.schema.union_def(*ui))?;
                Ok(Value::Union { tag, value: None })
            }
        }
    }

    /// Present a subtable header and decide whether to walk into it.
    /// Check and commit passes always descend; draw passes follow
    /// the expansion state.
    fn subtable_header(&mut self, id: &str, label: &str, type_hint: &str) -> bool {
        match self.mode {
            VisitMode::CheckEdits | VisitMode::CommitEdits => true,
            _ => {
                let expanded = self.config.expand_all || self.session.is_expanded(id);
                if let Some(visitor) = self.visitor.as_deref_mut() {
                    if visitor.subtable(id, label, type_hint, expanded) {
                        self.session.toggle_expanded(id);
                    }
                }
                expanded
            }
        }
    }

    fn type_hint(&self, kind: &FieldKind, enumeration: Option<EnumIndex>) -> String {
        if !self.config.show_types {
            return String::new();
        }
        if let Some(ei) = enumeration {
            return self.schema.enum_def(ei).name.clone();
        }
        kind_name(self.schema, kind)
    }
}

fn kind_name(schema: &Schema, kind: &FieldKind) -> String {
    match kind {
        FieldKind::Scalar(k) => k.name().to_string(),
        FieldKind::Str => "string".to_string(),
        FieldKind::Struct(si) => format!(
            "{} {}",
            schema.object(*si).name,
            codec::struct_field_names(schema, *si)
        ),
        FieldKind::Table(ti) => schema.object(*ti).name.clone(),
        FieldKind::Vector(elem) => format!("[{}]", kind_name(schema, elem)),
        FieldKind::Union(ui) => schema.union_def(*ui).name.clone(),
    }
}

fn default_scalar(kind: ScalarKind) -> Value {
    match kind {
        ScalarKind::Bool => Value::Bool(false),
        k if k.is_float() => Value::Float(0.0),
        k if k.is_unsigned_int() => Value::UInt(0),
        _ => Value::Int(0),
    }
}

fn default_struct(schema: &Schema, index: ObjectIndex) -> Value {
    let object = schema.object(index);
    let values = object
        .fields
        .iter()
        .map(|f| match &f.kind {
            FieldKind::Scalar(k) => default_scalar(*k),
            FieldKind::Struct(inner) => default_struct(schema, *inner),
            _ => Value::Int(0),
        })
        .collect();
    Value::Struct(values)
}
