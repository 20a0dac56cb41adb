//! Record buffer store and the table-patch primitive.
//!
//! A [`RecordBuffer`] owns one canonical encoded record. Targeted
//! mutations go through [`RecordBuffer::apply_patch`], which resolves
//! a logical field path from the root on every call. Fixed-size
//! payloads are overwritten in place; any size change to
//! variable-length content rebuilds the whole buffer through the
//! value tree, shifting every downstream offset. The caller learns
//! which happened through [`PatchOutcome`] and must restart any
//! in-flight traversal after a rebuild.

use crate::decode::{self, decode_record, DecodeError};
use crate::encode::{encode_record, write_scalar_at, EncodeError};
use crate::schema::{FieldKind, ObjectIndex, Schema};
use crate::value::{TableValue, Value};
use thiserror::Error;

/// One step along a logical path into a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathStep {
    /// Descend into field `i` of the current table.
    Field(usize),
    /// Descend into element `i` of the current vector.
    Element(usize),
    /// Descend into the active variant of the current union.
    Variant,
}

/// A logical path from the root table to one field. Paths carry no
/// buffer offsets, so they survive rebuilds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldPath(pub Vec<PathStep>);

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, step: PathStep) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }
}

/// How a patch landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The field was overwritten in place; all offsets remain valid.
    InPlace,
    /// The buffer was rebuilt; every previously resolved offset is
    /// stale and traversal must restart from the root.
    Rebuilt,
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("no record data")]
    NoData,
    #[error("path does not match the schema: {0}")]
    BadPath(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Owns one mutable encoded record.
#[derive(Clone, Debug)]
pub struct RecordBuffer {
    root: ObjectIndex,
    bytes: Vec<u8>,
}

impl RecordBuffer {
    /// An empty buffer for records of the given root table type.
    pub fn new(root: ObjectIndex) -> Self {
        Self {
            root,
            bytes: Vec::new(),
        }
    }

    pub fn root(&self) -> ObjectIndex {
        self.root
    }

    pub fn has_data(&self) -> bool {
        !self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Replace the record with a deep, schema-guided copy of `raw`,
    /// or clear it. The copy decodes field by field and re-encodes
    /// canonically, so the stored bytes are well-formed even when
    /// the input used a different valid encoding.
    pub fn replace(&mut self, schema: &Schema, raw: Option<&[u8]>) -> Result<(), DecodeError> {
        match raw {
            None => {
                self.bytes.clear();
                log::debug!("record buffer cleared");
            }
            Some(raw) => {
                let tree = decode_record(schema, self.root, raw)?;
                self.bytes = encode_record(schema, self.root, &tree).map_err(|e| {
                    log::error!("re-encode of decoded record failed: {e}");
                    DecodeError::BadOffset { at: 0 }
                })?;
                log::debug!(
                    "record buffer replaced: {} -> {} canonical bytes",
                    raw.len(),
                    self.bytes.len()
                );
            }
        }
        Ok(())
    }

    /// Copy the canonical record out. `None` without data.
    pub fn export_copy(&self) -> Option<Vec<u8>> {
        if self.has_data() {
            Some(self.bytes.clone())
        } else {
            None
        }
    }

    /// Apply one field mutation. Resolves `path` from the root,
    /// mutates in place when the encoded size cannot change, and
    /// otherwise rebuilds the entire buffer with the new value
    /// substituted.
    pub fn apply_patch(
        &mut self,
        schema: &Schema,
        path: &FieldPath,
        value: Value,
    ) -> Result<PatchOutcome, PatchError> {
        if !self.has_data() {
            return Err(PatchError::NoData);
        }
        match self.try_patch_in_place(schema, path, &value)? {
            true => Ok(PatchOutcome::InPlace),
            false => {
                let mut tree = decode_record(schema, self.root, &self.bytes)?;
                set_in_tree(schema, &mut tree, self.root, &path.0, value)?;
                self.bytes = encode_record(schema, self.root, &tree)?;
                log::debug!("record buffer rebuilt ({} bytes)", self.bytes.len());
                Ok(PatchOutcome::Rebuilt)
            }
        }
    }

    /// Attempt the in-place fast path. Returns `Ok(false)` when the
    /// patch needs a rebuild (absent slot, size change, tag change).
    fn try_patch_in_place(
        &mut self,
        schema: &Schema,
        path: &FieldPath,
        value: &Value,
    ) -> Result<bool, PatchError> {
        let Some((kind, payload)) = self.resolve_leaf(schema, path)? else {
            return Ok(false);
        };
        match kind {
            FieldKind::Scalar(scalar) => {
                write_scalar_at(&mut self.bytes, payload, scalar, value)?;
                Ok(true)
            }
            FieldKind::Struct(si) => {
                write_struct_in_place(schema, &mut self.bytes, payload, si, value)?;
                Ok(true)
            }
            FieldKind::Str => {
                let current_len = decode::read_str(&self.bytes, payload)?.len();
                let Some(new) = value.as_str() else {
                    return Err(PatchError::BadPath(format!(
                        "string slot given {}",
                        value.type_name()
                    )));
                };
                if new.len() != current_len {
                    return Ok(false);
                }
                self.bytes[payload + 4..payload + 4 + new.len()]
                    .copy_from_slice(new.as_bytes());
                Ok(true)
            }
            FieldKind::Union(_) => {
                let (current_tag, _) = decode::read_union(&self.bytes, payload)?;
                let Value::Union { tag, .. } = value else {
                    return Err(PatchError::BadPath(format!(
                        "union slot given {}",
                        value.type_name()
                    )));
                };
                // Same tag keeps the variant table; nothing to write.
                Ok(*tag == current_tag)
            }
            // Tables and vectors always re-encode.
            FieldKind::Table(_) | FieldKind::Vector(_) => Ok(false),
        }
    }

    /// Walk `path` through the current bytes. Returns the leaf's
    /// field kind and payload position, or `None` when an
    /// intermediate or leaf slot is absent (which forces a rebuild).
    fn resolve_leaf(
        &self,
        schema: &Schema,
        path: &FieldPath,
    ) -> Result<Option<(FieldKind, usize)>, PatchError> {
        let bad = |msg: &str| PatchError::BadPath(msg.to_string());
        if path.0.is_empty() {
            return Err(bad("empty path"));
        }
        let mut object = self.root;
        let mut table_pos = decode::root_table_pos(&self.bytes)?;
        let mut steps = path.0.iter().peekable();
        while let Some(step) = steps.next() {
            let PathStep::Field(index) = *step else {
                return Err(bad("path must alternate fields with elements"));
            };
            let fields = &schema.object(object).fields;
            let field = fields.get(index).ok_or_else(|| bad("field out of range"))?;
            let Some(payload) = decode::field_payload_pos(&self.bytes, table_pos, index)? else {
                return Ok(None);
            };
            if steps.peek().is_none() {
                return Ok(Some((field.kind.clone(), payload)));
            }
            match &field.kind {
                FieldKind::Table(ti) => {
                    object = *ti;
                    table_pos = decode::table_pos_at(&self.bytes, payload)?;
                }
                FieldKind::Union(ui) => {
                    let Some(PathStep::Variant) = steps.next() else {
                        return Err(bad("union must descend through its variant"));
                    };
                    let (tag, sub) = decode::read_union(&self.bytes, payload)?;
                    let Some(sub) = sub else { return Ok(None) };
                    let variant = schema
                        .union_def(*ui)
                        .variant(tag)
                        .ok_or_else(|| bad("stale union tag"))?;
                    if steps.peek().is_none() {
                        return Err(bad("path ends on a union variant"));
                    }
                    object = variant.object;
                    table_pos = sub;
                }
                FieldKind::Vector(elem) => {
                    let Some(PathStep::Element(i)) = steps.next().copied() else {
                        return Err(bad("vector must descend through an element"));
                    };
                    let len = decode::vector_len(&self.bytes, payload)?;
                    if i >= len {
                        return Err(bad("vector element out of range"));
                    }
                    let at = decode::vector_elem_pos(schema, &self.bytes, payload, elem, i)?;
                    match elem.as_ref() {
                        FieldKind::Table(ti) => {
                            if steps.peek().is_none() {
                                return Err(bad("path ends on a table element"));
                            }
                            object = *ti;
                            table_pos = decode::table_pos_at(&self.bytes, at)?;
                        }
                        leaf => {
                            if steps.peek().is_some() {
                                return Err(bad("path continues past a leaf element"));
                            }
                            return Ok(Some((leaf.clone(), at)));
                        }
                    }
                }
                _ => return Err(bad("path continues past a leaf field")),
            }
        }
        Err(bad("unterminated path"))
    }
}

/// Overwrite a struct payload in place.
fn write_struct_in_place(
    schema: &Schema,
    bytes: &mut [u8],
    at: usize,
    index: ObjectIndex,
    value: &Value,
) -> Result<(), PatchError> {
    let object = schema.object(index);
    let values = value
        .as_struct()
        .filter(|v| v.len() == object.fields.len())
        .ok_or_else(|| {
            PatchError::BadPath(format!("struct '{}' given {}", object.name, value.type_name()))
        })?;
    for (field, v) in object.fields.iter().zip(values) {
        let pos = at + field.offset as usize;
        match &field.kind {
            FieldKind::Scalar(kind) => write_scalar_at(bytes, pos, *kind, v)
                .map_err(PatchError::Encode)?,
            FieldKind::Struct(inner) => write_struct_in_place(schema, bytes, pos, *inner, v)?,
            _ => {
                return Err(PatchError::BadPath(format!(
                    "struct '{}' holds a variable-length field",
                    object.name
                )))
            }
        }
    }
    Ok(())
}

/// Substitute `value` at `path` within a decoded value tree.
fn set_in_tree(
    schema: &Schema,
    tree: &mut TableValue,
    object: ObjectIndex,
    steps: &[PathStep],
    value: Value,
) -> Result<(), PatchError> {
    let bad = |msg: &str| PatchError::BadPath(msg.to_string());
    let Some((PathStep::Field(index), rest)) = steps.split_first().map(|(s, r)| (*s, r)) else {
        return Err(bad("path must start with a field"));
    };
    let fields = &schema.object(object).fields;
    let field = fields.get(index).ok_or_else(|| bad("field out of range"))?;
    if rest.is_empty() {
        tree.fields[index] = Some(normalize_leaf(schema, &field.kind, value)?);
        return Ok(());
    }
    let slot = tree.fields[index]
        .as_mut()
        .ok_or_else(|| bad("path descends into an absent field"))?;
    match (&field.kind, slot) {
        (FieldKind::Table(ti), Value::Table(sub)) => set_in_tree(schema, sub, *ti, rest, value),
        (FieldKind::Union(ui), Value::Union { tag, value: inner }) => {
            let Some((PathStep::Variant, rest)) = rest.split_first().map(|(s, r)| (*s, r)) else {
                return Err(bad("union must descend through its variant"));
            };
            let variant = schema
                .union_def(*ui)
                .variant(*tag)
                .ok_or_else(|| bad("stale union tag"))?;
            let Some(Value::Table(sub)) = inner.as_deref_mut() else {
                return Err(bad("union carries no table"));
            };
            set_in_tree(schema, sub, variant.object, rest, value)
        }
        (FieldKind::Vector(elem), Value::Vector(items)) => {
            let Some((PathStep::Element(i), rest)) = rest.split_first().map(|(s, r)| (*s, r))
            else {
                return Err(bad("vector must descend through an element"));
            };
            let item = items.get_mut(i).ok_or_else(|| bad("element out of range"))?;
            match (elem.as_ref(), rest.is_empty()) {
                (FieldKind::Table(ti), false) => {
                    let Value::Table(sub) = item else {
                        return Err(bad("vector element is not a table"));
                    };
                    set_in_tree(schema, sub, *ti, rest, value)
                }
                (leaf, true) => {
                    *item = normalize_leaf(schema, leaf, value)?;
                    Ok(())
                }
                _ => Err(bad("path continues past a leaf element")),
            }
        }
        _ => Err(bad("path continues past a leaf field")),
    }
}

/// Prepare a leaf value for insertion: a union gaining a new tag
/// materializes an empty variant table so the encoder has a body to
/// write.
fn normalize_leaf(
    schema: &Schema,
    kind: &FieldKind,
    value: Value,
) -> Result<Value, PatchError> {
    match (kind, value) {
        (FieldKind::Union(ui), Value::Union { tag, value }) => {
            let value = match (tag, value) {
                (0, _) => None,
                (tag, Some(v)) => {
                    let _ = schema
                        .union_def(*ui)
                        .variant(tag)
                        .ok_or_else(|| PatchError::BadPath("bad union tag".into()))?;
                    Some(v)
                }
                (tag, None) => {
                    let variant = schema
                        .union_def(*ui)
                        .variant(tag)
                        .ok_or_else(|| PatchError::BadPath("bad union tag".into()))?;
                    let fields = schema.object(variant.object).fields.len();
                    Some(Box::new(Value::Table(TableValue::empty(fields))))
                }
            };
            Ok(Value::Union { tag, value })
        }
        (_, value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, ObjectDef, ScalarKind};

    fn schema_with_string() -> (Schema, ObjectIndex) {
        let mut schema = Schema::new();
        let vec3 = schema.add_object(ObjectDef::strukt(
            "Vec3",
            12,
            vec![
                FieldDef::new("x", FieldKind::Scalar(ScalarKind::F32)).at_offset(0),
                FieldDef::new("y", FieldKind::Scalar(ScalarKind::F32)).at_offset(4),
                FieldDef::new("z", FieldKind::Scalar(ScalarKind::F32)).at_offset(8),
            ],
        ));
        let root = schema.add_object(ObjectDef::table(
            "Entity",
            vec![
                FieldDef::new("name", FieldKind::Str),
                FieldDef::new("hp", FieldKind::Scalar(ScalarKind::I32)),
                FieldDef::new("pos", FieldKind::Struct(vec3)),
            ],
        ));
        (schema, root)
    }

    fn filled(schema: &Schema, root: ObjectIndex) -> RecordBuffer {
        let table = TableValue::empty(3)
            .set(0, Value::from("bob"))
            .set(1, Value::Int(10))
            .set(
                2,
                Value::Struct(vec![Value::Float(0.0), Value::Float(0.0), Value::Float(0.0)]),
            );
        let bytes = encode_record(schema, root, &table).unwrap();
        let mut buffer = RecordBuffer::new(root);
        buffer.replace(schema, Some(&bytes)).unwrap();
        buffer
    }

    #[test]
    fn replace_none_clears() {
        let (schema, root) = schema_with_string();
        let mut buffer = filled(&schema, root);
        assert!(buffer.has_data());
        buffer.replace(&schema, None).unwrap();
        assert!(!buffer.has_data());
        assert!(buffer.export_copy().is_none());
    }

    #[test]
    fn replace_is_canonical_fixed_point() {
        let (schema, root) = schema_with_string();
        let mut buffer = filled(&schema, root);
        let first = buffer.export_copy().unwrap();
        buffer.replace(&schema, Some(&first)).unwrap();
        let second = buffer.export_copy().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn scalar_patch_is_in_place() {
        let (schema, root) = schema_with_string();
        let mut buffer = filled(&schema, root);
        let before = buffer.bytes().len();
        let path = FieldPath::root().child(PathStep::Field(1));
        let outcome = buffer.apply_patch(&schema, &path, Value::Int(99)).unwrap();
        assert_eq!(outcome, PatchOutcome::InPlace);
        assert_eq!(buffer.bytes().len(), before);
        let tree = decode_record(&schema, root, buffer.bytes()).unwrap();
        assert_eq!(tree.get(1), Some(&Value::Int(99)));
    }

    #[test]
    fn struct_patch_is_in_place() {
        let (schema, root) = schema_with_string();
        let mut buffer = filled(&schema, root);
        let path = FieldPath::root().child(PathStep::Field(2));
        let v = Value::Struct(vec![Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)]);
        assert_eq!(
            buffer.apply_patch(&schema, &path, v.clone()).unwrap(),
            PatchOutcome::InPlace
        );
        let tree = decode_record(&schema, root, buffer.bytes()).unwrap();
        assert_eq!(tree.get(2), Some(&v));
    }

    #[test]
    fn equal_length_string_patch_is_in_place() {
        let (schema, root) = schema_with_string();
        let mut buffer = filled(&schema, root);
        let path = FieldPath::root().child(PathStep::Field(0));
        assert_eq!(
            buffer
                .apply_patch(&schema, &path, Value::from("rob"))
                .unwrap(),
            PatchOutcome::InPlace
        );
        let tree = decode_record(&schema, root, buffer.bytes()).unwrap();
        assert_eq!(tree.get(0), Some(&Value::from("rob")));
    }

    #[test]
    fn growing_string_rebuilds_and_preserves_other_fields() {
        let (schema, root) = schema_with_string();
        let mut buffer = filled(&schema, root);
        let path = FieldPath::root().child(PathStep::Field(0));
        assert_eq!(
            buffer
                .apply_patch(&schema, &path, Value::from("a much longer name"))
                .unwrap(),
            PatchOutcome::Rebuilt
        );
        let tree = decode_record(&schema, root, buffer.bytes()).unwrap();
        assert_eq!(tree.get(0), Some(&Value::from("a much longer name")));
        assert_eq!(tree.get(1), Some(&Value::Int(10)));
    }

    #[test]
    fn patch_into_absent_field_rebuilds() {
        let (schema, root) = schema_with_string();
        let table = TableValue::empty(3);
        let bytes = encode_record(&schema, root, &table).unwrap();
        let mut buffer = RecordBuffer::new(root);
        buffer.replace(&schema, Some(&bytes)).unwrap();
        let path = FieldPath::root().child(PathStep::Field(1));
        assert_eq!(
            buffer.apply_patch(&schema, &path, Value::Int(5)).unwrap(),
            PatchOutcome::Rebuilt
        );
        let tree = decode_record(&schema, root, buffer.bytes()).unwrap();
        assert_eq!(tree.get(1), Some(&Value::Int(5)));
    }

    #[test]
    fn patch_without_data_is_no_data() {
        let (schema, root) = schema_with_string();
        let mut buffer = RecordBuffer::new(root);
        let path = FieldPath::root().child(PathStep::Field(1));
        assert!(matches!(
            buffer.apply_patch(&schema, &path, Value::Int(5)),
            Err(PatchError::NoData)
        ));
    }

    #[test]
    fn bad_path_is_rejected() {
        let (schema, root) = schema_with_string();
        let mut buffer = filled(&schema, root);
        let path = FieldPath::root().child(PathStep::Field(9));
        assert!(matches!(
            buffer.apply_patch(&schema, &path, Value::Int(5)),
            Err(PatchError::BadPath(_))
        ));
    }
}
