//! Bounds-checked reads over an encoded record.
//!
//! Two layers: position primitives (slot resolution, scalar/string/
//! vector reads) used by the traversal engine, and a full recursive
//! decode into a [`TableValue`] used for canonicalization and
//! rebuilds. Every offset is buffer-relative and validated before
//! dereferencing; nothing here trusts the input bytes.

use crate::schema::{FieldKind, ObjectIndex, ScalarKind, Schema};
use crate::value::{TableValue, Value};
use thiserror::Error;

/// Nesting bound for hostile inputs whose table offsets form a cycle.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty record")]
    Empty,
    #[error("record truncated at offset {at}")]
    Truncated { at: usize },
    #[error("offset {at} escapes the buffer")]
    BadOffset { at: usize },
    #[error("invalid utf-8 in string at offset {at}")]
    BadUtf8 { at: usize },
    #[error("table at {at} declares {got} slots, schema expects {expected}")]
    SlotCount { at: usize, expected: usize, got: usize },
    #[error("union tag {tag} at offset {at} selects no variant")]
    BadTag { at: usize, tag: u8 },
    #[error("record nesting exceeds {MAX_DEPTH} levels")]
    TooDeep,
}

fn bytes_at(buf: &[u8], at: usize, len: usize) -> Result<&[u8], DecodeError> {
    buf.get(at..at + len).ok_or(DecodeError::Truncated { at })
}

pub fn read_u16(buf: &[u8], at: usize) -> Result<u16, DecodeError> {
    let b = bytes_at(buf, at, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

pub fn read_u32(buf: &[u8], at: usize) -> Result<u32, DecodeError> {
    let b = bytes_at(buf, at, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Resolve the root table position from the record header.
pub fn root_table_pos(buf: &[u8]) -> Result<usize, DecodeError> {
    if buf.is_empty() {
        return Err(DecodeError::Empty);
    }
    let pos = read_u32(buf, 0)? as usize;
    if pos < 4 || pos >= buf.len() {
        return Err(DecodeError::BadOffset { at: 0 });
    }
    Ok(pos)
}

/// Payload position of one field slot, or `None` for an absent field.
pub fn field_payload_pos(
    buf: &[u8],
    table_pos: usize,
    index: usize,
) -> Result<Option<usize>, DecodeError> {
    let count = read_u16(buf, table_pos)? as usize;
    if index >= count {
        return Err(DecodeError::SlotCount {
            at: table_pos,
            expected: index + 1,
            got: count,
        });
    }
    let entry = read_u32(buf, table_pos + 2 + index * 4)? as usize;
    if entry == 0 {
        return Ok(None);
    }
    if entry >= buf.len() {
        return Err(DecodeError::BadOffset {
            at: table_pos + 2 + index * 4,
        });
    }
    Ok(Some(entry))
}

pub fn read_scalar(buf: &[u8], at: usize, kind: ScalarKind) -> Result<Value, DecodeError> {
    let b = bytes_at(buf, at, kind.byte_width())?;
    Ok(match kind {
        ScalarKind::Bool => Value::Bool(b[0] != 0),
        ScalarKind::I8 => Value::Int(i8::from_le_bytes([b[0]]) as i64),
        ScalarKind::U8 => Value::UInt(b[0] as u64),
        ScalarKind::I16 => Value::Int(i16::from_le_bytes([b[0], b[1]]) as i64),
        ScalarKind::U16 => Value::UInt(u16::from_le_bytes([b[0], b[1]]) as u64),
        ScalarKind::I32 => Value::Int(i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64),
        ScalarKind::U32 => Value::UInt(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as u64),
        ScalarKind::I64 => Value::Int(i64::from_le_bytes(b.try_into().expect("width 8"))),
        ScalarKind::U64 => Value::UInt(u64::from_le_bytes(b.try_into().expect("width 8"))),
        ScalarKind::F32 => {
            Value::Float(f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
        }
        ScalarKind::F64 => Value::Float(f64::from_le_bytes(b.try_into().expect("width 8"))),
    })
}

/// Read a length-prefixed UTF-8 string payload.
pub fn read_str(buf: &[u8], at: usize) -> Result<&str, DecodeError> {
    let len = read_u32(buf, at)? as usize;
    let b = bytes_at(buf, at + 4, len)?;
    std::str::from_utf8(b).map_err(|_| DecodeError::BadUtf8 { at })
}

/// Decode a struct payload into `Value::Struct`.
pub fn read_struct(
    schema: &Schema,
    buf: &[u8],
    at: usize,
    index: ObjectIndex,
) -> Result<Value, DecodeError> {
    let object = schema.object(index);
    let mut values = Vec::with_capacity(object.fields.len());
    for field in &object.fields {
        let pos = at + field.offset as usize;
        values.push(match &field.kind {
            FieldKind::Scalar(kind) => read_scalar(buf, pos, *kind)?,
            FieldKind::Struct(inner) => read_struct(schema, buf, pos, *inner)?,
            // Validated schemas only put fixed-size fields in structs.
            _ => return Err(DecodeError::BadOffset { at: pos }),
        });
    }
    Ok(Value::Struct(values))
}

pub fn vector_len(buf: &[u8], at: usize) -> Result<usize, DecodeError> {
    Ok(read_u32(buf, at)? as usize)
}

/// Payload position of vector element `i`. For table elements this
/// is the position of the element's u32 offset entry.
pub fn vector_elem_pos(
    schema: &Schema,
    buf: &[u8],
    at: usize,
    elem: &FieldKind,
    i: usize,
) -> Result<usize, DecodeError> {
    let base = at + 4;
    match elem {
        FieldKind::Scalar(kind) => Ok(base + i * kind.byte_width()),
        FieldKind::Struct(si) => Ok(base + i * schema.object(*si).byte_size as usize),
        FieldKind::Table(_) => Ok(base + i * 4),
        FieldKind::Str => {
            // Strings have variable stride; walk the prefix.
            let mut pos = base;
            for _ in 0..i {
                let len = read_u32(buf, pos)? as usize;
                pos += 4 + len;
            }
            Ok(pos)
        }
        _ => Err(DecodeError::BadOffset { at }),
    }
}

/// Resolve a table offset entry (subtable slot payload or vector
/// element entry) into a table position.
pub fn table_pos_at(buf: &[u8], at: usize) -> Result<usize, DecodeError> {
    let pos = read_u32(buf, at)? as usize;
    if pos < 4 || pos >= buf.len() {
        return Err(DecodeError::BadOffset { at });
    }
    Ok(pos)
}

/// Read a union payload: the tag and the variant table position
/// (`None` when the tag is 0).
pub fn read_union(buf: &[u8], at: usize) -> Result<(u8, Option<usize>), DecodeError> {
    let tag = bytes_at(buf, at, 1)?[0];
    if tag == 0 {
        return Ok((0, None));
    }
    Ok((tag, Some(table_pos_at(buf, at + 1)?)))
}

/// Decode a whole record into a value tree.
pub fn decode_record(
    schema: &Schema,
    root: ObjectIndex,
    buf: &[u8],
) -> Result<TableValue, DecodeError> {
    let pos = root_table_pos(buf)?;
    decode_table(schema, buf, root, pos, 0)
}

fn decode_table(
    schema: &Schema,
    buf: &[u8],
    index: ObjectIndex,
    pos: usize,
    depth: usize,
) -> Result<TableValue, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::TooDeep);
    }
    let object = schema.object(index);
    let count = read_u16(buf, pos)? as usize;
    if count != object.fields.len() {
        return Err(DecodeError::SlotCount {
            at: pos,
            expected: object.fields.len(),
            got: count,
        });
    }
    let mut table = TableValue::empty(object.fields.len());
    for (i, field) in object.fields.iter().enumerate() {
        let Some(payload) = field_payload_pos(buf, pos, i)? else {
            continue;
        };
        let value = match &field.kind {
            FieldKind::Scalar(kind) => read_scalar(buf, payload, *kind)?,
            FieldKind::Str => Value::Str(read_str(buf, payload)?.to_string()),
            FieldKind::Struct(si) => read_struct(schema, buf, payload, *si)?,
            FieldKind::Table(ti) => {
                let sub = table_pos_at(buf, payload)?;
                Value::Table(decode_table(schema, buf, *ti, sub, depth + 1)?)
            }
            FieldKind::Vector(elem) => {
                let len = vector_len(buf, payload)?;
                let mut items = Vec::with_capacity(len.min(1024));
                for j in 0..len {
                    let at = vector_elem_pos(schema, buf, payload, elem, j)?;
                    items.push(match elem.as_ref() {
                        FieldKind::Scalar(kind) => read_scalar(buf, at, *kind)?,
                        FieldKind::Str => Value::Str(read_str(buf, at)?.to_string()),
                        FieldKind::Struct(si) => read_struct(schema, buf, at, *si)?,
                        FieldKind::Table(ti) => {
                            let sub = table_pos_at(buf, at)?;
                            Value::Table(decode_table(schema, buf, *ti, sub, depth + 1)?)
                        }
                        _ => return Err(DecodeError::BadOffset { at }),
                    });
                }
                Value::Vector(items)
            }
            FieldKind::Union(ui) => {
                let (tag, sub) = read_union(buf, payload)?;
                let value = match sub {
                    None => None,
                    Some(sub) => {
                        let variant = schema
                            .union_def(*ui)
                            .variant(tag)
                            .ok_or(DecodeError::BadTag { at: payload, tag })?;
                        Some(Box::new(Value::Table(decode_table(
                            schema,
                            buf,
                            variant.object,
                            sub,
                            depth + 1,
                        )?)))
                    }
                };
                Value::Union { tag, value }
            }
        };
        table.fields[i] = Some(value);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_record;
    use crate::schema::{EnumDef, FieldDef, ObjectDef, UnionDef, UnionVariant};

    fn full_schema() -> (Schema, ObjectIndex) {
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
        let color = schema.add_enum(EnumDef::new("Color", vec![("RED", 0), ("GREEN", 1)]));
        let weapon = schema.add_object(ObjectDef::table(
            "Weapon",
            vec![FieldDef::new("damage", FieldKind::Scalar(ScalarKind::I32))],
        ));
        let shield = schema.add_object(ObjectDef::table(
            "Shield",
            vec![FieldDef::new("block", FieldKind::Scalar(ScalarKind::I32))],
        ));
        let gear = schema.add_union(UnionDef {
            name: "Gear".into(),
            variants: vec![
                UnionVariant {
                    name: "Weapon".into(),
                    object: weapon,
                },
                UnionVariant {
                    name: "Shield".into(),
                    object: shield,
                },
            ],
        });
        let root = schema.add_object(ObjectDef::table(
            "Entity",
            vec![
                FieldDef::new("name", FieldKind::Str),
                FieldDef::new("pos", FieldKind::Struct(vec3)),
                FieldDef::new("tag", FieldKind::Scalar(ScalarKind::I32)).with_enum(color),
                FieldDef::new("tags", FieldKind::Vector(Box::new(FieldKind::Str))),
                FieldDef::new("gear", FieldKind::Union(gear)),
                FieldDef::new(
                    "inventory",
                    FieldKind::Vector(Box::new(FieldKind::Table(weapon))),
                ),
            ],
        ));
        (schema, root)
    }

    fn sample() -> TableValue {
        let weapon = TableValue::empty(1).set(0, Value::Int(42));
        TableValue::empty(6)
            .set(0, Value::from("anvil"))
            .set(
                1,
                Value::Struct(vec![
                    Value::Float(1.5),
                    Value::Float(-2.0),
                    Value::Float(0.0),
                ]),
            )
            .set(2, Value::Int(1))
            .set(
                3,
                Value::Vector(vec![Value::from("alpha"), Value::from("b")]),
            )
            .set(
                4,
                Value::Union {
                    tag: 1,
                    value: Some(Box::new(Value::Table(weapon.clone()))),
                },
            )
            .set(5, Value::Vector(vec![Value::Table(weapon)]))
    }

    #[test]
    fn decode_inverts_encode() {
        let (schema, root) = full_schema();
        let table = sample();
        let bytes = encode_record(&schema, root, &table).unwrap();
        let back = decode_record(&schema, root, &bytes).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn absent_fields_stay_absent() {
        let (schema, root) = full_schema();
        let table = TableValue::empty(6).set(0, Value::from("only-name"));
        let bytes = encode_record(&schema, root, &table).unwrap();
        let back = decode_record(&schema, root, &bytes).unwrap();
        assert_eq!(back, table);
        assert!(back.get(1).is_none());
    }

    #[test]
    fn empty_buffer_is_rejected() {
        assert!(matches!(root_table_pos(&[]), Err(DecodeError::Empty)));
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let (schema, root) = full_schema();
        let bytes = encode_record(&schema, root, &sample()).unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert!(decode_record(&schema, root, cut).is_err());
    }

    #[test]
    fn slot_count_mismatch_is_rejected() {
        let (schema, root) = full_schema();
        let mut bytes = encode_record(&schema, root, &sample()).unwrap();
        // Corrupt the root slot count.
        let pos = root_table_pos(&bytes).unwrap();
        bytes[pos] = 2;
        assert!(matches!(
            decode_record(&schema, root, &bytes),
            Err(DecodeError::SlotCount { .. })
        ));
    }

    #[test]
    fn string_vector_strides_resolve() {
        let (schema, root) = full_schema();
        let bytes = encode_record(&schema, root, &sample()).unwrap();
        let table = root_table_pos(&bytes).unwrap();
        let payload = field_payload_pos(&bytes, table, 3).unwrap().unwrap();
        assert_eq!(vector_len(&bytes, payload).unwrap(), 2);
        let p1 = vector_elem_pos(&schema, &bytes, payload, &FieldKind::Str, 1).unwrap();
        assert_eq!(read_str(&bytes, p1).unwrap(), "b");
    }

    #[test]
    fn union_tag_resolves_variant() {
        let (schema, root) = full_schema();
        let bytes = encode_record(&schema, root, &sample()).unwrap();
        let table = root_table_pos(&bytes).unwrap();
        let payload = field_payload_pos(&bytes, table, 4).unwrap().unwrap();
        let (tag, sub) = read_union(&bytes, payload).unwrap();
        assert_eq!(tag, 1);
        let sub = sub.unwrap();
        let damage = field_payload_pos(&bytes, sub, 0).unwrap().unwrap();
        assert_eq!(read_scalar(&bytes, damage, ScalarKind::I32).unwrap(), Value::Int(42));
    }
}
