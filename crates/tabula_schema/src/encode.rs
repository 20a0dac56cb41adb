//! Canonical record encoder.
//!
//! Layout: bytes 0..4 hold the absolute offset of the root table.
//! A table is a u16 slot count followed by one u32 slot entry per
//! declared field (0 = absent), then the present payloads in
//! declared field order. Nested tables are appended after the
//! enclosing table and referenced through their slot payloads, so
//! payload offsets within a table are non-decreasing.

use crate::schema::{FieldKind, ObjectIndex, ScalarKind, Schema};
use crate::value::{TableValue, Value};
use thiserror::Error;

/// Value-shape failures while encoding. Values produced by decoding
/// or by the field codec always match the schema, so any of these
/// indicates an integrity bug rather than bad user input.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("object '{object}' field '{field}': expected {expected}, got {got}")]
    ShapeMismatch {
        object: String,
        field: String,
        expected: &'static str,
        got: &'static str,
    },
    #[error("object '{object}': value has {got} fields, schema declares {expected}")]
    FieldCount {
        object: String,
        expected: usize,
        got: usize,
    },
    #[error("scalar out of range for {kind}")]
    OutOfRange { kind: &'static str },
    #[error("union tag {tag} selects no variant")]
    BadUnionTag { tag: u8 },
    #[error("record exceeds the 4 GiB offset space")]
    TooLarge,
}

/// Deferred subtable write: patch position, object type, value.
type Deferred<'v> = (usize, ObjectIndex, &'v TableValue);

/// Encode one record rooted at `root` into fresh canonical bytes.
pub fn encode_record(
    schema: &Schema,
    root: ObjectIndex,
    table: &TableValue,
) -> Result<Vec<u8>, EncodeError> {
    let mut out = vec![0u8; 4];
    let pos = encode_table(schema, &mut out, root, table)?;
    out[0..4].copy_from_slice(&pos.to_le_bytes());
    Ok(out)
}

fn checked_pos(out: &[u8]) -> Result<u32, EncodeError> {
    u32::try_from(out.len()).map_err(|_| EncodeError::TooLarge)
}

fn patch_u32(out: &mut [u8], at: usize, value: u32) {
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn encode_table(
    schema: &Schema,
    out: &mut Vec<u8>,
    index: ObjectIndex,
    table: &TableValue,
) -> Result<u32, EncodeError> {
    let object = schema.object(index);
    if table.fields.len() != object.fields.len() {
        return Err(EncodeError::FieldCount {
            object: object.name.clone(),
            expected: object.fields.len(),
            got: table.fields.len(),
        });
    }
    let base = checked_pos(out)?;
    out.extend_from_slice(&(object.fields.len() as u16).to_le_bytes());
    let slots = out.len();
    out.resize(slots + object.fields.len() * 4, 0);

    let mut deferred: Vec<Deferred<'_>> = Vec::new();
    for (i, (field, slot)) in object.fields.iter().zip(&table.fields).enumerate() {
        let Some(value) = slot else { continue };
        let payload = checked_pos(out)?;
        patch_u32(out, slots + 4 * i, payload);
        let shape = |expected: &'static str, got: &'static str| EncodeError::ShapeMismatch {
            object: object.name.clone(),
            field: field.name.clone(),
            expected,
            got,
        };
        match &field.kind {
            FieldKind::Scalar(kind) => write_scalar(out, *kind, value)?,
            FieldKind::Str => {
                let s = value.as_str().ok_or_else(|| shape("string", value.type_name()))?;
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            FieldKind::Struct(si) => {
                let base = out.len();
                out.resize(base + schema.object(*si).byte_size as usize, 0);
                write_struct(schema, out, *si, value, base)?;
            }
            FieldKind::Table(ti) => {
                let tv = value.as_table().ok_or_else(|| shape("table", value.type_name()))?;
                let at = out.len();
                out.resize(at + 4, 0);
                deferred.push((at, *ti, tv));
            }
            FieldKind::Vector(elem) => {
                let Value::Vector(items) = value else {
                    return Err(shape("vector", value.type_name()));
                };
                out.extend_from_slice(&(items.len() as u32).to_le_bytes());
                match elem.as_ref() {
                    FieldKind::Scalar(kind) => {
                        for item in items {
                            write_scalar(out, *kind, item)?;
                        }
                    }
                    FieldKind::Str => {
                        for item in items {
                            let s = item
                                .as_str()
                                .ok_or_else(|| shape("string", item.type_name()))?;
                            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                            out.extend_from_slice(s.as_bytes());
                        }
                    }
                    FieldKind::Struct(si) => {
                        for item in items {
                            let base = out.len();
                            out.resize(base + schema.object(*si).byte_size as usize, 0);
                            write_struct(schema, out, *si, item, base)?;
                        }
                    }
                    FieldKind::Table(ti) => {
                        for item in items {
                            let tv = item
                                .as_table()
                                .ok_or_else(|| shape("table", item.type_name()))?;
                            let at = out.len();
                            out.resize(at + 4, 0);
                            deferred.push((at, *ti, tv));
                        }
                    }
                    _ => return Err(shape("vector element", "unsupported")),
                }
            }
            FieldKind::Union(ui) => {
                let Value::Union { tag, value: inner } = value else {
                    return Err(shape("union", value.type_name()));
                };
                out.push(*tag);
                let at = out.len();
                out.resize(at + 4, 0);
                if *tag != 0 {
                    let variant = schema
                        .union_def(*ui)
                        .variant(*tag)
                        .ok_or(EncodeError::BadUnionTag { tag: *tag })?;
                    let tv = inner
                        .as_deref()
                        .and_then(Value::as_table)
                        .ok_or_else(|| shape("union table", value.type_name()))?;
                    deferred.push((at, variant.object, tv));
                }
            }
        }
    }

    for (at, obj, tv) in deferred {
        let pos = encode_table(schema, out, obj, tv)?;
        patch_u32(out, at, pos);
    }
    Ok(base)
}

/// Write a struct payload into an already reserved region at `base`.
fn write_struct(
    schema: &Schema,
    out: &mut [u8],
    index: ObjectIndex,
    value: &Value,
    base: usize,
) -> Result<(), EncodeError> {
    let object = schema.object(index);
    let values = value.as_struct().ok_or_else(|| EncodeError::ShapeMismatch {
        object: object.name.clone(),
        field: String::new(),
        expected: "struct",
        got: value.type_name(),
    })?;
    if values.len() != object.fields.len() {
        return Err(EncodeError::FieldCount {
            object: object.name.clone(),
            expected: object.fields.len(),
            got: values.len(),
        });
    }
    for (field, v) in object.fields.iter().zip(values) {
        let at = base + field.offset as usize;
        match &field.kind {
            FieldKind::Scalar(kind) => write_scalar_at(out, at, *kind, v)?,
            FieldKind::Struct(inner) => write_struct(schema, out, *inner, v, at)?,
            _ => {
                return Err(EncodeError::ShapeMismatch {
                    object: object.name.clone(),
                    field: field.name.clone(),
                    expected: "fixed-size field",
                    got: v.type_name(),
                })
            }
        }
    }
    Ok(())
}

fn scalar_bytes(kind: ScalarKind, value: &Value) -> Result<([u8; 8], usize), EncodeError> {
    let err = || EncodeError::OutOfRange { kind: kind.name() };
    let mut bytes = [0u8; 8];
    let width = kind.byte_width();
    match kind {
        ScalarKind::Bool => bytes[0] = value.as_bool().ok_or_else(err)? as u8,
        ScalarKind::I8 => {
            let v = i8::try_from(value.as_int().ok_or_else(err)?).map_err(|_| err())?;
            bytes[..1].copy_from_slice(&v.to_le_bytes());
        }
        ScalarKind::U8 => {
            let v = u8::try_from(value.as_uint().ok_or_else(err)?).map_err(|_| err())?;
            bytes[..1].copy_from_slice(&v.to_le_bytes());
        }
        ScalarKind::I16 => {
            let v = i16::try_from(value.as_int().ok_or_else(err)?).map_err(|_| err())?;
            bytes[..2].copy_from_slice(&v.to_le_bytes());
        }
        ScalarKind::U16 => {
            let v = u16::try_from(value.as_uint().ok_or_else(err)?).map_err(|_| err())?;
            bytes[..2].copy_from_slice(&v.to_le_bytes());
        }
        ScalarKind::I32 => {
            let v = i32::try_from(value.as_int().ok_or_else(err)?).map_err(|_| err())?;
            bytes[..4].copy_from_slice(&v.to_le_bytes());
        }
        ScalarKind::U32 => {
            let v = u32::try_from(value.as_uint().ok_or_else(err)?).map_err(|_| err())?;
            bytes[..4].copy_from_slice(&v.to_le_bytes());
        }
        ScalarKind::I64 => {
            bytes.copy_from_slice(&value.as_int().ok_or_else(err)?.to_le_bytes());
        }
        ScalarKind::U64 => {
            bytes.copy_from_slice(&value.as_uint().ok_or_else(err)?.to_le_bytes());
        }
        ScalarKind::F32 => {
            let v = value.as_float().ok_or_else(err)? as f32;
            bytes[..4].copy_from_slice(&v.to_le_bytes());
        }
        ScalarKind::F64 => {
            bytes.copy_from_slice(&value.as_float().ok_or_else(err)?.to_le_bytes());
        }
    }
    Ok((bytes, width))
}

fn write_scalar(out: &mut Vec<u8>, kind: ScalarKind, value: &Value) -> Result<(), EncodeError> {
    let (bytes, width) = scalar_bytes(kind, value)?;
    out.extend_from_slice(&bytes[..width]);
    Ok(())
}

/// Write a scalar into an already reserved region.
pub(crate) fn write_scalar_at(
    out: &mut [u8],
    at: usize,
    kind: ScalarKind,
    value: &Value,
) -> Result<(), EncodeError> {
    let (bytes, width) = scalar_bytes(kind, value)?;
    out[at..at + width].copy_from_slice(&bytes[..width]);
    Ok(())
}
