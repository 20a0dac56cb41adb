//! Field codec - typed values to and from canonical text.
//!
//! Pure functions, one per type category. Parsing is permissive
//! where the canonical form is not the only readable form: enums
//! accept a raw integer when the name does not match, numeric text
//! follows the usual grammar for the field's kind. Struct literals
//! use the `< v1, v2, ... >` syntax with recursive nesting; the
//! balanced-span extractor is the primitive the struct parser is
//! built on.

use tabula_schema::{EnumDef, FieldKind, ObjectIndex, ScalarKind, Schema, UnionDef, Value};
use thiserror::Error;

/// Recoverable text-parse failures. The pending edit stays in the
/// session; nothing is written to the buffer.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("'{text}' is not a valid {kind}")]
    InvalidScalar { text: String, kind: &'static str },
    #[error("'{text}' names no member of enum '{name}'")]
    InvalidEnumValue { text: String, name: String },
    #[error("unbalanced struct literal")]
    MalformedStruct,
    #[error("struct literal has {got} values, '{name}' declares {expected}")]
    FieldCountMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
}

/// Canonical text for a scalar value of the given kind. Floats use
/// the shortest round-trippable decimal, narrowed for f32 fields so
/// stored precision does not leak widening noise.
pub fn scalar_to_text(kind: ScalarKind, value: &Value) -> String {
    match (kind, value) {
        (ScalarKind::Bool, Value::Bool(b)) => b.to_string(),
        (ScalarKind::F32, v) => (v.as_float().unwrap_or(0.0) as f32).to_string(),
        (ScalarKind::F64, v) => v.as_float().unwrap_or(0.0).to_string(),
        (_, Value::Int(i)) => i.to_string(),
        (_, Value::UInt(u)) => u.to_string(),
        (_, v) => v.as_int().unwrap_or(0).to_string(),
    }
}

/// Parse scalar text. Integer kinds reject decimal points and
/// exponents (the integer grammar simply has neither); float kinds
/// accept sign, decimal point and exponent.
pub fn parse_scalar(text: &str, kind: ScalarKind) -> Result<Value, ParseError> {
    let text = text.trim();
    let err = || ParseError::InvalidScalar {
        text: text.to_string(),
        kind: kind.name(),
    };
    match kind {
        ScalarKind::Bool => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(err()),
        },
        ScalarKind::F32 | ScalarKind::F64 => {
            text.parse::<f64>().map(Value::Float).map_err(|_| err())
        }
        k if k.is_signed_int() => {
            let v = text.parse::<i64>().map_err(|_| err())?;
            if in_signed_range(k, v) {
                Ok(Value::Int(v))
            } else {
                Err(err())
            }
        }
        k => {
            let v = text.parse::<u64>().map_err(|_| err())?;
            if in_unsigned_range(k, v) {
                Ok(Value::UInt(v))
            } else {
                Err(err())
            }
        }
    }
}

fn in_signed_range(kind: ScalarKind, v: i64) -> bool {
    match kind {
        ScalarKind::I8 => i8::try_from(v).is_ok(),
        ScalarKind::I16 => i16::try_from(v).is_ok(),
        ScalarKind::I32 => i32::try_from(v).is_ok(),
        _ => true,
    }
}

fn in_unsigned_range(kind: ScalarKind, v: u64) -> bool {
    match kind {
        ScalarKind::U8 => u8::try_from(v).is_ok(),
        ScalarKind::U16 => u16::try_from(v).is_ok(),
        ScalarKind::U32 => u32::try_from(v).is_ok(),
        _ => true,
    }
}

/// Canonical text for an enum-typed scalar: the symbolic name when
/// one maps exactly, otherwise the raw integer.
pub fn enum_to_text(def: &EnumDef, value: &Value) -> String {
    let raw = value.as_int().unwrap_or(0);
    match def.name_of(raw) {
        Some(name) => name.to_string(),
        None => raw.to_string(),
    }
}

/// Parse enum text: exact symbolic name first, raw integer as the
/// fallback so partially-known enums still round-trip.
pub fn parse_enum(text: &str, def: &EnumDef, kind: ScalarKind) -> Result<Value, ParseError> {
    let text = text.trim();
    if let Some(value) = def.value_of(text) {
        return Ok(if kind.is_unsigned_int() {
            Value::UInt(value as u64)
        } else {
            Value::Int(value)
        });
    }
    parse_scalar(text, kind).map_err(|_| ParseError::InvalidEnumValue {
        text: text.to_string(),
        name: def.name.clone(),
    })
}

/// Canonical text for a union discriminant: the variant name, `NONE`
/// for tag 0, or the raw tag when it names no variant.
pub fn union_tag_to_text(def: &UnionDef, tag: u8) -> String {
    if tag == 0 {
        return "NONE".to_string();
    }
    match def.variant(tag) {
        Some(v) => v.name.clone(),
        None => tag.to_string(),
    }
}

/// Parse a union discriminant: variant name, `NONE`, or a raw tag
/// within range.
pub fn parse_union_tag(text: &str, def: &UnionDef) -> Result<u8, ParseError> {
    let text = text.trim();
    if text == "NONE" {
        return Ok(0);
    }
    if let Some(tag) = def.tag_of(text) {
        return Ok(tag);
    }
    let err = || ParseError::InvalidEnumValue {
        text: text.to_string(),
        name: def.name.clone(),
    };
    let tag = text.parse::<u8>().map_err(|_| err())?;
    if tag == 0 || def.variant(tag).is_some() {
        Ok(tag)
    } else {
        Err(err())
    }
}

/// `< v1, v2, ..., vn >` for a struct value, nesting recursively.
pub fn struct_to_text(schema: &Schema, index: ObjectIndex, values: &[Value]) -> String {
    let object = schema.object(index);
    let mut parts = Vec::with_capacity(values.len());
    for (field, value) in object.fields.iter().zip(values) {
        parts.push(match &field.kind {
            FieldKind::Scalar(kind) => scalar_to_text(*kind, value),
            FieldKind::Struct(inner) => {
                struct_to_text(schema, *inner, value.as_struct().unwrap_or(&[]))
            }
            // Validated schemas keep structs fixed-size.
            _ => String::new(),
        });
    }
    format!("< {} >", parts.join(", "))
}

/// The same shape with field names in place of values, used as a
/// type hint next to struct edit fields.
pub fn struct_field_names(schema: &Schema, index: ObjectIndex) -> String {
    let object = schema.object(index);
    let names: Vec<&str> = object.fields.iter().map(|f| f.name.as_str()).collect();
    format!("< {} >", names.join(", "))
}

/// Substring between the first `<` and its matching `>`, exclusive.
/// `None` when the brackets do not balance. Nested literals keep
/// their own brackets; whitespace and commas are the only element
/// separators inside.
pub fn extract_balanced_span(text: &str) -> Option<&str> {
    let open = text.find('<')?;
    let mut depth = 0usize;
    for (i, c) in text.char_indices().skip(open) {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open + 1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a balanced span into top-level elements. A `<` starts a
/// nested literal which is kept whole; everything else tokenizes on
/// whitespace and commas.
fn split_elements(span: &str) -> Result<Vec<&str>, ParseError> {
    let separator = |c: char| c.is_whitespace() || c == ',';
    let mut elements = Vec::new();
    let mut rest = span.trim_start_matches(separator);
    while !rest.is_empty() {
        if rest.starts_with('<') {
            let inner = extract_balanced_span(rest).ok_or(ParseError::MalformedStruct)?;
            // Keep the brackets: the element is itself a literal.
            let len = inner.len() + 2;
            elements.push(&rest[..len]);
            rest = &rest[len..];
        } else {
            let end = rest
                .find(|c: char| separator(c) || c == '<' || c == '>')
                .unwrap_or(rest.len());
            if rest[end..].starts_with('>') {
                return Err(ParseError::MalformedStruct);
            }
            elements.push(&rest[..end]);
            rest = &rest[end..];
        }
        rest = rest.trim_start_matches(separator);
    }
    Ok(elements)
}

/// Parse a struct literal against a struct definition, recursing for
/// struct-valued fields. Elements match fields positionally.
pub fn parse_struct_text(
    schema: &Schema,
    index: ObjectIndex,
    text: &str,
) -> Result<Value, ParseError> {
    let span = extract_balanced_span(text).ok_or(ParseError::MalformedStruct)?;
    let object = schema.object(index);
    let elements = split_elements(span)?;
    if elements.len() != object.fields.len() {
        return Err(ParseError::FieldCountMismatch {
            name: object.name.clone(),
            expected: object.fields.len(),
            got: elements.len(),
        });
    }
    let mut values = Vec::with_capacity(elements.len());
    for (field, element) in object.fields.iter().zip(elements) {
        values.push(match &field.kind {
            FieldKind::Scalar(kind) => parse_scalar(element, *kind)?,
            FieldKind::Struct(inner) => parse_struct_text(schema, *inner, element)?,
            _ => return Err(ParseError::MalformedStruct),
        });
    }
    Ok(Value::Struct(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_schema::{FieldDef, ObjectDef};

    #[test]
    fn scalar_text_roundtrips() {
        for (kind, value, text) in [
            (ScalarKind::Bool, Value::Bool(true), "true"),
            (ScalarKind::I8, Value::Int(-128), "-128"),
            (ScalarKind::I64, Value::Int(i64::MIN), "-9223372036854775808"),
            (ScalarKind::U64, Value::UInt(u64::MAX), "18446744073709551615"),
            (ScalarKind::U32, Value::UInt(0), "0"),
            (ScalarKind::F64, Value::Float(0.0), "0"),
            (ScalarKind::F64, Value::Float(1.25), "1.25"),
        ] {
            assert_eq!(scalar_to_text(kind, &value), text);
            assert_eq!(parse_scalar(text, kind).unwrap(), value);
        }
    }

    #[test]
    fn f32_text_does_not_leak_widening_noise() {
        let stored = Value::Float(1.2f32 as f64);
        assert_eq!(scalar_to_text(ScalarKind::F32, &stored), "1.2");
    }

    #[test]
    fn negative_zero_roundtrips() {
        let v = parse_scalar("-0", ScalarKind::F64).unwrap();
        assert_eq!(scalar_to_text(ScalarKind::F64, &v), "-0");
    }

    #[test]
    fn integer_kinds_reject_float_grammar() {
        assert!(parse_scalar("1.5", ScalarKind::I32).is_err());
        assert!(parse_scalar("1e3", ScalarKind::I32).is_err());
        assert!(parse_scalar("-1", ScalarKind::U16).is_err());
        assert!(parse_scalar("300", ScalarKind::U8).is_err());
    }

    #[test]
    fn float_kinds_accept_sign_point_exponent() {
        assert_eq!(parse_scalar("-1.5e2", ScalarKind::F64).unwrap(), Value::Float(-150.0));
        assert_eq!(parse_scalar(" .5 ", ScalarKind::F32).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn enum_name_else_integer() {
        let def = EnumDef::new("Color", vec![("RED", 0), ("GREEN", 1)]);
        assert_eq!(enum_to_text(&def, &Value::Int(1)), "GREEN");
        assert_eq!(enum_to_text(&def, &Value::Int(5)), "5");
        assert_eq!(parse_enum("RED", &def, ScalarKind::I32).unwrap(), Value::Int(0));
        assert_eq!(parse_enum("5", &def, ScalarKind::I32).unwrap(), Value::Int(5));
        assert!(matches!(
            parse_enum("red", &def, ScalarKind::I32),
            Err(ParseError::InvalidEnumValue { .. })
        ));
    }

    #[test]
    fn balanced_span_extraction() {
        assert_eq!(
            extract_balanced_span("< 1, < 2, 3 >, 4 >"),
            Some(" 1, < 2, 3 >, 4 ")
        );
        assert_eq!(extract_balanced_span("< 1, 2"), None);
        assert_eq!(extract_balanced_span("no brackets"), None);
        assert_eq!(extract_balanced_span("<>"), Some(""));
    }

    fn nested_schema() -> (Schema, ObjectIndex) {
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
        let ray = schema.add_object(ObjectDef::strukt(
            "Ray",
            28,
            vec![
                FieldDef::new("origin", FieldKind::Struct(vec3)).at_offset(0),
                FieldDef::new("dir", FieldKind::Struct(vec3)).at_offset(12),
                FieldDef::new("len", FieldKind::Scalar(ScalarKind::F32)).at_offset(24),
            ],
        ));
        (schema, ray)
    }

    #[test]
    fn struct_parse_roundtrip() {
        let (schema, ray) = nested_schema();
        let text = "< < 1, 2, 3 >, < 0, 0, -1 >, 9.5 >";
        let value = parse_struct_text(&schema, ray, text).unwrap();
        let Value::Struct(fields) = &value else { panic!() };
        assert_eq!(fields.len(), 3);
        assert_eq!(
            struct_to_text(&schema, ray, value.as_struct().unwrap()),
            text
        );
    }

    #[test]
    fn struct_parse_three_floats() {
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
        let value = parse_struct_text(&schema, vec3, "< 1.2, 3.4, 5 >").unwrap();
        assert_eq!(
            value,
            Value::Struct(vec![
                Value::Float(1.2),
                Value::Float(3.4),
                Value::Float(5.0)
            ])
        );
    }

    #[test]
    fn struct_parse_count_mismatch() {
        let (schema, ray) = nested_schema();
        let err = parse_struct_text(&schema, ray, "< < 1, 2, 3 >, 4 >").unwrap_err();
        assert!(matches!(err, ParseError::FieldCountMismatch { expected: 3, got: 2, .. }));
    }

    #[test]
    fn struct_parse_unbalanced() {
        let (schema, ray) = nested_schema();
        assert_eq!(
            parse_struct_text(&schema, ray, "< < 1, 2, 3 >, < 0, 0, 1 >, 9"),
            Err(ParseError::MalformedStruct)
        );
    }

    #[test]
    fn struct_elements_split_on_whitespace_or_commas() {
        let mut schema = Schema::new();
        let v2 = schema.add_object(ObjectDef::strukt(
            "Vec2",
            8,
            vec![
                FieldDef::new("x", FieldKind::Scalar(ScalarKind::F32)).at_offset(0),
                FieldDef::new("y", FieldKind::Scalar(ScalarKind::F32)).at_offset(4),
            ],
        ));
        assert_eq!(
            parse_struct_text(&schema, v2, "<1 2>").unwrap(),
            Value::Struct(vec![Value::Float(1.0), Value::Float(2.0)])
        );
        assert_eq!(
            parse_struct_text(&schema, v2, "<  1 ,,  2  >").unwrap(),
            Value::Struct(vec![Value::Float(1.0), Value::Float(2.0)])
        );
    }

    #[test]
    fn union_tag_text() {
        use tabula_schema::{ObjectIndex, UnionVariant};
        let def = UnionDef {
            name: "Gear".into(),
            variants: vec![UnionVariant {
                name: "Weapon".into(),
                object: ObjectIndex(0),
            }],
        };
        assert_eq!(union_tag_to_text(&def, 0), "NONE");
        assert_eq!(union_tag_to_text(&def, 1), "Weapon");
        assert_eq!(parse_union_tag("Weapon", &def).unwrap(), 1);
        assert_eq!(parse_union_tag("NONE", &def).unwrap(), 0);
        assert_eq!(parse_union_tag("1", &def).unwrap(), 1);
        assert!(parse_union_tag("Armor", &def).is_err());
        assert!(parse_union_tag("9", &def).is_err());
    }
}
