//! Schema model - read-only description of record layout.
//!
//! Objects, enums and unions live in index arenas on [`Schema`].
//! Fields hold indices rather than owning references, which keeps
//! recursive table types (a table containing a vector of itself)
//! representable without ownership cycles.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index of an object definition within a [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectIndex(pub usize);

/// Index of an enum definition within a [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnumIndex(pub usize);

/// Index of a union definition within a [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnionIndex(pub usize);

/// Fixed-width scalar kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ScalarKind {
    /// Encoded width in bytes.
    pub fn byte_width(self) -> usize {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_signed_int(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    pub fn is_unsigned_int(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    pub fn is_integer(self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

/// The type of one field slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Fixed-width scalar, inline.
    Scalar(ScalarKind),
    /// UTF-8 string, length-prefixed.
    Str,
    /// Fixed-size struct, packed inline.
    Struct(ObjectIndex),
    /// Nested table, stored as an offset.
    Table(ObjectIndex),
    /// Homogeneous vector. Element kind must itself be a scalar,
    /// string, struct or table.
    Vector(Box<FieldKind>),
    /// Tagged union of table variants.
    Union(UnionIndex),
}

impl FieldKind {
    /// True if the encoded payload has a size independent of the
    /// stored value.
    pub fn is_fixed_size(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Struct(_))
    }
}

/// One named slot within an object definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    /// Byte offset within the parent struct payload. Unused for
    /// table fields, which are located through their slot entry.
    #[serde(default)]
    pub offset: u32,
    /// Enum attached to an integer scalar field.
    #[serde(default)]
    pub enumeration: Option<EnumIndex>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            offset: 0,
            enumeration: None,
        }
    }

    /// Set the byte offset within a struct payload.
    pub fn at_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Attach an enum definition to an integer scalar field.
    pub fn with_enum(mut self, index: EnumIndex) -> Self {
        self.enumeration = Some(index);
        self
    }
}

/// One composite type: a table (variable-length, slot-addressed) or
/// a struct (fixed-size, offset-addressed).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectDef {
    pub name: String,
    pub is_struct: bool,
    /// Packed payload size. Structs only.
    #[serde(default)]
    pub byte_size: u32,
    pub fields: Vec<FieldDef>,
}

impl ObjectDef {
    pub fn table(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            is_struct: false,
            byte_size: 0,
            fields,
        }
    }

    pub fn strukt(name: impl Into<String>, byte_size: u32, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            is_struct: true,
            byte_size,
            fields,
        }
    }
}

/// One enum member.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnumEntry {
    pub name: String,
    pub value: i64,
}

/// Ordered name/value mapping for an enum-typed field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub entries: Vec<EnumEntry>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>, entries: Vec<(&str, i64)>) -> Self {
        Self {
            name: name.into(),
            entries: entries
                .into_iter()
                .map(|(name, value)| EnumEntry {
                    name: name.to_string(),
                    value,
                })
                .collect(),
        }
    }

    /// Symbolic name for a stored value, if one maps exactly.
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.value == value)
            .map(|e| e.name.as_str())
    }

    /// Stored value for a symbolic name. Case-sensitive, exact.
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value)
    }
}

/// One union variant: a name and the table type it selects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnionVariant {
    pub name: String,
    pub object: ObjectIndex,
}

/// Tagged union over table variants. Tag 0 means "none"; tag `k`
/// selects `variants[k - 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnionDef {
    pub name: String,
    pub variants: Vec<UnionVariant>,
}

impl UnionDef {
    /// Variant selected by a non-zero tag.
    pub fn variant(&self, tag: u8) -> Option<&UnionVariant> {
        if tag == 0 {
            None
        } else {
            self.variants.get(tag as usize - 1)
        }
    }

    /// Tag for a variant name, if present.
    pub fn tag_of(&self, name: &str) -> Option<u8> {
        self.variants
            .iter()
            .position(|v| v.name == name)
            .map(|i| (i + 1) as u8)
    }
}

/// Schema validation failures. All of these are fatal at
/// construction time; a validated schema never fails lookups later.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown root object '{0}'")]
    UnknownObject(String),
    #[error("object '{object}' field '{field}': dangling object index {index}")]
    DanglingObject {
        object: String,
        field: String,
        index: usize,
    },
    #[error("object '{object}' field '{field}': dangling enum index {index}")]
    DanglingEnum {
        object: String,
        field: String,
        index: usize,
    },
    #[error("object '{object}' field '{field}': dangling union index {index}")]
    DanglingUnion {
        object: String,
        field: String,
        index: usize,
    },
    #[error("struct '{object}' field '{field}' is not fixed-size")]
    NonFixedStructField { object: String, field: String },
    #[error("struct '{object}' field '{field}' overruns byte_size {size}")]
    StructFieldOverrun {
        object: String,
        field: String,
        size: u32,
    },
    #[error("struct '{0}' recursively contains itself")]
    StructCycle(String),
    #[error("object '{object}' field '{field}': struct reference targets a table")]
    StructRefToTable { object: String, field: String },
    #[error("object '{object}' field '{field}': table reference targets a struct")]
    TableRefToStruct { object: String, field: String },
    #[error("object '{object}' field '{field}': vector element kind not supported")]
    BadVectorElement { object: String, field: String },
    #[error("object '{object}' field '{field}': enum attached to non-integer field")]
    EnumOnNonInteger { object: String, field: String },
    #[error("union '{0}' has no variants")]
    EmptyUnion(String),
    #[error("union '{union}' variant '{variant}' targets a struct")]
    UnionVariantNotTable { union: String, variant: String },
}

/// Arena of object, enum and union definitions describing one record
/// family. Owned by the schema-supplying collaborator, referenced by
/// everything else.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub objects: Vec<ObjectDef>,
    pub enums: Vec<EnumDef>,
    pub unions: Vec<UnionDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, object: ObjectDef) -> ObjectIndex {
        self.objects.push(object);
        ObjectIndex(self.objects.len() - 1)
    }

    pub fn add_enum(&mut self, def: EnumDef) -> EnumIndex {
        self.enums.push(def);
        EnumIndex(self.enums.len() - 1)
    }

    pub fn add_union(&mut self, def: UnionDef) -> UnionIndex {
        self.unions.push(def);
        UnionIndex(self.unions.len() - 1)
    }

    /// Look up an object definition. Indices come from this schema,
    /// so out-of-range access after [`Schema::validate`] is a bug.
    pub fn object(&self, index: ObjectIndex) -> &ObjectDef {
        &self.objects[index.0]
    }

    pub fn enum_def(&self, index: EnumIndex) -> &EnumDef {
        &self.enums[index.0]
    }

    pub fn union_def(&self, index: UnionIndex) -> &UnionDef {
        &self.unions[index.0]
    }

    pub fn object_by_name(&self, name: &str) -> Option<ObjectIndex> {
        self.objects
            .iter()
            .position(|o| o.name == name)
            .map(ObjectIndex)
    }

    /// Packed size of a field within a struct payload.
    fn fixed_width(&self, kind: &FieldKind) -> Option<u32> {
        match kind {
            FieldKind::Scalar(k) => Some(k.byte_width() as u32),
            FieldKind::Struct(idx) => self.objects.get(idx.0).map(|o| o.byte_size),
            _ => None,
        }
    }

    /// Reject malformed schemas before any record buffer is built.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for object in &self.objects {
            for field in &object.fields {
                self.validate_kind(object, field, &field.kind)?;
                if object.is_struct {
                    let width = self.fixed_width(&field.kind).ok_or_else(|| {
                        SchemaError::NonFixedStructField {
                            object: object.name.clone(),
                            field: field.name.clone(),
                        }
                    })?;
                    let overrun = || SchemaError::StructFieldOverrun {
                        object: object.name.clone(),
                        field: field.name.clone(),
                        size: object.byte_size,
                    };
                    let end = field.offset.checked_add(width).ok_or_else(overrun)?;
                    if end > object.byte_size {
                        return Err(overrun());
                    }
                }
                if let Some(idx) = field.enumeration {
                    if self.enums.get(idx.0).is_none() {
                        return Err(SchemaError::DanglingEnum {
                            object: object.name.clone(),
                            field: field.name.clone(),
                            index: idx.0,
                        });
                    }
                    let integer = matches!(field.kind, FieldKind::Scalar(k) if k.is_integer());
                    if !integer {
                        return Err(SchemaError::EnumOnNonInteger {
                            object: object.name.clone(),
                            field: field.name.clone(),
                        });
                    }
                }
            }
        }
        for union in &self.unions {
            if union.variants.is_empty() {
                return Err(SchemaError::EmptyUnion(union.name.clone()));
            }
            for variant in &union.variants {
                match self.objects.get(variant.object.0) {
                    None => {
                        return Err(SchemaError::DanglingObject {
                            object: union.name.clone(),
                            field: variant.name.clone(),
                            index: variant.object.0,
                        })
                    }
                    Some(o) if o.is_struct => {
                        return Err(SchemaError::UnionVariantNotTable {
                            union: union.name.clone(),
                            variant: variant.name.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        self.check_struct_cycles()
    }

    /// Struct payloads inline their struct fields, so a cycle along
    /// struct edges would make the packed size unbounded and send
    /// every schema-driven recursion into infinite descent.
    fn check_struct_cycles(&self) -> Result<(), SchemaError> {
        // 0 = unvisited, 1 = on the current path, 2 = known acyclic.
        let mut state = vec![0u8; self.objects.len()];
        for i in 0..self.objects.len() {
            self.visit_struct_edges(i, &mut state)?;
        }
        Ok(())
    }

    fn visit_struct_edges(&self, i: usize, state: &mut [u8]) -> Result<(), SchemaError> {
        match state[i] {
            2 => return Ok(()),
            1 => return Err(SchemaError::StructCycle(self.objects[i].name.clone())),
            _ => {}
        }
        state[i] = 1;
        for field in &self.objects[i].fields {
            if let FieldKind::Struct(idx) = &field.kind {
                if idx.0 < self.objects.len() {
                    self.visit_struct_edges(idx.0, state)?;
                }
            }
        }
        state[i] = 2;
        Ok(())
    }

    fn validate_kind(
        &self,
        object: &ObjectDef,
        field: &FieldDef,
        kind: &FieldKind,
    ) -> Result<(), SchemaError> {
        let dangling = |index: usize| SchemaError::DanglingObject {
            object: object.name.clone(),
            field: field.name.clone(),
            index,
        };
        match kind {
            FieldKind::Scalar(_) | FieldKind::Str => Ok(()),
            FieldKind::Struct(idx) => match self.objects.get(idx.0) {
                None => Err(dangling(idx.0)),
                Some(o) if !o.is_struct => Err(SchemaError::StructRefToTable {
                    object: object.name.clone(),
                    field: field.name.clone(),
                }),
                Some(_) => Ok(()),
            },
            FieldKind::Table(idx) => match self.objects.get(idx.0) {
                None => Err(dangling(idx.0)),
                Some(o) if o.is_struct => Err(SchemaError::TableRefToStruct {
                    object: object.name.clone(),
                    field: field.name.clone(),
                }),
                Some(_) => Ok(()),
            },
            FieldKind::Vector(elem) => match elem.as_ref() {
                FieldKind::Vector(_) | FieldKind::Union(_) => {
                    Err(SchemaError::BadVectorElement {
                        object: object.name.clone(),
                        field: field.name.clone(),
                    })
                }
                inner => self.validate_kind(object, field, inner),
            },
            FieldKind::Union(idx) => {
                if self.unions.get(idx.0).is_none() {
                    Err(SchemaError::DanglingUnion {
                        object: object.name.clone(),
                        field: field.name.clone(),
                        index: idx.0,
                    })
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec3(schema: &mut Schema) -> ObjectIndex {
        schema.add_object(ObjectDef::strukt(
            "Vec3",
            12,
            vec![
                FieldDef::new("x", FieldKind::Scalar(ScalarKind::F32)).at_offset(0),
                FieldDef::new("y", FieldKind::Scalar(ScalarKind::F32)).at_offset(4),
                FieldDef::new("z", FieldKind::Scalar(ScalarKind::F32)).at_offset(8),
            ],
        ))
    }

    #[test]
    fn valid_schema_passes() {
        let mut schema = Schema::new();
        let pos = vec3(&mut schema);
        schema.add_object(ObjectDef::table(
            "Entity",
            vec![
                FieldDef::new("name", FieldKind::Str),
                FieldDef::new("pos", FieldKind::Struct(pos)),
            ],
        ));
        assert!(schema.validate().is_ok());
        assert_eq!(schema.object_by_name("Entity"), Some(ObjectIndex(1)));
    }

    #[test]
    fn dangling_object_index_rejected() {
        let mut schema = Schema::new();
        schema.add_object(ObjectDef::table(
            "Bad",
            vec![FieldDef::new("t", FieldKind::Table(ObjectIndex(7)))],
        ));
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::DanglingObject { .. })
        ));
    }

    #[test]
    fn struct_field_overrun_rejected() {
        let mut schema = Schema::new();
        schema.add_object(ObjectDef::strukt(
            "Tiny",
            4,
            vec![FieldDef::new("v", FieldKind::Scalar(ScalarKind::F64)).at_offset(0)],
        ));
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::StructFieldOverrun { .. })
        ));
    }

    #[test]
    fn struct_offset_overflow_rejected() {
        let mut schema = Schema::new();
        schema.add_object(ObjectDef::strukt(
            "Huge",
            8,
            vec![FieldDef::new("v", FieldKind::Scalar(ScalarKind::U32))
                .at_offset(u32::MAX - 1)],
        ));
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::StructFieldOverrun { .. })
        ));
    }

    #[test]
    fn self_referential_struct_rejected() {
        let mut schema = Schema::new();
        schema.add_object(ObjectDef::strukt(
            "Loop",
            4,
            vec![FieldDef::new("inner", FieldKind::Struct(ObjectIndex(0))).at_offset(0)],
        ));
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::StructCycle(_))
        ));
    }

    #[test]
    fn mutual_struct_cycle_rejected_after_json_load() {
        let mut schema = Schema::new();
        let a = schema.add_object(ObjectDef::strukt(
            "A",
            4,
            vec![FieldDef::new("b", FieldKind::Struct(ObjectIndex(1))).at_offset(0)],
        ));
        schema.add_object(ObjectDef::strukt(
            "B",
            4,
            vec![FieldDef::new("a", FieldKind::Struct(a)).at_offset(0)],
        ));
        let json = serde_json::to_string(&schema).unwrap();
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            back.validate(),
            Err(SchemaError::StructCycle(_))
        ));
    }

    #[test]
    fn nested_acyclic_structs_pass() {
        let mut schema = Schema::new();
        let pos = vec3(&mut schema);
        schema.add_object(ObjectDef::strukt(
            "Ray",
            24,
            vec![
                FieldDef::new("origin", FieldKind::Struct(pos)).at_offset(0),
                FieldDef::new("dir", FieldKind::Struct(pos)).at_offset(12),
            ],
        ));
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn variable_length_struct_field_rejected() {
        let mut schema = Schema::new();
        schema.add_object(ObjectDef::strukt(
            "Bad",
            8,
            vec![FieldDef::new("s", FieldKind::Str).at_offset(0)],
        ));
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::NonFixedStructField { .. })
        ));
    }

    #[test]
    fn enum_lookup_both_directions() {
        let def = EnumDef::new("Color", vec![("RED", 0), ("GREEN", 1), ("BLUE", 2)]);
        assert_eq!(def.name_of(1), Some("GREEN"));
        assert_eq!(def.name_of(5), None);
        assert_eq!(def.value_of("BLUE"), Some(2));
        assert_eq!(def.value_of("blue"), None);
    }

    #[test]
    fn union_tag_mapping() {
        let def = UnionDef {
            name: "Shape".into(),
            variants: vec![
                UnionVariant {
                    name: "Circle".into(),
                    object: ObjectIndex(0),
                },
                UnionVariant {
                    name: "Square".into(),
                    object: ObjectIndex(1),
                },
            ],
        };
        assert!(def.variant(0).is_none());
        assert_eq!(def.variant(2).map(|v| v.name.as_str()), Some("Square"));
        assert_eq!(def.tag_of("Circle"), Some(1));
        assert_eq!(def.tag_of("Hexagon"), None);
    }

    #[test]
    fn schema_roundtrips_through_json() {
        let mut schema = Schema::new();
        let pos = vec3(&mut schema);
        let color = schema.add_enum(EnumDef::new("Color", vec![("RED", 0), ("GREEN", 1)]));
        schema.add_object(ObjectDef::table(
            "Entity",
            vec![
                FieldDef::new("pos", FieldKind::Struct(pos)),
                FieldDef::new("tag", FieldKind::Scalar(ScalarKind::I32)).with_enum(color),
            ],
        ));
        let json = serde_json::to_string(&schema).unwrap();
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
        assert!(back.validate().is_ok());
    }
}
