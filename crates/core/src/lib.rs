//! Varia core types: schemas, discriminator declarations, union specs and errors.

#![forbid(unsafe_code)]

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod paths;

/// Discriminator field used when a union does not name one.
pub const DEFAULT_DISCRIMINATOR_FIELD: &str = "objectType";

/// Caller-supplied, untyped record. The resolver only reads it.
pub type Payload = serde_json::Value;

/// Allow-list storage; most unions list one or two literals per schema.
pub type AllowList = SmallVec<[String; 4]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(String);

impl SchemaId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl AsRef<str> for SchemaId {
    fn as_ref(&self) -> &str { &self.0 }
}

impl From<&str> for SchemaId {
    fn from(v: &str) -> Self { Self(v.to_string()) }
}

impl From<String> for SchemaId {
    fn from(v: String) -> Self { Self(v) }
}

impl PartialEq<str> for SchemaId {
    fn eq(&self, other: &str) -> bool { self.0 == other }
}

impl PartialEq<&str> for SchemaId {
    fn eq(&self, other: &&str) -> bool { self.0 == *other }
}

/// Declared JSON type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Bool,
    Object,
    Array,
    #[default]
    Any,
}

impl FieldType {
    /// Whether `v` has this JSON type. Null is admitted by none but `Any`.
    pub fn admits(&self, v: &serde_json::Value) -> bool {
        use serde_json::Value;
        match self {
            FieldType::String => matches!(v, Value::String(_)),
            FieldType::Number => matches!(v, Value::Number(_)),
            FieldType::Bool => matches!(v, Value::Bool(_)),
            FieldType::Object => matches!(v, Value::Object(_)),
            FieldType::Array => matches!(v, Value::Array(_)),
            FieldType::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDef {
    pub name: String,
    /// Path into the payload; defaults to `name` when omitted in spec files.
    #[serde(default)]
    pub path: String,
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
}

impl FieldDef {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self { name: name.into(), path: name.into(), field_type, required: false }
    }

    pub fn at(mut self, path: &str) -> Self { self.path = path.into(); self }

    pub fn required(mut self) -> Self { self.required = true; self }
}

/// A label produced by code rather than declared as data.
#[derive(Clone)]
pub struct StaticLabel(LabelSource);

#[derive(Clone)]
enum LabelSource {
    Fixed(Cow<'static, str>),
    Computed(Arc<dyn Fn() -> Cow<'static, str> + Send + Sync>),
}

impl StaticLabel {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Cow<'static, str> + Send + Sync + 'static,
    {
        Self(LabelSource::Computed(Arc::new(f)))
    }

    /// Label known at compile time.
    pub fn of(label: &'static str) -> Self { Self(LabelSource::Fixed(Cow::Borrowed(label))) }

    /// Label read from configuration.
    pub fn fixed(label: impl Into<String>) -> Self { Self(LabelSource::Fixed(Cow::Owned(label.into()))) }

    /// Fixed labels are borrowed; computed ones are produced on each call.
    pub fn label(&self) -> Cow<'_, str> {
        match &self.0 {
            LabelSource::Fixed(s) => Cow::Borrowed(s.as_ref()),
            LabelSource::Computed(f) => (**f)(),
        }
    }
}

impl fmt::Debug for StaticLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticLabel").field(&self.label()).finish()
    }
}

/// Naming-convention rule: the label is the schema identifier with `suffix` stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Convention {
    suffix: String,
}

impl Convention {
    pub fn strip_suffix(suffix: impl Into<String>) -> Self { Self { suffix: suffix.into() } }

    pub fn suffix(&self) -> &str { &self.suffix }

    /// `BandData` with suffix `Data` yields `Band`. An identifier without the
    /// suffix, or equal to it, is its own label.
    pub fn derive_label<'a>(&self, id: &'a str) -> &'a str {
        match id.strip_suffix(self.suffix.as_str()) {
            Some(label) if !label.is_empty() => label,
            _ => id,
        }
    }
}

/// Discriminator declarations of one schema. At most one is consulted per
/// schema, in the priority order of the fields below.
#[derive(Debug, Clone, Default)]
pub struct Discriminators {
    pub allow_list: Option<AllowList>,
    pub static_label: Option<StaticLabel>,
    pub convention: Option<Convention>,
}

/// The strategy a schema is matched with.
#[derive(Debug, Clone, Copy)]
pub enum Strategy<'a> {
    AllowList(&'a [String]),
    StaticLabel(&'a StaticLabel),
    Convention(&'a Convention),
}

impl Strategy<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::AllowList(_) => "allow-list",
            Strategy::StaticLabel(_) => "static-label",
            Strategy::Convention(_) => "convention",
        }
    }
}

impl Discriminators {
    pub fn is_empty(&self) -> bool {
        self.allow_list.is_none() && self.static_label.is_none() && self.convention.is_none()
    }

    /// Highest-priority declared strategy, if any.
    pub fn primary(&self) -> Option<Strategy<'_>> {
        if let Some(list) = self.allow_list.as_ref() {
            return Some(Strategy::AllowList(list.as_slice()));
        }
        if let Some(label) = self.static_label.as_ref() {
            return Some(Strategy::StaticLabel(label));
        }
        self.convention.as_ref().map(Strategy::Convention)
    }
}

/// One member of a union.
#[derive(Debug, Clone)]
pub struct Schema {
    id: SchemaId,
    fields: Vec<FieldDef>,
    discriminators: Discriminators,
}

impl Schema {
    pub fn new(id: impl Into<SchemaId>) -> Self {
        Self { id: id.into(), fields: Vec::new(), discriminators: Discriminators::default() }
    }

    pub fn allow<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.discriminators.allow_list = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn label(mut self, label: StaticLabel) -> Self {
        self.discriminators.static_label = Some(label);
        self
    }

    pub fn convention(mut self, suffix: &str) -> Self {
        self.discriminators.convention = Some(Convention::strip_suffix(suffix));
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn id(&self) -> &SchemaId { &self.id }
    pub fn fields(&self) -> &[FieldDef] { &self.fields }
    pub fn discriminators(&self) -> &Discriminators { &self.discriminators }

    /// Strategy used for this schema; `fallback` applies only when the
    /// schema declares nothing itself.
    pub fn strategy<'a>(&'a self, fallback: Option<&'a Convention>) -> Option<Strategy<'a>> {
        self.discriminators.primary().or_else(|| fallback.map(Strategy::Convention))
    }

    fn validate(&mut self, index: usize) -> Result<(), SpecError> {
        if self.id.as_str().trim().is_empty() {
            return Err(SpecError::EmptySchemaId { index });
        }
        if matches!(&self.discriminators.allow_list, Some(list) if list.is_empty()) {
            return Err(SpecError::EmptyAllowList(self.id.clone()));
        }
        if matches!(&self.discriminators.convention, Some(c) if c.suffix.is_empty()) {
            return Err(SpecError::EmptyConventionSuffix(self.id.clone()));
        }
        for f in self.fields.iter_mut() {
            let raw = if f.path.is_empty() { f.name.as_str() } else { f.path.as_str() };
            match paths::normalize_path(raw) {
                Some(p) => f.path = p,
                None => return Err(SpecError::InvalidFieldPath { schema: self.id.clone(), path: raw.to_string() }),
            }
        }
        Ok(())
    }
}

/// Construction-time misconfiguration. Resolution itself never fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("union declares no schemas")]
    EmptyUnion,
    #[error("discriminator field name is empty")]
    EmptyDiscriminatorField,
    #[error("schema #{index} has an empty identifier")]
    EmptySchemaId { index: usize },
    #[error("duplicate schema identifier: {0}")]
    DuplicateSchema(SchemaId),
    #[error("schema {0} declares an empty allow-list")]
    EmptyAllowList(SchemaId),
    #[error("naming convention for {0} has an empty suffix")]
    EmptyConventionSuffix(SchemaId),
    #[error("union default naming convention has an empty suffix")]
    EmptyDefaultConvention,
    #[error("schema {schema}: invalid field path {path:?}")]
    InvalidFieldPath { schema: SchemaId, path: String },
}

/// Ordered, non-empty set of schemas plus the discriminator field they share.
/// The first schema is the default fallback.
#[derive(Debug, Clone)]
pub struct UnionSpec {
    schemas: Vec<Schema>,
    discriminator_field: String,
    default_convention: Option<Convention>,
}

impl UnionSpec {
    /// Union over `schemas` with the default discriminator field.
    pub fn new(schemas: Vec<Schema>) -> Result<Self, SpecError> {
        Self::builder().schemas(schemas).build()
    }

    pub fn builder() -> UnionSpecBuilder { UnionSpecBuilder::default() }

    pub fn schemas(&self) -> &[Schema] { &self.schemas }
    pub fn discriminator_field(&self) -> &str { &self.discriminator_field }
    pub fn default_convention(&self) -> Option<&Convention> { self.default_convention.as_ref() }
    pub fn len(&self) -> usize { self.schemas.len() }

    /// Never true: construction rejects empty unions.
    pub fn is_empty(&self) -> bool { self.schemas.is_empty() }

    /// The default fallback: first-declared schema.
    pub fn default_schema(&self) -> &Schema { &self.schemas[0] }

    pub fn get(&self, id: &str) -> Option<&Schema> { self.schemas.iter().find(|s| s.id == *id) }

    pub fn position(&self, id: &str) -> Option<usize> { self.schemas.iter().position(|s| s.id == *id) }
}

#[derive(Debug, Default)]
pub struct UnionSpecBuilder {
    schemas: Vec<Schema>,
    discriminator_field: Option<String>,
    default_convention: Option<Convention>,
}

impl UnionSpecBuilder {
    pub fn schema(mut self, schema: Schema) -> Self { self.schemas.push(schema); self }

    pub fn schemas(mut self, schemas: impl IntoIterator<Item = Schema>) -> Self {
        self.schemas.extend(schemas);
        self
    }

    pub fn discriminator_field(mut self, field: impl Into<String>) -> Self {
        self.discriminator_field = Some(field.into());
        self
    }

    /// Convention applied to schemas that declare no discriminator of their own.
    pub fn default_convention(mut self, suffix: impl Into<String>) -> Self {
        self.default_convention = Some(Convention::strip_suffix(suffix));
        self
    }

    pub fn build(self) -> Result<UnionSpec, SpecError> {
        let UnionSpecBuilder { mut schemas, discriminator_field, default_convention } = self;
        if schemas.is_empty() {
            return Err(SpecError::EmptyUnion);
        }
        let discriminator_field = discriminator_field.unwrap_or_else(|| DEFAULT_DISCRIMINATOR_FIELD.to_string());
        if discriminator_field.trim().is_empty() {
            return Err(SpecError::EmptyDiscriminatorField);
        }
        if matches!(&default_convention, Some(c) if c.suffix.is_empty()) {
            return Err(SpecError::EmptyDefaultConvention);
        }
        for i in 0..schemas.len() {
            schemas[i].validate(i)?;
            if schemas[..i].iter().any(|s| s.id == schemas[i].id) {
                return Err(SpecError::DuplicateSchema(schemas[i].id.clone()));
            }
        }
        Ok(UnionSpec { schemas, discriminator_field, default_convention })
    }
}

/// Entry representing a projected field: `(field name, rendered value)`.
pub type ProjectedEntry = (String, String);

/// Projector takes a raw payload and yields rendered fields.
pub trait Projector: Send + Sync {
    fn project(&self, raw: &serde_json::Value) -> SmallVec<[ProjectedEntry; 8]>;
}

pub mod prelude {
    pub use super::{
        Convention, Discriminators, FieldDef, FieldType, Payload, Projector, ProjectedEntry, Schema, SchemaId,
        SpecError, StaticLabel, Strategy, UnionSpec, DEFAULT_DISCRIMINATOR_FIELD,
    };
}
