//! Field projection for a resolved schema: render declared fields found in a payload.

#![forbid(unsafe_code)]

use serde_json::Value;
use smallvec::SmallVec;
use varia_core::paths::{extract_path, render_scalar};
use varia_core::{FieldDef, Projector, ProjectedEntry, Schema};

/// Simple projector built from a schema's field definitions.
#[derive(Debug, Clone)]
pub struct FieldProjector {
    fields: Vec<FieldDef>,
}

impl FieldProjector {
    pub fn new(fields: Vec<FieldDef>) -> Self { Self { fields } }

    pub fn for_schema(schema: &Schema) -> Self { Self::new(schema.fields().to_vec()) }

    /// Names of required fields that are absent or null in `raw`.
    pub fn missing_required(&self, raw: &Value) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .filter(|f| extract_path(raw, &f.path).map(Value::is_null).unwrap_or(true))
            .map(|f| f.name.clone())
            .collect()
    }

    /// Names of present, non-null fields whose JSON type differs from the declaration.
    pub fn mistyped(&self, raw: &Value) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| match extract_path(raw, &f.path) {
                Some(v) if !v.is_null() => !f.field_type.admits(v),
                _ => false,
            })
            .map(|f| f.name.clone())
            .collect()
    }
}

impl Projector for FieldProjector {
    fn project(&self, raw: &Value) -> SmallVec<[ProjectedEntry; 8]> {
        let mut out: SmallVec<[ProjectedEntry; 8]> = SmallVec::new();
        for f in self.fields.iter() {
            let v = match extract_path(raw, &f.path) {
                Some(v) if !v.is_null() => v,
                _ => continue,
            };
            // Structured values render as compact JSON.
            let s = render_scalar(v).unwrap_or_else(|| v.to_string());
            out.push((f.name.clone(), s));
        }
        out
    }
}
