//! Varia schema: declarative union definitions loaded from JSON or YAML spec files.
//!
//! A spec file names one or more unions; each is validated through
//! [`UnionSpec::builder`] so misconfiguration surfaces at load time.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use varia_core::{FieldDef, Schema, SpecError, StaticLabel, UnionSpec};

mod projector;

pub use projector::FieldProjector;

/// On-disk spec document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecDocument {
    pub unions: BTreeMap<String, UnionDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnionDoc {
    /// Discriminator field; `objectType` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    /// Convention for schemas that declare no discriminator of their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convention_suffix: Option<String>,
    pub schemas: Vec<SchemaDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDoc {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convention: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDef>,
}

impl SchemaDoc {
    fn into_schema(self, union: &str) -> Schema {
        let SchemaDoc { id, allow, label, convention, fields } = self;
        let declared = [allow.is_some(), label.is_some(), convention.is_some()].iter().filter(|b| **b).count();
        if declared > 1 {
            warn!(union = %union, schema = %id, "schema declares several discriminators; only the highest-priority one is used");
        }
        let mut schema = Schema::new(id);
        if let Some(values) = allow { schema = schema.allow(values); }
        if let Some(l) = label { schema = schema.label(StaticLabel::fixed(l)); }
        if let Some(suffix) = convention { schema = schema.convention(&suffix); }
        for f in fields { schema = schema.field(f); }
        schema
    }
}

impl UnionDoc {
    pub fn build(self, name: &str) -> Result<UnionSpec, SpecError> {
        let UnionDoc { discriminator, convention_suffix, schemas } = self;
        let mut b = UnionSpec::builder().schemas(schemas.into_iter().map(|s| s.into_schema(name)));
        if let Some(field) = discriminator { b = b.discriminator_field(field); }
        if let Some(suffix) = convention_suffix { b = b.default_convention(suffix); }
        b.build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Json,
    Yaml,
}

impl SpecFormat {
    /// Format implied by a file extension; `None` when unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
            Some("json") => Some(SpecFormat::Json),
            Some("yaml") | Some("yml") => Some(SpecFormat::Yaml),
            _ => None,
        }
    }
}

/// Named unions from one spec document.
#[derive(Debug, Clone, Default)]
pub struct SpecSet {
    unions: FxHashMap<String, Arc<UnionSpec>>,
}

impl SpecSet {
    pub fn from_document(doc: SpecDocument) -> Result<Self> {
        if doc.unions.is_empty() {
            bail!("spec defines no unions");
        }
        let mut unions = FxHashMap::default();
        for (name, u) in doc.unions {
            let spec = u.build(&name).with_context(|| format!("union {:?}", name))?;
            debug!(union = %name, schemas = spec.len(), discriminator = spec.discriminator_field(), "loaded union");
            unions.insert(name, Arc::new(spec));
        }
        Ok(Self { unions })
    }

    pub fn insert(&mut self, name: impl Into<String>, spec: UnionSpec) {
        self.unions.insert(name.into(), Arc::new(spec));
    }

    pub fn get(&self, name: &str) -> Option<Arc<UnionSpec>> { self.unions.get(name).cloned() }

    /// Union names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.unions.keys().map(|s| s.as_str()).collect();
        v.sort_unstable();
        v
    }

    /// The union when exactly one is defined.
    pub fn only(&self) -> Option<(&str, Arc<UnionSpec>)> {
        if self.unions.len() != 1 { return None; }
        self.unions.iter().next().map(|(k, v)| (k.as_str(), Arc::clone(v)))
    }

    /// Pick a union by name, or the only one when `name` is `None`.
    pub fn select(&self, name: Option<&str>) -> Result<(String, Arc<UnionSpec>)> {
        match name {
            Some(n) => self
                .get(n)
                .map(|s| (n.to_string(), s))
                .ok_or_else(|| anyhow!("unknown union {:?}; known: {}", n, self.names().join(", "))),
            None => self
                .only()
                .map(|(n, s)| (n.to_string(), s))
                .ok_or_else(|| anyhow!("spec defines {} unions ({}); pick one with --union", self.len(), self.names().join(", "))),
        }
    }

    pub fn len(&self) -> usize { self.unions.len() }
    pub fn is_empty(&self) -> bool { self.unions.is_empty() }
}

/// Parse a spec document. With no format, JSON is tried before YAML.
pub fn parse_spec_str(text: &str, format: Option<SpecFormat>) -> Result<SpecSet> {
    let doc: SpecDocument = match format {
        Some(SpecFormat::Json) => serde_json::from_str(text).context("parsing JSON spec")?,
        Some(SpecFormat::Yaml) => serde_yaml::from_str(text).context("parsing YAML spec")?,
        None => match serde_json::from_str(text) {
            Ok(doc) => doc,
            Err(_) => serde_yaml::from_str(text).context("parsing spec (neither JSON nor YAML)")?,
        },
    };
    SpecSet::from_document(doc)
}

/// Read and validate a spec file.
pub fn load_spec_file(path: impl AsRef<Path>) -> Result<SpecSet> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).with_context(|| format!("reading spec file {}", path.display()))?;
    parse_spec_str(&text, SpecFormat::from_path(path)).with_context(|| format!("loading spec file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use varia_core::Strategy;

    const YAML: &str = r#"
unions:
  performer:
    convention_suffix: Data
    schemas:
      - id: PerformerData
        allow: [Performer, Solo]
        fields:
          - { name: name, type: string, required: true }
      - id: BandData
        label: Band
      - id: OrchestraData
"#;

    #[test]
    fn yaml_document_builds_union() {
        let set = parse_spec_str(YAML, Some(SpecFormat::Yaml)).unwrap();
        let (name, spec) = set.select(None).unwrap();
        assert_eq!(name, "performer");
        assert_eq!(spec.discriminator_field(), "objectType");
        assert_eq!(spec.len(), 3);
        assert_eq!(spec.default_schema().fields()[0].path, "name");
        assert!(matches!(spec.schemas()[1].strategy(spec.default_convention()), Some(Strategy::StaticLabel(l)) if l.label() == "Band"));
        assert!(matches!(spec.schemas()[2].strategy(spec.default_convention()), Some(Strategy::Convention(_))));
    }

    #[test]
    fn unknown_format_tries_json_then_yaml() {
        let json = r#"{"unions":{"u":{"discriminator":"kind","schemas":[{"id":"A"}]}}}"#;
        let set = parse_spec_str(json, None).unwrap();
        assert_eq!(set.get("u").unwrap().discriminator_field(), "kind");
        assert_eq!(parse_spec_str(YAML, None).unwrap().len(), 1);
    }

    #[test]
    fn invalid_union_is_reported_with_name() {
        let yaml = "unions:\n  broken:\n    schemas: []\n";
        let err = parse_spec_str(yaml, Some(SpecFormat::Yaml)).unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("union \"broken\""), "{}", msg);
        assert!(msg.contains("no schemas"), "{}", msg);
        assert_eq!(err.root_cause().downcast_ref::<SpecError>(), Some(&SpecError::EmptyUnion));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let yaml = "unions:\n  u:\n    schemas:\n      - id: A\n        allowed: [x]\n";
        assert!(parse_spec_str(yaml, Some(SpecFormat::Yaml)).is_err());
    }

    #[test]
    fn misspelled_field_keys_are_rejected() {
        let yaml = "unions:\n  u:\n    schemas:\n      - id: A\n        fields:\n          - { name: size, tpye: number }\n";
        assert!(parse_spec_str(yaml, Some(SpecFormat::Yaml)).is_err());
        let yaml = "unions:\n  u:\n    schemas:\n      - id: A\n        fields:\n          - { name: size, requried: true }\n";
        assert!(parse_spec_str(yaml, Some(SpecFormat::Yaml)).is_err());
    }

    #[test]
    fn empty_document_is_rejected() {
        let err = parse_spec_str("{\"unions\":{}}", Some(SpecFormat::Json)).unwrap_err();
        assert!(err.to_string().contains("no unions"));
    }

    #[test]
    fn select_requires_name_when_ambiguous() {
        let mut set = SpecSet::default();
        set.insert("b", UnionSpec::new(vec![Schema::new("B")]).unwrap());
        set.insert("a", UnionSpec::new(vec![Schema::new("A")]).unwrap());
        assert_eq!(set.names(), vec!["a", "b"]);
        assert!(set.only().is_none());
        let err = set.select(None).unwrap_err();
        assert!(err.to_string().contains("pick one with --union"));
        assert!(set.select(Some("c")).unwrap_err().to_string().contains("known: a, b"));
        assert_eq!(set.select(Some("b")).unwrap().1.default_schema().id(), "B");
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(SpecFormat::from_path(Path::new("u.YAML")), Some(SpecFormat::Yaml));
        assert_eq!(SpecFormat::from_path(Path::new("u.yml")), Some(SpecFormat::Yaml));
        assert_eq!(SpecFormat::from_path(Path::new("u.json")), Some(SpecFormat::Json));
        assert_eq!(SpecFormat::from_path(Path::new("u.txt")), None);
        assert_eq!(SpecFormat::from_path(Path::new("union")), None);
    }
}
