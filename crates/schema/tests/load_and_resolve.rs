#![forbid(unsafe_code)]

use std::io::Write;

use serde_json::json;
use varia_core::Projector;
use varia_resolve::{MatchedBy, VariantResolver};
use varia_schema::{load_spec_file, FieldProjector};

fn write_spec(suffix: &str, body: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    f.write_all(body.as_bytes()).unwrap();
    f.flush().unwrap();
    f
}

const SPEC_YAML: &str = r#"
unions:
  performer:
    schemas:
      - id: Performer
        allow: [Performer]
        fields:
          - { name: name, type: string, required: true }
      - id: Band
        allow: [Band]
        fields:
          - { name: name, type: string, required: true }
          - { name: lead, path: "members[0].name", type: string }
  venue:
    discriminator: kind
    convention_suffix: Data
    schemas:
      - id: ClubData
      - id: ArenaData
"#;

#[test]
fn loaded_spec_resolves_performer_band_scenario() {
    let file = write_spec(".yaml", SPEC_YAML);
    let set = load_spec_file(file.path()).unwrap();
    assert_eq!(set.names(), vec!["performer", "venue"]);

    let resolver = VariantResolver::new(set.get("performer").unwrap());
    assert_eq!(resolver.resolve(&json!({ "objectType": "Band" })), "Band");
    assert_eq!(resolver.resolve(&json!({ "objectType": "Performer" })), "Performer");
    assert_eq!(resolver.resolve(&json!({})), "Performer");
    assert_eq!(resolver.resolve(&json!({ "objectType": "Orchestra" })), "Performer");
}

#[test]
fn loaded_union_default_convention() {
    let file = write_spec(".yml", SPEC_YAML);
    let set = load_spec_file(file.path()).unwrap();
    let resolver = VariantResolver::new(set.get("venue").unwrap());
    let r = resolver.resolve_with_debug(&json!({ "kind": "Arena" }));
    assert_eq!(r.id(), "ArenaData");
    assert_eq!(r.matched_by, MatchedBy::Convention);
    assert_eq!(resolver.resolve(&json!({ "objectType": "Arena" })), "ClubData");
}

#[test]
fn projector_follows_resolved_schema() {
    let file = write_spec(".yaml", SPEC_YAML);
    let set = load_spec_file(file.path()).unwrap();
    let resolver = VariantResolver::new(set.get("performer").unwrap());
    let payload = json!({ "objectType": "Band", "members": [{ "name": "Ann" }] });
    let r = resolver.resolve_with_debug(&payload);
    let pj = FieldProjector::for_schema(r.schema);
    let out = pj.project(&payload);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0], ("lead".to_string(), "Ann".to_string()));
    assert_eq!(pj.missing_required(&payload), vec!["name".to_string()]);
}

#[test]
fn json_spec_file_loads() {
    let file = write_spec(
        ".json",
        r#"{"unions":{"u":{"schemas":[{"id":"PerformerData","allow":["Performer"]},{"id":"BandData","convention":"Data"}]}}}"#,
    );
    let set = load_spec_file(file.path()).unwrap();
    let (_, spec) = set.select(None).unwrap();
    assert_eq!(varia_resolve::resolve(&spec, &json!({ "objectType": "Band" })), "BandData");
}

#[test]
fn invalid_spec_reports_file_and_union() {
    let file = write_spec(".yaml", "unions:\n  u:\n    schemas:\n      - id: A\n      - id: A\n");
    let err = load_spec_file(file.path()).unwrap_err();
    let msg = format!("{:#}", err);
    assert!(msg.contains("loading spec file"), "{}", msg);
    assert!(msg.contains("union \"u\""), "{}", msg);
    assert!(msg.contains("duplicate schema identifier: A"), "{}", msg);
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_spec_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(err.to_string().contains("reading spec file"));
}

#[test]
fn demo_spec_resolves_demo_payloads() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos");
    let set = load_spec_file(root.join("performer.yaml")).unwrap();
    let (_, spec) = set.select(None).unwrap();
    let resolver = VariantResolver::new(spec);
    let text = std::fs::read_to_string(root.join("payloads.ndjson")).unwrap();
    let ids: Vec<String> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| resolver.resolve(&serde_json::from_str(l).unwrap()).to_string())
        .collect();
    assert_eq!(ids, vec!["BandData", "PerformerData", "OrchestraData", "PerformerData", "PerformerData"]);
}
