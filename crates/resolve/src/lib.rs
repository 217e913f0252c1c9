//! Varia resolver: map a payload to exactly one schema of a union.
//!
//! Resolution reads the discriminator field, then walks the schemas in
//! declared order and evaluates each schema's highest-priority strategy
//! (allow-list, static label, naming convention). The first match wins;
//! anything else falls back to the first-declared schema.

#![forbid(unsafe_code)]

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use varia_core::paths::render_scalar;
use varia_core::{Payload, Schema, SchemaId, Strategy, UnionSpec};

/// Why the default schema was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Discriminator field absent, null, or payload not an object.
    MissingDiscriminator,
    /// Discriminator is an array or object.
    UncomparableValue,
    /// No schema's strategy accepted the value.
    NoMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "by", content = "reason")]
pub enum MatchedBy {
    AllowList,
    StaticLabel,
    Convention,
    Fallback(FallbackReason),
}

impl MatchedBy {
    pub fn is_fallback(&self) -> bool { matches!(self, MatchedBy::Fallback(_)) }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchedBy::AllowList => "allow-list",
            MatchedBy::StaticLabel => "static-label",
            MatchedBy::Convention => "convention",
            MatchedBy::Fallback(FallbackReason::MissingDiscriminator) => "fallback:missing",
            MatchedBy::Fallback(FallbackReason::UncomparableValue) => "fallback:uncomparable",
            MatchedBy::Fallback(FallbackReason::NoMatch) => "fallback:no-match",
        }
    }
}

impl From<&Strategy<'_>> for MatchedBy {
    fn from(s: &Strategy<'_>) -> Self {
        match s {
            Strategy::AllowList(_) => MatchedBy::AllowList,
            Strategy::StaticLabel(_) => MatchedBy::StaticLabel,
            Strategy::Convention(_) => MatchedBy::Convention,
        }
    }
}

/// The chosen schema and how it was chosen.
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    /// Position of `schema` in the union.
    pub index: usize,
    pub schema: &'a Schema,
    pub matched_by: MatchedBy,
}

impl<'a> Resolution<'a> {
    pub fn id(&self) -> &'a SchemaId { self.schema.id() }
}

/// Discriminator value of `payload`, treating null like absence.
pub fn discriminator_value<'p>(spec: &UnionSpec, payload: &'p Payload) -> Option<&'p Value> {
    payload.as_object()?.get(spec.discriminator_field()).filter(|v| !v.is_null())
}

/// Identifier of the schema `payload` belongs to. Never fails.
pub fn resolve<'a>(spec: &'a UnionSpec, payload: &Payload) -> &'a SchemaId {
    resolve_with_debug(spec, payload).id()
}

/// Like [`resolve`], also reporting the index and the strategy that decided.
pub fn resolve_with_debug<'a>(spec: &'a UnionSpec, payload: &Payload) -> Resolution<'a> {
    let res = decide(spec, payload);
    counter!("varia_resolve_total", 1, "outcome" => res.matched_by.as_str());
    debug!(schema = %res.schema.id(), index = res.index, matched_by = res.matched_by.as_str(), "resolved payload");
    res
}

fn decide<'a>(spec: &'a UnionSpec, payload: &Payload) -> Resolution<'a> {
    let fallback = move |reason| Resolution {
        index: 0,
        schema: spec.default_schema(),
        matched_by: MatchedBy::Fallback(reason),
    };
    let raw = match discriminator_value(spec, payload) {
        Some(v) => v,
        None => return fallback(FallbackReason::MissingDiscriminator),
    };
    let value = match render_scalar(raw) {
        Some(s) => s,
        None => return fallback(FallbackReason::UncomparableValue),
    };
    for (index, schema) in spec.schemas().iter().enumerate() {
        if let Some(strategy) = schema.strategy(spec.default_convention()) {
            if strategy_matches(&strategy, schema, &value) {
                return Resolution { index, schema, matched_by: MatchedBy::from(&strategy) };
            }
        }
    }
    fallback(FallbackReason::NoMatch)
}

fn strategy_matches(strategy: &Strategy<'_>, schema: &Schema, value: &str) -> bool {
    match strategy {
        Strategy::AllowList(list) => list.iter().any(|v| v == value),
        Strategy::StaticLabel(label) => label.label() == value,
        Strategy::Convention(c) => c.derive_label(schema.id().as_str()) == value,
    }
}

/// Outcome counts over a batch of resolutions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub total: usize,
    pub allow_list: usize,
    pub static_label: usize,
    pub convention: usize,
    pub fallback_missing: usize,
    pub fallback_uncomparable: usize,
    pub fallback_no_match: usize,
}

impl Tally {
    pub fn record(&mut self, matched_by: MatchedBy) {
        self.total += 1;
        match matched_by {
            MatchedBy::AllowList => self.allow_list += 1,
            MatchedBy::StaticLabel => self.static_label += 1,
            MatchedBy::Convention => self.convention += 1,
            MatchedBy::Fallback(FallbackReason::MissingDiscriminator) => self.fallback_missing += 1,
            MatchedBy::Fallback(FallbackReason::UncomparableValue) => self.fallback_uncomparable += 1,
            MatchedBy::Fallback(FallbackReason::NoMatch) => self.fallback_no_match += 1,
        }
    }

    pub fn fallbacks(&self) -> usize {
        self.fallback_missing + self.fallback_uncomparable + self.fallback_no_match
    }
}

/// Resolver bound to one union. Cheap to clone and safe to share across threads.
#[derive(Debug, Clone)]
pub struct VariantResolver {
    spec: Arc<UnionSpec>,
}

impl VariantResolver {
    pub fn new(spec: Arc<UnionSpec>) -> Self { Self { spec } }

    pub fn spec(&self) -> &UnionSpec { &self.spec }

    pub fn resolve(&self, payload: &Payload) -> &SchemaId { resolve(&self.spec, payload) }

    pub fn resolve_with_debug(&self, payload: &Payload) -> Resolution<'_> { resolve_with_debug(&self.spec, payload) }

    /// Resolve a batch in input order, returning per-payload results and outcome counts.
    pub fn resolve_many<'p, I>(&self, payloads: I) -> (Vec<Resolution<'_>>, Tally)
    where
        I: IntoIterator<Item = &'p Payload>,
    {
        let mut tally = Tally::default();
        let out: Vec<_> = payloads
            .into_iter()
            .map(|p| {
                let r = self.resolve_with_debug(p);
                tally.record(r.matched_by);
                r
            })
            .collect();
        (out, tally)
    }
}

impl From<UnionSpec> for VariantResolver {
    fn from(spec: UnionSpec) -> Self { Self::new(Arc::new(spec)) }
}
