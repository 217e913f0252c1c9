use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, info, warn};
use varia_core::{Projector, Strategy, UnionSpec};
use varia_resolve::{MatchedBy, Tally, VariantResolver};
use varia_schema::FieldProjector;

#[derive(Parser, Debug)]
#[command(name = "variactl", version, about = "Resolve tagged-union payloads to schema variants")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Spec file declaring the unions (JSON or YAML)
    #[arg(long = "spec", env = "VARIA_SPEC", global = true)]
    spec: Option<PathBuf>,

    /// Union to use; optional when the spec declares exactly one
    #[arg(long = "union", env = "VARIA_UNION", global = true)]
    union: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve payloads (files, or stdin when none / `-`) to a schema
    Resolve {
        /// Payload files holding one or more JSON documents
        payloads: Vec<PathBuf>,
        /// Show projected fields, missing/mistyped fields and a summary
        #[arg(long = "explain", action = ArgAction::SetTrue)]
        explain: bool,
    },
    /// Show unions and the strategy each schema is matched with
    Inspect,
}

fn init_tracing() {
    let env = std::env::var("VARIA_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let spec_path = cli.spec.clone().context("no spec file given; pass --spec or set VARIA_SPEC")?;
    let set = varia_schema::load_spec_file(&spec_path)?;
    debug!(spec = %spec_path.display(), unions = set.len(), "spec loaded");

    match cli.command {
        Commands::Resolve { payloads, explain } => {
            let (union_name, spec) = set.select(cli.union.as_deref())?;
            info!(union = %union_name, inputs = payloads.len(), explain, "resolve invoked");
            let docs = read_payloads(&payloads)?;
            let resolver = VariantResolver::new(spec);
            let (rows, tally) = resolve_rows(&resolver, &docs, explain);
            if tally.fallbacks() > 0 {
                warn!(fallbacks = tally.fallbacks(), total = tally.total, "some payloads fell back to the default schema");
            }

            match cli.output {
                Output::Human => {
                    for row in rows.iter() {
                        for line in human_lines(row, explain) {
                            println!("{}", line);
                        }
                    }
                    if explain {
                        eprintln!("{}", summary_line(&tally));
                    }
                }
                Output::Json => println!("{}", render_json(&rows, &tally, explain)?),
            }
        }
        Commands::Inspect => {
            info!(unions = set.len(), "inspect invoked");
            let mut unions: Vec<UnionRow> = Vec::new();
            for name in set.names() {
                if let Some(spec) = set.get(name) {
                    unions.push(describe_union(name, &spec));
                }
            }
            match cli.output {
                Output::Human => {
                    for u in unions.iter() {
                        let conv = u.default_convention.as_deref().map(|s| format!(", default convention: {}", s)).unwrap_or_default();
                        println!("union {} (discriminator: {}{})", u.name, u.discriminator, conv);
                        for s in u.schemas.iter() {
                            let default = if s.index == 0 { "  (default)" } else { "" };
                            println!("  {:<3} {:<20} {:<13} {}{}", s.index, s.id, s.strategy, s.matches.join(", "), default);
                        }
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&unions)?),
            }
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct Row<'a> {
    source: &'a str,
    schema: &'a str,
    index: usize,
    matched_by: MatchedBy,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    missing: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    mistyped: Vec<String>,
}

/// Resolve every document in input order; with `explain`, also project the
/// resolved schema's fields and report missing and mistyped ones.
fn resolve_rows<'a>(
    resolver: &'a VariantResolver,
    docs: &'a [(String, serde_json::Value)],
    explain: bool,
) -> (Vec<Row<'a>>, Tally) {
    let mut tally = Tally::default();
    let mut rows: Vec<Row> = Vec::with_capacity(docs.len());
    for (source, payload) in docs.iter() {
        let r = resolver.resolve_with_debug(payload);
        tally.record(r.matched_by);
        let mut row = Row {
            source: source.as_str(),
            schema: r.id().as_str(),
            index: r.index,
            matched_by: r.matched_by,
            fields: Vec::new(),
            missing: Vec::new(),
            mistyped: Vec::new(),
        };
        if explain {
            let pj = FieldProjector::for_schema(r.schema);
            row.fields = pj.project(payload).into_vec();
            row.missing = pj.missing_required(payload);
            row.mistyped = pj.mistyped(payload);
        }
        rows.push(row);
    }
    (rows, tally)
}

/// `<source>\t<schema>\t<how>`, followed by indented detail lines under `explain`.
fn human_lines(row: &Row<'_>, explain: bool) -> Vec<String> {
    let mut out = vec![format!("{}\t{}\t{}", row.source, row.schema, row.matched_by.as_str())];
    if explain {
        for (k, v) in row.fields.iter() {
            out.push(format!("  {} = {}", k, v));
        }
        if !row.missing.is_empty() {
            out.push(format!("  missing: {}", row.missing.join(", ")));
        }
        if !row.mistyped.is_empty() {
            out.push(format!("  mistyped: {}", row.mistyped.join(", ")));
        }
    }
    out
}

fn summary_line(tally: &Tally) -> String {
    format!(
        "summary: total={} allow_list={} static_label={} convention={} fallback_missing={} fallback_uncomparable={} fallback_no_match={}",
        tally.total, tally.allow_list, tally.static_label, tally.convention,
        tally.fallback_missing, tally.fallback_uncomparable, tally.fallback_no_match
    )
}

fn render_json(rows: &[Row<'_>], tally: &Tally, explain: bool) -> Result<String> {
    if explain {
        #[derive(Serialize)]
        struct Explain<'a, T> { rows: T, summary: &'a Tally }
        Ok(serde_json::to_string_pretty(&Explain { rows, summary: tally })?)
    } else {
        Ok(serde_json::to_string_pretty(rows)?)
    }
}

#[derive(Debug, Serialize)]
struct UnionRow {
    name: String,
    discriminator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_convention: Option<String>,
    schemas: Vec<SchemaRow>,
}

#[derive(Debug, Serialize)]
struct SchemaRow {
    index: usize,
    id: String,
    /// Strategy name, or `none` when the schema is reachable only as the fallback.
    strategy: &'static str,
    /// Discriminator values this schema accepts.
    matches: Vec<String>,
}

fn describe_union(name: &str, spec: &UnionSpec) -> UnionRow {
    let schemas = spec
        .schemas()
        .iter()
        .enumerate()
        .map(|(index, s)| {
            let (strategy, matches) = match s.strategy(spec.default_convention()) {
                Some(st @ Strategy::AllowList(list)) => (st.name(), list.to_vec()),
                Some(st @ Strategy::StaticLabel(l)) => (st.name(), vec![l.label().into_owned()]),
                Some(st @ Strategy::Convention(c)) => (st.name(), vec![c.derive_label(s.id().as_str()).to_string()]),
                None => ("none", Vec::new()),
            };
            SchemaRow { index, id: s.id().to_string(), strategy, matches }
        })
        .collect();
    UnionRow {
        name: name.to_string(),
        discriminator: spec.discriminator_field().to_string(),
        default_convention: spec.default_convention().map(|c| c.suffix().to_string()),
        schemas,
    }
}

/// Read every payload document from the given files, or stdin when none are given.
/// Each file may hold a single JSON document or a whitespace/newline separated stream.
fn read_payloads(paths: &[PathBuf]) -> Result<Vec<(String, serde_json::Value)>> {
    let mut out = Vec::new();
    if paths.is_empty() {
        read_source("stdin", None, &mut out)?;
        return Ok(out);
    }
    for p in paths {
        if p.as_os_str() == "-" {
            read_source("stdin", None, &mut out)?;
        } else {
            read_source(&p.display().to_string(), Some(p), &mut out)?;
        }
    }
    Ok(out)
}

fn read_source(label: &str, path: Option<&Path>, out: &mut Vec<(String, serde_json::Value)>) -> Result<()> {
    let text = match path {
        Some(p) => std::fs::read_to_string(p).with_context(|| format!("reading payload file {}", label))?,
        None => {
            let mut s = String::new();
            std::io::stdin().read_to_string(&mut s).context("reading payloads from stdin")?;
            s
        }
    };
    let docs = parse_documents(&text).with_context(|| format!("parsing payloads from {}", label))?;
    let many = docs.len() > 1;
    for (i, doc) in docs.into_iter().enumerate() {
        let source = if many { format!("{}#{}", label, i + 1) } else { label.to_string() };
        out.push((source, doc));
    }
    Ok(())
}

fn parse_documents(text: &str) -> Result<Vec<serde_json::Value>> {
    let mut docs = Vec::new();
    for (i, item) in serde_json::Deserializer::from_str(text).into_iter::<serde_json::Value>().enumerate() {
        docs.push(item.with_context(|| format!("document {}", i + 1))?);
    }
    Ok(docs)
}
