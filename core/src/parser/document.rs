//! Top-level document grammar
//!
//! ```text
//! document := object-of(
//!     configuration: value
//!   | flows:         object-of(name -> steps)
//!   | forms:         object-of(name -> form-fields)
//!   | triggers:      array-of({ kind: object })
//!   | imports:       array-of({ kind: object })
//!   | publicFlows:   array-of(string)
//! )
//! ```

use indexmap::IndexMap;
use nom::error::context;
use nom::multi::many0;
use nom::sequence::delimited;
use serde_json::Value as JsonValue;

use super::atoms::{AtomKind, Location};
use super::combinators::{any_field, commit_on_progress, kind, peek_kind, Failure, Input, PResult};
use super::forms::form_fields;
use super::grammar::{object_map, steps, string_array, value};
use crate::ast::{Document, Flow, FormField, Import, Trigger};

const SECTIONS: &[&str] = &[
    "configuration",
    "flows",
    "forms",
    "imports",
    "publicFlows",
    "triggers",
];

pub fn document<'a>(input: Input<'a>) -> PResult<'a, Document> {
    let (mut input, _) = context("document", kind(AtomKind::StartObject))(input)?;
    let mut doc = Document::default();

    while !peek_kind(input, AtomKind::EndObject) {
        let (rest, (section, _)) = any_field(input).map_err(|_| unexpected_section(input))?;
        input = match section {
            "configuration" => {
                let (r, v) = value(rest)?;
                doc.configuration = Some(v);
                r
            }
            "flows" => {
                let (r, v) = flows(rest)?;
                doc.flows.extend(v);
                r
            }
            "forms" => {
                let (r, v) = forms(rest)?;
                doc.forms.extend(v);
                r
            }
            "triggers" => {
                let (r, v) = kind_entries(rest)?;
                doc.triggers
                    .extend(v.into_iter().map(|(kind, params, location)| Trigger {
                        kind,
                        params,
                        location,
                    }));
                r
            }
            "imports" => {
                let (r, v) = kind_entries(rest)?;
                doc.imports
                    .extend(v.into_iter().map(|(kind, params, location)| Import {
                        kind,
                        params,
                        location,
                    }));
                r
            }
            "publicFlows" => {
                let (r, v) = string_array(rest)?;
                doc.public_flows = v;
                r
            }
            _ => return Err(unexpected_section(input)),
        };
    }

    let (rest, _) = kind(AtomKind::EndObject)(input)?;
    Ok((rest, doc))
}

fn unexpected_section(input: Input<'_>) -> nom::Err<Failure<'_>> {
    let mut failure = Failure::new(input, "end of object");
    failure
        .expected
        .extend(SECTIONS.iter().map(|s| format!("'{}'", s)));
    nom::Err::Error(failure)
}

/// `flows: { name: steps }`
fn flows<'a>(input: Input<'a>) -> PResult<'a, IndexMap<String, Flow>> {
    let (mut input, _) = context("object of flows", kind(AtomKind::StartObject))(input)?;
    let mut out = IndexMap::new();

    while let Ok((rest, (name, atom))) = any_field(input) {
        let (rest, flow_steps) = steps(rest)?;
        out.insert(
            name.to_string(),
            Flow {
                steps: flow_steps,
                location: atom.location.clone(),
            },
        );
        input = rest;
    }

    let (rest, _) = kind(AtomKind::EndObject)(input)?;
    Ok((rest, out))
}

/// `forms: { name: form-fields }`
fn forms<'a>(input: Input<'a>) -> PResult<'a, IndexMap<String, Vec<FormField>>> {
    let (mut input, _) = context("object of forms", kind(AtomKind::StartObject))(input)?;
    let mut out = IndexMap::new();

    while let Ok((rest, (name, _))) = any_field(input) {
        let (rest, fields) = form_fields(rest)?;
        out.insert(name.to_string(), fields);
        input = rest;
    }

    let (rest, _) = kind(AtomKind::EndObject)(input)?;
    Ok((rest, out))
}

type KindEntry = (String, IndexMap<String, JsonValue>, Location);

/// `array-of({ kind: { params } })`, shared by triggers and imports
fn kind_entries<'a>(input: Input<'a>) -> PResult<'a, Vec<KindEntry>> {
    context(
        "array",
        delimited(
            kind(AtomKind::StartArray),
            many0(commit_on_progress(kind_entry)),
            kind(AtomKind::EndArray),
        ),
    )(input)
}

fn kind_entry<'a>(input: Input<'a>) -> PResult<'a, KindEntry> {
    let (rest, start) = kind(AtomKind::StartObject)(input)?;
    let (rest, (name, _)) = any_field(rest)?;
    let (rest, params) = context("object", object_map)(rest)?;
    let (rest, _) = kind(AtomKind::EndObject)(rest)?;
    Ok((rest, (name.to_string(), params, start.location.clone())))
}
