//! Form definitions
//!
//! ```yaml
//! forms:
//!   myForm:
//!     - firstName: { label: "First name", type: "string" }
//!     - age: { type: "int?", value: 30 }
//!     - color: { type: "string+", allow: ["red", "green"] }
//! ```

use indexmap::IndexMap;
use nom::error::context;
use nom::multi::many0;
use nom::sequence::delimited;

use super::atoms::AtomKind;
use super::combinators::{any_field, commit_on_progress, kind, Failure, Input, PResult};
use super::grammar::{string, value};
use crate::ast::{Cardinality, FormField};

/// `array-of(form-field)`
pub fn form_fields<'a>(input: Input<'a>) -> PResult<'a, Vec<FormField>> {
    context(
        "list of form fields",
        delimited(
            kind(AtomKind::StartArray),
            many0(commit_on_progress(form_field)),
            kind(AtomKind::EndArray),
        ),
    )(input)
}

/// `{ name: { type: ..., label?, value?, allow?, ... } }`
pub fn form_field<'a>(input: Input<'a>) -> PResult<'a, FormField> {
    let (rest, _) = context("form field", kind(AtomKind::StartObject))(input)?;
    let (rest, (name, name_atom)) = any_field(rest)?;
    let (mut rest, _) = context("field options", kind(AtomKind::StartObject))(rest)?;

    let mut field_type = None;
    let mut field_label = None;
    let mut default_value = None;
    let mut allowed_value = None;
    let mut options = IndexMap::new();

    while let Ok((after, (key, _))) = any_field(rest) {
        rest = match key {
            "type" => {
                let (r, v) = string(after)?;
                field_type = Some(v);
                r
            }
            "label" => {
                let (r, v) = string(after)?;
                field_label = Some(v);
                r
            }
            "value" => {
                let (r, v) = value(after)?;
                default_value = Some(v);
                r
            }
            "allow" => {
                let (r, v) = value(after)?;
                allowed_value = Some(v);
                r
            }
            other => {
                let (r, v) = value(after)?;
                options.insert(other.to_string(), v);
                r
            }
        };
    }

    let Some(raw_type) = field_type else {
        return Err(nom::Err::Error(Failure::new(rest, "'type'")));
    };
    let (rest, _) = kind(AtomKind::EndObject)(rest)?;
    let (rest, _) = kind(AtomKind::EndObject)(rest)?;

    let (base, cardinality) = Cardinality::split_type(&raw_type);
    Ok((
        rest,
        FormField {
            name: name.to_string(),
            field_type: base.to_string(),
            cardinality,
            label: field_label,
            default_value,
            allowed_value,
            options,
            location: name_atom.location.clone(),
        },
    ))
}
