//! Atom-level parsing on top of `nom`
//!
//! The grammar runs nom combinators directly over a slice of [`Atom`]s. This
//! module supplies the pieces nom does not have for that input: primitives
//! that match a single atom, and an error type that keeps the furthest atom
//! reached together with the labels expected there, so the final error reads
//! "expected X or Y, got Z".
//!
//! Ordered alternatives backtrack on `nom::Err::Error`. A keyword that has
//! committed the grammar to one construct wraps the rest in `cut`, which
//! turns failures into `nom::Err::Failure` and stops the search.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use nom::error::{ContextError, ErrorKind, ParseError};
use nom::{IResult, Parser};

use super::atoms::{Atom, AtomKind};

/// The atoms still to be parsed
pub type Input<'a> = &'a [Atom];

pub type PResult<'a, T> = IResult<Input<'a>, T, Failure<'a>>;

/// A parse failure, anchored at the remaining input where it happened
#[derive(Debug, Clone, PartialEq)]
pub struct Failure<'a> {
    pub input: Input<'a>,
    pub expected: BTreeSet<String>,
}

impl<'a> Failure<'a> {
    pub fn new(input: Input<'a>, expected: impl Into<String>) -> Self {
        Self {
            input,
            expected: BTreeSet::from([expected.into()]),
        }
    }

    /// The atom the failure points at; `None` at end of input
    pub fn found(&self) -> Option<&'a Atom> {
        self.input.first()
    }

    /// Absolute atom position, given the full sequence length
    pub fn position(&self, total: usize) -> usize {
        total - self.input.len()
    }

    /// Keep the failure that got furthest; on a tie, union the expectations.
    pub fn merge(self, other: Failure<'a>) -> Failure<'a> {
        // less input left means further along
        match self.input.len().cmp(&other.input.len()) {
            Ordering::Less => self,
            Ordering::Greater => other,
            Ordering::Equal => {
                let mut expected = self.expected;
                expected.extend(other.expected);
                Failure {
                    input: self.input,
                    expected,
                }
            }
        }
    }
}

impl<'a> ParseError<Input<'a>> for Failure<'a> {
    fn from_error_kind(input: Input<'a>, kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Eof => Failure::new(input, "end of input"),
            other => Failure::new(input, other.description().to_lowercase()),
        }
    }

    fn append(_input: Input<'a>, _kind: ErrorKind, other: Self) -> Self {
        other
    }

    fn or(self, other: Self) -> Self {
        self.merge(other)
    }
}

/// `context` names what was expected at the starting atom. Failures deeper
/// inside keep their own, more precise expectations.
impl<'a> ContextError<Input<'a>> for Failure<'a> {
    fn add_context(input: Input<'a>, ctx: &'static str, other: Self) -> Self {
        if other.input.len() == input.len() {
            Failure::new(other.input, ctx)
        } else {
            other
        }
    }
}

/// Recoverable failure at `input`
pub fn error<'a>(input: Input<'a>, expected: impl Into<String>) -> nom::Err<Failure<'a>> {
    nom::Err::Error(Failure::new(input, expected))
}

/* ===================== Primitives ===================== */

/// Match one atom satisfying `pred`
pub fn satisfy<'a>(
    label: &'static str,
    pred: impl Fn(&Atom) -> bool,
) -> impl Fn(Input<'a>) -> PResult<'a, &'a Atom> {
    move |input: Input<'a>| match input.split_first() {
        Some((atom, rest)) if pred(atom) => Ok((rest, atom)),
        _ => Err(error(input, label)),
    }
}

/// Match one atom of the given kind
pub fn kind<'a>(k: AtomKind) -> impl Fn(Input<'a>) -> PResult<'a, &'a Atom> {
    satisfy(k.describe(), move |a| a.kind == k)
}

/// Match the field name `name`
pub fn field<'a>(name: &'static str) -> impl Fn(Input<'a>) -> PResult<'a, &'a Atom> {
    move |input: Input<'a>| match input.split_first() {
        Some((atom, rest))
            if atom.kind == AtomKind::FieldName && atom.name.as_deref() == Some(name) =>
        {
            Ok((rest, atom))
        }
        _ => Err(error(input, format!("'{}'", name))),
    }
}

/// Match any field name and return it
pub fn any_field<'a>(input: Input<'a>) -> PResult<'a, (&'a str, &'a Atom)> {
    match input.split_first() {
        Some((atom, rest)) if atom.kind == AtomKind::FieldName => {
            let name = atom.name.as_deref().unwrap_or_default();
            Ok((rest, (name, atom)))
        }
        _ => Err(error(input, "field name")),
    }
}

/// Whether the next atom has kind `k`, without consuming it
pub fn peek_kind(input: Input<'_>, k: AtomKind) -> bool {
    input.first().map(|a| a.kind == k).unwrap_or(false)
}

/* ===================== Combinators ===================== */

/// A failure past the starting atom means a malformed element rather than
/// a missing one. Make it fatal so `many0`, `many1` and `opt` report it
/// instead of stopping quietly in front of the element.
pub fn commit_on_progress<'a, O, P>(mut p: P) -> impl FnMut(Input<'a>) -> PResult<'a, O>
where
    P: Parser<Input<'a>, O, Failure<'a>>,
{
    move |input: Input<'a>| match p.parse(input) {
        Err(nom::Err::Error(f)) if f.input.len() < input.len() => Err(nom::Err::Failure(f)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::atoms::Location;
    use nom::branch::alt;
    use nom::combinator::{cut, map, opt};
    use nom::error::context;
    use nom::multi::{many0, many1};
    use nom::sequence::{delimited, pair, preceded};
    use serde_json::json;

    fn atom(kind: AtomKind, name: Option<&str>, value: Option<serde_json::Value>) -> Atom {
        Atom {
            kind,
            name: name.map(str::to_string),
            value,
            location: Location::new("t", 1, 1),
        }
    }

    fn sample() -> Vec<Atom> {
        vec![
            atom(AtomKind::StartArray, None, None),
            atom(AtomKind::Int, None, Some(json!(1))),
            atom(AtomKind::Int, None, Some(json!(2))),
            atom(AtomKind::String, None, Some(json!("x"))),
            atom(AtomKind::EndArray, None, None),
        ]
    }

    fn unwrap_failure(err: nom::Err<Failure<'_>>) -> (bool, Failure<'_>) {
        match err {
            nom::Err::Error(f) => (false, f),
            nom::Err::Failure(f) => (true, f),
            nom::Err::Incomplete(n) => panic!("Expected a failure, got Incomplete({:?})", n),
        }
    }

    #[test]
    fn test_delimited_and_many() {
        let atoms = sample();
        let input: Input<'_> = &atoms;
        let ints = many0(kind(AtomKind::Int));
        let mut p = delimited(kind(AtomKind::StartArray), ints, kind(AtomKind::StartArray));
        let (_, err) = unwrap_failure(p(input).unwrap_err());

        // Two ints consumed, then the string does not match the closing bracket
        assert_eq!(err.position(atoms.len()), 3);
        assert!(err.expected.contains("start of array"));
    }

    #[test]
    fn test_alt_merges_expectations_at_same_position() {
        let atoms = sample();
        let input: Input<'_> = &atoms;
        let mut p = alt((kind(AtomKind::String), kind(AtomKind::Bool)));
        let (_, err) = unwrap_failure(p(input).unwrap_err());

        assert_eq!(err.position(atoms.len()), 0);
        assert_eq!(
            err.expected.iter().cloned().collect::<Vec<_>>(),
            vec!["boolean".to_string(), "string".to_string()]
        );
    }

    #[test]
    fn test_alt_reports_furthest_failure() {
        let atoms = sample();
        let input: Input<'_> = &atoms;
        let deep = map(
            pair(kind(AtomKind::StartArray), kind(AtomKind::String)),
            |(a, _)| a,
        );
        let mut p = alt((deep, kind(AtomKind::Bool)));
        let (fatal, err) = unwrap_failure(p(input).unwrap_err());

        assert!(!fatal);
        assert_eq!(err.position(atoms.len()), 1);
        assert!(err.expected.contains("string"));
    }

    #[test]
    fn test_cut_stops_alternatives() {
        let atoms = sample();
        let input: Input<'_> = &atoms;
        let committed = preceded(kind(AtomKind::StartArray), cut(kind(AtomKind::String)));
        let mut p = alt((committed, kind(AtomKind::StartArray)));
        let (fatal, err) = unwrap_failure(p(input).unwrap_err());

        assert!(fatal);
        assert_eq!(err.position(atoms.len()), 1);
    }

    #[test]
    fn test_context_relabels_only_at_start() {
        let atoms = sample();
        let input: Input<'_> = &atoms;
        let (_, err) = unwrap_failure(context("list of flags", kind(AtomKind::Bool))(input).unwrap_err());
        assert_eq!(
            err.expected.into_iter().collect::<Vec<_>>(),
            vec!["list of flags".to_string()]
        );

        let deep = preceded(kind(AtomKind::StartArray), kind(AtomKind::Bool));
        let (_, err) = unwrap_failure(context("flags", deep)(input).unwrap_err());
        assert!(err.expected.contains("boolean"));
    }

    #[test]
    fn test_commit_on_progress_surfaces_malformed_element() {
        let atoms = sample();
        let input: Input<'_> = &atoms[1..];

        // plain many0 stops quietly in front of the malformed (int, string) pair
        let (rest, items) = many0(pair(kind(AtomKind::Int), kind(AtomKind::String)))(input).unwrap();
        assert!(items.is_empty());
        assert_eq!(rest.len(), 4);

        let committed = commit_on_progress(pair(kind(AtomKind::Int), kind(AtomKind::String)));
        let (fatal, err) = unwrap_failure(many0(committed)(input).unwrap_err());
        assert!(fatal);
        assert_eq!(err.position(atoms.len()), 2);
        assert!(err.expected.contains("string"));
    }

    #[test]
    fn test_opt_and_many1() {
        let atoms = sample();
        let input: Input<'_> = &atoms;
        let (rest, v) = opt(kind(AtomKind::Bool))(input).unwrap();
        assert!(v.is_none());
        assert_eq!(rest.len(), atoms.len());

        assert!(many1(kind(AtomKind::String))(input).is_err());
        let (rest, items) = many1(kind(AtomKind::Int))(&input[1..]).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(rest.len(), 2);
    }
}
