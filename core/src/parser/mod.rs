//! Flow-language parser
//!
//! Two stages: the YAML text is flattened into [`atoms::Atoms`], then the
//! combinator grammar in [`grammar`] and [`document`] builds the AST. Both
//! stages report failures as [`CompileError`] with a source location.

pub mod atoms;
pub mod combinators;
pub mod document;
pub mod forms;
pub mod grammar;
pub mod printer;

#[cfg(test)]
mod tests;

use nom::combinator::all_consuming;

use crate::ast::Document;
use crate::error::{CompileError, CompileResult};

use atoms::Atoms;
use combinators::Failure;

/* ===================== Public API ===================== */

/// Parse a flow-language document
pub fn parse_document(source_name: &str, text: &str) -> CompileResult<Document> {
    let atoms = Atoms::from_yaml(source_name, text)?;
    parse_atoms(&atoms)
}

/// Run the document grammar over an already tokenized sequence
pub fn parse_atoms(atoms: &Atoms) -> CompileResult<Document> {
    match all_consuming(document::document)(atoms.as_slice()) {
        Ok((_, doc)) => {
            tracing::debug!(
                source = atoms.source_name(),
                flows = doc.flows.len(),
                forms = doc.forms.len(),
                "parsed document"
            );
            Ok(doc)
        }
        Err(nom::Err::Error(failure)) | Err(nom::Err::Failure(failure)) => {
            Err(syntax_error(atoms, failure))
        }
        // complete input only; nom never asks for more atoms here
        Err(nom::Err::Incomplete(_)) => Err(CompileError::Syntax {
            location: atoms.end_location(),
            expected: vec!["more input".to_string()],
            found: "end of input".to_string(),
        }),
    }
}

/// Render the furthest failure as "expected X, got Y at location"
fn syntax_error(atoms: &Atoms, failure: Failure<'_>) -> CompileError {
    let (location, found) = match failure.found() {
        Some(atom) => (atom.location.clone(), atom.describe()),
        None => (atoms.end_location(), "end of input".to_string()),
    };

    CompileError::Syntax {
        location,
        expected: failure.expected.into_iter().collect(),
        found,
    }
}
