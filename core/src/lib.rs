pub mod ast;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod parser;
pub mod project;

// Re-export main types
pub use ast::{Document, Flow, Step};
pub use compiler::{compile_flow, ProcessDefinition};
pub use config::{CompilerConfig, Config};
pub use error::{CompileError, CompileResult, Diagnostic};
pub use parser::parse_document;
pub use project::{compile_project, load_project, ProjectDefinition};
