//! Project assembly
//!
//! Compiles every flow of a document on its own and gathers forms, triggers
//! and imports alongside. A failing flow is recorded and the remaining flows
//! are still compiled so one run reports every problem.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use crate::ast::{Document, FormField, Import, Trigger};
use crate::compiler::{compile_flow, ProcessDefinition};
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult, Diagnostic};
use crate::parser::parse_document;

/// A flow that failed to compile
#[derive(Debug, Clone)]
pub struct FlowError {
    pub flow: String,
    pub error: CompileError,
}

impl FlowError {
    pub fn diagnostic(&self) -> Diagnostic {
        let mut diagnostic = self.error.diagnostic();
        diagnostic.message = format!("flow '{}': {}", self.flow, diagnostic.message);
        diagnostic
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectDefinition {
    pub source_name: String,
    /// SHA-256 of the source text
    pub version_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<JsonValue>,
    pub processes: IndexMap<String, ProcessDefinition>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub forms: IndexMap<String, Vec<FormField>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Import>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub public_flows: Vec<String>,
    #[serde(skip)]
    pub errors: Vec<FlowError>,
}

impl ProjectDefinition {
    /// A project is usable only when every flow compiled
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// First eight characters of the version hash
    pub fn short_version(&self) -> &str {
        &self.version_hash[..8]
    }
}

/// Assemble a project from an already parsed document
pub fn compile_project(
    document: &Document,
    source_name: &str,
    source: &str,
    config: &CompilerConfig,
) -> ProjectDefinition {
    let mut processes = IndexMap::new();
    let mut errors = Vec::new();

    // One lowering context per flow, inside compile_flow
    for (name, flow) in &document.flows {
        match compile_flow(name, flow, config) {
            Ok(process) => {
                processes.insert(name.clone(), process);
            }
            Err(error) => {
                tracing::debug!(flow = %name, %error, "flow failed to compile");
                errors.push(FlowError {
                    flow: name.clone(),
                    error,
                });
            }
        }
    }

    for public in &document.public_flows {
        if !document.flows.contains_key(public) {
            tracing::warn!(flow = %public, "public flow is not defined in this document");
        }
    }

    let project = ProjectDefinition {
        source_name: source_name.to_string(),
        version_hash: hash_source(source),
        configuration: document.configuration.clone(),
        processes,
        forms: document.forms.clone(),
        triggers: document.triggers.clone(),
        imports: document.imports.clone(),
        public_flows: document.public_flows.clone(),
        errors,
    };

    tracing::debug!(
        source = source_name,
        version = project.short_version(),
        flows = project.processes.len(),
        failed = project.errors.len(),
        "assembled project"
    );

    project
}

/// Parse and assemble in one go. Only a parse failure is returned as an
/// error; flow failures are collected in the project.
pub fn load_project(
    source_name: &str,
    source: &str,
    config: &CompilerConfig,
) -> CompileResult<ProjectDefinition> {
    let document = parse_document(source_name, source)?;
    Ok(compile_project(&document, source_name, source, config))
}

fn hash_source(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
configuration:
  entryPoint: main
flows:
  main:
    - task: a
    - call: helper
  helper:
    - log: hi
  broken:
    - task: a
      retry:
        times: 1
      error:
        - task: h
forms:
  approval:
    - comment:
        type: string?
triggers:
  - cron:
      spec: "0 * * * *"
      entryPoint: main
imports:
  - git:
      url: https://example.com/repo.git
publicFlows:
  - main
"#;

    #[test]
    fn test_failing_flow_does_not_stop_others() {
        let project = load_project("p.yml", SOURCE, &CompilerConfig::default()).unwrap();

        assert_eq!(
            project.processes.keys().collect::<Vec<_>>(),
            vec!["main", "helper"]
        );
        assert!(!project.is_valid());
        assert_eq!(project.errors.len(), 1);
        assert_eq!(project.errors[0].flow, "broken");
        assert!(matches!(
            project.errors[0].error,
            CompileError::ConflictingOptions { .. }
        ));

        let diagnostic = project.errors[0].diagnostic();
        assert!(diagnostic.message.starts_with("flow 'broken': "));
        assert_eq!(diagnostic.line, Some(11));
    }

    #[test]
    fn test_sections_are_carried_over() {
        let project = load_project("p.yml", SOURCE, &CompilerConfig::default()).unwrap();

        assert_eq!(project.forms["approval"][0].name, "comment");
        assert_eq!(project.triggers[0].kind, "cron");
        assert_eq!(project.imports[0].kind, "git");
        assert_eq!(project.public_flows, vec!["main".to_string()]);
        assert_eq!(
            project.configuration,
            Some(serde_json::json!({"entryPoint": "main"}))
        );
    }

    #[test]
    fn test_version_hash_tracks_source() {
        let config = CompilerConfig::default();
        let a = load_project("p.yml", "flows:\n  main:\n    - task: a\n", &config).unwrap();
        let b = load_project("p.yml", "flows:\n  main:\n    - task: b\n", &config).unwrap();
        let a2 = load_project("other.yml", "flows:\n  main:\n    - task: a\n", &config).unwrap();

        assert_eq!(a.version_hash.len(), 64);
        assert_ne!(a.version_hash, b.version_hash);
        assert_eq!(a.version_hash, a2.version_hash);
        assert_eq!(a.short_version(), &a.version_hash[..8]);
        assert!(a.is_valid());
    }

    #[test]
    fn test_parse_failure_is_returned() {
        let err = load_project("p.yml", "flows: 5\n", &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }));
    }
}
