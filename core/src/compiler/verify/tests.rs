//! Tests for structural verification

use indexmap::IndexMap;

use super::*;
use crate::compiler::compile_flow;
use crate::compiler::ir::{Call, Element, ProcessDefinition};
use crate::config::CompilerConfig;
use crate::parser::parse_document;

// ============================================================================
// Helper Functions
// ============================================================================

fn process(elements: Vec<Element>) -> ProcessDefinition {
    ProcessDefinition {
        name: "test".to_string(),
        elements,
        source_map: IndexMap::new(),
    }
}

fn start(id: &str) -> Element {
    Element::StartEvent { id: id.to_string() }
}

fn end(id: &str) -> Element {
    Element::EndEvent {
        id: id.to_string(),
        error_code: None,
    }
}

fn task(id: &str) -> Element {
    Element::ServiceTask {
        id: id.to_string(),
        call: Call::Delegate {
            name: "t".to_string(),
            args: vec![],
        },
        inputs: vec![],
        outputs: vec![],
        extra: IndexMap::new(),
    }
}

fn flow(id: &str, from: &str, to: &str, guard: Option<&str>) -> Element {
    Element::SequenceFlow {
        id: id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        guard: guard.map(str::to_string),
    }
}

/// Compile `main` without the built-in verification pass
fn compile_unverified(source: &str) -> ProcessDefinition {
    let doc = parse_document("test.yml", source).expect("Parse should succeed");
    let config = CompilerConfig {
        verify: false,
        ..CompilerConfig::default()
    };
    compile_flow("main", &doc.flows["main"], &config).expect("Compilation should succeed")
}

/// Check if violations contain a specific rule
fn has_rule(violations: &[Violation], rule_id: &str) -> bool {
    violations.iter().any(|v| v.rule_id == rule_id)
}

fn for_rule<'a>(violations: &'a [Violation], rule_id: &str) -> Vec<&'a Violation> {
    violations.iter().filter(|v| v.rule_id == rule_id).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_minimal_process_is_clean() {
    let p = process(vec![start("s"), end("e"), flow("f", "s", "e", None)]);
    assert!(verify_process(&p).is_empty());
}

#[test]
fn test_compiled_flow_has_no_errors() {
    let source = r#"
flows:
  main:
    - try:
        - task: a
          retry:
            times: 2
        - switch: ${kind}
          x:
            - task: b
              withItems:
                - 1
                - 2
          default:
            - return: failed
      error:
        - if: ${fatal}
          then:
            - exit
    - task: c
"#;

    let violations = verify_process(&compile_unverified(source));
    assert!(
        violations.iter().all(|v| !v.is_error()),
        "{:#?}",
        violations
    );
    assert!(!has_rule(&violations, "unique-ids"));
    assert!(!has_rule(&violations, "dangling-flow"));
}

#[test]
fn test_duplicate_ids() {
    let p = process(vec![
        start("s"),
        task("t"),
        task("t"),
        end("e"),
        flow("f1", "s", "t", None),
        flow("f2", "t", "e", None),
    ]);
    let violations = verify_process(&p);

    let dupes = for_rule(&violations, "unique-ids");
    assert_eq!(dupes.len(), 1);
    assert_eq!(dupes[0].element.as_deref(), Some("t"));
}

#[test]
fn test_dangling_flow_target() {
    let p = process(vec![start("s"), end("e"), flow("f", "s", "missing", None)]);
    let violations = verify_process(&p);

    let dangling = for_rule(&violations, "dangling-flow");
    assert_eq!(dangling.len(), 1);
    assert!(dangling[0].message.contains("'missing'"));
    assert!(has_errors(&p));
}

#[test]
fn test_flow_out_of_terminal_event() {
    let p = process(vec![
        start("s"),
        end("e"),
        task("t"),
        flow("f1", "s", "e", None),
        flow("f2", "e", "t", None),
    ]);
    let violations = verify_process(&p);
    assert_eq!(for_rule(&violations, "dangling-flow").len(), 1);
    assert!(!has_rule(&violations, "unique-ids"));
}

#[test]
fn test_boundary_on_gateway_is_rejected() {
    let p = process(vec![
        start("s"),
        Element::ExclusiveGateway { id: "g".to_string() },
        Element::BoundaryEvent {
            id: "b".to_string(),
            attached_to: "g".to_string(),
        },
        end("e"),
        flow("f1", "s", "g", None),
        flow("f2", "g", "e", None),
        flow("f3", "b", "e", None),
    ]);
    let violations = verify_process(&p);

    let boundary = for_rule(&violations, "boundary-attachment");
    assert_eq!(boundary.len(), 1);
    assert!(boundary[0].message.contains("ExclusiveGateway"));
}

#[test]
fn test_boundary_without_outgoing_flow() {
    let p = process(vec![
        start("s"),
        task("t"),
        Element::BoundaryEvent {
            id: "b".to_string(),
            attached_to: "t".to_string(),
        },
        end("e"),
        flow("f1", "s", "t", None),
        flow("f2", "t", "e", None),
    ]);
    let violations = verify_process(&p);
    assert_eq!(for_rule(&violations, "boundary-attachment").len(), 1);
}

#[test]
fn test_gateway_loop_without_exit() {
    // g -> t -> g with no way to an end event
    let p = process(vec![
        start("s"),
        Element::ExclusiveGateway { id: "g".to_string() },
        task("t"),
        flow("f1", "s", "g", None),
        flow("f2", "g", "t", Some("${x}")),
        flow("f3", "t", "g", None),
    ]);
    let violations = verify_process(&p);
    let gateway = for_rule(&violations, "gateway-exit");

    assert!(gateway
        .iter()
        .any(|v| v.is_error() && v.message.contains("reaches an end")));
    assert!(gateway.iter().any(|v| v.severity == Severity::Hint));
}

#[test]
fn test_two_start_events() {
    let p = process(vec![
        start("s1"),
        start("s2"),
        end("e"),
        flow("f1", "s1", "e", None),
        flow("f2", "s2", "e", None),
    ]);
    let violations = verify_process(&p);
    assert_eq!(for_rule(&violations, "single-start").len(), 1);
}

#[test]
fn test_rules_are_registered() {
    let ids: Vec<_> = Verifier::new().rules().map(|(id, _)| id).collect();
    assert_eq!(
        ids,
        vec![
            "unique-ids",
            "single-start",
            "dangling-flow",
            "boundary-attachment",
            "gateway-exit"
        ]
    );
}

#[test]
fn test_violation_display() {
    let v = Violation::warning(Some("e4"), "looks odd", "gateway-exit");
    assert_eq!(v.to_string(), "warning at e4: looks odd [gateway-exit]");
}
