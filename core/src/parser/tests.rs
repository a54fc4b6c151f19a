use super::*;
use crate::ast::{Arg, OutSpec, Step};
use maplit::hashset;
use serde_json::json;

fn parse_main(steps_yaml: &str) -> Vec<Step> {
    let text = format!("flows:\n  main:\n{}", indent(steps_yaml, 4));
    let doc = parse_document("test.yml", &text).unwrap();
    doc.flows["main"].steps.clone()
}

fn parse_main_err(steps_yaml: &str) -> CompileError {
    let text = format!("flows:\n  main:\n{}", indent(steps_yaml, 4));
    parse_document("test.yml", &text).unwrap_err()
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.trim_matches('\n')
        .lines()
        .map(|l| format!("{}{}\n", pad, l))
        .collect()
}

fn single(steps_yaml: &str) -> Step {
    let mut steps = parse_main(steps_yaml);
    assert_eq!(steps.len(), 1, "expected exactly one step, got {:?}", steps);
    steps.remove(0)
}

/* ===================== Short forms ===================== */

#[test]
fn test_expression_short() {
    match single("- ${log.info('x')}") {
        Step::ExpressionShort { expr, location } => {
            assert_eq!(expr, "${log.info('x')}");
            assert_eq!(location.line, 3);
        }
        other => panic!("Expected ExpressionShort, got {:?}", other),
    }
}

#[test]
fn test_bare_string_is_call() {
    match single("- otherFlow") {
        Step::Call { name, options, .. } => {
            assert_eq!(name, "otherFlow");
            assert!(options.is_empty());
        }
        other => panic!("Expected Call, got {:?}", other),
    }
}

#[test]
fn test_return_and_exit_keywords() {
    let steps = parse_main("- return\n- exit");
    assert!(matches!(steps[0], Step::Return { error_code: None, .. }));
    assert!(matches!(steps[1], Step::Exit { .. }));
}

#[test]
fn test_return_with_error_code() {
    match single("- return: notFound") {
        Step::Return { error_code, .. } => assert_eq!(error_code.as_deref(), Some("notFound")),
        other => panic!("Expected Return, got {:?}", other),
    }
}

#[test]
fn test_task_short_keeps_argument_value() {
    match single("- log: \"hello ${name}\"") {
        Step::TaskShort { name, arg, .. } => {
            assert_eq!(name, "log");
            assert_eq!(arg, json!("hello ${name}"));
        }
        other => panic!("Expected TaskShort, got {:?}", other),
    }

    match single("- sleep: [1, 2]") {
        Step::TaskShort { arg, .. } => assert_eq!(arg, json!([1, 2])),
        other => panic!("Expected TaskShort, got {:?}", other),
    }
}

/* ===================== Full forms ===================== */

#[test]
fn test_task_full_form() {
    let step = single(
        r#"
- task: http
  in:
    url: "${base}/x"
    timeout: 30
  out: response
  retry:
    times: 3
    delay: 2
  meta: { owner: ops }
"#,
    );

    match step {
        Step::Task { name, options, .. } => {
            assert_eq!(name, "http");
            let input = options.input.unwrap();
            assert_eq!(input["url"], Arg::Expression("${base}/x".to_string()));
            assert_eq!(input["timeout"], Arg::Literal(json!(30)));
            assert_eq!(
                options.output,
                Some(OutSpec::Variable {
                    name: "response".to_string()
                })
            );
            let retry = options.retry.unwrap();
            assert_eq!(retry.times, Some(Arg::Literal(json!(3))));
            assert_eq!(retry.delay, Some(Arg::Literal(json!(2))));
            assert_eq!(options.extra["meta"], json!({"owner": "ops"}));
        }
        other => panic!("Expected Task, got {:?}", other),
    }
}

#[test]
fn test_out_forms() {
    let steps = parse_main(
        r#"
- task: a
  out: [x, y]
- task: b
  out:
    total: ${result.count}
"#,
    );

    match &steps[0] {
        Step::Task { options, .. } => assert_eq!(
            options.output.as_ref().map(|o| o.names()),
            Some(vec!["x".to_string(), "y".to_string()])
        ),
        other => panic!("Expected Task, got {:?}", other),
    }
    match &steps[1] {
        Step::Task { options, .. } => match &options.output {
            Some(OutSpec::Mappings { mappings }) => {
                assert_eq!(mappings["total"], Arg::Expression("${result.count}".to_string()))
            }
            other => panic!("Expected Mappings, got {:?}", other),
        },
        other => panic!("Expected Task, got {:?}", other),
    }
}

#[test]
fn test_if_with_and_without_else() {
    let steps = parse_main(
        r#"
- if: ${x > 1}
  then:
    - a
  else:
    - b
    - c
- if: ${y}
  then:
    - d
"#,
    );

    match &steps[0] {
        Step::If {
            condition,
            then_steps,
            else_steps,
            ..
        } => {
            assert_eq!(condition, "${x > 1}");
            assert_eq!(then_steps.len(), 1);
            assert_eq!(else_steps.len(), 2);
        }
        other => panic!("Expected If, got {:?}", other),
    }
    match &steps[1] {
        Step::If { else_steps, .. } => assert!(else_steps.is_empty()),
        other => panic!("Expected If, got {:?}", other),
    }
}

#[test]
fn test_switch_cases_and_default() {
    match single(
        r#"
- switch: ${color}
  red:
    - stop
  green:
    - go
  default:
    - wait
"#,
    ) {
        Step::Switch {
            expr,
            cases,
            default,
            ..
        } => {
            assert_eq!(expr, "${color}");
            assert_eq!(cases.keys().cloned().collect::<Vec<_>>(), vec!["red", "green"]);
            assert_eq!(default.map(|d| d.len()), Some(1));
        }
        other => panic!("Expected Switch, got {:?}", other),
    }
}

#[test]
fn test_group_with_error_block() {
    match single(
        r#"
- try:
    - a
    - b
  error:
    - log: failed
"#,
    ) {
        Step::Group { steps, options, .. } => {
            assert_eq!(steps.len(), 2);
            assert_eq!(options.error.map(|e| e.len()), Some(1));
        }
        other => panic!("Expected Group, got {:?}", other),
    }
}

#[test]
fn test_docker_options() {
    match single(
        r#"
- docker: library/alpine
  cmd: "echo ${name}"
  env:
    LEVEL: debug
  hosts: ["db:10.0.0.1"]
  debug: true
"#,
    ) {
        Step::DockerCall {
            image,
            cmd,
            env,
            hosts,
            force_pull,
            debug,
            ..
        } => {
            assert_eq!(image, "library/alpine");
            assert_eq!(cmd.as_deref(), Some("echo ${name}"));
            assert_eq!(env["LEVEL"], json!("debug"));
            assert_eq!(hosts, vec!["db:10.0.0.1".to_string()]);
            assert!(force_pull);
            assert!(debug);
        }
        other => panic!("Expected DockerCall, got {:?}", other),
    }
}

#[test]
fn test_script_set_checkpoint_event_form() {
    let steps = parse_main(
        r#"
- script: js
  body: "print(1)"
- set:
    a: 1
    b: ${a + 1}
- checkpoint: afterSet
- event: debugMarker
- form: approval
  yield: true
"#,
    );

    match &steps[0] {
        Step::Script { name, body, options, .. } => {
            assert_eq!(name, "js");
            assert_eq!(body.as_deref(), Some("print(1)"));
            assert!(options.extra.is_empty());
        }
        other => panic!("Expected Script, got {:?}", other),
    }
    match &steps[1] {
        Step::SetVariables { variables, .. } => {
            assert_eq!(variables["a"], json!(1));
            assert_eq!(variables["b"], json!("${a + 1}"));
        }
        other => panic!("Expected SetVariables, got {:?}", other),
    }
    assert!(matches!(&steps[2], Step::Checkpoint { name, .. } if name == "afterSet"));
    assert!(matches!(&steps[3], Step::Event { name, .. } if name == "debugMarker"));
    match &steps[4] {
        Step::FormCall { name, options, .. } => {
            assert_eq!(name, "approval");
            assert_eq!(options["yield"], json!(true));
        }
        other => panic!("Expected FormCall, got {:?}", other),
    }
}

/* ===================== Document ===================== */

#[test]
fn test_document_sections() {
    let doc = parse_document(
        "doc.yml",
        r#"
configuration:
  entryPoint: main
flows:
  main:
    - a
  other:
    - b
triggers:
  - github:
      entryPoint: main
      repository: acme/app
imports:
  - git:
      url: "https://example.com/repo.git"
publicFlows:
  - main
"#,
    )
    .unwrap();

    assert_eq!(doc.configuration, Some(json!({"entryPoint": "main"})));
    assert_eq!(doc.flows.keys().cloned().collect::<Vec<_>>(), vec!["main", "other"]);
    assert_eq!(doc.triggers[0].kind, "github");
    assert_eq!(doc.triggers[0].params["repository"], json!("acme/app"));
    assert_eq!(doc.imports[0].kind, "git");
    assert_eq!(doc.public_flows, vec!["main".to_string()]);
}

/* ===================== Errors ===================== */

#[test]
fn test_unknown_section_is_rejected() {
    let err = parse_document("doc.yml", "flowz:\n  main:\n    - a\n").unwrap_err();
    match err {
        CompileError::Syntax { expected, found, location } => {
            assert!(expected.contains(&"'flows'".to_string()));
            assert_eq!(found, "field 'flowz'");
            assert_eq!(location.line, 1);
        }
        other => panic!("Expected Syntax error, got {:?}", other),
    }
}

#[test]
fn test_committed_keyword_reports_its_own_error() {
    // `task` must be followed by a string; the failure must not fall through
    // to the task-short form
    let err = parse_main_err("- task: [1, 2]");
    match err {
        CompileError::Syntax { expected, found, .. } => {
            assert_eq!(expected, vec!["string".to_string()]);
            assert_eq!(found, "start of array");
        }
        other => panic!("Expected Syntax error, got {:?}", other),
    }
}

#[test]
fn test_unknown_option_lists_allowed_names() {
    let err = parse_main_err("- expr: ${x}\n  in:\n    a: 1");
    match err {
        CompileError::Syntax { expected, found, location } => {
            let expected: std::collections::HashSet<_> = expected.into_iter().collect();
            assert_eq!(
                expected,
                hashset! {
                    "'out'".to_string(),
                    "'error'".to_string(),
                    "end of object".to_string(),
                }
            );
            assert_eq!(found, "field 'in'");
            assert_eq!(location.line, 4);
        }
        other => panic!("Expected Syntax error, got {:?}", other),
    }
}

#[test]
fn test_empty_step_list_is_rejected() {
    let err = parse_document("doc.yml", "flows:\n  main: []\n").unwrap_err();
    match err {
        CompileError::Syntax { expected, found, .. } => {
            assert_eq!(expected, vec!["step".to_string()]);
            assert_eq!(found, "end of array");
        }
        other => panic!("Expected Syntax error, got {:?}", other),
    }
}

#[test]
fn test_if_requires_expression() {
    let err = parse_main_err("- if: plain\n  then:\n    - a");
    let message = err.to_string();
    assert!(message.starts_with("expected expression, got string 'plain'"), "{}", message);
}

#[test]
fn test_invalid_yaml() {
    let err = parse_document("bad.yml", "flows:\n  main: [a, b\n").unwrap_err();
    assert!(matches!(err, CompileError::Yaml { .. }));
}
