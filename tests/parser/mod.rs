// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::{bail, Result};
use policygate::*;
use serde::{Deserialize, Serialize};
use test_generator::test_resources;

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct RuleInfo {
    id: String,
    category: String,
    severity: Option<String>,
    kinds: Option<Vec<String>>,
    message: Option<String>,
    line: Option<u32>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct TestCase {
    note: String,
    policy: String,
    scope: Option<String>,
    rules: Option<Vec<RuleInfo>>,
    error: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn match_rule(rule: &Rule, expected: &RuleInfo) -> Result<()> {
    if rule.id.as_ref() != expected.id {
        bail!("rule id mismatch: {} != {}", rule.id, expected.id);
    }
    if rule.category.to_string() != expected.category {
        bail!("{}: category {} != {}", rule.id, rule.category, expected.category);
    }
    let severity = rule.severity.map(|s| s.to_string());
    if severity != expected.severity {
        bail!("{}: severity {severity:?} != {:?}", rule.id, expected.severity);
    }
    let kinds = match &rule.applies_to {
        KindFilter::Any => None,
        KindFilter::Only(kinds) => Some(kinds.iter().map(|k| k.to_string()).collect::<Vec<_>>()),
    };
    if kinds != expected.kinds {
        bail!("{}: kinds {kinds:?} != {:?}", rule.id, expected.kinds);
    }
    if let Some(message) = &expected.message {
        if &rule.message.to_string() != message {
            bail!("{}: message `{}` != `{message}`", rule.id, rule.message);
        }
    }
    if let Some(line) = expected.line {
        match &rule.location {
            Some(location) if location.line == line => (),
            other => bail!("{}: location {other:?}, expected line {line}", rule.id),
        }
    }
    Ok(())
}

fn yaml_test_impl(file: &str) -> Result<()> {
    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    println!("running {file}");

    for case in &test.cases {
        print!("case {} ", case.note);
        match (&case.rules, &case.error) {
            (Some(_), None) | (None, Some(_)) => (),
            _ => panic!("either rules or error must be specified in test case."),
        }

        match compile_policy("case.policy", &case.policy) {
            Ok(rule_set) => {
                let Some(expected) = &case.rules else {
                    bail!("parsing succeeded and did not produce any errors");
                };
                if let Some(scope) = &case.scope {
                    assert_eq!(rule_set.scope(), scope, "{}", case.note);
                }
                if rule_set.len() != expected.len() {
                    bail!(
                        "{}: {} rules parsed, {} expected",
                        case.note,
                        rule_set.len(),
                        expected.len()
                    );
                }
                for (rule, info) in rule_set.rules().iter().zip(expected) {
                    match_rule(rule, info)?;
                }
            }
            Err(actual) => match &case.error {
                Some(expected) => {
                    let actual = actual.to_string();
                    if !actual.contains(expected) {
                        bail!(
                            "Error message\n`{}\n`\ndoes not contain `{}`",
                            actual,
                            expected
                        );
                    }
                    println!("{actual}");
                }
                _ => return Err(actual.into()),
            },
        }

        println!("passed");
    }

    println!("{} cases passed.", test.cases.len());
    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{}", e);
        }
    }
}

#[test_resources("tests/parser/**/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}

fn body_of(policy: &str) -> Result<Predicate> {
    let rule_set = compile_policy("body.policy", policy)?;
    match rule_set.rules().first() {
        Some(rule) => Ok(rule.body.clone()),
        None => bail!("no rules"),
    }
}

#[test]
fn some_statements_nest_what_follows() -> Result<()> {
    let body = body_of(
        r#"
package p
deny "env" {
    input.enabled == true
    some c in input.containers
    c.name != "sidecar"
    some e in c.env
    e.name in ["TOKEN"]
    message "{c.name} {e.name}"
}
"#,
    )?;

    let expected = Predicate::And(vec![
        Predicate::Equals(
            Operand::Path(Path::input(["enabled"])),
            Operand::literal(true),
        ),
        Predicate::some(
            "c",
            Path::input(["containers"]),
            Predicate::And(vec![
                Predicate::NotEquals(
                    Operand::Path(Path::var("c", ["name"])),
                    Operand::literal("sidecar"),
                ),
                Predicate::some(
                    "e",
                    Path::var("c", ["env"]),
                    Predicate::And(vec![Predicate::In(
                        Operand::Path(Path::var("e", ["name"])),
                        Operand::Literal(Value::from(vec![Value::from("TOKEN")])),
                    )]),
                ),
            ]),
        ),
    ]);
    assert_eq!(body, expected);
    Ok(())
}

#[test]
fn any_blocks_are_self_contained() -> Result<()> {
    let body = body_of(
        r#"
package p
deny "no-probe" {
    not any c in input.containers { exists c.livenessProbe; c.name == "web" }
    message "web has no probe"
}
"#,
    )?;

    let expected = Predicate::And(vec![Predicate::not(Predicate::for_any(
        "c",
        Path::input(["containers"]),
        Predicate::And(vec![
            Predicate::Exists(Path::var("c", ["livenessProbe"])),
            Predicate::Equals(
                Operand::Path(Path::var("c", ["name"])),
                Operand::literal("web"),
            ),
        ]),
    ))]);
    assert_eq!(body, expected);
    Ok(())
}

#[test]
fn paths_accept_indexes_and_quoted_keys() -> Result<()> {
    let body = body_of(
        r#"
package p
deny "annotation" {
    input.metadata.annotations["app.kubernetes.io/name"] startswith "web"
    input.spec.containers[0].ports[1].containerPort >= 1024
    message "m"
}
"#,
    )?;

    let expected = Predicate::And(vec![
        Predicate::StartsWith(
            Operand::Path(Path::input(["metadata", "annotations", "app.kubernetes.io/name"])),
            Operand::literal("web"),
        ),
        Predicate::Compare(
            Operand::Path(Path {
                root: PathRoot::Input,
                segments: vec![
                    Segment::from("spec"),
                    Segment::from("containers"),
                    Segment::Index(0),
                    Segment::from("ports"),
                    Segment::Index(1),
                    Segment::from("containerPort"),
                ],
            }),
            CompareOp::Ge,
            Operand::literal(1024u64),
        ),
    ]);
    assert_eq!(body, expected);
    Ok(())
}

#[test]
fn errors_are_policy_load_errors() {
    match compile_policy("bad.policy", "package p\nwarn \"x\" {\n}\n") {
        Err(Error::PolicyLoad { origin, message }) => {
            assert_eq!(origin, "bad.policy");
            assert!(message.contains("rule `x` has no message"), "{message}");
            assert!(message.contains("bad.policy:2:1"), "{message}");
        }
        other => panic!("expected policy load error, got {other:?}"),
    }
}
