// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::env;

use anyhow::{bail, Result};
use policygate::*;
use serde::{Deserialize, Serialize};
use test_generator::test_resources;

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct TestCase {
    note: String,
    #[serde(default)]
    modules: Vec<String>,
    builtins: Option<bool>,
    scope: String,
    input: Option<Value>,
    kind: Option<String>,
    strict_kinds: Option<bool>,
    want_result: Option<Decision>,
    error: Option<String>,
    skip: Option<bool>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn eval_case(case: &TestCase) -> Result<Decision> {
    let mut engine = match case.builtins {
        Some(true) => Engine::with_builtin_policies()?,
        _ => Engine::new(),
    };
    engine.set_strict_kinds(case.strict_kinds == Some(true));
    for (idx, module) in case.modules.iter().enumerate() {
        engine.add_policy(format!("policy_{idx}.policy"), module.clone())?;
    }

    let mut document = Document::from_value(case.input.clone().unwrap_or_else(Value::new_object))?;
    if let Some(kind) = &case.kind {
        document = document.with_kind(kind);
    }
    Ok(engine.evaluate(&case.scope, &document)?)
}

fn check_decision(computed: &Decision, expected: &Decision) -> Result<()> {
    if computed != expected {
        bail!(
            "\nleft  = {}\nright = {}\n",
            serde_json::to_string_pretty(computed)?,
            serde_json::to_string_pretty(expected)?
        );
    }
    Ok(())
}

fn yaml_test_impl(file: &str) -> Result<()> {
    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    println!("running {file}");

    for case in &test.cases {
        print!("case {} ", case.note);
        if case.skip == Some(true) {
            println!("skipped");
            continue;
        }

        match (&case.want_result, &case.error) {
            (Some(_), None) | (None, Some(_)) => (),
            _ => panic!("either want_result or error must be specified in test case."),
        }

        match eval_case(case) {
            Ok(decision) => match &case.want_result {
                Some(want_result) => check_decision(&decision, want_result)?,
                _ => bail!("eval succeeded and did not produce any errors"),
            },
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
                _ => return Err(actual),
            },
        }

        println!("passed");
    }

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

#[test_resources("tests/cases/**/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}

#[test]
#[ignore = "run a single case file: cargo test one_yaml -- --ignored <file.yaml>"]
fn one_yaml() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let Some(file) = env::args().find(|a| a.ends_with(".yaml")) else {
        bail!("missing <yaml-file>");
    };
    yaml_test(&file)
}
