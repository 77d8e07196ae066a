// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::{bail, Result};
use policygate::unstable::*;
use serde::{Deserialize, Serialize};
use test_generator::test_resources;

fn get_tokens(source: &Source) -> Result<Vec<Token>> {
    let mut tokens = vec![];
    let mut lex = Lexer::new(source);
    loop {
        let tok = lex.next_token()?;
        tokens.push(tok.clone());
        if tok.0 == TokenKind::Eof {
            break;
        }
    }

    Ok(tokens)
}

// The caret in a diagnostic must sit under the token's text.
fn check_loc(tok: &Token) -> Result<()> {
    let msg = tok.1.source.message(tok.1.line, tok.1.col, "", "");
    let lines: Vec<&str> = msg.split('\n').collect();
    let prefix = lines[3].find("| ").map(|i| i + 2).unwrap_or_default();
    let source_line = &lines[3][prefix..];
    let caret = match lines[4].find('^') {
        Some(idx) => idx - prefix,
        None => bail!("no caret for {tok:?} {msg}"),
    };

    if tok.0 == TokenKind::Eof {
        if caret < source_line.len() {
            bail!("eof caret inside line for {tok:?} {msg}");
        }
        return Ok(());
    }

    if !source_line[caret..].starts_with(tok.1.text()) {
        bail!("location mismatch for {tok:?} {msg}");
    }
    Ok(())
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct TestCase {
    note: String,
    policy: String,
    tokens: Option<Vec<String>>,
    kinds: Option<Vec<String>>,
    error: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn kind_name(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::Symbol => "symbol",
        TokenKind::String => "string",
        TokenKind::Number => "number",
        TokenKind::Ident => "ident",
        TokenKind::Eof => "eof",
    }
}

fn yaml_test_impl(file: &str) -> Result<()> {
    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    println!("running {file}");

    for case in &test.cases {
        print!("case {} ", case.note);
        let source = Source::from_contents("case.policy".to_string(), case.policy.clone())?;
        match get_tokens(&source) {
            Ok(tokens) => {
                if let Some(error) = &case.error {
                    bail!("expected error `{error}`, got {} tokens", tokens.len());
                }
                for tok in &tokens {
                    check_loc(tok)?;
                }
                let tokens = &tokens[..tokens.len() - 1];
                if let Some(expected) = &case.tokens {
                    let actual: Vec<&str> = tokens.iter().map(|t| t.1.text()).collect();
                    assert_eq!(&actual, expected, "{}", case.note);
                }
                if let Some(expected) = &case.kinds {
                    let actual: Vec<&str> = tokens.iter().map(|t| kind_name(&t.0)).collect();
                    assert_eq!(&actual, expected, "{}", case.note);
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
                _ => return Err(actual),
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

#[test_resources("tests/lexer/**/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}

#[test]
fn debug() -> Result<()> {
    let text = "\"This string is 35 characters long.\"\"short string\"";
    let source = Source::from_contents("case.policy".to_string(), text.to_string())?;

    let mut lexer = Lexer::new(&source);
    let tok = lexer.next_token()?;
    check_loc(&tok)?;

    assert_eq!(
        format!("{:?}", tok.1),
        "1:2:1:35, \"This string is 35 characters lon...\"",
        "long span not truncated correctly"
    );

    let tok = lexer.next_token()?;
    check_loc(&tok)?;
    assert_eq!(format!("{:?}", tok.1), "1:38:37:49, \"short string\"");

    Ok(())
}

#[test]
fn crlf_lines() -> Result<()> {
    let text = "package a\r\nwarn \"x\" {\r\n  message \"m\"\r\n}\r\n";
    let source = Source::from_contents("crlf.policy".to_string(), text.to_string())?;
    assert_eq!(source.line(1), "warn \"x\" {");
    for tok in get_tokens(&source)? {
        check_loc(&tok)?;
    }
    Ok(())
}
