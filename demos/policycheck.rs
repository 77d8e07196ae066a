// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use policygate::unstable::{Lexer, Source, TokenKind};
use policygate::{Document, Engine};

fn policy_eval(
    policies: &[String],
    builtins: bool,
    scope: &str,
    inputs: &[String],
    kind: Option<String>,
    strict_kinds: bool,
    trace: bool,
) -> Result<()> {
    let mut engine = if builtins {
        Engine::with_builtin_policies()?
    } else {
        Engine::new()
    };
    engine.set_enable_tracing(trace);
    engine.set_strict_kinds(strict_kinds);

    for file in policies {
        engine.add_policy_from_file(file)?;
    }
    if engine.rule_set(scope).is_none() {
        bail!(
            "scope `{scope}` is not loaded. Loaded scopes: {}",
            engine.scopes().join(", ")
        );
    }

    // Read every input document.
    let mut documents = vec![];
    for file in inputs {
        let mut document = Document::from_file(file)?;
        if let Some(kind) = &kind {
            document = document.with_kind(kind);
        }
        documents.push(document);
    }

    let decisions = engine.evaluate_batch(scope, &documents)?;
    for (file, decision) in inputs.iter().zip(&decisions) {
        println!("{file}:\n{}", serde_json::to_string_pretty(decision)?);
    }

    if decisions.iter().any(|d| !d.allow) {
        bail!("one or more documents were denied");
    }
    Ok(())
}

fn policy_lex(file: String, verbose: bool) -> Result<()> {
    let source = Source::from_file(file)?;
    let mut lexer = Lexer::new(&source);

    // Read tokens until EOF.
    loop {
        let token = lexer.next_token()?;
        if token.0 == TokenKind::Eof {
            break;
        }

        if verbose {
            // Print each token's line and mark with with ^.
            println!("{}", token.1.message("", ""));
        }

        println!("{token:?}");
    }
    Ok(())
}

fn policy_parse(file: String) -> Result<()> {
    let source = Source::from_file(file)?;
    let mut parser = policygate::unstable::Parser::new(&source)?;
    let rule_set = parser.parse()?;
    println!("{rule_set:#?}");
    Ok(())
}

#[derive(Subcommand)]
enum PolicyCommand {
    /// Evaluate documents against a rule set.
    Eval {
        /// Policy files to load.
        #[arg(long, short, value_name = "rules.policy")]
        policy: Vec<String>,

        /// Load the bundled rule sets.
        #[arg(long, short)]
        builtins: bool,

        /// Rule set to evaluate, e.g. kubernetes.security.
        #[arg(long, short)]
        scope: String,

        /// Documents to evaluate. json or yaml.
        #[arg(required(true), value_name = "input.json|input.yaml")]
        inputs: Vec<String>,

        /// Document kind to assume, overriding the `kind` field.
        #[arg(long, short)]
        kind: Option<String>,

        /// Skip documents without a kind.
        #[arg(long)]
        strict_kinds: bool,

        /// Log per-rule outcomes. Set RUST_LOG=info to see them.
        #[arg(long, short)]
        trace: bool,
    },

    /// Tokenize a policy file.
    Lex {
        /// Policy file.
        file: String,

        /// Verbose output.
        #[arg(long, short)]
        verbose: bool,
    },

    /// Parse a policy file.
    Parse {
        /// Policy file.
        file: String,
    },
}

#[derive(clap::Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: PolicyCommand,
}

fn main() -> Result<()> {
    env_logger::init();

    // Parse and dispatch command.
    let cli = Cli::parse();
    match cli.command {
        PolicyCommand::Eval {
            policy,
            builtins,
            scope,
            inputs,
            kind,
            strict_kinds,
            trace,
        } => policy_eval(
            &policy,
            builtins,
            &scope,
            &inputs,
            kind,
            strict_kinds,
            trace,
        ),
        PolicyCommand::Lex { file, verbose } => policy_lex(file, verbose),
        PolicyCommand::Parse { file } => policy_parse(file),
    }
}
