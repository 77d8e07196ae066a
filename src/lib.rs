// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]
#![forbid(unsafe_code)]

mod ast;
pub mod builtins;
mod decision;
mod document;
mod engine;
mod error;
mod evaluator;
mod interpreter;
mod lexer;
mod number;
mod parser;
mod path;
mod template;
mod value;

pub use ast::{
    Category, CompareOp, KindFilter, Location, Operand, Predicate, Rule, RuleSet, Severity,
};
pub use decision::{decide, Decision, EvaluationResult, Violation};
pub use document::Document;
pub use engine::{Engine, PolicySnapshot};
pub use error::{Error, Result};
pub use evaluator::{evaluate, evaluate_with_trace, RuleOutcome, RuleTrace};
pub use interpreter::eval_predicate;
pub use number::Number;
pub use parser::compile_policy;
pub use path::{resolve, Path, PathRoot, Segment};
pub use template::MessageTemplate;
pub use value::Value;

/// Items in `unstable` are likely to change.
pub mod unstable {
    pub use crate::lexer::*;
    pub use crate::parser::*;
}

#[cfg(test)]
mod tests;
