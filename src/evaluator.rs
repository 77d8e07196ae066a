// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{Category, Rule, RuleSet};
use crate::decision::EvaluationResult;
use crate::document::Document;
use crate::interpreter::{bindings, Scope};

use std::sync::Arc;

use indexmap::IndexSet;
use log::{debug, log_enabled, trace, Level};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOutcome {
    /// The rule does not apply to the document's kind.
    Skipped,
    Passed,
    /// Number of distinct messages the rule rendered.
    Fired(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleTrace {
    pub rule: Arc<str>,
    pub category: Category,
    pub outcome: RuleOutcome,
}

/// Run every applicable rule of `rule_set` against `document`.
pub fn evaluate(document: &Document, rule_set: &RuleSet) -> EvaluationResult {
    evaluate_rules(document, rule_set, false, None)
}

/// Like [`evaluate`], also reporting what happened to each rule.
pub fn evaluate_with_trace(
    document: &Document,
    rule_set: &RuleSet,
) -> (EvaluationResult, Vec<RuleTrace>) {
    let mut traces = vec![];
    let result = evaluate_rules(document, rule_set, false, Some(&mut traces));
    (result, traces)
}

pub(crate) fn evaluate_rules(
    document: &Document,
    rule_set: &RuleSet,
    strict_kinds: bool,
    mut traces: Option<&mut Vec<RuleTrace>>,
) -> EvaluationResult {
    let mut result = EvaluationResult::new();
    for rule in rule_set.rules() {
        let outcome = if rule.applies_to.matches(document.kind(), strict_kinds) {
            evaluate_rule(document, rule, &mut result)
        } else {
            RuleOutcome::Skipped
        };
        debug!(
            "{}/{} ({}): {:?}",
            rule_set.scope(),
            rule.id,
            rule.category,
            outcome
        );
        if let Some(traces) = traces.as_mut() {
            traces.push(RuleTrace {
                rule: rule.id.clone(),
                category: rule.category,
                outcome,
            });
        }
    }
    result
}

fn evaluate_rule(document: &Document, rule: &Rule, result: &mut EvaluationResult) -> RuleOutcome {
    let scopes = bindings(&Scope::new(document.root()), &rule.body);

    let mut rendered: IndexSet<String> = IndexSet::new();
    for scope in &scopes {
        let message = rule.message.render(|path| scope.lookup(path));
        if log_enabled!(Level::Trace) {
            let vars: Vec<String> = scope.vars().map(|(k, v)| format!("{k}={v}")).collect();
            trace!("{} [{}] => {message}", rule.id, vars.join(", "));
        }
        rendered.insert(message);
    }

    let fired = rendered.len();
    for message in rendered {
        result.insert(rule, message);
    }
    match fired {
        0 => RuleOutcome::Passed,
        n => RuleOutcome::Fired(n),
    }
}
