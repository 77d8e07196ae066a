// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{Category, Rule, Severity};

use std::sync::Arc;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// One distinct violation message and the rule that produced it first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub rule: Arc<str>,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub message: String,
}

/// Messages collected by evaluating a rule set against one document.
///
/// Both sets are deduplicated by message text and keep first-insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationResult {
    pub deny: IndexSet<String>,
    pub warn: IndexSet<String>,
    pub violations: Vec<Violation>,
}

impl EvaluationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message produced by `rule`. Returns false if the same text
    /// was already present in that rule's category.
    pub fn insert(&mut self, rule: &Rule, message: String) -> bool {
        let set = match rule.category {
            Category::Deny => &mut self.deny,
            Category::Warn => &mut self.warn,
        };
        if set.contains(&message) {
            return false;
        }
        set.insert(message.clone());
        self.violations.push(Violation {
            rule: rule.id.clone(),
            category: rule.category,
            severity: rule.severity,
            message,
        });
        true
    }

    pub fn is_empty(&self) -> bool {
        self.deny.is_empty() && self.warn.is_empty()
    }
}

/// Final verdict for a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allow: bool,
    pub deny: Vec<String>,
    pub warn: Vec<String>,
}

/// Allow exactly when nothing was denied. Warnings are advisory.
pub fn decide(result: &EvaluationResult) -> Decision {
    Decision {
        allow: result.deny.is_empty(),
        deny: result.deny.iter().cloned().collect(),
        warn: result.warn.iter().cloned().collect(),
    }
}

impl From<EvaluationResult> for Decision {
    fn from(result: EvaluationResult) -> Self {
        Decision {
            allow: result.deny.is_empty(),
            deny: result.deny.into_iter().collect(),
            warn: result.warn.into_iter().collect(),
        }
    }
}
