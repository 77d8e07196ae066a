// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::{Error, Result};
use crate::path::Path;
use crate::template::MessageTemplate;
use crate::value::Value;

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

/// Which decision set a rule contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Deny,
    Warn,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Deny => "deny",
            Category::Warn => "warn",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        })
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "low" => Severity::Low,
            "medium" => Severity::Medium,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => anyhow::bail!(
                "unknown severity `{s}`, expecting one of low, medium, high, critical"
            ),
        })
    }
}

/// Document kinds a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KindFilter {
    #[default]
    Any,
    Only(BTreeSet<Arc<str>>),
}

impl KindFilter {
    pub fn only<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        KindFilter::Only(kinds.into_iter().map(|k| Arc::from(k.as_ref())).collect())
    }

    /// Whether a document of the given kind is in scope.
    ///
    /// With `strict` set, an unfiltered rule still requires the document to
    /// declare some kind.
    pub fn matches(&self, kind: Option<&str>, strict: bool) -> bool {
        match (self, kind) {
            (KindFilter::Any, None) => !strict,
            (KindFilter::Any, Some(_)) => true,
            (KindFilter::Only(_), None) => false,
            (KindFilter::Only(kinds), Some(kind)) => kinds.contains(kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Path(Path),
    Literal(Value),
}

impl Operand {
    pub fn path(text: &str) -> Option<Self> {
        Path::parse(text).map(Operand::Path)
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Operand::Literal(value.into())
    }

    fn variables(&self) -> Option<&str> {
        match self {
            Operand::Path(p) => p.var_name(),
            Operand::Literal(_) => None,
        }
    }
}

impl From<Path> for Operand {
    fn from(path: Path) -> Self {
        Operand::Path(path)
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Literal(value)
    }
}

/// Boolean condition over a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Exists(Path),
    Equals(Operand, Operand),
    NotEquals(Operand, Operand),
    Compare(Operand, CompareOp, Operand),
    /// Substring for strings, membership for arrays.
    Contains(Operand, Operand),
    StartsWith(Operand, Operand),
    HasSuffix(Operand, Operand),
    /// The right operand is a literal list or a path to an array.
    In(Operand, Operand),
    /// True when some element of `collection` satisfies `body` with the
    /// element bound to `var`. The collection is a path to an array or a
    /// literal list.
    ///
    /// An `exported` quantifier yields one binding per satisfying element and
    /// its variable is visible to the rule's message. Any other quantifier
    /// only filters.
    ForAny {
        var: Arc<str>,
        collection: Operand,
        body: Box<Predicate>,
        exported: bool,
    },
    Not(Box<Predicate>),
    And(Vec<Predicate>),
}

impl Predicate {
    /// An `any` block: filters, binds nothing outside `body`.
    pub fn for_any(var: &str, collection: impl Into<Operand>, body: Predicate) -> Self {
        Predicate::ForAny {
            var: var.into(),
            collection: collection.into(),
            body: Box::new(body),
            exported: false,
        }
    }

    /// A `some` statement: `var` is bound once per satisfying element.
    pub fn some(var: &str, collection: impl Into<Operand>, body: Predicate) -> Self {
        Predicate::ForAny {
            var: var.into(),
            collection: collection.into(),
            body: Box::new(body),
            exported: true,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(predicate: Predicate) -> Self {
        Predicate::Not(Box::new(predicate))
    }

    /// Variables referenced by the predicate that it does not bind itself.
    pub fn free_variables(&self) -> BTreeSet<Arc<str>> {
        let mut free = BTreeSet::new();
        self.collect_free(&mut vec![], &mut free);
        free
    }

    fn collect_free(&self, bound: &mut Vec<Arc<str>>, free: &mut BTreeSet<Arc<str>>) {
        match self {
            Predicate::Exists(p) => note_free(p.var_name(), bound, free),
            Predicate::Equals(a, b)
            | Predicate::NotEquals(a, b)
            | Predicate::Compare(a, _, b)
            | Predicate::Contains(a, b)
            | Predicate::StartsWith(a, b)
            | Predicate::HasSuffix(a, b)
            | Predicate::In(a, b) => {
                note_free(a.variables(), bound, free);
                note_free(b.variables(), bound, free);
            }
            Predicate::ForAny {
                var,
                collection,
                body,
                ..
            } => {
                note_free(collection.variables(), bound, free);
                bound.push(var.clone());
                body.collect_free(bound, free);
                bound.pop();
            }
            Predicate::Not(p) => p.collect_free(bound, free),
            Predicate::And(ps) => ps.iter().for_each(|p| p.collect_free(bound, free)),
        }
    }
}

fn note_free(name: Option<&str>, bound: &[Arc<str>], free: &mut BTreeSet<Arc<str>>) {
    if let Some(name) = name {
        if !bound.iter().any(|b| b.as_ref() == name) {
            free.insert(Arc::from(name));
        }
    }
}

/// Where a rule was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Arc<str>,
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub id: Arc<str>,
    pub category: Category,
    pub severity: Option<Severity>,
    pub applies_to: KindFilter,
    pub body: Predicate,
    pub message: MessageTemplate,
    pub location: Option<Location>,
}

impl Rule {
    /// Build a rule in code. The body may not refer to unbound variables and
    /// the message may only refer to variables the body exports.
    pub fn new(id: &str, category: Category, body: Predicate, message: &str) -> Result<Self> {
        let load_err = |e: anyhow::Error| Error::policy_load(id, e);
        if id.is_empty() {
            return Err(load_err(anyhow::anyhow!("rule id cannot be empty")));
        }
        if let Some(var) = body.free_variables().into_iter().next() {
            return Err(load_err(anyhow::anyhow!(
                "variable `{var}` is used before it is bound"
            )));
        }
        let message = MessageTemplate::parse(message).map_err(load_err)?;
        let exported = exported_variables(&body);
        for var in message.variables() {
            if !exported.iter().any(|v| v.as_ref() == var) {
                return Err(load_err(anyhow::anyhow!(
                    "message refers to unbound variable `{var}`"
                )));
            }
        }
        Ok(Self {
            id: id.into(),
            category,
            severity: None,
            applies_to: KindFilter::Any,
            body,
            message,
            location: None,
        })
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    #[must_use]
    pub fn on_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.applies_to = KindFilter::only(kinds);
        self
    }
}

/// Variables visible to a rule's message: the quantifiers that close each
/// conjunction of the body, which is how `some` statements nest.
pub(crate) fn exported_variables(body: &Predicate) -> Vec<Arc<str>> {
    let mut vars = vec![];
    let mut current = body;
    loop {
        match current {
            Predicate::ForAny {
                var,
                body,
                exported: true,
                ..
            } => {
                vars.push(var.clone());
                current = body;
            }
            Predicate::And(ps) => match ps.last() {
                Some(last) => current = last,
                None => break,
            },
            _ => break,
        }
    }
    vars
}

/// Rules sharing a scope name, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    scope: Arc<str>,
    rules: Vec<Arc<Rule>>,
}

impl RuleSet {
    pub fn new(scope: &str, rules: Vec<Rule>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.clone()) {
                return Err(Error::policy_load(
                    scope,
                    anyhow::anyhow!("duplicate rule id `{}`", rule.id),
                ));
            }
        }
        Ok(Self::from_parts(scope.into(), rules))
    }

    pub(crate) fn from_parts(scope: Arc<str>, rules: Vec<Rule>) -> Self {
        Self {
            scope,
            rules: rules.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id.as_ref() == id).map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
