// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{CompareOp, Operand, Predicate};
use crate::document::Document;
use crate::path::{resolve, Path, PathRoot};
use crate::value::Value;

use core::cmp::Ordering;
use std::sync::Arc;

/// Values visible while evaluating a predicate: the document root plus the
/// variables bound by enclosing quantifiers.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    root: &'a Value,
    vars: Vec<(Arc<str>, &'a Value)>,
}

impl<'a> Scope<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root, vars: vec![] }
    }

    /// A copy of this scope with one more variable bound.
    pub fn bind(&self, var: &Arc<str>, value: &'a Value) -> Self {
        let mut scope = self.clone();
        scope.vars.push((var.clone(), value));
        scope
    }

    pub fn lookup(&self, path: &Path) -> &'a Value {
        let base = match &path.root {
            PathRoot::Input => self.root,
            PathRoot::Var(name) => match self.vars.iter().rev().find(|(v, _)| v == name) {
                Some((_, value)) => *value,
                None => return &Value::Undefined,
            },
        };
        resolve(base, &path.segments)
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &'a Value)> + '_ {
        self.vars.iter().map(|(k, v)| (k.as_ref(), *v))
    }

    fn operand(&self, operand: &'a Operand) -> &'a Value {
        match operand {
            Operand::Path(p) => self.lookup(p),
            Operand::Literal(v) => v,
        }
    }
}

/// Evaluate `predicate` against the document.
pub fn eval_predicate(document: &Document, predicate: &Predicate) -> bool {
    eval(&mut Scope::new(document.root()), predicate)
}

pub(crate) fn eval<'a>(scope: &mut Scope<'a>, predicate: &'a Predicate) -> bool {
    match predicate {
        Predicate::Exists(path) => !scope.lookup(path).is_undefined(),
        Predicate::Equals(a, b) => equals(scope.operand(a), scope.operand(b)),
        Predicate::NotEquals(a, b) => not_equals(scope.operand(a), scope.operand(b)),
        Predicate::Compare(a, op, b) => compare(scope.operand(a), *op, scope.operand(b)),
        Predicate::Contains(a, b) => contains(scope.operand(a), scope.operand(b)),
        Predicate::StartsWith(a, b) => match (scope.operand(a), scope.operand(b)) {
            (Value::String(s), Value::String(prefix)) => s.starts_with(prefix.as_ref()),
            _ => false,
        },
        Predicate::HasSuffix(a, b) => match (scope.operand(a), scope.operand(b)) {
            (Value::String(s), Value::String(suffix)) => s.ends_with(suffix.as_ref()),
            _ => false,
        },
        Predicate::In(a, set) => member_of(scope.operand(a), scope.operand(set)),
        Predicate::ForAny {
            var,
            collection,
            body,
            ..
        } => {
            let Value::Array(items) = scope.operand(collection) else {
                return false;
            };
            for item in items.iter() {
                scope.vars.push((var.clone(), item));
                let satisfied = eval(scope, body);
                scope.vars.pop();
                if satisfied {
                    return true;
                }
            }
            false
        }
        Predicate::Not(p) => !eval(scope, p),
        Predicate::And(ps) => ps.iter().all(|p| eval(scope, p)),
    }
}

/// Every assignment of quantified variables under which `predicate` holds,
/// in document order.
///
/// Exported quantifiers reached through conjunctions multiply the scopes.
/// `any` blocks and anything under `Not` only filter them.
pub(crate) fn bindings<'a>(scope: &Scope<'a>, predicate: &'a Predicate) -> Vec<Scope<'a>> {
    match predicate {
        Predicate::And(ps) => {
            let mut scopes = vec![scope.clone()];
            for p in ps {
                scopes = scopes.iter().flat_map(|s| bindings(s, p)).collect();
                if scopes.is_empty() {
                    break;
                }
            }
            scopes
        }
        Predicate::ForAny {
            var,
            collection,
            body,
            exported: true,
        } => match scope.operand(collection) {
            Value::Array(items) => items
                .iter()
                .flat_map(|item| bindings(&scope.bind(var, item), body))
                .collect(),
            _ => vec![],
        },
        _ => {
            let mut filtered = scope.clone();
            if eval(&mut filtered, predicate) {
                vec![filtered]
            } else {
                vec![]
            }
        }
    }
}

fn equals(a: &Value, b: &Value) -> bool {
    !a.is_undefined() && !b.is_undefined() && a == b
}

fn not_equals(a: &Value, b: &Value) -> bool {
    if a.is_undefined() || b.is_undefined() {
        return false;
    }
    a.type_name() == b.type_name() && a != b
}

fn compare(a: &Value, op: CompareOp, b: &Value) -> bool {
    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => return false,
    };
    match op {
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (_, Value::Undefined) => false,
        (Value::String(s), Value::String(n)) => s.contains(n.as_ref()),
        (Value::Array(items), _) => items.iter().any(|item| item == needle),
        _ => false,
    }
}

fn member_of(value: &Value, set: &Value) -> bool {
    match set {
        Value::Array(items) if !value.is_undefined() => items.iter().any(|item| item == value),
        _ => false,
    }
}
