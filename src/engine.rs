// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::RuleSet;
use crate::decision::{Decision, EvaluationResult};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::evaluator::{evaluate_rules, RuleTrace};
use crate::parser::compile_policy;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use log::info;
use parking_lot::RwLock;

/// An immutable set of compiled rule sets, keyed by scope.
#[derive(Debug, Default)]
pub struct PolicySnapshot {
    rule_sets: BTreeMap<Arc<str>, Arc<RuleSet>>,
    generation: u64,
}

impl PolicySnapshot {
    pub fn rule_set(&self, scope: &str) -> Option<&Arc<RuleSet>> {
        self.rule_sets.get(scope)
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.rule_sets.keys().map(|k| k.as_ref())
    }

    /// Number of swaps that led to this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.rule_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rule_sets.is_empty()
    }
}

/// The policy evaluation engine.
///
/// Loaded rule sets live in a snapshot that is replaced as a whole whenever
/// policies are added or reloaded. Evaluations hold on to the snapshot they
/// started with, so a reload never affects a running evaluation and a failed
/// reload leaves the previous policies in place.
pub struct Engine {
    snapshot: RwLock<Arc<PolicySnapshot>>,
    enable_tracing: bool,
    strict_kinds: bool,
}

/// Create an engine with no policies loaded.
impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Engine {
    fn clone(&self) -> Self {
        Self {
            snapshot: RwLock::new(self.snapshot()),
            enable_tracing: self.enable_tracing,
            strict_kinds: self.strict_kinds,
        }
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(PolicySnapshot::default())),
            enable_tracing: false,
            strict_kinds: false,
        }
    }

    /// Create an engine preloaded with the bundled rule sets.
    pub fn with_builtin_policies() -> Result<Self> {
        let engine = Self::new();
        engine.reload(
            crate::builtins::POLICIES
                .iter()
                .map(|(path, text)| (path.to_string(), text.to_string())),
        )?;
        Ok(engine)
    }

    /// Log a per-rule trace at info level for every evaluation.
    pub fn set_enable_tracing(&mut self, enable: bool) {
        self.enable_tracing = enable;
    }

    /// Make rules without a kind filter skip documents that declare no kind.
    pub fn set_strict_kinds(&mut self, strict: bool) {
        self.strict_kinds = strict;
    }

    /// Compile a policy and add its rule set, replacing any rule set with the
    /// same scope. Returns the scope name.
    pub fn add_policy(&self, path: String, policy: String) -> Result<String> {
        let rule_set = compile_policy(&path, &policy)?;
        let scope = rule_set.scope().to_string();
        self.install(&path, vec![rule_set], false);
        Ok(scope)
    }

    pub fn add_policy_from_file<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let path = path.as_ref();
        let policy = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.add_policy(path.display().to_string(), policy)
    }

    /// Replace all loaded rule sets with those compiled from `sources`.
    ///
    /// Every source is compiled before anything is swapped; on error the
    /// current snapshot stays in effect.
    pub fn reload<I>(&self, sources: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut rule_sets: Vec<RuleSet> = vec![];
        for (path, policy) in sources {
            let rule_set = compile_policy(&path, &policy)?;
            if rule_sets.iter().any(|r| r.scope() == rule_set.scope()) {
                return Err(Error::PolicyLoad {
                    origin: path,
                    message: format!("scope `{}` is defined more than once", rule_set.scope()),
                });
            }
            rule_sets.push(rule_set);
        }
        self.install("reload", rule_sets, true);
        Ok(())
    }

    fn install(&self, origin: &str, rule_sets: Vec<RuleSet>, replace_all: bool) {
        let mut current = self.snapshot.write();
        let mut map = match replace_all {
            true => BTreeMap::new(),
            false => current.rule_sets.clone(),
        };
        for rule_set in rule_sets {
            info!(
                "loaded `{}` from {origin} ({} rules)",
                rule_set.scope(),
                rule_set.len()
            );
            map.insert(rule_set.scope().into(), Arc::new(rule_set));
        }
        let generation = current.generation + 1;
        *current = Arc::new(PolicySnapshot {
            rule_sets: map,
            generation,
        });
        info!("policy snapshot {generation} in effect");
    }

    /// The current snapshot. Later loads do not affect it.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.snapshot.read().clone()
    }

    pub fn rule_set(&self, scope: &str) -> Option<Arc<RuleSet>> {
        self.snapshot().rule_set(scope).cloned()
    }

    pub fn scopes(&self) -> Vec<String> {
        self.snapshot().scopes().map(str::to_string).collect()
    }

    fn lookup(&self, scope: &str) -> Result<Arc<RuleSet>> {
        self.rule_set(scope)
            .ok_or_else(|| Error::UnknownRuleSet(scope.to_string()))
    }

    fn run(&self, rule_set: &RuleSet, document: &Document) -> EvaluationResult {
        if !self.enable_tracing {
            return evaluate_rules(document, rule_set, self.strict_kinds, None);
        }
        let mut traces = vec![];
        let result = evaluate_rules(document, rule_set, self.strict_kinds, Some(&mut traces));
        for t in &traces {
            info!("{}/{}: {:?}", rule_set.scope(), t.rule, t.outcome);
        }
        result
    }

    pub fn evaluate_result(&self, scope: &str, document: &Document) -> Result<EvaluationResult> {
        let rule_set = self.lookup(scope)?;
        Ok(self.run(&rule_set, document))
    }

    pub fn evaluate(&self, scope: &str, document: &Document) -> Result<Decision> {
        Ok(Decision::from(self.evaluate_result(scope, document)?))
    }

    pub fn evaluate_with_trace(
        &self,
        scope: &str,
        document: &Document,
    ) -> Result<(EvaluationResult, Vec<RuleTrace>)> {
        let rule_set = self.lookup(scope)?;
        let mut traces = vec![];
        let result = evaluate_rules(document, &rule_set, self.strict_kinds, Some(&mut traces));
        Ok((result, traces))
    }

    /// Evaluate many documents against one rule set. Decisions are returned
    /// in the order of `documents`.
    pub fn evaluate_batch(&self, scope: &str, documents: &[Document]) -> Result<Vec<Decision>> {
        let rule_set = self.lookup(scope)?;

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            Ok(documents
                .par_iter()
                .map(|d| Decision::from(self.run(&rule_set, d)))
                .collect())
        }

        #[cfg(not(feature = "parallel"))]
        {
            Ok(documents
                .iter()
                .map(|d| Decision::from(self.run(&rule_set, d)))
                .collect())
        }
    }
}
