// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Rule sets shipped with the crate.

use crate::ast::RuleSet;
use crate::error::Result;
use crate::parser::compile_policy;

/// Bundled policy sources as `(path, text)` pairs.
pub const POLICIES: &[(&str, &str)] = &[
    (
        "policies/kubernetes/security.policy",
        include_str!("../policies/kubernetes/security.policy"),
    ),
    (
        "policies/kubernetes/bestpractices.policy",
        include_str!("../policies/kubernetes/bestpractices.policy"),
    ),
    (
        "policies/terraform/security.policy",
        include_str!("../policies/terraform/security.policy"),
    ),
    (
        "policies/terraform/cost.policy",
        include_str!("../policies/terraform/cost.policy"),
    ),
    (
        "policies/vulnerability/scan.policy",
        include_str!("../policies/vulnerability/scan.policy"),
    ),
];

/// Compile every bundled policy.
pub fn rule_sets() -> Result<Vec<RuleSet>> {
    POLICIES
        .iter()
        .map(|(path, text)| compile_policy(path, text))
        .collect()
}
