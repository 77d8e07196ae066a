// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// Errors surfaced by the public API.
///
/// Loading problems are the only errors; evaluating a loaded rule set against
/// a loaded document always produces a decision.
#[derive(Debug, Error)]
pub enum Error {
    /// A rule set source could not be compiled.
    #[error("failed to load policy `{origin}`: {message}")]
    PolicyLoad { origin: String, message: String },

    /// An input document is not valid structured data.
    #[error("failed to load document `{origin}`: {message}")]
    DocumentLoad { origin: String, message: String },

    /// No rule set with the given scope is loaded.
    #[error("no rule set named `{0}` is loaded")]
    UnknownRuleSet(String),

    /// A policy or document file could not be read.
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn policy_load(origin: &str, err: anyhow::Error) -> Self {
        Error::PolicyLoad {
            origin: origin.to_owned(),
            message: err.to_string(),
        }
    }

    pub(crate) fn document_load(origin: &str, message: impl Into<String>) -> Self {
        Error::DocumentLoad {
            origin: origin.to_owned(),
            message: message.into(),
        }
    }

    /// True for errors caused by policy configuration rather than input.
    pub fn is_policy_error(&self) -> bool {
        matches!(self, Error::PolicyLoad { .. } | Error::UnknownRuleSet(_))
    }
}

pub type Result<T> = core::result::Result<T, Error>;
