// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::{Error, Result};
use crate::path::{resolve, Path, PathRoot};
use crate::value::Value;

use std::sync::Arc;

/// One structured input evaluated against a rule set.
///
/// The declared kind is read from the top-level `kind` field (as in
/// Kubernetes manifests) and can be overridden for documents, such as
/// terraform plans, that do not carry one.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    kind: Option<Arc<str>>,
    root: Value,
}

impl Document {
    /// Wrap an already-parsed value. The top level must be an object.
    pub fn from_value(root: Value) -> Result<Self> {
        Self::from_value_with_origin("<value>", root)
    }

    fn from_value_with_origin(origin: &str, root: Value) -> Result<Self> {
        if !matches!(root, Value::Object(_)) {
            return Err(Error::document_load(
                origin,
                format!("top level must be an object, found {}", root.type_name()),
            ));
        }
        let kind = match &root["kind"] {
            Value::String(kind) => Some(kind.clone()),
            _ => None,
        };
        Ok(Self { kind, root })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let root = Value::from_json_str(json)
            .map_err(|e| Error::document_load("<json>", e.to_string()))?;
        Self::from_value_with_origin("<json>", root)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let root = Value::from_yaml_str(yaml)
            .map_err(|e| Error::document_load("<yaml>", e.to_string()))?;
        Self::from_value_with_origin("<yaml>", root)
    }

    /// Read a `.json`, `.yaml` or `.yml` file.
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: origin.clone(),
            source,
        })?;

        let root = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Value::from_json_str(&contents),
            #[cfg(feature = "yaml")]
            Some("yaml" | "yml") => Value::from_yaml_str(&contents),
            _ => {
                return Err(Error::document_load(
                    &origin,
                    "unsupported document format, expecting json or yaml",
                ))
            }
        }
        .map_err(|e| Error::document_load(&origin, e.to_string()))?;

        Self::from_value_with_origin(&origin, root)
    }

    /// Override the declared kind.
    #[must_use]
    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Resolve an `input`-rooted path. Variable-rooted paths resolve to
    /// undefined since nothing is bound outside of an evaluation.
    pub fn resolve(&self, path: &Path) -> &Value {
        match path.root {
            PathRoot::Input => resolve(&self.root, &path.segments),
            PathRoot::Var(_) => &Value::Undefined,
        }
    }

    /// Resolve a textual path such as `input.metadata.name`.
    pub fn get(&self, path: &str) -> &Value {
        match Path::parse(path) {
            Some(path) => self.resolve(&path),
            None => &Value::Undefined,
        }
    }
}
