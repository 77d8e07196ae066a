// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Field paths and their resolution against documents.
//!
//! Resolution is total: a missing key, a key applied to a non-object, an
//! index applied to a non-array and an out-of-range index all produce
//! [`Value::Undefined`]. Rules routinely probe optional sections, so a
//! missing field must read as "not there" rather than as an error.

use crate::value::Value;

use core::fmt;
use std::sync::Arc;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Segment {
    Key(Arc<str>),
    Index(usize),
}

/// Where a path starts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathRoot {
    /// The document being evaluated.
    Input,
    /// A variable bound by a quantifier.
    Var(Arc<str>),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Path {
    pub root: PathRoot,
    pub segments: Vec<Segment>,
}

impl Path {
    pub fn input<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
    {
        Self {
            root: PathRoot::Input,
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn var<I, S>(name: &str, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
    {
        Self {
            root: PathRoot::Var(name.into()),
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a dotted path such as `spec.containers[0].name`.
    ///
    /// The first component names the root: `input` or a variable.
    /// Returns `None` for malformed text.
    pub fn parse(text: &str) -> Option<Self> {
        let mut chars = text.char_indices().peekable();
        let mut components: Vec<Segment> = vec![];
        let mut root: Option<PathRoot> = None;

        loop {
            let start = chars.peek()?.0;
            let mut end = text.len();
            while let Some(&(i, c)) = chars.peek() {
                if c == '.' || c == '[' {
                    end = i;
                    break;
                }
                chars.next();
            }
            let name = &text[start..end];
            if !is_ident(name) {
                return None;
            }
            match root {
                None if name == "input" => root = Some(PathRoot::Input),
                None => root = Some(PathRoot::Var(name.into())),
                Some(_) => components.push(Segment::Key(name.into())),
            }

            // Any number of bracketed indices may follow a name.
            while let Some(&(i, '[')) = chars.peek() {
                chars.next();
                let close = text[i..].find(']')? + i;
                let inner = &text[i + 1..close];
                components.push(match inner.strip_prefix('"') {
                    Some(rest) => Segment::Key(rest.strip_suffix('"')?.into()),
                    None => Segment::Index(inner.parse().ok()?),
                });
                while chars.peek().is_some_and(|&(j, _)| j <= close) {
                    chars.next();
                }
            }

            match chars.next() {
                None => break,
                Some((_, '.')) => continue,
                _ => return None,
            }
        }

        Some(Self {
            root: root?,
            segments: components,
        })
    }

    /// Name of the variable the path starts from, if any.
    pub fn var_name(&self) -> Option<&str> {
        match &self.root {
            PathRoot::Var(name) => Some(name),
            PathRoot::Input => None,
        }
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.into())
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            PathRoot::Input => f.write_str("input")?,
            PathRoot::Var(name) => f.write_str(name)?,
        }
        for segment in &self.segments {
            match segment {
                Segment::Key(k) if is_ident(k) => write!(f, ".{k}")?,
                Segment::Key(k) => write!(f, "[{:?}]", k.as_ref())?,
                Segment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

/// Walk `segments` starting at `value`.
pub fn resolve<'a>(value: &'a Value, segments: &[Segment]) -> &'a Value {
    let mut current = value;
    for segment in segments {
        current = match segment {
            Segment::Key(key) => &current[key.as_ref()],
            Segment::Index(index) => &current[*index],
        };
        if current.is_undefined() {
            break;
        }
    }
    current
}
