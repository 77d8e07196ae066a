// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Violation messages with `{path}` placeholders.
//!
//! `{{` and `}}` stand for literal braces. Placeholders are paths rooted at a
//! bound variable or at `input`; string values are inserted as-is and other
//! values in their json form.

use crate::path::Path;
use crate::value::Value;

use core::fmt;

use anyhow::{bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Hole(Path),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    pieces: Vec<Piece>,
}

impl MessageTemplate {
    /// Compile a template. Errors name the byte offset of the problem.
    pub fn parse(text: &str) -> Result<Self> {
        let mut pieces = vec![];
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            match ch {
                '{' if chars.peek().map(|c| c.1) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|c| c.1) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => bail!("unmatched `}}` at offset {offset} in message"),
                '{' => {
                    let start = offset + 1;
                    let end = loop {
                        match chars.next() {
                            Some((end, '}')) => break end,
                            Some((_, '{')) | None => {
                                bail!("unclosed `{{` at offset {offset} in message")
                            }
                            Some(_) => (),
                        }
                    };
                    let inner = text[start..end].trim();
                    let Some(path) = Path::parse(inner) else {
                        bail!("invalid path `{inner}` at offset {offset} in message");
                    };
                    if !literal.is_empty() {
                        pieces.push(Piece::Text(core::mem::take(&mut literal)));
                    }
                    pieces.push(Piece::Hole(path));
                }
                _ => literal.push(ch),
            }
        }
        if !literal.is_empty() {
            pieces.push(Piece::Text(literal));
        }
        Ok(Self { pieces })
    }

    /// Variables referenced by placeholders, in order of first use.
    pub fn variables(&self) -> Vec<&str> {
        let mut vars: Vec<&str> = vec![];
        for piece in &self.pieces {
            if let Piece::Hole(path) = piece {
                if let Some(var) = path.var_name() {
                    if !vars.contains(&var) {
                        vars.push(var);
                    }
                }
            }
        }
        vars
    }

    /// Fill in placeholders using `lookup`.
    pub fn render<'a, F>(&self, lookup: F) -> String
    where
        F: Fn(&Path) -> &'a Value,
    {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(t) => out.push_str(t),
                Piece::Hole(path) => out.push_str(&lookup(path).to_message_text()),
            }
        }
        out
    }
}

impl fmt::Display for MessageTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for piece in &self.pieces {
            match piece {
                Piece::Text(t) => f.write_str(&t.replace('{', "{{").replace('}', "}}"))?,
                Piece::Hole(path) => write!(f, "{{{path}}}")?,
            }
        }
        Ok(())
    }
}
