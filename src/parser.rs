// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;
use crate::error::Error;
use crate::lexer::*;
use crate::number::Number;
use crate::path::{Path, PathRoot, Segment};
use crate::template::MessageTemplate;
use crate::value::Value;

use core::str::FromStr;
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};

enum Stmt {
    Cond(Predicate),
    Some(Arc<str>, Operand),
}

#[derive(Clone)]
pub struct Parser<'source> {
    source: Source,
    lexer: Lexer<'source>,
    tok: Token,
    line: u32,
    end: u32,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source Source) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let tok = lexer.next_token()?;
        Ok(Self {
            source: source.clone(),
            lexer,
            tok,
            line: 0,
            end: 0,
        })
    }

    pub fn token_text(&self) -> &str {
        match self.tok.0 {
            TokenKind::Symbol | TokenKind::Number | TokenKind::Ident | TokenKind::Eof => {
                self.tok.1.text()
            }
            TokenKind::String => "",
        }
    }

    pub fn next_token(&mut self) -> Result<()> {
        self.line = self.tok.1.line;
        self.end = self.tok.1.end;
        self.tok = self.lexer.next_token()?;
        Ok(())
    }

    fn error_here(&self, msg: &str) -> anyhow::Error {
        self.source.error(self.tok.1.line, self.tok.1.col, msg)
    }

    fn expect(&mut self, text: &str, context: &str) -> Result<()> {
        if self.token_text() == text {
            self.next_token()
        } else {
            Err(self.error_here(&format!("expecting `{text}` {context}")))
        }
    }

    fn is_keyword(&self, ident: &str) -> bool {
        matches!(
            ident,
            "any"
                | "contains"
                | "deny"
                | "endswith"
                | "exists"
                | "false"
                | "in"
                | "kinds"
                | "message"
                | "not"
                | "null"
                | "on"
                | "package"
                | "severity"
                | "some"
                | "startswith"
                | "true"
                | "warn"
        )
    }

    fn parse_ident(&mut self) -> Result<Span> {
        let span = self.tok.1.clone();
        match self.tok.0 {
            TokenKind::Ident => {
                self.next_token()?;
                Ok(span)
            }
            _ => Err(self.error_here("expecting identifier")),
        }
    }

    fn parse_var(&mut self) -> Result<Span> {
        let span = self.tok.1.clone();
        match self.tok.0 {
            TokenKind::Ident if self.is_keyword(span.text()) => Err(
                self.error_here(&format!("unexpected keyword `{}`", span.text()))
            ),
            TokenKind::Ident => {
                self.next_token()?;
                Ok(span)
            }
            _ => Err(self.error_here("expecting identifier")),
        }
    }

    fn parse_string(&mut self) -> Result<(Span, String)> {
        let span = self.tok.1.clone();
        if self.tok.0 != TokenKind::String {
            return Err(self.error_here("expecting string"));
        }
        // The lexer already validated escapes against json rules.
        let text: String = serde_json::from_str(&format!("\"{}\"", span.text()))
            .map_err(|e| span.error(&format!("invalid string: {e}")))?;
        self.next_token()?;
        Ok((span, text))
    }

    fn parse_string_list(&mut self) -> Result<Vec<String>> {
        let mut items = vec![self.parse_string()?.1];
        while self.token_text() == "," {
            self.next_token()?;
            items.push(self.parse_string()?.1);
        }
        Ok(items)
    }

    /// Check that `var` can be introduced given the variables in scope.
    fn check_new_binding(&self, var: &Span, scope: &[Arc<str>]) -> Result<()> {
        let name = var.text();
        if name == "input" {
            bail!(var.error("input cannot be shadowed"));
        }
        if scope.iter().any(|v| v.as_ref() == name) {
            bail!(var.error(&format!("variable `{name}` is already bound")));
        }
        Ok(())
    }

    pub fn parse_path(&mut self, scope: &[Arc<str>]) -> Result<Path> {
        let head = self.parse_var()?;
        let root = match head.text() {
            "input" => PathRoot::Input,
            name if scope.iter().any(|v| v.as_ref() == name) => PathRoot::Var(name.into()),
            name => bail!(head.error(&format!("variable `{name}` is used before it is bound"))),
        };

        let mut segments = vec![];
        loop {
            // Accessors must directly follow the previous token.
            if self.tok.1.start != self.end {
                break;
            }
            match self.token_text() {
                "." => {
                    self.next_token()?;
                    let field = self.parse_ident()?;
                    segments.push(Segment::Key(field.text().into()));
                }
                "[" => {
                    self.next_token()?;
                    let span = self.tok.1.clone();
                    match self.tok.0 {
                        TokenKind::String => {
                            let (_, key) = self.parse_string()?;
                            segments.push(Segment::Key(key.into()));
                        }
                        TokenKind::Number => {
                            let Ok(index) = span.text().parse::<usize>() else {
                                bail!(span.error("index must be a non-negative integer"));
                            };
                            self.next_token()?;
                            segments.push(Segment::Index(index));
                        }
                        _ => bail!(span.error("expecting index or quoted key")),
                    }
                    self.expect("]", "after index")?;
                }
                _ => break,
            }
        }
        Ok(Path { root, segments })
    }

    fn parse_literal(&mut self) -> Result<Value> {
        let (kind, span) = (self.tok.0.clone(), self.tok.1.clone());
        match (kind, span.text()) {
            (TokenKind::String, _) => Ok(Value::from(self.parse_string()?.1)),
            (TokenKind::Number, text) => {
                let Ok(n) = Number::from_str(text) else {
                    bail!(span.error("invalid number"));
                };
                self.next_token()?;
                Ok(Value::from(n))
            }
            (TokenKind::Ident, "true") => {
                self.next_token()?;
                Ok(Value::Bool(true))
            }
            (TokenKind::Ident, "false") => {
                self.next_token()?;
                Ok(Value::Bool(false))
            }
            (TokenKind::Ident, "null") => {
                self.next_token()?;
                Ok(Value::Null)
            }
            _ => Err(span.error("expecting literal")),
        }
    }

    fn parse_operand(&mut self, scope: &[Arc<str>]) -> Result<Operand> {
        let (kind, span) = (self.tok.0.clone(), self.tok.1.clone());
        match (kind, span.text()) {
            (TokenKind::Symbol, "[") => {
                self.next_token()?;
                let mut items = vec![];
                if self.token_text() != "]" {
                    items.push(self.parse_literal()?);
                    while self.token_text() == "," {
                        self.next_token()?;
                        items.push(self.parse_literal()?);
                    }
                }
                self.expect("]", "to close list")?;
                Ok(Operand::Literal(Value::from(items)))
            }
            (TokenKind::Ident, "true" | "false" | "null")
            | (TokenKind::String, _)
            | (TokenKind::Number, _) => Ok(Operand::Literal(self.parse_literal()?)),
            (TokenKind::Ident, _) => Ok(Operand::Path(self.parse_path(scope)?)),
            _ => Err(self.error_here("expecting path or literal")),
        }
    }

    // What a quantifier ranges over: a path or a literal list.
    fn parse_collection(&mut self, scope: &[Arc<str>]) -> Result<Operand> {
        let span = self.tok.1.clone();
        match self.parse_operand(scope)? {
            Operand::Literal(v) if !matches!(v, Value::Array(_)) => {
                bail!(span.error("quantifier expects a list or a path"))
            }
            collection => Ok(collection),
        }
    }

    fn parse_comparison(&mut self, scope: &[Arc<str>]) -> Result<Predicate> {
        let lhs = self.parse_operand(scope)?;

        let op = self.tok.1.clone();
        let on_same_line = op.line == self.line;
        let predicate_of: fn(Operand, Operand) -> Predicate = match (self.tok.0.clone(), op.text()) {
            (TokenKind::Symbol, "==") => Predicate::Equals,
            (TokenKind::Symbol, "!=") => Predicate::NotEquals,
            (TokenKind::Symbol, "<") => |a, b| Predicate::Compare(a, CompareOp::Lt, b),
            (TokenKind::Symbol, "<=") => |a, b| Predicate::Compare(a, CompareOp::Le, b),
            (TokenKind::Symbol, ">") => |a, b| Predicate::Compare(a, CompareOp::Gt, b),
            (TokenKind::Symbol, ">=") => |a, b| Predicate::Compare(a, CompareOp::Ge, b),
            (TokenKind::Ident, "contains") => Predicate::Contains,
            (TokenKind::Ident, "startswith") => Predicate::StartsWith,
            (TokenKind::Ident, "endswith") => Predicate::HasSuffix,
            (TokenKind::Ident, "in") => Predicate::In,
            (TokenKind::Symbol | TokenKind::Ident, text)
                if on_same_line && !matches!(text, "}" | ";") =>
            {
                bail!(op.error(&format!("unknown operator `{text}`")))
            }
            _ => bail!(op.error("expecting operator after operand")),
        };
        self.next_token()?;

        let rhs_span = self.tok.1.clone();
        let rhs = self.parse_operand(scope)?;
        if op.text() == "in" {
            if let Operand::Literal(v) = &rhs {
                if !matches!(v, Value::Array(_)) {
                    bail!(rhs_span.error("`in` expects a list or a path"));
                }
            }
        }
        Ok(predicate_of(lhs, rhs))
    }

    fn parse_condition(&mut self, scope: &mut Vec<Arc<str>>) -> Result<Predicate> {
        match self.token_text() {
            "not" => {
                self.next_token()?;
                Ok(Predicate::not(self.parse_condition(scope)?))
            }
            "exists" => {
                self.next_token()?;
                Ok(Predicate::Exists(self.parse_path(scope)?))
            }
            "any" => {
                self.next_token()?;
                let var = self.parse_var()?;
                self.check_new_binding(&var, scope)?;
                self.expect("in", "after quantified variable")?;
                let collection = self.parse_collection(scope)?;
                self.expect("{", "to open quantifier body")?;

                scope.push(var.text().into());
                let body = self.parse_conditions(scope);
                scope.pop();

                Ok(Predicate::for_any(var.text(), collection, Predicate::And(body?)))
            }
            _ => self.parse_comparison(scope),
        }
    }

    // Consume a statement separator: `;`, a new line, or the closing brace.
    fn end_statement(&mut self) -> Result<()> {
        match self.token_text() {
            ";" => self.next_token(),
            "}" => Ok(()),
            _ if self.tok.0 == TokenKind::Eof => Ok(()),
            _ if self.line != self.tok.1.line => Ok(()),
            _ => Err(self.error_here("expecting new line or `;` after statement")),
        }
    }

    fn parse_conditions(&mut self, scope: &mut Vec<Arc<str>>) -> Result<Vec<Predicate>> {
        let mut conditions = vec![];
        while self.token_text() != "}" {
            if self.tok.0 == TokenKind::Eof {
                bail!(self.error_here("expecting `}`"));
            }
            conditions.push(self.parse_condition(scope)?);
            self.end_statement()?;
        }
        self.next_token()?;
        Ok(conditions)
    }

    fn parse_rule(&mut self, default_kinds: &KindFilter) -> Result<(Span, Rule)> {
        let rule_span = self.tok.1.clone();
        let category = match self.token_text() {
            "deny" => Category::Deny,
            "warn" => Category::Warn,
            _ => bail!(self.error_here("expecting `deny` or `warn`")),
        };
        self.next_token()?;

        let (id_span, id) = self.parse_string()?;
        if id.is_empty() {
            bail!(id_span.error("rule id cannot be empty"));
        }

        let mut severity = None;
        if self.token_text() == "severity" {
            self.next_token()?;
            let (span, text) = self.parse_string()?;
            severity = Some(Severity::from_str(&text).map_err(|e| span.error(&e.to_string()))?);
        }

        let applies_to = if self.token_text() == "on" {
            self.next_token()?;
            KindFilter::only(self.parse_string_list()?)
        } else {
            default_kinds.clone()
        };

        self.expect("{", "to open rule body")?;

        let mut scope: Vec<Arc<str>> = vec![];
        let mut stmts = vec![];
        let mut message: Option<(Span, String)> = None;
        while self.token_text() != "}" {
            match self.token_text() {
                _ if self.tok.0 == TokenKind::Eof => bail!(self.error_here("expecting `}`")),
                "message" => {
                    let keyword = self.tok.1.clone();
                    self.next_token()?;
                    let text = self.parse_string()?;
                    if message.is_some() {
                        bail!(keyword.error(&format!("rule `{id}` already has a message")));
                    }
                    message = Some(text);
                }
                "some" => {
                    self.next_token()?;
                    let var = self.parse_var()?;
                    self.check_new_binding(&var, &scope)?;
                    self.expect("in", "after quantified variable")?;
                    let collection = self.parse_collection(&scope)?;
                    scope.push(var.text().into());
                    stmts.push(Stmt::Some(var.text().into(), collection));
                }
                _ => stmts.push(Stmt::Cond(self.parse_condition(&mut scope)?)),
            }
            self.end_statement()?;
        }
        self.next_token()?;

        let Some((message_span, message_text)) = message else {
            bail!(rule_span.error(&format!("rule `{id}` has no message")));
        };
        let message = MessageTemplate::parse(&message_text)
            .map_err(|e| message_span.error(&e.to_string()))?;
        for var in message.variables() {
            if !scope.iter().any(|v| v.as_ref() == var) {
                bail!(message_span.error(&format!("message refers to unbound variable `{var}`")));
            }
        }

        let rule = Rule {
            id: id.into(),
            category,
            severity,
            applies_to,
            body: fold_statements(stmts),
            message,
            location: Some(Location {
                file: self.source.file().into(),
                line: rule_span.line,
                col: rule_span.col,
            }),
        };
        Ok((rule_span, rule))
    }

    pub fn parse_package(&mut self) -> Result<String> {
        self.expect("package", "missing package declaration")?;
        let mut name = self.parse_ident()?.text().to_string();
        while self.token_text() == "." && self.tok.1.start == self.end {
            self.next_token()?;
            name.push('.');
            name.push_str(self.parse_ident()?.text());
        }
        Ok(name)
    }

    pub fn parse(&mut self) -> Result<RuleSet> {
        let scope = self.parse_package()?;

        let default_kinds = if self.token_text() == "kinds" {
            self.next_token()?;
            KindFilter::only(self.parse_string_list()?)
        } else {
            KindFilter::Any
        };

        let mut rules = vec![];
        let mut declared: BTreeMap<Arc<str>, u32> = BTreeMap::new();
        while self.tok.0 != TokenKind::Eof {
            let (span, rule) = self.parse_rule(&default_kinds)?;
            if let Some(line) = declared.get(&rule.id) {
                bail!(span.error(&format!(
                    "duplicate rule id `{}`, first declared on line {line}",
                    rule.id
                )));
            }
            declared.insert(rule.id.clone(), span.line);
            rules.push(rule);
        }

        Ok(RuleSet::from_parts(scope.into(), rules))
    }
}

/// Nest every statement after a `some` inside that quantifier's body.
fn fold_statements(stmts: Vec<Stmt>) -> Predicate {
    let mut reversed: Vec<Predicate> = vec![];
    for stmt in stmts.into_iter().rev() {
        match stmt {
            Stmt::Cond(p) => reversed.push(p),
            Stmt::Some(var, collection) => {
                reversed.reverse();
                let body = Predicate::And(core::mem::take(&mut reversed));
                reversed.push(Predicate::some(&var, collection, body));
            }
        }
    }
    reversed.reverse();
    Predicate::And(reversed)
}

/// Compile policy text into a rule set.
pub fn compile_policy(file: &str, text: &str) -> crate::Result<RuleSet> {
    let source = Source::from_contents(file.to_string(), text.to_string())
        .map_err(|e| Error::policy_load(file, e))?;
    let mut parser = Parser::new(&source).map_err(|e| Error::policy_load(file, e))?;
    parser.parse().map_err(|e| Error::policy_load(file, e))
}
