// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::value::Value;

use core::fmt::{self, Debug, Formatter};
use core::iter::Peekable;
use core::str::CharIndices;
use std::rc::Rc;

use anyhow::{anyhow, bail, Result};

struct SourceInternal {
    file: String,
    contents: String,
    lines: Vec<(u32, u32)>,
}

/// Text of one policy file together with its line table.
#[derive(Clone)]
pub struct Source {
    src: Rc<SourceInternal>,
}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        self.src.file.fmt(f)
    }
}

impl Source {
    pub fn from_contents(file: String, contents: String) -> Result<Source> {
        let max_size = u32::MAX as usize - 2;
        if contents.len() > max_size {
            bail!("{file} exceeds maximum allowed policy file size {max_size}");
        }
        let mut lines = vec![];
        let mut prev_ch = ' ';
        let mut prev_pos = 0u32;
        let mut start = 0u32;
        for (i, ch) in contents.char_indices() {
            if ch == '\n' {
                let end = match prev_ch {
                    '\r' => prev_pos,
                    _ => i as u32,
                };
                lines.push((start, end));
                start = i as u32 + 1;
            }
            prev_ch = ch;
            prev_pos = i as u32;
        }

        if (start as usize) < contents.len() || contents.is_empty() {
            lines.push((start, contents.len() as u32));
        }
        Ok(Self {
            src: Rc::new(SourceInternal {
                file,
                contents,
                lines,
            }),
        })
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Source> {
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => bail!("failed to read {}. {e}", path.as_ref().display()),
        };
        Self::from_contents(path.as_ref().display().to_string(), contents)
    }

    pub fn file(&self) -> &str {
        &self.src.file
    }

    pub fn contents(&self) -> &str {
        &self.src.contents
    }

    pub fn line(&self, idx: u32) -> &str {
        match self.src.lines.get(idx as usize) {
            Some(&(start, end)) => &self.src.contents[start as usize..end as usize],
            None => "",
        }
    }

    /// Format a diagnostic with a caret under the offending column.
    pub fn message(&self, line: u32, col: u32, kind: &str, msg: &str) -> String {
        if line == 0 || line as usize > self.src.lines.len() + 1 {
            return format!("{}: invalid line {} specified", self.src.file, line);
        }

        let line_str = format!("{line}");
        let line_num_width = line_str.len() + 1;
        let col_spaces = (col as usize).saturating_sub(1);

        format!(
            "\n--> {}:{}:{}\n{:<line_num_width$}|\n\
             {:<line_num_width$}| {}\n\
             {:<line_num_width$}| {:<col_spaces$}^\n\
             {}: {}",
            self.src.file,
            line,
            col,
            "",
            line,
            self.line(line - 1),
            "",
            "",
            kind,
            msg
        )
    }

    pub fn error(&self, line: u32, col: u32, msg: &str) -> anyhow::Error {
        anyhow!(self.message(line, col, "error", msg))
    }
}

#[derive(Clone)]
pub struct Span {
    pub source: Source,
    pub line: u32,
    pub col: u32,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn text(&self) -> &str {
        &self.source.contents()[self.start as usize..self.end as usize]
    }

    pub fn message(&self, kind: &str, msg: &str) -> String {
        self.source.message(self.line, self.col, kind, msg)
    }

    pub fn error(&self, msg: &str) -> anyhow::Error {
        self.source.error(self.line, self.col, msg)
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let t = self.text().escape_debug().to_string();
        let max = 32;
        let (txt, trailer) = if t.len() > max {
            (&t[0..max], "...")
        } else {
            (t.as_str(), "")
        };

        f.write_fmt(format_args!(
            "{}:{}:{}:{}, \"{}{}\"",
            self.line, self.col, self.start, self.end, txt, trailer
        ))
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TokenKind {
    Symbol,
    String,
    Number,
    Ident,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token(pub TokenKind, pub Span);

#[derive(Clone)]
pub struct Lexer<'source> {
    source: Source,
    iter: Peekable<CharIndices<'source>>,
    line: u32,
    col: u32,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source Source) -> Self {
        Self {
            source: source.clone(),
            iter: source.contents().char_indices().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn peek(&mut self) -> (usize, char) {
        match self.iter.peek() {
            Some((index, chr)) => (*index, *chr),
            _ => (self.source.contents().len(), '\x00'),
        }
    }

    fn peekahead(&mut self, n: usize) -> (usize, char) {
        match self.iter.clone().nth(n) {
            Some((index, chr)) => (index, chr),
            _ => (self.source.contents().len(), '\x00'),
        }
    }

    fn span(&self, line: u32, col: u32, start: usize, end: usize) -> Span {
        Span {
            source: self.source.clone(),
            line,
            col,
            start: start as u32,
            end: end as u32,
        }
    }

    fn read_ident(&mut self) -> Token {
        let start = self.peek().0;
        let col = self.col;
        while matches!(self.peek().1, c if c.is_ascii_alphanumeric() || c == '_') {
            self.iter.next();
        }
        let end = self.peek().0;
        self.col += (end - start) as u32;
        Token(TokenKind::Ident, self.span(self.line, col, start, end))
    }

    fn read_digits(&mut self) {
        while self.peek().1.is_ascii_digit() {
            self.iter.next();
        }
    }

    // Numbers follow the json grammar.
    fn read_number(&mut self) -> Result<Token> {
        let (start, chr) = self.peek();
        let col = self.col;
        self.iter.next();

        if chr == '-' {
            // A leading 0 may not be followed by more digits.
            if self.peek().1 != '0' {
                self.read_digits();
            } else {
                self.iter.next();
            }
        } else if chr != '0' {
            self.read_digits();
        }

        if self.peek().1 == '.' && self.peekahead(1).1.is_ascii_digit() {
            self.iter.next();
            self.read_digits();
        }

        if matches!(self.peek().1, 'e' | 'E') {
            self.iter.next();
            if matches!(self.peek().1, '+' | '-') {
                self.iter.next();
            }
            self.read_digits();
        }

        let end = self.peek().0;
        self.col += (end - start) as u32;

        let ch = self.peek().1;
        if ch == '_' || ch == '.' || ch.is_ascii_alphanumeric() {
            return Err(self.source.error(self.line, self.col, "invalid number"));
        }

        if let Err(e) = serde_json::from_str::<Value>(&self.source.contents()[start..end]) {
            let serde_msg = e.to_string();
            let msg = match serde_msg.as_str() {
                m if m.contains("out of range") => "out of range",
                m if m.contains("invalid number") => "invalid number",
                m => m,
            };
            bail!(
                "{} {}",
                self.source.error(self.line, col, "invalid number:"),
                msg
            )
        }

        Ok(Token(TokenKind::Number, self.span(self.line, col, start, end)))
    }

    fn read_string(&mut self) -> Result<Token> {
        let (line, col) = (self.line, self.col);
        self.iter.next();
        self.col += 1;
        let (start, _) = self.peek();
        loop {
            let (offset, ch) = self.peek();
            let ch_col = self.col + (offset - start) as u32;
            match ch {
                '"' | '\x00' => break,
                '\\' => {
                    self.iter.next();
                    let (_, escaped) = self.peek();
                    self.iter.next();
                    match escaped {
                        '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' => (),
                        'u' => {
                            for _ in 0..4 {
                                let (offset, ch) = self.peek();
                                if !ch.is_ascii_hexdigit() {
                                    let col = self.col + (offset - start) as u32;
                                    return Err(self.source.error(
                                        line,
                                        col,
                                        "invalid hex escape sequence",
                                    ));
                                }
                                self.iter.next();
                            }
                        }
                        _ => {
                            return Err(self.source.error(line, ch_col, "invalid escape sequence"))
                        }
                    }
                }
                _ => {
                    if !('\u{0020}'..='\u{10FFFF}').contains(&ch) {
                        return Err(self.source.error(line, ch_col, "invalid character in string"));
                    }
                    self.iter.next();
                }
            }
        }

        if self.peek().1 != '"' {
            return Err(self.source.error(line, col, "unmatched \""));
        }

        self.iter.next();
        let end = self.peek().0;
        self.col += (end - start) as u32;

        Ok(Token(
            TokenKind::String,
            self.span(line, col + 1, start, end - 1),
        ))
    }

    fn skip_ws(&mut self) -> Result<()> {
        // Tabs count as 4 columns. Comments run to the end of the line.
        'outer: loop {
            match self.peek().1 {
                ' ' => self.col += 1,
                '\t' => self.col += 4,
                '\r' => {
                    if self.peekahead(1).1 != '\n' {
                        return Err(self.source.error(
                            self.line,
                            self.col,
                            "\\r must be followed by \\n",
                        ));
                    }
                }
                '\n' => {
                    self.col = 1;
                    self.line += 1;
                }
                '#' => {
                    self.iter.next();
                    loop {
                        match self.peek().1 {
                            '\n' | '\x00' => continue 'outer,
                            _ => self.iter.next(),
                        };
                    }
                }
                _ => break,
            }
            self.iter.next();
        }
        Ok(())
    }

    fn read_symbol(&mut self, len: usize) -> Token {
        let (start, _) = self.peek();
        let col = self.col;
        for _ in 0..len {
            self.iter.next();
        }
        self.col += len as u32;
        let end = self.peek().0;
        Token(TokenKind::Symbol, self.span(self.line, col, start, end))
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_ws()?;

        let (start, chr) = self.peek();
        let col = self.col;

        match chr {
            '-' if self.peekahead(1).1.is_ascii_digit() => self.read_number(),
            '{' | '}' | '[' | ']' | '(' | ')' | ',' | ';' | '.' => Ok(self.read_symbol(1)),
            // < <= > >= = == =~
            '<' | '>' | '=' => {
                let len = match self.peekahead(1).1 {
                    '=' => 2,
                    '~' if chr == '=' => 2,
                    _ => 1,
                };
                Ok(self.read_symbol(len))
            }
            '!' if self.peekahead(1).1 == '=' => Ok(self.read_symbol(2)),
            '"' => self.read_string(),
            '\x00' => Ok(Token(TokenKind::Eof, self.span(self.line, col, start, start))),
            _ if chr.is_ascii_digit() => self.read_number(),
            _ if chr.is_ascii_alphabetic() || chr == '_' => Ok(self.read_ident()),
            _ => Err(self.source.error(self.line, self.col, "invalid character")),
        }
    }
}
