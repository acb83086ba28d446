//! Format translation between the evaluation notation emitted by the resume
//! analyser and the canonical JSON kept in the store.
//!
//! The analyser prints its result as a Python literal: single- or
//! double-quoted strings, `True`/`False`/`None`, dicts, lists and tuples.
//! This module reads that notation with a small recursive-descent parser so
//! quote characters inside string values survive translation.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::warn;

/// Nesting limit for dicts, lists and tuples in analyser payloads.
const MAX_DEPTH: usize = 128;

/// category -> attribute -> value
pub type CanonicalResult = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    #[error("invalid number '{literal}' at offset {offset}")]
    InvalidNumber { literal: String, offset: usize },

    #[error("invalid escape sequence at offset {offset}")]
    InvalidEscape { offset: usize },

    #[error("unknown identifier '{ident}' at offset {offset}")]
    UnknownIdentifier { ident: String, offset: usize },

    #[error("mapping key at offset {offset} must be a string or a number")]
    InvalidKey { offset: usize },

    #[error("nesting too deep at offset {offset}")]
    TooDeep { offset: usize },

    #[error("trailing characters at offset {offset}")]
    TrailingCharacters { offset: usize },

    #[error("not a category -> attribute mapping: {0}")]
    Canonical(#[from] serde_json::Error),
}

/// Converts analyser notation into canonical JSON text.
pub fn to_canonical(raw: &str) -> Result<String, TranslationError> {
    let value = parse_external(raw)?;
    Ok(serde_json::to_string(&value)?)
}

/// Converts analyser notation into the canonical mapping.
pub fn translate(raw: &str) -> Result<CanonicalResult, TranslationError> {
    parse(&to_canonical(raw)?)
}

/// Parses canonical JSON text into the nested mapping.
pub fn parse(canonical: &str) -> Result<CanonicalResult, TranslationError> {
    Ok(serde_json::from_str(canonical)?)
}

/// Like [`parse`], but malformed text yields an empty mapping.
pub fn parse_or_empty(canonical: &str) -> CanonicalResult {
    parse(canonical).unwrap_or_else(|e| {
        warn!("Discarding unparsable canonical result: {e}");
        CanonicalResult::new()
    })
}

/// Reads a stored value back into the nested mapping. A value of the wrong
/// shape degrades to an empty mapping instead of failing the read. Rows
/// written by older releases hold the canonical text as a JSON string.
pub fn from_stored(value: &Value) -> CanonicalResult {
    if let Value::String(canonical) = value {
        return parse_or_empty(canonical);
    }
    CanonicalResult::deserialize(value).unwrap_or_else(|e| {
        warn!("Discarding malformed stored result: {e}");
        CanonicalResult::new()
    })
}

/// Canonical mapping as a JSON value, ready to persist.
pub fn to_value(result: &CanonicalResult) -> Result<Value, TranslationError> {
    Ok(serde_json::to_value(result)?)
}

/// Parses a complete analyser payload into a JSON value.
pub fn parse_external(raw: &str) -> Result<Value, TranslationError> {
    let mut parser = Parser {
        src: raw,
        pos: 0,
        depth: 0,
    };
    parser.skip_ws();
    let value = parser.parse_value()?;
    parser.skip_ws();
    if parser.pos != raw.len() {
        return Err(TranslationError::TrailingCharacters { offset: parser.pos });
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn unexpected(&self) -> TranslationError {
        match self.peek() {
            Some(found) => TranslationError::UnexpectedChar {
                found,
                offset: self.pos,
            },
            None => TranslationError::UnexpectedEnd,
        }
    }

    fn parse_value(&mut self) -> Result<Value, TranslationError> {
        match self.peek() {
            None => Err(TranslationError::UnexpectedEnd),
            Some('{') => self.nested(|p| p.parse_dict()),
            Some('[') => self.nested(|p| p.parse_seq(']')),
            Some('(') => self.nested(|p| p.parse_seq(')')),
            Some('\'') | Some('"') => self.parse_string().map(Value::String),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_ident(),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Value, TranslationError>,
    ) -> Result<Value, TranslationError> {
        if self.depth >= MAX_DEPTH {
            return Err(TranslationError::TooDeep { offset: self.pos });
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn parse_dict(&mut self) -> Result<Value, TranslationError> {
        self.bump();
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Value::Object(map));
            }

            let key = self.parse_key()?;
            self.skip_ws();
            if self.peek() != Some(':') {
                return Err(self.unexpected());
            }
            self.bump();
            self.skip_ws();
            let value = self.parse_value()?;
            map.insert(key, value);

            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {
                    self.bump();
                    return Ok(Value::Object(map));
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_key(&mut self) -> Result<String, TranslationError> {
        let offset = self.pos;
        match self.parse_value()? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(TranslationError::InvalidKey { offset }),
        }
    }

    fn parse_seq(&mut self, close: char) -> Result<Value, TranslationError> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(Value::Array(items));
            }

            items.push(self.parse_value()?);

            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(c) if c == close => {
                    self.bump();
                    return Ok(Value::Array(items));
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_string(&mut self) -> Result<String, TranslationError> {
        let quote = self.bump().ok_or(TranslationError::UnexpectedEnd)?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(TranslationError::UnexpectedEnd),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => self.parse_escape(&mut out)?,
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), TranslationError> {
        let offset = self.pos - 1;
        let c = self.bump().ok_or(TranslationError::UnexpectedEnd)?;
        match c {
            '\\' | '\'' | '"' => out.push(c),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            '0' => out.push('\0'),
            // line continuation
            '\n' => {}
            'x' => out.push(self.parse_hex(2, offset)?),
            'u' => out.push(self.parse_hex(4, offset)?),
            'U' => out.push(self.parse_hex(8, offset)?),
            // unknown escapes keep the backslash
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn parse_hex(&mut self, digits: usize, offset: usize) -> Result<char, TranslationError> {
        let start = self.pos;
        for _ in 0..digits {
            match self.bump() {
                Some(c) if c.is_ascii_hexdigit() => {}
                Some(_) => return Err(TranslationError::InvalidEscape { offset }),
                None => return Err(TranslationError::UnexpectedEnd),
            }
        }
        u32::from_str_radix(&self.src[start..self.pos], 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or(TranslationError::InvalidEscape { offset })
    }

    fn parse_number(&mut self) -> Result<Value, TranslationError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.bump();
        }
        let mut prev = ' ';
        while let Some(c) = self.peek() {
            let exponent_sign = matches!(c, '-' | '+') && matches!(prev, 'e' | 'E');
            if !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '_') || exponent_sign) {
                break;
            }
            prev = c;
            self.bump();
        }

        let literal = &self.src[start..self.pos];
        let cleaned = literal.trim_start_matches('+').replace('_', "");
        let invalid = || TranslationError::InvalidNumber {
            literal: literal.to_string(),
            offset: start,
        };

        let is_float = cleaned.contains(['.', 'e', 'E']);
        if !is_float {
            if let Ok(i) = cleaned.parse::<i64>() {
                return Ok(Value::Number(Number::from(i)));
            }
            if let Ok(u) = cleaned.parse::<u64>() {
                return Ok(Value::Number(Number::from(u)));
            }
        }
        cleaned
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid)
    }

    fn parse_ident(&mut self) -> Result<Value, TranslationError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !(c.is_alphanumeric() || c == '_') {
                break;
            }
            self.bump();
        }
        let ident = &self.src[start..self.pos];
        match ident {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            // u'...' from older analysers
            "u" | "U" if matches!(self.peek(), Some('\'') | Some('"')) => {
                self.parse_string().map(Value::String)
            }
            _ => Err(TranslationError::UnknownIdentifier {
                ident: ident.to_string(),
                offset: start,
            }),
        }
    }
}
