//! Inline model DSL.
//!
//! Block form, whitespace-insensitive, trailing commas and `//` line
//! comments tolerated:
//!
//! ```text
//! processes {
//!     source "faucet" { trigger_mode: Automatic }
//!     pool "tub" { capacity: 10, overflow: Drain }
//!     stepper "clock" { dt: 1.0 }
//! }
//! connections {
//!     "faucet.out" -> "tub.in" { id: "c1", flow_rate: 2.0 }
//! }
//! ```
//!
//! Endpoints are `"id.port"` with the port optional. Omitted connection ids
//! are generated deterministically (`c0`, `c1`, … in declaration order,
//! skipping taken ids).

use std::collections::HashSet;

use crate::connection::{ConnectionRecord, DEFAULT_INPUT_PORT, DEFAULT_OUTPUT_PORT};
use crate::error::{Result, SimulationError};
use crate::model::Model;
use crate::process::{Action, Overflow, ProcessKind, ProcessRecord, TriggerMode};

/// Parse the DSL into a model.
pub fn parse(input: &str) -> Result<Model> {
    let tokens = tokenize(input)?;
    Parser { tokens, pos: 0 }.parse_model()
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Number(f64),
    LBrace,
    RBrace,
    Colon,
    Comma,
    Arrow,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    line: usize,
}

fn err_at(line: usize, message: impl std::fmt::Display) -> SimulationError {
    SimulationError::ParseError(format!("line {line}: {message}"))
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    // Line comment.
                    for c in chars.by_ref() {
                        if c == '\n' {
                            line += 1;
                            break;
                        }
                    }
                } else {
                    return Err(err_at(line, "unexpected character '/'"));
                }
            }
            '{' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::LBrace, line });
            }
            '}' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::RBrace, line });
            }
            ':' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::Colon, line });
            }
            ',' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::Comma, line });
            }
            '-' => {
                chars.next();
                match chars.peek() {
                    Some('>') => {
                        chars.next();
                        tokens.push(Token { kind: TokenKind::Arrow, line });
                    }
                    Some(c) if c.is_ascii_digit() || *c == '.' => {
                        let number = lex_number(&mut chars, true, line)?;
                        tokens.push(Token { kind: TokenKind::Number(number), line });
                    }
                    _ => return Err(err_at(line, "expected '->' or a number after '-'")),
                }
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    if c == '\n' {
                        line += 1;
                    }
                    value.push(c);
                }
                if !closed {
                    return Err(err_at(line, "unterminated string"));
                }
                tokens.push(Token { kind: TokenKind::Str(value), line });
            }
            c if c.is_ascii_digit() || c == '.' || c == '+' => {
                if c == '+' {
                    chars.next();
                }
                let number = lex_number(&mut chars, false, line)?;
                tokens.push(Token { kind: TokenKind::Number(number), line });
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token { kind: TokenKind::Ident(ident), line });
            }
            other => return Err(err_at(line, format!("unexpected character {other:?}"))),
        }
    }
    Ok(tokens)
}

fn lex_number(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    negative: bool,
    line: usize,
) -> Result<f64> {
    let mut text = String::new();
    if negative {
        text.push('-');
    }
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' {
            text.push(c);
            chars.next();
        } else {
            break;
        }
    }
    text.parse::<f64>()
        .map_err(|_| err_at(line, format!("invalid number {text:?}")))
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// A parsed `field: value` pair.
enum FieldValue {
    Number(f64),
    Word(String),
}

impl Parser {
    fn parse_model(mut self) -> Result<Model> {
        let mut model = Model::default();
        while let Some((section, line)) = self.peek_section() {
            match section.as_str() {
                "processes" => {
                    self.advance();
                    self.expect_lbrace()?;
                    while !self.at_rbrace() {
                        let process = self.parse_process()?;
                        model.processes.push(process);
                    }
                    self.expect_rbrace()?;
                }
                "connections" => {
                    self.advance();
                    self.expect_lbrace()?;
                    while !self.at_rbrace() {
                        let connection = self.parse_connection()?;
                        model.connections.push(connection);
                    }
                    self.expect_rbrace()?;
                }
                other => {
                    return Err(err_at(
                        line,
                        format!("expected 'processes' or 'connections', got {other:?}"),
                    ));
                }
            }
        }
        assign_connection_ids(&mut model);
        Ok(model)
    }

    /// The next token as a section header candidate: its identifier text
    /// (or a placeholder for non-identifiers) plus its line.
    fn peek_section(&self) -> Option<(String, usize)> {
        self.peek().map(|token| match &token.kind {
            TokenKind::Ident(word) => (word.clone(), token.line),
            other => (format!("{other:?}"), token.line),
        })
    }

    /// `kind "id" { fields }` — the field block is optional.
    fn parse_process(&mut self) -> Result<ProcessRecord> {
        let (kind_word, line) = self.expect_ident()?;
        let kind = parse_kind(&kind_word).ok_or_else(|| {
            err_at(line, format!("unknown process kind {kind_word:?}"))
        })?;
        let (id, _) = self.expect_string()?;
        let mut record = ProcessRecord::new(id, kind);
        if self.at_lbrace() {
            self.advance();
            for (name, value, line) in self.parse_fields()? {
                apply_process_field(&mut record, &name, value, line)?;
            }
            self.expect_rbrace()?;
        }
        Ok(record)
    }

    /// `"src.port" -> "tgt.port" { fields }` — block optional.
    fn parse_connection(&mut self) -> Result<ConnectionRecord> {
        let (source, line) = self.expect_string()?;
        self.expect_arrow()?;
        let (target, _) = self.expect_string()?;

        let (source_id, source_port) = split_endpoint(&source, line)?;
        let (target_id, target_port) = split_endpoint(&target, line)?;
        let mut record = ConnectionRecord {
            id: String::new(),
            source_id,
            source_port: source_port.filter(|p| p != DEFAULT_OUTPUT_PORT),
            target_id,
            target_port: target_port.filter(|p| p != DEFAULT_INPUT_PORT),
            flow_rate: None,
        };

        if self.at_lbrace() {
            self.advance();
            for (name, value, line) in self.parse_fields()? {
                match (name.as_str(), value) {
                    ("id", FieldValue::Word(id)) => record.id = id,
                    ("flow_rate", FieldValue::Number(rate)) => record.flow_rate = Some(rate),
                    ("id", FieldValue::Number(_)) => {
                        return Err(err_at(line, "connection id must be a string"));
                    }
                    ("flow_rate", FieldValue::Word(_)) => {
                        return Err(err_at(line, "flow_rate must be a number"));
                    }
                    (other, _) => {
                        return Err(err_at(line, format!("unknown connection field {other:?}")));
                    }
                }
            }
            self.expect_rbrace()?;
        }
        Ok(record)
    }

    /// `field: value, ...` until the closing brace; trailing comma tolerated.
    fn parse_fields(&mut self) -> Result<Vec<(String, FieldValue, usize)>> {
        let mut fields = Vec::new();
        loop {
            if self.at_rbrace() {
                return Ok(fields);
            }
            let (name, line) = self.expect_ident()?;
            self.expect_colon()?;
            let value = match self.next() {
                Some(Token { kind: TokenKind::Number(n), .. }) => FieldValue::Number(n),
                Some(Token { kind: TokenKind::Ident(word), .. }) => FieldValue::Word(word),
                Some(Token { kind: TokenKind::Str(word), .. }) => FieldValue::Word(word),
                other => {
                    return Err(err_at(
                        other.map_or(line, |t| t.line),
                        "expected a field value",
                    ));
                }
            };
            fields.push((name, value, line));
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Comma) => {
                    self.advance();
                }
                Some(TokenKind::RBrace) => return Ok(fields),
                _ => return Err(err_at(line, "expected ',' or '}' after a field")),
            }
        }
    }

    // Token plumbing.

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map_or(1, |t| t.line)
    }

    fn at_lbrace(&self) -> bool {
        matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LBrace))
    }

    fn at_rbrace(&self) -> bool {
        matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RBrace))
    }

    fn expect_lbrace(&mut self) -> Result<()> {
        match self.next() {
            Some(Token { kind: TokenKind::LBrace, .. }) => Ok(()),
            other => Err(err_at(
                other.map_or_else(|| self.last_line(), |t| t.line),
                "expected '{'",
            )),
        }
    }

    fn expect_rbrace(&mut self) -> Result<()> {
        match self.next() {
            Some(Token { kind: TokenKind::RBrace, .. }) => Ok(()),
            other => Err(err_at(
                other.map_or_else(|| self.last_line(), |t| t.line),
                "expected '}'",
            )),
        }
    }

    fn expect_colon(&mut self) -> Result<()> {
        match self.next() {
            Some(Token { kind: TokenKind::Colon, .. }) => Ok(()),
            other => Err(err_at(
                other.map_or_else(|| self.last_line(), |t| t.line),
                "expected ':'",
            )),
        }
    }

    fn expect_arrow(&mut self) -> Result<()> {
        match self.next() {
            Some(Token { kind: TokenKind::Arrow, .. }) => Ok(()),
            other => Err(err_at(
                other.map_or_else(|| self.last_line(), |t| t.line),
                "expected '->'",
            )),
        }
    }

    fn expect_ident(&mut self) -> Result<(String, usize)> {
        match self.next() {
            Some(Token { kind: TokenKind::Ident(word), line }) => Ok((word, line)),
            other => Err(err_at(
                other.map_or_else(|| self.last_line(), |t| t.line),
                "expected an identifier",
            )),
        }
    }

    fn expect_string(&mut self) -> Result<(String, usize)> {
        match self.next() {
            Some(Token { kind: TokenKind::Str(word), line }) => Ok((word, line)),
            other => Err(err_at(
                other.map_or_else(|| self.last_line(), |t| t.line),
                "expected a quoted string",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Lowering helpers
// ---------------------------------------------------------------------------

fn parse_kind(word: &str) -> Option<ProcessKind> {
    match word.to_ascii_lowercase().as_str() {
        "source" => Some(ProcessKind::Source),
        "pool" => Some(ProcessKind::Pool),
        "drain" => Some(ProcessKind::Drain),
        "delay" => Some(ProcessKind::Delay),
        "stepper" => Some(ProcessKind::Stepper),
        _ => None,
    }
}

fn parse_trigger_mode(word: &str) -> Option<TriggerMode> {
    match word.to_ascii_lowercase().as_str() {
        "automatic" => Some(TriggerMode::Automatic),
        "passive" => Some(TriggerMode::Passive),
        "interactive" => Some(TriggerMode::Interactive),
        "enabling" => Some(TriggerMode::Enabling),
        _ => None,
    }
}

fn parse_action(word: &str) -> Option<Action> {
    match word.to_ascii_lowercase().as_str() {
        "pushany" => Some(Action::PushAny),
        "pushall" => Some(Action::PushAll),
        "pullany" => Some(Action::PullAny),
        "pullall" => Some(Action::PullAll),
        "delay" => Some(Action::Delay),
        "queue" => Some(Action::Queue),
        _ => None,
    }
}

fn parse_overflow(word: &str) -> Option<Overflow> {
    match word.to_ascii_lowercase().as_str() {
        "block" => Some(Overflow::Block),
        "drain" => Some(Overflow::Drain),
        _ => None,
    }
}

fn apply_process_field(
    record: &mut ProcessRecord,
    name: &str,
    value: FieldValue,
    line: usize,
) -> Result<()> {
    match (name, value) {
        ("trigger_mode", FieldValue::Word(word)) => {
            record.trigger_mode = Some(
                parse_trigger_mode(&word)
                    .ok_or_else(|| err_at(line, format!("unknown trigger_mode {word:?}")))?,
            );
        }
        ("action", FieldValue::Word(word)) => {
            record.action = Some(
                parse_action(&word)
                    .ok_or_else(|| err_at(line, format!("unknown action {word:?}")))?,
            );
        }
        ("overflow", FieldValue::Word(word)) => {
            record.overflow = Some(
                parse_overflow(&word)
                    .ok_or_else(|| err_at(line, format!("unknown overflow {word:?}")))?,
            );
        }
        ("capacity", FieldValue::Number(n)) => record.capacity = Some(n),
        ("release_amount", FieldValue::Number(n)) => record.release_amount = Some(n),
        ("dt", FieldValue::Number(n)) => record.dt = Some(n),
        ("initial_resources", FieldValue::Number(n)) => record.initial_resources = Some(n),
        ("trigger_mode" | "action" | "overflow", FieldValue::Number(_)) => {
            return Err(err_at(line, format!("field {name:?} expects a name")));
        }
        (
            "capacity" | "release_amount" | "dt" | "initial_resources",
            FieldValue::Word(_),
        ) => {
            return Err(err_at(line, format!("field {name:?} expects a number")));
        }
        (other, _) => {
            return Err(err_at(line, format!("unknown process field {other:?}")));
        }
    }
    Ok(())
}

/// `"id.port"` or `"id"`; the port is the segment after the last dot.
fn split_endpoint(endpoint: &str, line: usize) -> Result<(String, Option<String>)> {
    if endpoint.is_empty() {
        return Err(err_at(line, "empty connection endpoint"));
    }
    match endpoint.rsplit_once('.') {
        Some((id, port)) if !id.is_empty() && !port.is_empty() => {
            Ok((id.to_string(), Some(port.to_string())))
        }
        Some(_) => Err(err_at(line, format!("malformed endpoint {endpoint:?}"))),
        None => Ok((endpoint.to_string(), None)),
    }
}

/// Fill omitted connection ids deterministically: `c0`, `c1`, … by
/// declaration order, skipping ids already taken.
fn assign_connection_ids(model: &mut Model) {
    let mut taken: HashSet<String> = model
        .connections
        .iter()
        .filter(|record| !record.id.is_empty())
        .map(|record| record.id.clone())
        .collect();
    let mut counter = 0usize;
    for record in &mut model.connections {
        if record.id.is_empty() {
            loop {
                let candidate = format!("c{counter}");
                counter += 1;
                if !taken.contains(&candidate) {
                    taken.insert(candidate.clone());
                    record.id = candidate;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_model() {
        let input = r#"
// A faucet filling a tub through a delay.
processes {
    source "faucet" { trigger_mode: Automatic }
    delay "pipe" { action: Queue, release_amount: 2.0, }
    pool "tub" { capacity: 10, overflow: Drain }
    stepper "clock" { dt: 0.5 }
}
connections {
    "faucet.out" -> "pipe.in" { id: "c1", flow_rate: 1.0 }
    "pipe.out" -> "tub.in" { flow_rate: 3.0 }
}
"#;
        let model = parse(input).unwrap();
        assert_eq!(model.processes.len(), 4);
        assert_eq!(model.connections.len(), 2);

        let pipe = &model.processes[1];
        assert_eq!(pipe.kind, ProcessKind::Delay);
        assert_eq!(pipe.action, Some(Action::Queue));
        assert_eq!(pipe.release_amount, Some(2.0));

        let clock = &model.processes[3];
        assert_eq!(clock.dt, Some(0.5));

        assert_eq!(model.connections[0].id, "c1");
        // Default ports normalize to None.
        assert_eq!(model.connections[0].source_port, None);
        assert_eq!(model.connections[1].id, "c0");
        assert_eq!(model.connections[1].flow_rate, Some(3.0));
    }

    #[test]
    fn is_whitespace_insensitive() {
        let compact = r#"processes{source"s"{}pool"p"{}}connections{"s"->"p"{}}"#;
        let model = parse(compact).unwrap();
        assert_eq!(model.processes.len(), 2);
        assert_eq!(model.connections.len(), 1);
        assert_eq!(model.connections[0].source_port, None);
    }

    #[test]
    fn generated_ids_skip_taken_ones() {
        let input = r#"
processes { source "s" {} pool "p" {} }
connections {
    "s" -> "p" { id: "c0" }
    "s" -> "p"
    "s" -> "p"
}
"#;
        let model = parse(input).unwrap();
        let ids: Vec<&str> = model.connections.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c1", "c2"]);
    }

    #[test]
    fn non_default_ports_are_kept() {
        let model = parse(r#"processes { pool "a" {} pool "b" {} } connections { "a.side" -> "b.top" }"#)
            .unwrap();
        assert_eq!(model.connections[0].source_port.as_deref(), Some("side"));
        assert_eq!(model.connections[0].target_port.as_deref(), Some("top"));
    }

    #[test]
    fn errors_carry_line_numbers() {
        let input = "processes {\n    source \"s\" { speed: 3 }\n}";
        let err = parse(input).unwrap_err().to_string();
        assert!(err.contains("line 2"), "{err}");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(parse(r#"processes { widget "w" {} }"#).is_err());
    }

    #[test]
    fn unterminated_blocks_are_rejected() {
        assert!(parse(r#"processes { source "s" {"#).is_err());
        assert!(parse(r#"connections { "a" -> "#).is_err());
    }
}
