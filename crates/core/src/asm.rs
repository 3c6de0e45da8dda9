//! CHIP-8 assembler.
//!
//! Two-pass translation of assembly source into executable bytecode.
//!
//! # Syntax
//!
//! ```text
//! [label:] [instruction | directive]   ; comment
//! ```
//!
//! - Input is case-insensitive; labels are `[a-z_][a-z_0-9]*`. A label
//!   starting with `.` is local: it is only unique under the most recent
//!   global label, so every routine can have its own `.loop`.
//! - Literals: `#1F` (hex, up to three digits), `0b1010` (binary), `31`
//!   (decimal). `2f` is a malformed decimal, not hex.
//! - `db lit[, lit...]` emits raw bytes; `name: equ lit` binds a constant
//!   without consuming memory.
//! - `( a + b - c )` is a flat left-to-right expression over `+ - *` whose
//!   terms are literals or labels; a negative result is rejected.
//! - `.sprite <rows>` lines are editor annotations and are skipped.
//!
//! Statements are matched against the mnemonic templates of
//! [`opcodes::TABLE`] in table order; the first structural match wins, so
//! `SE V1, V2` reaches the register form because a `v`-register token is
//! not admissible as a byte operand. Instruction words are emitted
//! big-endian from origin 0x200.

use std::collections::HashMap;
use std::fmt;

use crate::opcodes::{self, OpcodeInfo};
use crate::PROGRAM_START;

/// Assembly failure: what went wrong and the 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, line: usize) -> Self {
        ParseError { message: message.into(), line }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Words that can never be used as labels.
const RESERVED: &[&str] = &[
    "equ", "v0", "v1", "v2", "v3", "v4", "v5", "v6", "v7", "v8", "v9", "va", "vb", "vc", "vd",
    "ve", "vf", "i", "k", "dt", "db", "sprite",
];

/// Operand kind required by one template position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// `Vx` register
    X,
    /// `Vy` register
    Y,
    /// 12-bit value: literal, label, or expression
    Addr,
    /// 8-bit value: literal, label, or expression
    Byte,
    /// 4-bit value: literal or expression only
    Nibble,
    /// Literal keyword operands
    I,
    MemI,
    Dt,
    St,
    K,
    F,
    B,
    V0,
}

/// One instruction template compiled to its mnemonic word and operand kinds.
struct Pattern {
    info: &'static OpcodeInfo,
    mnemonic: String,
    slots: Vec<Slot>,
}

/// Compile the statement patterns from the shared mnemonic templates.
fn build_patterns() -> Vec<Pattern> {
    opcodes::TABLE
        .iter()
        .map(|info| {
            let (mnemonic, operands) = match info.template.split_once(' ') {
                Some((m, rest)) => (m, rest),
                None => (info.template, ""),
            };
            let slots = operands
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| match t {
                    "Vx" => Slot::X,
                    "Vy" => Slot::Y,
                    "addr" => Slot::Addr,
                    "byte" => Slot::Byte,
                    "nibble" => Slot::Nibble,
                    "I" => Slot::I,
                    "[I]" => Slot::MemI,
                    "DT" => Slot::Dt,
                    "ST" => Slot::St,
                    "K" => Slot::K,
                    "F" => Slot::F,
                    "B" => Slot::B,
                    "V0" => Slot::V0,
                    other => unreachable!("template operand {other}"),
                })
                .collect();
            Pattern { info, mnemonic: mnemonic.to_lowercase(), slots }
        })
        .collect()
}

/// `v0`–`vf` register token.
fn parse_reg(token: &str) -> Option<u8> {
    let mut chars = token.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some('v'), Some(digit), None) => digit.to_digit(16).map(|d| d as u8),
        _ => None,
    }
}

fn is_identifier(token: &str) -> bool {
    let body = token.strip_prefix('.').unwrap_or(token);
    let mut chars = body.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Literal shape check: `#` + 1–3 hex digits, `0b` + binary digits, or a
/// decimal digit run.
fn is_literal(token: &str) -> bool {
    if let Some(hex) = token.strip_prefix('#') {
        (1..=3).contains(&hex.len()) && hex.chars().all(|c| c.is_ascii_hexdigit())
    } else if let Some(bin) = token.strip_prefix("0b") {
        !bin.is_empty() && bin.chars().all(|c| c == '0' || c == '1')
    } else {
        !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
    }
}

/// Decode a literal's value; `None` if the token is not a valid literal.
fn decode_literal(token: &str) -> Option<i64> {
    if let Some(hex) = token.strip_prefix('#') {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = token.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        token.parse().ok()
    }
}

/// Structural check for `( term (op term)+ )`.
fn is_expression(token: &str) -> bool {
    let Some(inner) = token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) else {
        return false;
    };
    let terms: Vec<&str> = inner.split(['+', '-', '*']).map(str::trim).collect();
    terms.len() >= 2 && terms.iter().all(|t| is_literal(t) || is_identifier(t))
}

/// Evaluate a flat left-to-right expression; no precedence, terms are
/// literals or (global) label references.
fn eval_expression(token: &str, labels: &HashMap<String, i64>) -> Option<i64> {
    let inner = token.strip_prefix('(')?.strip_suffix(')')?;
    let mut terms = inner.split(['+', '-', '*']).map(str::trim);
    let operators = inner.chars().filter(|c| matches!(c, '+' | '-' | '*'));

    let term_value = |term: &str| -> Option<i64> {
        if is_identifier(term) {
            labels.get(term).copied()
        } else {
            decode_literal(term)
        }
    };

    let mut result = term_value(terms.next()?)?;
    for operator in operators {
        let operand = term_value(terms.next()?)?;
        result = match operator {
            '+' => result + operand,
            '-' => result - operand,
            _ => result * operand,
        };
    }
    Some(result)
}

/// Whether a token is admissible as an `addr`/`byte` operand. Register
/// tokens and the `dt`/`k`/`i` keywords are excluded so the keyword forms
/// of `LD` and `ADD` stay unambiguous.
fn is_value(token: &str) -> bool {
    if parse_reg(token).is_some() || matches!(token, "dt" | "k" | "i") {
        return false;
    }
    is_literal(token) || is_identifier(token) || is_expression(token)
}

fn slot_matches(slot: Slot, token: &str) -> bool {
    match slot {
        Slot::X | Slot::Y => parse_reg(token).is_some(),
        Slot::Addr | Slot::Byte => is_value(token),
        Slot::Nibble => is_literal(token) || is_expression(token),
        Slot::I => token == "i",
        Slot::MemI => token == "[i]",
        Slot::Dt => token == "dt",
        Slot::St => token == "st",
        Slot::K => token == "k",
        Slot::F => token == "f",
        Slot::B => token == "b",
        Slot::V0 => token == "v0",
    }
}

/// Split a statement into its mnemonic word and comma-separated operands.
fn split_statement(stmt: &str) -> (&str, Vec<&str>) {
    match stmt.split_once(char::is_whitespace) {
        None => (stmt, Vec::new()),
        Some((mnemonic, rest)) => (mnemonic, rest.split(',').map(str::trim).collect()),
    }
}

/// First template the statement matches structurally, with its operands.
fn match_statement<'a, 'b>(
    patterns: &'a [Pattern],
    stmt: &'b str,
) -> Option<(&'a Pattern, Vec<&'b str>)> {
    let (mnemonic, operands) = split_statement(stmt);
    patterns
        .iter()
        .find(|p| {
            p.mnemonic == mnemonic
                && p.slots.len() == operands.len()
                && p.slots.iter().zip(&operands).all(|(&s, t)| slot_matches(s, t))
        })
        .map(|p| (p, operands))
}

/// Lowercase, strip the `;` comment, and trim one source line.
fn clean(raw: &str) -> String {
    let line = raw.to_lowercase();
    let line = line.split(';').next().unwrap_or("");
    line.trim().to_string()
}

/// Split a leading `label:` off a cleaned line.
fn split_label(line: &str) -> (Option<&str>, &str) {
    match line.split_once(':') {
        Some((label, rest)) => (Some(label), rest.trim_start()),
        None => (None, line),
    }
}

/// `Some(args)` when `stmt` is `name` or `name <args>` for the directive.
fn directive_args<'a>(stmt: &'a str, name: &str) -> Option<&'a str> {
    let rest = stmt.strip_prefix(name)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Internal key for a label: local names are suffixed with their scope
/// label so short names can be reused per routine.
fn scoped_key(name: &str, scope: &str) -> String {
    if name.starts_with('.') {
        format!("{name}{scope}")
    } else {
        name.to_string()
    }
}

/// Assemble source text into a ROM image.
///
/// Two passes: the first binds every label and `equ` constant to its value,
/// the second matches each statement against the instruction templates and
/// encodes operands. The first error aborts; no partial label table or ROM
/// escapes.
pub fn assemble(source: &str) -> Result<Vec<u8>, ParseError> {
    let patterns = build_patterns();
    let labels = collect_labels(source, &patterns)?;
    encode_program(source, &patterns, &labels)
}

/// Pass 1: resolve every label and constant to its value.
fn collect_labels(
    source: &str,
    patterns: &[Pattern],
) -> Result<HashMap<String, i64>, ParseError> {
    let mut labels: HashMap<String, i64> = HashMap::new();
    let mut pending: Vec<String> = Vec::new();
    let mut scope = String::new();
    let mut offset = PROGRAM_START as i64;
    let mut line_count = 0;

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        line_count = line_no;

        let line = clean(raw);
        if line.is_empty() {
            continue;
        }

        let (label, stmt) = split_label(&line);
        if let Some(name) = label {
            if RESERVED.contains(&name) {
                return Err(ParseError::new(
                    format!("\"{name}\" is a reserved keyword, it cannot be used as a label"),
                    line_no,
                ));
            }
            if !is_identifier(name) {
                return Err(ParseError::new(
                    format!("label {name} is not a valid identifier"),
                    line_no,
                ));
            }
            if name.starts_with('.') {
                if scope.is_empty() {
                    return Err(ParseError::new(
                        format!("local label {name} must be declared after a global label"),
                        line_no,
                    ));
                }
            } else {
                if labels.contains_key(name) {
                    return Err(ParseError::new(
                        format!("label {name} has already been defined"),
                        line_no,
                    ));
                }
                scope = name.to_string();
            }
            pending.push(scoped_key(name, &scope));
        }

        if stmt.is_empty() {
            continue;
        }

        if match_statement(patterns, stmt).is_some() {
            for name in pending.drain(..) {
                labels.insert(name, offset);
            }
            offset += 2;
        } else if let Some(args) = directive_args(stmt, "db") {
            for name in pending.drain(..) {
                labels.insert(name, offset);
            }
            offset += args.split(',').filter(|t| !t.trim().is_empty()).count() as i64;
        } else if let Some(args) = directive_args(stmt, "equ") {
            let value = args
                .split_whitespace()
                .next()
                .ok_or_else(|| ParseError::new("no value specified for equ", line_no))?;
            let name = pending
                .pop()
                .ok_or_else(|| ParseError::new("equ requires a preceding label", line_no))?;
            let literal = decode_literal(value).ok_or_else(|| {
                ParseError::new(format!("equ value {value} must be a valid literal"), line_no)
            })?;
            labels.insert(name, literal);
        }
    }

    if !pending.is_empty() {
        return Err(ParseError::new("labels touch the end of the code", line_count));
    }

    Ok(labels)
}

/// Pass 2: match and encode every statement.
fn encode_program(
    source: &str,
    patterns: &[Pattern],
    labels: &HashMap<String, i64>,
) -> Result<Vec<u8>, ParseError> {
    let mut rom = Vec::new();
    let mut scope = String::new();

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;

        let line = clean(raw);
        if line.is_empty() {
            continue;
        }

        let (label, stmt) = split_label(&line);
        if let Some(name) = label {
            if !name.starts_with('.') {
                scope = name.to_string();
            }
        }

        if stmt.is_empty() || stmt.starts_with(".sprite") {
            continue;
        }

        if let Some((pattern, operands)) = match_statement(patterns, stmt) {
            let word = encode_word(pattern, &operands, labels, &scope, line_no)?;
            rom.push((word >> 8) as u8);
            rom.push(word as u8);
        } else if let Some(args) = directive_args(stmt, "db") {
            for token in args.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                let value = decode_literal(token).ok_or_else(|| {
                    ParseError::new(format!("malformed operand {token}"), line_no)
                })?;
                rom.push(value as u8);
            }
        } else if directive_args(stmt, "equ").is_none() {
            return Err(ParseError::new("unrecognized instruction or directive", line_no));
        }
    }

    Ok(rom)
}

/// Substitute operand values into a pattern's fixed bits.
fn encode_word(
    pattern: &Pattern,
    operands: &[&str],
    labels: &HashMap<String, i64>,
    scope: &str,
    line_no: usize,
) -> Result<u16, ParseError> {
    let mut word = pattern.info.bits;
    for (&slot, &token) in pattern.slots.iter().zip(operands) {
        match slot {
            Slot::X => word |= (parse_reg(token).unwrap_or(0) as u16) << 8,
            Slot::Y => word |= (parse_reg(token).unwrap_or(0) as u16) << 4,
            Slot::Addr => word |= (resolve_value(token, labels, scope, line_no)? as u16) & 0x0FFF,
            Slot::Byte => word |= (resolve_value(token, labels, scope, line_no)? as u16) & 0x00FF,
            Slot::Nibble => word |= (resolve_value(token, labels, scope, line_no)? as u16) & 0x000F,
            _ => {} // keyword operands carry no bits
        }
    }
    Ok(word)
}

/// Resolve an `addr`/`byte`/`nibble` operand: label reference first, then
/// expression, then literal.
fn resolve_value(
    token: &str,
    labels: &HashMap<String, i64>,
    scope: &str,
    line_no: usize,
) -> Result<i64, ParseError> {
    if is_identifier(token) {
        labels.get(&scoped_key(token, scope)).copied().ok_or_else(|| {
            ParseError::new(format!("label {token} is used but undefined"), line_no)
        })
    } else if is_expression(token) {
        let value = eval_expression(token, labels).ok_or_else(|| {
            ParseError::new(format!("expression {token} is malformed"), line_no)
        })?;
        if value < 0 {
            return Err(ParseError::new(
                "expressions that result in a negative number are not allowed",
                line_no,
            ));
        }
        Ok(value)
    } else {
        decode_literal(token)
            .ok_or_else(|| ParseError::new(format!("malformed literal {token}"), line_no))
    }
}
