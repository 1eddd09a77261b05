//! Structured server-side errors.
//!
//! A [`ServerError`] is what ends up inside an ERR packet: a numeric code,
//! a five character SQL state and a human readable message. Messages for
//! known codes come from the printf-style templates in [`super::codes`].

use std::fmt::{Display, Write};

use thiserror::Error;

use super::codes::{self, DEFAULT_SQL_STATE, ER_UNKNOWN_ERROR};
use crate::error::HandshakeError;

/// Server error reported to the client in an ERR packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("ERROR {number} ({state}): {message}")]
pub struct ServerError {
    number: u16,
    state: String,
    message: String,
}

impl ServerError {
    /// Build an error for `code`, formatting `args` into its template.
    ///
    /// Never fails: codes without a registered SQL state get
    /// [`DEFAULT_SQL_STATE`], codes without a template get their arguments
    /// concatenated.
    ///
    /// The concatenation inserts no separators, not even between two
    /// numbers: `(4242, &[&1, &2])` yields `"12"`. Callers that want spacing
    /// put it in the arguments.
    ///
    /// # Example
    ///
    /// ```
    /// use mysql_handshake::protocol::mysql::{codes, ServerError};
    ///
    /// let err = ServerError::new(codes::ER_BAD_DB_ERROR, &[&"shop"]);
    /// assert_eq!(err.state(), "42000");
    /// assert_eq!(err.message(), "Unknown database 'shop'");
    /// ```
    pub fn new(code: u16, args: &[&dyn Display]) -> Self {
        let state = codes::sql_state(code).unwrap_or(DEFAULT_SQL_STATE);

        let mut message = match codes::message_template(code) {
            Some(template) => format_template(template, args),
            None => args.iter().fold(String::new(), |mut acc, arg| {
                let _ = write!(acc, "{}", arg);
                acc
            }),
        };
        if message.is_empty() {
            message = format!("Unknown error {}", code);
        }

        Self {
            number: code,
            state: state.to_string(),
            message,
        }
    }

    /// Extract the structured error from `err`, or wrap it as `ER_UNKNOWN_ERROR`.
    pub fn from_error(err: &HandshakeError) -> Self {
        match err {
            HandshakeError::Server(e) => e.clone(),
            other => Self::new(ER_UNKNOWN_ERROR, &[other]),
        }
    }

    /// Protocol error number
    pub fn number(&self) -> u16 {
        self.number
    }

    /// Five character SQL state
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Formatted message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Expand a C printf-style template with Display arguments.
///
/// Supports the subset MySQL's message files use: flags (`-` honoured, the
/// rest skipped), width, precision (truncates strings), length modifiers
/// (`l`, `ll`, `h`, `z`) and the conversions `s d i u c x X`. `%%` is a
/// literal percent sign. Missing arguments expand to nothing.
fn format_template(template: &str, args: &[&dyn Display]) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut args = args.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut directive = String::from("%");
        let mut left_align = false;
        while let Some(&flag) = chars.peek() {
            if !matches!(flag, '-' | '+' | ' ' | '#' | '0') {
                break;
            }
            left_align |= flag == '-';
            directive.push(flag);
            chars.next();
        }

        let mut width = 0usize;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            width = width * 10 + d as usize;
            directive.push(chars.next().unwrap_or_default());
        }

        let mut precision = None;
        if chars.peek() == Some(&'.') {
            directive.push('.');
            chars.next();
            let mut p = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                p = p * 10 + d as usize;
                directive.push(chars.next().unwrap_or_default());
            }
            precision = Some(p);
        }

        while let Some(&m) = chars.peek() {
            if !matches!(m, 'l' | 'h' | 'z' | 'j' | 't' | 'L' | 'q') {
                break;
            }
            directive.push(m);
            chars.next();
        }

        match chars.next() {
            Some('%') => out.push('%'),
            Some(conv @ ('s' | 'd' | 'i' | 'u' | 'c' | 'x' | 'X')) => {
                let mut value = args.next().map(|a| a.to_string()).unwrap_or_default();
                if conv == 's' {
                    if let Some(p) = precision {
                        if let Some((idx, _)) = value.char_indices().nth(p) {
                            value.truncate(idx);
                        }
                    }
                }
                let len = value.chars().count();
                let pad = width.saturating_sub(len);
                if left_align {
                    out.push_str(&value);
                    out.extend(std::iter::repeat(' ').take(pad));
                } else {
                    out.extend(std::iter::repeat(' ').take(pad));
                    out.push_str(&value);
                }
            }
            Some(other) => {
                directive.push(other);
                out.push_str(&directive);
            }
            None => out.push_str(&directive),
        }
    }

    out
}

impl From<&HandshakeError> for ServerError {
    fn from(err: &HandshakeError) -> Self {
        Self::from_error(err)
    }
}
