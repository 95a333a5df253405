//! Error taxonomy and the fixed-capacity error message for pocketjs.

use std::fmt;

/// Implemented by error enums that carry a short human label.
pub trait AsStr {
    fn as_str(&self) -> &'static str;
}

/// The category of an evaluation error.
///
/// All errors share a single `Err` value kind; the category is kept alongside
/// the message in the runtime so hosts can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unexpected token, unterminated string or comment.
    Syntax,
    /// Identifier not found in any enclosing scope.
    Reference,
    /// Operator applied to incompatible operand kinds.
    Type,
    /// Arena exhausted, recursion guard tripped, oversized input.
    Resource,
    /// Division by zero, bad assignment target, misplaced `return`/`break`/`continue`,
    /// redeclaration.
    Semantic,
}

impl AsStr for ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Reference => "reference error",
            ErrorKind::Type => "type error",
            ErrorKind::Resource => "resource error",
            ErrorKind::Semantic => "semantic error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const ERROR_CAPACITY: usize = 64;

/// Last error raised by the runtime. Writes past the capacity are dropped.
#[derive(Clone)]
pub struct ErrorMessage {
    buf: [u8; ERROR_CAPACITY],
    len: usize,
    kind: Option<ErrorKind>,
}

impl ErrorMessage {
    pub const fn new() -> Self {
        ErrorMessage { buf: [0; ERROR_CAPACITY], len: 0, kind: None }
    }

    pub fn set(&mut self, kind: ErrorKind, args: fmt::Arguments<'_>) {
        self.len = 0;
        self.kind = Some(kind);
        // Truncation is reported as fmt::Error by write_str; the prefix that fit is kept.
        let _ = fmt::write(self, args);
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        match std::str::from_utf8(&self.buf[..self.len]) {
            Ok(s) => s,
            Err(e) => std::str::from_utf8(&self.buf[..e.valid_up_to()]).unwrap_or_default(),
        }
    }
}

impl Default for ErrorMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for ErrorMessage {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = ERROR_CAPACITY - self.len;
        if s.len() <= room {
            self.buf[self.len..self.len + s.len()].copy_from_slice(s.as_bytes());
            self.len += s.len();
            return Ok(());
        }
        let mut cut = room;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.buf[self.len..self.len + cut].copy_from_slice(&s.as_bytes()[..cut]);
        self.len += cut;
        Err(fmt::Error)
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorMessage")
            .field("kind", &self.kind)
            .field("msg", &self.as_str())
            .finish()
    }
}

/// Engine creation failures. These are precondition violations, not script errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateError {
    BufferTooSmall { min: usize, actual: usize },
    BufferTooLarge { max: usize, actual: usize },
}

impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateError::BufferTooSmall { min, actual } => {
                write!(f, "memory buffer too small: need at least {min} bytes, got {actual}")
            }
            CreateError::BufferTooLarge { max, actual } => {
                write!(f, "memory buffer too large: at most {max} bytes, got {actual}")
            }
        }
    }
}

impl std::error::Error for CreateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_truncates_at_capacity() {
        let mut msg = ErrorMessage::new();
        let long = "x".repeat(200);
        msg.set(ErrorKind::Reference, format_args!("'{long}' not found"));
        assert_eq!(msg.as_str().len(), ERROR_CAPACITY);
        assert!(msg.as_str().starts_with("'xxx"));
        assert_eq!(msg.kind(), Some(ErrorKind::Reference));
    }

    #[test]
    fn message_keeps_char_boundaries() {
        let mut msg = ErrorMessage::new();
        let s = "é".repeat(40);
        msg.set(ErrorKind::Syntax, format_args!("{s}"));
        assert_eq!(msg.as_str().chars().count(), ERROR_CAPACITY / 2);
    }

    #[test]
    fn kind_labels() {
        assert_eq!(ErrorKind::Resource.as_str(), "resource error");
        assert_eq!(ErrorKind::Type.to_string(), "type error");
    }
}
