//! Parse errors
//!
//! Every failure surfaces from `pull` as a single [`ParseError`]: a kind,
//! a message, the position of the next unconsumed character and a short
//! snippet of the input at that point.

use std::fmt;
use thiserror::Error;

/// Location in the decoded input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Characters consumed before this point
    pub offset: usize,
    /// 1-based line number
    pub line: usize,
    /// 1-based column, in characters
    pub column: usize,
}

impl Position {
    pub(crate) fn start() -> Self {
        Position { offset: 0, line: 1, column: 1 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// What went wrong
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// End tag does not close the innermost open element
    #[error("{}", mismatch(.expected, .found))]
    MismatchedEndTag {
        expected: Option<String>,
        found: String,
    },
    /// `<!DOCTYPE` without a root element name
    #[error("DOCTYPE is missing a name")]
    MissingDoctypeName,
    /// Unparsed residue left inside a start tag after attribute extraction
    #[error("error parsing attributes: excess = \"{residue}\"")]
    MalformedAttributes { residue: String },
    /// `<!` with no closing `>`
    #[error("Malformed node")]
    MalformedNode,
    /// Markup declaration outside the DTD internal subset
    #[error("Declarations can only occur in the doctype declaration")]
    MisplacedDeclaration,
    /// Content inside the internal subset that is not a declaration
    #[error("Unrecognized content in the doctype declaration")]
    UnrecognizedDeclaration,
    #[error("Bad ATTLIST declaration")]
    MalformedAttlist,
    #[error("error parsing notation: no matching pattern")]
    MalformedNotation,
    #[error("Bad ENTITY declaration")]
    MalformedEntity,
    /// `<` not followed by a valid tag head
    #[error("malformed XML: missing tag start")]
    MalformedTag,
    #[error("malformed XML: bad end tag")]
    MalformedEndTag,
    /// Input ended inside a construct
    #[error("Unterminated {construct}")]
    Unterminated { construct: &'static str },
    /// The text production matched nothing where text was expected
    #[error("no text to add")]
    EmptyText,
    /// Failure from a lower layer (I/O, decoding)
    #[error("Exception parsing")]
    Wrapped,
}

fn mismatch(expected: &Option<String>, found: &str) -> String {
    match expected {
        Some(expected) => format!("Missing end tag for '{}' (got \"{}\")", expected, found),
        None => format!("Unexpected end tag '{}' with no open element", found),
    }
}

/// Error returned by the pull parser
#[derive(Debug, Error)]
#[error("{message} at {position}")]
pub struct ParseError {
    pub kind: ErrorKind,
    pub message: String,
    pub position: Position,
    /// Start of the unconsumed input where parsing stopped
    pub context: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

/// Maximum characters of input kept in [`ParseError::context`]
const CONTEXT_CHARS: usize = 40;

impl ParseError {
    pub fn new(kind: ErrorKind, position: Position, input: &str) -> Self {
        ParseError {
            message: kind.to_string(),
            kind,
            position,
            context: input.chars().take(CONTEXT_CHARS).collect(),
            cause: None,
        }
    }

    /// Wrap a lower-level failure
    pub fn wrap<E>(cause: E, position: Position, input: &str) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut error = ParseError::new(ErrorKind::Wrapped, position, input);
        error.message = format!("{}: {}", error.message, cause);
        error.cause = Some(Box::new(cause));
        error
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

/// Failures from the input layer
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error reading input: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported encoding '{0}'")]
    UnknownEncoding(String),
}

/// Internal failure, converted to [`ParseError`] at the `pull` boundary
#[derive(Debug)]
pub(crate) enum Fault {
    Structural(ErrorKind),
    Source(SourceError),
}

impl From<ErrorKind> for Fault {
    fn from(kind: ErrorKind) -> Self {
        Fault::Structural(kind)
    }
}

impl From<SourceError> for Fault {
    fn from(error: SourceError) -> Self {
        Fault::Source(error)
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_message_names_both_tags() {
        let kind = ErrorKind::MismatchedEndTag {
            expected: Some("a".to_string()),
            found: "b".to_string(),
        };
        let err = ParseError::new(kind, Position::start(), "</b>");
        assert!(err.message.contains("'a'"));
        assert!(err.message.contains("\"b\""));
        assert_eq!(err.to_string(), "Missing end tag for 'a' (got \"b\") at line 1, column 1");
    }

    #[test]
    fn test_kind_displays_on_its_own() {
        let kind = ErrorKind::MismatchedEndTag {
            expected: None,
            found: "b".to_string(),
        };
        assert_eq!(kind.to_string(), "Unexpected end tag 'b' with no open element");
        assert_eq!(
            ErrorKind::Unterminated { construct: "comment" }.to_string(),
            "Unterminated comment"
        );
        assert_eq!(
            ErrorKind::MalformedAttributes { residue: "y".to_string() }.to_string(),
            "error parsing attributes: excess = \"y\""
        );
    }

    #[test]
    fn test_context_is_truncated() {
        let input = "x".repeat(100);
        let err = ParseError::new(ErrorKind::MalformedTag, Position::start(), &input);
        assert_eq!(err.context.len(), CONTEXT_CHARS);
    }

    #[test]
    fn test_wrapped_keeps_cause() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = ParseError::wrap(SourceError::from(io), Position::start(), "");
        assert_eq!(err.kind(), &ErrorKind::Wrapped);
        assert!(err.source().is_some());
        assert!(err.message.contains("disk gone"));
    }
}
