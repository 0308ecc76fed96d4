//! Error taxonomy shared by the lexer, parser, compiler and VM.
//!
//! Engine failures are values, never host panics: fallible paths return
//! [`RunResult`] and the VM converts any `Err` into an exception cell that
//! unwinds through the error frames of the running program. The host-facing
//! [`Exception`] type carries the rendered message, the typed tag and the
//! stack snapshot captured at raise time.

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::lexer::Position;

/// Result type alias for operations that can produce a runtime error.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// Typed failure kinds that cross the native/script boundary in both
/// directions.
///
/// The string representation matches the variant name exactly, which is also
/// the `name` property of the corresponding script-level error object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
pub enum ErrorKind {
    /// Lexer/parser contract violations. Surfaced synchronously and never
    /// re-thrown by the VM.
    SyntaxError,
    /// Calling a non-callable, iterating a non-iterable, const reassignment,
    /// bad coercions, assignment to a non-lvalue.
    TypeError,
    /// Lookup of an undeclared name, use of an uninitialized `let`/`const`
    /// binding, `delete` of an identifier.
    ReferenceError,
    RangeError,
    URIError,
    AggregateError,
    /// Host programming bug. The only kind that may surface as a host error
    /// instead of a script exception.
    InternalError,
}

/// Source coordinates attached to diagnostics.
///
/// The filename is an index into the runtime's filename table so that stack
/// frames stay cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeLoc {
    pub filename: u32,
    pub line: u32,
    pub column: u32,
}

/// One entry of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub filename: u32,
    pub line: u32,
    pub column: u32,
    pub funcname: String,
}

/// Internal error value used on engine paths.
///
/// `Raise` carries a typed failure created on the native side; `Thrown`
/// carries a cell already living on the heap (a script `throw` crossing a
/// native boundary). Both are turned into exception cells by the VM loop.
#[derive(Debug, Clone)]
pub(crate) enum RunError {
    Raise {
        kind: ErrorKind,
        message: String,
        loc: Option<CodeLoc>,
    },
    Thrown(crate::heap::CellId),
}

impl RunError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Raise {
            kind,
            message: message.into(),
            loc: None,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReferenceError, message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RangeError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }
}

/// A parse failure with enough context to render a caret diagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxError {
    pub message: String,
    pub filename: String,
    pub position: Position,
    /// Two-line rendering of the offending source line with a `^` marker.
    pub context: String,
}

impl SyntaxError {
    /// Builds a syntax error at `position`, rendering the offending line of
    /// `source` with a caret under the failing column.
    pub fn new(message: impl Into<String>, filename: &str, source: &str, position: Position) -> Self {
        Self {
            message: message.into(),
            filename: filename.to_owned(),
            position,
            context: render_context(source, position),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SyntaxError: {} ({}:{}:{})\n{}",
            self.message,
            self.filename,
            self.position.line + 1,
            self.position.column + 1,
            self.context
        )
    }
}

impl std::error::Error for SyntaxError {}

/// Renders the source line containing `position` followed by a caret line
/// pointing at the failing column.
fn render_context(source: &str, position: Position) -> String {
    let line = source.lines().nth(position.line as usize).unwrap_or("");
    let mut out = String::with_capacity(line.len() * 2 + 2);
    out.push_str(line);
    out.push('\n');
    for (index, ch) in line.chars().enumerate() {
        if index as u32 >= position.column {
            break;
        }
        // Keep tabs so the caret lines up under tabulated source.
        out.push(if ch == '\t' { '\t' } else { ' ' });
    }
    out.push('^');
    out
}

/// Host-facing exception: the typed tag, the message, and the call frames
/// that were live when the exception was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    pub kind: ErrorKind,
    pub message: String,
    pub loc: Option<CodeLoc>,
    pub frames: Vec<StackFrame>,
    /// Filenames referenced by `loc` and `frames`, indexed by filename id.
    pub filenames: Vec<String>,
}

impl Exception {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            loc: None,
            frames: Vec::new(),
            filenames: Vec::new(),
        }
    }

    fn filename(&self, id: u32) -> &str {
        self.filenames.get(id as usize).map_or("<unknown>", String::as_str)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for frame in self.frames.iter().rev() {
            let mut rendered = String::new();
            write!(
                rendered,
                "\n    at {} ({}:{}:{})",
                frame.funcname,
                self.filename(frame.filename),
                frame.line,
                frame.column
            )?;
            f.write_str(&rendered)?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}

impl From<SyntaxError> for Exception {
    fn from(err: SyntaxError) -> Self {
        let message = format!(
            "{} ({}:{}:{})",
            err.message,
            err.filename,
            err.position.line + 1,
            err.position.column + 1
        );
        Self::new(ErrorKind::SyntaxError, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_round_trips_through_strum() {
        assert_eq!(ErrorKind::TypeError.to_string(), "TypeError");
        assert_eq!("RangeError".parse::<ErrorKind>().unwrap(), ErrorKind::RangeError);
    }

    #[test]
    fn caret_lands_under_failing_column() {
        let source = "let x = @;\n";
        let err = SyntaxError::new(
            "Invalid or unexpected token",
            "test.js",
            source,
            Position {
                line: 0,
                column: 8,
                offset: 8,
            },
        );
        assert_eq!(err.context, "let x = @;\n        ^");
    }

    #[test]
    fn exception_renders_frames_innermost_first() {
        let exc = Exception {
            kind: ErrorKind::TypeError,
            message: "x is not a function".to_owned(),
            loc: None,
            frames: vec![
                StackFrame {
                    filename: 0,
                    line: 1,
                    column: 1,
                    funcname: "<module>".to_owned(),
                },
                StackFrame {
                    filename: 0,
                    line: 3,
                    column: 5,
                    funcname: "inner".to_owned(),
                },
            ],
            filenames: vec!["test.js".to_owned()],
        };
        let rendered = exc.to_string();
        let inner = rendered.find("inner").unwrap();
        let module = rendered.find("<module>").unwrap();
        assert!(inner < module);
    }
}
