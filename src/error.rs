//! Runtime interpreter error implementation

use std::fmt;

use thiserror::Error;

/// One captured call-stack frame in an error snapshot.
///
/// `depth` is the logical depth counted from the outermost call, so the
/// root frame always reports `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackNode {
    /// Identifier table index of the called alias.
    pub ident: usize,
    /// Logical depth from the outermost call.
    pub depth: usize,
}

/// User-facing script error: a formatted message plus a snapshot of the
/// call stack at the point the error was raised.
///
/// The snapshot holds at most `dbgalias` frames; when the live stack was
/// deeper, [`CsError::gap`] reports that frames were elided between the
/// captured top and the root.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CsError {
    message: String,
    stack: Vec<StackNode>,
    gap: bool,
}

impl CsError {
    pub(crate) fn new(message: String, stack: Vec<StackNode>, gap: bool) -> Self {
        Self { message, stack, gap }
    }

    /// Error constructed outside any interpreter context; the stack
    /// snapshot is empty.
    pub fn bare(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: Vec::new(),
            gap: false,
        }
    }

    /// The formatted error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The captured call-stack snapshot, innermost frame first.
    pub fn stack(&self) -> &[StackNode] {
        &self.stack
    }

    /// Whether frames were elided from the snapshot.
    pub const fn gap(&self) -> bool {
        self.gap
    }
}

impl From<ParseError> for CsError {
    fn from(e: ParseError) -> Self {
        Self::bare(e.to_string())
    }
}

/// Lexical errors raised by the shared string/word scanners and the
/// list micro-parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A double-quoted string ran into a line break or end of input.
    #[error("unfinished string '{0}'")]
    UnfinishedString(String),
    /// A bracketed group was not closed.
    #[error("missing \"{0}\"")]
    MissingBracket(char),
    /// A closing bracket appeared where none was open.
    #[error("unexpected \"{0}\"")]
    Unexpected(char),
    /// A `\` line continuation was not followed by CR or LF.
    #[error("invalid line break")]
    InvalidLineBreak,
    /// A block substitution used more `@`s than there are enclosing
    /// brackets.
    #[error("too many @s")]
    TooManyAts,
}

/// Invariant violations inside the interpreter itself. These are never
/// produced by user scripts; hitting one means the bytecode stream or
/// the identifier table is corrupt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    /// An instruction word decoded to an opcode outside the known set.
    #[error("malformed bytecode: unknown opcode {0:#x}")]
    UnknownOpcode(u32),
    /// An instruction referenced an identifier index past the table.
    #[error("malformed bytecode: ident index {0} out of range")]
    IdentIndex(usize),
    /// An instruction expected a different identifier kind than the
    /// table holds at that index.
    #[error("malformed bytecode: ident {0} has the wrong kind")]
    IdentKind(usize),
    /// The value stack did not hold the operands an instruction needs.
    #[error("malformed bytecode: value stack underflow")]
    StackUnderflow,
    /// Execution ran off the end of a block without hitting `Exit`.
    #[error("malformed bytecode: code overrun")]
    CodeOverrun,
}

/// Non-local transfer used throughout the VM and native commands.
///
/// Errors unwind to the nearest `pcall` or the embedder; `Break` and
/// `Continue` unwind to the nearest loop driver. Loop control never
/// crosses a loop driver boundary: drivers translate it, and the
/// `break`/`continue` instructions refuse to fire when no loop runs.
#[derive(Debug)]
pub enum Signal {
    /// A user-level script error.
    Error(CsError),
    /// An interpreter invariant violation.
    Internal(InternalError),
    /// `break` unwinding to the enclosing loop driver.
    Break,
    /// `continue` unwinding to the enclosing loop driver.
    Continue,
}

impl Signal {
    /// Collapse into a user error at an embedder boundary. Loop control
    /// reaching here means a loop driver contract was violated.
    pub fn into_error(self) -> CsError {
        match self {
            Signal::Error(e) => e,
            Signal::Internal(e) => CsError::bare(e.to_string()),
            Signal::Break => CsError::bare("no loop to break"),
            Signal::Continue => CsError::bare("no loop to continue"),
        }
    }
}

impl From<CsError> for Signal {
    fn from(e: CsError) -> Self {
        Signal::Error(e)
    }
}

impl From<InternalError> for Signal {
    fn from(e: InternalError) -> Self {
        Signal::Internal(e)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Error(e) => e.fmt(f),
            Signal::Internal(e) => e.fmt(f),
            Signal::Break => f.write_str("break"),
            Signal::Continue => f.write_str("continue"),
        }
    }
}

/// Result alias for embedder-facing entry points.
pub type CsResult<T> = Result<T, CsError>;

/// Result alias for VM-internal paths where loop control may travel.
pub type RunResult<T> = Result<T, Signal>;
