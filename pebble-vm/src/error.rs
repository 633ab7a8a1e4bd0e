//! Error types for every pebble-vm subsystem.
//!
//! Splits a narrow recoverable error from a broader fatal one:
//! [`MemoryError`] and [`CompileError`] are always recoverable from the
//! caller's point of view
//! (a compile error discards one method and keeps going; a memory error at
//! the primitive level becomes a `nil` return or a retried send), while
//! [`InterpreterError`] is what the runtime loop surfaces for a fatal,
//! process-terminating condition.

use pebble_types::Ref;

/// Errors raised by the object table.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum MemoryError {
    /// The object table has no free or unused slot left.
    #[error("object table exhausted")]
    OutOfSlots,
    /// The requested allocation size does not fit the signed size field.
    #[error("allocation of {requested} fields/bytes exceeds the {max} limit")]
    TooLarge {
        /// Requested element count.
        requested: usize,
        /// Maximum representable size.
        max: usize,
    },
    /// A boxed-reference operation was attempted on a tagged small integer.
    #[error("{0:?} is a small integer, not an object table reference")]
    NotBoxed(Ref),
    /// A boxed reference named a table index that has no live slot.
    #[error("reference {0:?} does not name a live object")]
    NotLive(Ref),
    /// A field index fell outside an object's declared size.
    #[error("index {index} out of range for object of size {len}")]
    IndexOutOfRange {
        /// Index that was requested (1-based).
        index: usize,
        /// Declared length of the object's memory.
        len: usize,
    },
    /// A pointer operation was attempted on a byte object, or vice versa.
    #[error("expected a {expected} object")]
    WrongShape {
        /// `"pointer"` or `"byte"`.
        expected: &'static str,
    },
    /// The image stream was malformed.
    #[error("corrupt image: {0}")]
    CorruptImage(String),
    /// Image I/O failed at the host level.
    #[error("image I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for MemoryError {
    fn from(e: std::io::Error) -> Self {
        MemoryError::Io(e.to_string())
    }
}

/// Errors raised by the lexer/parser.
///
/// A `CompileError` is never fatal to the running VM: the offending method
/// is discarded and parsing of the next chunk continues, matching
/// `original_source/src/parser.c`'s `compilError`/`compilWarn` behavior.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum CompileError {
    /// A syntax error at a specific source location.
    #[error("{context}: {message}")]
    Syntax {
        /// Human-facing description, e.g. method selector or class name.
        context: String,
        /// What went wrong.
        message: String,
    },
    /// One of the hard per-method limits was exceeded.
    #[error("{limit} limit ({max}) exceeded")]
    LimitExceeded {
        /// Name of the exceeded limit.
        limit: &'static str,
        /// The limit's value.
        max: usize,
    },
    /// A name was referenced that isn't a known instance variable,
    /// temporary, argument, or global.
    #[error("undeclared variable `{0}`")]
    UndeclaredVariable(String),
    /// The object table ran out of room while building a literal, a
    /// class's instance-variable scope, or the final bytecode/literal
    /// objects.
    #[error("{0}")]
    Memory(#[from] MemoryError),
}

/// Fatal interpreter conditions: exhausted memory, corrupt image,
/// unreachable interpreter state, or a second
/// `message:notRecognizedWithArguments:` miss. These terminate the host
/// process with a short/long message pair.
#[derive(Debug, thiserror::Error, Clone)]
pub enum InterpreterError {
    /// The object memory signalled a fatal condition.
    #[error("{0}")]
    Memory(#[from] MemoryError),
    /// Any other unrecoverable condition, carried as a short/long message
    /// pair.
    #[error("{short}: {long}")]
    Fatal {
        /// Short diagnostic, e.g. `"can't find"`.
        short: String,
        /// Longer detail, e.g. `"error recovery method"`.
        long: String,
    },
}

impl InterpreterError {
    /// Build a [`InterpreterError::Fatal`] from a short/long message pair,
    /// matching the source's `sysError`/`sysWarn` call shape.
    pub fn fatal(short: impl Into<String>, long: impl Into<String>) -> Self {
        InterpreterError::Fatal {
            short: short.into(),
            long: long.into(),
        }
    }
}
