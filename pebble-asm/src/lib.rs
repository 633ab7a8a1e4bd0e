//! The pebble bytecode instruction set: a packed nibble-pair encoding with a
//! single extended-prefix escape.
//!
//! This crate owns the instruction ABI (opcode numbering, the extended
//! prefix, the fixed order of the inline unary/binary selector tables, the
//! primitive-number ranges): the opcode table here is a contract shared by
//! the compiler and the interpreter and must not be renumbered casually.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bytecode;
mod primitive;
mod selector;

pub use bytecode::{Bytecode, Constant, DecodeError, Special};
pub use primitive::Primitive;
pub use selector::{BINARY_SELECTORS, UNARY_SELECTORS};
