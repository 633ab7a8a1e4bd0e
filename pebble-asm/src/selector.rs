//! Fixed-order selector tables consumed by `SendUnary`/`SendBinary`.
//!
//! The order here is part of the instruction ABI: `SendUnary(i)` and
//! `SendBinary(i)` name a selector purely by position in these arrays, so
//! `pebble-vm`'s symbol registry must intern them in exactly this order
//! during `initCommonSymbols`. The original C sources kept
//! these tables in a `names.c` that was not retrievable alongside
//! `interp.c`/`parser.c`; the order below is reconstructed from the
//! constraints that are on record: `interp.c`'s fast path special-cases
//! `isNil`/`notNil` at indices 0/1, and special-cases `SendBinary` indices
//! 0..=12 as arithmetic primitives `60..=72`. See `DESIGN.md`.

/// Selectors addressable by `SendUnary`'s operand, in ABI order.
///
/// Indices 0 and 1 (`isNil`, `notNil`) are special-cased by the interpreter
/// even outside primitive dispatch.
pub const UNARY_SELECTORS: &[&str] = &[
    "isNil",
    "notNil",
    "value",
    "new",
    "class",
    "printString",
    "yourself",
    "size",
    "hash",
    "negated",
];

/// Selectors addressable by `SendBinary`'s operand, in ABI order.
///
/// Indices 0..=12 double as the optimized integer fast path: `SendBinary(i)`
/// for `i <= 12` first tries primitive `60 + i` before falling back to an
/// ordinary send.
pub const BINARY_SELECTORS: &[&str] = &[
    "+", "-", "<", ">", "<=", ">=", "=", "~=", "*", "/", "\\\\", "bitAnd:", "bitOr:",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_fast_path_covers_exactly_thirteen_selectors() {
        assert_eq!(BINARY_SELECTORS.len(), 13);
    }

    #[test]
    fn unary_fast_path_starts_with_nil_predicates() {
        assert_eq!(UNARY_SELECTORS[0], "isNil");
        assert_eq!(UNARY_SELECTORS[1], "notNil");
    }
}
