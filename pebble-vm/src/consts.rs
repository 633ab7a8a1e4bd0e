//! VM-wide limits and well-known field offsets.

/// Largest magnitude a signed `size` field may hold (both wire profiles
/// share a 16-bit `size_int`).
pub const MAX_OBJECT_SIZE: usize = i16::MAX as usize;

/// Method cache bucket count.
pub const METHOD_CACHE_SIZE: usize = 211;

/// Default method-dictionary bucket count.
pub const DEFAULT_METHOD_DICT_BUCKETS: usize = 39;

/// Root symbol table bucket count: 3 × 53 triples.
pub const SYMBOL_TABLE_BUCKETS: usize = 3 * 53;

/// Hard per-method limits.
pub mod method_limits {
    /// Maximum bytecode stream length, in bytes.
    pub const MAX_BYTECODES: usize = 256;
    /// Maximum literal pool entries.
    pub const MAX_LITERALS: usize = 128;
    /// Maximum temporaries (incl. block-nested).
    pub const MAX_TEMPORARIES: usize = 32;
    /// Maximum arguments.
    pub const MAX_ARGUMENTS: usize = 32;
    /// Maximum direct (non-inherited) instance variables.
    pub const MAX_INSTANCE_VARS: usize = 32;
}

/// 1-based field offsets for the well-known `Class` shape.
pub mod class_fields {
    /// Class name (a Symbol).
    pub const NAME: usize = 1;
    /// Declared instance size.
    pub const INSTANCE_SIZE: usize = 2;
    /// Method dictionary.
    pub const METHODS: usize = 3;
    /// Superclass reference.
    pub const SUPERCLASS: usize = 4;
    /// Array of instance variable name symbols.
    pub const VARIABLE_NAMES: usize = 5;
    /// Declared object size.
    pub const SIZE: usize = 5;
}

/// 1-based field offsets for the well-known `Method` shape.
pub mod method_fields {
    /// Source text (a String), optional.
    pub const TEXT: usize = 1;
    /// Selector symbol.
    pub const SELECTOR: usize = 2;
    /// Bytecode byte array.
    pub const BYTECODES: usize = 3;
    /// Literal pool array (or nil if empty).
    pub const LITERALS: usize = 4;
    /// Declared operand-stack size.
    pub const STACK_SIZE: usize = 5;
    /// Declared temporary-slot count.
    pub const TEMPORARY_SIZE: usize = 6;
    /// Owning class reference (used by `SendToSuper`).
    pub const METHOD_CLASS: usize = 7;
    /// Watch flag.
    pub const WATCH: usize = 8;
    /// Declared object size.
    pub const SIZE: usize = 8;
}

/// 1-based field offsets for the well-known `Context` shape.
///
/// Carries three fields beyond the ones `PushInstance`/`AssignInstance` ever
/// address directly (`BYTE_OFFSET`, `RETURN_POINT`, `HOME`): a reified frame
/// must be independently resumable once its stack-resident original has been
/// overwritten by later sends, so it needs its own resume offset and operand
/// stack base, not just the captured arguments/temporaries; and a block
/// activation's context needs a way back to the enclosing method activation
/// for a non-local `^` to unwind to directly.
pub mod context_fields {
    /// Saved link pointer (the frame this one returns control to).
    pub const LINK_PTR: usize = 1;
    /// Owning method.
    pub const METHOD: usize = 2;
    /// Captured arguments array.
    pub const ARGUMENTS: usize = 3;
    /// Captured temporaries array.
    pub const TEMPORARIES: usize = 4;
    /// Bytecode offset to resume at.
    pub const BYTE_OFFSET: usize = 5;
    /// Operand-stack base this frame's evaluation resumes from.
    pub const RETURN_POINT: usize = 6;
    /// For a block activation, the enclosing method activation's own
    /// context — the non-local `^` target. `nil` for every other context
    /// (an ordinary reified method frame is its own non-local-return home).
    pub const HOME: usize = 7;
    /// Declared object size.
    pub const SIZE: usize = 7;
}

/// 1-based field offsets for the well-known `Block` shape.
pub mod block_fields {
    /// Creating context.
    pub const CONTEXT: usize = 1;
    /// Declared argument count.
    pub const ARGUMENT_COUNT: usize = 2;
    /// Index into temporaries where the first block argument lands.
    pub const ARGUMENT_LOCATION: usize = 3;
    /// Bytecode offset where the block body begins.
    pub const BYTECODE_OFFSET: usize = 4;
    /// Minimum declared object size.
    pub const SIZE: usize = 4;
}

/// 1-based field offsets for the well-known `Process` shape.
pub mod process_fields {
    /// Stack array.
    pub const STACK: usize = 1;
    /// Current stack-top index (1-based).
    pub const STACK_TOP: usize = 2;
    /// Current link pointer.
    pub const LINK_PTR: usize = 3;
    /// Declared object size.
    pub const SIZE: usize = 3;
}

/// The single field offset of the well-known `Dictionary` shape (a
/// hash-bucket array of key/value/link triples).
pub mod dictionary_fields {
    /// The bucket array.
    pub const BUCKETS: usize = 1;
    /// Declared object size.
    pub const SIZE: usize = 1;
}

/// Field offsets within one 3-field dictionary chain link.
pub mod link_fields {
    /// Key.
    pub const KEY: usize = 1;
    /// Value.
    pub const VALUE: usize = 2;
    /// Next link in the chain (or `nil`).
    pub const NEXT: usize = 3;
    /// Declared object size.
    pub const SIZE: usize = 3;
}

/// Number of linkage-header slots written onto the process stack for every
/// non-reified call frame: previous-link, context-or-nil,
/// return-point, method, bytecode-offset.
pub const LINKAGE_HEADER_SIZE: usize = 5;

/// Minimum process-stack growth increment (`original_source/src/interp.c`'s
/// `growProcessStack`).
pub const STACK_GROWTH_CUSHION: usize = 100;

/// Process stack size above which a runaway loop is assumed and the
/// time-slice is forced to zero (`original_source/src/interp.c`).
pub const RUNAWAY_STACK_THRESHOLD: usize = 1800;
