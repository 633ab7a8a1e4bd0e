//! Primitive numbering, the ABI exposed through the `<number ...>` compiler
//! syntax and `DoPrimitive`.
//!
//! New primitives must be assigned fresh numbers; retired numbers are never
//! reused.

/// A primitive operation number, as carried by `DoPrimitive`'s trailing
/// byte and the `<number ...>` source syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Primitive(pub u8);

impl Primitive {
    /// Toggle interpreter watch mode.
    pub const TOGGLE_WATCH: Primitive = Primitive(5);
    /// Return the class of an object.
    pub const CLASS_OF: Primitive = Primitive(11);
    /// Identity (`==`) comparison.
    pub const IDENTITY_EQUALS: Primitive = Primitive(21);
    /// `basicAt:`.
    pub const BASIC_AT: Primitive = Primitive(25);
    /// `basicAt:put:`.
    pub const BASIC_AT_PUT: Primitive = Primitive(31);
    /// Block creation: binds a freshly allocated Block to the current
    /// context.
    pub const BLOCK_CREATE: Primitive = Primitive(29);
    /// Set the process time-slice counter.
    pub const SET_TIME_SLICE: Primitive = Primitive(53);
    /// Allocate a pointer object of the given size.
    pub const ALLOC_OBJECT: Primitive = Primitive(58);
    /// Look up a global by symbol name.
    pub const GLOBAL_SYMBOL_VALUE: Primitive = Primitive(87);
    /// Host `system()` escape.
    pub const SYSTEM_CALL: Primitive = Primitive(150);

    /// Open a file, given a name and a mode string: `<120 name mode>`.
    pub const IO_OPEN: Primitive = Primitive(120);
    /// Close a previously opened file.
    pub const IO_CLOSE: Primitive = Primitive(121);
    /// Report a file's size in bytes.
    pub const IO_SIZE: Primitive = Primitive(122);
    /// File in (parse) the contents of an opened file.
    pub const IO_FILE_IN: Primitive = Primitive(123);
    /// Read a single character from an opened file (unimplemented, per
    /// `original_source/src/unixio.c`).
    pub const IO_GET_CHAR: Primitive = Primitive(124);
    /// Read a line from an opened file as a String.
    pub const IO_GET_STRING: Primitive = Primitive(125);
    /// Serialize the image to an opened file.
    pub const IO_WRITE_IMAGE: Primitive = Primitive(127);
    /// Print the receiver without a trailing newline.
    pub const IO_PRINT_NO_RETURN: Primitive = Primitive(128);
    /// Print the receiver's string representation.
    pub const IO_PRINT_STRING: Primitive = Primitive(129);

    /// Lowest integer-arithmetic/comparison fast-path primitive number.
    pub const INTEGER_ARITH_BASE: u8 = 60;
    /// Highest integer-arithmetic/comparison fast-path primitive number.
    pub const INTEGER_ARITH_MAX: u8 = 79;
    /// Lowest file/image I/O primitive number.
    ///
    /// The image-builder's file-in expression (`<120 ...>`, `<123 1>`,
    /// `<121 1>`) fixes the concrete numbering: this follows the case
    /// order in `original_source/src/unixio.c`'s `ioPrimitive` dispatch
    /// (`120 + case`), which that expression is consistent with. See
    /// `DESIGN.md`.
    pub const IO_BASE: u8 = 100;
    /// Highest file/image I/O primitive number.
    pub const IO_MAX: u8 = 149;
    /// Lowest system-escape primitive number.
    pub const SYSTEM_BASE: u8 = 150;

    /// True if this primitive is one of the `60..=79` integer fast paths
    /// invoked implicitly by `SendBinary`, where a `nil` return means
    /// "overflow or coercion failed, retry as a normal send".
    pub const fn is_integer_fast_path(self) -> bool {
        self.0 >= Self::INTEGER_ARITH_BASE && self.0 <= Self::INTEGER_ARITH_MAX
    }

    /// True if this primitive is a file/image I/O primitive.
    pub const fn is_io(self) -> bool {
        self.0 >= Self::IO_BASE && self.0 <= Self::IO_MAX
    }

    /// True if this primitive is a system-escape primitive.
    pub const fn is_system(self) -> bool {
        self.0 >= Self::SYSTEM_BASE
    }
}

impl From<u8> for Primitive {
    fn from(n: u8) -> Self {
        Primitive(n)
    }
}

impl From<Primitive> for u8 {
    fn from(p: Primitive) -> Self {
        p.0
    }
}
