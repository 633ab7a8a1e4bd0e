//! Primitive dispatch: the host-level operations `DoPrimitive` and the
//! `SendBinary` integer fast path invoke directly, without a Smalltalk
//! method lookup (grounded on `original_source/src/unixio.c`'s
//! `ioPrimitive`).

use std::fs::File;
use std::io::{Read, Write};

use pebble_asm::Primitive;
use pebble_types::Ref;

use crate::consts::block_fields;
use crate::constructors::Constructors;
use crate::error::{InterpreterError, MemoryError};
use crate::interpreter::cache::MethodCache;
use crate::memory::Memory;
use crate::symbol::SymbolTable;

/// `unixio.c`'s `MAXFILES`: the fixed number of simultaneously open file
/// slots the `IO_*` primitives address by 1-based index.
pub const MAX_FILES: usize = 20;

enum FileSlot {
    Stdin,
    Stdout,
    Stderr,
    File(File),
}

/// The open-file table backing the `IO_*` primitives. Holds real host
/// file handles; `Interpreter` owns exactly one.
pub struct Io {
    slots: [Option<FileSlot>; MAX_FILES],
}

impl Io {
    /// An empty table — no file slots open.
    pub fn new() -> Self {
        Io {
            slots: Default::default(),
        }
    }
}

impl Default for Io {
    fn default() -> Self {
        Self::new()
    }
}

fn slot_index(index: Ref) -> Option<usize> {
    let i = index.as_small_int()?;
    if i >= 1 && i as usize <= MAX_FILES {
        Some(i as usize - 1)
    } else {
        None
    }
}

/// Read one `\n`- or EOF-terminated line from `r`, byte at a time (no
/// internal buffering, so a slot's file position stays exactly where the
/// caller expects between primitive calls). Returns `None` at immediate
/// EOF, `Some(line)` (without the trailing newline) otherwise.
fn read_line_raw<R: Read>(r: &mut R) -> std::io::Result<Option<String>> {
    let mut buf = Vec::new();
    let mut one = [0u8; 1];
    loop {
        let n = r.read(&mut one)?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            break;
        }
        if one[0] == b'\n' {
            break;
        }
        buf.push(one[0]);
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Everything a primitive needs reach into: object memory, the typed
/// constructors, the global symbol table, the open-file table, and the
/// vm-wide watch flag and boolean singletons.
pub(crate) struct PrimitiveContext<'a> {
    pub memory: &'a mut Memory,
    pub constructors: &'a mut Constructors,
    pub symbols: SymbolTable,
    pub io: &'a mut Io,
    pub watching: &'a mut bool,
    pub true_obj: Ref,
    pub false_obj: Ref,
    /// Invalidated wholesale after a file-in recompiles any method, since a
    /// live edit can shadow an arbitrary number of cached `(selector, class)`
    /// entries at once.
    pub cache: &'a mut MethodCache,
}

impl<'a> PrimitiveContext<'a> {
    fn bool_ref(&self, value: bool) -> Ref {
        if value { self.true_obj } else { self.false_obj }
    }
}

/// Dispatch `primitive` with `args` (the receiver, when one applies, is
/// always `args[0]`). Returns the primitive's result reference; a `nil`
/// result from one of the `60..=79` integer fast paths is the caller's
/// (the interpreter's `SendBinary` handling) cue to retry as a normal
/// send — this function itself never retries.
pub(crate) fn dispatch(
    ctx: &mut PrimitiveContext,
    primitive: Primitive,
    args: &[Ref],
) -> Result<Ref, InterpreterError> {
    if primitive.is_integer_fast_path() {
        return Ok(integer_fast_path(primitive, args, ctx.true_obj, ctx.false_obj));
    }
    if primitive.is_io() {
        return io_primitive(ctx, primitive, args);
    }
    if primitive.is_system() {
        return system_call(ctx.memory, args);
    }

    match primitive {
        Primitive::TOGGLE_WATCH => {
            *ctx.watching = !*ctx.watching;
            Ok(ctx.bool_ref(*ctx.watching))
        }
        Primitive::CLASS_OF => Ok(ctx.constructors.get_class(ctx.memory, args[0])?),
        Primitive::IDENTITY_EQUALS => Ok(ctx.bool_ref(args[0] == args[1])),
        Primitive::BASIC_AT => Ok(basic_at(ctx.memory, args[0], args[1])?),
        Primitive::BASIC_AT_PUT => {
            basic_at_put(ctx.memory, args[0], args[1], args[2])?;
            Ok(args[2])
        }
        Primitive::BLOCK_CREATE => Ok(block_create(ctx.memory, ctx.constructors, args[0], args[1])?),
        Primitive::SET_TIME_SLICE => {
            // Scheduling quanta aren't modeled beyond the `quantum` count
            // already threaded through `Interpreter::execute`; see
            // `DESIGN.md`.
            Ok(args[0])
        }
        Primitive::ALLOC_OBJECT => Ok(alloc_object(ctx.memory, args[0], args[1])?),
        Primitive::GLOBAL_SYMBOL_VALUE => {
            let name = read_text(ctx.memory, args[0])?;
            Ok(ctx.symbols.global_symbol(ctx.memory, &name)?.unwrap_or(Ref::NIL))
        }
        _ => Ok(Ref::NIL),
    }
}

fn read_text(memory: &Memory, obj: Ref) -> Result<String, MemoryError> {
    Ok(String::from_utf8_lossy(memory.bytes(obj)?).into_owned())
}

/// `basicAt:`: 1-based element access, dispatching on the receiver's byte
/// vs. pointer shape (the sign of its declared size).
fn basic_at(memory: &Memory, obj: Ref, index: Ref) -> Result<Ref, MemoryError> {
    let i = index.as_small_int().ok_or(MemoryError::WrongShape { expected: "an Integer index" })? as usize;
    if memory.size_of(obj)? < 0 {
        let b = memory.fetch_byte(obj, i)?;
        Ok(Ref::small_int(b as i32).expect("byte fits a small integer"))
    } else {
        memory.fetch_pointer(obj, i)
    }
}

fn basic_at_put(memory: &mut Memory, obj: Ref, index: Ref, value: Ref) -> Result<(), MemoryError> {
    let i = index.as_small_int().ok_or(MemoryError::WrongShape { expected: "an Integer index" })? as usize;
    if memory.size_of(obj)? < 0 {
        let b = value
            .as_small_int()
            .filter(|v| (0..=255).contains(v))
            .ok_or(MemoryError::WrongShape { expected: "a byte-valued Integer" })?;
        memory.store_byte(obj, i, b as u8)
    } else {
        memory.store_pointer(obj, i, value)
    }
}

/// `<29 blockTemplate thisContextValue>`: bind a freshly allocated `Block`
/// to the context it's being created in, copying the template's declared
/// argument shape and body offset, as emitted by the `block()` compiler
/// routine that generates this primitive call.
fn block_create(
    memory: &mut Memory,
    constructors: &mut Constructors,
    template: Ref,
    context: Ref,
) -> Result<Ref, MemoryError> {
    let block = constructors.new_block(memory)?;
    let arg_count = memory.fetch_pointer(template, block_fields::ARGUMENT_COUNT)?;
    let arg_location = memory.fetch_pointer(template, block_fields::ARGUMENT_LOCATION)?;
    let bytecode_offset = memory.fetch_pointer(template, block_fields::BYTECODE_OFFSET)?;
    memory.store_pointer(block, block_fields::ARGUMENT_COUNT, arg_count)?;
    memory.store_pointer(block, block_fields::ARGUMENT_LOCATION, arg_location)?;
    memory.store_pointer(block, block_fields::BYTECODE_OFFSET, bytecode_offset)?;
    memory.store_pointer(block, block_fields::CONTEXT, context)?;
    Ok(block)
}

fn alloc_object(memory: &mut Memory, class: Ref, size: Ref) -> Result<Ref, MemoryError> {
    let n = size.as_small_int().unwrap_or(0).max(0) as usize;
    let obj = memory.alloc_pointers(n)?;
    memory.set_class(obj, class)?;
    Ok(obj)
}

/// The `60..=79` small-integer fast paths `SendBinary` invokes implicitly.
/// A `nil` result (non-integer operand, or an overflow `Ref::small_int`
/// can't represent) means "fall back to a normal send" — the interpreter,
/// not this function, performs that fallback.
pub(crate) fn integer_fast_path(primitive: Primitive, args: &[Ref], true_obj: Ref, false_obj: Ref) -> Ref {
    let idx = primitive.0 - Primitive::INTEGER_ARITH_BASE;
    let (Some(a), Some(b)) = (args[0].as_small_int(), args[1].as_small_int()) else {
        return Ref::NIL;
    };
    let int = |v: i64| -> Ref {
        i32::try_from(v).ok().and_then(Ref::small_int).unwrap_or(Ref::NIL)
    };
    let bool_ref = |v: bool| -> Ref { if v { true_obj } else { false_obj } };
    match idx {
        0 => int(a as i64 + b as i64),
        1 => int(a as i64 - b as i64),
        2 => bool_ref(a < b),
        3 => bool_ref(a > b),
        4 => bool_ref(a <= b),
        5 => bool_ref(a >= b),
        6 => bool_ref(a == b),
        7 => bool_ref(a != b),
        8 => int(a as i64 * b as i64),
        9 => {
            if b == 0 || a % b != 0 {
                Ref::NIL
            } else {
                int((a / b) as i64)
            }
        }
        10 => {
            if b == 0 {
                Ref::NIL
            } else {
                int(a.rem_euclid(b) as i64)
            }
        }
        11 => int((a & b) as i64),
        12 => int((a | b) as i64),
        _ => Ref::NIL,
    }
}

/// `SYSTEM_CALL` (150+): shell out to the host, mirroring C's `system()`.
/// `args[0]` is a `String`/`Symbol` holding the command line; the result
/// is the process exit code as a small integer, or `nil` if the shell
/// itself could not be launched.
fn system_call(memory: &Memory, args: &[Ref]) -> Result<Ref, InterpreterError> {
    let command = read_text(memory, args[0])?;
    let status = std::process::Command::new("sh").arg("-c").arg(&command).status();
    Ok(match status {
        Ok(status) => Ref::small_int(status.code().unwrap_or(-1)).unwrap_or(Ref::NIL),
        Err(_) => Ref::NIL,
    })
}

/// `IO_*` (100..=149): open-file management, file-in, and printing
/// (`original_source/src/unixio.c`'s `ioPrimitive`).
fn io_primitive(
    ctx: &mut PrimitiveContext,
    primitive: Primitive,
    args: &[Ref],
) -> Result<Ref, InterpreterError> {
    match primitive {
        Primitive::IO_OPEN => {
            let Some(slot) = slot_index(args[0]) else { return Ok(ctx.false_obj) };
            let name = read_text(ctx.memory, args[1])?;
            let mode = read_text(ctx.memory, args[2])?;
            let opened = match name.as_str() {
                "stdin" => Some(FileSlot::Stdin),
                "stdout" => Some(FileSlot::Stdout),
                "stderr" => Some(FileSlot::Stderr),
                _ if mode.contains('w') || mode.contains('a') => {
                    let mut opts = std::fs::OpenOptions::new();
                    opts.write(true).create(true);
                    if mode.contains('a') {
                        opts.append(true);
                    } else {
                        opts.truncate(true);
                    }
                    opts.open(&name).ok().map(FileSlot::File)
                }
                _ => File::open(&name).ok().map(FileSlot::File),
            };
            match opened {
                Some(f) => {
                    ctx.io.slots[slot] = Some(f);
                    Ok(ctx.true_obj)
                }
                None => Ok(ctx.false_obj),
            }
        }
        Primitive::IO_CLOSE => {
            if let Some(slot) = slot_index(args[0]) {
                ctx.io.slots[slot] = None;
            }
            Ok(ctx.true_obj)
        }
        Primitive::IO_SIZE => {
            let Some(slot) = slot_index(args[0]) else { return Ok(Ref::NIL) };
            let size = match &ctx.io.slots[slot] {
                Some(FileSlot::File(f)) => f.metadata().ok().map(|m| m.len()),
                _ => None,
            };
            Ok(size
                .and_then(|n| i32::try_from(n).ok())
                .and_then(Ref::small_int)
                .unwrap_or(Ref::NIL))
        }
        Primitive::IO_FILE_IN => {
            let Some(slot) = slot_index(args[0]) else { return Ok(ctx.false_obj) };
            let text = match &ctx.io.slots[slot] {
                Some(FileSlot::File(f)) => {
                    let mut s = String::new();
                    (&*f).read_to_string(&mut s).map_err(MemoryError::from)?;
                    s
                }
                _ => return Ok(ctx.false_obj),
            };
            let mut cursor = std::io::Cursor::new(text.into_bytes());
            crate::compiler::file_in(ctx.memory, ctx.constructors, &mut cursor)
                .map_err(|e| InterpreterError::fatal("file-in failed", e.to_string()))?;
            ctx.cache.clear();
            Ok(ctx.true_obj)
        }
        Primitive::IO_GET_CHAR => Err(InterpreterError::fatal(
            "not implemented",
            "file operation not implemented yet",
        )),
        Primitive::IO_GET_STRING => {
            let Some(slot) = slot_index(args[0]) else { return Ok(Ref::NIL) };
            let line = match &mut ctx.io.slots[slot] {
                Some(FileSlot::Stdin) => read_line_raw(&mut std::io::stdin())
                    .map_err(MemoryError::from)?,
                Some(FileSlot::File(f)) => read_line_raw(&mut &*f).map_err(MemoryError::from)?,
                _ => None,
            };
            match line {
                Some(s) => Ok(ctx.constructors.new_st_string(ctx.memory, &s)?),
                None => Ok(Ref::NIL),
            }
        }
        Primitive::IO_WRITE_IMAGE => {
            let Some(slot) = slot_index(args[0]) else { return Ok(ctx.false_obj) };
            match &ctx.io.slots[slot] {
                Some(FileSlot::File(f)) => {
                    crate::memory::image::write_image(ctx.memory, ctx.symbols.dict(), &*f)?;
                    Ok(ctx.true_obj)
                }
                _ => Ok(ctx.false_obj),
            }
        }
        Primitive::IO_PRINT_NO_RETURN | Primitive::IO_PRINT_STRING => {
            let Some(slot) = slot_index(args[0]) else { return Ok(ctx.false_obj) };
            let text = read_text(ctx.memory, args[1])?;
            let newline = primitive == Primitive::IO_PRINT_STRING;
            let ok = match &mut ctx.io.slots[slot] {
                Some(FileSlot::Stdout) => write_text(&mut std::io::stdout(), &text, newline),
                Some(FileSlot::Stderr) => write_text(&mut std::io::stderr(), &text, newline),
                Some(FileSlot::File(f)) => write_text(f, &text, newline),
                _ => false,
            };
            Ok(if ok { ctx.true_obj } else { ctx.false_obj })
        }
        _ => Ok(Ref::NIL),
    }
}

fn write_text<W: Write>(w: &mut W, text: &str, newline: bool) -> bool {
    let ok = w.write_all(text.as_bytes()).is_ok();
    if ok && newline {
        return w.write_all(b"\n").is_ok();
    }
    ok && w.flush().is_ok()
}
