//! The bytecode interpreter: process scheduling, the fetch/decode/dispatch
//! loop, and message send.
//!
//! Split across sibling files: this file owns the struct, its construction,
//! and the small surface a host embeds against; [`dispatch`] owns the
//! execute loop itself and everything only it needs.

pub(crate) mod cache;
mod dispatch;
mod frame;
pub(crate) mod send;

use std::io::{BufRead, Read, Write};

use pebble_types::{Profile, Ref};

use crate::compiler::CompiledMethod;
use crate::consts::class_fields;
use crate::constructors::Constructors;
use crate::error::{CompileError, InterpreterError, MemoryError};
use crate::memory::Memory;
use crate::primitive::Io;
use crate::symbol::{str_hash, CommonSymbols, SymbolTable};

use cache::MethodCache;

/// The bytecode interpreter: object memory, compiler support, and every
/// piece of runtime state a running process needs.
///
/// Built once per image (via [`Interpreter::bootstrap`] or
/// [`Interpreter::load_image`]) and then driven one process at a time
/// through [`Interpreter::execute`].
pub struct Interpreter {
    memory: Memory,
    constructors: Constructors,
    symbols: SymbolTable,
    cache: MethodCache,
    io: Io,
    watching: bool,
    true_obj: Ref,
    false_obj: Ref,
    common: CommonSymbols,
    /// Interned `value`, `value:`, `value:value:`, `value:value:value:`, in
    /// arity order — the selectors a `Block` receiver intercepts directly
    /// rather than through a method dictionary lookup.
    block_value_selectors: Vec<Ref>,
    /// `blockReturn`, sent to `thisContext` by every real (non-optimized)
    /// block's `^` (see `compiler::parser::Parser::statement`).
    block_return_selector: Ref,
    /// `message:notRecognizedWithArguments:`, sent to a receiver when no
    /// method is found for the original selector.
    mnu_selector: Ref,
}

impl Interpreter {
    /// Finish construction once a symbol table, constructors, and the
    /// `true`/`false` singletons are in hand — shared by
    /// [`Interpreter::bootstrap`] and [`Interpreter::load_image`]. Interns
    /// the handful of selectors the interpreter intercepts itself rather
    /// than looking up in a method dictionary.
    fn assemble(
        mut memory: Memory,
        mut constructors: Constructors,
        symbols: SymbolTable,
        true_obj: Ref,
        false_obj: Ref,
        common: CommonSymbols,
    ) -> Result<Self, MemoryError> {
        let block_value_selectors = ["value", "value:", "value:value:", "value:value:value:"]
            .into_iter()
            .map(|s| constructors.new_symbol(&mut memory, s))
            .collect::<Result<Vec<_>, _>>()?;
        let block_return_selector = constructors.new_symbol(&mut memory, "blockReturn")?;
        let mnu_selector =
            constructors.new_symbol(&mut memory, "message:notRecognizedWithArguments:")?;
        Ok(Interpreter {
            memory,
            constructors,
            symbols,
            cache: MethodCache::new(),
            io: Io::new(),
            watching: false,
            true_obj,
            false_obj,
            common,
            block_value_selectors,
            block_return_selector,
            mnu_selector,
        })
    }

    /// Build a fresh image from nothing but the one-time bootstrap.
    pub fn bootstrap(profile: Profile, capacity: usize) -> Result<Self, MemoryError> {
        let mut memory = Memory::new(profile, capacity);
        let boot = crate::constructors::bootstrap(&mut memory)?;
        Self::assemble(memory, boot.constructors, boot.symbols, boot.true_obj, boot.false_obj, boot.common)
    }

    /// Load a previously written image, running the load-time recovery
    /// pass before anything else touches it.
    pub fn load_image<R: Read>(profile: Profile, capacity: usize, reader: R) -> Result<Self, MemoryError> {
        let (mut memory, symbols_ref) = crate::memory::image::read_image(profile, capacity, reader)?;
        memory.recover(&[symbols_ref]);
        let symbols = SymbolTable::new(symbols_ref);
        let true_obj = symbols.global_symbol(&memory, "true")?.unwrap_or(Ref::NIL);
        let false_obj = symbols.global_symbol(&memory, "false")?.unwrap_or(Ref::NIL);
        let mut constructors = Constructors::new(symbols);

        // The fixed selector tables are already interned in any image ever
        // written by this crate; `new_symbol` degrades gracefully (interning
        // on demand) if one is somehow missing.
        let unary = pebble_asm::UNARY_SELECTORS
            .iter()
            .map(|s| constructors.new_symbol(&mut memory, s))
            .collect::<Result<Vec<_>, _>>()?;
        let binary = pebble_asm::BINARY_SELECTORS
            .iter()
            .map(|s| constructors.new_symbol(&mut memory, s))
            .collect::<Result<Vec<_>, _>>()?;
        let common = CommonSymbols { unary, binary };

        Self::assemble(memory, constructors, symbols, true_obj, false_obj, common)
    }

    /// Serialize the current image.
    pub fn write_image<W: Write>(&self, w: W) -> Result<(), MemoryError> {
        crate::memory::image::write_image(&self.memory, self.symbols.dict(), w)
    }

    /// Compile one method body without installing it anywhere (a "do it",
    /// if `class` is `nil`).
    pub fn compile(&mut self, class: Ref, source: &str, save_text: bool) -> Result<CompiledMethod, CompileError> {
        crate::compiler::compile_method(&mut self.memory, &mut self.constructors, class, source, save_text)
    }

    /// Run the line-oriented file-in protocol over `reader`, then
    /// invalidate the whole method cache — a bulk file-in may have edited
    /// an arbitrary number of method dictionaries.
    pub fn file_in<R: BufRead>(&mut self, reader: &mut R) -> Result<(), CompileError> {
        crate::compiler::file_in::file_in(&mut self.memory, &mut self.constructors, reader)?;
        self.cache.clear();
        Ok(())
    }

    /// Compile `source` as a method of `class` and install it in that
    /// class's method dictionary, replacing any existing method under the
    /// same selector. Flushes only the one cache bucket that selector/class
    /// pair could occupy, rather than the whole cache.
    pub fn recompile_method(&mut self, class: Ref, source: &str) -> Result<Ref, CompileError> {
        let compiled = self.compile(class, source, true)?;
        let dict = {
            let existing = self.memory.fetch_pointer(class, class_fields::METHODS)?;
            if existing.is_nil() {
                let d = self.constructors.new_dictionary(&mut self.memory)?;
                self.memory.store_pointer(class, class_fields::METHODS, d)?;
                d
            } else {
                existing
            }
        };
        let table = SymbolTable::new(dict);
        let bytes = self.memory.bytes(compiled.selector)?.to_vec();
        table.insert(&mut self.memory, str_hash(&bytes), compiled.selector, compiled.method)?;
        self.cache.flush(compiled.selector, class);
        Ok(compiled.method)
    }

    /// Allocate a fresh `Process` with a `stack_size`-slot stack and no
    /// active frame yet.
    pub fn new_process(&mut self, stack_size: usize) -> Result<Ref, MemoryError> {
        self.constructors.new_process(&mut self.memory, stack_size)
    }

    /// Install `process`'s very first frame: send `selector_text` to
    /// `receiver` with `extra_args`.
    pub fn spawn_send(
        &mut self,
        process: Ref,
        receiver: Ref,
        selector_text: &str,
        extra_args: &[Ref],
    ) -> Result<(), InterpreterError> {
        let selector = self.constructors.new_symbol(&mut self.memory, selector_text)?;
        self.push(process, receiver)?;
        for arg in extra_args {
            self.push(process, *arg)?;
        }
        let arg_count = 1 + extra_args.len();
        let top = self.stack_top(process)?;
        let args_base = top as usize - arg_count + 1;
        self.perform_send(process, args_base, arg_count, selector, false, Ref::NIL)
    }

    /// Compile `source` as a top-level "do it" (receiver `nil`, no
    /// selector lookup) and drive it to completion, returning whatever it
    /// finished with. Used by both `pebble-cli` binaries: the image-builder
    /// to run its file-in/parse/close and `initialize` expressions, and the
    /// runtime to evaluate `-e <source>` would it ever be handed straight
    /// to the interpreter rather than left for Smalltalk code to interpret.
    pub fn eval(&mut self, source: &str) -> Result<Ref, InterpreterError> {
        let compiled = self
            .compile(Ref::NIL, source, false)
            .map_err(|e| InterpreterError::fatal("compile error", e.to_string()))?;
        let process = self.new_process(256)?;
        self.activate_compiled(process, compiled.method, Ref::NIL)?;
        self.run_until_finished(process, 100_000)
    }

    /// Drive `process` to completion, `quantum` bytecodes at a time, and
    /// return the value its outermost frame finished with.
    pub fn run_until_finished(&mut self, process: Ref, quantum: u32) -> Result<Ref, InterpreterError> {
        while self.execute(process, quantum)? {}
        let stack = self.stack_obj(process)?;
        let top = self.stack_top(process)?;
        if top < 1 {
            Ok(Ref::NIL)
        } else {
            Ok(self.memory.fetch_pointer(stack, top as usize)?)
        }
    }

    /// The object memory backing this interpreter.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Mutable access to the object memory, for hosts that need to reach in
    /// directly (diagnostics, tests).
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Mutable access to the typed constructors.
    pub fn constructors_mut(&mut self) -> &mut Constructors {
        &mut self.constructors
    }

    /// The root symbol table.
    pub fn symbols(&self) -> SymbolTable {
        self.symbols
    }

    /// The `true` singleton.
    pub fn true_obj(&self) -> Ref {
        self.true_obj
    }

    /// The `false` singleton.
    pub fn false_obj(&self) -> Ref {
        self.false_obj
    }

    /// The wire-format profile this interpreter's image was built with.
    pub fn profile(&self) -> Profile {
        self.memory.profile()
    }
}
