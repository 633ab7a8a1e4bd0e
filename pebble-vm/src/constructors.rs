//! Typed allocation wrappers that install the right class reference
//! (grounded on `original_source/src/news.c`).
//!
//! Each constructor lazily resolves and caches its class reference via
//! [`SymbolTable::global_symbol`] the first time it's needed, exactly as
//! `news.c`'s file-scope `static object arrayClass = nilobj;` style
//! globals do.

use pebble_types::Ref;

use crate::consts::{block_fields, class_fields, context_fields, dictionary_fields, link_fields, method_fields, process_fields, DEFAULT_METHOD_DICT_BUCKETS};
use crate::error::MemoryError;
use crate::memory::Memory;
use crate::symbol::{str_hash, CommonSymbols, SymbolTable};

/// Lazily-cached well-known class references plus the typed allocators
/// that use them.
#[derive(Debug, Clone)]
pub struct Constructors {
    symbols: SymbolTable,
    array_class: Option<Ref>,
    int_class: Option<Ref>,
    string_class: Option<Ref>,
    symbol_class: Option<Ref>,
    block_class: Option<Ref>,
    byte_array_class: Option<Ref>,
    char_class: Option<Ref>,
    class_class: Option<Ref>,
    context_class: Option<Ref>,
    dictionary_class: Option<Ref>,
    float_class: Option<Ref>,
    link_class: Option<Ref>,
    method_class: Option<Ref>,
    process_class: Option<Ref>,
}

macro_rules! cached_class {
    ($self:ident, $memory:ident, $field:ident, $name:literal) => {{
        if let Some(r) = $self.$field {
            r
        } else {
            let r = $self.resolve($memory, $name)?;
            $self.$field = Some(r);
            r
        }
    }};
}

impl Constructors {
    /// Wrap a symbol table; all class-reference caches start empty.
    pub fn new(symbols: SymbolTable) -> Self {
        Constructors {
            symbols,
            array_class: None,
            int_class: None,
            string_class: None,
            symbol_class: None,
            block_class: None,
            byte_array_class: None,
            char_class: None,
            class_class: None,
            context_class: None,
            dictionary_class: None,
            float_class: None,
            link_class: None,
            method_class: None,
            process_class: None,
        }
    }

    /// The symbol table these constructors intern names through.
    pub fn symbols(&self) -> SymbolTable {
        self.symbols
    }

    fn resolve(&self, memory: &Memory, name: &str) -> Result<Ref, MemoryError> {
        Ok(self.symbols.global_symbol(memory, name)?.unwrap_or(Ref::NIL))
    }

    /// `getClass`: the class of `obj` — `Integer` for a tagged small
    /// integer (lazily resolved), otherwise its object-table class field.
    pub fn get_class(&mut self, memory: &Memory, obj: Ref) -> Result<Ref, MemoryError> {
        if obj.is_small_int() {
            return Ok(cached_class!(self, memory, int_class, "Integer"));
        }
        memory.class_of(obj)
    }

    /// `newArray(n)`: an all-`nil` pointer object of size `n`, classed
    /// `Array`.
    pub fn new_array(&mut self, memory: &mut Memory, size: usize) -> Result<Ref, MemoryError> {
        let obj = memory.alloc_pointers(size)?;
        let class = cached_class!(self, memory, array_class, "Array");
        memory.set_class(obj, class)?;
        Ok(obj)
    }

    /// `newByteArray(n)`: a zeroed byte object of size `n`, classed
    /// `ByteArray`.
    pub fn new_byte_array(&mut self, memory: &mut Memory, size: usize) -> Result<Ref, MemoryError> {
        let obj = memory.alloc_bytes(size)?;
        let class = cached_class!(self, memory, byte_array_class, "ByteArray");
        memory.set_class(obj, class)?;
        Ok(obj)
    }

    /// `newStString(s)`: a byte object holding `s`'s UTF-8 bytes, classed
    /// `String`.
    pub fn new_st_string(&mut self, memory: &mut Memory, value: &str) -> Result<Ref, MemoryError> {
        let obj = memory.alloc_bytes_from(value.as_bytes())?;
        let class = cached_class!(self, memory, string_class, "String");
        memory.set_class(obj, class)?;
        Ok(obj)
    }

    /// `newChar(c)`: a single-field object holding `c` as a tagged small
    /// integer, classed `Char`.
    pub fn new_char(&mut self, memory: &mut Memory, value: i32) -> Result<Ref, MemoryError> {
        let obj = memory.alloc_pointers(1)?;
        let tagged = Ref::small_int(value).ok_or(MemoryError::TooLarge {
            requested: value as usize,
            max: i32::MAX as usize,
        })?;
        memory.store_pointer(obj, 1, tagged)?;
        let class = cached_class!(self, memory, char_class, "Char");
        memory.set_class(obj, class)?;
        Ok(obj)
    }

    /// `newFloat(d)`: an 8-byte object holding `d`'s native-endian IEEE
    /// 754 bits, classed `Float`.
    pub fn new_float(&mut self, memory: &mut Memory, value: f64) -> Result<Ref, MemoryError> {
        let obj = memory.alloc_bytes_from(&value.to_ne_bytes())?;
        let class = cached_class!(self, memory, float_class, "Float");
        memory.set_class(obj, class)?;
        Ok(obj)
    }

    /// `floatValue`: decode a `Float` object's bytes back into an `f64`.
    pub fn float_value(&self, memory: &Memory, obj: Ref) -> Result<f64, MemoryError> {
        let bytes = memory.bytes(obj)?;
        let arr: [u8; 8] = bytes.try_into().map_err(|_| MemoryError::WrongShape {
            expected: "an 8-byte Float",
        })?;
        Ok(f64::from_ne_bytes(arr))
    }

    /// `newLink(k, v)`: a 3-field (key, value, next) chain cell, classed
    /// `Link`, with `next` left `nil`.
    pub fn new_link(&mut self, memory: &mut Memory, key: Ref, value: Ref) -> Result<Ref, MemoryError> {
        let obj = memory.alloc_pointers(link_fields::SIZE)?;
        memory.store_pointer(obj, link_fields::KEY, key)?;
        memory.store_pointer(obj, link_fields::VALUE, value)?;
        let class = cached_class!(self, memory, link_class, "Link");
        memory.set_class(obj, class)?;
        Ok(obj)
    }

    /// `newClass(name)`: a fresh `Class` object, interning `name` as a
    /// `Symbol` and registering `name -> obj` in the global symbol table.
    pub fn new_class(&mut self, memory: &mut Memory, name: &str) -> Result<Ref, MemoryError> {
        let obj = memory.alloc_pointers(class_fields::SIZE)?;
        let class_class = cached_class!(self, memory, class_class, "Class");
        memory.set_class(obj, class_class)?;
        let symbol_class = cached_class!(self, memory, symbol_class, "Symbol");
        let name_obj = self.symbols.intern(memory, symbol_class, name)?;
        memory.store_pointer(obj, class_fields::NAME, name_obj)?;
        self.symbols.insert(memory, str_hash(name.as_bytes()), name_obj, obj)?;
        Ok(obj)
    }

    /// `newSymbol(s)`: the existing interned `Symbol` with these bytes, or
    /// a freshly allocated and registered one. Used by the compiler to
    /// turn selector/literal text into the Symbol objects a method's
    /// literal pool and method dictionary keys require.
    pub fn new_symbol(&mut self, memory: &mut Memory, text: &str) -> Result<Ref, MemoryError> {
        let symbol_class = cached_class!(self, memory, symbol_class, "Symbol");
        self.symbols.intern(memory, symbol_class, text)
    }

    /// `copyFrom(obj, start, size)`: a new `Array` of `size` fields
    /// holding `size` consecutive field reads of `obj` from 1-based
    /// `start`.
    pub fn copy_from(&mut self, memory: &mut Memory, obj: Ref, start: usize, size: usize) -> Result<Ref, MemoryError> {
        let new_obj = self.new_array(memory, size)?;
        for i in 0..size {
            let v = memory.fetch_pointer(obj, start + i)?;
            memory.store_pointer(new_obj, i + 1, v)?;
        }
        Ok(new_obj)
    }

    /// `newContext(link, method, args, temp)`: a reified call frame
    /// object, classed `Context`. `byte_offset`/`return_point` make the
    /// frame independently resumable (see `consts::context_fields`).
    ///
    /// `link_ptr` is stored verbatim: `Ref::NIL` (no caller), a tagged
    /// small integer (a stack-resident caller frame, addressed by its
    /// link-pointer index), or a boxed reference to another `Context`
    /// object (a caller frame that was itself born reified — a block
    /// activation).
    ///
    /// `home` is `Ref::NIL` for an ordinary reified method frame, or the
    /// enclosing method activation's own context for a block activation —
    /// the target a non-local `^` unwinds to directly.
    pub fn new_context(
        &mut self,
        memory: &mut Memory,
        link_ptr: Ref,
        method: Ref,
        args: Ref,
        temporaries: Ref,
        byte_offset: i32,
        return_point: i32,
        home: Ref,
    ) -> Result<Ref, MemoryError> {
        let obj = memory.alloc_pointers(context_fields::SIZE)?;
        let too_large = |v: i32| MemoryError::TooLarge {
            requested: v as usize,
            max: i32::MAX as usize,
        };
        let offset_tagged = Ref::small_int(byte_offset).ok_or_else(|| too_large(byte_offset))?;
        let return_tagged = Ref::small_int(return_point).ok_or_else(|| too_large(return_point))?;
        memory.store_pointer(obj, context_fields::LINK_PTR, link_ptr)?;
        memory.store_pointer(obj, context_fields::METHOD, method)?;
        memory.store_pointer(obj, context_fields::ARGUMENTS, args)?;
        memory.store_pointer(obj, context_fields::TEMPORARIES, temporaries)?;
        memory.store_pointer(obj, context_fields::BYTE_OFFSET, offset_tagged)?;
        memory.store_pointer(obj, context_fields::RETURN_POINT, return_tagged)?;
        memory.store_pointer(obj, context_fields::HOME, home)?;
        let class = cached_class!(self, memory, context_class, "Context");
        memory.set_class(obj, class)?;
        Ok(obj)
    }

    /// The cached `Block` class reference, resolving and caching it on
    /// first use.
    pub fn block_class(&mut self, memory: &Memory) -> Result<Ref, MemoryError> {
        Ok(cached_class!(self, memory, block_class, "Block"))
    }

    /// The cached `Context` class reference, resolving and caching it on
    /// first use.
    pub fn context_class(&mut self, memory: &Memory) -> Result<Ref, MemoryError> {
        Ok(cached_class!(self, memory, context_class, "Context"))
    }

    /// `newDictionary()`: a fresh `Dictionary` with
    /// [`DEFAULT_METHOD_DICT_BUCKETS`] bucket slots, classed
    /// `Dictionary`.
    pub fn new_dictionary(&mut self, memory: &mut Memory) -> Result<Ref, MemoryError> {
        let obj = memory.alloc_pointers(dictionary_fields::SIZE)?;
        let buckets = self.new_array(memory, DEFAULT_METHOD_DICT_BUCKETS)?;
        memory.store_pointer(obj, dictionary_fields::BUCKETS, buckets)?;
        let class = cached_class!(self, memory, dictionary_class, "Dictionary");
        memory.set_class(obj, class)?;
        Ok(obj)
    }

    /// `newMethod()`: an empty `Method` object, classed `Method`.
    pub fn new_method(&mut self, memory: &mut Memory) -> Result<Ref, MemoryError> {
        let obj = memory.alloc_pointers(method_fields::SIZE)?;
        let class = cached_class!(self, memory, method_class, "Method");
        memory.set_class(obj, class)?;
        Ok(obj)
    }

    /// `newBlock()`: an empty `Block` object, classed `Block`.
    pub fn new_block(&mut self, memory: &mut Memory) -> Result<Ref, MemoryError> {
        let obj = memory.alloc_pointers(block_fields::SIZE)?;
        let class = cached_class!(self, memory, block_class, "Block");
        memory.set_class(obj, class)?;
        Ok(obj)
    }

    /// A fresh `Process` object with a freshly allocated stack of
    /// `stack_size` slots, classed `Process`.
    pub fn new_process(&mut self, memory: &mut Memory, stack_size: usize) -> Result<Ref, MemoryError> {
        let obj = memory.alloc_pointers(process_fields::SIZE)?;
        let stack = self.new_array(memory, stack_size)?;
        memory.store_pointer(obj, process_fields::STACK, stack)?;
        let class = cached_class!(self, memory, process_class, "Process");
        memory.set_class(obj, class)?;
        Ok(obj)
    }
}

/// Build the bootstrap image from an empty [`Memory`]: the `symbols`
/// dictionary, `nil`/`true`/`false`, and just enough core classes
/// (`Symbol`, `Class`, `Link`, `ByteArray`, `Array`, `Dictionary`,
/// `UndefinedObject`, `String`) to make every other constructor usable
/// (`original_source/src/initial.c`'s `makeInitialImage`).
pub struct Bootstrap {
    /// The root symbol table.
    pub symbols: SymbolTable,
    /// The typed constructors, with core classes already cached.
    pub constructors: Constructors,
    /// `true`.
    pub true_obj: Ref,
    /// `false`.
    pub false_obj: Ref,
    /// The common selector symbols, interned in bytecode order.
    pub common: CommonSymbols,
}

/// Run the one-time chicken-and-egg bootstrap described in
/// `original_source/src/initial.c`: the symbol table, classes, and
/// booleans must be wired up in a specific order because each of
/// `newSymbol`/`newClass` needs pieces the others haven't built yet.
pub fn bootstrap(memory: &mut Memory) -> Result<Bootstrap, MemoryError> {
    let symbols = SymbolTable::bootstrap(memory)?;
    let mut constructors = Constructors::new(symbols);

    // `newSymbol("Symbol")` before any class exists: its class field is
    // temporarily `nil`, patched below, exactly as `makeInitialImage`
    // does by hand.
    let symbol_obj = symbols.intern(memory, Ref::NIL, "Symbol")?;
    let symbol_class = constructors.new_class(memory, "Symbol")?;
    memory.set_class(symbol_obj, symbol_class)?;
    constructors.symbol_class = Some(symbol_class);

    let class_class = constructors.new_class(memory, "Class")?;
    memory.set_class(symbol_class, class_class)?;
    memory.set_class(class_class, class_class)?;
    constructors.class_class = Some(class_class);

    constructors.new_class(memory, "Link")?;
    constructors.new_class(memory, "ByteArray")?;
    let array_class = constructors.new_class(memory, "Array")?;
    let buckets = memory.fetch_pointer(symbols.dict(), crate::consts::dictionary_fields::BUCKETS)?;
    memory.set_class(buckets, array_class)?;
    let dictionary_class = constructors.new_class(memory, "Dictionary")?;
    memory.set_class(symbols.dict(), dictionary_class)?;
    let undefined_object_class = constructors.new_class(memory, "UndefinedObject")?;
    memory.set_class(Ref::NIL, undefined_object_class)?;
    constructors.new_class(memory, "String")?;

    symbols.insert(
        memory,
        str_hash(b"symbols"),
        symbols.intern(memory, symbol_class, "symbols")?,
        symbols.dict(),
    )?;

    let true_obj = symbols.intern(memory, symbol_class, "true")?;
    symbols.insert(memory, str_hash(b"true"), true_obj, true_obj)?;
    let false_obj = symbols.intern(memory, symbol_class, "false")?;
    symbols.insert(memory, str_hash(b"false"), false_obj, false_obj)?;

    let common = symbols.init_common_symbols(memory, symbol_class)?;

    Ok(Bootstrap {
        symbols,
        constructors,
        true_obj,
        false_obj,
        common,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::class_fields;
    use pebble_types::Profile;

    #[test]
    fn bootstrap_wires_up_core_classes() {
        let mut memory = Memory::new(Profile::Small, 1024);
        let boot = bootstrap(&mut memory).unwrap();
        let array_class = boot.symbols.global_symbol(&memory, "Array").unwrap();
        assert!(array_class.is_some());
        let name = memory
            .fetch_pointer(array_class.unwrap(), class_fields::NAME)
            .unwrap();
        assert_eq!(memory.bytes(name).unwrap(), b"Array");
        assert_ne!(boot.true_obj, boot.false_obj);
    }

    #[test]
    fn new_array_is_all_nil_and_classed() {
        let mut memory = Memory::new(Profile::Small, 1024);
        let mut boot = bootstrap(&mut memory).unwrap();
        let arr = boot.constructors.new_array(&mut memory, 3).unwrap();
        assert_eq!(memory.size_of(arr).unwrap(), 3);
        for i in 1..=3 {
            assert!(memory.fetch_pointer(arr, i).unwrap().is_nil());
        }
        let class = memory.class_of(arr).unwrap();
        assert_eq!(
            boot.symbols.global_symbol(&memory, "Array").unwrap(),
            Some(class)
        );
    }

    #[test]
    fn float_round_trips_through_byte_storage() {
        let mut memory = Memory::new(Profile::Small, 1024);
        let mut boot = bootstrap(&mut memory).unwrap();
        let f = boot.constructors.new_float(&mut memory, 3.5).unwrap();
        assert_eq!(boot.constructors.float_value(&memory, f).unwrap(), 3.5);
    }
}
