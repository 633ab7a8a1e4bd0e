//! Symbol interning and the triple-chained global dictionary (grounded on
//! `original_source/src/news.c`'s `newSymbol` and
//! `original_source/src/initial.c`'s bootstrapping of `symbols`).
//!
//! A `Dictionary` is a single-field object whose field holds a flat
//! bucket array. The array is addressed in groups of three: `key`,
//! `value`, `link`. A probe that lands on an empty or matching `key`
//! slot is done; otherwise it follows `link`, a chain of 3-field `Link`
//! objects (`key`, `value`, `next`) built by [`crate::Constructors::new_link`].

use pebble_types::Ref;
use tracing::trace;

use crate::consts::{dictionary_fields, link_fields, SYMBOL_TABLE_BUCKETS};
use crate::error::MemoryError;
use crate::memory::Memory;

/// A simple additive hash of a byte string's UTF-8 bytes.
/// `original_source` does not ship `names.c`, so the exact mixing function
/// is reconstructed rather than taken verbatim; see `DESIGN.md`.
pub fn str_hash(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

/// The selector symbols interned by [`SymbolTable::init_common_symbols`],
/// in the fixed order the bytecode's unary/binary fast paths
/// (`pebble_asm::selector`) expect.
#[derive(Debug, Clone)]
pub struct CommonSymbols {
    /// Interned unary selectors, indexed as in
    /// [`pebble_asm::UNARY_SELECTORS`].
    pub unary: Vec<Ref>,
    /// Interned binary selectors, indexed as in
    /// [`pebble_asm::BINARY_SELECTORS`].
    pub binary: Vec<Ref>,
}

/// A thin handle onto the root `symbols` dictionary object living inside
/// a [`Memory`]. Carries no state of its own beyond which object is the
/// dictionary; all mutation goes through `memory`.
#[derive(Debug, Clone, Copy)]
pub struct SymbolTable {
    dict: Ref,
}

impl SymbolTable {
    /// Wrap an already-allocated `Dictionary` object (its bucket array
    /// must already be sized to a multiple of 3).
    pub fn new(dict: Ref) -> Self {
        SymbolTable { dict }
    }

    /// The underlying `Dictionary` object, e.g. to serve as an image's
    /// root reference.
    pub fn dict(self) -> Ref {
        self.dict
    }

    /// Allocate the `symbols` dictionary with [`SYMBOL_TABLE_BUCKETS`]
    /// triple slots (`original_source/src/initial.c`'s `makeInitialImage`:
    /// `3 * 53`). The returned object's class is left `nil`; the caller
    /// installs `Dictionary` once that class exists.
    pub fn bootstrap(memory: &mut Memory) -> Result<Self, MemoryError> {
        let buckets = memory.alloc_pointers(SYMBOL_TABLE_BUCKETS)?;
        let dict = memory.alloc_pointers(dictionary_fields::SIZE)?;
        memory.store_pointer(dict, dictionary_fields::BUCKETS, buckets)?;
        Ok(SymbolTable { dict })
    }

    fn bucket_count(&self, memory: &Memory) -> Result<usize, MemoryError> {
        let buckets = memory.fetch_pointer(self.dict, dictionary_fields::BUCKETS)?;
        Ok(memory.size_of(buckets)? as usize)
    }

    fn triple_base(&self, memory: &Memory, hash: u32) -> Result<usize, MemoryError> {
        let n = self.bucket_count(memory)?;
        let groups = n / 3;
        Ok((hash as usize % groups) * 3 + 1)
    }

    fn key_matches(memory: &Memory, key: Ref, text: &[u8]) -> bool {
        if key.is_nil() {
            return false;
        }
        memory.bytes(key).map(|b| b == text).unwrap_or(false)
    }

    /// Walk the bucket chain at `hash`, returning the `(key, value)` pair
    /// of the first link whose key's bytes equal `text`.
    fn probe(&self, memory: &Memory, hash: u32, text: &[u8]) -> Result<Option<(Ref, Ref)>, MemoryError> {
        let buckets = memory.fetch_pointer(self.dict, dictionary_fields::BUCKETS)?;
        let base = self.triple_base(memory, hash)?;
        let key = memory.fetch_pointer(buckets, base)?;
        if Self::key_matches(memory, key, text) {
            let value = memory.fetch_pointer(buckets, base + 1)?;
            return Ok(Some((key, value)));
        }
        let mut link = memory.fetch_pointer(buckets, base + 2)?;
        while !link.is_nil() {
            let key = memory.fetch_pointer(link, link_fields::KEY)?;
            if Self::key_matches(memory, key, text) {
                let value = memory.fetch_pointer(link, link_fields::VALUE)?;
                return Ok(Some((key, value)));
            }
            link = memory.fetch_pointer(link, link_fields::NEXT)?;
        }
        Ok(None)
    }

    /// `nameTableInsert`: record `(key, value)` under `hash`. Re-inserting
    /// an already-resident key (same object identity, e.g. re-registering
    /// a symbol interned a moment ago by [`SymbolTable::intern`]) updates
    /// its value in place instead of growing the chain.
    pub fn insert(&self, memory: &mut Memory, hash: u32, key: Ref, value: Ref) -> Result<(), MemoryError> {
        let buckets = memory.fetch_pointer(self.dict, dictionary_fields::BUCKETS)?;
        let base = self.triple_base(memory, hash)?;
        let occupant = memory.fetch_pointer(buckets, base)?;
        if occupant.is_nil() {
            memory.store_pointer(buckets, base, key)?;
            memory.store_pointer(buckets, base + 1, value)?;
        } else if occupant == key {
            memory.store_pointer(buckets, base + 1, value)?;
        } else {
            let mut link = memory.fetch_pointer(buckets, base + 2)?;
            let mut existing = None;
            while !link.is_nil() {
                if memory.fetch_pointer(link, link_fields::KEY)? == key {
                    existing = Some(link);
                    break;
                }
                link = memory.fetch_pointer(link, link_fields::NEXT)?;
            }
            if let Some(link) = existing {
                memory.store_pointer(link, link_fields::VALUE, value)?;
            } else {
                let prev_link = memory.fetch_pointer(buckets, base + 2)?;
                let link_class = self.global_symbol(memory, "Link")?.unwrap_or(Ref::NIL);
                let new_link = memory.alloc_pointers(link_fields::SIZE)?;
                memory.set_class(new_link, link_class)?;
                memory.store_pointer(new_link, link_fields::KEY, key)?;
                memory.store_pointer(new_link, link_fields::VALUE, value)?;
                memory.store_pointer(new_link, link_fields::NEXT, prev_link)?;
                memory.store_pointer(buckets, base + 2, new_link)?;
            }
        }
        Ok(())
    }

    /// `globalKey`: the interned Symbol object whose bytes equal `text`,
    /// if any is already registered.
    pub fn global_key(&self, memory: &Memory, text: &str) -> Result<Option<Ref>, MemoryError> {
        let hash = str_hash(text.as_bytes());
        Ok(self.probe(memory, hash, text.as_bytes())?.map(|(k, _)| k))
    }

    /// `globalSymbol`: the value bound under the symbol named `text`
    /// (typically a `Class`), or `None` if nothing is registered yet.
    pub fn global_symbol(&self, memory: &Memory, text: &str) -> Result<Option<Ref>, MemoryError> {
        let hash = str_hash(text.as_bytes());
        Ok(self.probe(memory, hash, text.as_bytes())?.map(|(_, v)| v))
    }

    /// `hashEach`: enumerate entries whose key hashes to `hash`, returning
    /// the value of the first one for which `pred` holds. Used by the
    /// interpreter to look up a selector in a class's method dictionary.
    pub fn hash_each(
        &self,
        memory: &Memory,
        hash: u32,
        mut pred: impl FnMut(&Memory, Ref) -> bool,
    ) -> Result<Option<Ref>, MemoryError> {
        let buckets = memory.fetch_pointer(self.dict, dictionary_fields::BUCKETS)?;
        let base = self.triple_base(memory, hash)?;
        let key = memory.fetch_pointer(buckets, base)?;
        if !key.is_nil() && pred(memory, key) {
            return Ok(Some(memory.fetch_pointer(buckets, base + 1)?));
        }
        let mut link = memory.fetch_pointer(buckets, base + 2)?;
        while !link.is_nil() {
            let key = memory.fetch_pointer(link, link_fields::KEY)?;
            if pred(memory, key) {
                return Ok(Some(memory.fetch_pointer(link, link_fields::VALUE)?));
            }
            link = memory.fetch_pointer(link, link_fields::NEXT)?;
        }
        Ok(None)
    }

    /// `initCommonSymbols`: intern every fast-path unary/binary selector
    /// in the fixed order `pebble_asm::selector` assumes, using `intern`.
    pub fn init_common_symbols(
        &self,
        memory: &mut Memory,
        symbol_class: Ref,
    ) -> Result<CommonSymbols, MemoryError> {
        let mut unary = Vec::with_capacity(pebble_asm::UNARY_SELECTORS.len());
        for s in pebble_asm::UNARY_SELECTORS {
            unary.push(self.intern(memory, symbol_class, s)?);
        }
        let mut binary = Vec::with_capacity(pebble_asm::BINARY_SELECTORS.len());
        for s in pebble_asm::BINARY_SELECTORS {
            binary.push(self.intern(memory, symbol_class, s)?);
        }
        trace!(unary = unary.len(), binary = binary.len(), "interned common selectors");
        Ok(CommonSymbols { unary, binary })
    }

    /// `newSymbol`: the existing interned Symbol with these bytes, or a
    /// freshly allocated and registered one. `symbol_class` is the
    /// `Symbol` class reference to install (bootstrapping may pass `nil`
    /// before that class exists, matching
    /// `original_source/src/initial.c`'s two-step patch-up).
    pub fn intern(&self, memory: &mut Memory, symbol_class: Ref, text: &str) -> Result<Ref, MemoryError> {
        if let Some(existing) = self.global_key(memory, text)? {
            return Ok(existing);
        }
        let sym = memory.alloc_bytes_from(text.as_bytes())?;
        memory.set_class(sym, symbol_class)?;
        let hash = str_hash(text.as_bytes());
        self.insert(memory, hash, sym, Ref::NIL)?;
        Ok(sym)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pebble_types::Profile;

    #[test]
    fn intern_is_idempotent() {
        let mut m = Memory::new(Profile::Small, 256);
        let table = SymbolTable::bootstrap(&mut m).unwrap();
        let a = table.intern(&mut m, Ref::NIL, "foo").unwrap();
        let b = table.intern(&mut m, Ref::NIL, "foo").unwrap();
        assert_eq!(a, b);
        let c = table.intern(&mut m, Ref::NIL, "bar").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn insert_and_lookup_a_class_name() {
        let mut m = Memory::new(Profile::Small, 256);
        let table = SymbolTable::bootstrap(&mut m).unwrap();
        let name = table.intern(&mut m, Ref::NIL, "Array").unwrap();
        let class_obj = m.alloc_pointers(5).unwrap();
        table.insert(&mut m, str_hash(b"Array"), name, class_obj).unwrap();
        assert_eq!(table.global_symbol(&m, "Array").unwrap(), Some(class_obj));
        assert_eq!(table.global_key(&m, "Array").unwrap(), Some(name));
        assert_eq!(table.global_symbol(&m, "Nope").unwrap(), None);
    }

    #[test]
    fn chains_past_a_colliding_inline_slot() {
        let mut m = Memory::new(Profile::Small, 256);
        let table = SymbolTable::bootstrap(&mut m).unwrap();
        // Force two different texts into the same bucket by inserting
        // directly with an identical hash.
        let k1 = m.alloc_bytes_from(b"one").unwrap();
        let k2 = m.alloc_bytes_from(b"two").unwrap();
        table.insert(&mut m, 7, k1, Ref::small_int(1).unwrap()).unwrap();
        table.insert(&mut m, 7, k2, Ref::small_int(2).unwrap()).unwrap();
        let found = table
            .hash_each(&m, 7, |mem, key| mem.bytes(key).unwrap() == b"two")
            .unwrap();
        assert_eq!(found, Some(Ref::small_int(2).unwrap()));
    }
}
