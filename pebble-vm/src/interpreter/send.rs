//! Method lookup: the superclass-chain walk the cache falls back to, and
//! the super-send's starting point (grounded on
//! `original_source/src/interp.c`'s `findMethod`).

use pebble_types::Ref;

use crate::consts::class_fields;
use crate::error::MemoryError;
use crate::memory::Memory;
use crate::symbol::str_hash;

/// `findMethod`: walk `class`'s superclass chain, testing each class's
/// method dictionary for a key matching `selector`'s bytes. Selectors are
/// always interned `Symbol`s drawn from the one shared global table, so a
/// reference-equality check against each candidate key is sufficient —
/// two equal-text selectors are always the same object.
pub(crate) fn find_method(
    memory: &Memory,
    mut class: Ref,
    selector: Ref,
) -> Result<Option<(Ref, Ref)>, MemoryError> {
    let hash = str_hash(memory.bytes(selector)?);
    loop {
        if class.is_nil() {
            return Ok(None);
        }
        let dict = memory.fetch_pointer(class, class_fields::METHODS)?;
        if !dict.is_nil() {
            let table = crate::symbol::SymbolTable::new(dict);
            if let Some(method) = table.hash_each(memory, hash, |_, key| key == selector)? {
                return Ok(Some((class, method)));
            }
        }
        class = memory.fetch_pointer(class, class_fields::SUPERCLASS)?;
    }
}

/// `SendToSuper`'s starting class: the sending method's own class's
/// superclass, or the owning class itself if it has none.
pub(crate) fn super_lookup_class(memory: &Memory, owning_class: Ref) -> Result<Ref, MemoryError> {
    let superclass = memory.fetch_pointer(owning_class, class_fields::SUPERCLASS)?;
    Ok(if superclass.is_nil() { owning_class } else { superclass })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::file_in::file_in;
    use crate::constructors::bootstrap;
    use pebble_types::Profile;
    use std::io::Cursor;

    fn filed_in(source: &str) -> (Memory, crate::symbol::SymbolTable) {
        let mut memory = Memory::new(Profile::Small, 4096);
        let mut boot = bootstrap(&mut memory).unwrap();
        let mut cursor = Cursor::new(source.as_bytes());
        file_in(&mut memory, &mut boot.constructors, &mut cursor).unwrap();
        (memory, boot.symbols)
    }

    #[test]
    fn find_method_walks_up_to_an_inherited_definition() {
        let (memory, symbols) = filed_in(
            "Class Base Object x\n\
             Class Derived Base y\n\
             Methods Base\n\
             x\n\
             ^ x\n\
             ]\n",
        );
        let derived = symbols.global_symbol(&memory, "Derived").unwrap().unwrap();
        // `x` is both an instance variable and a unary selector here;
        // `global_key` fetches the interned `Symbol` object itself (the
        // method dictionary key), not whatever value happens to be bound
        // under it globally.
        let selector = symbols.global_key(&memory, "x").unwrap().unwrap();

        let found = find_method(&memory, derived, selector).unwrap();
        assert!(found.is_some());
        let (defining_class, _method) = found.unwrap();
        let base = symbols.global_symbol(&memory, "Base").unwrap().unwrap();
        assert_eq!(defining_class, base);
    }

    #[test]
    fn find_method_returns_none_with_no_definition_anywhere_in_the_chain() {
        let (memory, symbols) = filed_in("Class Base Object x\n");
        let base = symbols.global_symbol(&memory, "Base").unwrap().unwrap();
        let name_symbol = memory.fetch_pointer(base, class_fields::NAME).unwrap();
        // No method was ever installed under this selector on any class,
        // so the walk should run off the end of the chain and report
        // nothing rather than error.
        assert!(find_method(&memory, base, name_symbol).unwrap().is_none());
    }

    #[test]
    fn super_lookup_class_starts_one_level_above_the_owning_class() {
        let (memory, symbols) = filed_in("Class Base Object x\nClass Derived Base y\n");
        let derived = symbols.global_symbol(&memory, "Derived").unwrap().unwrap();
        let base = symbols.global_symbol(&memory, "Base").unwrap().unwrap();
        assert_eq!(super_lookup_class(&memory, derived).unwrap(), base);
    }

    #[test]
    fn super_lookup_class_falls_back_to_itself_with_no_superclass() {
        // A bare class name with nothing after it on the line never gets a
        // superclass token, so `SUPERCLASS` stays `nil`.
        let (memory, symbols) = filed_in("Class Root\n");
        let root = symbols.global_symbol(&memory, "Root").unwrap().unwrap();
        assert_eq!(super_lookup_class(&memory, root).unwrap(), root);
    }
}
