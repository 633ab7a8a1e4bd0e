//! Instance-variable flattening (grounded on
//! `original_source/src/parser.c`'s `setInstanceVariables`).

use pebble_types::Ref;

use crate::consts::{class_fields, method_limits};
use crate::error::{CompileError, MemoryError};
use crate::memory::Memory;

/// Walk `class`'s superclass chain and return the flattened instance
/// variable name list, inherited variables first, matching the index
/// order `PushInstance`/`AssignInstance` assume. `class` may be `nil`
/// (top-level "do it" expressions compile with no instance scope).
pub fn flatten_instance_vars(memory: &Memory, class: Ref) -> Result<Vec<String>, CompileError> {
    if class.is_nil() {
        return Ok(Vec::new());
    }
    let superclass = memory.fetch_pointer(class, class_fields::SUPERCLASS)?;
    let mut names = flatten_instance_vars(memory, superclass)?;
    let own = own_instance_vars(memory, class)?;
    names.extend(own);
    if names.len() > method_limits::MAX_INSTANCE_VARS {
        return Err(CompileError::LimitExceeded {
            limit: "instance variables",
            max: method_limits::MAX_INSTANCE_VARS,
        });
    }
    Ok(names)
}

fn own_instance_vars(memory: &Memory, class: Ref) -> Result<Vec<String>, MemoryError> {
    let names_array = memory.fetch_pointer(class, class_fields::VARIABLE_NAMES)?;
    if names_array.is_nil() {
        return Ok(Vec::new());
    }
    let count = memory.size_of(names_array)?;
    let mut out = Vec::with_capacity(count as usize);
    for i in 1..=count as usize {
        let sym = memory.fetch_pointer(names_array, i)?;
        let bytes = memory.bytes(sym)?;
        out.push(String::from_utf8_lossy(bytes).into_owned());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructors::bootstrap;
    use pebble_types::Profile;

    #[test]
    fn flattens_inherited_before_own_variables() {
        let mut memory = Memory::new(Profile::Small, 1024);
        let mut boot = bootstrap(&mut memory).unwrap();

        let base = boot.constructors.new_class(&mut memory, "Base").unwrap();
        let base_vars = boot.constructors.new_array(&mut memory, 1).unwrap();
        let x_sym = boot.constructors.new_symbol(&mut memory, "x").unwrap();
        memory.store_pointer(base_vars, 1, x_sym).unwrap();
        memory.store_pointer(base, class_fields::VARIABLE_NAMES, base_vars).unwrap();

        let derived = boot.constructors.new_class(&mut memory, "Derived").unwrap();
        memory.store_pointer(derived, class_fields::SUPERCLASS, base).unwrap();
        let derived_vars = boot.constructors.new_array(&mut memory, 1).unwrap();
        let y_sym = boot.constructors.new_symbol(&mut memory, "y").unwrap();
        memory.store_pointer(derived_vars, 1, y_sym).unwrap();
        memory.store_pointer(derived, class_fields::VARIABLE_NAMES, derived_vars).unwrap();

        let flattened = flatten_instance_vars(&memory, derived).unwrap();
        assert_eq!(flattened, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn nil_class_has_no_instance_scope() {
        let memory = Memory::new(Profile::Small, 64);
        assert!(flatten_instance_vars(&memory, Ref::NIL).unwrap().is_empty());
    }
}
