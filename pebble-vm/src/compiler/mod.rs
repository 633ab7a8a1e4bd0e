//! Method compiler: turns one method's source text into a compiled
//! `Method` object.

mod parser;
mod scope;

pub mod file_in;

use pebble_types::Ref;

use crate::consts::method_fields;
use crate::constructors::Constructors;
use crate::error::CompileError;
use crate::memory::Memory;

use parser::Parser;

/// The result of a successful [`compile_method`] call.
#[derive(Debug, Clone, Copy)]
pub struct CompiledMethod {
    /// The freshly built `Method` object.
    pub method: Ref,
    /// The method's selector symbol (also reachable via
    /// [`method_fields::SELECTOR`] on `method`).
    pub selector: Ref,
}

/// Compile `source` as a method of `class`, returning the finished `Method`
/// object. `class` may be `nil` for a top-level "do it" expression, which
/// compiles with an empty instance-variable scope.
///
/// Mirrors `original_source/src/parser.c`'s two-step protocol: instance
/// variables are flattened from `class`'s superclass chain first
/// (`setInstanceVariables`), then the method body is parsed against that
/// fixed scope (`parse`). Unlike the source, a syntax error here is
/// reported immediately via `Result` rather than limping on with a
/// `parseok` flag — the caller discards the method either way.
pub fn compile_method(
    memory: &mut Memory,
    constructors: &mut Constructors,
    class: Ref,
    source: &str,
    save_text: bool,
) -> Result<CompiledMethod, CompileError> {
    let instance_names = scope::flatten_instance_vars(memory, class)?;
    let mut parser = Parser::new(memory, constructors, source, instance_names);
    parser.parse_method()?;
    let (code, literals, max_temporary, selector_text) = parser.into_parts();

    let selector = constructors.new_symbol(memory, &selector_text)?;
    let bytecodes = memory.alloc_bytes_from(&code)?;
    let literals_obj = if literals.is_empty() {
        Ref::NIL
    } else {
        let arr = constructors.new_array(memory, literals.len())?;
        for (i, lit) in literals.iter().enumerate() {
            memory.store_pointer(arr, i + 1, *lit)?;
        }
        arr
    };

    let method = constructors.new_method(memory)?;
    memory.store_pointer(method, method_fields::SELECTOR, selector)?;
    memory.store_pointer(method, method_fields::BYTECODES, bytecodes)?;
    memory.store_pointer(method, method_fields::LITERALS, literals_obj)?;
    let stack_size = Ref::small_int(6).expect("6 is always representable");
    memory.store_pointer(method, method_fields::STACK_SIZE, stack_size)?;
    let temporary_size =
        Ref::small_int((1 + max_temporary) as i32).ok_or_else(|| CompileError::LimitExceeded {
            limit: "temporaries",
            max: crate::consts::method_limits::MAX_TEMPORARIES,
        })?;
    memory.store_pointer(method, method_fields::TEMPORARY_SIZE, temporary_size)?;
    memory.store_pointer(method, method_fields::METHOD_CLASS, class)?;
    if save_text {
        let text = constructors.new_st_string(memory, source)?;
        memory.store_pointer(method, method_fields::TEXT, text)?;
    }

    Ok(CompiledMethod { method, selector })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructors::bootstrap;
    use pebble_asm::{Bytecode, Special};
    use pebble_types::Profile;

    #[test]
    fn compiles_a_trivial_return_method() {
        let mut memory = Memory::new(Profile::Small, 4096);
        let mut boot = bootstrap(&mut memory).unwrap();
        let compiled = compile_method(&mut memory, &mut boot.constructors, Ref::NIL, "foo ^ 3 + 4", true)
            .expect("compiles");
        let selector_bytes = memory
            .bytes(memory.fetch_pointer(compiled.method, method_fields::SELECTOR).unwrap())
            .unwrap();
        assert_eq!(selector_bytes, b"foo");

        let bytecodes = memory
            .fetch_pointer(compiled.method, method_fields::BYTECODES)
            .unwrap();
        let code = memory.bytes(bytecodes).unwrap();
        // The method ends with PopTop; SelfReturn regardless of the
        // explicit `^`, since the fall-through epilogue is unconditional.
        let mut offset = 0;
        let mut decoded = Vec::new();
        while offset < code.len() {
            let (bc, used) = Bytecode::decode(code, offset).unwrap();
            decoded.push(bc);
            offset += used;
        }
        assert_eq!(
            decoded.last(),
            Some(&Bytecode::DoSpecial(Special::SelfReturn))
        );
        assert_eq!(
            decoded[decoded.len() - 2],
            Bytecode::DoSpecial(Special::StackReturn)
        );
    }

    #[test]
    fn undeclared_name_compiles_to_a_deferred_global_lookup() {
        let mut memory = Memory::new(Profile::Small, 4096);
        let mut boot = bootstrap(&mut memory).unwrap();
        let compiled =
            compile_method(&mut memory, &mut boot.constructors, Ref::NIL, "foo ^ Transcript", true)
                .expect("compiles even though Transcript is unknown");
        let literals = memory
            .fetch_pointer(compiled.method, method_fields::LITERALS)
            .unwrap();
        assert!(!literals.is_nil());
    }

    #[test]
    fn instance_variable_limit_is_enforced() {
        let mut memory = Memory::new(Profile::Small, 4096);
        let mut boot = bootstrap(&mut memory).unwrap();
        let class = boot.constructors.new_class(&mut memory, "Big").unwrap();
        let names: Vec<String> = (0..40).map(|i| format!("v{i}")).collect();
        let vars = boot.constructors.new_array(&mut memory, names.len()).unwrap();
        for (i, n) in names.iter().enumerate() {
            let sym = boot.constructors.new_symbol(&mut memory, n).unwrap();
            memory.store_pointer(vars, i + 1, sym).unwrap();
        }
        memory
            .store_pointer(class, crate::consts::class_fields::VARIABLE_NAMES, vars)
            .unwrap();
        let result = compile_method(&mut memory, &mut boot.constructors, class, "foo ^ self", true);
        assert!(matches!(result, Err(CompileError::LimitExceeded { .. })));
    }
}
