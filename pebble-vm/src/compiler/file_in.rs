//! Line-oriented file-in protocol (grounded on
//! `original_source/src/filein.c`).
//!
//! Unlike `filein.c`'s fixed `char textBuffer[4000]` accumulated with
//! `strncat`, every method's source text here grows in a plain `String` —
//! there is no analogue of the original's silent truncation past its
//! buffer size.

use std::io::BufRead;

use pebble_types::Ref;

use crate::consts::class_fields;
use crate::constructors::Constructors;
use crate::error::{CompileError, MemoryError};
use crate::lexer::{Lexer, Token};
use crate::memory::Memory;
use crate::symbol::{str_hash, SymbolTable};

use super::compile_method;

fn read_line<R: BufRead>(reader: &mut R, buf: &mut String) -> Result<bool, MemoryError> {
    buf.clear();
    let n = reader.read_line(buf)?;
    Ok(n > 0)
}

/// `findClass`: the named class, creating it (with size 0) if it doesn't
/// exist yet.
fn find_class(
    memory: &mut Memory,
    constructors: &mut Constructors,
    name: &str,
) -> Result<Ref, CompileError> {
    let class = match constructors.symbols().global_symbol(memory, name)? {
        Some(existing) if !existing.is_nil() => existing,
        _ => constructors.new_class(memory, name)?,
    };
    if memory
        .fetch_pointer(class, class_fields::INSTANCE_SIZE)?
        .is_nil()
    {
        memory.store_pointer(class, class_fields::INSTANCE_SIZE, Ref::small_int(0).unwrap())?;
    }
    Ok(class)
}

/// `readClassDeclaration`: `Class <name> [<superclass> [<ivar> ...]]`, the
/// remaining tokens on the same line as the already-consumed `Class`
/// keyword.
fn read_class_declaration(
    memory: &mut Memory,
    constructors: &mut Constructors,
    lexer: &mut Lexer,
) -> Result<(), CompileError> {
    let name = match lexer.next_token() {
        Token::NameConst(n) => n,
        other => {
            return Err(CompileError::Syntax {
                context: "file-in".into(),
                message: format!("expected a class name, found {other:?}"),
            })
        }
    };
    let class = find_class(memory, constructors, &name)?;

    let mut own_size = 0usize;
    let mut names: Vec<String> = Vec::new();

    match lexer.next_token() {
        Token::NameConst(super_name) => {
            let superclass = find_class(memory, constructors, &super_name)?;
            memory.store_pointer(class, class_fields::SUPERCLASS, superclass)?;
            loop {
                match lexer.next_token() {
                    Token::NameConst(ivar) => {
                        names.push(ivar);
                        own_size += 1;
                    }
                    _ => break,
                }
            }
        }
        _ => {}
    }

    let inherited_size = {
        let superclass = memory.fetch_pointer(class, class_fields::SUPERCLASS)?;
        if superclass.is_nil() {
            0
        } else {
            memory
                .fetch_pointer(superclass, class_fields::INSTANCE_SIZE)?
                .as_small_int()
                .unwrap_or(0) as usize
        }
    };

    if !names.is_empty() {
        let vars = constructors.new_array(memory, names.len())?;
        for (i, n) in names.iter().enumerate() {
            let sym = constructors.new_symbol(memory, n)?;
            memory.store_pointer(vars, i + 1, sym)?;
        }
        memory.store_pointer(class, class_fields::VARIABLE_NAMES, vars)?;
    }

    let total = inherited_size + own_size;
    let total_ref = Ref::small_int(total as i32).ok_or_else(|| CompileError::Syntax {
        context: "file-in".into(),
        message: format!("class size {total} does not fit a small integer"),
    })?;
    memory.store_pointer(class, class_fields::INSTANCE_SIZE, total_ref)?;

    Ok(())
}

/// Insert `method` into `dict` (a method dictionary, distinct from the
/// global symbol table but built from the same triple-chained bucket
/// array) keyed by `selector`.
fn insert_method(
    memory: &mut Memory,
    dict: Ref,
    selector: Ref,
    method: Ref,
) -> Result<(), MemoryError> {
    let table = SymbolTable::new(dict);
    let bytes = memory.bytes(selector)?.to_vec();
    table.insert(memory, str_hash(&bytes), selector, method)
}

/// `readMethods`: `Methods <className>` (the class name on the same line
/// as the already-consumed `Methods` keyword), followed by a run of
/// method source chunks each terminated by a `|`-prefixed or `]`-prefixed
/// line.
fn read_methods<R: BufRead>(
    memory: &mut Memory,
    constructors: &mut Constructors,
    lexer: &mut Lexer,
    reader: &mut R,
) -> Result<(), CompileError> {
    let class_name = match lexer.next_token() {
        Token::NameConst(n) => n,
        other => {
            return Err(CompileError::Syntax {
                context: "file-in".into(),
                message: format!("expected a class name after Methods, found {other:?}"),
            })
        }
    };
    let class = find_class(memory, constructors, &class_name)?;

    let dict = {
        let existing = memory.fetch_pointer(class, class_fields::METHODS)?;
        if existing.is_nil() {
            let dict = constructors.new_dictionary(memory)?;
            memory.store_pointer(class, class_fields::METHODS, dict)?;
            dict
        } else {
            existing
        }
    };

    let mut pending = String::new();
    let mut line = String::new();

    loop {
        let mut source = String::new();
        if pending.starts_with('|') {
            source.push_str(&pending[1..]);
        }

        loop {
            if !read_line(reader, &mut line)? {
                return Err(CompileError::Syntax {
                    context: "file-in".into(),
                    message: "unexpected end of file while reading a method".into(),
                });
            }
            if line.starts_with('|') || line.starts_with(']') {
                break;
            }
            source.push_str(&line);
        }

        match compile_method(memory, constructors, class, &source, true) {
            Ok(compiled) => insert_method(memory, dict, compiled.selector, compiled.method)?,
            Err(_) => {
                // The offending method is discarded; file-in continues
                // with the next one, matching `filein.c`'s `parseok`
                // recovery.
            }
        }

        pending = std::mem::take(&mut line);
        if pending.starts_with(']') {
            break;
        }
    }

    Ok(())
}

/// `fileIn`: read class declarations and method batches from `reader`
/// until exhausted. Blank lines and lines starting with `*` (a comment
/// token in this protocol) are skipped; any other leading token is a
/// fatal syntax error.
pub fn file_in<R: BufRead>(
    memory: &mut Memory,
    constructors: &mut Constructors,
    reader: &mut R,
) -> Result<(), CompileError> {
    let mut line = String::new();
    while read_line(reader, &mut line)? {
        let mut lexer = Lexer::new(&line);
        match lexer.next_token() {
            Token::InputEnd => continue,
            Token::Binary(ref s) if s == "*" => continue,
            Token::NameConst(ref s) if s == "Class" => {
                read_class_declaration(memory, constructors, &mut lexer)?;
            }
            Token::NameConst(ref s) if s == "Methods" => {
                read_methods(memory, constructors, &mut lexer, reader)?;
            }
            other => {
                return Err(CompileError::Syntax {
                    context: "file-in".into(),
                    message: format!("unrecognized line starting with {other:?}"),
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructors::bootstrap;
    use pebble_types::Profile;
    use std::io::Cursor;

    #[test]
    fn declares_a_class_with_inherited_and_own_variables() {
        let mut memory = Memory::new(Profile::Small, 4096);
        let mut boot = bootstrap(&mut memory).unwrap();

        let source = "Class Base Object x\nClass Derived Base y z\n";
        let mut cursor = Cursor::new(source.as_bytes());
        file_in(&mut memory, &mut boot.constructors, &mut cursor).unwrap();

        let base = boot
            .symbols
            .global_symbol(&memory, "Base")
            .unwrap()
            .unwrap();
        let derived = boot
            .symbols
            .global_symbol(&memory, "Derived")
            .unwrap()
            .unwrap();

        assert_eq!(
            memory
                .fetch_pointer(base, class_fields::INSTANCE_SIZE)
                .unwrap()
                .as_small_int(),
            Some(1)
        );
        assert_eq!(
            memory
                .fetch_pointer(derived, class_fields::INSTANCE_SIZE)
                .unwrap()
                .as_small_int(),
            Some(3)
        );
        assert_eq!(
            memory.fetch_pointer(derived, class_fields::SUPERCLASS).unwrap(),
            base
        );
    }

    #[test]
    fn files_in_methods_and_skips_a_bad_one() {
        let mut memory = Memory::new(Profile::Small, 4096);
        let mut boot = bootstrap(&mut memory).unwrap();

        let source = "Class Point Object x y\n\
                       Methods Point\n\
                       x\n\
                       ^ x\n\
                       |\n\
                       bad\n\
                       ^ )\n\
                       |\n\
                       y\n\
                       ^ y\n\
                       ]\n";
        let mut cursor = Cursor::new(source.as_bytes());
        file_in(&mut memory, &mut boot.constructors, &mut cursor).unwrap();

        let point = boot
            .symbols
            .global_symbol(&memory, "Point")
            .unwrap()
            .unwrap();
        let dict = memory.fetch_pointer(point, class_fields::METHODS).unwrap();
        assert!(!dict.is_nil());

        let table = SymbolTable::new(dict);
        let x_method = table.global_symbol(&memory, "x").unwrap();
        let y_method = table.global_symbol(&memory, "y").unwrap();
        assert!(x_method.is_some());
        assert!(y_method.is_some());
    }
}
