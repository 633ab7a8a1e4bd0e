//! End-to-end scenarios driven entirely through `Interpreter`'s public
//! surface: compiling and running real message sends, not just exercising
//! one layer in isolation.

use std::io::Cursor;

use pebble_types::{Profile, Ref};
use pebble_vm::Interpreter;

fn fresh() -> Interpreter {
    Interpreter::bootstrap(Profile::Small, 4096).expect("bootstrap")
}

fn file_in(interp: &mut Interpreter, source: &str) {
    let mut cursor = Cursor::new(source.as_bytes());
    interp.file_in(&mut cursor).expect("file-in");
}

#[test]
fn nil_is_nil_via_a_filed_in_method() {
    let mut interp = fresh();
    file_in(&mut interp, "Methods UndefinedObject\nisNil\n^ true\n]\n");

    let result = interp.eval("doIt\n^ nil isNil").expect("eval");
    assert_eq!(result, interp.true_obj());
}

#[test]
fn message_not_understood_resends_with_selector_and_packed_arguments() {
    let mut interp = fresh();
    file_in(
        &mut interp,
        "Methods UndefinedObject\n\
         message: sel notRecognizedWithArguments: args\n\
         ^ sel\n\
         ]\n",
    );

    let process = interp.new_process(256).expect("process");
    interp
        .spawn_send(process, Ref::NIL, "thisSelectorIsNotDefined", &[])
        .expect("spawn");
    let result = interp.run_until_finished(process, 10_000).expect("run");

    let expected_selector = interp
        .eval("doIt\n^ #thisSelectorIsNotDefined")
        .expect("intern via literal");
    assert_eq!(result, expected_selector);
}

#[test]
fn arithmetic_overflow_falls_back_to_an_ordinary_send() {
    let mut interp = fresh();
    // No `Integer>>+` is ever installed, so once the `60` fast path
    // declines (the sum overflows a small integer) the retried send lands
    // on an ordinary method-not-understood, proving the fallback actually
    // dispatches rather than silently wrapping or panicking.
    file_in(
        &mut interp,
        "Methods Object\n\
         message: sel notRecognizedWithArguments: args\n\
         ^ #overflowed\n\
         ]\n",
    );
    file_in(&mut interp, "Class Integer Object\n");

    let max = i32::MAX;
    let source = format!("doIt\n^ {max} + 2");
    let result = interp.eval(&source).expect("eval");

    let overflowed = interp.eval("doIt\n^ #overflowed").expect("intern via literal");
    assert_eq!(result, overflowed);
}

#[test]
fn recompiling_a_method_flushes_its_cache_bucket() {
    let mut interp = fresh();
    file_in(&mut interp, "Methods UndefinedObject\nprobe\n^ 1\n]\n");

    let first = interp.eval("doIt\n^ nil probe").expect("first eval");
    assert_eq!(first.as_small_int(), Some(1));
    // Send it again so the inline cache actually has a hit cached for
    // `(probe, UndefinedObject)` before the method underneath changes.
    let cached = interp.eval("doIt\n^ nil probe").expect("cached eval");
    assert_eq!(cached.as_small_int(), Some(1));

    let undefined_object = interp
        .symbols()
        .global_symbol(interp.memory(), "UndefinedObject")
        .expect("lookup")
        .expect("class exists");
    interp
        .recompile_method(undefined_object, "probe\n^ 2")
        .expect("recompile");

    let after = interp.eval("doIt\n^ nil probe").expect("post-recompile eval");
    assert_eq!(after.as_small_int(), Some(2));
}

#[test]
fn image_round_trip_preserves_object_count_and_method_behavior() {
    let mut interp = fresh();
    file_in(&mut interp, "Methods UndefinedObject\nisNil\n^ true\n]\n");

    let before_count = interp.memory().live_count();

    let mut bytes = Vec::new();
    interp.write_image(&mut bytes).expect("write image");

    let mut loaded =
        Interpreter::load_image(Profile::Small, 4096, Cursor::new(bytes)).expect("load image");

    assert_eq!(loaded.memory().live_count(), before_count);

    let class = loaded
        .symbols()
        .global_symbol(loaded.memory(), "UndefinedObject")
        .expect("lookup")
        .expect("class survives the round trip");
    assert_eq!(loaded.memory().class_of(Ref::NIL).expect("nil's class"), class);

    let result = loaded.eval("doIt\n^ nil isNil").expect("eval after reload");
    assert_eq!(result, loaded.true_obj());
}
