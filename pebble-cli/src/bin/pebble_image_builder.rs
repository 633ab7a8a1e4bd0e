//! The pebble image builder: bootstrap a fresh image, file in each given
//! source, run its `initialize` protocol, and write the result to disk
//! (grounded on `original_source/src/initial.c`).
//!
//! Each file argument is loaded the same way the original driver's
//! `goDoIt` does it: not through this crate's own [`Interpreter::file_in`]
//! line-oriented reader directly, but by compiling and running the
//! doc-documented three-primitive expression (`open`, `file in`, `close`)
//! as a top-level "do it" against the image being built, so a
//! hand-written bootstrap source can drive the same open/parse/close
//! primitives a user program would.

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pebble_cli::{init_tracing, ProfileArg};
use pebble_vm::Interpreter;

/// Build a pebble image from a bootstrap plus zero or more source files.
#[derive(Debug, Parser)]
#[command(name = "pebble-image-builder", version, about = "Build a fresh pebble image from source files")]
struct Args {
    /// Source files to file in, in order, before evaluating `x nil initialize`.
    files: Vec<PathBuf>,

    /// Wire-format profile for the image being built.
    #[arg(long, value_enum, default_value_t = ProfileArg::Small)]
    profile: ProfileArg,

    /// Object table capacity to allocate; defaults to the profile's own
    /// default capacity.
    #[arg(long)]
    capacity: Option<usize>,

    /// Path the finished image is written to.
    #[arg(short = 'o', long = "output", default_value = "systemImage")]
    output: PathBuf,
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    let profile: pebble_types::Profile = args.profile.into();
    let capacity = args.capacity.unwrap_or_else(|| profile.default_capacity());

    let mut interpreter = match Interpreter::bootstrap(profile, capacity) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("cannot bootstrap image: {e}");
            return ExitCode::FAILURE;
        }
    };

    for path in &args.files {
        eprintln!("{}:", path.display());
        // `''` is Smalltalk's own escape for an embedded quote in a string
        // literal, so a path containing one still round-trips through the
        // `<120 1 '...' 'r'>` expression.
        let quoted = path.display().to_string().replace('\'', "''");
        let source = format!("x <120 1 '{quoted}' 'r'>. <123 1>. <121 1>");
        if let Err(e) = interpreter.eval(&source) {
            eprintln!("cannot file in {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    }

    eprintln!("initialization");
    if let Err(e) = interpreter.eval("x nil initialize") {
        eprintln!("cannot initialize: {e}");
        return ExitCode::FAILURE;
    }
    eprintln!("finished");

    let file = match File::create(&args.output) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("cannot create {}: {e}", args.output.display());
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = interpreter.write_image(file) {
        eprintln!("cannot write image: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
