//! The pebble runtime: load an image, optionally hand it a startup script,
//! and drive its `systemProcess` to completion.
//!
//! Mirrors `original_source/src/st.c`'s `main`/`run`: open the named image
//! (default `systemImage`), record an `-e` script into the global
//! `launchscript` for the image's own Smalltalk code to interpret, then
//! step `systemProcess` in a fixed-size quantum loop until it finishes.

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pebble_cli::{init_tracing, ProfileArg};
use pebble_vm::Interpreter;

/// Run a pebble image.
#[derive(Debug, Parser)]
#[command(name = "pebble-image", version, about = "Load and run a pebble image")]
struct Args {
    /// Path to the image file to load.
    #[arg(default_value = "systemImage")]
    image: PathBuf,

    /// Startup script recorded into the global `launchscript`; interpreting
    /// it is left entirely to the image's own Smalltalk code.
    #[arg(short = 'e', long = "eval", value_name = "SOURCE")]
    eval: Option<String>,

    /// Wire-format profile the image was written under.
    #[arg(long, value_enum, default_value_t = ProfileArg::Small)]
    profile: ProfileArg,

    /// Object table capacity to allocate; defaults to the profile's own
    /// default capacity.
    #[arg(long)]
    capacity: Option<usize>,

    /// Bytecodes to execute per scheduling quantum.
    #[arg(long, default_value_t = 15_000)]
    quantum: u32,
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    let profile: pebble_types::Profile = args.profile.into();
    let capacity = args.capacity.unwrap_or_else(|| profile.default_capacity());

    let file = match File::open(&args.image) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("cannot open image: {}: {e}", args.image.display());
            return ExitCode::FAILURE;
        }
    };

    let mut interpreter = match Interpreter::load_image(profile, capacity, file) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("cannot load image: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(script) = &args.eval {
        match interpreter.symbols().global_symbol(interpreter.memory(), "launchscript") {
            Ok(Some(launchscript)) if !launchscript.is_nil() => {
                if let Err(e) = interpreter.memory_mut().set_bytes(launchscript, script.as_bytes()) {
                    eprintln!("cannot set launchscript: {e}");
                    return ExitCode::FAILURE;
                }
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("cannot look up launchscript: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let process = match interpreter.symbols().global_symbol(interpreter.memory(), "systemProcess") {
        Ok(Some(p)) if !p.is_nil() => p,
        Ok(_) => {
            eprintln!("no initial process: in image");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("cannot look up systemProcess: {e}");
            return ExitCode::FAILURE;
        }
    };

    match interpreter.run_until_finished(process, args.quantum) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
