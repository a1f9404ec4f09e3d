//! Compiler for a small imperative language with `int` and `double` scalars,
//! targeting a three-register abstract x86-like machine.
//!
//! The pipeline runs three stages over line-oriented text boundaries:
//! lexical analysis, LR(1) parsing with syntax-directed translation into a
//! quadruple IR, and object code generation. A stage selector on the command
//! line stops the driver after any stage.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod compiler;

mod args;
mod error;

use std::process;

fn main() {
    env_logger::init();

    let args = args::Args::parse();
    if let Err(err) = compiler::driver::run_compiler(&args) {
        // Diagnostics are part of the output contract: one line, stdout.
        println!("{err}");
        process::exit(1);
    }
}
