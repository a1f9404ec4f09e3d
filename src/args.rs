//! Module for parsing command-line arguments passed to the compiler.

use std::process;

/// Compiler command-line arguments.
#[derive(Debug)]
pub struct Args {
    /// Name of the program.
    pub program: String,
    /// Compilation phase to terminate at (`lex`, `parse`, or `codegen`).
    ///
    /// Defaults to invoking the full compilation process.
    pub stage: String,
    /// Prefix lexer-output lines with `[DEBUG] l#<n>: `.
    pub debug: bool,
    /// Read source from the fixed path `1in` instead of stdin.
    pub judge: bool,
}

impl Args {
    /// Parses command-line arguments from `std::env::args()`, [exiting] on
    /// error.
    ///
    /// [exiting]: std::process::exit
    pub fn parse() -> Self {
        let mut args = std::env::args();
        let program = args.next().unwrap_or("minicc".into());

        let mut stage = String::new();
        let mut debug = false;
        let mut judge = false;

        while let Some(arg) = args.next() {
            if let Some(flag) = FLAG_REGISTRY
                .iter()
                .find(|flag| flag.names.contains(&arg.as_str()))
            {
                match flag.names {
                    ["-s", "--stage"] => match args.next().as_deref() {
                        Some(name @ ("lex" | "parse" | "codegen")) => {
                            stage = name.to_string();
                        }
                        Some(name) => {
                            eprintln!("{program}: error: invalid stage: '{name}'");
                            print_usage(&program);
                        }
                        None => {
                            eprintln!("{program}: error: missing stage name after '-s'|'--stage'");
                            print_usage(&program);
                        }
                    },
                    ["-d", "--debug"] => debug = true,
                    ["-j", "--judge"] => judge = true,
                    _ => {
                        if let Some(run) = flag.run {
                            run(&program);
                        }
                    }
                }
            } else {
                eprintln!("{program}: error: unexpected argument '{arg}'");
                print_usage(&program);
            }
        }

        Self {
            program,
            stage,
            debug,
            judge,
        }
    }
}

struct Flag {
    names: [&'static str; 2],
    description: &'static str,
    run: Option<fn(&str) -> !>,
}

const FLAG_REGISTRY: &[Flag] = &[
    Flag {
        names: ["-s", "--stage"],
        description: "stop after the specified compilation phase: 'lex', 'parse', or 'codegen'.",
        run: None,
    },
    Flag {
        names: ["-d", "--debug"],
        description: "prefix each lexer-output line with a debug marker.",
        run: None,
    },
    Flag {
        names: ["-j", "--judge"],
        description: "read source from the file '1in' instead of stdin.",
        run: None,
    },
    Flag {
        names: ["-h", "--help"],
        description: "print this summary.",
        run: Some(print_usage),
    },
    Flag {
        names: ["-v", "--version"],
        description: "show version.",
        run: Some(print_version),
    },
];

/// Prints the usage information for the program, exiting with a non-zero
/// status.
pub fn print_usage(program: &str) -> ! {
    eprintln!("usage:");
    eprintln!("      {program} [options] < source");
    eprintln!("options:");

    for flag in FLAG_REGISTRY {
        eprintln!("   {}   {}", flag.names.join(", "), flag.description);
    }

    process::exit(1);
}

fn print_version(program: &str) -> ! {
    println!("{} {}", program, env!("CARGO_PKG_VERSION"));
    process::exit(0);
}
