//! Compiler driver that orchestrates the staged pipeline: lexical analysis,
//! LR(1) parsing with translation, and object code generation. Each stage's
//! textual output feeds the next; the selected stage's output is printed to
//! stdout.

use std::io::Read;

use crate::args::Args;
use crate::compiler::{codegen, lexer, parser};
use crate::error::{CompileError, CompileResult};

/// Runs the pipeline for the given arguments, printing the selected stage's
/// output.
///
/// # Errors
///
/// Returns the first fatal error from any stage; the caller prints its single
/// diagnostic line and exits non-zero.
pub fn run_compiler(args: &Args) -> CompileResult<()> {
    let source = read_source(args)?;
    let output = compile(&source, &args.stage, args.debug)?;
    print!("{output}");
    Ok(())
}

/// Compiles `source` up to and including `stage` (`lex`, `parse`, or
/// anything else for the full chain), returning the stage's textual output.
pub fn compile(source: &str, stage: &str, debug: bool) -> CompileResult<String> {
    let tokens = lexer::lex(source)?;

    if stage == "lex" {
        let mut out = String::new();
        for (i, token) in tokens.iter().enumerate() {
            if debug {
                out.push_str(&format!("[DEBUG] l#{}: {token}\n", i + 1));
            } else {
                out.push_str(&format!("{token}\n"));
            }
        }
        return Ok(out);
    }

    let ir = parser::Parser::new().parse(&tokens)?;
    if stage == "parse" {
        return Ok(ir);
    }

    codegen::generate(&ir)
}

/// Reads the full source text: stdin normally, the fixed path `1in` in judge
/// mode.
fn read_source(args: &Args) -> CompileResult<String> {
    if args.judge {
        return std::fs::read_to_string("1in").map_err(|err| {
            log::debug!("failed to read judge input: {err}");
            CompileError::ReadInput
        });
    }

    let mut source = String::new();
    std::io::stdin()
        .read_to_string(&mut source)
        .map_err(|err| {
            log::debug!("failed to read stdin: {err}");
            CompileError::ReadInput
        })?;
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_program_compiles_to_a_bare_halt() {
        assert_eq!(compile("", "codegen", false).unwrap(), "halt\n");
    }

    #[test]
    fn lex_stage_lists_tokens_line_by_line() {
        let out = compile("int a; a=1;", "lex", false).unwrap();
        assert_eq!(
            out,
            "int INTSYM\n\
             a IDENT\n\
             ; SEMICOLON\n\
             a IDENT\n\
             = AO\n\
             1 INT\n\
             ; SEMICOLON\n"
        );
    }

    #[test]
    fn debug_mode_prefixes_lexer_lines() {
        let out = compile("int a;", "lex", true).unwrap();
        assert_eq!(
            out,
            "[DEBUG] l#1: int INTSYM\n\
             [DEBUG] l#2: a IDENT\n\
             [DEBUG] l#3: ; SEMICOLON\n"
        );
    }

    #[test]
    fn parse_stage_emits_the_serialized_ir() {
        let out = compile("int a; a=1+2;", "parse", false).unwrap();
        assert!(out.starts_with("1\na 0 null 0\n"));
        assert!(out.ends_with("4: (End,-,-,-)\n"));
    }

    #[test]
    fn full_chain_stores_the_computed_value() {
        let out = compile("int a; a=1+2;", "codegen", false).unwrap();
        assert_eq!(out.matches("halt").count(), 1);
        assert!(out.contains("mov [ebp-0], R0"));
    }

    #[test]
    fn full_chain_while_loop_contains_a_back_jump() {
        let out = compile("int i; i=0; while(i<10 && i>=0) do i=i+1;", "codegen", false).unwrap();
        assert!(out.contains("jmp ?2\n"));
        assert!(out.contains("?2:\n"));
    }

    #[test]
    fn duplicate_declaration_is_a_single_syntax_error() {
        let err = compile("int a; double a; a=1;", "codegen", false).unwrap_err();
        assert_eq!(err.to_string(), "Syntax Error");
    }

    #[test]
    fn malformed_number_halts_before_parsing() {
        let err = compile("int a; a = 1..2;", "codegen", false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed number: More than one decimal point in a floating point number."
        );
    }
}
