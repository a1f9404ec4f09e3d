//! Lexical Analysis
//!
//! Compiler pass that tokenizes source code, producing an ordered sequence of
//! `(lexeme, class)` pairs.
//!
//! The scan proceeds in three phases: comment stripping, operator padding
//! (longest match first, so `<=` wins over `<`), and whitespace splitting
//! with a character-level rescan of each run. Malformed numbers and stray
//! characters are collected during the rescan; if any were found, only the
//! error with the lowest class number is reported and no tokens are produced.

use std::fmt;

use crate::error::{CompileError, CompileResult};

/// Reserved words of the source language.
const KEYWORDS: [(&str, TokenClass); 8] = [
    ("int", TokenClass::IntSym),
    ("double", TokenClass::DoubleSym),
    ("scanf", TokenClass::ScanfSym),
    ("printf", TokenClass::PrintfSym),
    ("if", TokenClass::IfSym),
    ("then", TokenClass::ThenSym),
    ("while", TokenClass::WhileSym),
    ("do", TokenClass::DoSym),
];

/// Operator and punctuation lexemes. Two-byte entries must be matched before
/// one-byte entries.
const OPERATORS: [(&str, TokenClass); 20] = [
    ("==", TokenClass::Ro),
    ("!=", TokenClass::Ro),
    ("<=", TokenClass::Ro),
    (">=", TokenClass::Ro),
    ("&&", TokenClass::Lo),
    ("||", TokenClass::Lo),
    ("=", TokenClass::Ao),
    ("<", TokenClass::Ro),
    (">", TokenClass::Ro),
    ("!", TokenClass::Lo),
    ("+", TokenClass::Plus),
    ("-", TokenClass::Minus),
    ("*", TokenClass::Times),
    ("/", TokenClass::Division),
    (",", TokenClass::Comma),
    ("(", TokenClass::Brace),
    (")", TokenClass::Brace),
    ("{", TokenClass::Brace),
    ("}", TokenClass::Brace),
    (";", TokenClass::Semicolon),
];

/// Classes of lexical elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TokenClass {
    Ident,
    Int,
    Double,
    Plus,
    Minus,
    Times,
    Division,
    Ao,
    Ro,
    Lo,
    Brace,
    Comma,
    Semicolon,
    IntSym,
    DoubleSym,
    ScanfSym,
    PrintfSym,
    IfSym,
    ThenSym,
    WhileSym,
    DoSym,
}

impl TokenClass {
    /// Serialized class name used in lexer output lines.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenClass::Ident => "IDENT",
            TokenClass::Int => "INT",
            TokenClass::Double => "DOUBLE",
            TokenClass::Plus => "PLUS",
            TokenClass::Minus => "MINUS",
            TokenClass::Times => "TIMES",
            TokenClass::Division => "DIVISION",
            TokenClass::Ao => "AO",
            TokenClass::Ro => "RO",
            TokenClass::Lo => "LO",
            TokenClass::Brace => "BRACE",
            TokenClass::Comma => "COMMA",
            TokenClass::Semicolon => "SEMICOLON",
            TokenClass::IntSym => "INTSYM",
            TokenClass::DoubleSym => "DOUBLESYM",
            TokenClass::ScanfSym => "SCANFSYM",
            TokenClass::PrintfSym => "PRINTFSYM",
            TokenClass::IfSym => "IFSYM",
            TokenClass::ThenSym => "THENSYM",
            TokenClass::WhileSym => "WHILESYM",
            TokenClass::DoSym => "DOSYM",
        }
    }
}

/// Minimal lexical element of the source language.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Token {
    pub lexeme: String,
    pub class: TokenClass,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.lexeme, self.class.as_str())
    }
}

/// Accumulates tokens and lexical errors while scanning whitespace-separated
/// runs of the preprocessed source.
#[derive(Debug, Default)]
struct Lexer {
    tokens: Vec<Token>,
    errors: Vec<CompileError>,
}

/// Tokenizes `source`, returning the token sequence.
///
/// # Errors
///
/// Returns the lowest-class lexical error if any part of the input is
/// malformed. No tokens are produced in that case.
pub fn lex(source: &str) -> CompileResult<Vec<Token>> {
    let text = pad_operators(&strip_comments(source));

    let mut lexer = Lexer::default();
    for run in text.split([' ', '\n', '\t']) {
        if !run.is_empty() {
            lexer.process_run(run);
        }
    }

    if let Some(err) = lexer.errors.iter().min_by_key(|e| e.class()) {
        return Err(err.clone());
    }

    Ok(lexer.tokens)
}

/// Removes block comments, then line comments. An unterminated comment of
/// either kind swallows the rest of the input. The operation is idempotent.
fn strip_comments(source: &str) -> String {
    let mut text = source.to_string();

    while let Some(start) = text.find("/*") {
        match text[start + 2..].find("*/") {
            Some(rel) => text.replace_range(start..start + rel + 4, ""),
            None => text.truncate(start),
        }
    }

    while let Some(start) = text.find("//") {
        match text[start..].find('\n') {
            Some(rel) => text.replace_range(start..start + rel + 1, ""),
            None => text.truncate(start),
        }
    }

    text
}

/// Surrounds every operator lexeme with spaces so the whitespace split
/// isolates it. Two-byte operators are matched before one-byte operators.
fn pad_operators(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 2);

    let mut i = 0;
    while i < bytes.len() {
        if i + 2 <= bytes.len() && operator_class(&bytes[i..i + 2]).is_some() {
            out.push(b' ');
            out.extend_from_slice(&bytes[i..i + 2]);
            out.push(b' ');
            i += 2;
        } else if operator_class(&bytes[i..i + 1]).is_some() {
            out.push(b' ');
            out.push(bytes[i]);
            out.push(b' ');
            i += 1;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).expect("padding only inserts ASCII spaces")
}

fn keyword_class(run: &str) -> Option<TokenClass> {
    KEYWORDS
        .iter()
        .find(|(kw, _)| *kw == run)
        .map(|(_, class)| *class)
}

fn operator_class(bytes: &[u8]) -> Option<TokenClass> {
    OPERATORS
        .iter()
        .find(|(op, _)| op.as_bytes() == bytes)
        .map(|(_, class)| *class)
}

impl Lexer {
    /// Scans one whitespace-delimited run. Keywords match whole runs; anything
    /// else is rescanned byte by byte into identifiers, numbers, and
    /// operators. The cursor advances one extra byte after each sub-scan.
    fn process_run(&mut self, run: &str) {
        if let Some(class) = keyword_class(run) {
            self.tokens.push(Token {
                lexeme: run.to_string(),
                class,
            });
            return;
        }

        let bytes = run.as_bytes();
        let mut idx = 0;
        let mut saw_alpha = false;
        let mut saw_digit = false;

        while idx < bytes.len() {
            let b = bytes[idx];
            if b.is_ascii_alphabetic() {
                self.scan_identifier(run, &mut idx);
                saw_alpha = true;
            } else if b.is_ascii_digit() || b == b'.' {
                self.scan_number(run, &mut idx);
                saw_digit = true;
            } else {
                self.scan_operator(bytes, &mut idx);
            }

            // A leftover byte that is neither alphanumeric nor a known
            // operator, in a run that produced no identifier or number yet,
            // is unrecognizable.
            if idx < bytes.len()
                && !bytes[idx].is_ascii_digit()
                && !bytes[idx].is_ascii_alphabetic()
                && !saw_digit
                && !saw_alpha
            {
                self.errors.push(CompileError::UnrecognizableCharacter);
                return;
            }

            idx += 1;
        }
    }

    /// Consumes a maximal alphabetic run as an identifier.
    fn scan_identifier(&mut self, run: &str, idx: &mut usize) {
        let bytes = run.as_bytes();
        let start = *idx;
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_alphabetic() {
            end += 1;
        }

        self.tokens.push(Token {
            lexeme: run[start..end].to_string(),
            class: TokenClass::Ident,
        });
        *idx = end;
    }

    /// Consumes a maximal run of digits and dots as an integer or double
    /// literal. On a malformed number the cursor is left in place; the caller
    /// advances it by one and rescans.
    fn scan_number(&mut self, run: &str, idx: &mut usize) {
        let bytes = run.as_bytes();
        let start = *idx;
        let mut end = start;
        let mut is_float = false;
        while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
            if bytes[end] == b'.' {
                is_float = true;
            }
            end += 1;
        }

        let digits = &bytes[start..end];
        if is_float {
            if digits.iter().filter(|&&b| b == b'.').count() > 1 {
                self.errors.push(CompileError::RepeatedDecimalPoint);
                return;
            }
            if digits[0] == b'.' || digits[digits.len() - 1] == b'.' {
                self.errors.push(CompileError::MisplacedDecimalPoint);
                return;
            }
        } else if digits[0] == b'0' && digits.len() > 1 {
            self.errors.push(CompileError::LeadingZeroInteger);
            return;
        }

        self.tokens.push(Token {
            lexeme: run[start..end].to_string(),
            class: if is_float {
                TokenClass::Double
            } else {
                TokenClass::Int
            },
        });
        *idx = end;
    }

    /// Consumes an operator, longest match first. Unknown bytes are left for
    /// the caller's unrecognizable-character check.
    fn scan_operator(&mut self, bytes: &[u8], idx: &mut usize) {
        let start = *idx;
        if start + 2 <= bytes.len() {
            if let Some(class) = operator_class(&bytes[start..start + 2]) {
                self.tokens.push(Token {
                    lexeme: String::from_utf8(bytes[start..start + 2].to_vec())
                        .expect("operator lexemes are ASCII"),
                    class,
                });
                *idx = start + 2;
                return;
            }
        }

        if let Some(class) = operator_class(&bytes[start..start + 1]) {
            self.tokens.push(Token {
                lexeme: (bytes[start] as char).to_string(),
                class,
            });
            *idx = start + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(tokens: &[Token]) -> Vec<(&str, &str)> {
        tokens
            .iter()
            .map(|t| (t.lexeme.as_str(), t.class.as_str()))
            .collect()
    }

    #[test]
    fn lexer_simple_assignment() {
        let tokens = lex("int a; a=1+2;").unwrap();
        assert_eq!(
            classes(&tokens),
            [
                ("int", "INTSYM"),
                ("a", "IDENT"),
                (";", "SEMICOLON"),
                ("a", "IDENT"),
                ("=", "AO"),
                ("1", "INT"),
                ("+", "PLUS"),
                ("2", "INT"),
                (";", "SEMICOLON"),
            ]
        );
    }

    #[test]
    fn lexer_two_byte_operators_win_over_one_byte() {
        let tokens = lex("i<=10&&j>=0||k!=1").unwrap();
        let ops: Vec<&str> = tokens
            .iter()
            .filter(|t| t.class != TokenClass::Ident && t.class != TokenClass::Int)
            .map(|t| t.lexeme.as_str())
            .collect();
        assert_eq!(ops, ["<=", "&&", ">=", "||", "!="]);
    }

    #[test]
    fn lexer_double_literal_preserved_verbatim() {
        let tokens = lex("double d; d=2.5;").unwrap();
        assert!(tokens.contains(&Token {
            lexeme: "2.5".to_string(),
            class: TokenClass::Double,
        }));
    }

    #[test]
    fn lexer_strips_block_and_line_comments() {
        let tokens = lex("int a; /* declare\nmore */ a=1; // trailing\n").unwrap();
        assert_eq!(
            classes(&tokens),
            [
                ("int", "INTSYM"),
                ("a", "IDENT"),
                (";", "SEMICOLON"),
                ("a", "IDENT"),
                ("=", "AO"),
                ("1", "INT"),
                (";", "SEMICOLON"),
            ]
        );
    }

    #[test]
    fn lexer_unterminated_block_comment_swallows_rest() {
        let tokens = lex("int a; /* no close").unwrap();
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn comment_stripping_is_idempotent() {
        let source = "int a; /* x */ a=1; // y\nb=2;";
        let once = strip_comments(source);
        assert_eq!(strip_comments(&once), once);
    }

    #[test]
    fn lexer_empty_source_yields_no_tokens() {
        assert!(lex("").unwrap().is_empty());
    }

    #[test]
    fn lexer_rejects_repeated_decimal_point() {
        assert_eq!(lex("int a; a = 1..2;"), Err(CompileError::RepeatedDecimalPoint));
    }

    #[test]
    fn lexer_rejects_leading_decimal_point() {
        assert_eq!(lex("x = .5;"), Err(CompileError::MisplacedDecimalPoint));
    }

    #[test]
    fn lexer_rejects_trailing_decimal_point() {
        assert_eq!(lex("x = 5.;"), Err(CompileError::MisplacedDecimalPoint));
    }

    #[test]
    fn lexer_rejects_leading_zero_integer() {
        assert_eq!(lex("x = 007;"), Err(CompileError::LeadingZeroInteger));
    }

    #[test]
    fn lexer_leading_zero_does_not_apply_to_floats() {
        assert!(lex("x = 0.5;").is_ok());
    }

    #[test]
    fn lexer_rejects_stray_character() {
        assert_eq!(lex("int a; @"), Err(CompileError::UnrecognizableCharacter));
    }

    #[test]
    fn lexer_reports_lowest_error_class() {
        // Both a class-3 (leading zero) and a class-1 (double dot) error are
        // present; class 1 wins regardless of position.
        assert_eq!(lex("x = 07; y = 1..2;"), Err(CompileError::RepeatedDecimalPoint));
    }

    #[test]
    fn lexer_round_trips_serialized_tokens() {
        let tokens = lex("int a; a=1+2.5;").unwrap();
        let serialized: String = tokens.iter().map(|t| format!("{t}\n")).collect();
        let again = lex(&serialized
            .lines()
            .map(|l| l.split_whitespace().next().unwrap())
            .collect::<Vec<_>>()
            .join(" "))
        .unwrap();
        assert_eq!(tokens, again);
    }
}
