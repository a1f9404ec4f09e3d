//! Error types shared across the compilation pipeline.
//!
//! Every fatal condition maps to exactly one diagnostic line: the `Display`
//! output of a variant is the line the driver prints before exiting.

use snafu::Snafu;

/// Result alias used by every compiler pass.
pub type CompileResult<T> = Result<T, CompileError>;

/// Fatal compilation errors.
///
/// Lexical variants carry an error class (1..=4) used by the lexer to pick
/// the lowest-numbered error when several are discovered in one run.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum CompileError {
    /// Error class 1.
    #[snafu(display(
        "Malformed number: More than one decimal point in a floating point number."
    ))]
    RepeatedDecimalPoint,

    /// Error class 2.
    #[snafu(display(
        "Malformed number: Decimal point at the beginning or end of a floating point number."
    ))]
    MisplacedDecimalPoint,

    /// Error class 3.
    #[snafu(display("Malformed number: Leading zeros in an integer."))]
    LeadingZeroInteger,

    /// Error class 4.
    #[snafu(display("Unrecognizable characters."))]
    UnrecognizableCharacter,

    /// Any syntactic or semantic failure: LR action 0, duplicate declaration,
    /// or a reference to an undeclared identifier.
    #[snafu(display("Syntax Error"))]
    Syntax,

    /// The serialized intermediate representation handed to the object code
    /// generator did not match the expected layout.
    #[snafu(display("Malformed intermediate code at line {line}."))]
    MalformedIr { line: usize },

    /// Source text could not be read from stdin or the judge input file.
    #[snafu(display("Failed to read source input."))]
    ReadInput,
}

impl CompileError {
    /// Error class used for lowest-wins selection among lexical errors.
    /// Non-lexical errors never compete, so they sort last.
    pub fn class(&self) -> u8 {
        match self {
            CompileError::RepeatedDecimalPoint => 1,
            CompileError::MisplacedDecimalPoint => 2,
            CompileError::LeadingZeroInteger => 3,
            CompileError::UnrecognizableCharacter => 4,
            _ => u8::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_lines_match_reported_messages() {
        assert_eq!(
            CompileError::RepeatedDecimalPoint.to_string(),
            "Malformed number: More than one decimal point in a floating point number."
        );
        assert_eq!(
            CompileError::MisplacedDecimalPoint.to_string(),
            "Malformed number: Decimal point at the beginning or end of a floating point number."
        );
        assert_eq!(
            CompileError::LeadingZeroInteger.to_string(),
            "Malformed number: Leading zeros in an integer."
        );
        assert_eq!(
            CompileError::UnrecognizableCharacter.to_string(),
            "Unrecognizable characters."
        );
        assert_eq!(CompileError::Syntax.to_string(), "Syntax Error");
    }

    #[test]
    fn lexical_classes_are_ordered_by_priority() {
        assert!(
            CompileError::RepeatedDecimalPoint.class() < CompileError::MisplacedDecimalPoint.class()
        );
        assert!(
            CompileError::MisplacedDecimalPoint.class() < CompileError::LeadingZeroInteger.class()
        );
        assert!(
            CompileError::LeadingZeroInteger.class() < CompileError::UnrecognizableCharacter.class()
        );
        assert!(CompileError::UnrecognizableCharacter.class() < CompileError::Syntax.class());
    }
}
