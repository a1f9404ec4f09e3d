//! Embedded grammar of the source language.
//!
//! Productions are written as plain text and split on whitespace at startup,
//! keeping the grammar readable in one place. Rule indices are 1-based;
//! reduction actions are dispatched by these indices, so the order below is
//! load-bearing. `^` marks the empty production.

use std::collections::HashMap;

/// The productions of the language, indexed 1..=65 in listing order.
pub const PRODUCTIONS: [&str; 65] = [
    "PROG -> SUBPROG",
    "SUBPROG -> M VARIABLES L ;",
    "M -> ^",
    "N -> ^",
    "VARIABLES -> VARIABLES VARIABLE ;",
    "VARIABLES -> VARIABLE ;",
    "T -> int",
    "T -> double",
    "ID -> id",
    "VARIABLE -> T ID",
    "VARIABLE -> VARIABLE , ID",
    "STATEMENT -> ASSIGN",
    "STATEMENT -> SCANF",
    "STATEMENT -> PRINTF",
    "STATEMENT -> ^",
    "STATEMENT -> { L ; }",
    "STATEMENT -> while N B do N STATEMENT",
    "STATEMENT -> if B then N STATEMENT",
    "ASSIGN -> ID = EXPR",
    "L -> L ; N STATEMENT",
    "L -> STATEMENT",
    "EXPR -> EXPR || ORITEM",
    "EXPR -> ORITEM",
    "ORITEM -> ORITEM && ANDITEM",
    "ORITEM -> ANDITEM",
    "ANDITEM -> NOITEM",
    "ANDITEM -> ! NOITEM",
    "NOITEM -> NOITEM REL RELITEM",
    "NOITEM -> RELITEM",
    "RELITEM -> RELITEM PLUS_MINUS ITEM",
    "RELITEM -> ITEM",
    "ITEM -> FACTOR",
    "ITEM -> ITEM MUL_DIV FACTOR",
    "FACTOR -> ID",
    "FACTOR -> UINT",
    "FACTOR -> UFLOAT",
    "FACTOR -> ( EXPR )",
    "FACTOR -> PLUS_MINUS FACTOR",
    "B -> B || N BORTERM",
    "B -> BORTERM",
    "BORTERM -> BORTERM && N BANDTERM",
    "BORTERM -> BANDTERM",
    "BANDTERM -> ( B )",
    "BANDTERM -> ! BANDTERM",
    "BANDTERM -> BFACTOR REL BFACTOR",
    "BANDTERM -> BFACTOR",
    "BFACTOR -> UINT",
    "BFACTOR -> UFLOAT",
    "BFACTOR -> ID",
    "PLUS_MINUS -> +",
    "PLUS_MINUS -> -",
    "MUL_DIV -> *",
    "MUL_DIV -> /",
    "REL -> ==",
    "REL -> !=",
    "REL -> <",
    "REL -> <=",
    "REL -> >",
    "REL -> >=",
    "SCANF -> SCANF_BEGIN )",
    "SCANF_BEGIN -> SCANF_BEGIN , ID",
    "SCANF_BEGIN -> scanf ( ID",
    "PRINTF -> PRINTF_BEGIN )",
    "PRINTF_BEGIN -> printf ( ID",
    "PRINTF_BEGIN -> PRINTF_BEGIN , ID",
];

/// Non-terminal symbols, in symbol-index order.
pub const NON_TERMINALS: [&str; 29] = [
    "PROG",
    "SUBPROG",
    "M",
    "N",
    "VARIABLES",
    "STATEMENT",
    "VARIABLE",
    "T",
    "ASSIGN",
    "SCANF",
    "PRINTF",
    "L",
    "B",
    "EXPR",
    "ORITEM",
    "ANDITEM",
    "RELITEM",
    "NOITEM",
    "ITEM",
    "FACTOR",
    "BORTERM",
    "BANDTERM",
    "BFACTOR",
    "PLUS_MINUS",
    "MUL_DIV",
    "REL",
    "SCANF_BEGIN",
    "PRINTF_BEGIN",
    "ID",
];

/// Terminal symbols, in symbol-index order after the non-terminals. `^`
/// stands for the empty production body and `#` for end of input.
pub const TERMINALS: [&str; 33] = [
    "int", "double", "scanf", "printf", "if", "then", "while", "do", ",", ";", "+", "-", "*", "/",
    "=", "==", "!=", "<", "<=", ">", ">=", "(", ")", "{", "}", "!", "&&", "||", "id", "UINT",
    "UFLOAT", "^", "#",
];

/// A parsed production: left-hand side, right-hand side symbols, and its
/// 1-based rule index.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Production {
    pub lhs: &'static str,
    pub rhs: Vec<&'static str>,
    pub rule: i32,
}

/// The grammar with symbol numbering and per-non-terminal rule lookup.
#[derive(Debug)]
pub struct Grammar {
    /// All productions in rule order (index 0 holds rule 1).
    pub productions: Vec<Production>,
    /// Productions grouped by left-hand side.
    pub by_lhs: HashMap<&'static str, Vec<Production>>,
    /// Terminals and non-terminals share one symbol-index space.
    symbol_ids: HashMap<&'static str, usize>,
}

impl Grammar {
    /// Splits the embedded production strings and assigns symbol indices:
    /// non-terminals first, then terminals.
    pub fn load() -> Self {
        let mut productions = Vec::with_capacity(PRODUCTIONS.len());
        let mut by_lhs: HashMap<&'static str, Vec<Production>> = HashMap::new();

        for (i, text) in PRODUCTIONS.into_iter().enumerate() {
            let mut parts = text.split_whitespace();
            let lhs = parts.next().expect("production has a left-hand side");
            let arrow = parts.next();
            debug_assert_eq!(arrow, Some("->"));

            let production = Production {
                lhs,
                rhs: parts.collect(),
                rule: (i + 1) as i32,
            };
            by_lhs.entry(lhs).or_default().push(production.clone());
            productions.push(production);
        }

        let mut symbol_ids = HashMap::new();
        for symbol in NON_TERMINALS.iter().chain(TERMINALS.iter()) {
            let id = symbol_ids.len();
            symbol_ids.insert(*symbol, id);
        }

        Grammar {
            productions,
            by_lhs,
            symbol_ids,
        }
    }

    /// Total number of grammar symbols (the width of an action-table row).
    pub fn symbol_count(&self) -> usize {
        self.symbol_ids.len()
    }

    /// Index of `symbol` in the shared terminal/non-terminal space.
    pub fn symbol_id(&self, symbol: &str) -> Option<usize> {
        self.symbol_ids.get(symbol).copied()
    }

    /// True if `symbol` is a terminal (including `^` and `#`).
    pub fn is_terminal(&self, symbol: &str) -> bool {
        TERMINALS.contains(&symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar_loads_all_productions() {
        let grammar = Grammar::load();
        assert_eq!(grammar.productions.len(), 65);
        assert_eq!(grammar.productions[0].lhs, "PROG");
        assert_eq!(grammar.productions[0].rule, 1);
        assert_eq!(grammar.productions[64].lhs, "PRINTF_BEGIN");
        assert_eq!(grammar.productions[64].rule, 65);
    }

    #[test]
    fn every_rhs_symbol_is_classified() {
        let grammar = Grammar::load();
        for production in &grammar.productions {
            assert!(grammar.symbol_id(production.lhs).is_some());
            for symbol in &production.rhs {
                assert!(
                    grammar.symbol_id(symbol).is_some(),
                    "unclassified symbol {symbol}"
                );
            }
        }
    }

    #[test]
    fn terminals_and_non_terminals_are_disjoint() {
        for nt in NON_TERMINALS {
            assert!(!TERMINALS.contains(&nt));
        }
    }

    #[test]
    fn empty_production_bodies_use_the_epsilon_marker() {
        let grammar = Grammar::load();
        let epsilon_rules: Vec<i32> = grammar
            .productions
            .iter()
            .filter(|p| p.rhs == ["^"])
            .map(|p| p.rule)
            .collect();
        assert_eq!(epsilon_rules, [3, 4, 15]);
    }
}
