//! LR(1) table construction.
//!
//! Builds the canonical LR(1) automaton for the embedded grammar: FIRST sets
//! by fixed-point iteration, item-set closure with lookahead merging on equal
//! cores, goto successors in lexicographic symbol order, and a dense
//! action/goto table. Two states are equal only if their item sets match
//! including lookaheads; no LALR core merging is performed, so state counts
//! are canonical.

use std::collections::{BTreeSet, HashMap};

use crate::compiler::parser::grammar::{Grammar, NON_TERMINALS, TERMINALS};

/// Sentinel action for accepting the input. Reduction by rule 1
/// (`PROG -> SUBPROG`) is never performed; its table entry doubles as the
/// accept marker.
pub const ACCEPT: i32 = -1;

/// An LR(1) item: a production with a dot position and a lookahead set.
///
/// The derived ordering is lexicographic over `(lhs, rhs, dot, rule,
/// lookahead)`, which fixes the iteration order of item sets and therefore
/// state numbering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Item {
    lhs: &'static str,
    rhs: Vec<&'static str>,
    dot: usize,
    rule: i32,
    lookahead: BTreeSet<&'static str>,
}

type ItemSet = BTreeSet<Item>;

/// The finished action/goto table.
///
/// Entries: positive = shift/goto target state, negative = reduce by rule
/// `-entry`, zero = error, [`ACCEPT`] = accept.
#[derive(Debug)]
pub struct LrTables {
    actions: Vec<Vec<i32>>,
}

impl LrTables {
    /// Looks up the action for `state` on the symbol with index `symbol_id`.
    pub fn action(&self, state: usize, symbol_id: usize) -> i32 {
        self.actions[state][symbol_id]
    }

    /// Number of automaton states.
    pub fn state_count(&self) -> usize {
        self.actions.len()
    }
}

struct TableBuilder<'g> {
    grammar: &'g Grammar,
    first: HashMap<&'static str, BTreeSet<&'static str>>,
}

/// Constructs the LR(1) table for `grammar`.
pub fn build(grammar: &Grammar) -> LrTables {
    let builder = TableBuilder {
        first: compute_first(grammar),
        grammar,
    };

    let start = &grammar.by_lhs["PROG"][0];
    let start_item = Item {
        lhs: start.lhs,
        rhs: start.rhs.clone(),
        dot: 0,
        rule: start.rule,
        lookahead: BTreeSet::from(["#"]),
    };

    let width = grammar.symbol_count();
    let mut states: Vec<ItemSet> = vec![builder.closure(&BTreeSet::from([start_item]))];
    let mut actions: Vec<Vec<i32>> = vec![vec![0; width]];

    // Generate goto successors breadth-first; a successor equal to an
    // existing state (items and lookaheads both) is reused.
    let mut i = 0;
    while i < states.len() {
        for (symbol, kernel) in builder.goto_kernels(&states[i]) {
            let next = builder.closure(&kernel);
            let target = match states.iter().position(|s| *s == next) {
                Some(idx) => idx,
                None => {
                    states.push(next);
                    actions.push(vec![0; width]);
                    states.len() - 1
                }
            };

            let id = grammar
                .symbol_id(symbol)
                .expect("grammar symbols are classified");
            actions[i][id] = target as i32;
        }
        i += 1;
    }

    log::debug!("LR(1) automaton: {} states", states.len());

    // Reduce entries are filled after all shifts and gotos; a completed item
    // writes the negated rule index under each of its lookaheads.
    for (state, items) in states.iter().enumerate() {
        for item in items {
            if item.dot >= item.rhs.len() || item.rhs[0] == "^" {
                for la in &item.lookahead {
                    let id = grammar.symbol_id(la).expect("lookaheads are terminals");
                    actions[state][id] = -item.rule;
                }
            }
        }
    }

    LrTables { actions }
}

/// FIRST sets for every grammar symbol, iterated to fixed point. Terminals
/// start with themselves; `^` encodes nullability.
fn compute_first(grammar: &Grammar) -> HashMap<&'static str, BTreeSet<&'static str>> {
    let mut first: HashMap<&'static str, BTreeSet<&'static str>> = HashMap::new();
    for terminal in TERMINALS {
        first.insert(terminal, BTreeSet::from([terminal]));
    }
    for non_terminal in NON_TERMINALS {
        first.entry(non_terminal).or_default();
    }

    loop {
        let mut changed = false;

        for production in &grammar.productions {
            let mut gathered: BTreeSet<&'static str> = BTreeSet::new();
            let mut nullable = true;

            for symbol in &production.rhs {
                nullable = false;
                if let Some(set) = first.get(symbol) {
                    for w in set {
                        if *w == "^" {
                            nullable = true;
                        } else {
                            gathered.insert(w);
                        }
                    }
                }
                if !nullable {
                    break;
                }
            }
            if nullable {
                gathered.insert("^");
            }

            let set = first
                .get_mut(production.lhs)
                .expect("every non-terminal has a FIRST entry");
            let before = set.len();
            set.extend(gathered);
            if set.len() > before {
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    first
}

impl TableBuilder<'_> {
    /// FIRST of the symbols after the dot-successor, falling back to the
    /// item's own lookahead when that tail is nullable.
    fn first_of_rest(&self, item: &Item) -> BTreeSet<&'static str> {
        let mut out = BTreeSet::new();
        let mut nullable = true;

        let mut i = item.dot + 1;
        while nullable && i < item.rhs.len() {
            nullable = false;
            let symbol = item.rhs[i];

            if self.grammar.is_terminal(symbol) {
                out.insert(symbol);
                break;
            }

            if let Some(set) = self.first.get(symbol) {
                for w in set {
                    if *w == "^" {
                        nullable = true;
                    } else {
                        out.insert(w);
                    }
                }
            }
            if nullable {
                i += 1;
            }
        }

        if nullable {
            out.extend(item.lookahead.iter().copied());
        }

        out
    }

    /// Adds the expansion items for a non-terminal at the dot of `item`.
    fn expand_non_terminal(&self, item: &Item, symbol: &str, pending: &mut ItemSet) {
        let Some(productions) = self.grammar.by_lhs.get(symbol) else {
            return;
        };

        for production in productions {
            let lookahead = if item.dot == item.rhs.len() - 1 {
                item.lookahead.clone()
            } else {
                let next = item.rhs[item.dot + 1];
                if self.grammar.is_terminal(next) {
                    BTreeSet::from([next])
                } else {
                    self.first_of_rest(item)
                }
            };

            pending.insert(Item {
                lhs: production.lhs,
                rhs: production.rhs.clone(),
                dot: 0,
                rule: production.rule,
                lookahead,
            });
        }
    }

    /// LR(1) closure. Items sharing a core (rule and dot) are merged by
    /// unioning lookaheads; iteration stops once the set no longer grows.
    fn closure(&self, seed: &ItemSet) -> ItemSet {
        let mut result = seed.clone();
        let mut pending = seed.clone();

        loop {
            let before = result.len();

            let snapshot: Vec<Item> = result.iter().cloned().collect();
            for item in &snapshot {
                if item.dot >= item.rhs.len() {
                    continue;
                }
                let symbol = item.rhs[item.dot];
                if !self.grammar.is_terminal(symbol) {
                    self.expand_non_terminal(item, symbol, &mut pending);
                }
            }

            let additions: Vec<Item> = pending.iter().cloned().collect();
            for mut item in additions {
                if let Some(existing) = result
                    .iter()
                    .find(|e| e.rule == item.rule && e.dot == item.dot)
                    .cloned()
                {
                    item.lookahead.extend(existing.lookahead.iter().copied());
                    result.remove(&existing);
                }
                result.insert(item);
            }

            if result.len() <= before {
                break;
            }
        }

        result
    }

    /// Kernels of the goto successors of `state`, one per dot symbol, in
    /// lexicographic symbol order (which fixes state numbering).
    fn goto_kernels(&self, state: &ItemSet) -> Vec<(&'static str, ItemSet)> {
        let mut symbols: BTreeSet<&'static str> = BTreeSet::new();
        for item in state {
            if item.dot < item.rhs.len() && item.rhs[item.dot] != "^" {
                symbols.insert(item.rhs[item.dot]);
            }
        }

        symbols
            .into_iter()
            .map(|symbol| {
                let kernel: ItemSet = state
                    .iter()
                    .filter(|i| i.dot < i.rhs.len() && i.rhs[i.dot] == symbol)
                    .map(|i| {
                        let mut advanced = i.clone();
                        advanced.dot += 1;
                        advanced
                    })
                    .collect();
                (symbol, kernel)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables_and_grammar() -> (LrTables, Grammar) {
        let grammar = Grammar::load();
        let tables = build(&grammar);
        (tables, grammar)
    }

    #[test]
    fn state_zero_reduces_the_leading_marker_on_type_keywords() {
        let (tables, grammar) = tables_and_grammar();
        // Before any declaration the only legal move is reducing `M -> ^`
        // (rule 3), and only the type keywords may follow.
        let int_id = grammar.symbol_id("int").unwrap();
        let double_id = grammar.symbol_id("double").unwrap();
        assert_eq!(tables.action(0, int_id), -3);
        assert_eq!(tables.action(0, double_id), -3);

        let id_id = grammar.symbol_id("id").unwrap();
        assert_eq!(tables.action(0, id_id), 0);
    }

    #[test]
    fn goto_on_the_start_symbol_leads_to_the_accepting_state() {
        let (tables, grammar) = tables_and_grammar();
        let subprog = grammar.symbol_id("SUBPROG").unwrap();
        let eof = grammar.symbol_id("#").unwrap();

        let accepting = tables.action(0, subprog);
        assert!(accepting > 0);
        assert_eq!(tables.action(accepting as usize, eof), ACCEPT);
    }

    #[test]
    fn construction_is_deterministic() {
        let grammar = Grammar::load();
        let a = build(&grammar);
        let b = build(&grammar);
        assert_eq!(a.state_count(), b.state_count());
        for state in 0..a.state_count() {
            for symbol in 0..grammar.symbol_count() {
                assert_eq!(a.action(state, symbol), b.action(state, symbol));
            }
        }
    }

    #[test]
    fn first_sets_cover_the_expression_entry_points() {
        let grammar = Grammar::load();
        let first = compute_first(&grammar);

        let expr = &first["EXPR"];
        for starter in ["id", "UINT", "UFLOAT", "(", "+", "-"] {
            assert!(expr.contains(starter), "FIRST(EXPR) missing {starter}");
        }
        assert!(!expr.contains("^"));

        let statement = &first["STATEMENT"];
        assert!(statement.contains("^"), "STATEMENT is nullable");
        assert!(statement.contains("while"));
        assert!(statement.contains("if"));
        assert!(statement.contains("scanf"));
    }

    #[test]
    fn epsilon_never_appears_as_a_lookahead_column() {
        let (tables, grammar) = tables_and_grammar();
        let epsilon = grammar.symbol_id("^").unwrap();
        for state in 0..tables.state_count() {
            assert_eq!(tables.action(state, epsilon), 0);
        }
    }
}
