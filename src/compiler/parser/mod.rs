//! Syntax Analysis and Translation
//!
//! Compiler pass that drives the LR(1) automaton over the token stream and
//! performs syntax-directed translation during reductions, producing the
//! serialized intermediate representation: symbol table, temporary-variable
//! bookkeeping, and the quadruple listing with backpatched jump targets.

pub mod grammar;
pub mod tables;

use crate::compiler::ir::{self, backpatch, merge, Quad, Symbol, ValueType};
use crate::compiler::lexer::{Token, TokenClass};
use crate::error::{CompileError, CompileResult};
use grammar::Grammar;
use tables::{LrTables, ACCEPT};

/// Where a value-context binary operation takes its result type from.
#[derive(Debug, Clone, Copy)]
enum ResultType {
    /// Relational and logical operators always yield `int`.
    Bool,
    /// Additive operators inherit the left operand's type.
    Left,
    /// Multiplicative operators inherit the right operand's type.
    Right,
}

/// Per-stack-cell semantic record.
///
/// `truelist`, `falselist`, and `nextlist` hold heads of backpatch chains
/// threaded through the quadruple `link` fields; values of zero or below act
/// as empty chains.
#[derive(Debug, Clone, Default)]
struct Attribute {
    quad: i32,
    nextlist: i32,
    truelist: i32,
    falselist: i32,
    width: i32,
    name: String,
    ty: ValueType,
    op: String,
    place: String,
}

/// The parser: an LR(1) table built once per invocation, plus the grammar it
/// was built from.
#[derive(Debug)]
pub struct Parser {
    grammar: Grammar,
    tables: LrTables,
}

impl Parser {
    /// Builds the LR(1) tables for the embedded grammar.
    pub fn new() -> Self {
        let grammar = Grammar::load();
        let tables = tables::build(&grammar);
        Parser { grammar, tables }
    }

    /// Parses `tokens` and returns the serialized intermediate
    /// representation.
    ///
    /// An empty token stream is a valid empty program and yields an IR
    /// containing only the `End` quadruple.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Syntax`] on the first LR error, duplicate
    /// declaration, or reference to an undeclared identifier.
    pub fn parse(&self, tokens: &[Token]) -> CompileResult<String> {
        let mut translation = Translation::default();

        if tokens.is_empty() {
            translation.emit(Quad::new("End", "-", "-", "-"));
            return Ok(translation.serialize());
        }

        // Classify each token into its grammar terminal; every class other
        // than identifier and the two literal kinds is keyed by lexeme.
        let mut input: Vec<(String, String)> = tokens
            .iter()
            .map(|token| {
                let terminal = match token.class {
                    TokenClass::Ident => "id".to_string(),
                    TokenClass::Int => "UINT".to_string(),
                    TokenClass::Double => "UFLOAT".to_string(),
                    _ => token.lexeme.clone(),
                };
                (token.lexeme.clone(), terminal)
            })
            .collect();
        input.push(("#".to_string(), "#".to_string()));

        let mut states: Vec<usize> = vec![0];
        translation.symbols.push("#".to_string());

        let mut cur = 0;
        let mut reductions = 0u32;

        loop {
            let (lexeme, terminal) = &input[cur];
            let symbol_id = self
                .grammar
                .symbol_id(terminal)
                .ok_or(CompileError::Syntax)?;

            let state = *states.last().expect("state stack is never empty");
            let action = self.tables.action(state, symbol_id);

            if action == ACCEPT {
                break;
            }
            if action == 0 {
                return Err(CompileError::Syntax);
            }

            if action < 0 {
                let rule = -action;
                translation.reduce(rule)?;

                let production = &self.grammar.productions[(rule - 1) as usize];
                let rhs_len = if production.rhs == ["^"] {
                    0
                } else {
                    production.rhs.len()
                };
                for _ in 0..rhs_len {
                    states.pop();
                    translation.symbols.pop();
                }

                reductions += 1;
                log::debug!(
                    "reduce #{reductions}: rule {rule}, {} -> {}",
                    production.lhs,
                    production.rhs.join(" ")
                );

                translation.symbols.push(production.lhs.to_string());
                let lhs_id = self
                    .grammar
                    .symbol_id(production.lhs)
                    .expect("grammar symbols are classified");
                let state = *states.last().expect("state stack is never empty");
                let goto = self.tables.action(state, lhs_id);
                if goto <= 0 {
                    return Err(CompileError::Syntax);
                }
                states.push(goto as usize);
            } else {
                states.push(action as usize);
                translation.symbols.push(lexeme.clone());
                cur += 1;
            }
        }

        Ok(translation.serialize())
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable translation state owned by one parse: the attribute and symbol
/// stacks, symbol table, quadruple buffer, and temporary counter.
#[derive(Debug, Default)]
struct Translation {
    attributes: Vec<Attribute>,
    // Parallel to the LR state stack: shifted lexemes and reduced
    // non-terminal names. Semantic actions read the shifted lexeme off the
    // top before the driver pops.
    symbols: Vec<String>,
    symbol_table: Vec<Symbol>,
    quads: Vec<Quad>,
    temps: Vec<ValueType>,
    offset: i32,
}

impl Translation {
    fn pop(&mut self) -> Attribute {
        self.attributes.pop().unwrap_or_default()
    }

    fn push(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    fn emit(&mut self, quad: Quad) {
        self.quads.push(quad);
    }

    /// Index the next emitted quadruple will occupy.
    fn next_quad(&self) -> i32 {
        self.quads.len() as i32
    }

    /// The lexeme most recently shifted (top of the symbol stack).
    fn top_lexeme(&self) -> String {
        self.symbols.last().cloned().unwrap_or_default()
    }

    /// Allocates a fresh temporary of the given type.
    fn new_temp(&mut self, ty: ValueType) -> String {
        self.temps.push(ty);
        format!("T{}{}", self.temps.len() - 1, ty.temp_suffix())
    }

    /// IR operand for a declared variable, or `Syntax Error`.
    fn lookup(&self, name: &str) -> CompileResult<String> {
        self.symbol_table
            .iter()
            .position(|s| s.name == name)
            .map(ir::symbol_place)
            .ok_or(CompileError::Syntax)
    }

    /// Declared type of a variable, or `Syntax Error`.
    fn lookup_type(&self, name: &str) -> CompileResult<ValueType> {
        self.symbol_table
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.ty)
            .ok_or(CompileError::Syntax)
    }

    /// Executes the semantic action for a reduction, keyed by rule index.
    /// Rules without observable effects fall through to the catch-all.
    fn reduce(&mut self, rule: i32) -> CompileResult<()> {
        match rule {
            // SUBPROG -> M VARIABLES L ;
            2 => {
                let _body = self.pop();
                let mut vars = self.pop();
                let _marker = self.pop();
                self.emit(Quad::new("End", "-", "-", "-"));
                vars.name = "SUBPROG".to_string();
                self.push(vars);
            }
            // M -> ^ : reset the declaration offset.
            3 => {
                self.offset = 0;
                self.push(Attribute::default());
            }
            // N -> ^ : record the index where code resumes.
            4 => {
                self.push(Attribute {
                    quad: self.next_quad(),
                    ..Default::default()
                });
            }
            // VARIABLES -> VARIABLES VARIABLE ; : fold the inner attribute.
            5 => {
                self.pop();
            }
            // T -> int | double
            7 => self.push(Attribute {
                ty: ValueType::Int,
                width: 4,
                ..Default::default()
            }),
            8 => self.push(Attribute {
                ty: ValueType::Double,
                width: 8,
                ..Default::default()
            }),
            // ID -> id : capture the identifier lexeme.
            9 => {
                let name = self.top_lexeme();
                self.push(Attribute {
                    name,
                    ..Default::default()
                });
            }
            // VARIABLE -> T ID | VARIABLE , ID : declare a variable.
            10 | 11 => {
                let id = self.pop();
                let decl = self.pop();
                if self.symbol_table.iter().any(|s| s.name == id.name) {
                    return Err(CompileError::Syntax);
                }
                self.symbol_table.push(Symbol {
                    name: id.name,
                    ty: decl.ty,
                    offset: self.offset,
                });
                self.offset += decl.width;
                self.push(Attribute {
                    ty: decl.ty,
                    width: decl.width,
                    ..Default::default()
                });
            }
            // STATEMENT -> ASSIGN | SCANF | PRINTF
            12 | 13 | 14 => {
                self.pop();
                self.push(Attribute {
                    nextlist: -1,
                    ..Default::default()
                });
            }
            // STATEMENT -> ^
            15 => self.push(Attribute {
                nextlist: -1,
                ..Default::default()
            }),
            // STATEMENT -> while N B do N STATEMENT
            17 => {
                let body = self.pop();
                let entry = self.pop();
                let cond = self.pop();
                let header = self.pop();
                backpatch(body.nextlist, header.quad, &mut self.quads);
                backpatch(cond.truelist, entry.quad, &mut self.quads);
                self.push(Attribute {
                    nextlist: cond.falselist,
                    ..Default::default()
                });
                // The loop-back jump is resolved directly to the header.
                let mut back = Quad::new("j", "-", "-", "");
                back.link = header.quad;
                self.emit(back);
            }
            // STATEMENT -> if B then N STATEMENT
            18 => {
                let body = self.pop();
                let then_entry = self.pop();
                let cond = self.pop();
                backpatch(cond.truelist, then_entry.quad, &mut self.quads);
                let nextlist = merge(cond.falselist, body.nextlist, &mut self.quads);
                self.push(Attribute {
                    nextlist,
                    ..Default::default()
                });
            }
            // ASSIGN -> ID = EXPR
            19 => {
                let expr = self.pop();
                let id = self.pop();
                let dest = self.lookup(&id.name)?;
                self.emit(Quad::new("=", expr.place.clone(), "-", dest));
                self.push(expr);
            }
            // L -> L ; N STATEMENT
            20 => {
                let stmt = self.pop();
                let n = self.pop();
                let list = self.pop();
                backpatch(list.nextlist, n.quad, &mut self.quads);
                self.push(Attribute {
                    nextlist: stmt.nextlist,
                    ..Default::default()
                });
            }
            // EXPR -> EXPR || ORITEM (value context, no short circuit)
            22 => self.binary_value("||", ResultType::Bool),
            // ORITEM -> ORITEM && ANDITEM
            24 => self.binary_value("&&", ResultType::Bool),
            // ANDITEM -> ! NOITEM
            27 => {
                let operand = self.pop();
                let place = self.new_temp(ValueType::Int);
                self.emit(Quad::new("!", operand.place, "-", place.clone()));
                self.push(Attribute {
                    place,
                    ty: ValueType::Int,
                    ..Default::default()
                });
            }
            // NOITEM -> NOITEM REL RELITEM
            28 => self.binary_value("", ResultType::Bool),
            // RELITEM -> RELITEM PLUS_MINUS ITEM
            30 => self.binary_value("", ResultType::Left),
            // ITEM -> ITEM MUL_DIV FACTOR
            33 => self.binary_value("", ResultType::Right),
            // FACTOR -> ID | BFACTOR -> ID
            34 | 49 => {
                let id = self.pop();
                let place = self.lookup(&id.name)?;
                let ty = self.lookup_type(&id.name)?;
                self.push(Attribute {
                    place,
                    ty,
                    ..Default::default()
                });
            }
            // FACTOR -> UINT | BFACTOR -> UINT
            35 | 47 => {
                let literal = self.top_lexeme();
                let place = self.new_temp(ValueType::Int);
                self.emit(Quad::new("=", literal, "-", place.clone()));
                self.push(Attribute {
                    place,
                    ty: ValueType::Int,
                    ..Default::default()
                });
            }
            // FACTOR -> UFLOAT | BFACTOR -> UFLOAT
            36 | 48 => {
                let literal = normalize_float(&self.top_lexeme());
                let place = self.new_temp(ValueType::Double);
                self.emit(Quad::new("=", literal, "-", place.clone()));
                self.push(Attribute {
                    place,
                    ty: ValueType::Double,
                    ..Default::default()
                });
            }
            // FACTOR -> PLUS_MINUS FACTOR
            38 => {
                let operand = self.pop();
                let sign = self.pop();
                let place = self.new_temp(operand.ty);
                self.emit(Quad::new(sign.op, "0", operand.place, place.clone()));
                self.push(Attribute {
                    place,
                    ty: operand.ty,
                    ..Default::default()
                });
            }
            // B -> B || N BORTERM : short-circuit or.
            39 => {
                let rhs = self.pop();
                let n = self.pop();
                let lhs = self.pop();
                backpatch(lhs.falselist, n.quad, &mut self.quads);
                let truelist = merge(lhs.truelist, rhs.truelist, &mut self.quads);
                self.push(Attribute {
                    truelist,
                    falselist: rhs.falselist,
                    ..Default::default()
                });
            }
            // BORTERM -> BORTERM && N BANDTERM : short-circuit and.
            41 => {
                let rhs = self.pop();
                let n = self.pop();
                let lhs = self.pop();
                backpatch(lhs.truelist, n.quad, &mut self.quads);
                let falselist = merge(lhs.falselist, rhs.falselist, &mut self.quads);
                self.push(Attribute {
                    falselist,
                    truelist: rhs.truelist,
                    ..Default::default()
                });
            }
            // BANDTERM -> ! BANDTERM : swap the jump lists.
            44 => {
                let operand = self.pop();
                self.push(Attribute {
                    truelist: operand.falselist,
                    falselist: operand.truelist,
                    ..Default::default()
                });
            }
            // BANDTERM -> BFACTOR REL BFACTOR : conditional-jump pair.
            45 => {
                let rhs = self.pop();
                let rel = self.pop();
                let lhs = self.pop();
                let truelist = self.next_quad();
                let falselist = truelist + 1;
                self.emit(Quad::new(format!("j{}", rel.op), lhs.place, rhs.place, "0"));
                self.emit(Quad::new("j", "-", "-", "0"));
                self.push(Attribute {
                    truelist,
                    falselist,
                    ..Default::default()
                });
            }
            // BANDTERM -> BFACTOR : nonzero test.
            46 => {
                let operand = self.pop();
                let truelist = self.next_quad();
                let falselist = truelist + 1;
                self.emit(Quad::new("jnz", operand.place, "-", "0"));
                self.emit(Quad::new("j", "-", "-", "0"));
                self.push(Attribute {
                    truelist,
                    falselist,
                    ..Default::default()
                });
            }
            // PLUS_MINUS, MUL_DIV, REL : record the operator lexeme.
            50..=59 => {
                let op = ["+", "-", "*", "/", "==", "!=", "<", "<=", ">", ">="]
                    [(rule - 50) as usize];
                self.push(Attribute {
                    op: op.to_string(),
                    ..Default::default()
                });
            }
            // SCANF_BEGIN -> scanf ( ID | SCANF_BEGIN , ID
            62 => self.io_statement("R", 1)?,
            61 => self.io_statement("R", 2)?,
            // PRINTF_BEGIN -> printf ( ID | PRINTF_BEGIN , ID
            64 => self.io_statement("W", 1)?,
            65 => self.io_statement("W", 2)?,
            // Propagating and bracketing rules carry no action: 1, 6, 16, 21,
            // 23, 25, 26, 29, 31, 32, 37, 40, 42, 43, 60, 63.
            _ => {}
        }

        Ok(())
    }

    /// Shared action for value-context binary operators: pops operand, op,
    /// operand; allocates a result temporary; emits one quadruple. Passing an
    /// empty `op` uses the recorded operator attribute (REL, PLUS_MINUS,
    /// MUL_DIV).
    fn binary_value(&mut self, fixed_op: &str, result: ResultType) {
        let rhs = self.pop();
        let (op, lhs) = if fixed_op.is_empty() {
            let middle = self.pop();
            (middle.op, self.pop())
        } else {
            (fixed_op.to_string(), self.pop())
        };

        let ty = match result {
            ResultType::Bool => ValueType::Int,
            ResultType::Left => lhs.ty,
            ResultType::Right => rhs.ty,
        };
        let place = self.new_temp(ty);
        self.emit(Quad::new(op, lhs.place, rhs.place, place.clone()));
        self.push(Attribute {
            place,
            ty,
            ..Default::default()
        });
    }

    /// Emits a read or write quadruple for the identifier on top of the
    /// attribute stack. `pops` distinguishes the list-head production from
    /// the list-extension production.
    fn io_statement(&mut self, op: &str, pops: usize) -> CompileResult<()> {
        let id = self.pop();
        if pops == 2 {
            self.pop();
        }
        let dest = self.lookup(&id.name)?;
        self.emit(Quad::new(op, "-", "-", dest));
        self.push(Attribute::default());
        Ok(())
    }

    /// Serializes the translation result into the IR text consumed by the
    /// object code generator.
    fn serialize(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("{}\n", self.symbol_table.len()));
        for symbol in &self.symbol_table {
            out.push_str(&format!(
                "{} {} null {}\n",
                symbol.name,
                symbol.ty.code(),
                symbol.offset
            ));
        }

        out.push_str(&format!("{}\n", self.temps.len()));

        let total = self.quads.len();
        out.push_str(&format!("{total}\n"));
        for (i, quad) in self.quads.iter().enumerate() {
            out.push_str(&quad.serialize(i, total));
            out.push('\n');
        }

        out
    }
}

/// Normalizes a float literal through a string round-trip, fixing six
/// fraction digits (`2.5` becomes `2.500000`).
fn normalize_float(lexeme: &str) -> String {
    let value: f32 = lexeme.parse().expect("lexer validates float literals");
    format!("{value:.6}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer;

    fn parse(source: &str) -> CompileResult<String> {
        let tokens = lexer::lex(source)?;
        Parser::new().parse(&tokens)
    }

    #[test]
    fn parser_empty_program_emits_only_end() {
        assert_eq!(parse("").unwrap(), "0\n0\n1\n0: (End,-,-,-)\n");
    }

    #[test]
    fn parser_simple_assignment() {
        let ir = parse("int a; a=1+2;").unwrap();
        assert_eq!(
            ir,
            "1\n\
             a 0 null 0\n\
             3\n\
             5\n\
             0: (=,1,-,T0_i)\n\
             1: (=,2,-,T1_i)\n\
             2: (+,T0_i,T1_i,T2_i)\n\
             3: (=,T2_i,-,TB0)\n\
             4: (End,-,-,-)\n"
        );
    }

    #[test]
    fn parser_declaration_offsets_advance_by_width() {
        let ir = parse("int a; double b; int c; c=1;").unwrap();
        assert!(ir.starts_with(
            "3\n\
             a 0 null 0\n\
             b 1 null 4\n\
             c 0 null 12\n"
        ));
    }

    #[test]
    fn parser_comma_declarations_share_the_type() {
        let ir = parse("double x, y; x=1.5;").unwrap();
        assert!(ir.starts_with(
            "2\n\
             x 1 null 0\n\
             y 1 null 8\n"
        ));
    }

    #[test]
    fn parser_float_literal_is_normalized() {
        let ir = parse("double d; d=2.5;").unwrap();
        assert!(ir.contains("0: (=,2.500000,-,T0_d)"));
        assert!(ir.contains("1: (=,T0_d,-,TB0)"));
    }

    #[test]
    fn parser_unary_minus_uses_zero_left_operand() {
        let ir = parse("int a; a=-5;").unwrap();
        assert!(ir.contains("0: (=,5,-,T0_i)"));
        assert!(ir.contains("1: (-,0,T0_i,T1_i)"));
        assert!(ir.contains("2: (=,T1_i,-,TB0)"));
    }

    #[test]
    fn parser_value_context_logical_ops_do_not_short_circuit() {
        let ir = parse("int a; a=1&&0;").unwrap();
        assert!(ir.contains("2: (&&,T0_i,T1_i,T2_i)"));
        assert!(!ir.contains("jnz"));
    }

    #[test]
    fn parser_if_statement_backpatches_the_true_branch() {
        let ir = parse("int x; x=0; if(x<1) then x=2;").unwrap();
        assert_eq!(
            ir,
            "1\n\
             x 0 null 0\n\
             3\n\
             8\n\
             0: (=,0,-,T0_i)\n\
             1: (=,T0_i,-,TB0)\n\
             2: (=,1,-,T1_i)\n\
             3: (j<,TB0,T1_i,5)\n\
             4: (j,-,-,7)\n\
             5: (=,2,-,T2_i)\n\
             6: (=,T2_i,-,TB0)\n\
             7: (End,-,-,-)\n"
        );
    }

    #[test]
    fn parser_while_with_short_circuit_and() {
        let ir = parse("int i; i=0; while(i<10 && i>=0) do i=i+1;").unwrap();
        assert_eq!(
            ir,
            "1\n\
             i 0 null 0\n\
             5\n\
             13\n\
             0: (=,0,-,T0_i)\n\
             1: (=,T0_i,-,TB0)\n\
             2: (=,10,-,T1_i)\n\
             3: (j<,TB0,T1_i,5)\n\
             4: (j,-,-,12)\n\
             5: (=,0,-,T2_i)\n\
             6: (j>=,TB0,T2_i,8)\n\
             7: (j,-,-,4)\n\
             8: (=,1,-,T3_i)\n\
             9: (+,TB0,T3_i,T4_i)\n\
             10: (=,T4_i,-,TB0)\n\
             11: (j,-,-,2)\n\
             12: (End,-,-,-)\n"
        );
    }

    #[test]
    fn parser_scanf_printf_emit_io_quads() {
        let ir = parse("int a,b; scanf(a,b); printf(a);").unwrap();
        assert_eq!(
            ir,
            "2\n\
             a 0 null 0\n\
             b 0 null 4\n\
             0\n\
             4\n\
             0: (R,-,-,TB0)\n\
             1: (R,-,-,TB1)\n\
             2: (W,-,-,TB0)\n\
             3: (End,-,-,-)\n"
        );
    }

    #[test]
    fn parser_braced_statement_lists() {
        let ir = parse("int a; { a=1; a=2; };").unwrap();
        assert!(ir.contains("0: (=,1,-,T0_i)"));
        assert!(ir.contains("2: (=,2,-,T1_i)"));
        assert!(ir.ends_with("4: (End,-,-,-)\n"));
    }

    #[test]
    fn parser_jump_destinations_stay_in_range() {
        let ir = parse("int i; i=0; while(i<10 && i>=0) do { i=i+1; if(i>5) then i=0; };").unwrap();
        let total: usize = ir.lines().nth(3).unwrap().parse().unwrap();
        for line in ir.lines().skip(4) {
            let quad = Quad::parse(line, 0).unwrap();
            if quad.is_jump() {
                let dest: usize = quad.dest.parse().unwrap();
                assert!(dest < total, "jump out of range in {line}");
            }
        }
    }

    #[test]
    fn parser_rejects_duplicate_declaration() {
        assert_eq!(parse("int a; double a; a=1;"), Err(CompileError::Syntax));
    }

    #[test]
    fn parser_rejects_undeclared_identifier() {
        assert_eq!(parse("int a; b=1;"), Err(CompileError::Syntax));
    }

    #[test]
    fn parser_rejects_malformed_input() {
        assert_eq!(parse("int a; a=;"), Err(CompileError::Syntax));
        assert_eq!(parse("int a a=1;"), Err(CompileError::Syntax));
        assert_eq!(parse("a=1;"), Err(CompileError::Syntax));
    }

    #[test]
    fn parser_symbol_names_are_distinct() {
        let ir = parse("int a,b; double c; a=1;").unwrap();
        let count: usize = ir.lines().next().unwrap().parse().unwrap();
        let mut names: Vec<&str> = ir
            .lines()
            .skip(1)
            .take(count)
            .map(|l| l.split_whitespace().next().unwrap())
            .collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), count);
    }
}
