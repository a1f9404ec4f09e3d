//! Object Code Generation
//!
//! Compiler pass that turns the serialized quadruple IR into the final
//! assembly listing for the three-register abstract machine.
//!
//! The pass partitions the quadruples into basic blocks, runs a backward
//! next-use/liveness scan per block, and walks each block forward with a
//! descriptor-based register allocator: a register descriptor maps `R0..R2`
//! to the variables they hold, an address descriptor maps each variable to
//! the locations (memory home, registers) holding its current value. Both
//! descriptors reset at block entry, and named variables still living only in
//! a register are stored back to their homes at block exit.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::compiler::ir::{self, Operand, Quad, Symbol, ValueType};
use crate::error::{CompileError, CompileResult};

/// The register file of the target machine, in allocation preference order.
const REGISTERS: [&str; 3] = ["R0", "R1", "R2"];

/// Published next-use distance for a variable with no further use in the
/// block.
const NO_NEXT_USE: i32 = i32::MAX;

/// Binary operator to opcode. Relational operators compare here and take
/// their value from the paired `set` opcode.
const OPCODES: [(&str, &str); 12] = [
    ("+", "add"),
    ("-", "sub"),
    ("*", "imul"),
    ("/", "idiv"),
    ("&&", "and"),
    ("||", "or"),
    ("==", "cmp"),
    ("!=", "cmp"),
    ("<", "cmp"),
    ("<=", "cmp"),
    (">", "cmp"),
    (">=", "cmp"),
];

const SET_OPCODES: [(&str, &str); 6] = [
    ("==", "sete"),
    ("!=", "setne"),
    ("<", "setl"),
    ("<=", "setle"),
    (">", "setg"),
    (">=", "setge"),
];

const JUMP_OPCODES: [(&str, &str); 6] = [
    ("j==", "je"),
    ("j!=", "jne"),
    ("j<", "jl"),
    ("j<=", "jle"),
    ("j>", "jg"),
    ("j>=", "jge"),
];

fn opcode_for(table: &[(&'static str, &'static str)], op: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(key, _)| *key == op)
        .map(|(_, opcode)| *opcode)
}

/// Reads the next line of the serialized IR, reporting its 1-based number.
fn read_line<'a>(lines: &[&'a str], cursor: &mut usize) -> CompileResult<(usize, &'a str)> {
    let line_no = *cursor + 1;
    let line = lines
        .get(*cursor)
        .ok_or(CompileError::MalformedIr { line: line_no })?;
    *cursor += 1;
    Ok((line_no, line))
}

/// Next-use and liveness of one variable at one program point.
#[derive(Debug, Clone, Copy)]
struct UsageInfo {
    /// Quadruple index of the next use within the block, -1 for none.
    next_use: i32,
    /// Whether the value is needed later.
    live: bool,
}

impl Default for UsageInfo {
    fn default() -> Self {
        UsageInfo {
            next_use: -1,
            live: true,
        }
    }
}

/// Generates the assembly listing for the given serialized IR.
///
/// An IR with no quadruples produces a bare `halt`.
///
/// # Errors
///
/// Returns [`CompileError::MalformedIr`] if the input does not match the
/// serialization layout.
pub fn generate(input: &str) -> CompileResult<String> {
    let mut generator = ObjectCodeGenerator::default();
    generator.parse_input(input)?;

    if generator.quads.is_empty() {
        return Ok("halt\n".to_string());
    }

    generator.partition_blocks();
    generator.analyze_usage();
    generator.generate_code();
    Ok(generator.format_output())
}

/// State of one code-generation run.
#[derive(Debug, Default)]
struct ObjectCodeGenerator {
    symbols: Vec<Symbol>,
    quads: Vec<Quad>,
    /// Inclusive `[start, end]` quadruple ranges.
    blocks: Vec<(usize, usize)>,
    /// Per-quadruple next-use records, slots `[arg1, arg2, dest]`.
    usage: Vec<[UsageInfo; 3]>,
    /// Address descriptor: variable name to the locations holding its value.
    /// A variable whose set contains its own name is memory-resident.
    var_locations: BTreeMap<String, BTreeSet<String>>,
    /// Register descriptor: register name to held variables.
    register_values: BTreeMap<String, BTreeSet<String>>,
    /// Published next-use distances for the current block.
    use_position: HashMap<String, i32>,
    /// Emitted instructions, grouped per source quadruple.
    code: Vec<Vec<String>>,
    /// Whether a label must precede the quadruple at each index.
    label_flags: Vec<bool>,
    /// Frame offsets of temporaries, assigned lazily; 0 means unassigned.
    temp_homes: Vec<i32>,
    /// Allocation cursor, starting past the last named symbol.
    offset: i32,
}

impl ObjectCodeGenerator {
    /// Reads the serialized parser output: symbol count, symbol lines, temp
    /// count, quadruple count, quadruple lines.
    fn parse_input(&mut self, input: &str) -> CompileResult<()> {
        let lines: Vec<&str> = input.lines().collect();
        let mut cursor = 0;

        let (line_no, count_line) = read_line(&lines, &mut cursor)?;
        let symbol_count: usize = count_line
            .trim()
            .parse()
            .map_err(|_| CompileError::MalformedIr { line: line_no })?;

        for _ in 0..symbol_count {
            let (line_no, line) = read_line(&lines, &mut cursor)?;
            let malformed = CompileError::MalformedIr { line: line_no };

            let mut fields = line.split_whitespace();
            let name = fields.next().ok_or(malformed.clone())?;
            let ty = fields
                .next()
                .and_then(|f| f.parse().ok())
                .and_then(ValueType::from_code)
                .ok_or(malformed.clone())?;
            let _value = fields.next().ok_or(malformed.clone())?;
            let offset = fields
                .next()
                .and_then(|f| f.parse().ok())
                .ok_or(malformed)?;

            self.symbols.push(Symbol {
                name: name.to_string(),
                ty,
                offset,
            });
        }

        if let Some(last) = self.symbols.last() {
            self.offset = last.offset + last.ty.width();
        }

        let (line_no, temp_line) = read_line(&lines, &mut cursor)?;
        let temp_count: usize = temp_line
            .trim()
            .parse()
            .map_err(|_| CompileError::MalformedIr { line: line_no })?;
        self.temp_homes = vec![0; temp_count];

        let (line_no, quad_line) = read_line(&lines, &mut cursor)?;
        let quad_count: usize = quad_line
            .trim()
            .parse()
            .map_err(|_| CompileError::MalformedIr { line: line_no })?;

        for _ in 0..quad_count {
            let (line_no, line) = read_line(&lines, &mut cursor)?;
            self.quads.push(Quad::parse(line, line_no)?);
        }

        // Jump destinations were resolved during serialization; anything that
        // is not an in-range index is corrupt input.
        for (i, quad) in self.quads.iter().enumerate() {
            if quad.is_jump() {
                let valid = quad
                    .dest
                    .parse::<usize>()
                    .is_ok_and(|t| t < self.quads.len());
                if !valid {
                    return Err(CompileError::MalformedIr { line: i + 1 });
                }
            }
        }

        self.code = vec![Vec::new(); self.quads.len()];
        self.label_flags = vec![false; self.quads.len()];
        Ok(())
    }

    /// Resolved target of a jump quadruple.
    fn jump_target(&self, index: usize) -> usize {
        self.quads[index]
            .dest
            .parse()
            .expect("jump destinations are validated during input parsing")
    }

    /// Marks block entry points and forms `[start, end]` blocks. Entries:
    /// index 0, every jump target, the successor of every conditional jump,
    /// and every I/O quadruple. A block also ends at a jump or `End`.
    fn partition_blocks(&mut self) {
        let len = self.quads.len();
        let mut entries = vec![false; len];
        entries[0] = true;

        for i in 0..len {
            if self.quads[i].is_jump() {
                entries[self.jump_target(i)] = true;
                if self.quads[i].op != "j" && i < len - 1 {
                    entries[i + 1] = true;
                }
            }
            if self.quads[i].op == "R" || self.quads[i].op == "W" {
                entries[i] = true;
            }
        }

        let mut i = 0;
        while i < len {
            if !entries[i] {
                i += 1;
                continue;
            }

            let mut j = i + 1;
            let mut formed = false;
            while j < len {
                if entries[j] || self.quads[j - 1].is_jump() || self.quads[j - 1].op == "End" {
                    self.blocks.push((i, j - 1));
                    formed = true;
                    break;
                }
                j += 1;
            }
            if !formed {
                self.blocks.push((i, len - 1));
            }
            i = j;
        }

        log::debug!("partitioned {} quadruples into {} blocks", len, self.blocks.len());
    }

    /// Backward scan recording, for every variable occurrence, the usage
    /// state that held before this instruction: the destination slot is
    /// visited first so a variable read and written by one instruction keeps
    /// its read. Named symbols start live, temporaries dead.
    fn analyze_usage(&mut self) {
        self.usage = vec![[UsageInfo::default(); 3]; self.quads.len()];
        let mut memory_usage = vec![
            UsageInfo {
                next_use: -1,
                live: true,
            };
            self.symbols.len()
        ];
        let mut temp_usage = vec![
            UsageInfo {
                next_use: -1,
                live: false,
            };
            self.temp_homes.len()
        ];

        for &(start, end) in &self.blocks {
            for i in (start..=end).rev() {
                let operands = [
                    self.quads[i].arg1.clone(),
                    self.quads[i].arg2.clone(),
                    self.quads[i].dest.clone(),
                ];

                for slot in (0..3).rev() {
                    let updated = if slot == 2 {
                        UsageInfo {
                            next_use: -1,
                            live: false,
                        }
                    } else {
                        UsageInfo {
                            next_use: i as i32,
                            live: true,
                        }
                    };

                    match Operand::classify(&operands[slot]) {
                        Some(Operand::Symbol(idx)) if idx < memory_usage.len() => {
                            self.usage[i][slot] = memory_usage[idx];
                            memory_usage[idx] = updated;
                        }
                        Some(Operand::Temp(idx)) if idx < temp_usage.len() => {
                            self.usage[i][slot] = temp_usage[idx];
                            temp_usage[idx] = updated;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Walks every block forward, dispatching each quadruple to the
    /// arithmetic, jump, or I/O handler, then stores live named variables
    /// back to memory.
    fn generate_code(&mut self) {
        for block_index in 0..self.blocks.len() {
            let (start, end) = self.blocks[block_index];

            self.register_values.clear();
            for reg in REGISTERS {
                self.register_values.insert(reg.to_string(), BTreeSet::new());
            }
            self.var_locations.clear();
            self.use_position.clear();

            for i in start..=end {
                let op = self.quads[i].op.clone();
                if !op.starts_with('j') && op != "R" && op != "W" && op != "End" {
                    self.handle_arithmetic(i);
                } else if op == "R" || op == "W" {
                    self.handle_io(i);
                } else {
                    self.handle_jump(i);
                }
            }

            self.save_active_variables(end);
        }
    }

    /// Arithmetic, logical, and copy quadruples: allocate a target register,
    /// load the first operand unless it already occupies the target, combine
    /// with the second operand, and rebind the target to the destination.
    fn handle_arithmetic(&mut self, index: usize) {
        let quad = self.quads[index].clone();
        let usage = self.usage[index];
        self.update_use_position(&quad.arg1, usage[0].next_use);
        self.update_use_position(&quad.arg2, usage[1].next_use);
        self.update_use_position(&quad.dest, usage[2].next_use);

        let target = self.allocate_register(index);
        let arg1 = self.find_register(&quad.arg1);
        let mut arg2 = quad.arg2.clone();
        if arg2 != "-" {
            arg2 = self.find_register(&arg2);
        }

        if arg1 == target {
            if arg2 != "-" {
                let operand2 = self.resolve_operand(&arg2);
                self.transfer_operation(&quad.op, &target, &operand2, index);
            }
            if quad.op == "!" {
                self.code[index].push(format!("not {arg1}"));
            }
            self.var_locations
                .entry(quad.arg1.clone())
                .or_default()
                .remove(&target);
        } else {
            let operand1 = self.resolve_operand(&arg1);
            self.code[index].push(format!("mov {target}, {operand1}"));
            if arg2 != "-" {
                let operand2 = self.resolve_operand(&arg2);
                self.transfer_operation(&quad.op, &target, &operand2, index);
            }
            if quad.op == "!" {
                self.code[index].push(format!("not {target}"));
            }
        }

        if arg2 == target {
            self.var_locations
                .entry(quad.arg2.clone())
                .or_default()
                .remove(&target);
        }

        let values = self.register_values.entry(target.clone()).or_default();
        values.clear();
        values.insert(quad.dest.clone());
        let locations = self.var_locations.entry(quad.dest.clone()).or_default();
        locations.clear();
        locations.insert(target);
    }

    /// Jump quadruples. Comparison operands are loaded into `R0` when not
    /// already register-resident; `End` lowers to `halt`. Every emitted jump
    /// marks its target for labeling.
    fn handle_jump(&mut self, index: usize) {
        let quad = self.quads[index].clone();

        if quad.op == "j" {
            self.code[index].push(format!("jmp ?{}", quad.dest));
            self.mark_label(index);
        } else if quad.op == "jnz" {
            let mut reg = self.find_register(&quad.arg1);
            if reg == quad.arg1 {
                reg = self.allocate_register(index);
                let addr = self.address_of(&quad.arg1);
                self.code[index].push(format!("mov {reg}, {addr}"));
            }

            self.code[index].push(format!("cmp {reg}, 0"));
            self.code[index].push(format!("jne ?{}", quad.dest));
            self.mark_label(index);
        } else if quad.op == "End" {
            self.code[index].push("halt".to_string());
        } else {
            let mut lhs = self.find_register(&quad.arg1);
            let rhs = self.find_register(&quad.arg2);

            if lhs == quad.arg1 {
                lhs = self.allocate_register(index);
                let addr = self.address_of(&quad.arg1);
                self.code[index].push(format!("mov {lhs}, {addr}"));
            }

            if rhs.starts_with('T') {
                let addr = self.address_of(&rhs);
                self.code[index].push(format!("cmp {lhs}, {addr}"));
            } else {
                self.code[index].push(format!("cmp {lhs}, {rhs}"));
            }

            if let Some(opcode) = opcode_for(&JUMP_OPCODES, &quad.op) {
                self.code[index].push(format!("{opcode} ?{}", quad.dest));
            }
            self.mark_label(index);
        }
    }

    /// Read and write quadruples lower to runtime-resolved pseudo jumps.
    fn handle_io(&mut self, index: usize) {
        let quad = self.quads[index].clone();
        let addr = self.address_of(&quad.dest);
        let routine = if quad.op == "R" { "read" } else { "write" };
        self.code[index].push(format!("jmp ?{routine}({addr})"));
    }

    /// Chooses a register for the quadruple at `index`, spilling if every
    /// register is occupied. Jump and I/O quadruples always answer `R0`.
    fn allocate_register(&mut self, index: usize) -> String {
        let quad = self.quads[index].clone();
        if quad.is_jump() || quad.op == "R" || quad.op == "W" || quad.op == "End" {
            return REGISTERS[0].to_string();
        }

        // Reuse: arg1's register, when it holds nothing else and the value
        // dies at this instruction.
        let locations = self
            .var_locations
            .get(&quad.arg1)
            .cloned()
            .unwrap_or_default();
        for loc in &locations {
            let Some(values) = self.register_values.get(loc) else {
                continue;
            };
            let single = values.len() == 1 && values.contains(&quad.arg1);
            let dead = quad.arg1 == quad.dest || !self.usage[index][0].live;
            if single && dead {
                return loc.clone();
            }
        }

        for reg in REGISTERS {
            if self.register_values.get(reg).is_none_or(|v| v.is_empty()) {
                return reg.to_string();
            }
        }

        // Spill selection: first a register whose variables are all already
        // memory-resident, otherwise the one whose earliest next use is
        // farthest away.
        let mut selected: Option<String> = None;
        for reg in REGISTERS {
            let all_in_memory = self.register_values[reg].iter().all(|v| {
                self.var_locations
                    .get(v)
                    .is_some_and(|locs| locs.contains(v))
            });
            if all_in_memory {
                selected = Some(reg.to_string());
                break;
            }
        }

        let selected = selected.unwrap_or_else(|| {
            let mut best = REGISTERS[0].to_string();
            let mut best_distance = -1i32;
            for reg in REGISTERS {
                let distance = self.register_values[reg]
                    .iter()
                    .map(|v| self.use_position.get(v).copied().unwrap_or(0))
                    .min()
                    .unwrap_or(i32::MAX);
                if distance > best_distance {
                    best = reg.to_string();
                    best_distance = distance;
                }
            }
            best
        });

        // Store what the register holds, then retire it from the address
        // descriptors. The first operand (and a second operand sharing the
        // register with it) stays reachable through the register until the
        // value is actually overwritten.
        let held: Vec<String> = self.register_values[&selected].iter().cloned().collect();
        for var in &held {
            let in_memory = self
                .var_locations
                .get(var)
                .is_some_and(|locs| locs.contains(var));
            if !in_memory && *var != quad.dest {
                let addr = self.address_of(var);
                self.code[index].push(format!("mov {addr}, {selected}"));
                log::debug!("spill {var} from {selected} at quadruple {index}");
            }

            let keeps_register =
                *var == quad.arg1 || (*var == quad.arg2 && held.iter().any(|v| *v == quad.arg1));
            let mut locations = BTreeSet::from([var.clone()]);
            if keeps_register {
                locations.insert(selected.clone());
            }
            self.var_locations.insert(var.clone(), locations);
        }

        if let Some(values) = self.register_values.get_mut(&selected) {
            values.clear();
        }

        selected
    }

    /// Register currently holding `var`, or `var` itself when none does.
    fn find_register(&self, var: &str) -> String {
        if let Some(locations) = self.var_locations.get(var) {
            for loc in locations {
                if loc.starts_with('R') {
                    return loc.clone();
                }
            }
        }
        var.to_string()
    }

    /// Instruction operand for a resolved name: variables still in memory use
    /// their address, registers and literals pass through.
    fn resolve_operand(&mut self, name: &str) -> String {
        if name.starts_with('T') {
            self.address_of(name)
        } else {
            name.to_string()
        }
    }

    /// Memory operand of a variable. Temporaries get a home assigned on first
    /// request, 4 or 8 bytes by type suffix, and are marked memory-resident.
    fn address_of(&mut self, var: &str) -> String {
        match Operand::classify(var) {
            Some(Operand::Symbol(idx)) if idx < self.symbols.len() => {
                format!("[ebp-{}]", self.symbols[idx].offset)
            }
            Some(Operand::Temp(idx)) if idx < self.temp_homes.len() => {
                if self.temp_homes[idx] == 0 {
                    let width = if var.ends_with('i') {
                        ValueType::Int.width()
                    } else {
                        ValueType::Double.width()
                    };
                    self.temp_homes[idx] = self.offset;
                    self.offset += width;
                    self.var_locations
                        .entry(var.to_string())
                        .or_default()
                        .insert(var.to_string());
                }
                format!("[ebp-{}]", self.temp_homes[idx])
            }
            _ => var.to_string(),
        }
    }

    /// Emits the opcode for a binary operation, plus the value-producing
    /// `set` instruction for relational operators.
    fn transfer_operation(&mut self, op: &str, x: &str, y: &str, index: usize) {
        if let Some(opcode) = opcode_for(&OPCODES, op) {
            self.code[index].push(format!("{opcode} {x}, {y}"));
            if let Some(set) = opcode_for(&SET_OPCODES, op) {
                self.code[index].push(format!("{set} {x}"));
            }
        }
    }

    /// Publishes a variable's next-use distance for spill selection.
    fn update_use_position(&mut self, var: &str, next_use: i32) {
        if var.starts_with('T') {
            let value = if next_use == -1 { NO_NEXT_USE } else { next_use };
            self.use_position.insert(var.to_string(), value);
        }
    }

    fn mark_label(&mut self, index: usize) {
        let target = self.jump_target(index);
        self.label_flags[target] = true;
    }

    /// Stores every named variable whose value lives only in a register back
    /// to its memory home, appending after the block's final instruction.
    fn save_active_variables(&mut self, block_end: usize) {
        for (i, symbol) in self.symbols.iter().enumerate() {
            let var = ir::symbol_place(i);
            let Some(locations) = self.var_locations.get(&var) else {
                continue;
            };
            if locations.is_empty() || locations.contains(&var) {
                continue;
            }
            if let Some(reg) = locations.iter().find(|loc| loc.starts_with('R')) {
                self.code[block_end].push(format!("mov [ebp-{}], {reg}", symbol.offset));
            }
        }
    }

    /// Concatenates blocks in order, prefixing `?<start>:` labels for blocks
    /// that are jump targets.
    fn format_output(&self) -> String {
        let mut out = String::new();
        for &(start, end) in &self.blocks {
            if self.label_flags[start] {
                out.push_str(&format!("?{start}:\n"));
            }
            for i in start..=end {
                for line in &self.code[i] {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        out
    }
}
