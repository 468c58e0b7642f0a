//! Method body decoding.
//!
//! `walk_method` replays a method as a stream of visitor events. Short
//! instruction forms are normalized on the way: `iload_2` is reported as
//! `ILOAD 2`, `wide` prefixes are folded into their instruction, `ldc_w` and
//! `ldc2_w` become plain `ldc`, and `goto_w`/`jsr_w` become `GOTO`/`JSR`.

use std::collections::BTreeSet;
use std::fmt;

use crate::classfile::{ConstantPool, LoadableConstant, MethodInfo};
use crate::error::CompileError;
use crate::opcodes;

/// Bytecode position that branches, handlers and variable scopes refer to.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct Label(u32);

impl Label {
    pub(crate) fn at(offset: u32) -> Self {
        Label(offset)
    }

    pub(crate) fn name(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Receiver of the event stream produced by [`walk_method`].
///
/// Events arrive in this order: parameters, try/catch blocks, then
/// instructions with each label reported immediately before the instruction
/// it marks, then local variables, then a single `visit_end`.
pub(crate) trait MethodVisitor {
    fn visit_parameter(&mut self, name: Option<&str>, access_flags: u16) -> Result<(), CompileError>;
    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), CompileError>;
    fn visit_label(&mut self, label: Label) -> Result<(), CompileError>;
    fn visit_insn(&mut self, opcode: u8) -> Result<(), CompileError>;
    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), CompileError>;
    fn visit_var_insn(&mut self, opcode: u8, index: u16) -> Result<(), CompileError>;
    fn visit_type_insn(&mut self, opcode: u8, class_name: &str) -> Result<(), CompileError>;
    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), CompileError>;
    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), CompileError>;
    fn visit_jump_insn(&mut self, opcode: u8, target: Label) -> Result<(), CompileError>;
    fn visit_ldc_insn(&mut self, index: u16, constant: LoadableConstant) -> Result<(), CompileError>;
    fn visit_iinc_insn(&mut self, index: u16, increment: i16) -> Result<(), CompileError>;
    fn visit_table_switch_insn(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), CompileError>;
    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        targets: &[Label],
    ) -> Result<(), CompileError>;
    fn visit_multi_anew_array_insn(&mut self, descriptor: &str, dimensions: u8) -> Result<(), CompileError>;
    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), CompileError>;
    fn visit_end(&mut self) -> Result<(), CompileError>;
}

/// One decoded instruction with its operands resolved against the pool.
#[derive(Clone, Debug, PartialEq)]
enum Operation<'a> {
    Plain(u8),
    Int(u8, i32),
    Var(u8, u16),
    Type(u8, &'a str),
    Field {
        opcode: u8,
        owner: &'a str,
        name: &'a str,
        descriptor: &'a str,
    },
    Method {
        opcode: u8,
        owner: &'a str,
        name: &'a str,
        descriptor: &'a str,
        is_interface: bool,
    },
    Jump(u8, Label),
    Ldc(u16, LoadableConstant),
    Iinc(u16, i16),
    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        keys: Vec<i32>,
        targets: Vec<Label>,
    },
    MultiANewArray(&'a str, u8),
}

impl Operation<'_> {
    fn branch_targets(&self) -> Vec<Label> {
        match self {
            Operation::Jump(_, target) => vec![*target],
            Operation::TableSwitch {
                default, targets, ..
            }
            | Operation::LookupSwitch {
                default, targets, ..
            } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
            _ => Vec::new(),
        }
    }
}

/// Replay `method` into `visitor`.
pub(crate) fn walk_method(
    method: &MethodInfo,
    constant_pool: &ConstantPool,
    visitor: &mut impl MethodVisitor,
) -> Result<(), CompileError> {
    for parameter in &method.parameters {
        visitor.visit_parameter(parameter.name.as_deref(), parameter.access_flags)?;
    }
    let Some(code) = &method.code else {
        return visitor.visit_end();
    };

    let bytecode = &code.bytecode;
    let code_length = bytecode.len() as u32;
    let mut instructions = Vec::new();
    let mut labels = BTreeSet::new();
    let mut offset = 0usize;
    while offset < bytecode.len() {
        let (operation, length) = decode_instruction(bytecode, offset, constant_pool)?;
        labels.extend(operation.branch_targets());
        instructions.push((offset as u32, operation));
        offset += length;
    }
    if offset != bytecode.len() {
        return Err(CompileError::malformed_class(
            "instruction runs past the end of the code array",
        ));
    }

    let mark = |offset: u16| -> Result<Label, CompileError> {
        if u32::from(offset) > code_length {
            return Err(CompileError::malformed_class(format!(
                "offset {offset} outside code of length {code_length}"
            )));
        }
        Ok(Label::at(u32::from(offset)))
    };

    let mut handlers = Vec::with_capacity(code.exception_table.len());
    for entry in &code.exception_table {
        let start = mark(entry.start_pc)?;
        let end = mark(entry.end_pc)?;
        let handler = mark(entry.handler_pc)?;
        labels.extend([start, end, handler]);
        handlers.push((start, end, handler, entry.catch_type.as_deref()));
    }
    let mut variables = Vec::with_capacity(code.local_variables.len());
    for variable in &code.local_variables {
        let start = mark(variable.start_pc)?;
        let end_pc = u32::from(variable.start_pc) + u32::from(variable.length);
        if end_pc > code_length {
            return Err(CompileError::malformed_class(format!(
                "local variable {} ends outside the code array",
                variable.name
            )));
        }
        let end = Label::at(end_pc);
        labels.extend([start, end]);
        variables.push((variable, start, end));
    }

    for (start, end, handler, catch_type) in handlers {
        visitor.visit_try_catch_block(start, end, handler, catch_type)?;
    }

    let mut pending = labels.into_iter().peekable();
    for (offset, operation) in instructions {
        while let Some(label) = pending.next_if(|label| label.0 <= offset) {
            if label.0 != offset {
                return Err(CompileError::malformed_class(format!(
                    "{label} does not start an instruction"
                )));
            }
            visitor.visit_label(label)?;
        }
        emit(operation, visitor)?;
    }
    for label in pending {
        if label.0 != code_length {
            return Err(CompileError::malformed_class(format!(
                "{label} does not start an instruction"
            )));
        }
        visitor.visit_label(label)?;
    }

    for (variable, start, end) in variables {
        visitor.visit_local_variable(
            &variable.name,
            &variable.descriptor,
            start,
            end,
            variable.index,
        )?;
    }
    visitor.visit_end()
}

fn emit(operation: Operation<'_>, visitor: &mut impl MethodVisitor) -> Result<(), CompileError> {
    match operation {
        Operation::Plain(opcode) => visitor.visit_insn(opcode),
        Operation::Int(opcode, operand) => visitor.visit_int_insn(opcode, operand),
        Operation::Var(opcode, index) => visitor.visit_var_insn(opcode, index),
        Operation::Type(opcode, class_name) => visitor.visit_type_insn(opcode, class_name),
        Operation::Field {
            opcode,
            owner,
            name,
            descriptor,
        } => visitor.visit_field_insn(opcode, owner, name, descriptor),
        Operation::Method {
            opcode,
            owner,
            name,
            descriptor,
            is_interface,
        } => visitor.visit_method_insn(opcode, owner, name, descriptor, is_interface),
        Operation::Jump(opcode, target) => visitor.visit_jump_insn(opcode, target),
        Operation::Ldc(index, constant) => visitor.visit_ldc_insn(index, constant),
        Operation::Iinc(index, increment) => visitor.visit_iinc_insn(index, increment),
        Operation::TableSwitch {
            low,
            high,
            default,
            targets,
        } => visitor.visit_table_switch_insn(low, high, default, &targets),
        Operation::LookupSwitch {
            default,
            keys,
            targets,
        } => visitor.visit_lookup_switch_insn(default, &keys, &targets),
        Operation::MultiANewArray(descriptor, dimensions) => {
            visitor.visit_multi_anew_array_insn(descriptor, dimensions)
        }
    }
}

/// Decode the instruction at `offset`, returning it with its byte length.
fn decode_instruction<'p>(
    code: &[u8],
    offset: usize,
    constant_pool: &'p ConstantPool,
) -> Result<(Operation<'p>, usize), CompileError> {
    let opcode = code[offset];
    let mut cursor = offset + 1;
    let operation = match opcode {
        opcodes::NOP..=opcodes::DCONST_1 => Operation::Plain(opcode),
        opcodes::BIPUSH => Operation::Int(opcode, i32::from(read_u8(code, &mut cursor)? as i8)),
        opcodes::SIPUSH => Operation::Int(opcode, i32::from(read_u16(code, &mut cursor)? as i16)),
        opcodes::LDC => {
            let index = u16::from(read_u8(code, &mut cursor)?);
            Operation::Ldc(index, constant_pool.loadable(index)?)
        }
        opcodes::LDC_W | opcodes::LDC2_W => {
            let index = read_u16(code, &mut cursor)?;
            Operation::Ldc(index, constant_pool.loadable(index)?)
        }
        opcodes::ILOAD..=opcodes::ALOAD | opcodes::ISTORE..=opcodes::ASTORE | opcodes::RET => {
            Operation::Var(opcode, u16::from(read_u8(code, &mut cursor)?))
        }
        opcodes::ILOAD_0..=opcodes::ALOAD_3 => {
            let relative = opcode - opcodes::ILOAD_0;
            Operation::Var(opcodes::ILOAD + relative / 4, u16::from(relative % 4))
        }
        opcodes::ISTORE_0..=opcodes::ASTORE_3 => {
            let relative = opcode - opcodes::ISTORE_0;
            Operation::Var(opcodes::ISTORE + relative / 4, u16::from(relative % 4))
        }
        opcodes::IALOAD..=opcodes::SALOAD | opcodes::IASTORE..=opcodes::LXOR => {
            Operation::Plain(opcode)
        }
        opcodes::IINC => {
            let index = u16::from(read_u8(code, &mut cursor)?);
            let increment = i16::from(read_u8(code, &mut cursor)? as i8);
            Operation::Iinc(index, increment)
        }
        opcodes::I2L..=opcodes::DCMPG => Operation::Plain(opcode),
        opcodes::IFEQ..=opcodes::JSR | opcodes::IFNULL | opcodes::IFNONNULL => {
            let delta = i32::from(read_u16(code, &mut cursor)? as i16);
            Operation::Jump(opcode, branch_target(code, offset, delta)?)
        }
        opcodes::GOTO_W | opcodes::JSR_W => {
            let delta = read_u32(code, &mut cursor)? as i32;
            let normalized = if opcode == opcodes::GOTO_W {
                opcodes::GOTO
            } else {
                opcodes::JSR
            };
            Operation::Jump(normalized, branch_target(code, offset, delta)?)
        }
        opcodes::TABLESWITCH => {
            cursor += padding(offset);
            let default = read_target(code, &mut cursor, offset)?;
            let low = read_u32(code, &mut cursor)? as i32;
            let high = read_u32(code, &mut cursor)? as i32;
            let count = i64::from(high) - i64::from(low) + 1;
            if count < 0 {
                return Err(CompileError::malformed_class("invalid tableswitch range"));
            }
            ensure_operands(code, cursor, count, 4, "tableswitch")?;
            let mut targets = Vec::with_capacity(count as usize);
            for _ in 0..count {
                targets.push(read_target(code, &mut cursor, offset)?);
            }
            Operation::TableSwitch {
                low,
                high,
                default,
                targets,
            }
        }
        opcodes::LOOKUPSWITCH => {
            cursor += padding(offset);
            let default = read_target(code, &mut cursor, offset)?;
            let pairs = read_u32(code, &mut cursor)? as i32;
            if pairs < 0 {
                return Err(CompileError::malformed_class("invalid lookupswitch pairs"));
            }
            ensure_operands(code, cursor, i64::from(pairs), 8, "lookupswitch")?;
            let mut keys = Vec::with_capacity(pairs as usize);
            let mut targets = Vec::with_capacity(pairs as usize);
            for _ in 0..pairs {
                keys.push(read_u32(code, &mut cursor)? as i32);
                targets.push(read_target(code, &mut cursor, offset)?);
            }
            Operation::LookupSwitch {
                default,
                keys,
                targets,
            }
        }
        opcodes::IRETURN..=opcodes::RETURN => Operation::Plain(opcode),
        opcodes::GETSTATIC..=opcodes::PUTFIELD => {
            let member = constant_pool.member_ref(read_u16(code, &mut cursor)?)?;
            Operation::Field {
                opcode,
                owner: member.owner,
                name: member.name,
                descriptor: member.descriptor,
            }
        }
        opcodes::INVOKEVIRTUAL..=opcodes::INVOKEINTERFACE => {
            let member = constant_pool.member_ref(read_u16(code, &mut cursor)?)?;
            if opcode == opcodes::INVOKEINTERFACE {
                // count and a reserved zero byte
                cursor += 2;
            }
            Operation::Method {
                opcode,
                owner: member.owner,
                name: member.name,
                descriptor: member.descriptor,
                is_interface: member.is_interface,
            }
        }
        opcodes::INVOKEDYNAMIC => return Err(CompileError::unsupported("invokedynamic")),
        opcodes::NEW | opcodes::ANEWARRAY | opcodes::CHECKCAST | opcodes::INSTANCEOF => {
            let class_name = constant_pool.class_name(read_u16(code, &mut cursor)?)?;
            Operation::Type(opcode, class_name)
        }
        opcodes::NEWARRAY => Operation::Int(opcode, i32::from(read_u8(code, &mut cursor)?)),
        opcodes::ARRAYLENGTH | opcodes::ATHROW | opcodes::MONITORENTER | opcodes::MONITOREXIT => {
            Operation::Plain(opcode)
        }
        opcodes::WIDE => {
            let modified = read_u8(code, &mut cursor)?;
            let index = read_u16(code, &mut cursor)?;
            match modified {
                opcodes::IINC => Operation::Iinc(index, read_u16(code, &mut cursor)? as i16),
                opcodes::ILOAD..=opcodes::ALOAD
                | opcodes::ISTORE..=opcodes::ASTORE
                | opcodes::RET => Operation::Var(modified, index),
                _ => {
                    return Err(CompileError::malformed_class(format!(
                        "wide prefix on opcode 0x{modified:02x}"
                    )));
                }
            }
        }
        opcodes::MULTIANEWARRAY => {
            let descriptor = constant_pool.class_name(read_u16(code, &mut cursor)?)?;
            let dimensions = read_u8(code, &mut cursor)?;
            Operation::MultiANewArray(descriptor, dimensions)
        }
        _ => {
            return Err(CompileError::unsupported(format!(
                "opcode 0x{opcode:02x} at offset {offset}"
            )));
        }
    };
    if cursor > code.len() {
        return Err(CompileError::malformed_class(
            "instruction runs past the end of the code array",
        ));
    }
    Ok((operation, cursor - offset))
}

/// Reject switch tables whose declared size exceeds the remaining code.
fn ensure_operands(
    code: &[u8],
    cursor: usize,
    entries: i64,
    width: i64,
    instruction: &str,
) -> Result<(), CompileError> {
    let remaining = code.len().saturating_sub(cursor) as i64;
    if entries * width > remaining {
        return Err(CompileError::malformed_class(format!(
            "{instruction} declares {entries} entries past the end of the code array"
        )));
    }
    Ok(())
}

fn read_u8(code: &[u8], cursor: &mut usize) -> Result<u8, CompileError> {
    let byte = *code
        .get(*cursor)
        .ok_or_else(|| CompileError::malformed_class("bytecode operand out of bounds"))?;
    *cursor += 1;
    Ok(byte)
}

fn read_u16(code: &[u8], cursor: &mut usize) -> Result<u16, CompileError> {
    let high = read_u8(code, cursor)?;
    let low = read_u8(code, cursor)?;
    Ok(u16::from_be_bytes([high, low]))
}

fn read_u32(code: &[u8], cursor: &mut usize) -> Result<u32, CompileError> {
    let high = read_u16(code, cursor)?;
    let low = read_u16(code, cursor)?;
    Ok((u32::from(high) << 16) | u32::from(low))
}

fn read_target(code: &[u8], cursor: &mut usize, base: usize) -> Result<Label, CompileError> {
    let delta = read_u32(code, cursor)? as i32;
    branch_target(code, base, delta)
}

fn branch_target(code: &[u8], base: usize, delta: i32) -> Result<Label, CompileError> {
    let target = base as i64 + i64::from(delta);
    if target < 0 || target >= code.len() as i64 {
        return Err(CompileError::malformed_class(format!(
            "branch at offset {base} targets {target} outside the code array"
        )));
    }
    Ok(Label::at(target as u32))
}

/// Alignment bytes between a switch opcode and its first operand.
fn padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}
