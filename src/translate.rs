use tracing::trace;

use crate::access::{AccessContext, decompose};
use crate::bytecode::{Label, MethodVisitor};
use crate::class_translator::References;
use crate::classfile::LoadableConstant;
use crate::descriptor::{TypeToken, decode_internal_name, decode_type, parse_method_signature};
use crate::error::CompileError;
use crate::ir::{CallSignature, InstructionNode, LdcValue, NumericConstant};
use crate::naming::RuntimeNaming;
use crate::opcodes;

/// Turns the event stream of one method body into IR nodes.
///
/// Every class named by an operand is registered with the shared
/// [`References`] of the enclosing class.
pub(crate) struct InstructionTranslator<'a> {
    naming: &'a RuntimeNaming,
    references: &'a mut References,
    nodes: Vec<InstructionNode>,
}

impl<'a> InstructionTranslator<'a> {
    pub(crate) fn new(naming: &'a RuntimeNaming, references: &'a mut References) -> Self {
        Self {
            naming,
            references,
            nodes: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> Vec<InstructionNode> {
        self.nodes
    }

    fn push(&mut self, node: InstructionNode) -> Result<(), CompileError> {
        trace!(?node, "translated instruction");
        self.nodes.push(node);
        Ok(())
    }

    fn strip_token(&self, token: TypeToken) -> TypeToken {
        token.map_class_names(&|name: &str| self.naming.strip(name))
    }

    fn class_token(&mut self, internal_name: &str) -> Result<TypeToken, CompileError> {
        let references = &mut *self.references;
        let token = decode_internal_name(internal_name, &mut |name: &str| references.add(name))?;
        Ok(self.strip_token(token))
    }

    fn type_token(&mut self, descriptor: &str) -> Result<TypeToken, CompileError> {
        let references = &mut *self.references;
        let token = decode_type(descriptor, &mut |name: &str| references.add(name))?;
        Ok(self.strip_token(token))
    }

    fn call_signature(&mut self, descriptor: &str) -> Result<CallSignature, CompileError> {
        let references = &mut *self.references;
        let parts = parse_method_signature(descriptor, &mut |name: &str| references.add(name))?;
        Ok(CallSignature {
            raw: self.naming.strip(descriptor),
            parts: parts.map_class_names(&|name: &str| self.naming.strip(name)),
        })
    }
}

fn mnemonic(opcode: u8) -> Result<&'static str, CompileError> {
    opcodes::name(opcode)
        .ok_or_else(|| CompileError::unsupported(format!("opcode 0x{opcode:02x}")))
}

impl MethodVisitor for InstructionTranslator<'_> {
    fn visit_parameter(&mut self, name: Option<&str>, access_flags: u16) -> Result<(), CompileError> {
        let access = decompose(u32::from(access_flags), AccessContext::Parameter)?;
        self.push(InstructionNode::Arg {
            name: name.map(str::to_string),
            access,
        })
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), CompileError> {
        let catch_type = catch_type.map(|name| {
            self.references.add(name);
            self.naming.strip(name)
        });
        self.push(InstructionNode::Try {
            start: start.name(),
            end: end.name(),
            handler: handler.name(),
            catch_type,
        })
    }

    fn visit_label(&mut self, label: Label) -> Result<(), CompileError> {
        self.push(InstructionNode::Label { name: label.name() })
    }

    fn visit_insn(&mut self, opcode: u8) -> Result<(), CompileError> {
        let opcode = mnemonic(opcode)?;
        self.push(InstructionNode::Insn { opcode })
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), CompileError> {
        let opcode = mnemonic(opcode)?;
        self.push(InstructionNode::Int { opcode, operand })
    }

    fn visit_var_insn(&mut self, opcode: u8, index: u16) -> Result<(), CompileError> {
        let opcode = mnemonic(opcode)?;
        self.push(InstructionNode::Var { opcode, index })
    }

    fn visit_type_insn(&mut self, opcode: u8, class_name: &str) -> Result<(), CompileError> {
        let opcode = mnemonic(opcode)?;
        let signature = self.class_token(class_name)?;
        self.push(InstructionNode::Type { opcode, signature })
    }

    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), CompileError> {
        let opcode = mnemonic(opcode)?;
        let owner = self.class_token(owner)?;
        let signature = self.type_token(descriptor)?;
        self.push(InstructionNode::Field {
            opcode,
            owner,
            name: name.to_string(),
            signature,
        })
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), CompileError> {
        let opcode = mnemonic(opcode)?;
        let owner = self.class_token(owner)?;
        let signature = self.call_signature(descriptor)?;
        self.push(InstructionNode::Method {
            opcode,
            owner,
            name: name.to_string(),
            signature,
            interface: is_interface,
        })
    }

    fn visit_jump_insn(&mut self, opcode: u8, target: Label) -> Result<(), CompileError> {
        let opcode = mnemonic(opcode)?;
        self.push(InstructionNode::Jump {
            opcode,
            name: target.name(),
        })
    }

    fn visit_ldc_insn(&mut self, index: u16, constant: LoadableConstant) -> Result<(), CompileError> {
        let value = match constant {
            LoadableConstant::String(value) => LdcValue::String(value),
            LoadableConstant::Integer(value) => LdcValue::Numeric(NumericConstant::Int(value)),
            LoadableConstant::Float(value) => LdcValue::Numeric(NumericConstant::Float(value)),
            LoadableConstant::Long(value) => LdcValue::Numeric(NumericConstant::Long(value)),
            LoadableConstant::Double(value) => LdcValue::Numeric(NumericConstant::Double(value)),
            LoadableConstant::Class(name) if name.starts_with('[') => {
                return Err(CompileError::unsupported(format!(
                    "class literal of array type {name}"
                )));
            }
            LoadableConstant::Class(name) => {
                self.references.add(&name);
                LdcValue::Class(self.naming.strip(&name))
            }
            LoadableConstant::Other(kind) => {
                return Err(CompileError::UnsupportedConstant { kind, index });
            }
        };
        self.push(InstructionNode::Ldc { value })
    }

    fn visit_iinc_insn(&mut self, index: u16, increment: i16) -> Result<(), CompileError> {
        self.push(InstructionNode::Iinc {
            index,
            by: increment,
        })
    }

    fn visit_table_switch_insn(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), CompileError> {
        self.push(InstructionNode::TableSwitch {
            min: low,
            max: high,
            default: default.name(),
            jumps: targets.iter().map(|label| label.name()).collect(),
        })
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        targets: &[Label],
    ) -> Result<(), CompileError> {
        self.push(InstructionNode::LookupSwitch {
            default: default.name(),
            keys: keys.to_vec(),
            jumps: targets.iter().map(|label| label.name()).collect(),
        })
    }

    fn visit_multi_anew_array_insn(&mut self, descriptor: &str, dimensions: u8) -> Result<(), CompileError> {
        let desc = self.type_token(descriptor)?;
        self.push(InstructionNode::MultiANewArray {
            desc,
            size: dimensions,
        })
    }

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), CompileError> {
        let signature = self.type_token(descriptor)?;
        self.push(InstructionNode::Declare {
            name: name.to_string(),
            signature,
            index,
            start: start.name(),
            end: end.name(),
        })
    }

    fn visit_end(&mut self) -> Result<(), CompileError> {
        self.push(InstructionNode::End)
    }
}
