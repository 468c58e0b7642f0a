use std::collections::BTreeSet;

use serde::{Serialize, Serializer};

use crate::access::AccessFlag;
use crate::descriptor::{MethodSignature, TypeToken};
use crate::naming::{RuntimeNaming, mangle};

/// Translated form of one class, ready to be rendered for the runtime.
///
/// Structural names (`name`, `super_name`, `interfaces`, `references`) keep
/// the raw classfile spelling so the driver can resolve them; they are
/// stripped of the runtime prefix when rendered. Names embedded in members
/// and instruction nodes are stripped at translation time.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ClassUnit {
    pub(crate) name: String,
    pub(crate) super_name: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) fields: Vec<FieldUnit>,
    pub(crate) methods: Vec<MethodUnit>,
    /// Every class this one mentions, first occurrence first, never itself.
    pub(crate) references: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct FieldUnit {
    pub(crate) name: String,
    pub(crate) signature: TypeToken,
    #[serde(flatten)]
    pub(crate) constant: Option<ConstantInit>,
    pub(crate) access: Vec<AccessFlag>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct MethodUnit {
    pub(crate) name: String,
    /// Raw descriptor with the runtime prefix stripped.
    #[serde(rename = "signature")]
    pub(crate) descriptor: String,
    #[serde(rename = "sigparts")]
    pub(crate) signature: MethodSignature,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) exceptions: Vec<String>,
    pub(crate) implementation: Implementation,
    pub(crate) access: Vec<AccessFlag>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum Implementation {
    /// Path of the side file that implements the method in JavaScript.
    Native(String),
    Instructions(Vec<InstructionNode>),
}

/// Initial value of a static final field.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) enum ConstantInit {
    #[serde(rename = "stringValue")]
    String(String),
    #[serde(rename = "numericValue")]
    Numeric(NumericConstant),
}

/// Numeric literal; non-finite floats render as `"NaN"`, `"Infinity"` or
/// `"-Infinity"` since JSON has no spelling for them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum NumericConstant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Serialize for NumericConstant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            NumericConstant::Int(value) => serializer.serialize_i32(value),
            NumericConstant::Long(value) => serializer.serialize_i64(value),
            NumericConstant::Float(value) if value.is_finite() => serializer.serialize_f32(value),
            NumericConstant::Float(value) => serializer.serialize_str(non_finite(f64::from(value))),
            NumericConstant::Double(value) if value.is_finite() => serializer.serialize_f64(value),
            NumericConstant::Double(value) => serializer.serialize_str(non_finite(value)),
        }
    }
}

fn non_finite(value: f64) -> &'static str {
    if value.is_nan() {
        "NaN"
    } else if value > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

/// Operand of an `ldc` node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) enum LdcValue {
    #[serde(rename = "stringValue")]
    String(String),
    #[serde(rename = "numericValue")]
    Numeric(NumericConstant),
    /// Class literal.
    #[serde(rename = "objectRef")]
    Class(String),
}

/// Method descriptor as both raw text and decoded parts.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct CallSignature {
    pub(crate) raw: String,
    #[serde(flatten)]
    pub(crate) parts: MethodSignature,
}

/// One event of a method body, in bytecode order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum InstructionNode {
    Arg {
        name: Option<String>,
        access: Vec<AccessFlag>,
    },
    Try {
        start: String,
        end: String,
        handler: String,
        #[serde(rename = "catch")]
        catch_type: Option<String>,
    },
    Label {
        name: String,
    },
    Insn {
        opcode: &'static str,
    },
    Int {
        opcode: &'static str,
        operand: i32,
    },
    Var {
        opcode: &'static str,
        index: u16,
    },
    Type {
        opcode: &'static str,
        signature: TypeToken,
    },
    Field {
        opcode: &'static str,
        #[serde(rename = "class")]
        owner: TypeToken,
        name: String,
        signature: TypeToken,
    },
    Method {
        opcode: &'static str,
        owner: TypeToken,
        name: String,
        signature: CallSignature,
        interface: bool,
    },
    Jump {
        opcode: &'static str,
        name: String,
    },
    Ldc {
        #[serde(flatten)]
        value: LdcValue,
    },
    Iinc {
        index: u16,
        by: i16,
    },
    TableSwitch {
        min: i32,
        max: i32,
        default: String,
        jumps: Vec<String>,
    },
    #[serde(rename = "switch")]
    LookupSwitch {
        default: String,
        keys: Vec<i32>,
        jumps: Vec<String>,
    },
    #[serde(rename = "array")]
    MultiANewArray {
        desc: TypeToken,
        size: u8,
    },
    Declare {
        name: String,
        signature: TypeToken,
        index: u16,
        start: String,
        end: String,
    },
    End,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Member<'a> {
    Field(&'a FieldUnit),
    Method(&'a MethodUnit),
    References { value: Vec<String> },
}

impl ClassUnit {
    /// Referenced classes under their runtime names, deduplicated.
    pub(crate) fn runtime_references(&self, naming: &RuntimeNaming) -> Vec<String> {
        let own_name = naming.strip(&self.name);
        let mut seen = BTreeSet::new();
        let mut references = Vec::new();
        for reference in &self.references {
            let runtime = naming.strip(reference);
            if runtime != own_name && seen.insert(runtime.clone()) {
                references.push(runtime);
            }
        }
        references
    }
}

/// Render the JavaScript module that registers `unit` with the class loader.
pub(crate) fn render_unit(unit: &ClassUnit, naming: &RuntimeNaming) -> serde_json::Result<String> {
    let name = naming.strip(&unit.name);
    let interfaces: Vec<String> = unit
        .interfaces
        .iter()
        .map(|interface| naming.strip(interface))
        .collect();
    let parent = unit.super_name.as_deref().map(|parent| naming.strip(parent));

    let mut members: Vec<Member<'_>> = Vec::with_capacity(unit.fields.len() + unit.methods.len() + 1);
    members.extend(unit.fields.iter().map(Member::Field));
    members.extend(unit.methods.iter().map(Member::Method));
    members.push(Member::References {
        value: unit.runtime_references(naming),
    });

    Ok(format!(
        "(function JVM_{function}($JVM, JVM){{\n\t$JVM.ClassLoader.defineClass({name}, {interfaces}, {parent}, {members});\n}})($currentJVM, JVM);\n",
        function = mangle(&name),
        name = serde_json::to_string(&name)?,
        interfaces = serde_json::to_string(&interfaces)?,
        parent = serde_json::to_string(&parent)?,
        members = serde_json::to_string_pretty(&members)?,
    ))
}
