use std::collections::BTreeSet;

use tracing::debug;

use crate::access::{AccessContext, decompose, is_native};
use crate::bytecode::walk_method;
use crate::classfile::{ClassFile, ConstantPool, FieldInfo, LoadableConstant, MethodInfo};
use crate::descriptor::{decode_type, parse_method_signature};
use crate::error::CompileError;
use crate::ir::{ClassUnit, ConstantInit, FieldUnit, Implementation, MethodUnit, NumericConstant};
use crate::naming::RuntimeNaming;
use crate::translate::InstructionTranslator;

/// Classes mentioned by one class, in first-seen order.
///
/// Names are compared under their runtime form, so a replacement platform
/// class and the plain name it stands for count as the same class.
#[derive(Debug)]
pub(crate) struct References {
    naming: RuntimeNaming,
    owner: String,
    names: Vec<String>,
    seen: BTreeSet<String>,
}

impl References {
    /// Collector for `owner`, which is never recorded as its own reference.
    pub(crate) fn new(owner: &str, naming: &RuntimeNaming) -> Self {
        Self {
            naming: naming.clone(),
            owner: naming.strip(owner),
            names: Vec::new(),
            seen: BTreeSet::new(),
        }
    }

    /// Record `name` unless it is the owner or already present.
    pub(crate) fn add(&mut self, name: &str) {
        let runtime = self.naming.strip(name);
        if runtime == self.owner || !self.seen.insert(runtime) {
            return;
        }
        self.names.push(name.to_string());
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        self.names
    }
}

/// Translate a decoded classfile into its IR unit.
pub(crate) fn translate_class(
    class: &ClassFile,
    naming: &RuntimeNaming,
) -> Result<ClassUnit, CompileError> {
    let mut references = References::new(&class.name, naming);
    for interface in &class.interfaces {
        references.add(interface);
    }
    if let Some(super_name) = &class.super_name {
        references.add(super_name);
    }

    let runtime_name = naming.strip(&class.name);
    let mut fields = Vec::with_capacity(class.fields.len());
    for field in &class.fields {
        fields.push(translate_field(
            field,
            &class.constant_pool,
            naming,
            &mut references,
        )?);
    }
    let mut methods = Vec::with_capacity(class.methods.len());
    for method in &class.methods {
        let unit = translate_method(
            method,
            &class.constant_pool,
            naming,
            &runtime_name,
            &mut references,
        )
        .map_err(|error| {
            debug!(method = %method.name, descriptor = %method.descriptor, "method translation failed");
            error
        })?;
        methods.push(unit);
    }

    Ok(ClassUnit {
        name: class.name.clone(),
        super_name: class.super_name.clone(),
        interfaces: class.interfaces.clone(),
        fields,
        methods,
        references: references.into_vec(),
    })
}

fn translate_field(
    field: &FieldInfo,
    constant_pool: &ConstantPool,
    naming: &RuntimeNaming,
    references: &mut References,
) -> Result<FieldUnit, CompileError> {
    let signature = decode_type(&field.descriptor, &mut |name: &str| references.add(name))?
        .map_class_names(&|name: &str| naming.strip(name));
    let constant = match field.constant_value {
        Some(index) => Some(match constant_pool.loadable(index)? {
            LoadableConstant::String(value) => ConstantInit::String(value),
            LoadableConstant::Integer(value) => ConstantInit::Numeric(NumericConstant::Int(value)),
            LoadableConstant::Float(value) => ConstantInit::Numeric(NumericConstant::Float(value)),
            LoadableConstant::Long(value) => ConstantInit::Numeric(NumericConstant::Long(value)),
            LoadableConstant::Double(value) => {
                ConstantInit::Numeric(NumericConstant::Double(value))
            }
            LoadableConstant::Class(_) => {
                return Err(CompileError::UnsupportedConstant {
                    kind: "class",
                    index,
                });
            }
            LoadableConstant::Other(kind) => {
                return Err(CompileError::UnsupportedConstant { kind, index });
            }
        }),
        None => None,
    };
    Ok(FieldUnit {
        name: field.name.clone(),
        signature,
        constant,
        access: decompose(u32::from(field.access_flags), AccessContext::Field)?,
    })
}

fn translate_method(
    method: &MethodInfo,
    constant_pool: &ConstantPool,
    naming: &RuntimeNaming,
    runtime_name: &str,
    references: &mut References,
) -> Result<MethodUnit, CompileError> {
    let signature = parse_method_signature(&method.descriptor, &mut |name: &str| {
        references.add(name)
    })?
    .map_class_names(&|name: &str| naming.strip(name));
    let mut exceptions = Vec::with_capacity(method.exceptions.len());
    for exception in &method.exceptions {
        references.add(exception);
        exceptions.push(naming.strip(exception));
    }
    let access = decompose(u32::from(method.access_flags), AccessContext::Method)?;

    let implementation = if is_native(method.access_flags) {
        Implementation::Native(format!("{runtime_name}.native.js"))
    } else {
        let mut translator = InstructionTranslator::new(naming, references);
        walk_method(method, constant_pool, &mut translator)?;
        Implementation::Instructions(translator.finish())
    };

    Ok(MethodUnit {
        name: method.name.clone(),
        descriptor: naming.strip(&method.descriptor),
        signature,
        exceptions,
        implementation,
        access,
    })
}
