use jclassfile::attributes::Attribute;
use jclassfile::class_file;
use jclassfile::constant_pool::ConstantPool as PoolEntry;

use crate::error::CompileError;

/// Structural model of one decoded classfile.
#[derive(Debug)]
pub(crate) struct ClassFile {
    pub(crate) constant_pool: ConstantPool,
    pub(crate) name: String,
    pub(crate) super_name: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) fields: Vec<FieldInfo>,
    pub(crate) methods: Vec<MethodInfo>,
}

#[derive(Clone, Debug)]
pub(crate) struct FieldInfo {
    pub(crate) access_flags: u16,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    /// Constant pool index from the `ConstantValue` attribute.
    pub(crate) constant_value: Option<u16>,
}

#[derive(Clone, Debug)]
pub(crate) struct MethodInfo {
    pub(crate) access_flags: u16,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) exceptions: Vec<String>,
    pub(crate) parameters: Vec<MethodParameter>,
    pub(crate) code: Option<Code>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MethodParameter {
    pub(crate) name: Option<String>,
    pub(crate) access_flags: u16,
}

/// Body of a `Code` attribute.
#[derive(Clone, Debug)]
pub(crate) struct Code {
    pub(crate) bytecode: Vec<u8>,
    pub(crate) exception_table: Vec<ExceptionEntry>,
    pub(crate) local_variables: Vec<LocalVariable>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ExceptionEntry {
    pub(crate) start_pc: u16,
    pub(crate) end_pc: u16,
    pub(crate) handler_pc: u16,
    /// `None` for `finally` handlers that catch everything.
    pub(crate) catch_type: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct LocalVariable {
    pub(crate) start_pc: u16,
    pub(crate) length: u16,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) index: u16,
}

/// Operand of `ldc` or a `ConstantValue` attribute, resolved from the pool.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum LoadableConstant {
    String(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    /// Internal class name; array classes keep descriptor form.
    Class(String),
    /// Any other pool entry, named by its kind.
    Other(&'static str),
}

/// Field or method reference resolved from the pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct MemberRef<'a> {
    pub(crate) owner: &'a str,
    pub(crate) name: &'a str,
    pub(crate) descriptor: &'a str,
    pub(crate) is_interface: bool,
}

/// Typed lookups over the decoded constant pool.
///
/// Entries are indexed by their pool index; slot 0 and the slot after a
/// long or double are unusable.
#[derive(Default)]
pub(crate) struct ConstantPool {
    entries: Vec<PoolEntry>,
}

impl std::fmt::Debug for ConstantPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantPool")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl ConstantPool {
    fn get(&self, index: u16) -> Result<&PoolEntry, CompileError> {
        let slot = index as usize;
        let second_slot = slot
            .checked_sub(1)
            .and_then(|previous| self.entries.get(previous))
            .is_some_and(|previous| {
                matches!(previous, PoolEntry::Long { .. } | PoolEntry::Double { .. })
            });
        if slot == 0 || second_slot {
            return Err(CompileError::malformed_class(format!(
                "unusable constant pool index {index}"
            )));
        }
        self.entries.get(slot).ok_or_else(|| {
            CompileError::malformed_class(format!("invalid constant pool index {index}"))
        })
    }

    pub(crate) fn utf8(&self, index: u16) -> Result<&str, CompileError> {
        match self.get(index)? {
            PoolEntry::Utf8 { value } => Ok(value.as_str()),
            other => Err(CompileError::malformed_class(format!(
                "expected utf8 at constant pool index {index}, found {}",
                kind_name(other)
            ))),
        }
    }

    pub(crate) fn class_name(&self, index: u16) -> Result<&str, CompileError> {
        match self.get(index)? {
            PoolEntry::Class { name_index } => self.utf8(*name_index),
            other => Err(CompileError::malformed_class(format!(
                "expected class at constant pool index {index}, found {}",
                kind_name(other)
            ))),
        }
    }

    fn name_and_type(&self, index: u16) -> Result<(&str, &str), CompileError> {
        match self.get(index)? {
            PoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => Err(CompileError::malformed_class(format!(
                "expected name and type at constant pool index {index}, found {}",
                kind_name(other)
            ))),
        }
    }

    pub(crate) fn member_ref(&self, index: u16) -> Result<MemberRef<'_>, CompileError> {
        let (class_index, name_and_type_index, is_interface) = match self.get(index)? {
            PoolEntry::Fieldref {
                class_index,
                name_and_type_index,
            }
            | PoolEntry::Methodref {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, false),
            PoolEntry::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, true),
            other => {
                return Err(CompileError::malformed_class(format!(
                    "expected member reference at constant pool index {index}, found {}",
                    kind_name(other)
                )));
            }
        };
        let owner = self.class_name(class_index)?;
        let (name, descriptor) = self.name_and_type(name_and_type_index)?;
        Ok(MemberRef {
            owner,
            name,
            descriptor,
            is_interface,
        })
    }

    pub(crate) fn loadable(&self, index: u16) -> Result<LoadableConstant, CompileError> {
        let constant = match self.get(index)? {
            PoolEntry::String { string_index } => {
                LoadableConstant::String(self.utf8(*string_index)?.to_string())
            }
            PoolEntry::Integer { value } => LoadableConstant::Integer(*value),
            PoolEntry::Float { value } => LoadableConstant::Float(*value),
            PoolEntry::Long { value } => LoadableConstant::Long(*value),
            PoolEntry::Double { value } => LoadableConstant::Double(*value),
            PoolEntry::Class { name_index } => {
                LoadableConstant::Class(self.utf8(*name_index)?.to_string())
            }
            other => LoadableConstant::Other(kind_name(other)),
        };
        Ok(constant)
    }
}

fn kind_name(entry: &PoolEntry) -> &'static str {
    match entry {
        PoolEntry::Utf8 { .. } => "utf8",
        PoolEntry::Integer { .. } => "integer",
        PoolEntry::Float { .. } => "float",
        PoolEntry::Long { .. } => "long",
        PoolEntry::Double { .. } => "double",
        PoolEntry::Class { .. } => "class",
        PoolEntry::String { .. } => "string",
        PoolEntry::Fieldref { .. } => "fieldref",
        PoolEntry::Methodref { .. } => "methodref",
        PoolEntry::InterfaceMethodref { .. } => "interface methodref",
        PoolEntry::NameAndType { .. } => "name and type",
        PoolEntry::MethodHandle { .. } => "method handle",
        PoolEntry::MethodType { .. } => "method type",
        PoolEntry::Dynamic { .. } => "dynamic",
        PoolEntry::InvokeDynamic { .. } => "invokedynamic",
        _ => "unusable",
    }
}

/// Decode classfile bytes into the structural model.
pub(crate) fn parse_class_bytes(data: &[u8]) -> Result<ClassFile, CompileError> {
    let class_file = class_file::parse(data)
        .map_err(|err| CompileError::malformed_class(format!("failed to parse class file: {err}")))?;
    let constant_pool = ConstantPool {
        entries: class_file.constant_pool().to_vec(),
    };

    let name = constant_pool.class_name(class_file.this_class())?.to_string();
    let super_name = if class_file.super_class() == 0 {
        None
    } else {
        Some(constant_pool.class_name(class_file.super_class())?.to_string())
    };
    let mut interfaces = Vec::new();
    for interface in class_file.interfaces() {
        interfaces.push(constant_pool.class_name(*interface)?.to_string());
    }

    let mut fields = Vec::new();
    for field in class_file.fields() {
        fields.push(parse_field(field, &constant_pool)?);
    }
    let mut methods = Vec::new();
    for method in class_file.methods() {
        methods.push(parse_method(method, &constant_pool)?);
    }

    Ok(ClassFile {
        constant_pool,
        name,
        super_name,
        interfaces,
        fields,
        methods,
    })
}

fn parse_field(
    field: &jclassfile::fields::FieldInfo,
    constant_pool: &ConstantPool,
) -> Result<FieldInfo, CompileError> {
    let constant_value = field.attributes().iter().find_map(|attribute| match attribute {
        Attribute::ConstantValue {
            constantvalue_index,
        } => Some(*constantvalue_index),
        _ => None,
    });
    Ok(FieldInfo {
        access_flags: field.access_flags().bits(),
        name: constant_pool.utf8(field.name_index())?.to_string(),
        descriptor: constant_pool.utf8(field.descriptor_index())?.to_string(),
        constant_value,
    })
}

fn parse_method(
    method: &jclassfile::methods::MethodInfo,
    constant_pool: &ConstantPool,
) -> Result<MethodInfo, CompileError> {
    let mut exceptions = Vec::new();
    let mut parameters = Vec::new();
    let mut code = None;
    for attribute in method.attributes() {
        match attribute {
            Attribute::Code {
                code: bytecode,
                exception_table,
                attributes,
                ..
            } => code = Some(parse_code(bytecode, exception_table, attributes, constant_pool)?),
            Attribute::Exceptions {
                exception_index_table,
            } => {
                for index in exception_index_table {
                    exceptions.push(constant_pool.class_name(*index)?.to_string());
                }
            }
            Attribute::MethodParameters {
                parameters: records,
            } => {
                for record in records {
                    let name = if record.name_index() == 0 {
                        None
                    } else {
                        Some(constant_pool.utf8(record.name_index())?.to_string())
                    };
                    parameters.push(MethodParameter {
                        name,
                        access_flags: record.access_flags().bits(),
                    });
                }
            }
            _ => {}
        }
    }
    Ok(MethodInfo {
        access_flags: method.access_flags().bits(),
        name: constant_pool.utf8(method.name_index())?.to_string(),
        descriptor: constant_pool.utf8(method.descriptor_index())?.to_string(),
        exceptions,
        parameters,
        code,
    })
}

fn parse_code(
    bytecode: &[u8],
    table: &[jclassfile::attributes::ExceptionRecord],
    attributes: &[Attribute],
    constant_pool: &ConstantPool,
) -> Result<Code, CompileError> {
    let mut exception_table = Vec::new();
    for entry in table {
        let catch_type = if entry.catch_type() == 0 {
            None
        } else {
            Some(constant_pool.class_name(entry.catch_type())?.to_string())
        };
        exception_table.push(ExceptionEntry {
            start_pc: entry.start_pc(),
            end_pc: entry.end_pc(),
            handler_pc: entry.handler_pc(),
            catch_type,
        });
    }

    let mut local_variables = Vec::new();
    for attribute in attributes {
        let Attribute::LocalVariableTable {
            local_variable_table,
        } = attribute
        else {
            continue;
        };
        for record in local_variable_table {
            local_variables.push(LocalVariable {
                start_pc: record.start_pc(),
                length: record.length(),
                name: constant_pool.utf8(record.name_index())?.to_string(),
                descriptor: constant_pool.utf8(record.descriptor_index())?.to_string(),
                index: record.index(),
            });
        }
    }

    Ok(Code {
        bytecode: bytecode.to_vec(),
        exception_table,
        local_variables,
    })
}
