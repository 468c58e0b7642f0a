//! Classfile builder for tests.

use std::fs;
use std::path::{Path, PathBuf};

/// Assembles minimal but valid classfiles (version 52).
pub(crate) struct ClassFileBuilder {
    cp: Vec<CpEntry>,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
    source_file: Option<String>,
}

/// Method definition for generated class files.
pub(crate) struct MethodSpec {
    pub(crate) access: u16,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) code: Option<CodeSpec>,
    pub(crate) exceptions: Vec<String>,
    pub(crate) parameters: Vec<(Option<String>, u16)>,
}

impl MethodSpec {
    pub(crate) fn new(access: u16, name: &str, descriptor: &str, code: Option<CodeSpec>) -> Self {
        Self {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code,
            exceptions: Vec::new(),
            parameters: Vec::new(),
        }
    }
}

pub(crate) struct CodeSpec {
    pub(crate) max_stack: u16,
    pub(crate) max_locals: u16,
    pub(crate) code: Vec<u8>,
    /// `(start, end, handler, catch type)`
    pub(crate) exception_table: Vec<(u16, u16, u16, Option<String>)>,
    /// `(start, length, name, descriptor, slot)`
    pub(crate) local_variables: Vec<(u16, u16, String, String, u16)>,
}

impl CodeSpec {
    pub(crate) fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        Self {
            max_stack,
            max_locals,
            code,
            exception_table: Vec::new(),
            local_variables: Vec::new(),
        }
    }
}

struct FieldSpec {
    access: u16,
    name: String,
    descriptor: String,
    constant_value: Option<u16>,
}

/// Constant pool entries needed by generated class files.
enum CpEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodType(u16),
    /// Second slot of a long or double.
    Gap,
}

impl CpEntry {
    fn write(&self, bytes: &mut Vec<u8>) {
        match self {
            CpEntry::Utf8(value) => {
                bytes.push(1);
                write_u16(bytes, value.len() as u16);
                bytes.extend_from_slice(value.as_bytes());
            }
            CpEntry::Integer(value) => {
                bytes.push(3);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            CpEntry::Float(value) => {
                bytes.push(4);
                write_u32(bytes, value.to_bits());
            }
            CpEntry::Long(value) => {
                bytes.push(5);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            CpEntry::Double(value) => {
                bytes.push(6);
                bytes.extend_from_slice(&value.to_bits().to_be_bytes());
            }
            CpEntry::Class(name_index) => {
                bytes.push(7);
                write_u16(bytes, *name_index);
            }
            CpEntry::String(string_index) => {
                bytes.push(8);
                write_u16(bytes, *string_index);
            }
            CpEntry::FieldRef(class_index, name_and_type) => {
                bytes.push(9);
                write_u16(bytes, *class_index);
                write_u16(bytes, *name_and_type);
            }
            CpEntry::MethodRef(class_index, name_and_type) => {
                bytes.push(10);
                write_u16(bytes, *class_index);
                write_u16(bytes, *name_and_type);
            }
            CpEntry::InterfaceMethodRef(class_index, name_and_type) => {
                bytes.push(11);
                write_u16(bytes, *class_index);
                write_u16(bytes, *name_and_type);
            }
            CpEntry::NameAndType(name_index, descriptor_index) => {
                bytes.push(12);
                write_u16(bytes, *name_index);
                write_u16(bytes, *descriptor_index);
            }
            CpEntry::MethodType(descriptor_index) => {
                bytes.push(16);
                write_u16(bytes, *descriptor_index);
            }
            CpEntry::Gap => {}
        }
    }
}

impl ClassFileBuilder {
    pub(crate) fn new(class_name: &str, super_name: Option<&str>) -> Self {
        let mut builder = Self {
            cp: Vec::new(),
            access_flags: 0x0021,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
        };
        builder.this_class = builder.add_class(class_name);
        if let Some(super_name) = super_name {
            builder.super_class = builder.add_class(super_name);
        }
        builder
    }

    fn push(&mut self, entry: CpEntry) -> u16 {
        self.cp.push(entry);
        self.cp.len() as u16
    }

    pub(crate) fn add_utf8(&mut self, value: &str) -> u16 {
        self.push(CpEntry::Utf8(value.to_string()))
    }

    pub(crate) fn add_class(&mut self, name: &str) -> u16 {
        let name_index = self.add_utf8(name);
        self.push(CpEntry::Class(name_index))
    }

    pub(crate) fn add_string(&mut self, value: &str) -> u16 {
        let string_index = self.add_utf8(value);
        self.push(CpEntry::String(string_index))
    }

    pub(crate) fn add_integer(&mut self, value: i32) -> u16 {
        self.push(CpEntry::Integer(value))
    }

    pub(crate) fn add_float(&mut self, value: f32) -> u16 {
        self.push(CpEntry::Float(value))
    }

    pub(crate) fn add_long(&mut self, value: i64) -> u16 {
        let index = self.push(CpEntry::Long(value));
        self.push(CpEntry::Gap);
        index
    }

    pub(crate) fn add_double(&mut self, value: f64) -> u16 {
        let index = self.push(CpEntry::Double(value));
        self.push(CpEntry::Gap);
        index
    }

    pub(crate) fn add_method_type(&mut self, descriptor: &str) -> u16 {
        let descriptor_index = self.add_utf8(descriptor);
        self.push(CpEntry::MethodType(descriptor_index))
    }

    fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.push(CpEntry::NameAndType(name_index, descriptor_index))
    }

    pub(crate) fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class);
        let name_and_type = self.add_name_and_type(name, descriptor);
        self.push(CpEntry::FieldRef(class_index, name_and_type))
    }

    pub(crate) fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class);
        let name_and_type = self.add_name_and_type(name, descriptor);
        self.push(CpEntry::MethodRef(class_index, name_and_type))
    }

    pub(crate) fn add_interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> u16 {
        let class_index = self.add_class(class);
        let name_and_type = self.add_name_and_type(name, descriptor);
        self.push(CpEntry::InterfaceMethodRef(class_index, name_and_type))
    }

    pub(crate) fn add_interface(&mut self, name: &str) {
        let index = self.add_class(name);
        self.interfaces.push(index);
    }

    pub(crate) fn add_field(
        &mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        constant_value: Option<u16>,
    ) {
        self.fields.push(FieldSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            constant_value,
        });
    }

    pub(crate) fn add_method(&mut self, method: MethodSpec) {
        self.methods.push(method);
    }

    pub(crate) fn set_source_file(&mut self, name: &str) {
        self.source_file = Some(name.to_string());
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        let mut body = Vec::new();
        write_u16(&mut body, self.access_flags);
        write_u16(&mut body, self.this_class);
        write_u16(&mut body, self.super_class);
        write_u16(&mut body, self.interfaces.len() as u16);
        for index in self.interfaces.clone() {
            write_u16(&mut body, index);
        }

        let fields = std::mem::take(&mut self.fields);
        write_u16(&mut body, fields.len() as u16);
        for field in &fields {
            let name_index = self.add_utf8(&field.name);
            let descriptor_index = self.add_utf8(&field.descriptor);
            write_u16(&mut body, field.access);
            write_u16(&mut body, name_index);
            write_u16(&mut body, descriptor_index);
            match field.constant_value {
                Some(value_index) => {
                    write_u16(&mut body, 1);
                    let attribute = self.add_utf8("ConstantValue");
                    write_u16(&mut body, attribute);
                    write_u32(&mut body, 2);
                    write_u16(&mut body, value_index);
                }
                None => write_u16(&mut body, 0),
            }
        }

        let methods = std::mem::take(&mut self.methods);
        write_u16(&mut body, methods.len() as u16);
        for method in &methods {
            let name_index = self.add_utf8(&method.name);
            let descriptor_index = self.add_utf8(&method.descriptor);
            write_u16(&mut body, method.access);
            write_u16(&mut body, name_index);
            write_u16(&mut body, descriptor_index);
            let mut attributes = Vec::new();
            if let Some(code) = &method.code {
                attributes.push(self.code_attribute(code));
            }
            if !method.exceptions.is_empty() {
                let name = self.add_utf8("Exceptions");
                let mut data = Vec::new();
                write_u16(&mut data, method.exceptions.len() as u16);
                for exception in &method.exceptions {
                    let index = self.add_class(exception);
                    write_u16(&mut data, index);
                }
                attributes.push((name, data));
            }
            if !method.parameters.is_empty() {
                let name = self.add_utf8("MethodParameters");
                let mut data = vec![method.parameters.len() as u8];
                for (parameter, access) in &method.parameters {
                    let index = match parameter {
                        Some(parameter) => self.add_utf8(parameter),
                        None => 0,
                    };
                    write_u16(&mut data, index);
                    write_u16(&mut data, *access);
                }
                attributes.push((name, data));
            }
            write_attributes(&mut body, &attributes);
        }

        let mut class_attributes = Vec::new();
        if let Some(source_file) = self.source_file.clone() {
            let name = self.add_utf8("SourceFile");
            let value = self.add_utf8(&source_file);
            class_attributes.push((name, value.to_be_bytes().to_vec()));
        }
        write_attributes(&mut body, &class_attributes);

        let mut bytes = Vec::new();
        write_u32(&mut bytes, 0xCAFEBABE);
        write_u16(&mut bytes, 0);
        write_u16(&mut bytes, 52);
        write_u16(&mut bytes, (self.cp.len() + 1) as u16);
        for entry in &self.cp {
            entry.write(&mut bytes);
        }
        bytes.extend_from_slice(&body);
        bytes
    }

    fn code_attribute(&mut self, code: &CodeSpec) -> (u16, Vec<u8>) {
        let name = self.add_utf8("Code");
        let mut data = Vec::new();
        write_u16(&mut data, code.max_stack);
        write_u16(&mut data, code.max_locals);
        write_u32(&mut data, code.code.len() as u32);
        data.extend_from_slice(&code.code);
        write_u16(&mut data, code.exception_table.len() as u16);
        for (start, end, handler, catch_type) in &code.exception_table {
            write_u16(&mut data, *start);
            write_u16(&mut data, *end);
            write_u16(&mut data, *handler);
            let catch_index = match catch_type {
                Some(catch_type) => self.add_class(catch_type),
                None => 0,
            };
            write_u16(&mut data, catch_index);
        }
        let mut attributes = Vec::new();
        if !code.local_variables.is_empty() {
            let table_name = self.add_utf8("LocalVariableTable");
            let mut table = Vec::new();
            write_u16(&mut table, code.local_variables.len() as u16);
            for (start, length, variable, descriptor, slot) in &code.local_variables {
                let variable_index = self.add_utf8(variable);
                let descriptor_index = self.add_utf8(descriptor);
                write_u16(&mut table, *start);
                write_u16(&mut table, *length);
                write_u16(&mut table, variable_index);
                write_u16(&mut table, descriptor_index);
                write_u16(&mut table, *slot);
            }
            attributes.push((table_name, table));
        }
        // Unparsed attributes must be skipped by the reader.
        let line_numbers = self.add_utf8("LineNumberTable");
        let mut lines = Vec::new();
        write_u16(&mut lines, 1);
        write_u16(&mut lines, 0);
        write_u16(&mut lines, 1);
        attributes.push((line_numbers, lines));
        write_attributes(&mut data, &attributes);
        (name, data)
    }
}

fn write_attributes(bytes: &mut Vec<u8>, attributes: &[(u16, Vec<u8>)]) {
    write_u16(bytes, attributes.len() as u16);
    for (name, data) in attributes {
        write_u16(bytes, *name);
        write_u32(bytes, data.len() as u32);
        bytes.extend_from_slice(data);
    }
}

fn write_u16(bytes: &mut Vec<u8>, value: u16) {
    bytes.extend_from_slice(&value.to_be_bytes());
}

fn write_u32(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn high(value: u16) -> u8 {
    (value >> 8) as u8
}

pub(crate) fn low(value: u16) -> u8 {
    (value & 0xff) as u8
}

/// Write `contents` at `root/relative`, creating parent directories.
pub(crate) fn write_file(root: &Path, relative: &str, contents: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(&path, contents).expect("write file");
    path
}

/// Class whose only references are the types of its instance fields.
pub(crate) fn class_with_field_types(name: &str, super_name: &str, field_types: &[&str]) -> Vec<u8> {
    let mut builder = ClassFileBuilder::new(name, Some(super_name));
    for (index, field_type) in field_types.iter().enumerate() {
        builder.add_field(0x0002, &format!("f{index}"), &format!("L{field_type};"), None);
    }
    builder.finish()
}
