use std::str::FromStr;

use jdescriptor::{MethodDescriptor, TypeDescriptor};
use serde::Serialize;

use crate::error::CompileError;

/// Semantic type decoded from a JVM descriptor.
///
/// Array depth is carried by nesting `ArrayOf`, so `[[I` is
/// `ArrayOf(ArrayOf(Int))`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum TypeToken {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
    ObjectRef(String),
    ArrayOf(Box<TypeToken>),
}

impl TypeToken {
    /// Class name of the innermost element type, if it is an object type.
    pub(crate) fn element_class(&self) -> Option<&str> {
        match self {
            TypeToken::ObjectRef(name) => Some(name),
            TypeToken::ArrayOf(element) => element.element_class(),
            _ => None,
        }
    }

    /// Rewrite every embedded class name.
    pub(crate) fn map_class_names(self, rename: &impl Fn(&str) -> String) -> TypeToken {
        match self {
            TypeToken::ObjectRef(name) => TypeToken::ObjectRef(rename(&name)),
            TypeToken::ArrayOf(element) => {
                TypeToken::ArrayOf(Box::new(element.map_class_names(rename)))
            }
            primitive => primitive,
        }
    }
}

/// Argument and return types of a method descriptor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub(crate) struct MethodSignature {
    #[serde(rename = "return")]
    pub(crate) return_type: TypeToken,
    pub(crate) args: Vec<TypeToken>,
}

impl MethodSignature {
    pub(crate) fn map_class_names(self, rename: &impl Fn(&str) -> String) -> MethodSignature {
        MethodSignature {
            return_type: self.return_type.map_class_names(rename),
            args: self
                .args
                .into_iter()
                .map(|arg| arg.map_class_names(rename))
                .collect(),
        }
    }
}

/// Decode exactly one field descriptor, reporting any object class it names.
pub(crate) fn decode_type(
    descriptor: &str,
    referencer: &mut impl FnMut(&str),
) -> Result<TypeToken, CompileError> {
    if descriptor == "V" {
        return Ok(TypeToken::Void);
    }
    let span = type_span(descriptor)
        .map_err(|reason| CompileError::malformed_descriptor(descriptor, reason))?;
    if span != descriptor.len() {
        return Err(CompileError::malformed_descriptor(
            descriptor,
            "trailing characters after type",
        ));
    }
    let parsed = TypeDescriptor::from_str(descriptor)
        .map_err(|_| CompileError::malformed_descriptor(descriptor, "invalid field descriptor"))?;
    let token = token_from(&parsed, descriptor)?;
    if let Some(class_name) = token.element_class() {
        referencer(class_name);
    }
    Ok(token)
}

/// Decode an internal class name as found in `CONSTANT_Class` entries.
///
/// Array classes are stored in descriptor form (`[Ljava/lang/String;`), plain
/// classes as bare internal names (`java/lang/String`).
pub(crate) fn decode_internal_name(
    name: &str,
    referencer: &mut impl FnMut(&str),
) -> Result<TypeToken, CompileError> {
    if name.starts_with('[') {
        return decode_type(name, referencer);
    }
    if name.is_empty() || name.contains(';') {
        return Err(CompileError::malformed_descriptor(
            name,
            "invalid internal class name",
        ));
    }
    referencer(name);
    Ok(TypeToken::ObjectRef(name.to_string()))
}

/// Split `(args)ret` into the raw argument block and the raw return type.
pub(crate) fn split_method_descriptor(descriptor: &str) -> Result<(&str, &str), CompileError> {
    let inner = descriptor.strip_prefix('(').ok_or_else(|| {
        CompileError::malformed_descriptor(descriptor, "missing opening parenthesis")
    })?;
    let close = inner.find(')').ok_or_else(|| {
        CompileError::malformed_descriptor(descriptor, "missing closing parenthesis")
    })?;
    let return_raw = &inner[close + 1..];
    if return_raw.is_empty() {
        return Err(CompileError::malformed_descriptor(
            descriptor,
            "missing return type",
        ));
    }
    Ok((&inner[..close], return_raw))
}

/// Split an argument block into one raw descriptor per argument.
pub(crate) fn split_arguments(args_raw: &str) -> Result<Vec<&str>, CompileError> {
    let mut arguments = Vec::new();
    let mut rest = args_raw;
    while !rest.is_empty() {
        let span = type_span(rest)
            .map_err(|_| CompileError::malformed_descriptor(args_raw, "invalid argument type"))?;
        if &rest[..span] == "V" {
            return Err(CompileError::malformed_descriptor(
                args_raw,
                "void is not a valid argument type",
            ));
        }
        arguments.push(&rest[..span]);
        rest = &rest[span..];
    }
    Ok(arguments)
}

/// Parse a full method descriptor into its signature.
pub(crate) fn parse_method_signature(
    descriptor: &str,
    referencer: &mut impl FnMut(&str),
) -> Result<MethodSignature, CompileError> {
    let (args_raw, return_raw) = split_method_descriptor(descriptor)?;
    let raw_args = split_arguments(args_raw)?;
    if return_raw != "V" {
        let span = type_span(return_raw)
            .map_err(|_| CompileError::malformed_descriptor(descriptor, "invalid return type"))?;
        if span != return_raw.len() {
            return Err(CompileError::malformed_descriptor(
                descriptor,
                "invalid return type",
            ));
        }
    }
    let parsed = MethodDescriptor::from_str(descriptor)
        .map_err(|_| CompileError::malformed_descriptor(descriptor, "invalid method descriptor"))?;
    let parameter_types = parsed.parameter_types();
    if parameter_types.len() != raw_args.len() {
        return Err(CompileError::malformed_descriptor(
            descriptor,
            "argument count mismatch",
        ));
    }

    let mut args = Vec::with_capacity(raw_args.len());
    for (parameter, raw) in parameter_types.iter().zip(raw_args) {
        let token = token_from(parameter, raw)?;
        if let Some(class_name) = token.element_class() {
            referencer(class_name);
        }
        args.push(token);
    }
    let return_type = token_from(parsed.return_type(), return_raw)?;
    if let Some(class_name) = return_type.element_class() {
        referencer(class_name);
    }
    Ok(MethodSignature { return_type, args })
}

/// Map a parsed descriptor onto a token; `raw` is its source text.
fn token_from(parsed: &TypeDescriptor, raw: &str) -> Result<TypeToken, CompileError> {
    match parsed {
        TypeDescriptor::Object(class_name) => Ok(TypeToken::ObjectRef(class_name.to_string())),
        TypeDescriptor::Array(element, dimensions) => {
            let mut token = token_from(element, raw.trim_start_matches('['))?;
            for _ in 0..*dimensions {
                token = TypeToken::ArrayOf(Box::new(token));
            }
            Ok(token)
        }
        _ => primitive(raw),
    }
}

fn primitive(raw: &str) -> Result<TypeToken, CompileError> {
    let token = match raw {
        "Z" => TypeToken::Boolean,
        "B" => TypeToken::Byte,
        "C" => TypeToken::Char,
        "S" => TypeToken::Short,
        "I" => TypeToken::Int,
        "J" => TypeToken::Long,
        "F" => TypeToken::Float,
        "D" => TypeToken::Double,
        "V" => TypeToken::Void,
        _ => {
            return Err(CompileError::malformed_descriptor(raw, "unknown type tag"));
        }
    };
    Ok(token)
}

/// Byte length of the leading field type of `descriptor`.
fn type_span(descriptor: &str) -> Result<usize, &'static str> {
    let bytes = descriptor.as_bytes();
    let dimensions = bytes.iter().take_while(|byte| **byte == b'[').count();
    match bytes.get(dimensions) {
        None if dimensions == 0 => Err("empty descriptor"),
        None => Err("array without element type"),
        Some(b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D') => Ok(dimensions + 1),
        Some(b'V') if dimensions == 0 => Ok(1),
        Some(b'V') => Err("array of void"),
        Some(b'L') => match descriptor[dimensions + 1..].find(';') {
            None => Err("unterminated class reference"),
            Some(0) => Err("empty class name"),
            Some(semicolon) => Ok(dimensions + semicolon + 2),
        },
        Some(_) => Err("unknown type tag"),
    }
}
