use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors raised while translating classfiles.
///
/// Every variant aborts the current compile run. The driver attaches the name
/// of the class being compiled as `anyhow` context, so the variants only carry
/// what is known at the point of failure.
#[derive(Error, Debug)]
pub(crate) enum CompileError {
    /// The class is neither a built-in nor present on the classpath.
    #[error("no implementation found for class {class}")]
    ClassNotFound { class: String },

    /// A field or method descriptor does not follow the JVM grammar.
    #[error("malformed descriptor {descriptor:?}: {reason}")]
    MalformedDescriptor {
        descriptor: String,
        reason: &'static str,
    },

    /// An instruction or constant sort that has no IR counterpart.
    #[error("unsupported construct: {construct}")]
    UnsupportedConstruct { construct: String },

    /// A constant pool operand of a kind that `ldc` cannot translate.
    #[error("unsupported constant of kind {kind} at constant pool index {index}")]
    UnsupportedConstant { kind: &'static str, index: u16 },

    /// Access bits left over after subtracting every known flag.
    #[error("unknown access flag bits 0x{leftover:04x} in 0x{flags:04x} ({context})")]
    CorruptAccessFlags {
        flags: u32,
        leftover: u32,
        context: &'static str,
    },

    /// The classfile bytes could not be decoded.
    #[error("malformed class file: {reason}")]
    MalformedClassFile { reason: String },

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub(crate) fn malformed_descriptor(descriptor: &str, reason: &'static str) -> Self {
        CompileError::MalformedDescriptor {
            descriptor: descriptor.to_string(),
            reason,
        }
    }

    pub(crate) fn malformed_class(reason: impl Into<String>) -> Self {
        CompileError::MalformedClassFile {
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(construct: impl Into<String>) -> Self {
        CompileError::UnsupportedConstruct {
            construct: construct.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CompileError::Io {
            path: path.into(),
            source,
        }
    }
}
