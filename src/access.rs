use serde::Serialize;

use crate::error::CompileError;

/// Symbolic access flag as understood by the browser runtime.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum AccessFlag {
    Public,
    Private,
    Protected,
    Static,
    Final,
    Synchronized,
    Volatile,
    Bridge,
    Transient,
    Varargs,
    Native,
    Abstract,
    Strict,
    Synthetic,
    Enum,
    Mandated,
}

impl AccessFlag {
    pub(crate) fn bits(self) -> u32 {
        match self {
            AccessFlag::Public => 0x0001,
            AccessFlag::Private => 0x0002,
            AccessFlag::Protected => 0x0004,
            AccessFlag::Static => 0x0008,
            AccessFlag::Final => 0x0010,
            AccessFlag::Synchronized => 0x0020,
            AccessFlag::Volatile | AccessFlag::Bridge => 0x0040,
            AccessFlag::Transient | AccessFlag::Varargs => 0x0080,
            AccessFlag::Native => 0x0100,
            AccessFlag::Abstract => 0x0400,
            AccessFlag::Strict => 0x0800,
            AccessFlag::Synthetic => 0x1000,
            AccessFlag::Enum => 0x4000,
            AccessFlag::Mandated => 0x8000,
        }
    }
}

/// Where a flag word was found; the same bit means different things per site.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum AccessContext {
    Field,
    Method,
    Parameter,
}

const FIELD_FLAGS: &[AccessFlag] = &[
    AccessFlag::Public,
    AccessFlag::Private,
    AccessFlag::Protected,
    AccessFlag::Static,
    AccessFlag::Final,
    AccessFlag::Volatile,
    AccessFlag::Transient,
    AccessFlag::Synthetic,
    AccessFlag::Enum,
];

const METHOD_FLAGS: &[AccessFlag] = &[
    AccessFlag::Public,
    AccessFlag::Private,
    AccessFlag::Protected,
    AccessFlag::Static,
    AccessFlag::Final,
    AccessFlag::Synchronized,
    AccessFlag::Bridge,
    AccessFlag::Varargs,
    AccessFlag::Native,
    AccessFlag::Abstract,
    AccessFlag::Strict,
    AccessFlag::Synthetic,
];

const PARAMETER_FLAGS: &[AccessFlag] = &[
    AccessFlag::Final,
    AccessFlag::Synthetic,
    AccessFlag::Mandated,
];

impl AccessContext {
    fn table(self) -> &'static [AccessFlag] {
        match self {
            AccessContext::Field => FIELD_FLAGS,
            AccessContext::Method => METHOD_FLAGS,
            AccessContext::Parameter => PARAMETER_FLAGS,
        }
    }

    fn label(self) -> &'static str {
        match self {
            AccessContext::Field => "field",
            AccessContext::Method => "method",
            AccessContext::Parameter => "parameter",
        }
    }
}

/// Split a flag word into known flags, failing if any bit is left over.
pub(crate) fn decompose(flags: u32, context: AccessContext) -> Result<Vec<AccessFlag>, CompileError> {
    let mut remaining = flags;
    let mut decomposed = Vec::new();
    for flag in context.table() {
        if remaining & flag.bits() != 0 {
            remaining &= !flag.bits();
            decomposed.push(*flag);
        }
    }
    if remaining != 0 {
        return Err(CompileError::CorruptAccessFlags {
            flags,
            leftover: remaining,
            context: context.label(),
        });
    }
    Ok(decomposed)
}

pub(crate) fn is_native(flags: u16) -> bool {
    u32::from(flags) & AccessFlag::Native.bits() != 0
}
