use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::CompileError;

/// Classes the browser runtime needs regardless of what the program uses.
pub(crate) const REQUIRED_BUILTINS: [&str; 12] = [
    "java/lang/Throwable",
    "java/lang/Exception",
    "java/lang/VirtualMachineError",
    "java/lang/UnsatisfiedLinkError",
    "java/lang/ClassNotFoundException",
    "java/lang/IllegalArgumentException",
    "java/lang/UnsupportedOperationException",
    "java/lang/NullPointerException",
    "java/lang/RuntimeException",
    "java/lang/Iterator",
    "java/lang/Number",
    "java/lang/Class",
];

/// Classes implemented directly in JavaScript by the runtime.
#[derive(Clone, Debug, Default)]
pub(crate) struct BuiltinSet {
    names: BTreeSet<String>,
}

impl BuiltinSet {
    /// Read `<runtime_js>/classes/*.js`; `java_lang_Object.js` names
    /// `java/lang/Object`.
    pub(crate) fn scan(runtime_js: &Path) -> Result<Self, CompileError> {
        let classes_dir = runtime_js.join("classes");
        let mut set = BuiltinSet::default();
        if !classes_dir.is_dir() {
            debug!(path = %classes_dir.display(), "no built-in class directory");
            return Ok(set);
        }
        let entries =
            fs::read_dir(&classes_dir).map_err(|error| CompileError::io(&classes_dir, error))?;
        for entry in entries {
            let entry = entry.map_err(|error| CompileError::io(&classes_dir, error))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(stem) = file_name.to_str().and_then(|name| name.strip_suffix(".js")) else {
                continue;
            };
            set.insert(&stem.replace('_', "/"));
        }
        debug!(count = set.len(), path = %classes_dir.display(), "loaded built-in classes");
        Ok(set)
    }

    pub(crate) fn insert(&mut self, name: &str) {
        self.names.insert(name.to_string());
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }
}
