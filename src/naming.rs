pub(crate) const DEFAULT_RUNTIME_PREFIX: &str = "net/nexustools/jvm/runtime/";

/// Maps between the names classfiles use and the names the browser runtime
/// sees.
///
/// Replacement platform classes live under a package prefix on disk
/// (`net/nexustools/jvm/runtime/java/lang/String`) but are always exposed
/// under their plain name (`java/lang/String`).
#[derive(Clone, Debug)]
pub(crate) struct RuntimeNaming {
    prefix: String,
}

impl RuntimeNaming {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Remove every occurrence of the runtime prefix.
    pub(crate) fn strip(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            return name.to_string();
        }
        name.replace(&self.prefix, "")
    }

    /// Name under which `name` is looked up on the classpath.
    pub(crate) fn physical(&self, name: &str) -> String {
        if is_platform_class(name) {
            format!("{}{name}", self.prefix)
        } else {
            name.to_string()
        }
    }
}

impl Default for RuntimeNaming {
    fn default() -> Self {
        Self::new(DEFAULT_RUNTIME_PREFIX)
    }
}

fn is_platform_class(name: &str) -> bool {
    const PREFIXES: [&str; 2] = ["java/", "javax/"];
    PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Identifier-safe form of a class name for the generated wrapper function.
pub(crate) fn mangle(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
