use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::error::CompileError;

const SERVICES_DIR: &str = "META-INF/services/";

/// Physical location of one logical classpath entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ClasspathEntry {
    pub(crate) path: PathBuf,
    /// Position of the providing root in the classpath.
    pub(crate) root_index: usize,
}

/// Merged view of every classpath root, keyed by `/`-separated logical path.
#[derive(Debug, Default)]
pub(crate) struct ClasspathIndex {
    entries: BTreeMap<String, ClasspathEntry>,
    runtime_fragments: Vec<PathBuf>,
    services: BTreeMap<String, Vec<String>>,
    service_classes: Vec<String>,
}

impl ClasspathIndex {
    /// Scan `roots` in order; the first root that provides a path wins.
    pub(crate) fn scan(roots: &[PathBuf]) -> Result<Self, CompileError> {
        let mut index = ClasspathIndex::default();
        for (root_index, root) in roots.iter().enumerate() {
            debug!(root = %root.display(), root_index, "scanning classpath root");
            index.scan_dir(root, root_index, "")?;
        }
        Ok(index)
    }

    fn scan_dir(&mut self, directory: &Path, root_index: usize, prefix: &str) -> Result<(), CompileError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(directory).map_err(|error| CompileError::io(directory, error))? {
            let entry = entry.map_err(|error| CompileError::io(directory, error))?;
            entries.push(entry.path());
        }
        entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

        for entry in entries {
            let Some(file_name) = entry.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if is_ignored(file_name) {
                continue;
            }
            let logical = format!("{prefix}{file_name}");
            if entry.is_dir() {
                self.scan_dir(&entry, root_index, &format!("{logical}/"))?;
                continue;
            }
            if logical == "runtime.js" || logical == "META-INF/runtime.js" {
                self.runtime_fragments.push(entry.clone());
            } else if let Some(provider) = logical.strip_prefix(SERVICES_DIR) {
                if !provider.contains('/') {
                    self.read_service_file(&entry, provider)?;
                }
            }
            self.entries.entry(logical).or_insert(ClasspathEntry {
                path: entry,
                root_index,
            });
        }
        Ok(())
    }

    fn read_service_file(&mut self, path: &Path, provider: &str) -> Result<(), CompileError> {
        let content = fs::read_to_string(path).map_err(|error| CompileError::io(path, error))?;
        let implementations = parse_service_file(&content);
        debug!(provider, count = implementations.len(), "found service descriptor");
        self.service_classes.extend(implementations.iter().cloned());
        self.services
            .entry(provider.to_string())
            .or_default()
            .extend(implementations);
        Ok(())
    }

    pub(crate) fn resolve(&self, logical: &str) -> Option<&ClasspathEntry> {
        self.entries.get(logical)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn runtime_fragments(&self) -> &[PathBuf] {
        &self.runtime_fragments
    }

    /// Service provider name to implementation classes, in discovery order.
    pub(crate) fn services(&self) -> &BTreeMap<String, Vec<String>> {
        &self.services
    }

    /// Every implementation class named by a service descriptor.
    pub(crate) fn service_classes(&self) -> &[String] {
        &self.service_classes
    }

    /// Class names whose `.class` entry matches one of `patterns`, in
    /// logical path order.
    pub(crate) fn matching_classes(&self, patterns: &[Regex]) -> Vec<String> {
        self.entries
            .keys()
            .filter(|logical| patterns.iter().any(|pattern| pattern.is_match(logical)))
            .filter_map(|logical| logical.strip_suffix(".class"))
            .map(str::to_string)
            .collect()
    }
}

fn is_ignored(file_name: &str) -> bool {
    file_name.starts_with('.') || file_name.ends_with('~') || file_name == ".git"
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Implementation class names listed in a service descriptor.
pub(crate) fn parse_service_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| match line.find('#') {
            Some(comment) => &line[..comment],
            None => line,
        })
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.replace('.', "/"))
        .collect()
}

/// Compile a class selection pattern such as `com.example.*` into a regex
/// over logical paths; `*` stands for one or more characters.
pub(crate) fn class_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let slashed = pattern.replace('.', "/");
    let body = slashed
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".+");
    Regex::new(&format!("^{body}\\.class$"))
}
