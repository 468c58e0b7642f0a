use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::builtins::{BuiltinSet, REQUIRED_BUILTINS};
use crate::class_translator::translate_class;
use crate::classfile::parse_class_bytes;
use crate::classpath::{ClasspathIndex, class_pattern};
use crate::error::CompileError;
use crate::ir::render_unit;
use crate::naming::RuntimeNaming;

/// Classes every program needs once any service provider is declared.
const SERVICE_SUPPORT: [&str; 2] = ["java/lang/Iterable", "java/lang/Iterator"];

/// Receives advisory progress from a compile run.
pub(crate) trait ProgressListener {
    /// `None` means the amount of remaining work is unknown.
    fn on_progress(&mut self, fraction: Option<f32>);
    fn on_message(&mut self, message: &str);
}

/// Listener that discards everything.
pub(crate) struct SilentProgress;

impl ProgressListener for SilentProgress {
    fn on_progress(&mut self, _fraction: Option<f32>) {}

    fn on_message(&mut self, _message: &str) {}
}

#[derive(Clone, Debug)]
pub(crate) struct CompilerConfig {
    /// Classpath roots in lookup order.
    pub(crate) classpath: Vec<PathBuf>,
    pub(crate) output_dir: PathBuf,
    /// Entry point pattern, e.g. `com.example.Main`.
    pub(crate) main_class: Option<String>,
    /// Further patterns to force-compile, e.g. `com.example.plugins.*`.
    pub(crate) additional_classes: Vec<String>,
    pub(crate) runtime_prefix: String,
}

/// Everything recorded during a run; serialized as the build manifest.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CompilerState {
    #[serde(skip)]
    processed: BTreeSet<String>,
    /// Output files relative to the output directory.
    pub(crate) compiled: Vec<String>,
    pub(crate) natives: Vec<String>,
    pub(crate) builtins_used: BTreeSet<String>,
    pub(crate) services: BTreeMap<String, Vec<String>>,
    pub(crate) runtime_fragments: Vec<PathBuf>,
    /// Runtime class name to the runtime names it references.
    pub(crate) references: BTreeMap<String, Vec<String>>,
}

impl CompilerState {
    /// Mark `name` as processed; false if it already was.
    fn claim(&mut self, name: &str) -> bool {
        self.processed.insert(name.to_string())
    }

    pub(crate) fn is_processed(&self, name: &str) -> bool {
        self.processed.contains(name)
    }
}

pub(crate) struct Compiler<'a> {
    config: CompilerConfig,
    naming: RuntimeNaming,
    builtins: BuiltinSet,
    index: ClasspathIndex,
    state: CompilerState,
    progress: &'a mut dyn ProgressListener,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(
        config: CompilerConfig,
        builtins: BuiltinSet,
        progress: &'a mut dyn ProgressListener,
    ) -> Result<Self> {
        progress.on_progress(None);
        progress.on_message("Scanning classpath contents");
        let index = ClasspathIndex::scan(&config.classpath).context("failed to scan classpath")?;
        debug!(entries = index.len(), "indexed classpath");
        Ok(Self {
            naming: RuntimeNaming::new(config.runtime_prefix.clone()),
            config,
            builtins,
            index,
            state: CompilerState::default(),
            progress,
        })
    }

    pub(crate) fn state(&self) -> &CompilerState {
        &self.state
    }

    pub(crate) fn create_output_directory(&self) -> Result<()> {
        fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!(
                "failed to create output directory {}",
                self.config.output_dir.display()
            )
        })
    }

    /// Compile the entry classes and everything they transitively reference.
    pub(crate) fn compile(&mut self) -> Result<()> {
        let mut queue: VecDeque<String> = self.entry_classes()?.into();
        self.state.services = self.index.services().clone();
        self.state.runtime_fragments = self.index.runtime_fragments().to_vec();

        let mut done = 0usize;
        while let Some(name) = queue.pop_front() {
            if self.state.is_processed(&name) {
                continue;
            }
            let total = done + queue.len() + 1;
            self.progress.on_progress(Some(done as f32 / total as f32));
            self.progress.on_message(&name);
            let discovered = self
                .compile_class(&name)
                .with_context(|| format!("failed to compile {name}"))?;
            queue.extend(
                discovered
                    .into_iter()
                    .filter(|reference| !self.state.is_processed(reference)),
            );
            done += 1;
        }

        for builtin in REQUIRED_BUILTINS {
            self.state.builtins_used.insert(builtin.to_string());
        }
        self.progress.on_progress(Some(1.0));
        info!(
            compiled = self.state.compiled.len(),
            natives = self.state.natives.len(),
            builtins = self.state.builtins_used.len(),
            "compilation finished"
        );
        Ok(())
    }

    fn entry_classes(&self) -> Result<Vec<String>> {
        let mut patterns = Vec::new();
        for pattern in self.config.main_class.iter().chain(&self.config.additional_classes) {
            patterns.push(
                class_pattern(pattern)
                    .with_context(|| format!("invalid class pattern {pattern}"))?,
            );
        }
        let mut seeds = self.index.matching_classes(&patterns);
        if !self.index.service_classes().is_empty() {
            seeds.extend(SERVICE_SUPPORT.iter().map(|name| name.to_string()));
            seeds.extend(self.index.service_classes().iter().cloned());
        }
        debug!(count = seeds.len(), "seeded work list");
        Ok(seeds)
    }

    /// Compile one class; returns the raw names it references.
    fn compile_class(&mut self, name: &str) -> Result<Vec<String>> {
        if !self.state.claim(name) {
            return Ok(Vec::new());
        }
        let runtime_name = self.naming.strip(name);
        if self.builtins.contains(&runtime_name) {
            debug!(class = %runtime_name, "using built-in implementation");
            self.state.builtins_used.insert(runtime_name);
            return Ok(Vec::new());
        }
        let physical = self.naming.physical(name);
        if physical != name && !self.state.claim(&physical) {
            return Ok(Vec::new());
        }

        let entry = self
            .index
            .resolve(&format!("{physical}.class"))
            .cloned()
            .ok_or_else(|| CompileError::ClassNotFound {
                class: physical.clone(),
            })?;
        debug!(class = %runtime_name, path = %entry.path.display(), "compiling class");
        let data = fs::read(&entry.path).map_err(|error| CompileError::io(&entry.path, error))?;
        let class_file = parse_class_bytes(&data)?;
        trace!(
            class = %runtime_name,
            fields = class_file.fields.len(),
            methods = class_file.methods.len(),
            "parsed class file"
        );
        let unit = translate_class(&class_file, &self.naming)?;

        let relative = format!("classpath{}/{runtime_name}.js", entry.root_index);
        let output = self.config.output_dir.join(&relative);
        ensure_parent(&output)?;
        let rendered = render_unit(&unit, &self.naming).context("failed to render IR unit")?;
        fs::write(&output, rendered).map_err(|error| CompileError::io(&output, error))?;

        if let Some(native) = self.index.resolve(&format!("{physical}.native.js")) {
            let file_name = native
                .path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            let native_relative = match relative.rsplit_once('/') {
                Some((dir, _)) => format!("{dir}/{file_name}"),
                None => file_name,
            };
            let target = self.config.output_dir.join(&native_relative);
            fs::copy(&native.path, &target).map_err(|error| CompileError::io(&target, error))?;
            debug!(native = %native_relative, "copied native implementation");
            self.state.natives.push(native_relative);
        }

        self.state.compiled.push(relative);
        self.state
            .references
            .insert(runtime_name, unit.runtime_references(&self.naming));
        Ok(unit.references)
    }

    /// Write `manifest.json` into the output directory.
    pub(crate) fn write_manifest(&self) -> Result<PathBuf> {
        let path = self.config.output_dir.join("manifest.json");
        let file = fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &self.state)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn ensure_parent(path: &Path) -> Result<(), CompileError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| CompileError::io(parent, error))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ClassFileBuilder, MethodSpec, class_with_field_types, write_file};

    struct Fixture {
        _project: tempfile::TempDir,
        _output: tempfile::TempDir,
        config: CompilerConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let project = tempfile::tempdir().expect("project dir");
            let output = tempfile::tempdir().expect("output dir");
            let config = CompilerConfig {
                classpath: vec![project.path().to_path_buf()],
                output_dir: output.path().to_path_buf(),
                main_class: Some("app.Main".to_string()),
                additional_classes: Vec::new(),
                runtime_prefix: crate::naming::DEFAULT_RUNTIME_PREFIX.to_string(),
            };
            Self {
                _project: project,
                _output: output,
                config,
            }
        }

        fn project(&self) -> &Path {
            &self.config.classpath[0]
        }

        fn add_class(&self, name: &str, bytes: &[u8]) {
            write_file(self.project(), &format!("{name}.class"), bytes);
        }

        fn run(&self, builtins: BuiltinSet) -> Result<CompilerState> {
            let mut progress = SilentProgress;
            let mut compiler = Compiler::new(self.config.clone(), builtins, &mut progress)?;
            compiler.create_output_directory()?;
            compiler.compile()?;
            compiler.write_manifest()?;
            Ok(compiler.state)
        }
    }

    fn object_builtins() -> BuiltinSet {
        let mut builtins = BuiltinSet::default();
        builtins.insert("java/lang/Object");
        builtins.insert("java/lang/String");
        builtins
    }

    #[test]
    fn diamond_dependencies_compile_each_class_once() {
        let fixture = Fixture::new();
        fixture.add_class(
            "app/Main",
            &class_with_field_types("app/Main", "java/lang/Object", &["app/Left", "app/Right"]),
        );
        fixture.add_class(
            "app/Left",
            &class_with_field_types("app/Left", "java/lang/Object", &["app/Shared"]),
        );
        fixture.add_class(
            "app/Right",
            &class_with_field_types("app/Right", "java/lang/Object", &["app/Shared"]),
        );
        fixture.add_class(
            "app/Shared",
            &class_with_field_types("app/Shared", "java/lang/Object", &[]),
        );

        let state = fixture.run(object_builtins()).expect("compile");

        assert_eq!(
            state.compiled,
            vec![
                "classpath0/app/Main.js",
                "classpath0/app/Left.js",
                "classpath0/app/Right.js",
                "classpath0/app/Shared.js",
            ]
        );
        for compiled in &state.compiled {
            assert!(fixture.config.output_dir.join(compiled).is_file());
        }
        assert_eq!(
            state.references.get("app/Main"),
            Some(&vec![
                "java/lang/Object".to_string(),
                "app/Left".to_string(),
                "app/Right".to_string()
            ])
        );
    }

    #[test]
    fn every_reference_is_compiled_or_builtin() {
        let fixture = Fixture::new();
        fixture.add_class(
            "app/Main",
            &class_with_field_types("app/Main", "java/lang/Object", &["java/lang/String", "app/Item"]),
        );
        fixture.add_class(
            "app/Item",
            &class_with_field_types("app/Item", "java/lang/Object", &["app/Main"]),
        );

        let state = fixture.run(object_builtins()).expect("compile");

        for references in state.references.values() {
            for reference in references {
                assert!(
                    state.references.contains_key(reference)
                        || state.builtins_used.contains(reference),
                    "{reference} neither compiled nor built-in"
                );
            }
        }
        assert!(state.builtins_used.contains("java/lang/Object"));
        assert!(state.builtins_used.contains("java/lang/String"));
    }

    #[test]
    fn builtins_are_never_compiled() {
        let fixture = Fixture::new();
        fixture.add_class(
            "app/Main",
            &class_with_field_types("app/Main", "java/lang/Object", &[]),
        );
        // A classpath copy of a built-in must be ignored.
        write_file(
            fixture.project(),
            "net/nexustools/jvm/runtime/java/lang/Object.class",
            &class_with_field_types("net/nexustools/jvm/runtime/java/lang/Object", "x/Missing", &[]),
        );

        let state = fixture.run(object_builtins()).expect("compile");

        assert_eq!(state.compiled, vec!["classpath0/app/Main.js"]);
        assert!(state.builtins_used.contains("java/lang/Object"));
    }

    #[test]
    fn required_builtins_are_always_recorded() {
        let fixture = Fixture::new();
        fixture.add_class(
            "app/Main",
            &class_with_field_types("app/Main", "java/lang/Object", &[]),
        );

        let state = fixture.run(object_builtins()).expect("compile");

        for builtin in REQUIRED_BUILTINS {
            assert!(state.builtins_used.contains(builtin), "{builtin} missing");
        }
    }

    #[test]
    fn missing_classes_fail_with_class_not_found() {
        let fixture = Fixture::new();
        fixture.add_class(
            "app/Main",
            &class_with_field_types("app/Main", "java/lang/Object", &["app/Gone"]),
        );

        let error = fixture.run(object_builtins()).expect_err("missing class");

        assert!(error.to_string().contains("failed to compile app/Gone"));
        match error.downcast_ref::<CompileError>() {
            Some(CompileError::ClassNotFound { class }) => assert_eq!(class, "app/Gone"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn platform_classes_resolve_under_the_runtime_package() {
        let fixture = Fixture::new();
        fixture.add_class(
            "app/Main",
            &class_with_field_types("app/Main", "java/lang/Object", &["java/util/Stack"]),
        );
        let mut builder = ClassFileBuilder::new(
            "net/nexustools/jvm/runtime/java/util/Stack",
            Some("java/lang/Object"),
        );
        builder.add_method(MethodSpec::new(0x0101, "push", "(Ljava/lang/Object;)V", None));
        fixture.add_class("net/nexustools/jvm/runtime/java/util/Stack", &builder.finish());
        write_file(
            fixture.project(),
            "net/nexustools/jvm/runtime/java/util/Stack.native.js",
            b"// native",
        );

        let state = fixture.run(object_builtins()).expect("compile");

        assert_eq!(
            state.compiled,
            vec!["classpath0/app/Main.js", "classpath0/java/util/Stack.js"]
        );
        assert_eq!(state.natives, vec!["classpath0/java/util/Stack.native.js"]);
        let output = &fixture.config.output_dir;
        let rendered =
            fs::read_to_string(output.join("classpath0/java/util/Stack.js")).expect("read unit");
        assert!(rendered.contains("defineClass(\"java/util/Stack\""));
        assert!(rendered.contains("\"native\": \"java/util/Stack.native.js\""));
        assert!(output.join("classpath0/java/util/Stack.native.js").is_file());
    }

    #[test]
    fn service_providers_seed_the_work_list() {
        let mut fixture = Fixture::new();
        fixture.config.main_class = None;
        fixture.add_class(
            "com/example/Impl",
            &class_with_field_types("com/example/Impl", "java/lang/Object", &[]),
        );
        write_file(
            fixture.project(),
            "META-INF/services/com.example.Provider",
            b"com.example.Impl\n",
        );
        let mut builtins = object_builtins();
        builtins.insert("java/lang/Iterable");
        builtins.insert("java/lang/Iterator");

        let state = fixture.run(builtins).expect("compile");

        assert_eq!(state.compiled, vec!["classpath0/com/example/Impl.js"]);
        assert_eq!(
            state.services.get("com.example.Provider"),
            Some(&vec!["com/example/Impl".to_string()])
        );
        assert!(state.builtins_used.contains("java/lang/Iterable"));
    }

    #[test]
    fn manifest_lists_the_run() {
        let fixture = Fixture::new();
        fixture.add_class(
            "app/Main",
            &class_with_field_types("app/Main", "java/lang/Object", &[]),
        );
        write_file(fixture.project(), "META-INF/runtime.js", b"");

        fixture.run(object_builtins()).expect("compile");

        let manifest: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(fixture.config.output_dir.join("manifest.json"))
                .expect("read manifest"),
        )
        .expect("parse manifest");
        assert_eq!(manifest["compiled"], serde_json::json!(["classpath0/app/Main.js"]));
        assert_eq!(manifest["references"]["app/Main"], serde_json::json!(["java/lang/Object"]));
        assert_eq!(manifest["runtimeFragments"].as_array().expect("array").len(), 1);
        assert!(manifest.get("processed").is_none());
        assert!(
            manifest["builtinsUsed"]
                .as_array()
                .expect("array")
                .contains(&serde_json::json!("java/lang/Class"))
        );
    }

    #[test]
    fn later_roots_use_their_own_output_directory() {
        let mut fixture = Fixture::new();
        let library = tempfile::tempdir().expect("library dir");
        fixture.config.classpath.push(library.path().to_path_buf());
        fixture.add_class(
            "app/Main",
            &class_with_field_types("app/Main", "java/lang/Object", &["lib/Helper"]),
        );
        write_file(
            library.path(),
            "lib/Helper.class",
            &class_with_field_types("lib/Helper", "java/lang/Object", &[]),
        );

        let state = fixture.run(object_builtins()).expect("compile");

        assert_eq!(
            state.compiled,
            vec!["classpath0/app/Main.js", "classpath1/lib/Helper.js"]
        );
    }
}
