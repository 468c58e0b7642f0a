mod access;
mod builtins;
mod bytecode;
mod class_translator;
mod classfile;
mod classpath;
mod compiler;
mod descriptor;
mod error;
mod ir;
mod logging;
mod naming;
mod opcodes;
#[cfg(test)]
mod test_support;
mod translate;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

use crate::builtins::BuiltinSet;
use crate::compiler::{Compiler, CompilerConfig, ProgressListener};
use crate::naming::DEFAULT_RUNTIME_PREFIX;

/// CLI arguments for jvmjsc execution.
#[derive(Parser, Debug)]
#[command(
    name = "jvmjsc",
    about = "Compile JVM class files into JavaScript IR units for the browser JVM runtime.",
    version
)]
struct Cli {
    /// Compiled classes of the project.
    #[arg(long, value_name = "DIR")]
    project: PathBuf,
    /// Replacement platform classes, searched before the project.
    #[arg(long, value_name = "DIR")]
    runtime_java: Option<PathBuf>,
    /// JavaScript runtime; its `classes/*.js` files are built-ins.
    #[arg(long, value_name = "DIR")]
    runtime_js: Option<PathBuf>,
    #[arg(long, value_name = "DIR")]
    classpath: Vec<PathBuf>,
    #[arg(long, value_name = "DIR", default_value = "output")]
    output: PathBuf,
    /// Entry class pattern such as `com.example.Main`.
    #[arg(long, value_name = "PATTERN")]
    main_class: Option<String>,
    /// Additional class pattern; `*` matches one or more characters.
    #[arg(long = "class", value_name = "PATTERN")]
    classes: Vec<String>,
    /// Extra built-in class name.
    #[arg(long = "builtin", value_name = "CLASS")]
    builtins: Vec<String>,
    #[arg(long, value_name = "PREFIX", default_value = DEFAULT_RUNTIME_PREFIX)]
    runtime_prefix: String,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

impl Cli {
    fn compiler_config(&self) -> CompilerConfig {
        let mut classpath = Vec::new();
        classpath.extend(self.runtime_java.iter().cloned());
        classpath.push(self.project.clone());
        classpath.extend(self.classpath.iter().cloned());
        CompilerConfig {
            classpath,
            output_dir: self.output.clone(),
            main_class: self.main_class.clone(),
            additional_classes: self.classes.clone(),
            runtime_prefix: self.runtime_prefix.clone(),
        }
    }
}

/// Forwards driver progress to the log.
#[derive(Default)]
struct LogProgress {
    last_percent: Option<u32>,
}

impl ProgressListener for LogProgress {
    fn on_progress(&mut self, fraction: Option<f32>) {
        let percent = fraction.map(|fraction| (fraction * 100.0).round() as u32);
        if percent != self.last_percent {
            self.last_percent = percent;
            match percent {
                Some(percent) => debug!(percent, "progress"),
                None => debug!("progress indeterminate"),
            }
        }
    }

    fn on_message(&mut self, message: &str) {
        info!("{message}");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.quiet);
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if !cli.project.is_dir() {
        anyhow::bail!("project directory not found: {}", cli.project.display());
    }
    for entry in cli.runtime_java.iter().chain(&cli.classpath) {
        if !entry.is_dir() {
            anyhow::bail!("classpath entry not found: {}", entry.display());
        }
    }

    let started_at = Instant::now();
    let mut builtins = match &cli.runtime_js {
        Some(runtime_js) => BuiltinSet::scan(runtime_js)?,
        None => BuiltinSet::default(),
    };
    for name in &cli.builtins {
        builtins.insert(&name.replace('.', "/"));
    }

    let mut progress = LogProgress::default();
    let mut compiler = Compiler::new(cli.compiler_config(), builtins, &mut progress)?;
    compiler.create_output_directory()?;
    compiler.compile()?;
    let manifest = compiler.write_manifest()?;
    info!(manifest = %manifest.display(), "wrote build manifest");

    if cli.timing && !cli.quiet {
        let state = compiler.state();
        eprintln!(
            "timing: total_ms={} compiled={} natives={} builtins={}",
            started_at.elapsed().as_millis(),
            state.compiled.len(),
            state.natives.len(),
            state.builtins_used.len()
        );
    }

    Ok(())
}
