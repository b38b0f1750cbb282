//! Apply Command Implementation
//!
//! Loads a main/startup program pair and a pipeline config, runs the
//! configured passes and writes the rewritten programs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use psgraph_core::Program;
use psgraph_passes::{registry, PassContext, PassPipeline, PipelineConfig, TensorTableEntry};
use serde::Serialize;
use tracing::{info, warn};

/// Apply a pass pipeline to a program pair
///
/// # Example
///
/// ```bash
/// psgraph apply \
///     --config pipeline.json \
///     --main main.json \
///     --startup startup.json \
///     --output out/
/// ```
#[derive(Args, Debug, Clone)]
pub struct ApplyCommand {
    /// Pipeline configuration (JSON)
    #[arg(long, short = 'c', env = "PSGRAPH_CONFIG")]
    pub config: PathBuf,

    /// Main program to rewrite (JSON)
    #[arg(long)]
    pub main: PathBuf,

    /// Startup program to rewrite (JSON)
    #[arg(long)]
    pub startup: PathBuf,

    /// Original trainer main program; defaults to `--main`
    #[arg(long)]
    pub origin_main: Option<PathBuf>,

    /// Original trainer startup program; defaults to `--startup`
    #[arg(long)]
    pub origin_startup: Option<PathBuf>,

    /// Pass to run, repeatable; replaces the configured pass list
    #[arg(long = "pass", value_name = "NAME")]
    pub passes: Vec<String>,

    /// Output directory; the main program is printed to stdout when absent
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Index row for one tensor-table entry in `tensor_table.json`.
#[derive(Debug, Serialize)]
struct TensorTableIndexEntry<'a> {
    feed_var_name: &'a str,
    fetch_var_name: &'a str,
    tensor_table_class: &'a str,
    main_program: String,
    startup_program: String,
}

impl ApplyCommand {
    /// Execute the apply command
    pub fn run(&self) -> Result<()> {
        let config = PipelineConfig::from_json_file(&self.config)?;
        let overrides = config.user_overrides();
        if !overrides.is_empty() {
            info!(?overrides, "pipeline config overrides");
        }

        let mut main = read_program(&self.main)?;
        let mut startup = read_program(&self.startup)?;
        let origin_main = match &self.origin_main {
            Some(path) => read_program(path)?,
            None => main.clone(),
        };
        let origin_startup = match &self.origin_startup {
            Some(path) => read_program(path)?,
            None => startup.clone(),
        };

        let names = if self.passes.is_empty() {
            config.pass_names()
        } else {
            self.passes.clone()
        };
        let pipeline = PassPipeline::from_names(registry::global()?, &names)?;
        let mut ctx = config.build_context(origin_main, origin_startup);

        let runs = pipeline
            .run(&mut main, &mut startup, &mut ctx)
            .context("Pass pipeline failed")?;
        info!("Applied {} passes", runs.len());

        match &self.output {
            Some(dir) => write_outputs(dir, &main, &startup, &ctx)?,
            None => {
                if !ctx.tensor_table().is_empty() {
                    warn!("No --output given; tensor tables are not written");
                }
                println!("{}", main.to_json_pretty()?);
            }
        }
        Ok(())
    }
}

fn read_program(path: &Path) -> Result<Program> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read program {:?}", path))?;
    Program::from_json(&json).with_context(|| format!("Failed to parse program {:?}", path))
}

fn write_program(path: &Path, program: &Program) -> Result<()> {
    std::fs::write(path, program.to_json_pretty()?)
        .with_context(|| format!("Failed to write {:?}", path))
}

/// File stem for a tensor-table key, e.g. `@LR_DECAY_COUNTER@` -> `lr_decay_counter`.
fn table_file_stem(key: &str) -> String {
    key.trim_matches('@')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn write_outputs(dir: &Path, main: &Program, startup: &Program, ctx: &PassContext) -> Result<()> {
    std::fs::create_dir_all(dir).context("Failed to create output directory")?;
    write_program(&dir.join("main.json"), main)?;
    write_program(&dir.join("startup.json"), startup)?;

    let mut index = BTreeMap::new();
    for (key, entry) in ctx.tensor_table() {
        index.insert(key.as_str(), write_table(dir, key, entry)?);
    }
    let json = serde_json::to_string_pretty(&index)?;
    std::fs::write(dir.join("tensor_table.json"), json)
        .context("Failed to write tensor table index")?;

    info!("Wrote programs and {} tensor tables to {:?}", index.len(), dir);
    Ok(())
}

fn write_table<'a>(
    dir: &Path,
    key: &str,
    entry: &'a TensorTableEntry,
) -> Result<TensorTableIndexEntry<'a>> {
    let stem = table_file_stem(key);
    let main_file = format!("{stem}_main.json");
    let startup_file = format!("{stem}_startup.json");
    write_program(&dir.join(&main_file), &entry.main_program)?;
    write_program(&dir.join(&startup_file), &entry.startup_program)?;

    Ok(TensorTableIndexEntry {
        feed_var_name: &entry.feed_var_name,
        fetch_var_name: &entry.fetch_var_name,
        tensor_table_class: &entry.tensor_table_class,
        main_program: main_file,
        startup_program: startup_file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_file_stem() {
        assert_eq!(table_file_stem("@LR_DECAY_COUNTER@"), "lr_decay_counter");
        assert_eq!(table_file_stem("a.b"), "a_b");
    }

    #[test]
    fn test_read_program_reports_path() {
        let err = read_program(Path::new("/nonexistent/main.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/main.json"));
    }
}
