//! Build command - render a kustomization directory

use console::style;
use kustom_core::FsLoader;
use kustom_engine::{Builder, EngineError};
use std::fs;
use std::path::Path;

use crate::error::{CliError, Result};

pub fn run(path: &Path, raw: bool, output: Option<&Path>) -> Result<()> {
    let loader = FsLoader::new(path).map_err(|e| {
        CliError::input_with_help(
            e.to_string(),
            "pass a directory containing a kustomization.yaml",
        )
    })?;

    let builder = Builder::new(loader);
    let resources = if raw {
        builder.raw_resources()?
    } else {
        builder.build()?
    };
    tracing::debug!(count = resources.len(), raw, "build finished");

    let yaml = resources.as_yaml().map_err(EngineError::from)?;

    match output {
        Some(file) => {
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(file, &yaml)?;
            eprintln!("{} {}", style("wrote").green(), file.display());
        }
        None => print!("{}", yaml),
    }
    Ok(())
}
