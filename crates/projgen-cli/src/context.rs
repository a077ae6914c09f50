use std::path::PathBuf;

use projgen::GenerationContext;

use crate::error::CliError;
use crate::util::Verbosity;

pub struct CliSession {
    pub context: GenerationContext,
    pub verbosity: Verbosity,
}

impl CliSession {
    /// `--workspace` may name the manifest itself or any directory beneath the project; without
    /// it the search starts at the current directory.
    pub fn bootstrap(
        workspace_override: Option<String>,
        verbosity: Verbosity,
    ) -> Result<Self, CliError> {
        let context = match workspace_override {
            Some(path) => {
                let path = PathBuf::from(path);
                if path.is_file() {
                    GenerationContext::from_manifest_path(&path)?
                } else {
                    GenerationContext::discover(&path)?
                }
            }
            None => GenerationContext::discover(std::env::current_dir()?)?,
        };

        if verbosity.verbose {
            tracing::info!(
                root = %context.root().display(),
                output = %context.output_dir().display(),
                platforms = context.platforms().len(),
                modules = context.manifest().modules.len(),
                "resolved generation manifest"
            );
        }

        Ok(Self { context, verbosity })
    }
}
