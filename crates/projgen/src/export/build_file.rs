//! `build.proj`: one MSBuild target per context and platform, plus an aggregate `Build` target.

use std::path::{Path, PathBuf};

use super::{RenderedFile, xml_escape};
use crate::error::ProjgenError;
use crate::platform::{BuildContext, PlatformTable};
use crate::template::{Replacements, Template, TokenValue};

pub const BUILD_FILE: &str = "build.proj";

pub fn build_file_path(output_dir: &Path) -> PathBuf {
    output_dir.join(BUILD_FILE)
}

/// `Editor_Win`, with anything outside `[A-Za-z0-9_]` replaced by `_`.
pub fn target_name(context: BuildContext, platform: &str) -> String {
    format!("{}_{platform}", context.configuration())
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect()
}

/// Every per-configuration target name, in render order.
pub fn target_names(platforms: &PlatformTable) -> Vec<String> {
    BuildContext::ALL
        .into_iter()
        .flat_map(|context| platforms.iter().map(move |p| target_name(context, &p.name)))
        .collect()
}

pub fn render(
    template: &Template,
    platforms: &PlatformTable,
    solution_file: &str,
) -> Result<String, ProjgenError> {
    let mut replacements = Replacements::new();
    let root = replacements.root(template);
    let solution = xml_escape(solution_file);
    replacements.assign(template, root, "SOLUTION", &solution)?;

    for context in BuildContext::ALL {
        for platform in platforms.iter() {
            let set = replacements.instance(template, root, "CONFIGURATION_TARGET")?;
            replacements.assign(
                template,
                set,
                "TARGET_NAME",
                target_name(context, &platform.name),
            )?;
            replacements.assign(template, set, "SOLUTION", &solution)?;
            replacements.assign(template, set, "CONFIGURATION", context.configuration())?;
            replacements.assign(template, set, "PLATFORM", xml_escape(&platform.name))?;
        }
    }
    replacements.assign(
        template,
        root,
        "ALL_TARGETS",
        TokenValue::sequence(target_names(platforms), ";"),
    )?;
    template.render(&replacements, root)
}

pub fn export(
    template: &Template,
    platforms: &PlatformTable,
    output_dir: &Path,
    solution_file: &str,
) -> Result<RenderedFile, ProjgenError> {
    let contents = render(template, platforms, solution_file)?;
    Ok(RenderedFile::generated(build_file_path(output_dir), contents))
}
