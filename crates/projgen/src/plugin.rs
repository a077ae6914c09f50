//! Precompiled plugin discovery.
//!
//! Plugin binaries are found by walking the configured roots. Each binary may carry a `.meta`
//! YAML sidecar describing whether it is auto-referenced, which define constraints gate it, and
//! which platforms enable it.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_yaml::Value;
use walkdir::WalkDir;

use crate::diagnostics::Diagnostics;
use crate::error::ProjgenError;
use crate::graph::{NodeId, NodeKind, PluginNode};
use crate::platform::{BuildContext, EDITOR_PLATFORM, PlatformSet, PlatformTable};

/// Plugins under a directory with this name are only attached when a module names them.
pub const EXPLICIT_DEPENDENCIES_DIR: &str = "ExplicitDependencies";

pub const PLUGIN_EXTENSIONS: [&str; 5] = ["dll", "so", "dylib", "bundle", "a"];

const ANY_PLATFORM: &str = "Any";
const EXCLUDE_PREFIX: &str = "Exclude ";
const PROBE_LIMIT: u64 = 64 * 1024;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BinaryKind {
    Managed,
    Native,
}

/// Reads the PE header of a `.dll` and reports whether it carries a CLR runtime header.
/// Every other extension is native.
pub fn probe_binary(path: &Path) -> Result<BinaryKind, ProjgenError> {
    let is_dll = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("dll"));
    if !is_dll {
        return Ok(BinaryKind::Native);
    }
    let mut image = Vec::new();
    File::open(path)?
        .take(PROBE_LIMIT)
        .read_to_end(&mut image)?;
    Ok(classify_image(&image))
}

pub fn classify_image(image: &[u8]) -> BinaryKind {
    if has_clr_header(image).unwrap_or(false) {
        BinaryKind::Managed
    } else {
        BinaryKind::Native
    }
}

fn has_clr_header(image: &[u8]) -> Option<bool> {
    const CLR_DIRECTORY: usize = 14;
    if image.get(0..2)? != b"MZ" {
        return Some(false);
    }
    let pe = read_u32(image, 0x3c)? as usize;
    if image.get(pe..pe + 4)? != b"PE\0\0" {
        return Some(false);
    }
    let optional = pe + 24;
    let (count_at, dirs_at) = match read_u16(image, optional)? {
        0x10b => (optional + 92, optional + 96),
        0x20b => (optional + 108, optional + 112),
        _ => return Some(false),
    };
    if (read_u32(image, count_at)? as usize) <= CLR_DIRECTORY {
        return Some(false);
    }
    let entry = dirs_at + CLR_DIRECTORY * 8;
    Some(read_u32(image, entry)? != 0 && read_u32(image, entry + 4)? != 0)
}

fn read_u16(image: &[u8], at: usize) -> Option<u16> {
    let bytes = image.get(at..at + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(image: &[u8], at: usize) -> Option<u32> {
    let bytes = image.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Platform enablement as encoded in a plugin sidecar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Enablement {
    /// No sidecar or no platform data.
    Everywhere,
    /// An enabled `Any` entry with `Exclude <Platform>` flags.
    ExcludeList { excluded: Vec<String> },
    /// Enabled entries naming platforms directly; `Editor` covers the in-editor context.
    AllowList { enabled: Vec<String> },
}

impl Enablement {
    fn editor_enabled(&self) -> bool {
        match self {
            Enablement::Everywhere => true,
            Enablement::ExcludeList { excluded } => !contains_label(excluded, EDITOR_PLATFORM),
            Enablement::AllowList { enabled } => contains_label(enabled, EDITOR_PLATFORM),
        }
    }

    /// Platforms enabled for `context` before define constraints are applied.
    pub fn platforms(&self, table: &PlatformTable, context: BuildContext) -> PlatformSet {
        if context == BuildContext::InEditor {
            return if self.editor_enabled() {
                table.all()
            } else {
                PlatformSet::new()
            };
        }
        table
            .iter()
            .filter(|platform| match self {
                Enablement::Everywhere => true,
                Enablement::ExcludeList { excluded } => {
                    !excluded.iter().any(|label| platform.answers_to(label))
                }
                Enablement::AllowList { enabled } => {
                    enabled.iter().any(|label| platform.answers_to(label))
                }
            })
            .map(|platform| platform.name.clone())
            .collect()
    }
}

fn contains_label(labels: &[String], wanted: &str) -> bool {
    labels.iter().any(|label| label.eq_ignore_ascii_case(wanted))
}

/// Parsed plugin sidecar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginMeta {
    pub explicitly_referenced: bool,
    pub define_constraints: Vec<String>,
    pub enablement: Enablement,
}

impl Default for PluginMeta {
    fn default() -> Self {
        Self {
            explicitly_referenced: false,
            define_constraints: Vec::new(),
            enablement: Enablement::Everywhere,
        }
    }
}

impl PluginMeta {
    pub fn parse(text: &str) -> Result<Self, ProjgenError> {
        let document: Value = serde_yaml::from_str(text)?;
        let Some(importer) = document.get("PluginImporter") else {
            return Ok(Self::default());
        };
        let explicitly_referenced = importer
            .get("isExplicitlyReferenced")
            .is_some_and(truthy);
        let define_constraints = importer
            .get("defineConstraints")
            .and_then(Value::as_sequence)
            .map(|items| items.iter().filter_map(scalar_text).collect())
            .unwrap_or_default();
        let enablement = importer
            .get("platformData")
            .map(parse_platform_data)
            .unwrap_or(Enablement::Everywhere);
        Ok(Self {
            explicitly_referenced,
            define_constraints,
            enablement,
        })
    }

    /// Loads `<binary>.meta` when present.
    pub fn load_for(binary: &Path) -> Result<Option<Self>, ProjgenError> {
        let mut sidecar = binary.as_os_str().to_owned();
        sidecar.push(".meta");
        let sidecar = PathBuf::from(sidecar);
        if !sidecar.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&sidecar)
            .map_err(|err| ProjgenError::from(err).context(sidecar.display()))?;
        Self::parse(&text)
            .map(Some)
            .map_err(|err| err.context(sidecar.display()))
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_i64() == Some(1),
        Value::String(text) => text == "1" || text.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// `first` is a single-entry map `{category: platform}`; the platform is the value when it is a
/// string, otherwise the key (`{Any: }`).
fn entry_label(entry: &Value) -> Option<String> {
    let first = entry.get("first")?.as_mapping()?;
    let (key, value) = first.iter().next()?;
    scalar_text(value)
        .filter(|label| !label.is_empty())
        .or_else(|| scalar_text(key))
}

fn parse_platform_data(data: &Value) -> Enablement {
    let entries: Vec<(String, &Value)> = match data {
        Value::Sequence(items) => items
            .iter()
            .filter_map(|entry| Some((entry_label(entry)?, entry.get("second")?)))
            .collect(),
        Value::Mapping(map) => map
            .iter()
            .filter_map(|(key, second)| Some((scalar_text(key)?, second)))
            .collect(),
        _ => Vec::new(),
    };
    if entries.is_empty() {
        return Enablement::Everywhere;
    }
    let enabled = |second: &Value| second.get("enabled").is_some_and(truthy);

    let exclude_form = entries.iter().find(|(label, second)| {
        label.eq_ignore_ascii_case(ANY_PLATFORM)
            && enabled(second)
            && second.get("settings").and_then(Value::as_mapping).is_some()
    });
    if let Some((_, second)) = exclude_form {
        let excluded = second
            .get("settings")
            .and_then(Value::as_mapping)
            .map(|settings| {
                settings
                    .iter()
                    .filter(|(_, flag)| truthy(flag))
                    .filter_map(|(key, _)| key.as_str()?.strip_prefix(EXCLUDE_PREFIX))
                    .map(|label| label.trim().to_string())
                    .collect()
            })
            .unwrap_or_default();
        return Enablement::ExcludeList { excluded };
    }

    let mut seen = BTreeSet::new();
    let enabled = entries
        .iter()
        .filter(|(label, second)| !label.eq_ignore_ascii_case(ANY_PLATFORM) && enabled(second))
        .map(|(label, _)| label.clone())
        .filter(|label| seen.insert(label.clone()))
        .collect();
    Enablement::AllowList { enabled }
}

/// Applies define constraints for one platform and context. A matching negated constraint
/// excludes; when positive constraints exist at least one must match.
pub fn constraints_admit(constraints: &[String], defines: &[&str]) -> bool {
    let mut positive = false;
    let mut positive_match = false;
    for constraint in constraints {
        let constraint = constraint.trim();
        if let Some(negated) = constraint.strip_prefix('!') {
            if defines.contains(&negated.trim()) {
                return false;
            }
        } else if !constraint.is_empty() {
            positive = true;
            positive_match |= defines.contains(&constraint);
        }
    }
    !positive || positive_match
}

fn constrained(
    table: &PlatformTable,
    context: BuildContext,
    enabled: PlatformSet,
    constraints: &[String],
) -> PlatformSet {
    if constraints.is_empty() {
        return enabled;
    }
    enabled
        .into_iter()
        .filter(|name| {
            table
                .get(name)
                .is_some_and(|platform| constraints_admit(constraints, &platform.defines(context)))
        })
        .collect()
}

fn is_plugin_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            PLUGIN_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn under_explicit_dir(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .parent()
        .is_some_and(|dir| {
            dir.components()
                .any(|part| part.as_os_str() == EXPLICIT_DEPENDENCIES_DIR)
        })
}

/// Builds one plugin node from a binary path and its sidecar.
pub fn load_plugin(
    root: &Path,
    path: &Path,
    table: &PlatformTable,
) -> Result<PluginNode, ProjgenError> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ProjgenError::Config(format!("{} has no file name", path.display())))?;
    let kind = probe_binary(path).map_err(|err| err.context(path.display()))?;
    let meta = PluginMeta::load_for(path)?.unwrap_or_default();
    let in_editor = constrained(
        table,
        BuildContext::InEditor,
        meta.enablement.platforms(table, BuildContext::InEditor),
        &meta.define_constraints,
    );
    let player = constrained(
        table,
        BuildContext::Player,
        meta.enablement.platforms(table, BuildContext::Player),
        &meta.define_constraints,
    );
    Ok(PluginNode {
        id: NodeId::derive(NodeKind::Plugin, &name),
        name,
        path: path.to_path_buf(),
        kind,
        auto_referenced: !meta.explicitly_referenced,
        define_constraints: meta.define_constraints,
        in_editor,
        player,
        explicit_only: under_explicit_dir(root, path),
    })
}

/// Walks every root for plugin binaries. Unreadable files and duplicate names become
/// diagnostics; the first plugin found under a name wins.
pub fn scan(
    roots: &[PathBuf],
    table: &PlatformTable,
    diagnostics: &mut Diagnostics,
) -> Vec<PluginNode> {
    let mut plugins: Vec<PluginNode> = Vec::new();
    let mut names = BTreeSet::new();
    for root in roots {
        if !root.is_dir() {
            diagnostics.warn(
                root.display().to_string(),
                "plugin root does not exist or is not a directory",
            );
            continue;
        }
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    diagnostics.warn(root.display().to_string(), err.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_plugin_file(entry.path()) {
                continue;
            }
            match load_plugin(root, entry.path(), table) {
                Ok(plugin) => {
                    if !names.insert(plugin.name.clone()) {
                        diagnostics.warn(
                            plugin.name.clone(),
                            format!(
                                "duplicate plugin name; ignoring {}",
                                plugin.path.display()
                            ),
                        );
                        continue;
                    }
                    tracing::debug!(
                        plugin = %plugin.name,
                        kind = ?plugin.kind,
                        player = plugin.player.len(),
                        "discovered plugin"
                    );
                    plugins.push(plugin);
                }
                Err(err) => diagnostics.warn(entry.path().display().to_string(), err.to_string()),
            }
        }
    }
    plugins
}
