//! Solution file model: parsing an existing `.sln`, generating one from the graph and merging the
//! two so hand-added projects survive regeneration.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::catalog::{TemplateCatalog, TemplateShape};
use crate::error::ProjgenError;
use crate::graph::{DependencyGraph, ReferenceNode};
use crate::platform::{BuildContext, PlatformTable};
use crate::template::{Replacements, Template};

/// Project type GUID for C# projects.
pub const CSHARP_PROJECT_TYPE: &str = "FAE04EC0-301F-11D3-BF4B-00C04F79EFBC";

pub const DEFAULT_HEADER: [&str; 4] = [
    "Microsoft Visual Studio Solution File, Format Version 12.00",
    "# Visual Studio Version 17",
    "VisualStudioVersion = 17.0.31903.59",
    "MinimumVisualStudioVersion = 10.0.40219.1",
];

const SOLUTION_CONFIGURATIONS: &str = "SolutionConfigurationPlatforms";
const PROJECT_CONFIGURATIONS: &str = "ProjectConfigurationPlatforms";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SolutionProject {
    pub type_guid: String,
    pub name: String,
    pub path: String,
    pub guid: String,
    /// Raw lines between the project header and `EndProject`.
    pub lines: Vec<String>,
}

/// One `ActiveCfg` entry, optionally paired with its `Build.0` line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProjectMapping {
    pub project: String,
    pub configuration: String,
    pub active: String,
    pub build: bool,
}

/// A global section other than the two configuration sections, kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GlobalSection {
    /// `GlobalSection(Name) = preSolution`, without indentation.
    pub header: String,
    pub lines: Vec<String>,
}

impl GlobalSection {
    pub fn name(&self) -> &str {
        section_name(&self.header).unwrap_or(&self.header)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Solution {
    pub header: Vec<String>,
    pub projects: Vec<SolutionProject>,
    pub configurations: Vec<String>,
    pub mappings: Vec<ProjectMapping>,
    /// Project configuration lines that do not fit the `ActiveCfg`/`Build.0` pattern.
    pub extra_mappings: Vec<String>,
    pub sections: Vec<GlobalSection>,
}

fn project_line() -> &'static Regex {
    static PROJECT_LINE: OnceLock<Regex> = OnceLock::new();
    PROJECT_LINE.get_or_init(|| {
        Regex::new(r#"^Project\("\{([^}]*)\}"\)\s*=\s*"([^"]*)"\s*,\s*"([^"]*)"\s*,\s*"\{([^}]*)\}"\s*$"#)
            .expect("valid project line regex")
    })
}

fn section_name(header: &str) -> Option<&str> {
    let rest = header.trim().strip_prefix("GlobalSection(")?;
    rest.split_once(')').map(|(name, _)| name)
}

/// GUID of the project a raw configuration line belongs to, upper-cased.
fn mapping_guid(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix('{')?;
    rest.split_once('}').map(|(guid, _)| guid.to_uppercase())
}

fn parse_error(line: usize, message: impl Into<String>) -> ProjgenError {
    ProjgenError::SolutionParse {
        line,
        message: message.into(),
    }
}

impl Solution {
    pub fn parse(text: &str) -> Result<Self, ProjgenError> {
        let mut solution = Solution::default();
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line));
        let mut in_header = true;

        while let Some((number, raw)) = lines.next() {
            let raw = if number == 1 {
                raw.trim_start_matches('\u{feff}')
            } else {
                raw
            };
            let trimmed = raw.trim();

            if let Some(caps) = project_line().captures(trimmed) {
                in_header = false;
                let mut project = SolutionProject {
                    type_guid: caps[1].to_string(),
                    name: caps[2].to_string(),
                    path: caps[3].to_string(),
                    guid: caps[4].to_string(),
                    lines: Vec::new(),
                };
                loop {
                    let Some((_, inner)) = lines.next() else {
                        return Err(parse_error(number, "project is missing EndProject"));
                    };
                    if inner.trim() == "EndProject" {
                        break;
                    }
                    project.lines.push(inner.to_string());
                }
                solution.projects.push(project);
            } else if trimmed == "Global" {
                in_header = false;
                solution.parse_global(&mut lines, number)?;
            } else if in_header {
                solution.header.push(raw.to_string());
            } else if !trimmed.is_empty() {
                return Err(parse_error(number, format!("unexpected line `{trimmed}`")));
            }
        }
        Ok(solution)
    }

    fn parse_global<'t>(
        &mut self,
        lines: &mut impl Iterator<Item = (usize, &'t str)>,
        start: usize,
    ) -> Result<(), ProjgenError> {
        loop {
            let Some((number, raw)) = lines.next() else {
                return Err(parse_error(start, "Global is missing EndGlobal"));
            };
            let trimmed = raw.trim();
            if trimmed == "EndGlobal" {
                return Ok(());
            }
            if trimmed.is_empty() {
                continue;
            }
            let Some(name) = section_name(trimmed) else {
                return Err(parse_error(number, format!("unexpected line `{trimmed}`")));
            };
            let name = name.to_string();
            let mut body = Vec::new();
            loop {
                let Some((_, inner)) = lines.next() else {
                    return Err(parse_error(number, "section is missing EndGlobalSection"));
                };
                if inner.trim() == "EndGlobalSection" {
                    break;
                }
                body.push(inner.to_string());
            }
            match name.as_str() {
                SOLUTION_CONFIGURATIONS => {
                    for line in body {
                        let entry = line.split_once('=').map_or(line.as_str(), |(key, _)| key);
                        let entry = entry.trim();
                        if !entry.is_empty() {
                            self.configurations.push(entry.to_string());
                        }
                    }
                }
                PROJECT_CONFIGURATIONS => {
                    for line in body {
                        self.push_mapping_line(line);
                    }
                }
                _ => self.sections.push(GlobalSection {
                    header: trimmed.to_string(),
                    lines: body,
                }),
            }
        }
    }

    fn push_mapping_line(&mut self, line: String) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        let parsed = trimmed.split_once('=').and_then(|(key, value)| {
            let key = key.trim().strip_prefix('{')?;
            let (guid, rest) = key.split_once("}.")?;
            Some((guid.to_string(), rest.to_string(), value.trim().to_string()))
        });
        let Some((guid, rest, value)) = parsed else {
            self.extra_mappings.push(line);
            return;
        };
        if let Some(configuration) = rest.strip_suffix(".ActiveCfg") {
            self.mappings.push(ProjectMapping {
                project: guid,
                configuration: configuration.to_string(),
                active: value,
                build: false,
            });
            return;
        }
        if let Some(configuration) = rest.strip_suffix(".Build.0") {
            let paired = self.mappings.iter_mut().rev().find(|mapping| {
                mapping.project.eq_ignore_ascii_case(&guid)
                    && mapping.configuration == configuration
                    && mapping.active == value
                    && !mapping.build
            });
            if let Some(mapping) = paired {
                mapping.build = true;
                return;
            }
        }
        self.extra_mappings.push(line);
    }

    /// Reads an existing solution file; `None` when there is none.
    pub fn load(path: &Path) -> Result<Option<Self>, ProjgenError> {
        if !path.is_file() {
            return Ok(None);
        }
        let text =
            fs::read_to_string(path).map_err(|err| ProjgenError::from(err).context(path.display()))?;
        Self::parse(&text)
            .map(Some)
            .map_err(|err| err.context(path.display()))
    }

    /// The solution for a graph: one C# project per module in `order`, one configuration per
    /// context and platform, and a build flag wherever the module supports that pair.
    pub fn generated(graph: &DependencyGraph, platforms: &PlatformTable, order: &[String]) -> Self {
        let pairs: Vec<(BuildContext, &str)> = BuildContext::ALL
            .into_iter()
            .flat_map(|context| platforms.iter().map(move |p| (context, p.name.as_str())))
            .collect();
        let configurations: Vec<String> = pairs
            .iter()
            .map(|(context, platform)| format!("{}|{platform}", context.configuration()))
            .collect();

        let mut solution = Solution {
            header: DEFAULT_HEADER.iter().map(|line| line.to_string()).collect(),
            configurations: configurations.clone(),
            ..Solution::default()
        };
        for module in order.iter().filter_map(|name| graph.module(name)) {
            let guid = module.id.to_string();
            solution.projects.push(SolutionProject {
                type_guid: CSHARP_PROJECT_TYPE.to_string(),
                name: module.name.clone(),
                path: format!("{}.csproj", module.name),
                guid: guid.clone(),
                lines: Vec::new(),
            });
            let node = ReferenceNode::Module(module);
            for ((context, platform), configuration) in pairs.iter().zip(&configurations) {
                solution.mappings.push(ProjectMapping {
                    project: guid.clone(),
                    configuration: configuration.clone(),
                    active: configuration.clone(),
                    build: node.platforms(*context).contains(*platform),
                });
            }
        }
        solution
    }

    /// Carries over from `existing` its header, configurations this solution does not declare,
    /// every project it does not generate (with their configuration lines) and its other global
    /// sections.
    pub fn merge_existing(mut self, existing: Solution) -> Solution {
        let generated_names: BTreeSet<&str> =
            self.projects.iter().map(|project| project.name.as_str()).collect();
        let generated_guids: BTreeSet<String> = self
            .projects
            .iter()
            .map(|project| project.guid.to_uppercase())
            .collect();
        let external: Vec<SolutionProject> = existing
            .projects
            .into_iter()
            .filter(|project| {
                !generated_names.contains(project.name.as_str())
                    && !generated_guids.contains(&project.guid.to_uppercase())
            })
            .collect();
        let external_guids: BTreeSet<String> = external
            .iter()
            .map(|project| project.guid.to_uppercase())
            .collect();

        if !existing.header.is_empty() {
            self.header = existing.header;
        }
        for configuration in existing.configurations {
            if !self.configurations.contains(&configuration) {
                self.configurations.push(configuration);
            }
        }
        self.mappings.extend(
            existing
                .mappings
                .into_iter()
                .filter(|mapping| external_guids.contains(&mapping.project.to_uppercase())),
        );
        self.extra_mappings.extend(
            existing
                .extra_mappings
                .into_iter()
                .filter(|line| mapping_guid(line).is_some_and(|guid| external_guids.contains(&guid))),
        );
        if !external.is_empty() {
            tracing::debug!(count = external.len(), "keeping projects added by hand");
        }
        self.projects.extend(external);
        self.sections = existing.sections;
        self
    }

    pub fn render(&self, template: &Template) -> Result<String, ProjgenError> {
        let mut replacements = Replacements::new();
        let root = replacements.root(template);

        for line in &self.header {
            let set = replacements.instance(template, root, "HEADER_LINE")?;
            replacements.assign(template, set, "TEXT", line)?;
        }
        for project in &self.projects {
            let set = replacements.instance(template, root, "PROJECT")?;
            replacements.assign(template, set, "TYPE_GUID", &project.type_guid)?;
            replacements.assign(template, set, "PROJECT_NAME", &project.name)?;
            replacements.assign(template, set, "PROJECT_PATH", &project.path)?;
            replacements.assign(template, set, "PROJECT_GUID", &project.guid)?;
            for line in &project.lines {
                let inner = replacements.instance(template, set, "PROJECT_LINE")?;
                replacements.assign(template, inner, "TEXT", line)?;
            }
        }
        for configuration in &self.configurations {
            let set = replacements.instance(template, root, "CONFIGURATION")?;
            replacements.assign(template, set, "CONFIGURATION", configuration)?;
        }
        for mapping in &self.mappings {
            let set = replacements.instance(template, root, "PROJECT_CONFIGURATION")?;
            replacements.assign(template, set, "PROJECT_GUID", &mapping.project)?;
            replacements.assign(template, set, "CONFIGURATION", &mapping.configuration)?;
            replacements.assign(template, set, "ACTIVE", &mapping.active)?;
            if mapping.build {
                let build = replacements.instance(template, set, "BUILD_ENABLED")?;
                replacements.assign(template, build, "PROJECT_GUID", &mapping.project)?;
                replacements.assign(template, build, "CONFIGURATION", &mapping.configuration)?;
                replacements.assign(template, build, "ACTIVE", &mapping.active)?;
            }
        }
        for line in &self.extra_mappings {
            let set = replacements.instance(template, root, "EXTERNAL_MAPPING")?;
            replacements.assign(template, set, "TEXT", line)?;
        }
        for section in &self.sections {
            let lines = std::iter::once(format!("\t{}", section.header))
                .chain(section.lines.iter().cloned())
                .chain(std::iter::once("\tEndGlobalSection".to_string()));
            for line in lines {
                let set = replacements.instance(template, root, "GLOBAL_LINE")?;
                replacements.assign(template, set, "TEXT", line)?;
            }
        }
        template.render(&replacements, root)
    }

    /// Renders with the embedded solution template.
    pub fn to_text(&self) -> Result<String, ProjgenError> {
        let (template, _) = TemplateCatalog::embedded_only().load(TemplateShape::Solution)?;
        self.render(&template)
    }

    pub fn project(&self, name: &str) -> Option<&SolutionProject> {
        self.projects.iter().find(|project| project.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::descriptor::{HostModule, ModuleDescriptor};
    use crate::order::topological_order;
    use crate::platform::tests::platform;

    const EXISTING: &str = "\u{feff}
Microsoft Visual Studio Solution File, Format Version 12.00
# Visual Studio Version 16
Project(\"{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}\") = \"Core\", \"Core.csproj\", \"{11111111-1111-1111-1111-111111111111}\"
EndProject
Project(\"{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}\") = \"Tools.Tests\", \"..\\Tests\\Tools.Tests.csproj\", \"{22222222-2222-2222-2222-222222222222}\"
\tProjectSection(ProjectDependencies) = postProject
\tEndProjectSection
EndProject
Global
\tGlobalSection(SolutionConfigurationPlatforms) = preSolution
\t\tDebug|Any CPU = Debug|Any CPU
\tEndGlobalSection
\tGlobalSection(ProjectConfigurationPlatforms) = postSolution
\t\t{11111111-1111-1111-1111-111111111111}.Debug|Any CPU.ActiveCfg = Debug|Any CPU
\t\t{22222222-2222-2222-2222-222222222222}.Debug|Any CPU.ActiveCfg = Debug|Any CPU
\t\t{22222222-2222-2222-2222-222222222222}.Debug|Any CPU.Build.0 = Debug|Any CPU
\t\t{22222222-2222-2222-2222-222222222222}.Debug|Any CPU.Deploy.0 = Debug|Any CPU
\tEndGlobalSection
\tGlobalSection(SolutionProperties) = preSolution
\t\tHideSolutionNode = FALSE
\tEndGlobalSection
EndGlobal
";

    #[test]
    fn parse_reads_projects_mappings_and_sections() {
        let solution = Solution::parse(EXISTING).unwrap();
        assert_eq!(solution.header.len(), 3);
        assert_eq!(solution.header[0], "");
        assert_eq!(solution.projects.len(), 2);
        let tests = solution.project("Tools.Tests").unwrap();
        assert_eq!(tests.path, "..\\Tests\\Tools.Tests.csproj");
        assert_eq!(tests.lines.len(), 2);
        assert_eq!(solution.configurations, vec!["Debug|Any CPU"]);
        assert_eq!(solution.mappings.len(), 2);
        assert!(solution.mappings[1].build);
        assert_eq!(solution.extra_mappings.len(), 1);
        assert_eq!(solution.sections.len(), 1);
        assert_eq!(solution.sections[0].name(), "SolutionProperties");
    }

    #[test]
    fn rendered_text_parses_back_to_the_same_model() {
        let solution = Solution::parse(EXISTING).unwrap();
        let text = solution.to_text().unwrap();
        let reparsed = Solution::parse(&text).unwrap();
        assert_eq!(reparsed, solution);
        assert_eq!(reparsed.to_text().unwrap(), text);
    }

    #[test]
    fn parse_rejects_stray_lines_and_unterminated_projects() {
        let err = Solution::parse("Global\nEndGlobal\nstray\n").expect_err("stray");
        assert!(matches!(err, ProjgenError::SolutionParse { line: 3, .. }));

        let text = "Project(\"{A}\") = \"X\", \"X.csproj\", \"{B}\"\n";
        let err = Solution::parse(text).expect_err("unterminated");
        assert!(matches!(err, ProjgenError::SolutionParse { line: 1, .. }));
    }

    #[test]
    fn generated_solution_merges_with_hand_added_projects() {
        let table = PlatformTable::new(vec![platform("Win", &[]), platform("Mac", &[])]).unwrap();
        let mut core = ModuleDescriptor::new("Core");
        core.include_platforms = vec!["Win".into()];
        let modules = vec![HostModule {
            name: "Core".into(),
            descriptor: Some(core),
            sources: Vec::new(),
        }];
        let graph = GraphBuilder::new(&table).build(&modules).unwrap().graph;
        let order = topological_order(&graph).unwrap();

        let generated = Solution::generated(&graph, &table, &order);
        assert_eq!(
            generated.configurations,
            vec!["Editor|Mac", "Editor|Win", "Player|Mac", "Player|Win"]
        );
        let built: Vec<&str> = generated
            .mappings
            .iter()
            .filter(|mapping| mapping.build)
            .map(|mapping| mapping.configuration.as_str())
            .collect();
        assert_eq!(built, vec!["Editor|Win", "Player|Win"]);

        let merged = generated.merge_existing(Solution::parse(EXISTING).unwrap());
        let names: Vec<&str> = merged.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Core", "Tools.Tests"]);
        assert_eq!(merged.header[2], "# Visual Studio Version 16");
        assert_eq!(
            merged.configurations,
            vec![
                "Editor|Mac",
                "Editor|Win",
                "Player|Mac",
                "Player|Win",
                "Debug|Any CPU"
            ]
        );
        assert!(
            merged
                .mappings
                .iter()
                .all(|mapping| mapping.project != "11111111-1111-1111-1111-111111111111")
        );
        assert_eq!(merged.extra_mappings.len(), 1);
        assert_eq!(merged.sections.len(), 1);
    }
}
