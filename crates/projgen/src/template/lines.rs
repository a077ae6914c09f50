//! Line-oriented syntax used by solution files.
//!
//! A line whose trimmed text is `#NAME_TEMPLATE` repeats the following line. Lines
//! `#NAME_TEMPLATE_START` and `#NAME_TEMPLATE_END` bracket a repeated block. Tokens appear inline
//! as `#NAME_TOKEN`. Marker lines never reach the output.

use std::sync::OnceLock;

use regex::Regex;

use super::{Marker, PartId, TemplateBuilder};
use crate::error::ProjgenError;

pub(super) fn parse(builder: &mut TemplateBuilder, source: &str) -> Result<(), ProjgenError> {
    let lines: Vec<&str> = source.split_inclusive('\n').collect();
    let root = builder.root();
    build(builder, root, &lines, 0, lines.len())
}

fn build(
    builder: &mut TemplateBuilder,
    part: PartId,
    lines: &[&str],
    lo: usize,
    hi: usize,
) -> Result<(), ProjgenError> {
    let mut idx = lo;
    while idx < hi {
        match sentinel(lines[idx]) {
            None => {
                push_line(builder, part, lines[idx]);
                idx += 1;
            }
            Some(marker @ Marker::Inline(_)) => {
                if idx + 1 >= hi || sentinel(lines[idx + 1]).is_some() {
                    return Err(builder.structure_error(
                        marker.describe(),
                        "no content line follows the inline marker",
                    ));
                }
                let child = builder.add_part(part, &marker)?;
                push_line(builder, child, lines[idx + 1]);
                idx += 2;
            }
            Some(marker @ Marker::BlockStart(_)) => {
                let close = block_end(builder, &marker, lines, idx, hi)?;
                if close == idx + 1 {
                    return Err(builder.structure_error(marker.describe(), "block is empty"));
                }
                let child = builder.add_part(part, &marker)?;
                build(builder, child, lines, idx + 1, close)?;
                idx = close + 1;
            }
            Some(marker) => {
                return Err(builder.structure_error(
                    marker.describe(),
                    "end marker without a start marker",
                ));
            }
        }
    }
    Ok(())
}

/// Template markers that occupy a whole line. Token markers are inline content, not sentinels.
fn sentinel(line: &str) -> Option<Marker> {
    match Marker::parse(line.trim()) {
        Some(Marker::Token(_)) | None => None,
        marker => marker,
    }
}

fn block_end(
    builder: &TemplateBuilder,
    marker: &Marker,
    lines: &[&str],
    idx: usize,
    hi: usize,
) -> Result<usize, ProjgenError> {
    let mut pending: Vec<String> = Vec::new();
    for (offset, line) in lines[idx + 1..hi].iter().enumerate() {
        match sentinel(line) {
            Some(Marker::BlockStart(name)) => pending.push(name),
            Some(Marker::BlockEnd(name)) => match pending.pop() {
                Some(open) if open == name => {}
                None if name == marker.name() => return Ok(idx + 1 + offset),
                Some(open) => {
                    return Err(builder.structure_error(
                        format!("#{name}_TEMPLATE_END"),
                        format!("end marker does not match #{open}_TEMPLATE_START"),
                    ));
                }
                None => {
                    return Err(builder.structure_error(
                        format!("#{name}_TEMPLATE_END"),
                        format!("end marker does not match {}", marker.describe()),
                    ));
                }
            },
            _ => {}
        }
    }
    Err(builder.structure_error(marker.describe(), "block has no end marker"))
}

fn push_line(builder: &mut TemplateBuilder, part: PartId, line: &str) {
    static INLINE_TOKEN: OnceLock<Regex> = OnceLock::new();
    let re = INLINE_TOKEN
        .get_or_init(|| Regex::new(r"#([A-Z0-9_]+?)_TOKEN\b").expect("valid inline token regex"));
    let mut cursor = 0;
    for caps in re.captures_iter(line) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        builder.push_literal(part, &line[cursor..whole.start()]);
        builder.push_token(part, name.as_str());
        cursor = whole.end();
    }
    builder.push_literal(part, &line[cursor..]);
}

#[cfg(test)]
mod tests {
    use crate::error::ProjgenError;
    use crate::template::{Replacements, Template, TemplateBackend, TokenValue};

    const SOLUTION: &str = "Microsoft Visual Studio Solution File, Format Version 12.00\n#PROJECT_TEMPLATE_START\nProject(\"{#TYPE_TOKEN}\") = \"#NAME_TOKEN\", \"#NAME_TOKEN.csproj\", \"{#GUID_TOKEN}\"\n#DEPENDENCY_TEMPLATE\n\t\t#DEPENDENCY_TOKEN\nEndProject\n#PROJECT_TEMPLATE_END\nGlobal\nEndGlobal\n";

    #[test]
    fn blocks_and_inline_lines_repeat_per_instance() {
        let template =
            Template::parse("solution.sln", TemplateBackend::LineOriented, SOLUTION).unwrap();
        let project = template.child(template.root(), "PROJECT").unwrap();
        let name = template.token(project, "NAME").unwrap();
        assert_eq!(template.occurrences(name), 2);

        let mut replacements = Replacements::new();
        let root = replacements.root(&template);
        for (project_name, deps) in [("Core", vec![]), ("App", vec!["Core", "Util"])] {
            let set = replacements.instance(&template, root, "PROJECT").unwrap();
            replacements.assign(&template, set, "TYPE", "T").unwrap();
            replacements
                .assign(&template, set, "NAME", project_name)
                .unwrap();
            replacements.assign(&template, set, "GUID", "G").unwrap();
            for dep in deps {
                let line = replacements
                    .instance(&template, set, "DEPENDENCY")
                    .unwrap();
                replacements
                    .assign(&template, line, "DEPENDENCY", TokenValue::from(dep))
                    .unwrap();
            }
        }

        let rendered = template.render(&replacements, root).unwrap();
        assert_eq!(
            rendered,
            "Microsoft Visual Studio Solution File, Format Version 12.00\nProject(\"{T}\") = \"Core\", \"Core.csproj\", \"{G}\"\nEndProject\nProject(\"{T}\") = \"App\", \"App.csproj\", \"{G}\"\n\t\tCore\n\t\tUtil\nEndProject\nGlobal\nEndGlobal\n"
        );
    }

    #[test]
    fn comment_lines_are_not_markers() {
        let source = "# Visual Studio Version 17\n#NOTE: keep\n";
        let template =
            Template::parse("solution.sln", TemplateBackend::LineOriented, source).unwrap();
        let mut replacements = Replacements::new();
        let root = replacements.root(&template);
        assert_eq!(template.render(&replacements, root).unwrap(), source);
    }

    #[test]
    fn structural_errors_are_reported() {
        for (source, expected) in [
            ("#A_TEMPLATE_START\nline\n", "no end marker"),
            ("#A_TEMPLATE_START\n#A_TEMPLATE_END\n", "empty"),
            ("line\n#A_TEMPLATE_END\n", "without a start"),
            ("#A_TEMPLATE\n", "no content line"),
            ("#A_TEMPLATE_START\n#B_TEMPLATE_START\nx\n#A_TEMPLATE_END\n", "does not match"),
        ] {
            let err = Template::parse("solution.sln", TemplateBackend::LineOriented, source)
                .expect_err(source);
            match err {
                ProjgenError::TemplateStructure { message, .. } => {
                    assert!(message.contains(expected), "{source:?}: {message}")
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }
}
