//! Hierarchical templates.
//!
//! A template file is parsed once into an arena of parts. Each part owns an ordered list of
//! segments: literal text, token slots, attribute literals with embedded tokens, and repeatable
//! child parts. Rendering pairs the arena with a [`Replacements`] tree holding one set per
//! rendered instance of a part, so a child part registered N times renders N times.
//!
//! Two syntaxes share this model: [`TemplateBackend::Markup`] for XML-like files and
//! [`TemplateBackend::LineOriented`] for solution files.

mod lines;
mod markup;
mod replacement;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ProjgenError;

pub use replacement::{Replacements, SetId};

/// Delimiter wrapped around token names embedded in markup attribute values.
pub const ATTRIBUTE_DELIMITER: &str = "$$";

/// Arena index of a parsed template part. The root part is always index zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartId(usize);

/// Arena index of a token. One token exists per name per part, shared by every occurrence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId(usize);

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TemplateBackend {
    Markup,
    LineOriented,
}

impl TemplateBackend {
    /// Solution files use the line-oriented syntax; every other shape is markup.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("sln") => Self::LineOriented,
            _ => Self::Markup,
        }
    }
}

/// Value assigned to a token inside one replacement set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenValue {
    Scalar(String),
    Sequence {
        items: Vec<String>,
        delimiter: String,
    },
    /// Rewrites the original literal around an attribute-embedded token by substring.
    Rewrite { find: String, replace: String },
}

impl TokenValue {
    pub fn sequence<I, S>(items: I, delimiter: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TokenValue::Sequence {
            items: items.into_iter().map(Into::into).collect(),
            delimiter: delimiter.to_string(),
        }
    }

    fn text(&self) -> String {
        match self {
            TokenValue::Scalar(value) => value.clone(),
            TokenValue::Sequence { items, delimiter } => items.join(delimiter),
            TokenValue::Rewrite { replace, .. } => replace.clone(),
        }
    }
}

impl From<String> for TokenValue {
    fn from(value: String) -> Self {
        TokenValue::Scalar(value)
    }
}

impl From<&str> for TokenValue {
    fn from(value: &str) -> Self {
        TokenValue::Scalar(value.to_string())
    }
}

impl From<&String> for TokenValue {
    fn from(value: &String) -> Self {
        TokenValue::Scalar(value.clone())
    }
}

/// Marker vocabulary shared by both syntaxes, e.g. `#NAME_TOKEN` or `#NAME_TEMPLATE_START`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Marker {
    Token(String),
    Inline(String),
    BlockStart(String),
    BlockEnd(String),
}

impl Marker {
    pub(crate) fn parse(text: &str) -> Option<Self> {
        let body = text.strip_prefix('#')?;
        let marker = if let Some(name) = body.strip_suffix("_TEMPLATE_START") {
            Marker::BlockStart(name.to_string())
        } else if let Some(name) = body.strip_suffix("_TEMPLATE_END") {
            Marker::BlockEnd(name.to_string())
        } else if let Some(name) = body.strip_suffix("_TEMPLATE") {
            Marker::Inline(name.to_string())
        } else if let Some(name) = body.strip_suffix("_TOKEN") {
            Marker::Token(name.to_string())
        } else {
            return None;
        };
        is_marker_name(marker.name()).then_some(marker)
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            Marker::Token(name)
            | Marker::Inline(name)
            | Marker::BlockStart(name)
            | Marker::BlockEnd(name) => name,
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Marker::Token(name) => format!("#{name}_TOKEN"),
            Marker::Inline(name) => format!("#{name}_TEMPLATE"),
            Marker::BlockStart(name) => format!("#{name}_TEMPLATE_START"),
            Marker::BlockEnd(name) => format!("#{name}_TEMPLATE_END"),
        }
    }
}

pub(crate) fn is_marker_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_')
}

#[derive(Clone, Debug)]
enum Segment {
    Literal(String),
    Token(TokenId),
    Attribute {
        literal: String,
        tokens: Vec<TokenId>,
    },
    Part(PartId),
}

#[derive(Clone, Debug)]
struct PartData {
    name: String,
    parent: Option<PartId>,
    segments: Vec<Segment>,
    tokens: BTreeMap<String, TokenId>,
    children: BTreeMap<String, PartId>,
}

#[derive(Clone, Debug)]
struct TokenData {
    name: String,
    part: PartId,
    occurrences: usize,
    required: bool,
}

/// A parsed template: an immutable part tree reused across any number of renders.
#[derive(Clone, Debug)]
pub struct Template {
    name: String,
    backend: TemplateBackend,
    parts: Vec<PartData>,
    tokens: Vec<TokenData>,
}

impl Template {
    pub fn parse(
        name: impl Into<String>,
        backend: TemplateBackend,
        source: &str,
    ) -> Result<Self, ProjgenError> {
        let mut builder = TemplateBuilder::new(name.into(), backend);
        match backend {
            TemplateBackend::Markup => markup::parse(&mut builder, source)?,
            TemplateBackend::LineOriented => lines::parse(&mut builder, source)?,
        }
        Ok(builder.finish())
    }

    /// Reads and parses a template file, choosing the syntax from its extension.
    pub fn load(path: &Path) -> Result<Self, ProjgenError> {
        let source = fs::read_to_string(path)
            .map_err(|err| ProjgenError::from(err).context(path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(name, TemplateBackend::for_path(path), &source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> TemplateBackend {
        self.backend
    }

    pub fn root(&self) -> PartId {
        PartId(0)
    }

    pub fn part_name(&self, part: PartId) -> &str {
        &self.parts[part.0].name
    }

    pub fn parent(&self, part: PartId) -> Option<PartId> {
        self.parts[part.0].parent
    }

    /// Resolves a named sub-template declared directly inside `part`.
    pub fn child(&self, part: PartId, name: &str) -> Result<PartId, ProjgenError> {
        self.parts[part.0]
            .children
            .get(name)
            .copied()
            .ok_or_else(|| ProjgenError::UnknownTemplate {
                template: self.name.clone(),
                name: self.qualified(part, name),
            })
    }

    /// Resolves a token declared directly inside `part`.
    pub fn token(&self, part: PartId, name: &str) -> Result<TokenId, ProjgenError> {
        self.parts[part.0]
            .tokens
            .get(name)
            .copied()
            .ok_or_else(|| ProjgenError::UnknownToken {
                template: self.name.clone(),
                token: self.qualified(part, name),
            })
    }

    pub fn has_token(&self, part: PartId, name: &str) -> bool {
        self.parts[part.0].tokens.contains_key(name)
    }

    pub fn token_names(&self, part: PartId) -> impl Iterator<Item = &str> {
        self.parts[part.0].tokens.keys().map(String::as_str)
    }

    pub fn child_names(&self, part: PartId) -> impl Iterator<Item = &str> {
        self.parts[part.0].children.keys().map(String::as_str)
    }

    pub fn token_part(&self, token: TokenId) -> PartId {
        self.tokens[token.0].part
    }

    /// Number of places the token is substituted when a value is assigned once.
    pub fn occurrences(&self, token: TokenId) -> usize {
        self.tokens[token.0].occurrences
    }

    pub fn is_required(&self, token: TokenId) -> bool {
        self.tokens[token.0].required
    }

    /// Lets the token render as nothing when no value is assigned.
    pub fn set_optional(&mut self, part: PartId, name: &str) -> Result<(), ProjgenError> {
        let token = self.token(part, name)?;
        self.tokens[token.0].required = false;
        Ok(())
    }

    /// Marks every token called `name`, in any part, optional. Returns how many were found.
    pub fn set_optional_everywhere(&mut self, name: &str) -> usize {
        let mut count = 0;
        for token in self.tokens.iter_mut().filter(|token| token.name == name) {
            token.required = false;
            count += 1;
        }
        count
    }

    /// Renders the subtree owned by `set` into a fresh string. Nothing is returned on error, so a
    /// failed render never yields partially substituted output.
    pub fn render(&self, replacements: &Replacements, set: SetId) -> Result<String, ProjgenError> {
        let mut out = String::new();
        self.render_part(replacements, set, &mut out)?;
        Ok(out)
    }

    fn render_part(
        &self,
        replacements: &Replacements,
        set: SetId,
        out: &mut String,
    ) -> Result<(), ProjgenError> {
        let part = &self.parts[replacements.part(set).0];
        for segment in &part.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Token(token) => match replacements.value(set, *token) {
                    Some(value) => out.push_str(&value.text()),
                    None => self.check_unassigned(*token)?,
                },
                Segment::Attribute { literal, tokens } => {
                    let rewritten = self.render_attribute(replacements, set, literal, tokens)?;
                    out.push_str(&rewritten);
                }
                Segment::Part(child) => {
                    for instance in replacements.instances(set, *child) {
                        self.render_part(replacements, *instance, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Scans the original literal once. Literal runs get the `Rewrite` edits, marker slots get
    /// token values, and no token's output is scanned again.
    fn render_attribute(
        &self,
        replacements: &Replacements,
        set: SetId,
        literal: &str,
        tokens: &[TokenId],
    ) -> Result<String, ProjgenError> {
        let mut rewrites = Vec::new();
        for token in tokens {
            match replacements.value(set, *token) {
                Some(TokenValue::Rewrite { find, replace }) if !find.is_empty() => {
                    rewrites.push((find.as_str(), replace.as_str()))
                }
                Some(_) => {}
                None => self.check_unassigned(*token)?,
            }
        }
        let rewrite = |run: &str| {
            rewrites
                .iter()
                .fold(run.to_string(), |text, &(find, replace)| text.replace(find, replace))
        };

        let mut out = String::new();
        let mut rest = literal;
        while let Some((before, token, after)) = self.next_attribute_marker(rest, tokens) {
            out.push_str(&rewrite(before));
            match replacements.value(set, token) {
                Some(TokenValue::Rewrite { .. }) | None => {}
                Some(value) => out.push_str(&value.text()),
            }
            rest = after;
        }
        out.push_str(&rewrite(rest));
        Ok(out)
    }

    /// Splits `text` around the first `$$NAME$$` marker naming one of `tokens`.
    fn next_attribute_marker<'t>(
        &self,
        text: &'t str,
        tokens: &[TokenId],
    ) -> Option<(&'t str, TokenId, &'t str)> {
        let delimiter = ATTRIBUTE_DELIMITER.len();
        let mut offset = 0;
        while let Some(found) = text[offset..].find(ATTRIBUTE_DELIMITER) {
            let open = offset + found;
            let name_start = open + delimiter;
            let close = name_start + text[name_start..].find(ATTRIBUTE_DELIMITER)?;
            let name = &text[name_start..close];
            let matched = tokens
                .iter()
                .find(|token| self.tokens[token.0].name == name);
            if let Some(token) = matched {
                return Some((&text[..open], *token, &text[close + delimiter..]));
            }
            offset = name_start;
        }
        None
    }

    fn check_unassigned(&self, token: TokenId) -> Result<(), ProjgenError> {
        let data = &self.tokens[token.0];
        if data.required {
            Err(ProjgenError::MissingToken {
                template: self.name.clone(),
                token: self.qualified(data.part, &data.name),
            })
        } else {
            Ok(())
        }
    }

    /// `NAME` for root tokens, `PARENT/CHILD.NAME` for tokens nested in sub-templates.
    fn qualified(&self, part: PartId, name: &str) -> String {
        let mut path = Vec::new();
        let mut cursor = Some(part);
        while let Some(current) = cursor {
            let data = &self.parts[current.0];
            if data.parent.is_some() {
                path.push(data.name.as_str());
            }
            cursor = data.parent;
        }
        if path.is_empty() {
            return name.to_string();
        }
        path.reverse();
        format!("{}.{name}", path.join("/"))
    }
}

/// Incrementally assembles a [`Template`] arena for the syntax parsers.
pub(crate) struct TemplateBuilder {
    template: Template,
}

impl TemplateBuilder {
    fn new(name: String, backend: TemplateBackend) -> Self {
        let root = PartData {
            name: String::new(),
            parent: None,
            segments: Vec::new(),
            tokens: BTreeMap::new(),
            children: BTreeMap::new(),
        };
        Self {
            template: Template {
                name,
                backend,
                parts: vec![root],
                tokens: Vec::new(),
            },
        }
    }

    pub(crate) fn root(&self) -> PartId {
        PartId(0)
    }

    pub(crate) fn structure_error(
        &self,
        marker: impl Into<String>,
        message: impl Into<String>,
    ) -> ProjgenError {
        ProjgenError::TemplateStructure {
            template: self.template.name.clone(),
            marker: marker.into(),
            message: message.into(),
        }
    }

    /// Declares a sub-template at the current position of `parent`.
    pub(crate) fn add_part(
        &mut self,
        parent: PartId,
        marker: &Marker,
    ) -> Result<PartId, ProjgenError> {
        let name = marker.name().to_string();
        if self.template.parts[parent.0].children.contains_key(&name) {
            return Err(self.structure_error(
                marker.describe(),
                "sub-template is declared twice in the same part",
            ));
        }
        let id = PartId(self.template.parts.len());
        self.template.parts.push(PartData {
            name: name.clone(),
            parent: Some(parent),
            segments: Vec::new(),
            tokens: BTreeMap::new(),
            children: BTreeMap::new(),
        });
        let parent_data = &mut self.template.parts[parent.0];
        parent_data.children.insert(name, id);
        parent_data.segments.push(Segment::Part(id));
        Ok(id)
    }

    pub(crate) fn push_literal(&mut self, part: PartId, text: &str) {
        if text.is_empty() {
            return;
        }
        let segments = &mut self.template.parts[part.0].segments;
        if let Some(Segment::Literal(last)) = segments.last_mut() {
            last.push_str(text);
        } else {
            segments.push(Segment::Literal(text.to_string()));
        }
    }

    pub(crate) fn push_token(&mut self, part: PartId, name: &str) {
        let token = self.occurrence(part, name);
        self.template.parts[part.0]
            .segments
            .push(Segment::Token(token));
    }

    pub(crate) fn push_attribute(&mut self, part: PartId, literal: &str, names: &[String]) {
        let mut tokens: Vec<TokenId> = Vec::new();
        for name in names {
            let token = self.occurrence(part, name);
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
        self.template.parts[part.0]
            .segments
            .push(Segment::Attribute {
                literal: literal.to_string(),
                tokens,
            });
    }

    fn occurrence(&mut self, part: PartId, name: &str) -> TokenId {
        if let Some(existing) = self.template.parts[part.0].tokens.get(name).copied() {
            self.template.tokens[existing.0].occurrences += 1;
            return existing;
        }
        let id = TokenId(self.template.tokens.len());
        self.template.tokens.push(TokenData {
            name: name.to_string(),
            part,
            occurrences: 1,
            required: true,
        });
        self.template.parts[part.0]
            .tokens
            .insert(name.to_string(), id);
        id
    }

    fn finish(self) -> Template {
        self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPILE_ITEMS: &str = r#"<Project>
  <ItemGroup>
    <!--#COMPILE_TEMPLATE-->
    <Compile Include="$$SOURCE$$" />
  </ItemGroup>
</Project>
"#;

    fn render_sources(sources: &[&str]) -> String {
        let template = Template::parse("items.props", TemplateBackend::Markup, COMPILE_ITEMS)
            .expect("parse");
        let mut replacements = Replacements::new();
        let root = replacements.root(&template);
        for source in sources {
            let item = replacements.instance(&template, root, "COMPILE").unwrap();
            replacements
                .assign(&template, item, "SOURCE", *source)
                .unwrap();
        }
        template.render(&replacements, root).expect("render")
    }

    #[test]
    fn marker_parse_recognises_vocabulary() {
        assert_eq!(
            Marker::parse("#PROJECT_NAME_TOKEN"),
            Some(Marker::Token("PROJECT_NAME".into()))
        );
        assert_eq!(
            Marker::parse("#ITEM_TEMPLATE"),
            Some(Marker::Inline("ITEM".into()))
        );
        assert_eq!(
            Marker::parse("#ITEM_TEMPLATE_START"),
            Some(Marker::BlockStart("ITEM".into()))
        );
        assert_eq!(
            Marker::parse("#ITEM_TEMPLATE_END"),
            Some(Marker::BlockEnd("ITEM".into()))
        );
        assert_eq!(Marker::parse("# Visual Studio Version 17"), None);
        assert_eq!(Marker::parse("#_TOKEN"), None);
        assert_eq!(Marker::parse("#lower_TOKEN"), None);
    }

    #[test]
    fn repeated_sub_template_renders_once_per_registered_set() {
        let none = render_sources(&[]);
        assert_eq!(none, "<Project>\n  <ItemGroup>\n  </ItemGroup>\n</Project>\n");

        let one = render_sources(&["A.cs"]);
        assert_eq!(one.matches("<Compile ").count(), 1);

        let three = render_sources(&["B.cs", "A.cs", "C.cs"]);
        assert_eq!(
            three,
            "<Project>\n  <ItemGroup>\n    <Compile Include=\"B.cs\" />\n    <Compile Include=\"A.cs\" />\n    <Compile Include=\"C.cs\" />\n  </ItemGroup>\n</Project>\n"
        );
    }

    #[test]
    fn token_fans_out_to_every_occurrence() {
        let source = "<A><!--#NAME_TOKEN--></A>\n<B><!--#NAME_TOKEN--></B>\n<C Label=\"x-$$NAME$$-y\" />\n";
        let template = Template::parse("fan.xml", TemplateBackend::Markup, source).unwrap();
        let token = template.token(template.root(), "NAME").unwrap();
        assert_eq!(template.occurrences(token), 3);

        let mut replacements = Replacements::new();
        let root = replacements.root(&template);
        replacements
            .assign(&template, root, "NAME", "Core")
            .unwrap();
        let rendered = template.render(&replacements, root).unwrap();
        assert_eq!(
            rendered,
            "<A>Core</A>\n<B>Core</B>\n<C Label=\"x-Core-y\" />\n"
        );
    }

    #[test]
    fn missing_required_token_names_the_token() {
        let template = Template::parse(
            "solution.sln",
            TemplateBackend::LineOriented,
            "#ROW_TEMPLATE\nrow #VALUE_TOKEN\n",
        )
        .unwrap();
        let mut replacements = Replacements::new();
        let root = replacements.root(&template);
        replacements.instance(&template, root, "ROW").unwrap();

        let err = template.render(&replacements, root).expect_err("missing");
        match err {
            ProjgenError::MissingToken { template, token } => {
                assert_eq!(template, "solution.sln");
                assert_eq!(token, "ROW.VALUE");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn optional_token_renders_empty() {
        let mut template = Template::parse(
            "ns.props",
            TemplateBackend::Markup,
            "<RootNamespace><!--#ROOT_NAMESPACE_TOKEN--></RootNamespace>",
        )
        .unwrap();
        let root_part = template.root();
        template.set_optional(root_part, "ROOT_NAMESPACE").unwrap();

        let mut replacements = Replacements::new();
        let root = replacements.root(&template);
        assert_eq!(
            template.render(&replacements, root).unwrap(),
            "<RootNamespace></RootNamespace>"
        );
    }

    #[test]
    fn unknown_token_assignment_fails_fast() {
        let template =
            Template::parse("a.xml", TemplateBackend::Markup, "<A><!--#X_TOKEN--></A>").unwrap();
        let mut replacements = Replacements::new();
        let root = replacements.root(&template);
        let err = replacements
            .assign(&template, root, "Y", "value")
            .expect_err("unknown");
        assert!(matches!(err, ProjgenError::UnknownToken { token, .. } if token == "Y"));

        let err = replacements
            .instance(&template, root, "NOPE")
            .expect_err("unknown part");
        assert!(matches!(err, ProjgenError::UnknownTemplate { name, .. } if name == "NOPE"));
    }

    #[test]
    fn attribute_tokens_substitute_into_original_literal() {
        let template = Template::parse(
            "hint.props",
            TemplateBackend::Markup,
            r#"<Reference Include="$$DIR$$/lib/$$NAME$$.dll" Condition="'$(X)' == '$$NAME$$'" />"#,
        )
        .unwrap();
        let mut replacements = Replacements::new();
        let root = replacements.root(&template);
        replacements
            .assign(&template, root, "DIR", "Assets/Plugins")
            .unwrap();
        replacements
            .assign(&template, root, "NAME", "Newtonsoft.Json")
            .unwrap();
        assert_eq!(
            template.render(&replacements, root).unwrap(),
            r#"<Reference Include="Assets/Plugins/lib/Newtonsoft.Json.dll" Condition="'$(X)' == 'Newtonsoft.Json'" />"#
        );
    }

    #[test]
    fn attribute_token_values_are_not_rescanned() {
        let template =
            Template::parse("r.props", TemplateBackend::Markup, r#"<R A="$$X$$|$$Y$$" />"#)
                .unwrap();
        let mut replacements = Replacements::new();
        let root = replacements.root(&template);
        replacements.assign(&template, root, "X", "$$Y$$").unwrap();
        replacements.assign(&template, root, "Y", "y").unwrap();
        assert_eq!(
            template.render(&replacements, root).unwrap(),
            r#"<R A="$$Y$$|y" />"#
        );
    }

    #[test]
    fn rewrite_value_edits_existing_attribute_text() {
        let template = Template::parse(
            "rewrite.props",
            TemplateBackend::Markup,
            r#"<Import Project="Default.props$$SUFFIX$$" />"#,
        )
        .unwrap();
        let mut replacements = Replacements::new();
        let root = replacements.root(&template);
        replacements
            .assign(
                &template,
                root,
                "SUFFIX",
                TokenValue::Rewrite {
                    find: "Default".into(),
                    replace: "Custom".into(),
                },
            )
            .unwrap();
        assert_eq!(
            template.render(&replacements, root).unwrap(),
            r#"<Import Project="Custom.props" />"#
        );
    }

    #[test]
    fn sequence_values_join_with_delimiter() {
        let template = Template::parse(
            "defines.props",
            TemplateBackend::Markup,
            "<DefineConstants><!--#DEFINES_TOKEN--></DefineConstants>",
        )
        .unwrap();
        let mut replacements = Replacements::new();
        let root = replacements.root(&template);
        replacements
            .assign(
                &template,
                root,
                "DEFINES",
                TokenValue::sequence(["A", "B", "C"], ";"),
            )
            .unwrap();
        assert_eq!(
            template.render(&replacements, root).unwrap(),
            "<DefineConstants>A;B;C</DefineConstants>"
        );
    }
}
