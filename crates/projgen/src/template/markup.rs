//! Markup syntax.
//!
//! Markers live in comments (`<!--#NAME_TOKEN-->`, `<!--#NAME_TEMPLATE-->`,
//! `<!--#NAME_TEMPLATE_START-->` / `<!--#NAME_TEMPLATE_END-->`). Tokens embedded in attribute
//! values use `$$NAME$$`. A template marker alone on its line consumes that whole line, and a
//! repeated element carries its indentation and trailing newline, so rendered output keeps the
//! layout of the source.

use std::sync::OnceLock;

use regex::Regex;

use super::{Marker, PartId, TemplateBuilder};
use crate::error::ProjgenError;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Kind {
    Text,
    Comment,
    Instruction,
    CData,
    Declaration,
    Start { name: String, self_closing: bool },
    End { name: String },
}

#[derive(Clone, Debug)]
struct Item {
    kind: Kind,
    start: usize,
    end: usize,
}

pub(super) fn parse(builder: &mut TemplateBuilder, source: &str) -> Result<(), ProjgenError> {
    let items = lex(builder, source)?;
    let closing = match_elements(builder, source, &items)?;
    let root = builder.root();
    let mut parser = Parser {
        builder,
        source,
        items: &items,
        closing: &closing,
    };
    parser.build(root, 0, items.len(), 0, source.len())
}

fn lex(builder: &TemplateBuilder, source: &str) -> Result<Vec<Item>, ProjgenError> {
    let mut items = Vec::new();
    let mut pos = 0;
    while pos < source.len() {
        let rest = &source[pos..];
        let (kind, len) = if rest.starts_with("<!--") {
            let len = delimited(builder, rest, "<!--", "-->", "unterminated comment")?;
            (Kind::Comment, len)
        } else if rest.starts_with("<![CDATA[") {
            let len = delimited(builder, rest, "<![CDATA[", "]]>", "unterminated CDATA section")?;
            (Kind::CData, len)
        } else if rest.starts_with("<?") {
            let len = delimited(builder, rest, "<?", "?>", "unterminated processing instruction")?;
            (Kind::Instruction, len)
        } else if rest.starts_with("<!") {
            let len = delimited(builder, rest, "<!", ">", "unterminated declaration")?;
            (Kind::Declaration, len)
        } else if rest.starts_with("</") {
            let len = delimited(builder, rest, "</", ">", "unterminated closing tag")?;
            let name = rest[2..len - 1].trim().to_string();
            (Kind::End { name }, len)
        } else if rest.starts_with('<') {
            let len = tag_length(rest)
                .ok_or_else(|| builder.structure_error(excerpt(rest), "unterminated start tag"))?;
            let body = &rest[1..len - 1];
            let name: String = body
                .chars()
                .take_while(|ch| !ch.is_whitespace() && *ch != '/')
                .collect();
            if name.is_empty() {
                return Err(builder.structure_error(excerpt(rest), "start tag has no element name"));
            }
            let self_closing = body.trim_end().ends_with('/');
            (Kind::Start { name, self_closing }, len)
        } else {
            (Kind::Text, rest.find('<').unwrap_or(rest.len()))
        };
        items.push(Item {
            kind,
            start: pos,
            end: pos + len,
        });
        pos += len;
    }
    Ok(items)
}

fn delimited(
    builder: &TemplateBuilder,
    rest: &str,
    open: &str,
    close: &str,
    message: &str,
) -> Result<usize, ProjgenError> {
    rest[open.len()..]
        .find(close)
        .map(|at| open.len() + at + close.len())
        .ok_or_else(|| builder.structure_error(excerpt(rest), message))
}

/// Length of a start tag including `>`, skipping over quoted attribute values.
fn tag_length(rest: &str) -> Option<usize> {
    let mut quote = None;
    for (idx, ch) in rest.char_indices().skip(1) {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == '>' => return Some(idx + 1),
            None => {}
        }
    }
    None
}

fn excerpt(text: &str) -> String {
    let head: String = text.chars().take(48).collect();
    head.lines().next().unwrap_or_default().to_string()
}

/// Pairs every start tag with its end tag; self-closing tags close themselves.
fn match_elements(
    builder: &TemplateBuilder,
    source: &str,
    items: &[Item],
) -> Result<Vec<Option<usize>>, ProjgenError> {
    let mut closing = vec![None; items.len()];
    let mut open: Vec<usize> = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        match &item.kind {
            Kind::Start {
                self_closing: true, ..
            } => closing[idx] = Some(idx),
            Kind::Start { .. } => open.push(idx),
            Kind::End { name } => {
                let text = &source[item.start..item.end];
                let start = open.pop().ok_or_else(|| {
                    builder.structure_error(text, "closing tag has no matching start tag")
                })?;
                if let Kind::Start {
                    name: open_name, ..
                } = &items[start].kind
                {
                    if open_name != name {
                        return Err(builder.structure_error(
                            text,
                            format!("closing tag does not match <{open_name}>"),
                        ));
                    }
                }
                closing[start] = Some(idx);
            }
            _ => {}
        }
    }
    if let Some(idx) = open.pop() {
        let item = &items[idx];
        return Err(builder.structure_error(
            excerpt(&source[item.start..item.end]),
            "element is never closed",
        ));
    }
    Ok(closing)
}

fn comment_marker(text: &str) -> Option<Marker> {
    let inner = text.strip_prefix("<!--")?.strip_suffix("-->")?;
    Marker::parse(inner.trim())
}

fn attribute_tokens(tag: &str) -> Vec<String> {
    static ATTRIBUTE_TOKEN: OnceLock<Regex> = OnceLock::new();
    let re = ATTRIBUTE_TOKEN
        .get_or_init(|| Regex::new(r"\$\$([A-Z0-9_]+)\$\$").expect("valid attribute token regex"));
    re.captures_iter(tag)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn line_start(source: &str, at: usize) -> usize {
    source[..at].rfind('\n').map_or(0, |idx| idx + 1)
}

/// Offset just past the newline ending the line that contains `at`.
fn line_end(source: &str, at: usize) -> usize {
    source[at..]
        .find('\n')
        .map_or(source.len(), |idx| at + idx + 1)
}

struct Parser<'a> {
    builder: &'a mut TemplateBuilder,
    source: &'a str,
    items: &'a [Item],
    closing: &'a [Option<usize>],
}

impl Parser<'_> {
    /// Emits items `lo..hi` into `part`, covering source bytes `start..end`.
    fn build(
        &mut self,
        part: PartId,
        lo: usize,
        hi: usize,
        start: usize,
        end: usize,
    ) -> Result<(), ProjgenError> {
        let items = self.items;
        let source = self.source;
        let mut cursor = start;
        let mut idx = lo;
        while idx < hi {
            let item = &items[idx];
            let text = &source[item.start..item.end];
            match &item.kind {
                Kind::Start { .. } => {
                    let names = attribute_tokens(text);
                    if !names.is_empty() {
                        self.flush(part, cursor, item.start);
                        self.builder.push_attribute(part, text, &names);
                        cursor = item.end;
                    }
                    idx += 1;
                }
                Kind::Comment => match comment_marker(text) {
                    Some(Marker::Token(name)) => {
                        self.flush(part, cursor, item.start);
                        self.builder.push_token(part, &name);
                        cursor = item.end;
                        idx += 1;
                    }
                    Some(marker @ Marker::Inline(_)) => {
                        (cursor, idx) = self.inline(part, &marker, idx, hi, cursor, end)?;
                    }
                    Some(marker @ Marker::BlockStart(_)) => {
                        (cursor, idx) = self.block(part, &marker, idx, hi, cursor, end)?;
                    }
                    Some(marker @ Marker::BlockEnd(_)) => {
                        return Err(self
                            .builder
                            .structure_error(marker.describe(), "end marker without a start marker"));
                    }
                    None => idx += 1,
                },
                _ => idx += 1,
            }
        }
        self.flush(part, cursor, end);
        Ok(())
    }

    fn flush(&mut self, part: PartId, from: usize, to: usize) {
        if from < to {
            self.builder.push_literal(part, &self.source[from..to]);
        }
    }

    /// Repeats the element following an inline marker.
    fn inline(
        &mut self,
        part: PartId,
        marker: &Marker,
        idx: usize,
        hi: usize,
        cursor: usize,
        end: usize,
    ) -> Result<(usize, usize), ProjgenError> {
        let items = self.items;
        let (marker_start, marker_end) = self.marker_span(&items[idx], cursor, end);
        let mut next = idx + 1;
        while next < hi && self.is_blank_text(&items[next]) {
            next += 1;
        }
        let close = match items.get(next) {
            Some(Item {
                kind: Kind::Start { .. },
                ..
            }) if next < hi => self.closing[next].filter(|close| *close < hi),
            _ => None,
        }
        .ok_or_else(|| {
            self.builder
                .structure_error(marker.describe(), "no element follows the inline marker")
        })?;

        let unit_start = self.unit_start(items[next].start, marker_end);
        let unit_end = self.unit_end(items[close].end, end);
        self.flush(part, cursor, marker_start);
        self.flush(part, marker_end, unit_start);
        let child = self.builder.add_part(part, marker)?;
        self.build(child, next, close + 1, unit_start, unit_end)?;
        Ok((unit_end, close + 1))
    }

    /// Repeats everything between a start marker and its end marker.
    fn block(
        &mut self,
        part: PartId,
        marker: &Marker,
        idx: usize,
        hi: usize,
        cursor: usize,
        end: usize,
    ) -> Result<(usize, usize), ProjgenError> {
        let items = self.items;
        let close = self.block_end(marker, idx, hi)?;
        let (open_from, open_to) = self.marker_span(&items[idx], cursor, end);
        let (close_from, close_to) = self.marker_span(&items[close], open_to, end);
        self.flush(part, cursor, open_from);
        let child = self.builder.add_part(part, marker)?;
        self.build(child, idx + 1, close, open_to, close_from)?;
        Ok((close_to, close + 1))
    }

    /// Finds the end marker for the block opened at `idx`, checking that the block holds exactly
    /// one element and stays within the element that contains it.
    fn block_end(&self, marker: &Marker, idx: usize, hi: usize) -> Result<usize, ProjgenError> {
        let items = self.items;
        let mut pending: Vec<String> = Vec::new();
        let mut depth = 0usize;
        let mut elements = 0usize;
        for (offset, item) in items[idx + 1..hi].iter().enumerate() {
            let at_top = depth == 0 && pending.is_empty();
            match &item.kind {
                Kind::Start { self_closing, .. } => {
                    if at_top {
                        elements += 1;
                    }
                    if !self_closing {
                        depth += 1;
                    }
                }
                Kind::End { .. } => {
                    if depth == 0 {
                        return Err(self.builder.structure_error(
                            marker.describe(),
                            "block crosses an element boundary",
                        ));
                    }
                    depth -= 1;
                }
                Kind::Text if at_top && !self.is_blank_text(item) => {
                    return Err(self.builder.structure_error(
                        marker.describe(),
                        "block contains text outside its element",
                    ));
                }
                Kind::Comment => {
                    match comment_marker(&self.source[item.start..item.end]) {
                        Some(Marker::BlockStart(name)) => {
                            if at_top {
                                elements += 1;
                            }
                            pending.push(name);
                        }
                        Some(Marker::BlockEnd(name)) => match pending.pop() {
                            Some(open) if open == name => {}
                            Some(open) => {
                                return Err(self.builder.structure_error(
                                    format!("#{name}_TEMPLATE_END"),
                                    format!("end marker does not match #{open}_TEMPLATE_START"),
                                ));
                            }
                            None if name == marker.name() => {
                                if depth != 0 {
                                    return Err(self.builder.structure_error(
                                        marker.describe(),
                                        "block crosses an element boundary",
                                    ));
                                }
                                if elements != 1 {
                                    return Err(self.builder.structure_error(
                                        marker.describe(),
                                        format!(
                                            "block must contain exactly one element, found {elements}"
                                        ),
                                    ));
                                }
                                return Ok(idx + 1 + offset);
                            }
                            None => {
                                return Err(self.builder.structure_error(
                                    format!("#{name}_TEMPLATE_END"),
                                    format!("end marker does not match {}", marker.describe()),
                                ));
                            }
                        },
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        Err(self
            .builder
            .structure_error(marker.describe(), "block has no end marker"))
    }

    fn is_blank_text(&self, item: &Item) -> bool {
        item.kind == Kind::Text && self.source[item.start..item.end].trim().is_empty()
    }

    /// Span removed for a template marker: its whole line when nothing else shares it.
    fn marker_span(&self, item: &Item, cursor: usize, end: usize) -> (usize, usize) {
        let source = self.source;
        let first = line_start(source, item.start);
        let last = line_end(source, item.end);
        let alone =
            source[first..item.start].trim().is_empty() && source[item.end..last].trim().is_empty();
        if alone {
            (first.max(cursor), last.min(end))
        } else {
            (item.start, item.end)
        }
    }

    fn unit_start(&self, at: usize, floor: usize) -> usize {
        let first = line_start(self.source, at).max(floor);
        if self.source[first..at].trim().is_empty() {
            first
        } else {
            at
        }
    }

    fn unit_end(&self, at: usize, ceiling: usize) -> usize {
        let last = line_end(self.source, at).min(ceiling);
        if last > at && self.source[at..last].trim().is_empty() {
            last
        } else {
            at
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ProjgenError;
    use crate::template::{Replacements, Template, TemplateBackend};

    fn structure_error(source: &str) -> (String, String) {
        match Template::parse("broken.props", TemplateBackend::Markup, source)
            .expect_err("structural error")
        {
            ProjgenError::TemplateStructure {
                marker, message, ..
            } => (marker, message),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn block_repeats_its_element_with_layout() {
        let source = "<Project>\n  <ItemGroup>\n    <!--#REF_TEMPLATE_START-->\n    <ProjectReference Include=\"$$PATH$$\">\n      <Name><!--#NAME_TOKEN--></Name>\n    </ProjectReference>\n    <!--#REF_TEMPLATE_END-->\n  </ItemGroup>\n</Project>\n";
        let template = Template::parse("refs.props", TemplateBackend::Markup, source).unwrap();
        let part = template.child(template.root(), "REF").unwrap();
        assert!(template.has_token(part, "PATH"));
        assert!(template.has_token(part, "NAME"));

        let mut replacements = Replacements::new();
        let root = replacements.root(&template);
        for name in ["Core", "Util"] {
            let set = replacements.create(&template, part, root).unwrap();
            replacements
                .assign(&template, set, "PATH", format!("../{name}/{name}.csproj"))
                .unwrap();
            replacements.assign(&template, set, "NAME", name).unwrap();
        }
        let rendered = template.render(&replacements, root).unwrap();
        assert_eq!(
            rendered,
            "<Project>\n  <ItemGroup>\n    <ProjectReference Include=\"../Core/Core.csproj\">\n      <Name>Core</Name>\n    </ProjectReference>\n    <ProjectReference Include=\"../Util/Util.csproj\">\n      <Name>Util</Name>\n    </ProjectReference>\n  </ItemGroup>\n</Project>\n"
        );
    }

    #[test]
    fn nested_sub_templates_are_scoped_to_their_parent() {
        let source = "<Root>\n  <!--#GROUP_TEMPLATE_START-->\n  <Group Name=\"$$NAME$$\">\n    <!--#ITEM_TEMPLATE-->\n    <Item><!--#VALUE_TOKEN--></Item>\n  </Group>\n  <!--#GROUP_TEMPLATE_END-->\n</Root>\n";
        let template = Template::parse("nested.xml", TemplateBackend::Markup, source).unwrap();
        let mut replacements = Replacements::new();
        let root = replacements.root(&template);

        let first = replacements.instance(&template, root, "GROUP").unwrap();
        replacements.assign(&template, first, "NAME", "a").unwrap();
        for value in ["1", "2"] {
            let item = replacements.instance(&template, first, "ITEM").unwrap();
            replacements.assign(&template, item, "VALUE", value).unwrap();
        }
        let second = replacements.instance(&template, root, "GROUP").unwrap();
        replacements.assign(&template, second, "NAME", "b").unwrap();

        let rendered = template.render(&replacements, root).unwrap();
        assert_eq!(
            rendered,
            "<Root>\n  <Group Name=\"a\">\n    <Item>1</Item>\n    <Item>2</Item>\n  </Group>\n  <Group Name=\"b\">\n  </Group>\n</Root>\n"
        );
    }

    #[test]
    fn unterminated_block_is_rejected() {
        let (marker, message) = structure_error("<A>\n<!--#X_TEMPLATE_START-->\n<B />\n</A>\n");
        assert_eq!(marker, "#X_TEMPLATE_START");
        assert!(message.contains("crosses"), "{message}");

        let (_, message) = structure_error("<!--#X_TEMPLATE_START-->\n<B />\n");
        assert!(message.contains("no end marker"), "{message}");
    }

    #[test]
    fn mismatched_and_stray_end_markers_are_rejected() {
        let (marker, _) =
            structure_error("<!--#X_TEMPLATE_START-->\n<B />\n<!--#Y_TEMPLATE_END-->\n");
        assert_eq!(marker, "#Y_TEMPLATE_END");

        let (marker, message) = structure_error("<A />\n<!--#X_TEMPLATE_END-->\n");
        assert_eq!(marker, "#X_TEMPLATE_END");
        assert!(message.contains("without a start"), "{message}");
    }

    #[test]
    fn inline_marker_needs_a_following_element() {
        let (marker, message) = structure_error("<A>\n  <!--#X_TEMPLATE-->\n</A>\n");
        assert_eq!(marker, "#X_TEMPLATE");
        assert!(message.contains("no element"), "{message}");
    }

    #[test]
    fn block_must_hold_exactly_one_element() {
        let (_, message) = structure_error(
            "<A>\n<!--#X_TEMPLATE_START-->\n<B />\n<C />\n<!--#X_TEMPLATE_END-->\n</A>\n",
        );
        assert!(message.contains("exactly one element"), "{message}");
    }

    #[test]
    fn duplicate_sub_template_names_are_rejected() {
        let (marker, message) =
            structure_error("<A>\n<!--#X_TEMPLATE-->\n<B />\n<!--#X_TEMPLATE-->\n<C />\n</A>\n");
        assert_eq!(marker, "#X_TEMPLATE");
        assert!(message.contains("twice"), "{message}");
    }

    #[test]
    fn malformed_markup_is_rejected() {
        let (_, message) = structure_error("<A><B></A>");
        assert!(message.contains("does not match"), "{message}");

        let (_, message) = structure_error("<A><!-- never closed");
        assert!(message.contains("unterminated comment"), "{message}");
    }

    #[test]
    fn ordinary_comments_and_declarations_pass_through() {
        let source = "<?xml version=\"1.0\"?>\n<!-- generated -->\n<A><![CDATA[<x>]]></A>\n";
        let template = Template::parse("plain.xml", TemplateBackend::Markup, source).unwrap();
        let mut replacements = Replacements::new();
        let root = replacements.root(&template);
        assert_eq!(template.render(&replacements, root).unwrap(), source);
    }
}
