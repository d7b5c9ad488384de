//! Small mustache-style template engine for the PDF report.
//!
//! Supported tags: `{{name}}`, `{{a.b}}`, `{{this}}`, `{{@key}}`, `{{@index}}`,
//! `{{#if name}}..{{else}}..{{/if}}`, `{{#each name}}..{{else}}..{{/each}}` and
//! `{{! comment }}`. Output is HTML-escaped except for [`TemplateValue::Safe`].

use crate::domains::export::formatter::format_number;
use crate::errors::{ExportError, ExportOutcome};

/// Data handed to a template
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Null,
    Str(String),
    Num(f64),
    Bool(bool),
    List(Vec<TemplateValue>),
    /// Ordered key/value pairs
    Map(Vec<(String, TemplateValue)>),
    /// Trusted markup inserted without escaping
    Safe(String),
}

impl TemplateValue {
    pub fn map() -> Self {
        TemplateValue::Map(Vec::new())
    }

    /// Builder-style insert; replaces an existing key
    pub fn with(mut self, key: &str, value: impl Into<TemplateValue>) -> Self {
        if let TemplateValue::Map(entries) = &mut self {
            let value = value.into();
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key.to_string(), value)),
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&TemplateValue> {
        match self {
            TemplateValue::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            TemplateValue::List(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::Null => false,
            TemplateValue::Str(s) | TemplateValue::Safe(s) => !s.is_empty(),
            TemplateValue::Num(n) => *n != 0.0 && !n.is_nan(),
            TemplateValue::Bool(b) => *b,
            TemplateValue::List(items) => !items.is_empty(),
            TemplateValue::Map(entries) => !entries.is_empty(),
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            TemplateValue::Null | TemplateValue::List(_) | TemplateValue::Map(_) => {}
            TemplateValue::Str(s) => out.push_str(&escape_html(s)),
            TemplateValue::Num(n) => out.push_str(&format_number(*n)),
            TemplateValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            TemplateValue::Safe(s) => out.push_str(s),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        TemplateValue::Str(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        TemplateValue::Str(value)
    }
}

impl From<f64> for TemplateValue {
    fn from(value: f64) -> Self {
        TemplateValue::Num(value)
    }
}

impl From<usize> for TemplateValue {
    fn from(value: usize) -> Self {
        TemplateValue::Num(value as f64)
    }
}

impl From<bool> for TemplateValue {
    fn from(value: bool) -> Self {
        TemplateValue::Bool(value)
    }
}

impl<T: Into<TemplateValue>> From<Option<T>> for TemplateValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(TemplateValue::Null)
    }
}

impl<T: Into<TemplateValue>> From<Vec<T>> for TemplateValue {
    fn from(values: Vec<T>) -> Self {
        TemplateValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Escape `& < > " '` for HTML text and attribute positions
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    If,
    Each,
}

impl Block {
    fn name(&self) -> &'static str {
        match self {
            Block::If => "if",
            Block::Each => "each",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Var(String),
    Open(Block, String),
    Else,
    Close(Block),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var(String),
    If {
        path: String,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Each {
        path: String,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// A parsed template, reusable across renders
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> ExportOutcome<Self> {
        let tokens = tokenize(source)?;
        let mut pos = 0;
        let (nodes, end) = parse_nodes(&tokens, &mut pos, None)?;
        match end {
            End::Eof => Ok(Self { nodes }),
            End::Else => Err(ExportError::HtmlGeneration("{{else}} outside of a block".to_string())),
            End::Close(block) => Err(ExportError::HtmlGeneration(format!(
                "Unexpected {{{{/{}}}}} without an open block",
                block.name()
            ))),
        }
    }

    pub fn render(&self, data: &TemplateValue) -> String {
        let mut out = String::new();
        let mut scopes = vec![Scope {
            value: data,
            key: None,
            index: None,
        }];
        render_nodes(&self.nodes, &mut scopes, &mut out);
        out
    }
}

/// Parse and render in one step
pub fn render_template(source: &str, data: &TemplateValue) -> ExportOutcome<String> {
    Ok(Template::parse(source)?.render(data))
}

fn tokenize(source: &str) -> ExportOutcome<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            tokens.push(Token::Text(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            ExportError::HtmlGeneration(format!(
                "Unterminated tag starting at byte {}",
                source.len() - rest.len() + start
            ))
        })?;
        let tag = after[..end].trim();
        rest = &after[end + 2..];

        if tag.starts_with('!') {
            continue;
        }
        tokens.push(classify(tag)?);
    }

    if !rest.is_empty() {
        tokens.push(Token::Text(rest.to_string()));
    }
    Ok(tokens)
}

fn classify(tag: &str) -> ExportOutcome<Token> {
    if let Some(open) = tag.strip_prefix('#') {
        let (helper, arg) = open.split_once(char::is_whitespace).unwrap_or((open, ""));
        let block = match helper {
            "if" => Block::If,
            "each" => Block::Each,
            other => {
                return Err(ExportError::HtmlGeneration(format!("Unknown block helper '#{}'", other)));
            }
        };
        let arg = arg.trim();
        validate_path(arg)?;
        return Ok(Token::Open(block, arg.to_string()));
    }

    if let Some(close) = tag.strip_prefix('/') {
        return match close.trim() {
            "if" => Ok(Token::Close(Block::If)),
            "each" => Ok(Token::Close(Block::Each)),
            other => Err(ExportError::HtmlGeneration(format!("Unknown closing tag '/{}'", other))),
        };
    }

    if tag == "else" {
        return Ok(Token::Else);
    }

    validate_path(tag)?;
    Ok(Token::Var(tag.to_string()))
}

fn validate_path(path: &str) -> ExportOutcome<()> {
    let valid = !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'));
    if valid {
        Ok(())
    } else {
        Err(ExportError::HtmlGeneration(format!("Invalid template expression '{}'", path)))
    }
}

enum End {
    Eof,
    Else,
    Close(Block),
}

fn parse_nodes(tokens: &[Token], pos: &mut usize, open: Option<Block>) -> ExportOutcome<(Vec<Node>, End)> {
    let mut nodes = Vec::new();

    while let Some(token) = tokens.get(*pos) {
        *pos += 1;
        match token {
            Token::Text(text) => nodes.push(Node::Text(text.clone())),
            Token::Var(path) => nodes.push(Node::Var(path.clone())),
            Token::Else => return Ok((nodes, End::Else)),
            Token::Close(block) => return Ok((nodes, End::Close(*block))),
            Token::Open(block, path) => {
                let (body, end) = parse_nodes(tokens, pos, Some(*block))?;
                let otherwise = match end {
                    End::Else => {
                        let (otherwise, end) = parse_nodes(tokens, pos, Some(*block))?;
                        expect_close(*block, end)?;
                        otherwise
                    }
                    end => {
                        expect_close(*block, end)?;
                        Vec::new()
                    }
                };
                nodes.push(match block {
                    Block::If => Node::If {
                        path: path.clone(),
                        then: body,
                        otherwise,
                    },
                    Block::Each => Node::Each {
                        path: path.clone(),
                        body,
                        otherwise,
                    },
                });
            }
        }
    }

    if let Some(block) = open {
        return Err(ExportError::HtmlGeneration(format!(
            "Unclosed {{{{#{}}}}} block",
            block.name()
        )));
    }
    Ok((nodes, End::Eof))
}

fn expect_close(block: Block, end: End) -> ExportOutcome<()> {
    match end {
        End::Close(found) if found == block => Ok(()),
        End::Close(found) => Err(ExportError::HtmlGeneration(format!(
            "Mismatched block: {{{{#{}}}}} closed by {{{{/{}}}}}",
            block.name(),
            found.name()
        ))),
        End::Else => Err(ExportError::HtmlGeneration(format!(
            "Duplicate {{{{else}}}} in {{{{#{}}}}} block",
            block.name()
        ))),
        End::Eof => Err(ExportError::HtmlGeneration(format!(
            "Unclosed {{{{#{}}}}} block",
            block.name()
        ))),
    }
}

struct Scope<'a> {
    value: &'a TemplateValue,
    key: Option<&'a str>,
    index: Option<usize>,
}

/// Resolve `this`, `this.x`, `@key`, `@index` or a dotted name.
/// Names are looked up from the innermost scope outwards.
fn resolve<'a>(path: &str, scopes: &[Scope<'a>]) -> Option<ResolvedValue<'a>> {
    match path {
        "@key" => {
            return scopes
                .iter()
                .rev()
                .find_map(|s| s.key)
                .map(|k| ResolvedValue::Owned(TemplateValue::Str(k.to_string())))
        }
        "@index" => {
            return scopes
                .iter()
                .rev()
                .find_map(|s| s.index)
                .map(|i| ResolvedValue::Owned(TemplateValue::Num(i as f64)))
        }
        _ => {}
    }

    let mut segments = path.split('.').filter(|s| !s.is_empty());
    let first = segments.next()?;
    let mut current = if first == "this" {
        scopes.last()?.value
    } else {
        scopes.iter().rev().find_map(|s| s.value.get(first))?
    };
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(ResolvedValue::Borrowed(current))
}

enum ResolvedValue<'a> {
    Borrowed(&'a TemplateValue),
    Owned(TemplateValue),
}

impl ResolvedValue<'_> {
    fn value(&self) -> &TemplateValue {
        match self {
            ResolvedValue::Borrowed(v) => v,
            ResolvedValue::Owned(v) => v,
        }
    }
}

fn render_nodes<'a>(nodes: &'a [Node], scopes: &mut Vec<Scope<'a>>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var(path) => {
                if let Some(value) = resolve(path, scopes) {
                    value.value().write_to(out);
                }
            }
            Node::If { path, then, otherwise } => {
                let truthy = resolve(path, scopes).map_or(false, |v| v.value().is_truthy());
                render_nodes(if truthy { then } else { otherwise }, scopes, out);
            }
            Node::Each { path, body, otherwise } => {
                let target = match resolve(path, scopes) {
                    Some(ResolvedValue::Borrowed(v)) => Some(v),
                    _ => None,
                };
                let rendered = match target {
                    Some(TemplateValue::List(items)) if !items.is_empty() => {
                        for (index, item) in items.iter().enumerate() {
                            scopes.push(Scope {
                                value: item,
                                key: None,
                                index: Some(index),
                            });
                            render_nodes(body, scopes, out);
                            scopes.pop();
                        }
                        true
                    }
                    Some(TemplateValue::Map(entries)) if !entries.is_empty() => {
                        for (index, (key, item)) in entries.iter().enumerate() {
                            scopes.push(Scope {
                                value: item,
                                key: Some(key.as_str()),
                                index: Some(index),
                            });
                            render_nodes(body, scopes, out);
                            scopes.pop();
                        }
                        true
                    }
                    _ => false,
                };
                if !rendered {
                    render_nodes(otherwise, scopes, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(source: &str, data: &TemplateValue) -> String {
        render_template(source, data).unwrap()
    }

    #[test]
    fn test_variables_are_escaped() {
        let data = TemplateValue::map()
            .with("title", "VPC <Report> & \"friends\" 'x'")
            .with("count", 3usize);
        assert_eq!(
            render("<h1>{{ title }}</h1><p>{{count}}</p>", &data),
            "<h1>VPC &lt;Report&gt; &amp; &quot;friends&quot; &#39;x&#39;</h1><p>3</p>"
        );
    }

    #[test]
    fn test_safe_values_are_not_escaped() {
        let data = TemplateValue::map().with("css", TemplateValue::Safe("td > th { color: red; }".into()));
        assert_eq!(render("<style>{{css}}</style>", &data), "<style>td > th { color: red; }</style>");
    }

    #[test]
    fn test_undefined_variables_render_empty() {
        assert_eq!(render("[{{missing}}][{{a.b.c}}]", &TemplateValue::map()), "[][]");
    }

    #[test]
    fn test_if_else() {
        let source = "{{#if show}}yes{{else}}no{{/if}}";
        assert_eq!(render(source, &TemplateValue::map().with("show", true)), "yes");
        assert_eq!(render(source, &TemplateValue::map().with("show", false)), "no");
        assert_eq!(render(source, &TemplateValue::map().with("show", "")), "no");
        assert_eq!(render(source, &TemplateValue::map()), "no");
        assert_eq!(render("{{#if list}}x{{/if}}", &TemplateValue::map().with("list", Vec::<String>::new())), "");
    }

    #[test]
    fn test_each_over_rows_and_cells() {
        let rows = vec![
            TemplateValue::from(vec!["a", "b"]),
            TemplateValue::from(vec!["c", "<d>"]),
        ];
        let data = TemplateValue::map().with("rows", TemplateValue::List(rows));
        let source = "{{#each rows}}<tr data-i=\"{{@index}}\">{{#each this}}<td>{{this}}</td>{{/each}}</tr>{{/each}}";
        assert_eq!(
            render(source, &data),
            "<tr data-i=\"0\"><td>a</td><td>b</td></tr><tr data-i=\"1\"><td>c</td><td>&lt;d&gt;</td></tr>"
        );
    }

    #[test]
    fn test_each_over_map_with_key() {
        let record = TemplateValue::map().with("Name", "VPC-001").with("Region", "us-east-1");
        let data = TemplateValue::map().with("record", record).with("sep", ": ");
        assert_eq!(
            render("{{#each record}}{{@key}}{{sep}}{{this}};{{/each}}", &data),
            "Name: VPC-001;Region: us-east-1;"
        );
    }

    #[test]
    fn test_each_else_and_outer_lookup() {
        let data = TemplateValue::map()
            .with("items", Vec::<String>::new())
            .with("label", "none");
        assert_eq!(render("{{#each items}}x{{else}}{{label}}{{/each}}", &data), "none");

        let data = TemplateValue::map()
            .with("items", vec![TemplateValue::map().with("name", "a")])
            .with("label", "L");
        assert_eq!(render("{{#each items}}{{label}}-{{name}}-{{this.name}}{{/each}}", &data), "L-a-a");
    }

    #[test]
    fn test_comments_are_dropped() {
        assert_eq!(render("a{{! note }}b", &TemplateValue::map()), "ab");
    }

    #[test]
    fn test_malformed_templates() {
        for source in [
            "{{#if x}}open",
            "{{#each x}}{{/if}}",
            "{{/each}}",
            "{{else}}",
            "{{name",
            "{{#unless x}}{{/unless}}",
            "{{#if x}}a{{else}}b{{else}}c{{/if}}",
            "{{bad expr}}",
        ] {
            let err = Template::parse(source).unwrap_err();
            assert_eq!(err.code(), "HTML_GENERATION", "source: {}", source);
        }
    }

    #[test]
    fn test_template_is_reusable() {
        let template = Template::parse("{{n}}").unwrap();
        assert_eq!(template.render(&TemplateValue::map().with("n", 1.5)), "1.5");
        assert_eq!(template.render(&TemplateValue::map().with("n", 2.0)), "2");
    }
}
