/*! Code formatting.

Formatting is delegated to a [`RuleFormatter`]. The server uses
[`CanonicalFormatter`], which re-emits every rule in a canonical layout:

```text
rule name : tag1 tag2
{
    meta:
        author = "foo"
    strings:
        $a = "bar"
    condition:
        $a
}
```

Lines within a section keep their relative indentation, and comments are
preserved. Sources with syntax errors are not formatted.
 */

use async_lsp::lsp_types::{FormattingOptions, TextEdit, Url};
use log::debug;
use thiserror::Error;
use yarals_parser::ast::{Rule, RuleFlag};
use yarals_parser::{Parser, Span};

use crate::errors::RequestError;
use crate::index::Snapshot;

/// Errors returned by [`RuleFormatter::format`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The source code contains syntax errors.
    #[error("source code has {count} syntax error(s), first one: {first}")]
    SyntaxErrors { count: usize, first: String },
}

/// How to indent the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indentation {
    Spaces(usize),
    Tabs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub indentation: Indentation,
    /// Number of columns of a tab, used for measuring relative
    /// indentation.
    pub tab_size: usize,
    /// Makes sure that the output ends with a newline. If false, the output
    /// ends with a newline only if the input did.
    pub insert_final_newline: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            indentation: Indentation::Spaces(4),
            tab_size: 4,
            insert_final_newline: true,
        }
    }
}

impl From<&FormattingOptions> for FormatOptions {
    fn from(options: &FormattingOptions) -> Self {
        let tab_size = options.tab_size.max(1) as usize;
        Self {
            indentation: if options.insert_spaces {
                Indentation::Spaces(tab_size)
            } else {
                Indentation::Tabs
            },
            tab_size,
            insert_final_newline: options
                .insert_final_newline
                .unwrap_or(false),
        }
    }
}

/// A formatter for YARA source code.
pub trait RuleFormatter: Send + Sync {
    /// Returns the formatted source code.
    fn format(
        &self,
        source: &str,
        options: &FormatOptions,
    ) -> Result<String, FormatError>;
}

/// Formats the document, returning a single edit that replaces the whole
/// text. Returns `None` if the document is already formatted, or can't be
/// formatted.
pub fn formatting(
    snapshot: &Snapshot,
    uri: &Url,
    options: &FormattingOptions,
    formatter: &dyn RuleFormatter,
) -> Result<Option<Vec<TextEdit>>, RequestError> {
    let index = snapshot.require(uri)?;
    let source = index.document.text.as_ref();

    match formatter.format(source, &FormatOptions::from(options)) {
        Ok(formatted) if formatted != source => Ok(Some(vec![TextEdit {
            range: index.document.range(Span::new(0, source.len())),
            new_text: formatted,
        }])),
        Ok(_) => Ok(None),
        Err(err) => {
            debug!("formatting of {uri} skipped: {err}");
            Ok(None)
        }
    }
}

/// The built-in formatter.
#[derive(Debug, Default)]
pub struct CanonicalFormatter;

impl RuleFormatter for CanonicalFormatter {
    fn format(
        &self,
        source: &str,
        options: &FormatOptions,
    ) -> Result<String, FormatError> {
        let ast = Parser::new(source).build_ast();

        if let Some(first) = ast.errors.first() {
            return Err(FormatError::SyntaxErrors {
                count: ast.errors.len(),
                first: first.to_string(),
            });
        }

        let mut writer = Writer::new(options);
        let mut prev = 0;

        for rule in &ast.rules {
            writer.gap(&source[prev..rule.span.start()], prev > 0);
            prev = writer.rule(source, rule)?;
        }

        writer.gap(&source[prev..], prev > 0);

        let ends_with_newline = source.ends_with('\n');
        Ok(writer.finish(options.insert_final_newline || ends_with_newline))
    }
}

/// Accumulates output lines.
struct Writer<'a> {
    options: &'a FormatOptions,
    lines: Vec<String>,
}

impl<'a> Writer<'a> {
    fn new(options: &'a FormatOptions) -> Self {
        Self { options, lines: Vec::new() }
    }

    fn indent(&self, level: usize) -> String {
        match self.options.indentation {
            Indentation::Spaces(n) => " ".repeat(n * level),
            Indentation::Tabs => "\t".repeat(level),
        }
    }

    fn push_blank(&mut self) {
        if self.lines.last().is_some_and(|line| !line.is_empty()) {
            self.lines.push(String::new());
        }
    }

    /// Writes the text found between top-level items (imports, includes
    /// and comments). If `after_item` is true, the text starts right after
    /// the closing brace of a rule.
    fn gap(&mut self, text: &str, after_item: bool) {
        let mut parts = text.split('\n');

        if after_item {
            // Whatever follows the closing brace in the same line.
            if let Some(rest) = parts.next().map(str::trim) {
                if !rest.is_empty() {
                    if let Some(last) = self.lines.last_mut() {
                        last.push(' ');
                        last.push_str(rest);
                    }
                }
            }
        }

        let mut parts: Vec<&str> = parts.map(str::trim).collect();

        // The last part is the text that precedes the next item in its own
        // line, it's not a line by itself.
        if parts.last().is_some_and(|part| part.is_empty()) {
            parts.pop();
        }

        let mut content = Vec::new();
        let mut pending_blank = false;

        for line in parts {
            if line.is_empty() {
                pending_blank = !content.is_empty();
            } else {
                if pending_blank {
                    content.push(String::new());
                }
                pending_blank = false;
                content.push(line.to_string());
            }
        }

        if content.is_empty() {
            if after_item {
                self.push_blank();
            }
            return;
        }

        if after_item {
            self.push_blank();
        }

        self.lines.extend(content);

        if pending_blank {
            self.lines.push(String::new());
        }
    }

    /// Writes a rule and returns the offset where it ends.
    fn rule(&mut self, source: &str, rule: &Rule) -> Result<usize, FormatError> {
        let (Some(lbrace), Some(rbrace)) = (rule.lbrace, rule.rbrace) else {
            return Err(FormatError::SyntaxErrors {
                count: 1,
                first: format!(
                    "rule `{}` is not delimited by braces",
                    rule.identifier.name
                ),
            });
        };

        let header = source[rule.header_span().range()].trim();

        if header.contains("//") || header.contains("/*") {
            self.lines.push(header.to_string());
        } else {
            self.lines.push(rule_header(rule));
        }

        self.lines.push("{".to_string());

        let first_section = rule
            .sections
            .first()
            .map_or(rbrace.start(), |section| section.span.start());

        // Comments between the opening brace and the first section.
        self.block(&source[lbrace.end()..first_section], 1);

        for section in &rule.sections {
            let line = format!("{}{}:", self.indent(1), section.kind.keyword());
            self.lines.push(line);
            self.block(&source[section.body().range()], 2);
        }

        self.lines.push("}".to_string());

        Ok(rbrace.end())
    }

    /// Writes the non-blank lines of `text` at the given indentation level.
    /// Lines keep their indentation relative to the least indented one,
    /// except for the first line, which doesn't start at the beginning of
    /// a line.
    fn block(&mut self, text: &str, level: usize) {
        let mut lines = text.split('\n');

        let first = lines.next().map(str::trim).filter(|l| !l.is_empty());
        let rest: Vec<&str> =
            lines.filter(|line| !line.trim().is_empty()).collect();

        let min_column = rest
            .iter()
            .map(|line| self.leading_columns(line))
            .min()
            .unwrap_or(0);

        let indent = self.indent(level);

        if let Some(first) = first {
            self.lines.push(format!("{indent}{first}"));
        }

        for line in rest {
            let relative = self.leading_columns(line) - min_column;
            self.lines.push(format!(
                "{indent}{}{}",
                " ".repeat(relative),
                line.trim()
            ));
        }
    }

    /// Width of the leading whitespace in a line, in columns.
    fn leading_columns(&self, line: &str) -> usize {
        line.chars()
            .take_while(|c| c.is_whitespace())
            .map(|c| if c == '\t' { self.options.tab_size } else { 1 })
            .sum()
    }

    fn finish(mut self, final_newline: bool) -> String {
        while self.lines.last().is_some_and(|line| line.is_empty()) {
            self.lines.pop();
        }
        let mut output = self.lines.join("\n");
        if final_newline && !output.is_empty() {
            output.push('\n');
        }
        output
    }
}

/// Builds the header of a rule (e.g. `private rule foo : bar baz`).
fn rule_header(rule: &Rule) -> String {
    let mut header = String::new();
    if rule.flags.contains(RuleFlag::Private) {
        header.push_str("private ");
    }
    if rule.flags.contains(RuleFlag::Global) {
        header.push_str("global ");
    }
    header.push_str("rule ");
    header.push_str(&rule.identifier.name);
    if !rule.tags.is_empty() {
        header.push_str(" : ");
        for (i, tag) in rule.tags.iter().enumerate() {
            if i > 0 {
                header.push(' ');
            }
            header.push_str(&tag.name);
        }
    }
    header
}
