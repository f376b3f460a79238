use async_trait::async_trait;
use common::domain::{DomainError, DomainResult};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Loads raw template text by file name
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn load(&self, name: &str) -> DomainResult<String>;
}

/// Reads templates from a directory on disk
#[derive(Debug, Clone)]
pub struct FileTemplateSource {
    dir: PathBuf,
}

impl FileTemplateSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl TemplateSource for FileTemplateSource {
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn load(&self, name: &str) -> DomainResult<String> {
        let path = self.dir.join(name);
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            DomainError::RenderError(format!("failed to read template {}: {}", path.display(), e))
        })?;
        debug!(bytes = text.len(), "template loaded");
        Ok(text)
    }
}

/// One value substituted into a `{{ Key }}` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    /// HTML-escaped on output
    Text(String),
    Number(u64),
    /// Rendered as `<option>` elements, marking `selected` when it matches
    Options {
        values: Vec<String>,
        selected: Option<String>,
    },
    /// Emitted verbatim, for JSON embedded in scripts
    Raw(String),
}

#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: BTreeMap<String, TemplateValue>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: TemplateValue) -> &mut Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&TemplateValue> {
        self.values.get(key)
    }
}

/// Substitutes every `{{ Key }}` placeholder in `template`.
///
/// A placeholder naming a key absent from `context` is a `RenderError`. An
/// unterminated `{{` is copied through unchanged.
pub fn render(template: &str, context: &TemplateContext) -> DomainResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let key = after_open[..end].trim();
        let value = context
            .get(key)
            .ok_or_else(|| DomainError::RenderError(format!("unknown placeholder: {}", key)))?;
        write_value(&mut out, value);
        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

fn write_value(out: &mut String, value: &TemplateValue) {
    match value {
        TemplateValue::Text(text) => out.push_str(&escape_html(text)),
        TemplateValue::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        TemplateValue::Options { values, selected } => {
            for value in values {
                let escaped = escape_html(value);
                let marker = if selected.as_deref() == Some(value.as_str()) {
                    " selected"
                } else {
                    ""
                };
                let _ = write!(
                    out,
                    "<option value=\"{}\"{}>{}</option>",
                    escaped, marker, escaped
                );
            }
        }
        TemplateValue::Raw(raw) => out.push_str(raw),
    }
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
