//! Template lookup and rendering.
//!
//! Rendering is behind [`TemplateRenderer`] so the host can plug in whatever
//! engine the site uses. [`StaticTemplates`] is a small in-memory renderer
//! with `{{ dotted.path }}` substitution, used by tests and as the default.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateNamespace {
    EmailHtml,
    EmailText,
    EmailSubject,
    Notification,
}

impl fmt::Display for TemplateNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TemplateNamespace::EmailHtml => "email_html",
            TemplateNamespace::EmailText => "email_text",
            TemplateNamespace::EmailSubject => "email_subject",
            TemplateNamespace::Notification => "notification",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template {namespace}/{name} not found")]
    Missing {
        namespace: TemplateNamespace,
        name: String,
    },

    #[error("Template {name} failed to render: {reason}")]
    Render { name: String, reason: String },
}

pub trait TemplateRenderer: Send + Sync {
    fn exists(&self, namespace: TemplateNamespace, name: &str) -> bool;

    fn render(
        &self,
        namespace: TemplateNamespace,
        name: &str,
        context: &Value,
    ) -> Result<String, TemplateError>;
}

// ---------------------------------------------------------------------------
// TemplateTriple
// ---------------------------------------------------------------------------

/// HTML body, text body and subject of one email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateTriple {
    pub html: String,
    pub text: String,
    pub subject: String,
}

/// A fully rendered [`TemplateTriple`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub html: String,
    pub text: String,
    pub subject: String,
}

impl TemplateTriple {
    /// All three members share the logical name.
    pub fn named(name: &str) -> Self {
        Self {
            html: name.to_string(),
            text: name.to_string(),
            subject: name.to_string(),
        }
    }

    /// Whether every member resolves in its namespace.
    pub fn resolves(&self, renderer: &dyn TemplateRenderer) -> bool {
        renderer.exists(TemplateNamespace::EmailHtml, &self.html)
            && renderer.exists(TemplateNamespace::EmailText, &self.text)
            && renderer.exists(TemplateNamespace::EmailSubject, &self.subject)
    }

    /// Render all three members, failing before producing any output if one
    /// of them is missing.
    pub fn render(
        &self,
        renderer: &dyn TemplateRenderer,
        context: &Value,
    ) -> Result<RenderedEmail, TemplateError> {
        for (namespace, name) in [
            (TemplateNamespace::EmailHtml, &self.html),
            (TemplateNamespace::EmailText, &self.text),
            (TemplateNamespace::EmailSubject, &self.subject),
        ] {
            if !renderer.exists(namespace, name) {
                return Err(TemplateError::Missing {
                    namespace,
                    name: name.clone(),
                });
            }
        }
        Ok(RenderedEmail {
            html: renderer.render(TemplateNamespace::EmailHtml, &self.html, context)?,
            text: renderer.render(TemplateNamespace::EmailText, &self.text, context)?,
            subject: renderer
                .render(TemplateNamespace::EmailSubject, &self.subject, context)?
                .trim()
                .to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// StaticTemplates
// ---------------------------------------------------------------------------

/// In-memory templates keyed by namespace and name.
#[derive(Debug, Default, Clone)]
pub struct StaticTemplates {
    templates: HashMap<(TemplateNamespace, String), String>,
}

impl StaticTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, namespace: TemplateNamespace, name: &str, source: &str) {
        self.templates
            .insert((namespace, name.to_string()), source.to_string());
    }

    pub fn with(mut self, namespace: TemplateNamespace, name: &str, source: &str) -> Self {
        self.insert(namespace, name, source);
        self
    }

    /// Register html, text and subject sources under one name.
    pub fn with_email(self, name: &str, subject: &str, text: &str, html: &str) -> Self {
        self.with(TemplateNamespace::EmailSubject, name, subject)
            .with(TemplateNamespace::EmailText, name, text)
            .with(TemplateNamespace::EmailHtml, name, html)
    }

    pub fn with_notification(self, name: &str, source: &str) -> Self {
        self.with(TemplateNamespace::Notification, name, source)
    }
}

impl TemplateRenderer for StaticTemplates {
    fn exists(&self, namespace: TemplateNamespace, name: &str) -> bool {
        self.templates.contains_key(&(namespace, name.to_string()))
    }

    fn render(
        &self,
        namespace: TemplateNamespace,
        name: &str,
        context: &Value,
    ) -> Result<String, TemplateError> {
        let source = self
            .templates
            .get(&(namespace, name.to_string()))
            .ok_or_else(|| TemplateError::Missing {
                namespace,
                name: name.to_string(),
            })?;
        substitute(source, context).map_err(|reason| TemplateError::Render {
            name: name.to_string(),
            reason,
        })
    }
}

/// Replace every `{{ path }}` with the value found at `path` in `context`.
/// Missing values render as the empty string.
fn substitute(source: &str, context: &Value) -> Result<String, String> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| "unterminated placeholder".to_string())?;
        let key = after[..end].trim();
        if let Some(value) = lookup(context, key) {
            match value {
                Value::String(s) => out.push_str(s),
                Value::Null => {}
                other => out.push_str(&other.to_string()),
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|part| !part.is_empty())
        .try_fold(context, |value, part| value.get(part))
}
