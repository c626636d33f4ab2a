//! Template rendering for `nunjucks` and `handlebars` expressions.
//!
//! `nunjucks` templates run on minijinja (same Jinja syntax: `{{ x | upper }}`,
//! `{% if %}`, `{% for %}`), with undefined lookups chaining to empty output.
//! `handlebars` templates run on Handlebars with output escaping disabled and
//! these helpers on top of the built-ins (`if`, `each`, `eq`, `lookup`, ...):
//! - json: Serialize a value
//! - upper / lower: Change case
//! - default: Fallback for null values
//! - join: Join array with separator
//! - truncate: Truncate string to max length
//!
//! Context variables are written `@name` in templates, like everywhere else
//! in a pipeline. Neither engine accepts `@` in identifiers, so references
//! are rewritten to plain names before rendering and the data keys are
//! stripped of their `@` prefix. Quoted string literals are left alone.

use handlebars::{handlebars_helper, no_escape, Handlebars, Template};
use minijinja::{Environment, ErrorKind as JinjaErrorKind, UndefinedBehavior};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use brick_core::{ExpressionError, TEMPLATE_DATA_NAMES};

static MUSTACHE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\{?[^{}]*\}?\}\}").expect("mustache pattern"));
static JINJA_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{.*?\}\}|\{%.*?%\}").expect("jinja tag pattern"));
/// A quoted literal (group 1) or an `@name` reference (group 2)
static CONTEXT_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')|@([A-Za-z_][A-Za-z0-9_]*)"#)
        .expect("context reference pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateEngine {
    Nunjucks,
    Handlebars,
}

handlebars_helper!(upper: |s: str| s.to_uppercase());
handlebars_helper!(lower: |s: str| s.to_lowercase());
handlebars_helper!(json: |v: Json| v.to_string());
handlebars_helper!(default_value: |v: Json, fallback: Json| {
    if v.is_null() { fallback.clone() } else { v.clone() }
});
handlebars_helper!(join: |items: array, separator: str| {
    items
        .iter()
        .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
        .collect::<Vec<_>>()
        .join(separator)
});
handlebars_helper!(truncate: |text: str, max_len: u64| truncate_text(text, max_len as usize));

fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        format!("{}...", text.chars().take(max_len).collect::<String>())
    } else {
        text.to_string()
    }
}

fn truncate_filter(text: String, max_len: usize) -> String {
    truncate_text(&text, max_len)
}

fn dump_filter(value: minijinja::Value) -> Result<String, minijinja::Error> {
    serde_json::to_string(&value)
        .map_err(|e| minijinja::Error::new(JinjaErrorKind::InvalidOperation, e.to_string()))
}

/// Both engines with their helpers registered
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
    jinja: Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        // Missing variables render empty; templates produce text, not HTML
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(no_escape);

        handlebars.register_helper("upper", Box::new(upper));
        handlebars.register_helper("lower", Box::new(lower));
        handlebars.register_helper("json", Box::new(json));
        handlebars.register_helper("default", Box::new(default_value));
        handlebars.register_helper("join", Box::new(join));
        handlebars.register_helper("truncate", Box::new(truncate));

        let mut jinja = Environment::new();
        jinja.set_undefined_behavior(UndefinedBehavior::Chainable);
        jinja.add_filter("truncate", truncate_filter);
        jinja.add_filter("dump", dump_filter);
        jinja.add_filter("json", dump_filter);

        TemplateRenderer { handlebars, jinja }
    }

    /// Render `template` with `engine` against a flattened context
    pub fn render(
        &self,
        engine: TemplateEngine,
        template: &str,
        context: &Value,
    ) -> Result<String, ExpressionError> {
        match engine {
            TemplateEngine::Nunjucks => self.render_jinja(template, context),
            TemplateEngine::Handlebars => self.render_handlebars(template, context),
        }
    }

    fn render_jinja(&self, template: &str, context: &Value) -> Result<String, ExpressionError> {
        let source = rewrite_jinja_refs(template);
        self.jinja
            .render_str(&source, template_data(context))
            .map_err(|e| match e.kind() {
                JinjaErrorKind::SyntaxError => ExpressionError::TemplateSyntax(e.to_string()),
                _ => ExpressionError::TemplateRender(e.to_string()),
            })
    }

    fn render_handlebars(&self, template: &str, context: &Value) -> Result<String, ExpressionError> {
        let source = rewrite_context_refs(template, context);
        Template::compile(&source).map_err(|e| ExpressionError::TemplateSyntax(e.to_string()))?;

        self.handlebars
            .render_template(&source, &template_data(context))
            .map_err(|e| ExpressionError::TemplateRender(e.to_string()))
    }
}

/// Rewrite `@name` references outside quoted literals with `rename`
fn rewrite_refs(tag: &str, rename: impl Fn(&str) -> Option<String>) -> String {
    CONTEXT_REF
        .replace_all(tag, |found: &Captures| match found.get(2) {
            Some(name) => rename(name.as_str()).unwrap_or_else(|| found[0].to_string()),
            None => found[0].to_string(),
        })
        .into_owned()
}

/// Replace `@name` with `name` inside mustache tags. Handlebars data
/// variables (`@index`, `@first`, ...) keep their `@` unless the context
/// binds that name.
pub fn rewrite_context_refs(template: &str, context: &Value) -> String {
    let bound = |name: &str| context.get(format!("@{}", name)).is_some();
    MUSTACHE
        .replace_all(template, |tag: &Captures| {
            rewrite_refs(&tag[0], |name| {
                if TEMPLATE_DATA_NAMES.contains(&name) && !bound(name) {
                    None
                } else {
                    Some(name.to_string())
                }
            })
        })
        .into_owned()
}

/// Replace `@name` with `name` inside `{{ }}` and `{% %}` tags
pub fn rewrite_jinja_refs(template: &str) -> String {
    JINJA_TAG
        .replace_all(template, |tag: &Captures| {
            rewrite_refs(&tag[0], |name| Some(name.to_string()))
        })
        .into_owned()
}

/// Template namespace: top-level keys without their `@` prefix
pub fn template_data(context: &Value) -> Value {
    let Value::Object(map) = context else {
        return context.clone();
    };

    let mut data = Map::new();
    for (key, value) in map.iter().filter(|(key, _)| !key.starts_with('@')) {
        data.insert(key.clone(), value.clone());
    }
    for (key, value) in map {
        if let Some(name) = key.strip_prefix('@') {
            data.insert(name.to_string(), value.clone());
        }
    }
    Value::Object(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Value {
        json!({
            "@input": { "name": "World", "tags": ["a", "b", "c"], "score": null, "flag": true },
            "@foo": 42,
        })
    }

    fn handlebars(template: &str, ctx: &Value) -> Result<String, ExpressionError> {
        TemplateRenderer::new().render(TemplateEngine::Handlebars, template, ctx)
    }

    fn nunjucks(template: &str, ctx: &Value) -> Result<String, ExpressionError> {
        TemplateRenderer::new().render(TemplateEngine::Nunjucks, template, ctx)
    }

    #[test]
    fn test_simple_render() {
        let result = handlebars("Hello, {{ @input.name }}!", &context()).unwrap();
        assert_eq!(result, "Hello, World!");
        let result = nunjucks("Hello, {{ @input.name }}!", &context()).unwrap();
        assert_eq!(result, "Hello, World!");
    }

    #[test]
    fn test_no_html_escaping() {
        let ctx = json!({ "@input": { "name": "<b>&</b>" } });
        assert_eq!(handlebars("{{@input.name}}", &ctx).unwrap(), "<b>&</b>");
        assert_eq!(nunjucks("{{ @input.name }}", &ctx).unwrap(), "<b>&</b>");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        assert_eq!(handlebars("[{{ @missing.value }}]", &context()).unwrap(), "[]");
        assert_eq!(nunjucks("[{{ @missing.value }}]", &context()).unwrap(), "[]");
    }

    #[test]
    fn test_syntax_error_is_distinct() {
        let error = handlebars("{{#if @foo}}unclosed", &context()).unwrap_err();
        assert!(matches!(error, ExpressionError::TemplateSyntax(_)));
        let error = nunjucks("{% if @foo %}unclosed", &context()).unwrap_err();
        assert!(matches!(error, ExpressionError::TemplateSyntax(_)));
    }

    #[test]
    fn test_handlebars_helpers() {
        let ctx = context();
        assert_eq!(handlebars("{{join @input.tags \", \"}}", &ctx).unwrap(), "a, b, c");
        assert_eq!(handlebars("{{upper @input.name}}", &ctx).unwrap(), "WORLD");
        assert_eq!(handlebars("{{default @input.score \"n/a\"}}", &ctx).unwrap(), "n/a");
        assert_eq!(handlebars("{{truncate @input.name 3}}", &ctx).unwrap(), "Wor...");
        assert_eq!(handlebars("{{json @input.tags}}", &ctx).unwrap(), "[\"a\",\"b\",\"c\"]");
    }

    #[test]
    fn test_nunjucks_filters_and_tags() {
        let ctx = context();
        assert_eq!(nunjucks("{{ @input.name | upper }}", &ctx).unwrap(), "WORLD");
        assert_eq!(nunjucks("{{ @input.tags | join(\"-\") }}", &ctx).unwrap(), "a-b-c");
        assert_eq!(nunjucks("{{ @input.name | truncate(3) }}", &ctx).unwrap(), "Wor...");
        assert_eq!(nunjucks("{{ @input.tags | dump }}", &ctx).unwrap(), "[\"a\",\"b\",\"c\"]");
        assert_eq!(
            nunjucks("{% if @input.flag %}yes{% else %}no{% endif %}", &ctx).unwrap(),
            "yes"
        );
        assert_eq!(
            nunjucks("{% for tag in @input.tags %}{{ loop.index0 }}={{ tag }};{% endfor %}", &ctx)
                .unwrap(),
            "0=a;1=b;2=c;"
        );
    }

    #[test]
    fn test_each_keeps_handlebars_data() {
        let result = handlebars("{{#each @input.tags}}{{@index}}={{this}};{{/each}}", &context())
            .unwrap();
        assert_eq!(result, "0=a;1=b;2=c;");
    }

    #[test]
    fn test_bound_context_key_wins_over_data_variable() {
        let ctx = json!({ "@first": { "message": "hello" } });
        assert_eq!(handlebars("{{ @first.message }}", &ctx).unwrap(), "hello");
    }

    #[test]
    fn test_quoted_literals_keep_their_at_sign() {
        let ctx = context();
        assert_eq!(
            handlebars("{{ default @input.missing \"a@b.com\" }}", &ctx).unwrap(),
            "a@b.com"
        );
        assert_eq!(
            nunjucks("{{ @input.missing | default('a@b.com') }}", &ctx).unwrap(),
            "a@b.com"
        );
    }

    #[test]
    fn test_rewrite_only_inside_tags() {
        let ctx = context();
        assert_eq!(
            rewrite_context_refs("mail me @home: {{ @input.email }}", &ctx),
            "mail me @home: {{ input.email }}"
        );
        assert_eq!(
            rewrite_jinja_refs("@home {% if @a %}{{ @b | default(\"@c\") }}{% endif %}"),
            "@home {% if a %}{{ b | default(\"@c\") }}{% endif %}"
        );
    }

    #[test]
    fn test_template_data_prefers_context_keys() {
        let data = template_data(&json!({ "input": 1, "@input": 2 }));
        assert_eq!(data, json!({ "input": 2 }));
    }
}
