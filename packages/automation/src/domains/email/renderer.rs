//! Template rendering: fills `{{token}}` placeholders from a flat
//! personalization object. Pure, no I/O.
//!
//! Parse and render are split on purpose: a syntactically broken template
//! is a configuration error that must fail a batch before any send, while
//! a missing personalization field is a per-recipient data gap and renders
//! as an empty string.

use serde_json::Value;

use crate::common::PipelineError;

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Token(String),
}

/// A parsed template body or subject line.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    parts: Vec<Part>,
}

/// A fully rendered email, as produced by preview and dispatch.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

impl Template {
    /// Parse a template source, validating placeholder syntax.
    pub fn parse(source: &str) -> Result<Self, PipelineError> {
        let mut parts = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                parts.push(Part::Literal(rest[..start].to_string()));
            }

            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                PipelineError::Template(format!("unclosed placeholder near byte {start}"))
            })?;

            let token = after[..end].trim();
            if token.is_empty() {
                return Err(PipelineError::Template("empty placeholder".to_string()));
            }
            if token.contains(char::is_whitespace) {
                return Err(PipelineError::Template(format!(
                    "invalid placeholder name: {token:?}"
                )));
            }

            parts.push(Part::Token(token.to_string()));
            rest = &after[end + 2..];
        }

        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Self { parts })
    }

    /// Substitute tokens from `data`. Missing or null fields render empty.
    pub fn render(&self, data: &Value) -> String {
        let mut out = String::new();

        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Token(token) => match data.get(token) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(Value::Number(n)) => out.push_str(&n.to_string()),
                    Some(Value::Bool(b)) => out.push_str(if *b { "true" } else { "false" }),
                    _ => {}
                },
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_literal_text_unchanged() {
        let tpl = Template::parse("Hello there").unwrap();
        assert_eq!(tpl.render(&json!({})), "Hello there");
    }

    #[test]
    fn substitutes_tokens_from_data() {
        let tpl = Template::parse("Hi {{first_name}}, welcome to {{company}}!").unwrap();
        let rendered = tpl.render(&json!({"first_name": "Ada", "company": "Acme"}));
        assert_eq!(rendered, "Hi Ada, welcome to Acme!");
    }

    #[test]
    fn missing_token_renders_empty() {
        let tpl = Template::parse("Hi {{first_name}}!").unwrap();
        assert_eq!(tpl.render(&json!({})), "Hi !");
    }

    #[test]
    fn numbers_and_bools_are_stringified() {
        let tpl = Template::parse("{{count}} / {{active}}").unwrap();
        assert_eq!(tpl.render(&json!({"count": 3, "active": true})), "3 / true");
    }

    #[test]
    fn token_whitespace_is_trimmed() {
        let tpl = Template::parse("Hi {{ first_name }}").unwrap();
        assert_eq!(tpl.render(&json!({"first_name": "Ada"})), "Hi Ada");
    }

    #[test]
    fn unclosed_placeholder_is_rejected() {
        let err = Template::parse("Hi {{first_name").unwrap_err();
        assert!(matches!(err, PipelineError::Template(_)));
    }

    #[test]
    fn empty_placeholder_is_rejected() {
        assert!(Template::parse("Hi {{}}").is_err());
    }

    #[test]
    fn placeholder_with_inner_whitespace_is_rejected() {
        assert!(Template::parse("Hi {{first name}}").is_err());
    }
}
