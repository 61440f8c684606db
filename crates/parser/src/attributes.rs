//! Attribute lexer for opening tags.
//!
//! Parsing is order-preserving and never aborts: each malformed token adds
//! one diagnostic and lexing resumes with the next token. A correctly quoted
//! attribute after a malformed one is still captured.

use serde::Serialize;
use std::collections::HashMap;

use crate::entities::decode_entities;

/// Attribute name → decoded value.
pub type Attributes = HashMap<String, String>;

/// A recoverable attribute diagnostic. The `Display` strings are relied upon
/// by callers and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum AttributeError {
    #[error("Attribute names may not contain whitespace: {name}")]
    WhitespaceInName { name: String },

    #[error("Attribute values should be quoted: {name}={value}")]
    UnquotedValue { name: String, value: String },

    #[error("Unclosed attribute value: {name}={quote}")]
    UnclosedValue { name: String, quote: char },

    #[error("Expected a value for the attribute: {name}")]
    MissingValue { name: String },
}

/// Parse the text between a tag name and its closing `>`.
pub fn parse_attributes(source: &str) -> (Attributes, Vec<AttributeError>) {
    let mut attributes = Attributes::new();
    let mut errors = Vec::new();
    let mut rest = source;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        let Some(eq) = rest.find('=') else {
            // Only bare names remain.
            for name in rest.split_whitespace() {
                errors.push(AttributeError::MissingValue { name: name.to_string() });
            }
            break;
        };

        let name = rest[..eq].trim().to_string();
        let clean_name = !name.is_empty() && !name.contains(char::is_whitespace);
        if name.contains(char::is_whitespace) {
            errors.push(AttributeError::WhitespaceInName { name: name.clone() });
        }
        rest = rest[eq + 1..].trim_start();

        let Some(first) = rest.chars().next() else {
            errors.push(AttributeError::MissingValue { name });
            break;
        };

        if first == '"' || first == '\'' {
            let body = &rest[1..];
            match body.find(first) {
                Some(end) => {
                    if clean_name {
                        attributes.insert(name, decode_entities(&body[..end]).into_owned());
                    }
                    rest = &body[end + 1..];
                }
                None => {
                    errors.push(AttributeError::UnclosedValue { name, quote: first });
                    break;
                }
            }
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            errors.push(AttributeError::UnquotedValue {
                name,
                value: rest[..end].to_string(),
            });
            rest = &rest[end..];
        }
    }

    (attributes, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_values() {
        let (attrs, errors) = parse_attributes(r#" id="123" mode='fast' "#);
        assert!(errors.is_empty());
        assert_eq!(attrs["id"], "123");
        assert_eq!(attrs["mode"], "fast");
    }

    #[test]
    fn malformed_attributes_keep_clean_ones() {
        let (attrs, errors) = parse_attributes(" space name=malformed id=\"123\" value='");
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(
            messages,
            vec![
                "Attribute names may not contain whitespace: space name",
                "Attribute values should be quoted: space name=malformed",
                "Unclosed attribute value: value='",
            ]
        );
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs["id"], "123");
    }

    #[test]
    fn bare_name_expects_value() {
        let (attrs, errors) = parse_attributes(r#"a="1" flag"#);
        assert_eq!(attrs["a"], "1");
        assert_eq!(errors[0].to_string(), "Expected a value for the attribute: flag");
    }

    #[test]
    fn trailing_equals_expects_value() {
        let (_, errors) = parse_attributes("path=");
        assert_eq!(errors, vec![AttributeError::MissingValue { name: "path".into() }]);
    }

    #[test]
    fn quoted_values_are_entity_decoded() {
        let (attrs, _) = parse_attributes(r#"q="a &amp; b""#);
        assert_eq!(attrs["q"], "a & b");
    }

    #[test]
    fn spaces_around_equals_are_allowed() {
        let (attrs, errors) = parse_attributes(r#"id = "7""#);
        assert!(errors.is_empty());
        assert_eq!(attrs["id"], "7");
    }
}
