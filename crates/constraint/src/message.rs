//! Constraint message templates and list formatting helpers.
//!
//! A template is literal text with embedded `{ expression }` segments. Each
//! segment is compiled once and evaluated against the target node when a
//! finding is reported; the string values of its result are joined with
//! `", "`.
use std::fmt;

use metaschema_metapath::{DynamicContext, Item, MetapathExpression};
use metaschema_model::NodeRef;

use crate::error::ConstraintError;

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Expression(MetapathExpression),
}

#[derive(Debug, Clone)]
pub struct MessageTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl MessageTemplate {
    pub fn parse(source: &str) -> Result<Self, ConstraintError> {
        let invalid = |message: &str| ConstraintError::InvalidMessage {
            template: source.to_string(),
            message: message.to_string(),
        };
        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Text(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
            let expression = after[..close].trim();
            if expression.is_empty() {
                return Err(invalid("empty expression"));
            }
            let compiled = MetapathExpression::compile(expression)
                .map_err(|e| ConstraintError::metapath(expression, e))?;
            segments.push(Segment::Expression(compiled));
            rest = &after[close + 1..];
        }
        if rest.contains('}') {
            return Err(invalid("unmatched '}'"));
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Renders the template with `target` as the context item of every
    /// embedded expression.
    pub fn render(
        &self,
        target: &NodeRef,
        ctx: &DynamicContext,
    ) -> Result<String, ConstraintError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Expression(expression) => {
                    let result = expression
                        .evaluate(Some(Item::Node(target.clone())), ctx)
                        .map_err(|e| ConstraintError::metapath(expression.source(), e))?;
                    let values = result
                        .iter()
                        .map(|item| item.string_value())
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|e| ConstraintError::metapath(expression.source(), e))?;
                    out.push_str(&values.join(", "));
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for MessageTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Joins `items` as an English list: `a`, `a and b`, `a, b, and c`.
pub fn join_with_oxford_comma<S: AsRef<str>>(items: &[S], conjunction: &str) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [first, second] => format!("{} {} {}", first.as_ref(), conjunction, second.as_ref()),
        [init @ .., last] => {
            let head: Vec<&str> = init.iter().map(AsRef::as_ref).collect();
            format!("{}, {} {}", head.join(", "), conjunction, last.as_ref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_model::{DataType, Document};

    fn sample() -> Document {
        Document::builder()
            .root_assembly("catalog", |catalog| {
                catalog
                    .flag("id", DataType::Token, "cat-1")
                    .field("title", DataType::String, "Controls");
            })
            .build()
    }

    #[test]
    fn test_render_embedded_expressions() {
        let doc = sample();
        let Some(catalog) = doc.root_assembly() else {
            panic!("Expected a root assembly");
        };
        let template = MessageTemplate::parse("Catalog { @id } is titled '{title}'.").unwrap();
        assert_eq!(
            template.render(&catalog, &DynamicContext::default()).unwrap(),
            "Catalog cat-1 is titled 'Controls'."
        );
        let literal = MessageTemplate::parse("No expressions here").unwrap();
        assert_eq!(
            literal.render(&catalog, &DynamicContext::default()).unwrap(),
            "No expressions here"
        );
    }

    #[test]
    fn test_invalid_templates() {
        assert!(matches!(
            MessageTemplate::parse("broken { @id"),
            Err(ConstraintError::InvalidMessage { .. })
        ));
        assert!(matches!(
            MessageTemplate::parse("empty {  }"),
            Err(ConstraintError::InvalidMessage { .. })
        ));
        assert!(matches!(
            MessageTemplate::parse("bad { 1 + }"),
            Err(ConstraintError::Metapath { .. })
        ));
    }

    #[test]
    fn test_oxford_comma() {
        let empty: [&str; 0] = [];
        assert_eq!(join_with_oxford_comma(&empty, "and"), "");
        assert_eq!(join_with_oxford_comma(&["'a'"], "and"), "'a'");
        assert_eq!(join_with_oxford_comma(&["a", "b"], "or"), "a or b");
        assert_eq!(join_with_oxford_comma(&["a", "b", "c"], "and"), "a, b, and c");
    }
}
