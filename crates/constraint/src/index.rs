//! Key-based node indexes backing index, unique and index-has-key constraints.
use indexmap::IndexMap;
use metaschema_metapath::{DynamicContext, Item, Sequence};
use metaschema_model::{MetapathPathFormatter, NodeRef};

use crate::constraint::KeyField;
use crate::error::ConstraintError;

/// One string per key field; `None` where the field selected nothing.
pub type Key = Vec<Option<String>>;

/// Nodes registered under their computed keys.
///
/// An index belongs to a single validation pass and is never shared between
/// threads.
#[derive(Debug, Clone, Default)]
pub struct Index {
    key_fields: Vec<KeyField>,
    entries: IndexMap<Key, NodeRef>,
}

impl Index {
    pub fn new(key_fields: Vec<KeyField>) -> Self {
        Self {
            key_fields,
            entries: IndexMap::new(),
        }
    }

    pub fn key_fields(&self) -> &[KeyField] {
        &self.key_fields
    }

    /// Registers `node` under `key`, returning the node previously stored
    /// there. The new node replaces the old one.
    pub fn put(&mut self, node: NodeRef, key: Key) -> Option<NodeRef> {
        self.entries.insert(key, node)
    }

    pub fn get(&self, key: &Key) -> Option<&NodeRef> {
        self.entries.get(key)
    }

    /// Computes the key of `node` from this index's key fields and registers it.
    pub fn put_node(
        &mut self,
        node: NodeRef,
        ctx: &DynamicContext,
    ) -> Result<Option<NodeRef>, ConstraintError> {
        let key = to_key(&node, &self.key_fields, ctx)?;
        Ok(self.put(node, key))
    }

    pub fn get_node(
        &self,
        node: &NodeRef,
        ctx: &DynamicContext,
    ) -> Result<Option<&NodeRef>, ConstraintError> {
        let key = to_key(node, &self.key_fields, ctx)?;
        Ok(self.get(&key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `true` when no key field selected anything.
pub fn is_all_none(key: &Key) -> bool {
    key.iter().all(Option::is_none)
}

/// Evaluates every key field against `node`.
pub fn to_key(
    node: &NodeRef,
    key_fields: &[KeyField],
    ctx: &DynamicContext,
) -> Result<Key, ConstraintError> {
    key_fields
        .iter()
        .map(|field| key_component(node, field, ctx))
        .collect()
}

fn key_component(
    node: &NodeRef,
    field: &KeyField,
    ctx: &DynamicContext,
) -> Result<Option<String>, ConstraintError> {
    let expression = &field.target;
    let item = expression
        .evaluate_as_item(Some(Item::Node(node.clone())), ctx)
        .map_err(|e| {
            if e.is_cardinality() {
                ConstraintError::key_field(format!(
                    "Key path '{}' did not result in a single item",
                    expression
                ))
            } else {
                ConstraintError::metapath(expression.source(), e)
            }
        })?;
    let Some(item) = item else {
        return Ok(None);
    };
    let value = Sequence::from_item(item)
        .atomize_optional()
        .map_err(|e| ConstraintError::metapath(expression.source(), e))?
        .map(|atomic| atomic.to_string_value())
        .unwrap_or_default();
    let Some(pattern) = &field.pattern else {
        return Ok(Some(value));
    };
    let path = || node.to_path(&MetapathPathFormatter);
    if !pattern.is_match(&value) {
        return Err(ConstraintError::key_field(format!(
            "Key field declares the pattern '{}' which does not match the value '{}' of node '{}'",
            pattern,
            value,
            path()
        )));
    }
    if pattern.group_count() != 1 {
        return Err(ConstraintError::key_field(format!(
            "The first group was not a match for value '{}' of node '{}' for key field pattern '{}'",
            value,
            path(),
            pattern
        )));
    }
    Ok(pattern.first_group(&value).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_model::{DataType, Document};

    fn sample() -> Document {
        Document::builder()
            .root_assembly("catalog", |catalog| {
                catalog
                    .assembly("control", |c| {
                        c.flag("id", DataType::Token, "ac-1");
                    })
                    .assembly("control", |c| {
                        c.flag("id", DataType::Token, "ac-2");
                    })
                    .assembly("control", |c| {
                        c.flag("id", DataType::Token, "ac-1");
                    })
                    .assembly("control", |_| {});
            })
            .build()
    }

    fn controls(doc: &Document) -> Vec<NodeRef> {
        doc.root_assembly()
            .map(|catalog| catalog.children_named("control"))
            .unwrap_or_default()
    }

    #[test]
    fn test_put_returns_previous_node() {
        let doc = sample();
        let ctx = DynamicContext::default();
        let nodes = controls(&doc);
        let mut index = Index::new(vec![KeyField::new("@id").unwrap()]);
        assert!(index.put_node(nodes[0].clone(), &ctx).unwrap().is_none());
        assert!(index.put_node(nodes[1].clone(), &ctx).unwrap().is_none());
        let previous = index.put_node(nodes[2].clone(), &ctx).unwrap();
        assert_eq!(previous.as_ref(), Some(&nodes[0]));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get_node(&nodes[0], &ctx).unwrap(), Some(&nodes[2]));
        assert_eq!(
            index.get(&vec![Some("ac-2".to_string())]),
            Some(&nodes[1])
        );
    }

    #[test]
    fn test_missing_key_field_is_none() {
        let doc = sample();
        let ctx = DynamicContext::default();
        let nodes = controls(&doc);
        let key = to_key(&nodes[3], &[KeyField::new("@id").unwrap()], &ctx).unwrap();
        assert_eq!(key, vec![None]);
        assert!(is_all_none(&key));
    }

    #[test]
    fn test_pattern_extracts_first_group() {
        let doc = sample();
        let ctx = DynamicContext::default();
        let nodes = controls(&doc);
        let field = KeyField::with_pattern("@id", "ac-(\\d+)").unwrap();
        assert_eq!(
            to_key(&nodes[1], &[field], &ctx).unwrap(),
            vec![Some("2".to_string())]
        );
        let mismatch = KeyField::with_pattern("@id", "xx-(\\d+)").unwrap();
        let err = to_key(&nodes[1], &[mismatch], &ctx).unwrap_err();
        assert!(err.to_string().contains("does not match the value 'ac-2'"));
        let no_group = KeyField::with_pattern("@id", "ac-\\d+").unwrap();
        assert!(to_key(&nodes[1], &[no_group], &ctx).is_err());
    }

    #[test]
    fn test_key_field_must_select_single_item() {
        let doc = sample();
        let ctx = DynamicContext::default();
        let Some(catalog) = doc.root_assembly() else {
            panic!("Expected a root assembly");
        };
        let err = to_key(&catalog, &[KeyField::new("control/@id").unwrap()], &ctx).unwrap_err();
        assert!(err.to_string().contains("did not result in a single item"));
    }
}
