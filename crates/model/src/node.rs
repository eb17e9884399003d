//! Defines the core abstraction for a navigable, read-only Metaschema node tree.
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use crate::datatype::DataType;
use crate::path::PathFormatter;

/// The structural kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The document node that owns the root assembly.
    Document,
    /// A container of flags, fields and other assemblies.
    Assembly,
    /// A leaf carrying a value, optionally decorated with flags.
    Field,
    /// A named simple value attached to an assembly or field.
    Flag,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Document => "document",
            NodeKind::Assembly => "assembly",
            NodeKind::Field => "field",
            NodeKind::Flag => "flag",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The simple content of a field or flag, in lexical form, together with the
/// data type its definition declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeValue {
    pub lexical: String,
    pub datatype: DataType,
}

impl NodeValue {
    pub fn new(lexical: impl Into<String>, datatype: DataType) -> Self {
        Self {
            lexical: lexical.into(),
            datatype,
        }
    }
}

/// Stable identity of a node. The derived ordering is document order: nodes of
/// one document sort by their pre-order ordinal, and documents sort by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdentity {
    pub document: u64,
    pub ordinal: usize,
}

/// The universal contract for a node in a read-only Metaschema document tree.
///
/// The Metapath evaluator and the constraint validator are written exclusively
/// against this trait, allowing them to operate on any tree (parsed XML, JSON,
/// YAML, or the in-memory [`Document`](crate::Document)) that implements it.
pub trait Node: fmt::Debug + Send + Sync {
    /// The structural kind of this node.
    fn kind(&self) -> NodeKind;

    /// The use-name of the node. `None` for the document node.
    fn name(&self) -> Option<&str>;

    /// The name of the definition this node is an instance of. Constraints are
    /// bound to definitions, so this decides which constraints apply.
    fn definition_name(&self) -> Option<&str>;

    /// The simple value of the node, or `None` when the node has no typed
    /// value (documents, assemblies).
    fn value(&self) -> Option<NodeValue>;

    /// The parent node. Returns `None` for the document node.
    fn parent(&self) -> Option<NodeRef>;

    /// The flags of an assembly or field, in declaration order.
    fn flags(&self) -> Vec<NodeRef>;

    /// The model children (assemblies and fields) in document order. For the
    /// document node this is the root assembly.
    fn model_children(&self) -> Vec<NodeRef>;

    /// The base URI declared on this node, if any. Usually only documents
    /// declare one; see [`NodeRef::resolved_base_uri`] for the inherited value.
    fn base_uri(&self) -> Option<&str>;

    /// The identity of this node, used for `is`, deduplication and document order.
    fn identity(&self) -> NodeIdentity;
}

/// A shared handle to a node. Equality, hashing and ordering follow node
/// identity, never structural content.
#[derive(Clone)]
pub struct NodeRef(Arc<dyn Node>);

impl NodeRef {
    pub fn new<N: Node + 'static>(node: N) -> Self {
        Self(Arc::new(node))
    }

    pub fn from_arc(node: Arc<dyn Node>) -> Self {
        Self(node)
    }

    /// The flag with the given name, if present.
    pub fn flag(&self, name: &str) -> Option<NodeRef> {
        self.flags().into_iter().find(|f| f.name() == Some(name))
    }

    /// The model children with the given use-name.
    pub fn children_named(&self, name: &str) -> Vec<NodeRef> {
        self.model_children()
            .into_iter()
            .filter(|c| c.name() == Some(name))
            .collect()
    }

    pub fn has_children(&self) -> bool {
        !self.model_children().is_empty()
    }

    /// Iterates the ancestors of this node, nearest first.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: self.parent(),
        }
    }

    /// Iterates the model descendants of this node in document order. Flags are
    /// not descendants.
    pub fn descendants(&self) -> Descendants {
        let mut stack = self.model_children();
        stack.reverse();
        Descendants { stack }
    }

    /// The outermost ancestor, usually the document node.
    pub fn root(&self) -> NodeRef {
        self.ancestors().last().unwrap_or_else(|| self.clone())
    }

    /// The 1-based position of this node among the siblings sharing its name.
    pub fn position_among_siblings(&self) -> usize {
        let Some(parent) = self.parent() else {
            return 1;
        };
        let siblings = match self.kind() {
            NodeKind::Flag => parent.flags(),
            _ => parent.model_children(),
        };
        siblings
            .iter()
            .filter(|s| s.name() == self.name())
            .position(|s| s == self)
            .map_or(1, |p| p + 1)
    }

    /// The base URI of this node, inherited from the nearest ancestor that
    /// declares one.
    pub fn resolved_base_uri(&self) -> Option<String> {
        if let Some(uri) = self.base_uri() {
            return Some(uri.to_string());
        }
        self.ancestors()
            .find_map(|a| a.base_uri().map(str::to_string))
    }

    /// Formats the location of this node with the given formatter.
    pub fn to_path(&self, formatter: &dyn PathFormatter) -> String {
        formatter.format(self)
    }
}

impl Deref for NodeRef {
    type Target = dyn Node;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("identity", &self.identity())
            .finish()
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for NodeRef {}

impl Hash for NodeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for NodeRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

pub struct Ancestors {
    next: Option<NodeRef>,
}

impl Iterator for Ancestors {
    type Item = NodeRef;

    fn next(&mut self) -> Option<NodeRef> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}

pub struct Descendants {
    stack: Vec<NodeRef>,
}

impl Iterator for Descendants {
    type Item = NodeRef;

    fn next(&mut self) -> Option<NodeRef> {
        let node = self.stack.pop()?;
        let mut children = node.model_children();
        children.reverse();
        self.stack.extend(children);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use crate::datatype::DataType;
    use crate::document::Document;

    fn sample() -> Document {
        Document::builder()
            .base_uri("file:///tmp/catalog.xml")
            .root_assembly("catalog", |catalog| {
                catalog
                    .flag("uuid", DataType::Uuid, "6b3a9bb5-5a44-4d6f-8bd5-3bb3c2a2f3a1")
                    .field("title", DataType::MarkupLine, "Sample")
                    .assembly("group", |g| {
                        g.flag("id", DataType::Token, "g1");
                        g.field("title", DataType::String, "First");
                    })
                    .assembly("group", |g| {
                        g.flag("id", DataType::Token, "g2");
                    });
            })
            .build()
    }

    #[test]
    fn test_navigation() {
        let doc = sample();
        let catalog = doc.root_assembly().unwrap();
        assert_eq!(catalog.name(), Some("catalog"));
        assert_eq!(catalog.children_named("group").len(), 2);
        assert_eq!(catalog.flag("uuid").unwrap().value().unwrap().datatype, DataType::Uuid);
        assert_eq!(catalog.parent(), Some(doc.root()));
    }

    #[test]
    fn test_descendants_in_document_order() {
        let doc = sample();
        let names: Vec<_> = doc
            .root()
            .descendants()
            .map(|n| n.name().unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, vec!["catalog", "title", "group", "title", "group"]);

        let nodes: Vec<_> = doc.root().descendants().collect();
        assert!(nodes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_flags_precede_children_in_document_order() {
        let doc = sample();
        let catalog = doc.root_assembly().unwrap();
        let flag = catalog.flag("uuid").unwrap();
        let title = catalog.children_named("title").remove(0);
        assert!(catalog < flag);
        assert!(flag < title);
    }

    #[test]
    fn test_sibling_position_and_base_uri() {
        let doc = sample();
        let groups = doc.root_assembly().unwrap().children_named("group");
        assert_eq!(groups[0].position_among_siblings(), 1);
        assert_eq!(groups[1].position_among_siblings(), 2);
        assert_eq!(
            groups[1].resolved_base_uri().as_deref(),
            Some("file:///tmp/catalog.xml")
        );
        assert_eq!(groups[1].root(), doc.root());
    }
}
