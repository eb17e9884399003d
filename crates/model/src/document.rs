//! An in-memory, arena-backed document tree.
//!
//! Nodes live in a single vector owned by the document; parent and child links
//! are plain indices into that vector, so handing out [`NodeRef`]s never creates
//! ownership cycles.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::datatype::DataType;
use crate::node::{Node, NodeIdentity, NodeKind, NodeRef, NodeValue};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    name: Option<String>,
    definition: Option<String>,
    value: Option<NodeValue>,
    parent: Option<usize>,
    flags: Vec<usize>,
    children: Vec<usize>,
    ordinal: usize,
}

impl NodeData {
    fn new(kind: NodeKind, name: Option<String>, parent: Option<usize>) -> Self {
        Self {
            kind,
            definition: name.clone(),
            name,
            value: None,
            parent,
            flags: Vec::new(),
            children: Vec::new(),
            ordinal: 0,
        }
    }
}

#[derive(Debug)]
struct DocumentData {
    id: u64,
    base_uri: Option<String>,
    nodes: Vec<NodeData>,
}

/// A complete document. Cloning is cheap; all clones share one arena.
#[derive(Debug, Clone)]
pub struct Document {
    data: Arc<DocumentData>,
}

impl Document {
    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::new()
    }

    /// The document node.
    pub fn root(&self) -> NodeRef {
        self.node(0)
    }

    /// The single top-level assembly, if the document has one.
    pub fn root_assembly(&self) -> Option<NodeRef> {
        self.data.nodes[0]
            .children
            .first()
            .map(|&index| self.node(index))
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.data.base_uri.as_deref()
    }

    /// Number of nodes in the document, including the document node and flags.
    pub fn len(&self) -> usize {
        self.data.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nodes.len() <= 1
    }

    fn node(&self, index: usize) -> NodeRef {
        NodeRef::new(ArenaNode {
            document: Arc::clone(&self.data),
            index,
        })
    }
}

#[derive(Debug, Clone)]
struct ArenaNode {
    document: Arc<DocumentData>,
    index: usize,
}

impl ArenaNode {
    fn data(&self) -> &NodeData {
        &self.document.nodes[self.index]
    }

    fn handle(&self, index: usize) -> NodeRef {
        NodeRef::new(ArenaNode {
            document: Arc::clone(&self.document),
            index,
        })
    }
}

impl Node for ArenaNode {
    fn kind(&self) -> NodeKind {
        self.data().kind
    }

    fn name(&self) -> Option<&str> {
        self.data().name.as_deref()
    }

    fn definition_name(&self) -> Option<&str> {
        self.data().definition.as_deref()
    }

    fn value(&self) -> Option<NodeValue> {
        self.data().value.clone()
    }

    fn parent(&self) -> Option<NodeRef> {
        self.data().parent.map(|p| self.handle(p))
    }

    fn flags(&self) -> Vec<NodeRef> {
        self.data().flags.iter().map(|&i| self.handle(i)).collect()
    }

    fn model_children(&self) -> Vec<NodeRef> {
        self.data().children.iter().map(|&i| self.handle(i)).collect()
    }

    fn base_uri(&self) -> Option<&str> {
        match self.data().kind {
            NodeKind::Document => self.document.base_uri.as_deref(),
            _ => None,
        }
    }

    fn identity(&self) -> NodeIdentity {
        NodeIdentity {
            document: self.document.id,
            ordinal: self.data().ordinal,
        }
    }
}

/// Builds a [`Document`]. Nested content is described with closures:
///
/// ```
/// use metaschema_model::{DataType, Document};
///
/// let doc = Document::builder()
///     .root_assembly("catalog", |catalog| {
///         catalog
///             .flag("id", DataType::Token, "c1")
///             .field("title", DataType::String, "Controls");
///     })
///     .build();
/// assert_eq!(doc.root_assembly().unwrap().name(), Some("catalog"));
/// ```
#[derive(Debug)]
pub struct DocumentBuilder {
    base_uri: Option<String>,
    nodes: Vec<NodeData>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self {
            base_uri: None,
            nodes: vec![NodeData::new(NodeKind::Document, None, None)],
        }
    }

    pub fn base_uri(mut self, uri: impl Into<String>) -> Self {
        self.base_uri = Some(uri.into());
        self
    }

    pub fn root_assembly(
        mut self,
        name: &str,
        build: impl FnOnce(&mut AssemblyBuilder<'_>),
    ) -> Self {
        let index = push_node(&mut self.nodes, NodeKind::Assembly, name, 0);
        self.nodes[0].children.push(index);
        build(&mut AssemblyBuilder {
            nodes: &mut self.nodes,
            index,
        });
        self
    }

    pub fn build(mut self) -> Document {
        assign_document_order(&mut self.nodes);
        Document {
            data: Arc::new(DocumentData {
                id: NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed),
                base_uri: self.base_uri,
                nodes: self.nodes,
            }),
        }
    }
}

/// Adds flags, fields and nested assemblies to an assembly.
pub struct AssemblyBuilder<'b> {
    nodes: &'b mut Vec<NodeData>,
    index: usize,
}

impl AssemblyBuilder<'_> {
    /// Overrides the definition name, which defaults to the use-name.
    pub fn definition(&mut self, name: &str) -> &mut Self {
        self.nodes[self.index].definition = Some(name.to_string());
        self
    }

    pub fn flag(&mut self, name: &str, datatype: DataType, value: &str) -> &mut Self {
        add_flag(self.nodes, self.index, name, datatype, value);
        self
    }

    pub fn field(&mut self, name: &str, datatype: DataType, value: &str) -> &mut Self {
        self.field_with(name, datatype, value, |_| {})
    }

    pub fn field_with(
        &mut self,
        name: &str,
        datatype: DataType,
        value: &str,
        build: impl FnOnce(&mut FieldBuilder<'_>),
    ) -> &mut Self {
        let index = push_node(self.nodes, NodeKind::Field, name, self.index);
        self.nodes[index].value = Some(NodeValue::new(value, datatype));
        self.nodes[self.index].children.push(index);
        build(&mut FieldBuilder {
            nodes: &mut *self.nodes,
            index,
        });
        self
    }

    pub fn assembly(
        &mut self,
        name: &str,
        build: impl FnOnce(&mut AssemblyBuilder<'_>),
    ) -> &mut Self {
        let index = push_node(self.nodes, NodeKind::Assembly, name, self.index);
        self.nodes[self.index].children.push(index);
        build(&mut AssemblyBuilder {
            nodes: &mut *self.nodes,
            index,
        });
        self
    }
}

/// Adds flags to a field.
pub struct FieldBuilder<'b> {
    nodes: &'b mut Vec<NodeData>,
    index: usize,
}

impl FieldBuilder<'_> {
    pub fn definition(&mut self, name: &str) -> &mut Self {
        self.nodes[self.index].definition = Some(name.to_string());
        self
    }

    pub fn flag(&mut self, name: &str, datatype: DataType, value: &str) -> &mut Self {
        add_flag(self.nodes, self.index, name, datatype, value);
        self
    }
}

fn push_node(nodes: &mut Vec<NodeData>, kind: NodeKind, name: &str, parent: usize) -> usize {
    nodes.push(NodeData::new(kind, Some(name.to_string()), Some(parent)));
    nodes.len() - 1
}

fn add_flag(nodes: &mut Vec<NodeData>, parent: usize, name: &str, datatype: DataType, value: &str) {
    let index = push_node(nodes, NodeKind::Flag, name, parent);
    nodes[index].value = Some(NodeValue::new(value, datatype));
    nodes[parent].flags.push(index);
}

/// Numbers nodes in pre-order, visiting a node's flags before its children.
fn assign_document_order(nodes: &mut [NodeData]) {
    let mut stack = vec![0usize];
    let mut ordinal = 0;
    while let Some(index) = stack.pop() {
        nodes[index].ordinal = ordinal;
        ordinal += 1;
        let flags = nodes[index].flags.clone();
        for flag in flags {
            nodes[flag].ordinal = ordinal;
            ordinal += 1;
        }
        stack.extend(nodes[index].children.iter().rev().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_counts_every_node() {
        let doc = Document::builder()
            .root_assembly("catalog", |c| {
                c.flag("id", DataType::Token, "c1").field_with(
                    "prop",
                    DataType::String,
                    "value",
                    |p| {
                        p.flag("name", DataType::Token, "label");
                    },
                );
            })
            .build();
        assert_eq!(doc.len(), 5);
        assert!(!doc.is_empty());
    }

    #[test]
    fn test_definition_defaults_to_name() {
        let doc = Document::builder()
            .root_assembly("catalog", |c| {
                c.assembly("group", |g| {
                    g.definition("control-group");
                });
            })
            .build();
        let catalog = doc.root_assembly().unwrap();
        assert_eq!(catalog.definition_name(), Some("catalog"));
        let group = catalog.children_named("group").remove(0);
        assert_eq!(group.definition_name(), Some("control-group"));
    }

    #[test]
    fn test_documents_have_distinct_identities() {
        let a = Document::builder().root_assembly("a", |_| {}).build();
        let b = Document::builder().root_assembly("a", |_| {}).build();
        assert_ne!(a.root(), b.root());
        assert_eq!(a.root(), a.root());
    }
}
