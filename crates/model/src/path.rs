//! Formatting of node locations for reports and `fn:path`.
use crate::node::{NodeKind, NodeRef};

/// Renders the location of a node as a path string.
pub trait PathFormatter: Send + Sync {
    /// The segment contributed by a single node, or `None` for nodes that do
    /// not appear in paths (the document node).
    fn format_segment(&self, node: &NodeRef) -> Option<String>;

    /// The full path from the document root down to `node`.
    fn format(&self, node: &NodeRef) -> String {
        let mut segments: Vec<String> = node
            .ancestors()
            .filter_map(|a| self.format_segment(&a))
            .collect();
        segments.reverse();
        if let Some(own) = self.format_segment(node) {
            segments.push(own);
        }
        format!("/{}", segments.join("/"))
    }
}

/// Produces paths that are themselves valid Metapath expressions, with a
/// positional predicate on every model step: `/catalog[1]/group[2]/@id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetapathPathFormatter;

impl PathFormatter for MetapathPathFormatter {
    fn format_segment(&self, node: &NodeRef) -> Option<String> {
        let name = node.name()?;
        match node.kind() {
            NodeKind::Document => None,
            NodeKind::Flag => Some(format!("@{}", name)),
            NodeKind::Assembly | NodeKind::Field => {
                Some(format!("{}[{}]", name, node.position_among_siblings()))
            }
        }
    }
}

/// Produces compact name-only paths: `/catalog/group/@id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamePathFormatter;

impl PathFormatter for NamePathFormatter {
    fn format_segment(&self, node: &NodeRef) -> Option<String> {
        let name = node.name()?;
        match node.kind() {
            NodeKind::Document => None,
            NodeKind::Flag => Some(format!("@{}", name)),
            NodeKind::Assembly | NodeKind::Field => Some(name.to_string()),
        }
    }
}
