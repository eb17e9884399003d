//! Axis navigation over the node model.
//!
//! Forward axes yield nodes in document order. Reverse axes yield them
//! nearest first, which is the order positional predicates count in; the
//! engine restores document order once the step is complete.
use metaschema_model::{NodeKind, NodeRef};

use crate::ast::{Axis, NodeTest};

pub type AxisIter = Box<dyn Iterator<Item = NodeRef> + Send>;

pub fn axis_iter(node: &NodeRef, axis: Axis) -> AxisIter {
    match axis {
        Axis::Child => Box::new(node.model_children().into_iter()),
        Axis::Descendant => Box::new(node.descendants()),
        Axis::DescendantOrSelf => Box::new(std::iter::once(node.clone()).chain(node.descendants())),
        Axis::Flag => Box::new(node.flags().into_iter()),
        Axis::Parent => Box::new(node.parent().into_iter()),
        Axis::Ancestor => Box::new(node.ancestors()),
        Axis::AncestorOrSelf => Box::new(std::iter::once(node.clone()).chain(node.ancestors())),
        Axis::SelfAxis => Box::new(std::iter::once(node.clone())),
        Axis::FollowingSibling => Box::new(following_siblings(node).into_iter()),
        Axis::PrecedingSibling => {
            let mut siblings = preceding_siblings(node);
            siblings.reverse();
            Box::new(siblings.into_iter())
        }
        Axis::Following => Box::new(following(node).into_iter()),
        Axis::Preceding => {
            let mut nodes = preceding(node);
            nodes.reverse();
            Box::new(nodes.into_iter())
        }
    }
}

/// Whether `node` passes `test` when reached along `axis`. Name tests and
/// wildcards select flags on the flag axis and assemblies or fields
/// elsewhere; the self axis accepts any named node.
pub fn matches(node: &NodeRef, test: &NodeTest, axis: Axis) -> bool {
    match test {
        NodeTest::Kind(kind) => kind.matches(node),
        NodeTest::Wildcard => is_principal(node, axis),
        NodeTest::Name(name) => {
            is_principal(node, axis) && node.name() == Some(name.local_part.as_str())
        }
    }
}

fn is_principal(node: &NodeRef, axis: Axis) -> bool {
    match (axis, node.kind()) {
        (_, NodeKind::Document) => false,
        (Axis::Flag, kind) => kind == NodeKind::Flag,
        (Axis::SelfAxis, _) => true,
        (_, kind) => kind != NodeKind::Flag,
    }
}

fn siblings(node: &NodeRef) -> Vec<NodeRef> {
    match (node.kind(), node.parent()) {
        (NodeKind::Flag, _) | (_, None) => Vec::new(),
        (_, Some(parent)) => parent.model_children(),
    }
}

fn following_siblings(node: &NodeRef) -> Vec<NodeRef> {
    siblings(node)
        .into_iter()
        .skip_while(|s| s != node)
        .skip(1)
        .collect()
}

fn preceding_siblings(node: &NodeRef) -> Vec<NodeRef> {
    siblings(node).into_iter().take_while(|s| s != node).collect()
}

fn following(node: &NodeRef) -> Vec<NodeRef> {
    let mut out = Vec::new();
    let mut current = node.clone();
    if node.kind() == NodeKind::Flag {
        match node.parent() {
            Some(parent) => {
                out.extend(parent.descendants());
                current = parent;
            }
            None => return out,
        }
    }
    loop {
        for sibling in following_siblings(&current) {
            out.push(sibling.clone());
            out.extend(sibling.descendants());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    out
}

/// Nodes before `node` in document order, excluding its ancestors and all
/// flags, in document order.
fn preceding(node: &NodeRef) -> Vec<NodeRef> {
    let start = match node.kind() {
        NodeKind::Flag => match node.parent() {
            Some(parent) => parent,
            None => return Vec::new(),
        },
        _ => node.clone(),
    };
    let mut chain: Vec<NodeRef> = start.ancestors().collect();
    chain.reverse();
    chain.push(start);

    let mut out = Vec::new();
    for level in &chain {
        for sibling in preceding_siblings(level) {
            out.push(sibling.clone());
            out.extend(sibling.descendants());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use metaschema_model::{DataType, Document};

    use super::*;
    use crate::ast::QName;
    use crate::types::KindTest;

    fn sample() -> Document {
        Document::builder()
            .root_assembly("catalog", |c| {
                c.flag("id", DataType::Token, "c")
                    .field("title", DataType::String, "T")
                    .assembly("group", |g| {
                        g.flag("id", DataType::Token, "g1")
                            .field("title", DataType::String, "G1")
                            .assembly("control", |ctl| {
                                ctl.flag("id", DataType::Token, "ac-1");
                            });
                    })
                    .assembly("group", |g| {
                        g.flag("id", DataType::Token, "g2");
                    });
            })
            .build()
    }

    fn names(nodes: impl Iterator<Item = NodeRef>) -> Vec<String> {
        nodes
            .map(|n| n.name().unwrap_or("#doc").to_string())
            .collect()
    }

    #[test]
    fn test_forward_axes() {
        let doc = sample();
        let catalog = doc.root_assembly().unwrap();
        assert_eq!(
            names(axis_iter(&catalog, Axis::Child)),
            vec!["title", "group", "group"]
        );
        assert_eq!(
            names(axis_iter(&catalog, Axis::Descendant)),
            vec!["title", "group", "title", "control", "group"]
        );
        assert_eq!(names(axis_iter(&catalog, Axis::Flag)), vec!["id"]);
    }

    #[test]
    fn test_reverse_axes_nearest_first() {
        let doc = sample();
        let catalog = doc.root_assembly().unwrap();
        let control = catalog.descendants().find(|n| n.name() == Some("control")).unwrap();
        assert_eq!(
            names(axis_iter(&control, Axis::Ancestor)),
            vec!["group", "catalog", "#doc"]
        );
        assert_eq!(
            names(axis_iter(&control, Axis::Preceding)),
            vec!["title", "title"]
        );
    }

    #[test]
    fn test_siblings_and_following() {
        let doc = sample();
        let catalog = doc.root_assembly().unwrap();
        let title = catalog.children_named("title").remove(0);
        assert_eq!(
            names(axis_iter(&title, Axis::FollowingSibling)),
            vec!["group", "group"]
        );
        assert_eq!(
            names(axis_iter(&title, Axis::Following)),
            vec!["group", "title", "control", "group"]
        );
        let flag = catalog.flag("id").unwrap();
        assert_eq!(axis_iter(&flag, Axis::FollowingSibling).count(), 0);
        assert_eq!(axis_iter(&flag, Axis::Following).count(), 5);
    }

    #[test]
    fn test_node_tests() {
        let doc = sample();
        let catalog = doc.root_assembly().unwrap();
        let flag = catalog.flag("id").unwrap();
        let id = NodeTest::Name(QName::new("id"));
        assert!(matches(&flag, &id, Axis::Flag));
        assert!(!matches(&flag, &id, Axis::Child));
        assert!(matches(&flag, &NodeTest::Wildcard, Axis::SelfAxis));
        assert!(!matches(&doc.root(), &NodeTest::Wildcard, Axis::SelfAxis));
        assert!(matches(
            &catalog,
            &NodeTest::Kind(KindTest::Assembly(Some("catalog".into()))),
            Axis::SelfAxis
        ));
    }
}
