use metaschema_model::{MetapathPathFormatter, NodeKind, NodeRef};

use super::{
    CallContext, FN, Function, FunctionLibrary, Properties, node_or_context, nodes, one, opt,
    opt_node,
};
use crate::error::MetapathError;
use crate::types::{AtomicType, AtomicValue, Item, QNameValue, Sequence};

fn node_name(node: &NodeRef) -> Option<&str> {
    match node.kind() {
        NodeKind::Document => None,
        _ => node.name(),
    }
}

fn fn_name(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let name = node_or_context(args, 0, ctx)?
        .as_ref()
        .and_then(|n| node_name(n).map(str::to_string))
        .unwrap_or_default();
    Ok(Sequence::from_string(name))
}

fn fn_node_name(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let name = node_or_context(args, 0, ctx)?
        .as_ref()
        .and_then(|n| node_name(n).map(|name| AtomicValue::QName(QNameValue::new(name))));
    Ok(Sequence::from_optional(name.map(Item::Atomic)))
}

fn fn_root(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_optional(
        node_or_context(args, 0, ctx)?.map(|n| Item::Node(n.root())),
    ))
}

fn fn_path(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_optional(node_or_context(args, 0, ctx)?.map(|n| {
        Item::Atomic(AtomicValue::String(n.to_path(&MetapathPathFormatter)))
    })))
}

fn fn_has_children(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let has = node_or_context(args, 0, ctx)?.is_some_and(|n| n.has_children());
    Ok(Sequence::from_bool(has))
}

fn fn_data(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let values = match args.first() {
        Some(arg) => arg.atomize()?,
        None => {
            let mut values = Vec::new();
            ctx.context_item()?.atomize_into(&mut values)?;
            values
        }
    };
    Ok(Sequence::from_atomics(values))
}

/// `fn:base-uri`: without an argument the focus node is used, and an absent
/// focus yields the empty sequence rather than an error.
fn fn_base_uri(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let node = match args.first() {
        Some(arg) => arg.first().and_then(|i| i.as_node().cloned()),
        None => ctx.focus.context_item().ok().and_then(|i| i.as_node().cloned()),
    };
    Ok(Sequence::from_optional(
        node.and_then(|n| n.resolved_base_uri())
            .map(|uri| Item::Atomic(AtomicValue::AnyUri(uri))),
    ))
}

fn fn_document_uri(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let uri = node_or_context(args, 0, ctx)?
        .filter(|n| n.kind() == NodeKind::Document)
        .and_then(|n| n.base_uri().map(str::to_string));
    Ok(Sequence::from_optional(
        uri.map(|u| Item::Atomic(AtomicValue::AnyUri(u))),
    ))
}

fn distinct_nodes(args: &[Sequence]) -> Result<Vec<NodeRef>, MetapathError> {
    let mut nodes = args.first().map(Sequence::nodes).transpose()?.unwrap_or_default();
    nodes.sort();
    nodes.dedup();
    Ok(nodes)
}

/// Nodes of the input that are not an ancestor of another input node.
fn fn_innermost(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let nodes = distinct_nodes(args)?;
    let kept: Vec<NodeRef> = nodes
        .iter()
        .filter(|candidate| {
            !nodes
                .iter()
                .any(|other| other.ancestors().any(|a| &a == *candidate))
        })
        .cloned()
        .collect();
    Ok(Sequence::from_nodes(kept))
}

/// Nodes of the input that have no ancestor among the input nodes.
fn fn_outermost(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let nodes = distinct_nodes(args)?;
    let kept: Vec<NodeRef> = nodes
        .iter()
        .filter(|candidate| {
            !candidate
                .ancestors()
                .any(|a| nodes.binary_search(&a).is_ok())
        })
        .cloned()
        .collect();
    Ok(Sequence::from_nodes(kept))
}

pub(super) fn register(library: &mut FunctionLibrary) {
    library
        .register(
            Function::new(FN, "name", fn_name)
                .optional("arg", opt_node())
                .returns(one(AtomicType::String))
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "local-name", fn_name)
                .optional("arg", opt_node())
                .returns(one(AtomicType::String))
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "node-name", fn_node_name)
                .optional("arg", opt_node())
                .returns(opt(AtomicType::QName))
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "root", fn_root)
                .optional("arg", opt_node())
                .returns(opt_node())
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "path", fn_path)
                .optional("arg", opt_node())
                .returns(opt(AtomicType::String))
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "has-children", fn_has_children)
                .optional("node", opt_node())
                .returns(one(AtomicType::Boolean))
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "data", fn_data)
                .optional("arg", super::any_items())
                .returns(super::many(AtomicType::AnyAtomic))
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "base-uri", fn_base_uri)
                .optional("arg", opt_node())
                .returns(opt(AtomicType::AnyUri))
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "document-uri", fn_document_uri)
                .optional("arg", opt_node())
                .returns(opt(AtomicType::AnyUri))
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "innermost", fn_innermost)
                .param("nodes", nodes())
                .returns(nodes()),
        )
        .register(
            Function::new(FN, "outermost", fn_outermost)
                .param("nodes", nodes())
                .returns(nodes()),
        );
}
