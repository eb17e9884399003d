use std::fmt::Write as _;

use url::Url;

use super::{
    CallContext, FN, Function, FunctionLibrary, Properties, one, opt, opt_string, string_arg,
};
use crate::error::{MetapathError, codes};
use crate::types::{AtomicType, AtomicValue, Item, Sequence};

/// Percent-encodes every UTF-8 byte of `input` for which `keep` is false.
fn percent_encode(input: &str, keep: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if keep(c) {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "%{:02X}", byte);
            }
        }
    }
    out
}

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~')
}

fn fn_encode_for_uri(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_string(percent_encode(&string_arg(args, 0), is_unreserved)))
}

fn fn_iri_to_uri(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let encoded = percent_encode(&string_arg(args, 0), |c| {
        c.is_ascii()
            && !c.is_ascii_control()
            && !matches!(c, ' ' | '<' | '>' | '"' | '{' | '}' | '|' | '\\' | '^' | '`')
    });
    Ok(Sequence::from_string(encoded))
}

fn fn_escape_html_uri(
    args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    let encoded = percent_encode(&string_arg(args, 0), |c| (' '..='~').contains(&c));
    Ok(Sequence::from_string(encoded))
}

fn parse_url(uri: &str) -> Result<Url, MetapathError> {
    Url::parse(uri).map_err(|e| {
        MetapathError::function(codes::FORG0002, format!("Invalid URI '{}': {}", uri, e))
    })
}

/// `fn:resolve-uri`: resolves against the given base, or the static base URI
/// when no base is passed.
fn fn_resolve_uri(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let Some(relative) = opt_string(args, 0) else {
        return Ok(Sequence::empty());
    };
    if let Ok(absolute) = Url::parse(&relative) {
        return Ok(Sequence::from_atomic(AtomicValue::AnyUri(absolute.to_string())));
    }
    let base = if args.len() > 1 {
        Some(string_arg(args, 1))
    } else {
        ctx.dynamic.static_context().base_uri.clone()
    };
    let Some(base) = base else {
        return Err(MetapathError::function(
            codes::FONS0005,
            "The static base URI is not defined",
        ));
    };
    let resolved = parse_url(&base)?.join(&relative).map_err(|e| {
        MetapathError::function(
            codes::FORG0002,
            format!("Cannot resolve '{}' against '{}': {}", relative, base, e),
        )
    })?;
    Ok(Sequence::from_atomic(AtomicValue::AnyUri(resolved.to_string())))
}

fn fn_static_base_uri(
    _args: &[Sequence],
    ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_optional(
        ctx.dynamic
            .static_context()
            .base_uri
            .clone()
            .map(|uri| Item::Atomic(AtomicValue::AnyUri(uri))),
    ))
}

pub(super) fn register(library: &mut FunctionLibrary) {
    library
        .register(
            Function::new(FN, "resolve-uri", fn_resolve_uri)
                .param("relative", opt(AtomicType::String))
                .optional("base", one(AtomicType::String))
                .returns(opt(AtomicType::AnyUri))
                .properties(Properties::CONTEXT),
        )
        .register(
            Function::new(FN, "encode-for-uri", fn_encode_for_uri)
                .param("uri-part", opt(AtomicType::String))
                .returns(one(AtomicType::String)),
        )
        .register(
            Function::new(FN, "iri-to-uri", fn_iri_to_uri)
                .param("iri", opt(AtomicType::String))
                .returns(one(AtomicType::String)),
        )
        .register(
            Function::new(FN, "escape-html-uri", fn_escape_html_uri)
                .param("uri", opt(AtomicType::String))
                .returns(one(AtomicType::String)),
        )
        .register(
            Function::new(FN, "static-base-uri", fn_static_base_uri)
                .returns(opt(AtomicType::AnyUri))
                .properties(Properties::CONTEXT),
        );
}
