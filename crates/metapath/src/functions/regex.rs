use regex::{Regex, RegexBuilder};

use super::{CallContext, FN, Function, FunctionLibrary, many, one, opt, opt_string, string_arg};
use crate::error::{MetapathError, codes};
use crate::types::{AtomicType, AtomicValue, Sequence};

/// Compiles an XPath regular expression with its flag string (`s`, `m`, `i`,
/// `x` and `q`).
pub(crate) fn compile_regex(pattern: &str, flags: &str) -> Result<Regex, MetapathError> {
    let mut literal = false;
    let mut builder_flags = (false, false, false, false);
    for flag in flags.chars() {
        match flag {
            's' => builder_flags.0 = true,
            'm' => builder_flags.1 = true,
            'i' => builder_flags.2 = true,
            'x' => builder_flags.3 = true,
            'q' => literal = true,
            other => {
                return Err(MetapathError::function(
                    codes::FORX0001,
                    format!("Invalid regular expression flag '{}'", other),
                ));
            }
        }
    }
    let source = if literal {
        regex::escape(pattern)
    } else {
        pattern.to_string()
    };
    let (dot_all, multi_line, case_insensitive, extended) = builder_flags;
    RegexBuilder::new(&source)
        .dot_matches_new_line(dot_all)
        .multi_line(multi_line)
        .case_insensitive(case_insensitive)
        .ignore_whitespace(extended && !literal)
        .build()
        .map_err(|e| {
            MetapathError::function(
                codes::FORX0002,
                format!("Invalid regular expression '{}': {}", pattern, e),
            )
        })
}

/// Rewrites an XPath replacement string (`$N`, `\$`, `\\`) into the
/// `regex` crate's syntax.
fn replacement_template(replacement: &str) -> Result<String, MetapathError> {
    let invalid = || {
        MetapathError::function(
            codes::FORX0004,
            format!("Invalid replacement string '{}'", replacement),
        )
    };
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\\') => out.push('\\'),
                Some('$') => out.push_str("$$"),
                _ => return Err(invalid()),
            },
            '$' => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    digits.push(d);
                    chars.next();
                }
                if digits.is_empty() {
                    return Err(invalid());
                }
                out.push_str("${");
                out.push_str(&digits);
                out.push('}');
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn fn_matches(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let regex = compile_regex(&string_arg(args, 1), &string_arg(args, 2))?;
    Ok(Sequence::from_bool(regex.is_match(&string_arg(args, 0))))
}

fn fn_replace(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let flags = string_arg(args, 3);
    let regex = compile_regex(&string_arg(args, 1), &flags)?;
    if regex.is_match("") {
        return Err(MetapathError::function(
            codes::FORX0003,
            "The pattern matches the empty string",
        ));
    }
    let replacement = string_arg(args, 2);
    let input = string_arg(args, 0);
    let result = if flags.contains('q') {
        regex.replace_all(&input, regex::NoExpand(&replacement))
    } else {
        regex.replace_all(&input, replacement_template(&replacement)?.as_str())
    };
    Ok(Sequence::from_string(result.into_owned()))
}

fn fn_tokenize(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let input = string_arg(args, 0);
    let Some(pattern) = opt_string(args, 1).filter(|_| args.len() > 1) else {
        return Ok(Sequence::from_atomics(
            input
                .split_whitespace()
                .map(|t| AtomicValue::String(t.to_string())),
        ));
    };
    if input.is_empty() {
        return Ok(Sequence::empty());
    }
    let regex = compile_regex(&pattern, &string_arg(args, 2))?;
    if regex.is_match("") {
        return Err(MetapathError::function(
            codes::FORX0003,
            "The pattern matches the empty string",
        ));
    }
    Ok(Sequence::from_atomics(
        regex
            .split(&input)
            .map(|t| AtomicValue::String(t.to_string())),
    ))
}

pub(super) fn register(library: &mut FunctionLibrary) {
    library
        .register(
            Function::new(FN, "matches", fn_matches)
                .param("input", opt(AtomicType::String))
                .param("pattern", one(AtomicType::String))
                .optional("flags", one(AtomicType::String))
                .returns(one(AtomicType::Boolean)),
        )
        .register(
            Function::new(FN, "replace", fn_replace)
                .param("input", opt(AtomicType::String))
                .param("pattern", one(AtomicType::String))
                .param("replacement", one(AtomicType::String))
                .optional("flags", one(AtomicType::String))
                .returns(one(AtomicType::String)),
        )
        .register(
            Function::new(FN, "tokenize", fn_tokenize)
                .param("input", opt(AtomicType::String))
                .optional("pattern", one(AtomicType::String))
                .optional("flags", one(AtomicType::String))
                .returns(many(AtomicType::String)),
        );
}
