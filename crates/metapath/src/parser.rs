use std::str::FromStr;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, satisfy},
    combinator::{map, not, opt, peek, recognize, value},
    error::{Error, ErrorKind, ParseError},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
};
use rust_decimal::Decimal;

use crate::ast::*;
use crate::error::MetapathError;
use crate::types::{KindTest, Occurrence};

/// Parses Metapath text into its concrete syntax tree.
pub fn parse_expression(input: &str) -> Result<Expression, MetapathError> {
    match expr(input) {
        Ok((rest, expression)) => {
            let rest = sp::<Error<&str>>(rest).map_or(rest, |(r, _)| r);
            if rest.is_empty() {
                Ok(expression)
            } else {
                Err(syntax_error(input, rest, "Unexpected input"))
            }
        }
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            Err(syntax_error(input, e.input, "Unable to parse expression"))
        }
        Err(nom::Err::Incomplete(_)) => Err(syntax_error(input, "", "Unexpected end of input")),
    }
}

fn syntax_error(expression: &str, rest: &str, message: &str) -> MetapathError {
    let rest = rest.trim_start();
    let position = expression.len() - rest.len();
    let token = if rest.is_empty() {
        "end of input".to_string()
    } else {
        let name_len: usize = rest
            .chars()
            .take_while(|&c| is_name_char(c))
            .map(char::len_utf8)
            .sum();
        match name_len {
            0 => rest.chars().take(1).collect(),
            n => rest[..n].to_string(),
        }
    };
    MetapathError::Syntax {
        expression: expression.to_string(),
        position,
        token,
        message: message.to_string(),
    }
}

/// Skips whitespace and (possibly nested) `(: ... :)` comments.
fn sp<'a, E: ParseError<&'a str>>(mut input: &'a str) -> IResult<&'a str, (), E> {
    loop {
        let trimmed = input.trim_start();
        let Some(body) = trimmed.strip_prefix("(:") else {
            return Ok((trimmed, ()));
        };
        let mut depth = 1;
        let mut rest = body;
        while depth > 0 {
            if let Some(r) = rest.strip_prefix("(:") {
                depth += 1;
                rest = r;
            } else if let Some(r) = rest.strip_prefix(":)") {
                depth -= 1;
                rest = r;
            } else {
                let mut chars = rest.chars();
                if chars.next().is_none() {
                    return Err(nom::Err::Error(E::from_error_kind(trimmed, ErrorKind::Char)));
                }
                rest = chars.as_str();
            }
        }
        input = rest;
    }
}

fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: ParseError<&'a str>,
{
    delimited(sp, inner, sp)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// A reserved word that must not run on into a longer name.
fn word<'a>(kw: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = Error<&'a str>> {
    terminated(tag(kw), not(satisfy(is_name_char)))
}

fn keyword<'a>(kw: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = Error<&'a str>> {
    ws(word(kw))
}

fn verify_error(input: &str) -> nom::Err<Error<&str>> {
    nom::Err::Error(Error::new(input, ErrorKind::Verify))
}

fn expr(input: &str) -> IResult<&str, Expression> {
    let (input, mut items) = separated_list1(ws(char(',')), expr_single).parse(input)?;
    if items.len() == 1 {
        Ok((input, items.remove(0)))
    } else {
        Ok((input, Expression::Sequence(items)))
    }
}

fn expr_single(input: &str) -> IResult<&str, Expression> {
    alt((for_expr, let_expr, quantified_expr, if_expr, or_expr)).parse(input)
}

fn for_expr(input: &str) -> IResult<&str, Expression> {
    let (input, _) = keyword("for").parse(input)?;
    let (input, bindings) = separated_list1(ws(char(',')), in_binding).parse(input)?;
    let (input, _) = keyword("return").parse(input)?;
    let (input, return_expr) = expr_single(input)?;

    Ok((
        input,
        Expression::ForExpr {
            bindings: bindings
                .into_iter()
                .map(|(n, e)| (n, Box::new(e)))
                .collect(),
            return_expr: Box::new(return_expr),
        },
    ))
}

fn in_binding(input: &str) -> IResult<&str, (QName, Expression)> {
    let (input, _) = ws(char('$')).parse(input)?;
    let (input, name) = eq_name(input)?;
    let (input, _) = keyword("in").parse(input)?;
    let (input, expr) = expr_single(input)?;
    Ok((input, (name, expr)))
}

fn let_expr(input: &str) -> IResult<&str, Expression> {
    let (input, _) = keyword("let").parse(input)?;
    let (input, bindings) = separated_list1(ws(char(',')), let_binding).parse(input)?;
    let (input, _) = keyword("return").parse(input)?;
    let (input, return_expr) = expr_single(input)?;

    Ok((
        input,
        Expression::LetExpr {
            bindings: bindings
                .into_iter()
                .map(|(n, e)| (n, Box::new(e)))
                .collect(),
            return_expr: Box::new(return_expr),
        },
    ))
}

fn let_binding(input: &str) -> IResult<&str, (QName, Expression)> {
    let (input, _) = ws(char('$')).parse(input)?;
    let (input, name) = eq_name(input)?;
    let (input, _) = ws(tag(":=")).parse(input)?;
    let (input, expr) = expr_single(input)?;
    Ok((input, (name, expr)))
}

fn quantified_expr(input: &str) -> IResult<&str, Expression> {
    let (input, quantifier) = alt((
        value(Quantifier::Some, keyword("some")),
        value(Quantifier::Every, keyword("every")),
    ))
    .parse(input)?;
    let (input, bindings) = separated_list1(ws(char(',')), in_binding).parse(input)?;
    let (input, _) = keyword("satisfies").parse(input)?;
    let (input, satisfies) = expr_single(input)?;

    Ok((
        input,
        Expression::QuantifiedExpr {
            quantifier,
            bindings: bindings
                .into_iter()
                .map(|(n, e)| (n, Box::new(e)))
                .collect(),
            satisfies: Box::new(satisfies),
        },
    ))
}

fn if_expr(input: &str) -> IResult<&str, Expression> {
    let (input, _) = keyword("if").parse(input)?;
    let (input, condition) = delimited(ws(char('(')), expr, ws(char(')'))).parse(input)?;
    let (input, _) = keyword("then").parse(input)?;
    let (input, then_expr) = expr_single(input)?;
    let (input, _) = keyword("else").parse(input)?;
    let (input, else_expr) = expr_single(input)?;

    Ok((
        input,
        Expression::IfExpr {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        },
    ))
}

fn or_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(keyword("or"), and_expr)).parse(input)?;

    Ok((input, fold_binary(first, rest, BinaryOperator::Or)))
}

fn and_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = comparison_expr(input)?;
    let (input, rest) = many0(preceded(keyword("and"), comparison_expr)).parse(input)?;

    Ok((input, fold_binary(first, rest, BinaryOperator::And)))
}

fn comparison_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = string_concat_expr(input)?;
    let (input, rest) = opt(pair(ws(comparison_operator), string_concat_expr)).parse(input)?;

    match rest {
        Some((op, right)) => Ok((input, Expression::binary_op(first, op, right))),
        None => Ok((input, first)),
    }
}

fn comparison_operator(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        value(BinaryOperator::ValueEq, word("eq")),
        value(BinaryOperator::ValueNe, word("ne")),
        value(BinaryOperator::ValueLt, word("lt")),
        value(BinaryOperator::ValueLe, word("le")),
        value(BinaryOperator::ValueGt, word("gt")),
        value(BinaryOperator::ValueGe, word("ge")),
        value(BinaryOperator::Is, word("is")),
        value(BinaryOperator::Precedes, tag("<<")),
        value(BinaryOperator::Follows, tag(">>")),
        value(BinaryOperator::NotEquals, tag("!=")),
        value(BinaryOperator::LessThanOrEqual, tag("<=")),
        value(BinaryOperator::LessThan, tag("<")),
        value(BinaryOperator::GreaterThanOrEqual, tag(">=")),
        value(BinaryOperator::GreaterThan, tag(">")),
        value(BinaryOperator::Equals, char('=')),
    ))
    .parse(input)
}

fn string_concat_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = range_expr(input)?;
    let (input, rest) = many0(preceded(ws(tag("||")), range_expr)).parse(input)?;

    let mut result = first;
    for right in rest {
        result = Expression::StringConcat {
            left: Box::new(result),
            right: Box::new(right),
        };
    }
    Ok((input, result))
}

fn range_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = additive_expr(input)?;
    let (input, rest) = opt(preceded(keyword("to"), additive_expr)).parse(input)?;

    match rest {
        Some(end) => Ok((
            input,
            Expression::RangeExpr {
                start: Box::new(first),
                end: Box::new(end),
            },
        )),
        None => Ok((input, first)),
    }
}

fn additive_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = multiplicative_expr(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOperator::Plus, char('+')),
            value(BinaryOperator::Minus, char('-')),
        ))),
        multiplicative_expr,
    ))
    .parse(input)?;

    Ok((input, fold_operators(first, rest)))
}

fn multiplicative_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = union_expr(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOperator::Multiply, char('*')),
            value(BinaryOperator::Divide, word("div")),
            value(BinaryOperator::IntegerDivide, word("idiv")),
            value(BinaryOperator::Modulo, word("mod")),
        ))),
        union_expr,
    ))
    .parse(input)?;

    Ok((input, fold_operators(first, rest)))
}

fn union_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = intersect_except_expr(input)?;
    let (input, rest) = many0(preceded(
        ws(alt((word("union"), terminated(tag("|"), not(char('|')))))),
        intersect_except_expr,
    ))
    .parse(input)?;

    Ok((input, fold_binary(first, rest, BinaryOperator::Union)))
}

fn intersect_except_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = instanceof_expr(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOperator::Intersect, word("intersect")),
            value(BinaryOperator::Except, word("except")),
        ))),
        instanceof_expr,
    ))
    .parse(input)?;

    Ok((input, fold_operators(first, rest)))
}

fn instanceof_expr(input: &str) -> IResult<&str, Expression> {
    let (input, expr) = treat_expr(input)?;
    let (input, type_decl) = opt(preceded(
        pair(keyword("instance"), keyword("of")),
        sequence_type,
    ))
    .parse(input)?;

    match type_decl {
        Some(sequence_type) => Ok((
            input,
            Expression::InstanceOf {
                expr: Box::new(expr),
                sequence_type,
            },
        )),
        None => Ok((input, expr)),
    }
}

fn treat_expr(input: &str) -> IResult<&str, Expression> {
    let (input, expr) = castable_expr(input)?;
    let (input, type_decl) =
        opt(preceded(pair(keyword("treat"), keyword("as")), sequence_type)).parse(input)?;

    match type_decl {
        Some(sequence_type) => Ok((
            input,
            Expression::TreatAs {
                expr: Box::new(expr),
                sequence_type,
            },
        )),
        None => Ok((input, expr)),
    }
}

fn castable_expr(input: &str) -> IResult<&str, Expression> {
    let (input, expr) = cast_expr(input)?;
    let (input, type_decl) =
        opt(preceded(pair(keyword("castable"), keyword("as")), single_type)).parse(input)?;

    match type_decl {
        Some(single_type) => Ok((
            input,
            Expression::CastableAs {
                expr: Box::new(expr),
                single_type,
            },
        )),
        None => Ok((input, expr)),
    }
}

fn cast_expr(input: &str) -> IResult<&str, Expression> {
    let (input, expr) = arrow_expr(input)?;
    let (input, type_decl) =
        opt(preceded(pair(keyword("cast"), keyword("as")), single_type)).parse(input)?;

    match type_decl {
        Some(single_type) => Ok((
            input,
            Expression::CastAs {
                expr: Box::new(expr),
                single_type,
            },
        )),
        None => Ok((input, expr)),
    }
}

fn sequence_type(input: &str) -> IResult<&str, SequenceTypeDecl> {
    alt((
        value(
            SequenceTypeDecl::Empty,
            pair(keyword("empty-sequence"), empty_parens),
        ),
        map(pair(ws(item_type), opt(occurrence)), |(item, occurrence)| {
            SequenceTypeDecl::Of(item, occurrence.unwrap_or(Occurrence::One))
        }),
    ))
    .parse(input)
}

fn occurrence(input: &str) -> IResult<&str, Occurrence> {
    ws(alt((
        value(Occurrence::ZeroOrOne, char('?')),
        value(Occurrence::ZeroOrMore, char('*')),
        value(Occurrence::OneOrMore, char('+')),
    )))
    .parse(input)
}

fn item_type(input: &str) -> IResult<&str, ItemTypeDecl> {
    alt((
        value(ItemTypeDecl::AnyItem, pair(word("item"), empty_parens)),
        map(kind_test, ItemTypeDecl::Kind),
        function_test,
        value(
            ItemTypeDecl::Map,
            preceded(
                word("map"),
                delimited(
                    ws(char('(')),
                    alt((
                        value((), char('*')),
                        value((), pair(eq_name, preceded(ws(char(',')), sequence_type))),
                    )),
                    ws(char(')')),
                ),
            ),
        ),
        value(
            ItemTypeDecl::Array,
            preceded(
                word("array"),
                delimited(
                    ws(char('(')),
                    alt((value((), char('*')), value((), sequence_type))),
                    ws(char(')')),
                ),
            ),
        ),
        delimited(ws(char('(')), item_type, ws(char(')'))),
        map(eq_name, ItemTypeDecl::Atomic),
    ))
    .parse(input)
}

fn function_test(input: &str) -> IResult<&str, ItemTypeDecl> {
    let (input, _) = word("function").parse(input)?;
    let (input, arity) = delimited(
        ws(char('(')),
        alt((
            value(None, char('*')),
            map(separated_list0(ws(char(',')), sequence_type), |params| {
                Some(params.len())
            }),
        )),
        ws(char(')')),
    )
    .parse(input)?;
    let (input, _) = opt(preceded(keyword("as"), sequence_type)).parse(input)?;
    Ok((input, ItemTypeDecl::Function(arity)))
}

fn empty_parens(input: &str) -> IResult<&str, ()> {
    value((), pair(ws(char('(')), ws(char(')')))).parse(input)
}

fn kind_test(input: &str) -> IResult<&str, KindTest> {
    alt((
        value(KindTest::AnyKind, pair(word("node"), empty_parens)),
        value(KindTest::Document, pair(word("document-node"), empty_parens)),
        map(preceded(word("assembly"), kind_test_name), KindTest::Assembly),
        map(preceded(word("field"), kind_test_name), KindTest::Field),
        map(preceded(word("flag"), kind_test_name), KindTest::Flag),
    ))
    .parse(input)
}

fn kind_test_name(input: &str) -> IResult<&str, Option<String>> {
    let (input, name) = delimited(
        ws(char('(')),
        opt(alt((
            value(None, char('*')),
            map(eq_name, |q| Some(q.local_part)),
        ))),
        ws(char(')')),
    )
    .parse(input)?;
    Ok((input, name.flatten()))
}

fn single_type(input: &str) -> IResult<&str, SingleType> {
    let (input, type_name) = ws(eq_name).parse(input)?;
    let (input, optional) = opt(ws(char('?'))).parse(input)?;

    Ok((
        input,
        SingleType {
            type_name,
            optional: optional.is_some(),
        },
    ))
}

fn arrow_expr(input: &str) -> IResult<&str, Expression> {
    let (input, base) = unary_expr(input)?;
    let (input, steps) = many0(arrow_step).parse(input)?;

    if steps.is_empty() {
        Ok((input, base))
    } else {
        Ok((
            input,
            Expression::ArrowExpr {
                base: Box::new(base),
                steps,
            },
        ))
    }
}

fn arrow_step(input: &str) -> IResult<&str, ArrowStep> {
    let (input, _) = ws(tag("=>")).parse(input)?;
    let (input, target) = alt((
        map(preceded(char('$'), eq_name), ArrowTarget::Variable),
        map(delimited(ws(char('(')), expr, ws(char(')'))), |e| {
            ArrowTarget::Parenthesized(Box::new(e))
        }),
        map(eq_name, ArrowTarget::Named),
    ))
    .parse(input)?;
    let (input, args) = argument_list(input)?;

    Ok((input, ArrowStep { target, args }))
}

fn unary_expr(input: &str) -> IResult<&str, Expression> {
    let (input, signs) = many0(ws(alt((
        value(UnaryOperator::Minus, char('-')),
        value(UnaryOperator::Plus, char('+')),
    ))))
    .parse(input)?;
    let (input, expr) = simple_map_expr(input)?;

    let result = signs.into_iter().rev().fold(expr, |acc, op| Expression::UnaryOp {
        op,
        expr: Box::new(acc),
    });
    Ok((input, result))
}

fn simple_map_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = path_expr(input)?;
    let (input, rest) = many0(preceded(
        ws(terminated(char('!'), not(char('=')))),
        path_expr,
    ))
    .parse(input)?;

    let mut result = first;
    for right in rest {
        result = Expression::SimpleMapExpr {
            base: Box::new(result),
            mapping: Box::new(right),
        };
    }
    Ok((input, result))
}

fn path_expr(input: &str) -> IResult<&str, Expression> {
    let (input, _) = sp(input)?;

    if let Some(rest) = input.strip_prefix("//") {
        let (rest, relative) = relative_path(rest)?;
        let root = Expression::path(Expression::Root, Expression::descendant_or_self());
        return Ok((rest, Expression::path(root, relative)));
    }

    if let Some(rest) = input.strip_prefix('/') {
        return match relative_path(rest) {
            Ok((rest, relative)) => Ok((rest, Expression::path(Expression::Root, relative))),
            Err(nom::Err::Error(_)) => Ok((rest, Expression::Root)),
            Err(e) => Err(e),
        };
    }

    relative_path(input)
}

fn relative_path(input: &str) -> IResult<&str, Expression> {
    let (input, first) = step_expr(input)?;
    let (input, rest) =
        many0(pair(ws(alt((tag("//"), tag("/")))), step_expr)).parse(input)?;

    let mut result = first;
    for (separator, step) in rest {
        if separator == "//" {
            result = Expression::path(result, Expression::descendant_or_self());
        }
        result = Expression::path(result, step);
    }
    Ok((input, result))
}

fn step_expr(input: &str) -> IResult<&str, Expression> {
    alt((postfix_expr, axis_step)).parse(input)
}

fn postfix_expr(input: &str) -> IResult<&str, Expression> {
    let (input, base) = primary_expr(input)?;
    let (input, postfixes) = many0(alt((
        map(predicate, PostfixOp::Predicate),
        map(argument_list, PostfixOp::ArgumentList),
        map(lookup, PostfixOp::Lookup),
    )))
    .parse(input)?;

    let mut result = base;
    for postfix in postfixes {
        result = match postfix {
            PostfixOp::Predicate(pred) => match result {
                Expression::Filter {
                    base,
                    mut predicates,
                } => {
                    predicates.push(pred);
                    Expression::Filter { base, predicates }
                }
                other => Expression::Filter {
                    base: Box::new(other),
                    predicates: vec![pred],
                },
            },
            PostfixOp::ArgumentList(args) => Expression::DynamicFunctionCall {
                function_expr: Box::new(result),
                args,
            },
            PostfixOp::Lookup(key) => Expression::LookupExpr {
                base: Box::new(result),
                key,
            },
        };
    }
    Ok((input, result))
}

enum PostfixOp {
    Predicate(Expression),
    ArgumentList(Vec<Expression>),
    Lookup(LookupKey),
}

fn predicate(input: &str) -> IResult<&str, Expression> {
    delimited(ws(char('[')), expr, ws(char(']'))).parse(input)
}

fn argument_list(input: &str) -> IResult<&str, Vec<Expression>> {
    delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), argument),
        ws(char(')')),
    )
    .parse(input)
}

fn argument(input: &str) -> IResult<&str, Expression> {
    alt((
        value(
            Expression::ArgumentPlaceholder,
            terminated(ws(char('?')), peek(alt((char(','), char(')'))))),
        ),
        expr_single,
    ))
    .parse(input)
}

fn lookup(input: &str) -> IResult<&str, LookupKey> {
    preceded(ws(char('?')), key_specifier).parse(input)
}

fn key_specifier(input: &str) -> IResult<&str, LookupKey> {
    alt((
        value(LookupKey::Wildcard, char('*')),
        map(integer_value, LookupKey::Integer),
        map(nc_name, |s| LookupKey::NCName(s.to_string())),
        map(delimited(ws(char('(')), expr, ws(char(')'))), |e| {
            LookupKey::Parenthesized(Box::new(e))
        }),
    ))
    .parse(input)
}

fn axis_step(input: &str) -> IResult<&str, Expression> {
    let (input, mut step) = ws(alt((abbreviated_parent, axis_and_test))).parse(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;
    step.predicates = predicates;
    Ok((input, Expression::AxisStep(step)))
}

fn abbreviated_parent(input: &str) -> IResult<&str, Step> {
    value(
        Step {
            axis: Axis::Parent,
            node_test: NodeTest::Kind(KindTest::AnyKind),
            predicates: Vec::new(),
        },
        tag(".."),
    )
    .parse(input)
}

fn axis_and_test(input: &str) -> IResult<&str, Step> {
    let (input, axis) = opt(axis_specifier).parse(input)?;
    let (input, node_test) = node_test(input)?;

    let axis = axis.unwrap_or(match node_test {
        NodeTest::Kind(KindTest::Flag(_)) => Axis::Flag,
        _ => Axis::Child,
    });
    Ok((
        input,
        Step {
            axis,
            node_test,
            predicates: Vec::new(),
        },
    ))
}

fn axis_specifier(input: &str) -> IResult<&str, Axis> {
    alt((
        value(Axis::Flag, ws(char('@'))),
        terminated(
            alt((
                value(Axis::Child, tag("child")),
                value(Axis::DescendantOrSelf, tag("descendant-or-self")),
                value(Axis::Descendant, tag("descendant")),
                value(Axis::Flag, tag("flag")),
                value(Axis::Flag, tag("attribute")),
                value(Axis::SelfAxis, tag("self")),
                value(Axis::AncestorOrSelf, tag("ancestor-or-self")),
                value(Axis::Ancestor, tag("ancestor")),
                value(Axis::Parent, tag("parent")),
                value(Axis::FollowingSibling, tag("following-sibling")),
                value(Axis::Following, tag("following")),
                value(Axis::PrecedingSibling, tag("preceding-sibling")),
                value(Axis::Preceding, tag("preceding")),
            )),
            ws(tag("::")),
        ),
    ))
    .parse(input)
}

fn node_test(input: &str) -> IResult<&str, NodeTest> {
    alt((
        map(kind_test, NodeTest::Kind),
        map(preceded(tag("*:"), nc_name), |local| {
            NodeTest::Name(QName::new(local))
        }),
        value(NodeTest::Wildcard, terminated(nc_name, tag(":*"))),
        value(NodeTest::Wildcard, char('*')),
        map(eq_name, NodeTest::Name),
    ))
    .parse(input)
}

fn primary_expr(input: &str) -> IResult<&str, Expression> {
    ws(alt((
        literal,
        variable_reference,
        parenthesized_expr,
        context_item_expr,
        unary_lookup,
        map_constructor,
        array_constructor,
        inline_function,
        function_item_expr,
        function_call,
    )))
    .parse(input)
}

fn literal(input: &str) -> IResult<&str, Expression> {
    alt((
        map(string_literal, |s| Expression::Literal(Literal::String(s))),
        numeric_literal,
    ))
    .parse(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    alt((|i| quoted(i, '\''), |i| quoted(i, '"'))).parse(input)
}

/// A string literal in which a doubled delimiter stands for one delimiter.
fn quoted(input: &str, quote: char) -> IResult<&str, String> {
    let (mut rest, _) = char(quote).parse(input)?;
    let mut out = String::new();
    loop {
        let Some(end) = rest.find(quote) else {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::Char)));
        };
        out.push_str(&rest[..end]);
        rest = &rest[end + 1..];
        match rest.strip_prefix(quote) {
            Some(after) => {
                out.push(quote);
                rest = after;
            }
            None => return Ok((rest, out)),
        }
    }
}

fn numeric_literal(input: &str) -> IResult<&str, Expression> {
    alt((double_literal, decimal_literal, integer_literal)).parse(input)
}

fn integer_value(input: &str) -> IResult<&str, i64> {
    let (rest, digits) = digit1(input)?;
    match digits.parse::<i64>() {
        Ok(i) => Ok((rest, i)),
        Err(_) => Err(verify_error(input)),
    }
}

/// Integer literals beyond the `xs:integer` range widen to decimal.
fn integer_literal(input: &str) -> IResult<&str, Expression> {
    let (rest, digits) = digit1(input)?;
    if let Ok(i) = digits.parse::<i64>() {
        return Ok((rest, Expression::Literal(Literal::Integer(i))));
    }
    match Decimal::from_str(digits) {
        Ok(d) => Ok((rest, Expression::Literal(Literal::Decimal(d)))),
        Err(_) => match digits.parse::<f64>() {
            Ok(d) => Ok((rest, Expression::Literal(Literal::Double(d)))),
            Err(_) => Err(verify_error(input)),
        },
    }
}

fn decimal_literal(input: &str) -> IResult<&str, Expression> {
    let (rest, s) = alt((
        recognize((char('.'), digit1)),
        recognize((digit1, char('.'), digit0)),
    ))
    .parse(input)?;

    if rest.starts_with(['e', 'E']) || rest.starts_with('.') {
        return Err(verify_error(input));
    }

    let mut text = s.to_string();
    if text.starts_with('.') {
        text.insert(0, '0');
    }
    if text.ends_with('.') {
        text.push('0');
    }
    match Decimal::from_str(&text) {
        Ok(d) => Ok((rest, Expression::Literal(Literal::Decimal(d)))),
        Err(_) => match text.parse::<f64>() {
            Ok(d) => Ok((rest, Expression::Literal(Literal::Double(d)))),
            Err(_) => Err(verify_error(input)),
        },
    }
}

fn double_literal(input: &str) -> IResult<&str, Expression> {
    let (rest, s) = recognize((
        alt((
            recognize((digit1, char('.'), digit0)),
            recognize((char('.'), digit1)),
            digit1,
        )),
        alt((char('e'), char('E'))),
        opt(alt((char('+'), char('-')))),
        digit1,
    ))
    .parse(input)?;

    match s.parse::<f64>() {
        Ok(d) => Ok((rest, Expression::Literal(Literal::Double(d)))),
        Err(_) => Err(verify_error(input)),
    }
}

fn variable_reference(input: &str) -> IResult<&str, Expression> {
    map(preceded(char('$'), eq_name), Expression::Variable).parse(input)
}

fn context_item_expr(input: &str) -> IResult<&str, Expression> {
    let (rest, _) = char('.').parse(input)?;
    if rest.starts_with(|c: char| c == '.' || c.is_ascii_digit()) {
        return Err(verify_error(input));
    }
    Ok((rest, Expression::ContextItem))
}

fn parenthesized_expr(input: &str) -> IResult<&str, Expression> {
    let (input, inner) = delimited(ws(char('(')), opt(expr), ws(char(')'))).parse(input)?;
    Ok((input, inner.unwrap_or(Expression::Sequence(Vec::new()))))
}

fn unary_lookup(input: &str) -> IResult<&str, Expression> {
    map(preceded(char('?'), key_specifier), Expression::UnaryLookup).parse(input)
}

fn map_constructor(input: &str) -> IResult<&str, Expression> {
    let (input, _) = word("map").parse(input)?;
    let (input, entries) = delimited(
        ws(char('{')),
        separated_list0(ws(char(',')), map_entry),
        ws(char('}')),
    )
    .parse(input)?;

    Ok((input, Expression::MapConstructor(entries)))
}

fn map_entry(input: &str) -> IResult<&str, MapEntry> {
    let (input, key) = expr_single(input)?;
    let (input, _) = ws(char(':')).parse(input)?;
    let (input, value) = expr_single(input)?;

    Ok((
        input,
        MapEntry {
            key: Box::new(key),
            value: Box::new(value),
        },
    ))
}

fn array_constructor(input: &str) -> IResult<&str, Expression> {
    alt((square_array_constructor, curly_array_constructor)).parse(input)
}

fn square_array_constructor(input: &str) -> IResult<&str, Expression> {
    let (input, members) = delimited(
        ws(char('[')),
        separated_list0(ws(char(',')), expr_single),
        ws(char(']')),
    )
    .parse(input)?;

    Ok((
        input,
        Expression::ArrayConstructor(ArrayConstructorKind::Square(members)),
    ))
}

fn curly_array_constructor(input: &str) -> IResult<&str, Expression> {
    let (input, _) = word("array").parse(input)?;
    let (input, enclosed) = delimited(ws(char('{')), opt(expr), ws(char('}'))).parse(input)?;

    Ok((
        input,
        Expression::ArrayConstructor(ArrayConstructorKind::Curly(Box::new(
            enclosed.unwrap_or(Expression::Sequence(Vec::new())),
        ))),
    ))
}

fn inline_function(input: &str) -> IResult<&str, Expression> {
    let (input, _) = word("function").parse(input)?;
    let (input, params) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), param),
        ws(char(')')),
    )
    .parse(input)?;
    let (input, return_type) = opt(preceded(keyword("as"), sequence_type)).parse(input)?;
    let (input, body) = delimited(ws(char('{')), opt(expr), ws(char('}'))).parse(input)?;

    Ok((
        input,
        Expression::InlineFunction {
            params,
            return_type,
            body: Box::new(body.unwrap_or(Expression::Sequence(Vec::new()))),
        },
    ))
}

fn param(input: &str) -> IResult<&str, Param> {
    let (input, _) = ws(char('$')).parse(input)?;
    let (input, name) = eq_name(input)?;
    let (input, type_decl) = opt(preceded(keyword("as"), sequence_type)).parse(input)?;

    Ok((input, Param { name, type_decl }))
}

/// Names that introduce other syntax when followed by `(`.
const RESERVED_FUNCTION_NAMES: &[&str] = &[
    "array",
    "assembly",
    "attribute",
    "comment",
    "document-node",
    "element",
    "empty-sequence",
    "field",
    "flag",
    "function",
    "if",
    "item",
    "map",
    "namespace-node",
    "node",
    "processing-instruction",
    "schema-attribute",
    "schema-element",
    "switch",
    "text",
    "typeswitch",
];

fn function_call(input: &str) -> IResult<&str, Expression> {
    let (rest, name) = eq_name(input)?;
    let (rest, _) = peek(ws(char('('))).parse(rest)?;

    if name.prefix.is_none()
        && name.namespace.is_none()
        && RESERVED_FUNCTION_NAMES.contains(&name.local_part.as_str())
    {
        return Err(verify_error(input));
    }

    let (rest, args) = argument_list(rest)?;
    Ok((rest, Expression::FunctionCall { name, args }))
}

fn function_item_expr(input: &str) -> IResult<&str, Expression> {
    let (input, name) = eq_name(input)?;
    let (input, _) = ws(char('#')).parse(input)?;
    let (input, arity) = integer_value(input)?;

    Ok((
        input,
        Expression::NamedFunctionRef {
            name,
            arity: arity as usize,
        },
    ))
}

fn eq_name(input: &str) -> IResult<&str, QName> {
    alt((uri_qualified_name, qname)).parse(input)
}

fn uri_qualified_name(input: &str) -> IResult<&str, QName> {
    let (input, namespace) = delimited(
        tag("Q{"),
        take_while(|c: char| c != '}' && c != '{'),
        char('}'),
    )
    .parse(input)?;
    let (input, local) = nc_name(input)?;
    Ok((input, QName::with_namespace(namespace.trim(), local)))
}

fn qname(input: &str) -> IResult<&str, QName> {
    let (input, first) = nc_name(input)?;
    let (input, second) = opt(preceded(char(':'), nc_name)).parse(input)?;

    match second {
        Some(local) => Ok((input, QName::with_prefix(first, local))),
        None => Ok((input, QName::new(first))),
    }
}

fn nc_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(is_name_start),
        take_while(is_name_char),
    ))
    .parse(input)
}

fn fold_binary(first: Expression, rest: Vec<Expression>, op: BinaryOperator) -> Expression {
    rest.into_iter()
        .fold(first, |acc, right| Expression::binary_op(acc, op, right))
}

fn fold_operators(first: Expression, rest: Vec<(BinaryOperator, Expression)>) -> Expression {
    rest.into_iter()
        .fold(first, |acc, (op, right)| Expression::binary_op(acc, op, right))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer_literal() {
        let expr = parse_expression("42").unwrap();
        assert!(matches!(expr, Expression::Literal(Literal::Integer(42))));
    }

    #[test]
    fn test_integer_overflow_widens_to_decimal() {
        let expr = parse_expression("99999999999999999999").unwrap();
        assert!(matches!(expr, Expression::Literal(Literal::Decimal(_))));
    }

    #[test]
    fn test_parse_numeric_literals() {
        assert!(matches!(
            parse_expression("3.5").unwrap(),
            Expression::Literal(Literal::Decimal(_))
        ));
        assert!(matches!(
            parse_expression(".5").unwrap(),
            Expression::Literal(Literal::Decimal(_))
        ));
        assert!(matches!(
            parse_expression("1.5e3").unwrap(),
            Expression::Literal(Literal::Double(d)) if d == 1500.0
        ));
    }

    #[test]
    fn test_parse_string_literal() {
        let expr = parse_expression("'hello'").unwrap();
        assert!(matches!(expr, Expression::Literal(Literal::String(s)) if s == "hello"));

        let expr = parse_expression("\"say \"\"hi\"\"\"").unwrap();
        assert!(matches!(expr, Expression::Literal(Literal::String(s)) if s == "say \"hi\""));

        let expr = parse_expression("'it''s'").unwrap();
        assert!(matches!(expr, Expression::Literal(Literal::String(s)) if s == "it's"));
    }

    #[test]
    fn test_parse_variable() {
        let expr = parse_expression("$x").unwrap();
        assert!(matches!(expr, Expression::Variable(n) if n.local_part == "x"));
    }

    #[test]
    fn test_parse_let_chained() {
        let expr = parse_expression("let $x := 3, $y := 4 return $x + $y").unwrap();
        if let Expression::LetExpr { bindings, .. } = expr {
            assert_eq!(bindings.len(), 2);
        } else {
            panic!("Expected LetExpr");
        }
    }

    #[test]
    fn test_parse_if_and_for() {
        assert!(matches!(
            parse_expression("if (true()) then 1 else 2").unwrap(),
            Expression::IfExpr { .. }
        ));
        assert!(matches!(
            parse_expression("for $i in 1 to 5 return $i * 2").unwrap(),
            Expression::ForExpr { .. }
        ));
    }

    #[test]
    fn test_parse_quantified() {
        let expr = parse_expression("every $x in (1, 2, 3) satisfies $x > 0").unwrap();
        if let Expression::QuantifiedExpr { quantifier, .. } = expr {
            assert_eq!(quantifier, Quantifier::Every);
        } else {
            panic!("Expected QuantifiedExpr");
        }
    }

    #[test]
    fn test_keywords_respect_name_boundaries() {
        let expr = parse_expression("format-number(1, '0')").unwrap();
        assert!(matches!(expr, Expression::FunctionCall { name, .. } if name.local_part == "format-number"));

        let expr = parse_expression("for-each((1, 2), abs#1)").unwrap();
        assert!(matches!(expr, Expression::FunctionCall { name, .. } if name.local_part == "for-each"));

        let expr = parse_expression("order/item").unwrap();
        assert!(matches!(expr, Expression::Path { .. }));
    }

    #[test]
    fn test_parse_comments() {
        let expr = parse_expression("(: leading (: nested :) :) 1 + (: inline :) 2").unwrap();
        assert!(matches!(
            expr,
            Expression::BinaryOp {
                op: BinaryOperator::Plus,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_map_and_arrays() {
        let expr = parse_expression("map { 'a': 1, 'b': 2 }").unwrap();
        assert!(matches!(expr, Expression::MapConstructor(entries) if entries.len() == 2));

        let expr = parse_expression("[1, 2, 3]").unwrap();
        assert!(matches!(
            expr,
            Expression::ArrayConstructor(ArrayConstructorKind::Square(m)) if m.len() == 3
        ));

        let expr = parse_expression("array { 1 to 5 }").unwrap();
        assert!(matches!(
            expr,
            Expression::ArrayConstructor(ArrayConstructorKind::Curly(_))
        ));
    }

    #[test]
    fn test_parse_arrow_binds_tighter_than_cast() {
        let expr = parse_expression("'hello' => upper-case() => string-length()").unwrap();
        if let Expression::ArrowExpr { steps, .. } = expr {
            assert_eq!(steps.len(), 2);
            assert!(matches!(&steps[0].target, ArrowTarget::Named(n) if n.local_part == "upper-case"));
        } else {
            panic!("Expected ArrowExpr");
        }
    }

    #[test]
    fn test_parse_simple_map_and_not_equals() {
        assert!(matches!(
            parse_expression("(1, 2, 3) ! (. * 2)").unwrap(),
            Expression::SimpleMapExpr { .. }
        ));
        assert!(matches!(
            parse_expression("@id!='x'").unwrap(),
            Expression::BinaryOp {
                op: BinaryOperator::NotEquals,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_lookup() {
        let expr = parse_expression("$map?key").unwrap();
        assert!(matches!(
            expr,
            Expression::LookupExpr {
                key: LookupKey::NCName(_),
                ..
            }
        ));

        let expr = parse_expression("$array?1").unwrap();
        assert!(matches!(
            expr,
            Expression::LookupExpr {
                key: LookupKey::Integer(1),
                ..
            }
        ));

        assert!(matches!(
            parse_expression("?*").unwrap(),
            Expression::UnaryLookup(LookupKey::Wildcard)
        ));
    }

    #[test]
    fn test_parse_placeholder_only_as_whole_argument() {
        let expr = parse_expression("substring(?, 2)").unwrap();
        if let Expression::FunctionCall { args, .. } = expr {
            assert_eq!(args[0], Expression::ArgumentPlaceholder);
        } else {
            panic!("Expected FunctionCall");
        }

        let expr = parse_expression("f(?key)").unwrap();
        if let Expression::FunctionCall { args, .. } = expr {
            assert!(matches!(args[0], Expression::UnaryLookup(_)));
        } else {
            panic!("Expected FunctionCall");
        }
    }

    #[test]
    fn test_parse_named_function_ref() {
        let expr = parse_expression("fn:concat#3").unwrap();
        if let Expression::NamedFunctionRef { name, arity } = expr {
            assert_eq!(name.prefix.as_deref(), Some("fn"));
            assert_eq!(name.local_part, "concat");
            assert_eq!(arity, 3);
        } else {
            panic!("Expected NamedFunctionRef");
        }
    }

    #[test]
    fn test_parse_uri_qualified_name() {
        let expr =
            parse_expression("Q{http://www.w3.org/2005/xpath-functions}true()").unwrap();
        if let Expression::FunctionCall { name, .. } = expr {
            assert_eq!(
                name.namespace.as_deref(),
                Some("http://www.w3.org/2005/xpath-functions")
            );
            assert_eq!(name.local_part, "true");
        } else {
            panic!("Expected FunctionCall");
        }
    }

    #[test]
    fn test_parse_paths() {
        let expr = parse_expression("/catalog/group").unwrap();
        let Expression::Path { left, right } = expr else {
            panic!("Expected Path");
        };
        assert!(matches!(*left, Expression::Path { .. }));
        assert!(matches!(
            *right,
            Expression::AxisStep(Step {
                axis: Axis::Child,
                ..
            })
        ));

        assert_eq!(parse_expression("/").unwrap(), Expression::Root);
        assert!(matches!(parse_expression("..").unwrap(), Expression::AxisStep(Step { axis: Axis::Parent, .. })));
    }

    #[test]
    fn test_double_slash_expands_to_descendant_or_self() {
        let expr = parse_expression("//control").unwrap();
        let Expression::Path { left, .. } = expr else {
            panic!("Expected Path");
        };
        assert_eq!(
            *left,
            Expression::path(Expression::Root, Expression::descendant_or_self())
        );
    }

    #[test]
    fn test_flag_abbreviations() {
        for text in ["@id", "flag::id", "flag(id)"] {
            let expr = parse_expression(text).unwrap();
            assert!(
                matches!(expr, Expression::AxisStep(Step { axis: Axis::Flag, .. })),
                "{} should select flags",
                text
            );
        }
    }

    #[test]
    fn test_step_predicates_and_filters() {
        let expr = parse_expression("part[@name = 'x'][1]").unwrap();
        assert!(matches!(expr, Expression::AxisStep(Step { predicates, .. }) if predicates.len() == 2));

        let expr = parse_expression("(1, 2, 3)[. > 1]").unwrap();
        assert!(matches!(expr, Expression::Filter { .. }));
    }

    #[test]
    fn test_parse_arithmetic_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        if let Expression::BinaryOp {
            op: BinaryOperator::Plus,
            right,
            ..
        } = expr
        {
            assert!(matches!(
                *right,
                Expression::BinaryOp {
                    op: BinaryOperator::Multiply,
                    ..
                }
            ));
        } else {
            panic!("Expected correct precedence");
        }
    }

    #[test]
    fn test_parse_type_expressions() {
        assert!(matches!(
            parse_expression("$x instance of xs:integer+").unwrap(),
            Expression::InstanceOf {
                sequence_type: SequenceTypeDecl::Of(_, Occurrence::OneOrMore),
                ..
            }
        ));
        assert!(matches!(
            parse_expression("'1' cast as xs:integer?").unwrap(),
            Expression::CastAs { single_type: SingleType { optional: true, .. }, .. }
        ));
        assert!(matches!(
            parse_expression(". instance of assembly(catalog)").unwrap(),
            Expression::InstanceOf {
                sequence_type: SequenceTypeDecl::Of(ItemTypeDecl::Kind(KindTest::Assembly(Some(_))), _),
                ..
            }
        ));
    }

    #[test]
    fn test_syntax_error_reports_position_and_token() {
        let err = parse_expression("1 +").unwrap_err();
        let MetapathError::Syntax {
            position, token, ..
        } = err
        else {
            panic!("Expected syntax error");
        };
        assert_eq!(position, 2);
        assert_eq!(token, "+");

        assert!(parse_expression("'unterminated").is_err());
        assert!(parse_expression("(: open comment").is_err());
    }
}
