//! Semantic pass from the syntax tree to the executable tree.
//!
//! Resolves namespace prefixes, binds function calls to library entries,
//! checks literal arguments against parameter types, inserts atomization
//! around operands that require atomic values and folds calls to pure
//! functions whose arguments are all literals.
use std::sync::Arc;

use once_cell::unsync::OnceCell;

use crate::ast::{self, ArrowTarget, BinaryOperator, Expression, QName, UnaryOperator};
use crate::context::{DynamicContext, Focus, StaticContext};
use crate::error::{MetapathError, codes};
use crate::expr::{
    ArithmeticOp, ComparisonOp, Expr, InlineFunctionDecl, LookupKey, NodeComparisonOp, Param,
    SetOp,
};
use crate::functions::{self, CallContext, Function, XS};
use crate::types::{AtomicType, AtomicValue, Item, ItemType, Sequence, SequenceType};

pub fn compile(expression: &Expression, context: &StaticContext) -> Result<Expr, MetapathError> {
    Compiler::new(context).compile(expression)
}

struct Compiler<'a> {
    context: &'a StaticContext,
    fold_context: OnceCell<DynamicContext>,
}

impl<'a> Compiler<'a> {
    fn new(context: &'a StaticContext) -> Self {
        Self {
            context,
            fold_context: OnceCell::new(),
        }
    }

    fn compile(&self, expression: &Expression) -> Result<Expr, MetapathError> {
        let expr = match expression {
            Expression::Literal(literal) => Expr::Literal(Sequence::from_atomic(match literal {
                ast::Literal::String(s) => AtomicValue::String(s.clone()),
                ast::Literal::Integer(i) => AtomicValue::Integer(*i),
                ast::Literal::Decimal(d) => AtomicValue::Decimal(*d),
                ast::Literal::Double(d) => AtomicValue::Double(*d),
            })),
            Expression::ContextItem => Expr::ContextItem,
            Expression::Root => Expr::Root,
            Expression::Variable(name) => Expr::Variable(self.variable_name(name)?),
            Expression::Sequence(items) if items.is_empty() => Expr::Literal(Sequence::empty()),
            Expression::Sequence(items) => Expr::Sequence(self.compile_all(items)?),

            Expression::AxisStep(step) => Expr::Step {
                axis: step.axis,
                test: step.node_test.clone(),
                predicates: self.compile_all(&step.predicates)?,
            },
            Expression::Path { left, right } => Expr::Path {
                left: self.boxed(left)?,
                right: self.boxed(right)?,
            },
            Expression::Filter { base, predicates } => Expr::Filter {
                base: self.boxed(base)?,
                predicates: self.compile_all(predicates)?,
            },

            Expression::FunctionCall { name, args } => {
                let args = self.compile_arguments(args)?;
                self.function_call(name, args)?
            }
            Expression::DynamicFunctionCall {
                function_expr,
                args,
            } => Expr::DynamicCall {
                function: self.boxed(function_expr)?,
                args: self.compile_arguments(args)?,
            },
            Expression::ArgumentPlaceholder => {
                return Err(MetapathError::static_error(
                    codes::XPST0003,
                    "An argument placeholder '?' is only allowed in an argument list",
                ));
            }
            Expression::NamedFunctionRef { name, arity } => {
                let function = self.resolve_function(name, *arity)?;
                Expr::NamedFunctionRef {
                    function,
                    arity: *arity,
                }
            }
            Expression::InlineFunction {
                params,
                return_type,
                body,
            } => {
                let params = params
                    .iter()
                    .map(|p| {
                        Ok(Param {
                            name: self.variable_name(&p.name)?,
                            sequence_type: p
                                .type_decl
                                .as_ref()
                                .map(|t| self.sequence_type(t))
                                .transpose()?,
                        })
                    })
                    .collect::<Result<Vec<_>, MetapathError>>()?;
                Expr::InlineFunction(Arc::new(InlineFunctionDecl {
                    params,
                    return_type: return_type
                        .as_ref()
                        .map(|t| self.sequence_type(t))
                        .transpose()?,
                    body: self.compile(body)?,
                }))
            }

            Expression::BinaryOp { left, op, right } => self.binary(left, *op, right)?,
            Expression::UnaryOp { op, expr } => {
                let operand = atomized(self.compile(expr)?);
                match op {
                    UnaryOperator::Minus => Expr::Negate(Box::new(operand)),
                    UnaryOperator::Plus => Expr::Arithmetic {
                        left: Box::new(Expr::Literal(Sequence::from_integer(0))),
                        op: ArithmeticOp::Add,
                        right: Box::new(operand),
                    },
                }
            }

            Expression::LetExpr {
                bindings,
                return_expr,
            } => {
                let mut body = self.compile(return_expr)?;
                for (name, value) in bindings.iter().rev() {
                    body = Expr::Let {
                        name: self.variable_name(name)?,
                        value: self.boxed(value)?,
                        body: Box::new(body),
                    };
                }
                body
            }
            Expression::ForExpr {
                bindings,
                return_expr,
            } => {
                let mut body = self.compile(return_expr)?;
                for (name, source) in bindings.iter().rev() {
                    body = Expr::For {
                        name: self.variable_name(name)?,
                        source: self.boxed(source)?,
                        body: Box::new(body),
                    };
                }
                body
            }
            Expression::QuantifiedExpr {
                quantifier,
                bindings,
                satisfies,
            } => Expr::Quantified {
                quantifier: *quantifier,
                bindings: bindings
                    .iter()
                    .map(|(name, e)| Ok((self.variable_name(name)?, self.compile(e)?)))
                    .collect::<Result<Vec<_>, MetapathError>>()?,
                satisfies: self.boxed(satisfies)?,
            },
            Expression::IfExpr {
                condition,
                then_expr,
                else_expr,
            } => Expr::If {
                condition: self.boxed(condition)?,
                then_expr: self.boxed(then_expr)?,
                else_expr: self.boxed(else_expr)?,
            },

            Expression::RangeExpr { start, end } => Expr::Range {
                start: Box::new(atomized(self.compile(start)?)),
                end: Box::new(atomized(self.compile(end)?)),
            },
            Expression::StringConcat { left, right } => {
                let mut parts = match self.compile(left)? {
                    Expr::StringConcat(parts) => parts,
                    other => vec![other],
                };
                parts.push(self.compile(right)?);
                Expr::StringConcat(parts)
            }
            Expression::SimpleMapExpr { base, mapping } => Expr::SimpleMap {
                base: self.boxed(base)?,
                mapping: self.boxed(mapping)?,
            },
            Expression::ArrowExpr { base, steps } => {
                let mut current = self.compile(base)?;
                for step in steps {
                    let mut args = vec![Some(current)];
                    args.extend(self.compile_arguments(&step.args)?);
                    current = match &step.target {
                        ArrowTarget::Named(name) => self.function_call(name, args)?,
                        ArrowTarget::Variable(name) => Expr::DynamicCall {
                            function: Box::new(Expr::Variable(self.variable_name(name)?)),
                            args,
                        },
                        ArrowTarget::Parenthesized(e) => Expr::DynamicCall {
                            function: self.boxed(e)?,
                            args,
                        },
                    };
                }
                current
            }
            Expression::LookupExpr { base, key } => Expr::Lookup {
                base: self.boxed(base)?,
                key: self.lookup_key(key)?,
            },
            Expression::UnaryLookup(key) => Expr::UnaryLookup(self.lookup_key(key)?),

            Expression::MapConstructor(entries) => Expr::MapConstructor(
                entries
                    .iter()
                    .map(|entry| {
                        Ok((
                            atomized(self.compile(&entry.key)?),
                            self.compile(&entry.value)?,
                        ))
                    })
                    .collect::<Result<Vec<_>, MetapathError>>()?,
            ),
            Expression::ArrayConstructor(ast::ArrayConstructorKind::Square(members)) => {
                Expr::SquareArray(self.compile_all(members)?)
            }
            Expression::ArrayConstructor(ast::ArrayConstructorKind::Curly(body)) => {
                Expr::CurlyArray(self.boxed(body)?)
            }

            Expression::InstanceOf {
                expr,
                sequence_type,
            } => Expr::InstanceOf {
                expr: self.boxed(expr)?,
                sequence_type: self.sequence_type(sequence_type)?,
            },
            Expression::TreatAs {
                expr,
                sequence_type,
            } => Expr::TreatAs {
                expr: self.boxed(expr)?,
                sequence_type: self.sequence_type(sequence_type)?,
            },
            Expression::CastAs { expr, single_type } => Expr::CastAs {
                expr: Box::new(atomized(self.compile(expr)?)),
                target: self.cast_target(&single_type.type_name)?,
                allow_empty: single_type.optional,
            },
            Expression::CastableAs { expr, single_type } => Expr::CastableAs {
                expr: Box::new(atomized(self.compile(expr)?)),
                target: self.cast_target(&single_type.type_name)?,
                allow_empty: single_type.optional,
            },
        };
        Ok(expr)
    }

    fn boxed(&self, expression: &Expression) -> Result<Box<Expr>, MetapathError> {
        self.compile(expression).map(Box::new)
    }

    fn compile_all(&self, expressions: &[Expression]) -> Result<Vec<Expr>, MetapathError> {
        expressions.iter().map(|e| self.compile(e)).collect()
    }

    /// Compiles call arguments; placeholders become `None`.
    fn compile_arguments(&self, args: &[Expression]) -> Result<Vec<Option<Expr>>, MetapathError> {
        args.iter()
            .map(|arg| match arg {
                Expression::ArgumentPlaceholder => Ok(None),
                other => self.compile(other).map(Some),
            })
            .collect()
    }

    fn binary(
        &self,
        left: &Expression,
        op: BinaryOperator,
        right: &Expression,
    ) -> Result<Expr, MetapathError> {
        let l = self.compile(left)?;
        let r = self.compile(right)?;
        let general = |op| Expr::GeneralComparison {
            left: Box::new(l.clone()),
            op,
            right: Box::new(r.clone()),
        };
        let value = |op| Expr::ValueComparison {
            left: Box::new(atomized(l.clone())),
            op,
            right: Box::new(atomized(r.clone())),
        };
        let arithmetic = |op| Expr::Arithmetic {
            left: Box::new(atomized(l.clone())),
            op,
            right: Box::new(atomized(r.clone())),
        };
        let node = |op| Expr::NodeComparison {
            left: Box::new(l.clone()),
            op,
            right: Box::new(r.clone()),
        };
        let set = |op| Expr::SetOp {
            left: Box::new(l.clone()),
            op,
            right: Box::new(r.clone()),
        };

        let expr = match op {
            BinaryOperator::Or => Expr::Or(Box::new(l), Box::new(r)),
            BinaryOperator::And => Expr::And(Box::new(l), Box::new(r)),
            BinaryOperator::Equals => general(ComparisonOp::Eq),
            BinaryOperator::NotEquals => general(ComparisonOp::Ne),
            BinaryOperator::LessThan => general(ComparisonOp::Lt),
            BinaryOperator::LessThanOrEqual => general(ComparisonOp::Le),
            BinaryOperator::GreaterThan => general(ComparisonOp::Gt),
            BinaryOperator::GreaterThanOrEqual => general(ComparisonOp::Ge),
            BinaryOperator::ValueEq => value(ComparisonOp::Eq),
            BinaryOperator::ValueNe => value(ComparisonOp::Ne),
            BinaryOperator::ValueLt => value(ComparisonOp::Lt),
            BinaryOperator::ValueLe => value(ComparisonOp::Le),
            BinaryOperator::ValueGt => value(ComparisonOp::Gt),
            BinaryOperator::ValueGe => value(ComparisonOp::Ge),
            BinaryOperator::Is => node(NodeComparisonOp::Is),
            BinaryOperator::Precedes => node(NodeComparisonOp::Precedes),
            BinaryOperator::Follows => node(NodeComparisonOp::Follows),
            BinaryOperator::Plus => arithmetic(ArithmeticOp::Add),
            BinaryOperator::Minus => arithmetic(ArithmeticOp::Subtract),
            BinaryOperator::Multiply => arithmetic(ArithmeticOp::Multiply),
            BinaryOperator::Divide => arithmetic(ArithmeticOp::Divide),
            BinaryOperator::IntegerDivide => arithmetic(ArithmeticOp::IntegerDivide),
            BinaryOperator::Modulo => arithmetic(ArithmeticOp::Modulo),
            BinaryOperator::Union => set(SetOp::Union),
            BinaryOperator::Intersect => set(SetOp::Intersect),
            BinaryOperator::Except => set(SetOp::Except),
        };
        Ok(expr)
    }

    fn function_call(&self, name: &QName, args: Vec<Option<Expr>>) -> Result<Expr, MetapathError> {
        let function = self.resolve_function(name, args.len())?;

        if args.iter().any(Option::is_none) {
            return Ok(Expr::PartialCall { function, args });
        }
        let args: Vec<Expr> = args.into_iter().flatten().collect();

        let mut literals = Vec::new();
        for (index, arg) in args.iter().enumerate() {
            if let Expr::Literal(value) = arg {
                if let Some(expected) = function.parameter_type(index) {
                    functions::coerce(value.clone(), expected, || {
                        format!("Argument {} of {}", index + 1, function)
                    })?;
                }
                literals.push(value.clone());
            }
        }

        if function.properties.is_foldable() && literals.len() == args.len() {
            if let Some(folded) = self.fold(&function, literals) {
                return Ok(Expr::Literal(folded));
            }
        }
        Ok(Expr::FunctionCall { function, args })
    }

    /// Evaluates a pure call at compile time. Any failure leaves the call in
    /// place so that the error surfaces when the expression is evaluated.
    fn fold(&self, function: &Function, args: Vec<Sequence>) -> Option<Sequence> {
        let dynamic = self
            .fold_context
            .get_or_init(|| DynamicContext::new(Arc::new(self.context.clone())));
        let focus = Focus::none();
        let result = function.invoke(args, &CallContext::new(dynamic, &focus)).ok()?;
        // Folded results are plain values; keep function items out of literals.
        if result.iter().any(|item| matches!(item, Item::Function(_))) {
            return None;
        }
        Some(result)
    }

    fn resolve_function(&self, name: &QName, arity: usize) -> Result<Arc<Function>, MetapathError> {
        let namespace = match (&name.namespace, &name.prefix) {
            (Some(ns), _) => ns.clone(),
            (None, Some(prefix)) => self.namespace(prefix)?.to_string(),
            (None, None) => self.context.default_function_namespace.clone(),
        };
        let library = &self.context.library;
        match library.lookup(&namespace, &name.local_part, arity) {
            Some(function) => Ok(Arc::clone(function)),
            None if library.contains(&namespace, &name.local_part) => {
                Err(MetapathError::static_error(
                    codes::XPST0017,
                    format!(
                        "Function '{}' does not accept {} argument(s)",
                        name, arity
                    ),
                ))
            }
            None => Err(MetapathError::static_error(
                codes::XPST0017,
                format!("Unknown function '{}#{}'", name, arity),
            )),
        }
    }

    fn namespace(&self, prefix: &str) -> Result<&str, MetapathError> {
        self.context.namespace_uri(prefix).ok_or_else(|| {
            MetapathError::static_error(
                codes::XPST0081,
                format!("Namespace prefix '{}' is not declared", prefix),
            )
        })
    }

    /// Variables in no namespace keep their local name; others use the
    /// expanded `Q{uri}local` form.
    fn variable_name(&self, name: &QName) -> Result<String, MetapathError> {
        match (&name.namespace, &name.prefix) {
            (Some(ns), _) => Ok(format!("Q{{{}}}{}", ns, name.local_part)),
            (None, Some(prefix)) => Ok(format!(
                "Q{{{}}}{}",
                self.namespace(prefix)?,
                name.local_part
            )),
            (None, None) => Ok(name.local_part.clone()),
        }
    }

    fn lookup_key(&self, key: &ast::LookupKey) -> Result<LookupKey, MetapathError> {
        Ok(match key {
            ast::LookupKey::Wildcard => LookupKey::Wildcard,
            ast::LookupKey::NCName(name) => LookupKey::Name(name.clone()),
            ast::LookupKey::Integer(i) => LookupKey::Integer(*i),
            ast::LookupKey::Parenthesized(e) => LookupKey::Computed(self.boxed(e)?),
        })
    }

    fn sequence_type(&self, decl: &ast::SequenceTypeDecl) -> Result<SequenceType, MetapathError> {
        match decl {
            ast::SequenceTypeDecl::Empty => Ok(SequenceType::Empty),
            ast::SequenceTypeDecl::Of(item, occurrence) => {
                let item_type = match item {
                    ast::ItemTypeDecl::AnyItem => ItemType::AnyItem,
                    ast::ItemTypeDecl::Atomic(name) => ItemType::Atomic(self.atomic_type(name)?),
                    ast::ItemTypeDecl::Kind(test) => ItemType::Kind(test.clone()),
                    ast::ItemTypeDecl::Function(arity) => ItemType::Function(*arity),
                    ast::ItemTypeDecl::Map => ItemType::Map,
                    ast::ItemTypeDecl::Array => ItemType::Array,
                };
                Ok(SequenceType::Of(item_type, *occurrence))
            }
        }
    }

    fn atomic_type(&self, name: &QName) -> Result<AtomicType, MetapathError> {
        let namespace = match (&name.namespace, &name.prefix) {
            (Some(ns), _) => Some(ns.as_str()),
            (None, Some(prefix)) => Some(self.namespace(prefix)?),
            (None, None) => None,
        };
        let unknown = || {
            MetapathError::static_error(
                codes::XPST0051,
                format!("Unknown atomic type '{}'", name),
            )
        };
        if namespace.is_some_and(|ns| ns != XS) {
            return Err(unknown());
        }
        AtomicType::from_name(&name.local_part).ok_or_else(unknown)
    }

    fn cast_target(&self, name: &QName) -> Result<AtomicType, MetapathError> {
        let target = self.atomic_type(name)?;
        if target.is_abstract() {
            return Err(MetapathError::static_error(
                codes::XPST0051,
                format!("Cannot cast to the abstract type {}", target),
            ));
        }
        Ok(target)
    }
}

/// Wraps `expr` in an atomization unless it already yields atomic values.
fn atomized(expr: Expr) -> Expr {
    match expr {
        Expr::Literal(ref seq) if seq.iter().all(|i| i.is_atomic()) => expr,
        Expr::Atomize(_)
        | Expr::Arithmetic { .. }
        | Expr::Negate(_)
        | Expr::ValueComparison { .. }
        | Expr::GeneralComparison { .. }
        | Expr::StringConcat(_)
        | Expr::CastAs { .. }
        | Expr::Range { .. } => expr,
        other => Expr::Atomize(Box::new(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn compile_text(text: &str) -> Result<Expr, MetapathError> {
        compile(&parse_expression(text)?, &StaticContext::default())
    }

    #[test]
    fn test_unknown_function() {
        let err = compile_text("no-such-function(1)").unwrap_err();
        assert_eq!(err.code(), codes::XPST0017);
        assert!(err.is_static());
    }

    #[test]
    fn test_wrong_arity() {
        let err = compile_text("substring('abc')").unwrap_err();
        assert_eq!(err.code(), codes::XPST0017);
        assert!(err.to_string().contains("does not accept 1 argument"));
    }

    #[test]
    fn test_unknown_prefix() {
        let err = compile_text("foo:bar()").unwrap_err();
        assert_eq!(err.code(), codes::XPST0081);
    }

    #[test]
    fn test_literal_argument_type_checked() {
        let err = compile_text("upper-case(true())").unwrap_err();
        assert_eq!(err.code(), codes::XPTY0004);
        let err = compile_text("upper-case(1)").unwrap_err();
        assert_eq!(err.code(), codes::XPTY0004);
    }

    #[test]
    fn test_pure_calls_are_folded() {
        let expr = compile_text("concat('a', 'b')").unwrap();
        assert!(matches!(expr, Expr::Literal(seq) if seq == Sequence::from_string("ab")));
    }

    #[test]
    fn test_failing_fold_is_deferred() {
        let expr = compile_text("xs:integer('abc')").unwrap();
        assert!(matches!(expr, Expr::FunctionCall { .. }));
    }

    #[test]
    fn test_context_functions_are_not_folded() {
        let expr = compile_text("current-dateTime()").unwrap();
        assert!(matches!(expr, Expr::FunctionCall { .. }));
        let expr = compile_text("string()").unwrap();
        assert!(expr.is_focus_dependent());
    }

    #[test]
    fn test_arrow_becomes_call() {
        let expr = compile_text("$s => upper-case()").unwrap();
        let Expr::FunctionCall { function, args } = expr else {
            panic!("Expected FunctionCall");
        };
        assert_eq!(function.name, "upper-case");
        assert!(matches!(args[0], Expr::Variable(ref n) if n == "s"));
    }

    #[test]
    fn test_arithmetic_operands_atomized() {
        let expr = compile_text("@count + 1").unwrap();
        let Expr::Arithmetic { left, right, .. } = expr else {
            panic!("Expected Arithmetic");
        };
        assert!(matches!(*left, Expr::Atomize(_)));
        assert!(matches!(*right, Expr::Literal(_)));
    }

    #[test]
    fn test_placeholders_make_partial_calls() {
        let expr = compile_text("substring(?, 1, 2)").unwrap();
        assert!(matches!(expr, Expr::PartialCall { .. }));
    }

    #[test]
    fn test_cast_targets() {
        assert!(compile_text("'1' cast as xs:integer").is_ok());
        assert_eq!(
            compile_text("'1' cast as xs:anyAtomicType").unwrap_err().code(),
            codes::XPST0051
        );
        assert_eq!(
            compile_text("'1' cast as xs:nonsense").unwrap_err().code(),
            codes::XPST0051
        );
    }

    #[test]
    fn test_multiple_let_bindings_nest() {
        let expr = compile_text("let $a := 1, $b := $a return $b").unwrap();
        let Expr::Let { name, body, .. } = expr else {
            panic!("Expected Let");
        };
        assert_eq!(name, "a");
        assert!(matches!(*body, Expr::Let { ref name, .. } if name == "b"));
    }
}
