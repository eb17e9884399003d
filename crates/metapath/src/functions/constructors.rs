//! `xs:*` constructor functions. Each is a cast of its optional argument to
//! the named type; XML Schema names without a dedicated representation cast
//! to their closest supported supertype.
use super::{CallContext, Function, FunctionLibrary, Properties, XS, opt, opt_atomic};
use crate::error::{MetapathError, codes};
use crate::types::{AtomicType, AtomicValue, Item, Sequence, cast};

fn construct(args: &[Sequence], target: AtomicType) -> Result<Sequence, MetapathError> {
    match opt_atomic(args, 0) {
        Some(value) => Ok(Sequence::from_atomic(cast::cast(&value, target)?)),
        None => Ok(Sequence::empty()),
    }
}

macro_rules! constructors {
    ($($function:ident => $name:literal as $target:ident;)*) => {
        $(
            fn $function(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
                construct(args, AtomicType::$target)
            }
        )*

        fn register_casts(library: &mut FunctionLibrary) {
            $(
                library.register(
                    Function::new(XS, $name, $function)
                        .param("arg", opt(AtomicType::AnyAtomic))
                        .returns(opt(AtomicType::$target)),
                );
            )*
        }
    };
}

constructors! {
    xs_string => "string" as String;
    xs_normalized_string => "normalizedString" as String;
    xs_token => "token" as Token;
    xs_language => "language" as Token;
    xs_ncname => "NCName" as NcName;
    xs_id => "ID" as NcName;
    xs_idref => "IDREF" as NcName;
    xs_untyped_atomic => "untypedAtomic" as UntypedAtomic;
    xs_any_uri => "anyURI" as AnyUri;
    xs_boolean => "boolean" as Boolean;
    xs_integer => "integer" as Integer;
    xs_int => "int" as Integer;
    xs_long => "long" as Integer;
    xs_short => "short" as Integer;
    xs_byte => "byte" as Integer;
    xs_non_negative_integer => "nonNegativeInteger" as NonNegativeInteger;
    xs_unsigned_int => "unsignedInt" as NonNegativeInteger;
    xs_unsigned_long => "unsignedLong" as NonNegativeInteger;
    xs_positive_integer => "positiveInteger" as PositiveInteger;
    xs_decimal => "decimal" as Decimal;
    xs_double => "double" as Double;
    xs_float => "float" as Double;
    xs_date => "date" as Date;
    xs_date_time => "dateTime" as DateTime;
    xs_date_time_stamp => "dateTimeStamp" as DateTime;
    xs_time => "time" as Time;
    xs_duration => "duration" as Duration;
    xs_day_time_duration => "dayTimeDuration" as DayTimeDuration;
    xs_year_month_duration => "yearMonthDuration" as YearMonthDuration;
    xs_base64_binary => "base64Binary" as Base64Binary;
}

/// `xs:QName`: a prefixed name resolves against the statically known
/// namespaces; an undeclared prefix is `FONS0004`.
fn xs_qname(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let Some(value) = opt_atomic(args, 0) else {
        return Ok(Sequence::empty());
    };
    let AtomicValue::QName(mut name) = cast::cast(&value, AtomicType::QName)? else {
        return Ok(Sequence::empty());
    };
    if let Some(prefix) = &name.prefix {
        let namespace = ctx
            .dynamic
            .static_context()
            .namespace_uri(prefix)
            .ok_or_else(|| {
                MetapathError::function(
                    codes::FONS0004,
                    format!("No namespace is bound to the prefix '{}'", prefix),
                )
            })?;
        name.namespace = Some(namespace.to_string());
    }
    Ok(Sequence::from_item(Item::Atomic(AtomicValue::QName(name))))
}

pub(super) fn register(library: &mut FunctionLibrary) {
    register_casts(library);
    library.register(
        Function::new(XS, "QName", xs_qname)
            .param("arg", opt(AtomicType::AnyAtomic))
            .returns(opt(AtomicType::QName))
            .properties(Properties::CONTEXT),
    );
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::MetapathExpression;
    use crate::context::DynamicContext;
    use crate::functions::FN;

    fn eval(source: &str) -> Result<Sequence, MetapathError> {
        MetapathExpression::compile(source)?.evaluate(None, &DynamicContext::default())
    }

    #[test]
    fn test_numeric_constructors() {
        assert_eq!(eval("xs:integer('42')").unwrap(), Sequence::from_integer(42));
        assert_eq!(eval("xs:int(7.9)").unwrap(), Sequence::from_integer(7));
        assert_eq!(
            eval("xs:decimal('1.50')").unwrap(),
            Sequence::from_decimal(Decimal::new(15, 1))
        );
        assert_eq!(eval("xs:double('INF')").unwrap(), Sequence::from_double(f64::INFINITY));
        assert!(eval("xs:integer(())").unwrap().is_empty());
        let err = eval("xs:positiveInteger('0')").unwrap_err();
        assert_eq!(err.code(), codes::FORG0001);
    }

    #[test]
    fn test_string_like_constructors() {
        assert_eq!(
            eval("xs:token('  a   b ')").unwrap(),
            Sequence::from_atomic(AtomicValue::Token("a b".into()))
        );
        assert_eq!(
            eval("xs:string(xs:anyURI('http://example.com'))").unwrap(),
            Sequence::from_string("http://example.com")
        );
        assert_eq!(
            eval("xs:boolean('1') instance of xs:boolean").unwrap(),
            Sequence::from_bool(true)
        );
        let err = eval("xs:NCName('a b')").unwrap_err();
        assert_eq!(err.code(), codes::FORG0001);
    }

    #[test]
    fn test_qname_resolves_prefix() {
        match eval("xs:QName('fn:concat')").unwrap().first() {
            Some(Item::Atomic(AtomicValue::QName(name))) => {
                assert_eq!(name.namespace.as_deref(), Some(FN));
                assert_eq!(name.local, "concat");
            }
            other => panic!("Expected QName, found {:?}", other),
        }
        let err = eval("xs:QName('nope:x')").unwrap_err();
        assert_eq!(err.code(), codes::FONS0004);
    }
}
