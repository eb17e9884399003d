mod common;

use common::{TestResult, catalog, eval, eval_on, init_logging, strings};
use metaschema::metapath::{AtomicValue, Item, codes};
use metaschema::{DynamicContext, MetapathExpression, Sequence};
use rust_decimal::Decimal;

const DAYS: &str = "map { 0: 'Sonntag', 1: 'Montag', 2: 'Dienstag', 3: 'Mittwoch', \
                    4: 'Donnerstag', 5: 'Freitag', 6: 'Samstag' }";

fn integers(sequence: &Sequence) -> Vec<i64> {
    strings(sequence)
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect()
}

#[test]
fn test_substring_clamps_its_bounds() -> TestResult {
    init_logging();

    assert_eq!(eval("substring('metadata', 4, 3)")?, Sequence::from_string("ada"));
    assert_eq!(eval("substring((), 1, 3)")?, Sequence::from_string(""));
    assert_eq!(eval("substring('metadata', 0, 3)")?, Sequence::from_string("me"));
    assert_eq!(eval("substring('metadata', 7, 10)")?, Sequence::from_string("ta"));
    assert_eq!(eval("substring('metadata', 3, -1)")?, Sequence::from_string(""));
    Ok(())
}

#[test]
fn test_integer_and_decimal_division() -> TestResult {
    init_logging();

    assert_eq!(eval("7 idiv 2")?, Sequence::from_integer(3));
    assert_eq!(eval("-7 idiv 2")?, Sequence::from_integer(-3));
    assert_eq!(eval("7 div 2")?, Sequence::from_decimal(Decimal::new(35, 1)));

    let err = eval("7 idiv 0").unwrap_err();
    assert_eq!(err.code(), codes::FOAR0001);
    Ok(())
}

#[test]
fn test_map_remove_on_day_names() -> TestResult {
    init_logging();

    let size = |call: &str| eval(&format!("map:size(map:remove({}, {}))", DAYS, call));
    assert_eq!(size("4")?, Sequence::from_integer(6));
    assert_eq!(size("23")?, Sequence::from_integer(7));
    assert_eq!(size("()")?, Sequence::from_integer(7));
    assert_eq!(size("(0, 6 to 7)")?, Sequence::from_integer(5));

    let remaining = eval(&format!("sort(map:keys(map:remove({}, (0, 6 to 7))))", DAYS))?;
    assert_eq!(integers(&remaining), vec![1, 2, 3, 4, 5]);

    let removed = eval(&format!("map:contains(map:remove({}, 4), 4)", DAYS))?;
    assert_eq!(removed, Sequence::from_bool(false));
    assert_eq!(
        eval(&format!("map:remove({}, 4)?3", DAYS))?,
        Sequence::from_string("Mittwoch")
    );

    // The original map is untouched.
    let original = eval(&format!(
        "let $m := {} return (map:remove($m, 4), map:size($m))[2]",
        DAYS
    ))?;
    assert_eq!(original, Sequence::from_integer(7));
    Ok(())
}

#[test]
fn test_last_reflects_focus_size() -> TestResult {
    init_logging();
    let ctx = DynamicContext::default();
    let last = MetapathExpression::compile("last()")?;

    assert_eq!(
        last.evaluate_with_focus(&Sequence::empty(), &ctx)?,
        Sequence::from_integer(0)
    );
    let five = Sequence::from_items((1..=5).map(|i| Item::from(AtomicValue::Integer(i))).collect());
    assert_eq!(last.evaluate_with_focus(&five, &ctx)?, Sequence::from_integer(5));
    assert_eq!(eval("(10, 20, 30)[last()]")?, Sequence::from_integer(30));
    Ok(())
}

#[test]
fn test_repeated_evaluation_is_deterministic() -> TestResult {
    init_logging();
    let doc = catalog();
    let expr = MetapathExpression::compile("string-join(sort(//control/@id ! string()), ',')")?;
    let ctx = DynamicContext::default();
    let first = expr.evaluate(Some(Item::Node(doc.root())), &ctx)?;
    for _ in 0..3 {
        assert_eq!(expr.evaluate(Some(Item::Node(doc.root())), &ctx)?, first);
    }
    assert_eq!(first, Sequence::from_string("ac-1,ac-2,au-1"));
    Ok(())
}

#[test]
fn test_string_functions_over_nodes() -> TestResult {
    init_logging();
    let doc = catalog();

    assert_eq!(
        eval_on("upper-case(//control[@id = 'au-1']/title)", &doc)?,
        Sequence::from_string("EVENT LOGGING")
    );
    assert_eq!(
        eval_on("string-join(//group/@id, '|')", &doc)?,
        Sequence::from_string("ac|au")
    );
    assert_eq!(
        eval_on("string-length(/catalog/metadata/title)", &doc)?,
        Sequence::from_integer(14)
    );
    assert_eq!(
        strings(&eval_on("tokenize((//control)[1]/title, '\\s+')", &doc)?),
        vec!["Policy", "and", "Procedures"]
    );
    assert_eq!(
        eval_on("replace(//link/@href, '^#', '')", &doc)?,
        Sequence::from_string("ac-1")
    );
    assert_eq!(
        eval_on("count(//control[matches(@id, '^ac-\\d$')])", &doc)?,
        Sequence::from_integer(2)
    );
    Ok(())
}

#[test]
fn test_sequence_aggregates() -> TestResult {
    init_logging();
    let doc = catalog();

    assert_eq!(
        eval_on("count(distinct-values(//prop/@name))", &doc)?,
        Sequence::from_integer(1)
    );
    assert_eq!(
        integers(&eval_on("index-of(//control/@id ! string(), 'au-1')", &doc)?),
        vec![3]
    );
    assert_eq!(eval("sum((1, 2.5))")?, Sequence::from_decimal(Decimal::new(35, 1)));
    assert_eq!(eval("avg((2, 4, 6)) = 4")?, Sequence::from_bool(true));
    assert_eq!(eval("max(('ac-2', 'ac-10'))")?, Sequence::from_string("ac-2"));
    assert_eq!(eval("exactly-one((1, 2))").unwrap_err().code(), codes::FORG0005);
    Ok(())
}

#[test]
fn test_higher_order_functions() -> TestResult {
    init_logging();
    let doc = catalog();

    assert_eq!(
        strings(&eval_on(
            "for-each(//group, function($g) { $g/@id || '-' || count($g/control) })",
            &doc
        )?),
        vec!["ac-2", "au-1"]
    );
    assert_eq!(
        strings(&eval_on("filter(//control, function($c) { exists($c/link) })/@id", &doc)?),
        vec!["au-1"]
    );
    assert_eq!(
        eval("fold-left(1 to 5, 0, function($acc, $n) { $acc + $n })")?,
        Sequence::from_integer(15)
    );
    assert_eq!(
        eval("let $f := concat#3 return $f('a', 'b', 'c')")?,
        Sequence::from_string("abc")
    );
    assert_eq!(
        eval("function-arity(substring#2)")?,
        Sequence::from_integer(2)
    );
    assert_eq!(
        eval("apply(function($a, $b) { $a * $b }, [6, 7])")?,
        Sequence::from_integer(42)
    );
    Ok(())
}

#[test]
fn test_array_functions() -> TestResult {
    init_logging();

    assert_eq!(eval("array:size(array:append([1, 2], 3))")?, Sequence::from_integer(3));
    assert_eq!(
        integers(&eval("array:flatten([1, [2, [3]], 4])")?),
        vec![1, 2, 3, 4]
    );
    assert_eq!(eval("array:reverse([1, 2, 3])?1")?, Sequence::from_integer(3));
    assert_eq!(eval("array:get([1, 2], 5)").unwrap_err().code(), codes::FOAY0001);
    assert_eq!(
        eval("let $a := [1, 2] return (array:size(array:remove($a, 1)), array:size($a))")?,
        Sequence::from_atomics([AtomicValue::Integer(1), AtomicValue::Integer(2)])
    );
    Ok(())
}

#[test]
fn test_datetime_values_from_document() -> TestResult {
    init_logging();
    let doc = catalog();

    assert_eq!(
        eval_on("month-from-dateTime(//last-modified)", &doc)?,
        Sequence::from_integer(3)
    );
    assert_eq!(
        eval_on("//last-modified < xs:dateTime('2025-01-01T00:00:00Z')", &doc)?,
        Sequence::from_bool(true)
    );
    assert_eq!(
        strings(&eval("xs:date('2024-03-10') - xs:date('2024-03-01')")?),
        vec!["P9D"]
    );
    assert_eq!(
        strings(&eval("xs:date('2024-01-31') + xs:yearMonthDuration('P1M')")?),
        vec!["2024-02-29"]
    );
    Ok(())
}

#[test]
fn test_decimal_and_duration_limits_raise_errors() -> TestResult {
    init_logging();

    assert_eq!(
        eval("round(xs:decimal('79228162514264337593543950335'), 2)")?,
        Sequence::from_decimal(Decimal::MAX)
    );
    assert_eq!(
        eval("round(xs:decimal('79228162514264337593543950335'), -1)").unwrap_err().code(),
        codes::FOAR0002
    );
    assert_eq!(
        eval("xs:dayTimeDuration('PT79228162514264337593543950335H')").unwrap_err().code(),
        codes::FODT0002
    );
    assert_eq!(
        eval("xs:dateTime('2020-01-01T00:00:00Z') + xs:dayTimeDuration('P999999999999999D')")
            .unwrap_err()
            .code(),
        codes::FODT0001
    );
    Ok(())
}

#[test]
fn test_casts_and_constructors() -> TestResult {
    init_logging();

    assert_eq!(eval("xs:integer('42')")?, Sequence::from_integer(42));
    assert_eq!(eval("'4.20' cast as xs:decimal")?, Sequence::from_decimal(Decimal::new(42, 1)));
    assert_eq!(eval("'maybe' castable as xs:boolean")?, Sequence::from_bool(false));
    assert_eq!(eval("xs:boolean('1')")?, Sequence::from_bool(true));
    assert_eq!(eval("xs:integer('x')").unwrap_err().code(), codes::FORG0001);
    Ok(())
}

#[test]
fn test_error_and_trace() -> TestResult {
    init_logging();

    let err = eval("error((), 'stop here')").unwrap_err();
    assert_eq!(err.code(), codes::FOER0000);
    assert!(err.to_string().contains("stop here"));

    assert_eq!(eval("trace(1 + 1, 'sum')")?, Sequence::from_integer(2));
    Ok(())
}

#[test]
fn test_uri_functions() -> TestResult {
    init_logging();
    let doc = catalog();

    assert_eq!(
        strings(&eval_on("resolve-uri('profile.xml', base-uri(/catalog))", &doc)?),
        vec!["file:///data/profile.xml"]
    );
    assert_eq!(
        eval("encode-for-uri('a b/c')")?,
        Sequence::from_string("a%20b%2Fc")
    );
    Ok(())
}
