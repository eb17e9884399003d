mod common;

use std::sync::Arc;
use std::thread;

use common::{TestResult, catalog, eval, eval_on, init_logging, strings};
use metaschema::metapath::{AtomicValue, Variables, codes};
use metaschema::{DynamicContext, Item, MetapathExpression, Sequence, StaticContext};

#[test]
fn test_child_and_descendant_paths() -> TestResult {
    init_logging();
    let doc = catalog();

    assert_eq!(eval_on("count(//control)", &doc)?, Sequence::from_integer(3));
    assert_eq!(eval_on("count(/catalog/group)", &doc)?, Sequence::from_integer(2));
    assert_eq!(eval_on("count(//title)", &doc)?, Sequence::from_integer(6));
    assert_eq!(
        strings(&eval_on("/catalog/group/control/@id", &doc)?),
        vec!["ac-1", "ac-2", "au-1"]
    );
    assert_eq!(
        strings(&eval_on("/catalog/metadata/title", &doc)?),
        vec!["Sample Catalog"]
    );
    assert!(eval_on("/catalog/missing", &doc)?.is_empty());
    Ok(())
}

#[test]
fn test_predicates_select_by_value_and_position() -> TestResult {
    init_logging();
    let doc = catalog();

    assert_eq!(
        strings(&eval_on("//control[@id = 'ac-2']/prop", &doc)?),
        vec!["withdrawn"]
    );
    assert_eq!(
        strings(&eval_on("//control[prop = 'active']/title", &doc)?),
        vec!["Policy and Procedures"]
    );
    assert_eq!(
        strings(&eval_on("(//control)[last()]/@id", &doc)?),
        vec!["au-1"]
    );
    // Positional predicates on a step apply per parent.
    assert_eq!(
        strings(&eval_on("//control[1]/@id", &doc)?),
        vec!["ac-1", "au-1"]
    );
    assert_eq!(
        strings(&eval_on("/catalog/group[@id = 'au']/control/title", &doc)?),
        vec!["Event Logging"]
    );
    Ok(())
}

#[test]
fn test_cross_references_within_document() -> TestResult {
    init_logging();
    let doc = catalog();

    let target = eval_on(
        "//control[@id = substring-after(//link/@href, '#')]/title",
        &doc,
    )?;
    assert_eq!(strings(&target), vec!["Policy and Procedures"]);

    let linked = eval_on(
        "some $l in //link satisfies exists(//control[@id = substring($l/@href, 2)])",
        &doc,
    )?;
    assert_eq!(linked, Sequence::from_bool(true));
    Ok(())
}

#[test]
fn test_reverse_axes_and_parent_steps() -> TestResult {
    init_logging();
    let doc = catalog();

    assert_eq!(
        strings(&eval_on("//link/../@id", &doc)?),
        vec!["au-1"]
    );
    assert_eq!(
        strings(&eval_on("//prop[. = 'withdrawn']/ancestor::group/@id", &doc)?),
        vec!["ac"]
    );
    assert_eq!(
        eval_on("count((//control)[2]/preceding-sibling::control)", &doc)?,
        Sequence::from_integer(1)
    );
    Ok(())
}

#[test]
fn test_node_functions_over_document() -> TestResult {
    init_logging();
    let doc = catalog();

    assert_eq!(eval_on("name(/*)", &doc)?, Sequence::from_string("catalog"));
    assert_eq!(
        eval_on("path((//control)[3]/@id)", &doc)?,
        Sequence::from_string("/catalog[1]/group[2]/control[1]/@id")
    );
    assert_eq!(
        eval_on("has-children((//prop)[1])", &doc)?,
        Sequence::from_bool(false)
    );
    assert_eq!(
        strings(&eval_on("base-uri(/catalog)", &doc)?),
        vec!["file:///data/catalog.xml"]
    );
    Ok(())
}

#[test]
fn test_typed_values_of_nodes() -> TestResult {
    init_logging();
    let doc = catalog();

    let modified = eval_on("data(//last-modified)", &doc)?;
    let value = modified.first().and_then(|i| i.as_atomic().cloned());
    assert!(matches!(value, Some(AtomicValue::DateTime(_))));

    assert_eq!(
        eval_on("year-from-dateTime(//last-modified)", &doc)?,
        Sequence::from_integer(2024)
    );
    assert_eq!(
        eval_on("//last-modified instance of field()", &doc)?,
        Sequence::from_bool(true)
    );
    Ok(())
}

#[test]
fn test_flwor_style_expressions() -> TestResult {
    init_logging();
    let doc = catalog();

    let ids = eval_on(
        "for $g in /catalog/group return $g/@id || ':' || count($g/control)",
        &doc,
    )?;
    assert_eq!(strings(&ids), vec!["ac:2", "au:1"]);

    let summary = eval_on(
        "let $active := //control[prop = 'active'] \
         return if (count($active) = 1) then $active/@id else 'many'",
        &doc,
    )?;
    assert_eq!(strings(&summary), vec!["ac-1"]);

    let all_titled = eval_on("every $c in //control satisfies exists($c/title)", &doc)?;
    assert_eq!(all_titled, Sequence::from_bool(true));
    Ok(())
}

#[test]
fn test_maps_and_arrays_built_from_nodes() -> TestResult {
    init_logging();
    let doc = catalog();

    let by_id = eval_on(
        "let $m := map:merge(//control ! map { string(@id): string(title) }) \
         return $m?('ac-2')",
        &doc,
    )?;
    assert_eq!(by_id, Sequence::from_string("Account Management"));

    let titles = eval_on("array { //control/title ! string() }?2", &doc)?;
    assert_eq!(titles, Sequence::from_string("Account Management"));

    assert_eq!(
        eval_on("array:size(array { //control })", &doc)?,
        Sequence::from_integer(3)
    );
    Ok(())
}

#[test]
fn test_arithmetic_promotions() -> TestResult {
    init_logging();

    assert_eq!(eval("7 idiv 2")?, Sequence::from_integer(3));
    assert_eq!(strings(&eval("7 div 2")?), vec!["3.5"]);
    assert_eq!(eval("-5 mod 3")?, Sequence::from_integer(-2));
    assert_eq!(strings(&eval("1e0 div 0")?), vec!["INF"]);
    assert!(eval("() * 2")?.is_empty());

    assert_eq!(eval("1 div 0").unwrap_err().code(), codes::FOAR0001);
    assert_eq!(eval("(1, 2) + 1").unwrap_err().code(), codes::XPTY0004);
    Ok(())
}

#[test]
fn test_static_errors_carry_codes() -> TestResult {
    init_logging();

    let err = MetapathExpression::compile("1 +").unwrap_err();
    assert!(err.is_static());
    assert_eq!(err.code(), codes::XPST0003);

    let err = MetapathExpression::compile("no-such-function(1)").unwrap_err();
    assert_eq!(err.code(), codes::XPST0017);

    let err = MetapathExpression::compile("bogus:f()").unwrap_err();
    assert_eq!(err.code(), codes::XPST0081);

    assert_eq!(eval("$undeclared").unwrap_err().code(), codes::XPST0008);
    Ok(())
}

#[test]
fn test_context_dependent_expressions_need_focus() -> TestResult {
    init_logging();

    let expr = MetapathExpression::compile("@id")?;
    assert!(expr.is_focus_dependent());
    let err = expr.evaluate(None, &DynamicContext::default()).unwrap_err();
    assert_eq!(err.code(), codes::XPDY0002);

    assert!(!MetapathExpression::compile("1 + 1")?.is_focus_dependent());
    Ok(())
}

#[test]
fn test_evaluation_relative_to_a_node() -> TestResult {
    init_logging();
    let doc = catalog();
    let ctx = DynamicContext::default();

    let control = eval_on("(//control)[2]", &doc)?
        .first()
        .ok_or("control not found")?;
    let expr = MetapathExpression::compile("title || ' (' || @id || ')'")?;
    assert_eq!(
        expr.evaluate_as_string(Some(control.clone()), &ctx)?,
        "Account Management (ac-2)"
    );
    assert!(MetapathExpression::compile("prop = 'withdrawn'")?
        .evaluate_as_boolean(Some(control), &ctx)?);
    Ok(())
}

#[test]
fn test_bound_variables() -> TestResult {
    init_logging();
    let doc = catalog();
    let ctx = DynamicContext::builder(Arc::new(StaticContext::default()))
        .variable("limit", Sequence::from_integer(2))
        .variable("wanted", Sequence::from_string("au"))
        .build();

    let limited = MetapathExpression::compile("(//control)[position() <= $limit]/@id")?
        .evaluate(Some(Item::Node(doc.root())), &ctx)?;
    assert_eq!(strings(&limited), vec!["ac-1", "ac-2"]);

    let group = MetapathExpression::compile("//group[@id = $wanted]/title")?
        .evaluate(Some(Item::Node(doc.root())), &ctx)?;
    assert_eq!(strings(&group), vec!["Audit"]);

    let rebound = ctx.with_variables(Variables::new().bind("limit", Sequence::from_integer(1)));
    let single = MetapathExpression::compile("(//control)[position() <= $limit]/@id")?
        .evaluate(Some(Item::Node(doc.root())), &rebound)?;
    assert_eq!(strings(&single), vec!["ac-1"]);
    Ok(())
}

#[test]
fn test_compiled_expression_is_reusable_across_threads() -> TestResult {
    init_logging();
    let doc = catalog();
    let expr = MetapathExpression::compile("count(//control[starts-with(@id, 'ac')])")?;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let expr = expr.clone();
            let root = doc.root();
            thread::spawn(move || {
                expr.evaluate(Some(Item::Node(root)), &DynamicContext::default())
            })
        })
        .collect();

    for handle in handles {
        let result = handle.join().map_err(|_| "evaluation thread panicked")??;
        assert_eq!(result, Sequence::from_integer(2));
    }
    Ok(())
}
