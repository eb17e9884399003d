//! Metapath and validation throughput benchmarks
//!
//! Measures compilation, path evaluation and a full constraint pass over
//! generated catalogs of increasing size.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use metaschema::{
    Constraint, ConstraintSet, DataType, Document, DynamicContext, Item, KeyField,
    MetapathExpression, ValidationConfig,
};
use std::hint::black_box;

/// A catalog of `groups` groups with ten controls each; every control links
/// to the first control of its group.
fn generated_catalog(groups: usize) -> Document {
    Document::builder()
        .base_uri("file:///bench/catalog.xml")
        .root_assembly("catalog", |catalog| {
            for g in 0..groups {
                catalog.assembly("group", |group| {
                    group
                        .flag("id", DataType::Token, &format!("g{}", g))
                        .field("title", DataType::MarkupLine, &format!("Group {}", g));
                    for c in 0..10 {
                        group.assembly("control", |control| {
                            control
                                .flag("id", DataType::Token, &format!("g{}-{}", g, c))
                                .field(
                                    "title",
                                    DataType::MarkupLine,
                                    &format!("Control {} of {}", c, g),
                                )
                                .field_with("prop", DataType::Token, "active", |p| {
                                    p.flag("name", DataType::Token, "status");
                                })
                                .field_with("link", DataType::String, "parent", |l| {
                                    l.flag("href", DataType::UriReference, &format!("#g{}-0", g));
                                });
                        });
                    }
                });
            }
        })
        .build()
}

const QUERIES: [(&str, &str); 4] = [
    ("descendants", "count(//control)"),
    ("predicate", "//control[prop = 'active'][ends-with(@id, '-9')]/title"),
    ("flwor", "for $g in /catalog/group return count($g/control[link])"),
    ("map_build", "map:size(map:merge(//control ! map { string(@id): title }))"),
];

fn benchmark_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("metapath_compile");

    for (name, source) in QUERIES {
        group.bench_with_input(BenchmarkId::new("query", name), &source, |b, source| {
            b.iter(|| MetapathExpression::compile(black_box(source)).expect("Failed to compile"));
        });
    }

    group.finish();
}

fn benchmark_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("metapath_evaluate");
    let ctx = DynamicContext::default();

    for groups in [1, 10, 100] {
        let doc = generated_catalog(groups);
        for (name, source) in QUERIES {
            let expr = MetapathExpression::compile(source).expect("Failed to compile");
            group.bench_with_input(BenchmarkId::new(name, groups), &groups, |b, _| {
                b.iter(|| {
                    expr.evaluate(Some(Item::Node(doc.root())), &ctx)
                        .expect("Failed to evaluate")
                        .len()
                });
            });
        }
    }

    group.finish();
}

fn benchmark_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("constraint_validation");
    let constraints = ConstraintSet::new()
        .with(
            "catalog",
            Constraint::index(
                "//control",
                "controls",
                vec![KeyField::new("@id").expect("key field")],
            )
            .expect("index constraint"),
        )
        .with(
            "catalog",
            Constraint::index_has_key(
                "//link",
                "controls",
                vec![KeyField::with_pattern("@href", "#(.*)").expect("key field")],
            )
            .expect("index-has-key constraint"),
        )
        .with(
            "group",
            Constraint::cardinality("control", Some(1), Some(20)).expect("cardinality constraint"),
        )
        .with(
            "control",
            Constraint::matches_pattern("@id", "g\\d+-\\d+").expect("pattern constraint"),
        )
        .with(
            "prop",
            Constraint::allowed_values(".", ["active", "withdrawn"], false)
                .expect("allowed values"),
        );
    let config = ValidationConfig::default();

    for groups in [1, 10, 100] {
        let doc = generated_catalog(groups);
        group.bench_with_input(BenchmarkId::new("groups", groups), &groups, |b, _| {
            b.iter(|| {
                let result = metaschema::validate(&doc, &constraints, &config);
                assert!(result.is_passing());
                result.findings.len()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_compile, benchmark_evaluate, benchmark_validate);
criterion_main!(benches);
