use metaschema::metapath::MetapathError;
use metaschema::{DataType, Document, DynamicContext, Item, MetapathExpression, Sequence};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Routes `log` output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A small control catalog:
///
/// ```text
/// catalog @uuid
///   metadata/title, metadata/last-modified
///   group @id=ac
///     control @id=ac-1 (title, prop @name=status value=active)
///     control @id=ac-2 (title, prop @name=status value=withdrawn)
///   group @id=au
///     control @id=au-1 (title, link @href=#ac-1)
/// ```
pub fn catalog() -> Document {
    Document::builder()
        .base_uri("file:///data/catalog.xml")
        .root_assembly("catalog", |catalog| {
            catalog
                .flag("uuid", DataType::Uuid, "0d9f0e4c-3b37-4b8e-9f07-5c6d2f1f8b21")
                .assembly("metadata", |m| {
                    m.field("title", DataType::MarkupLine, "Sample Catalog")
                        .field(
                            "last-modified",
                            DataType::DateTimeWithTimezone,
                            "2024-03-01T12:00:00Z",
                        );
                })
                .assembly("group", |g| {
                    g.flag("id", DataType::Token, "ac")
                        .field("title", DataType::MarkupLine, "Access Control")
                        .assembly("control", |c| {
                            c.flag("id", DataType::Token, "ac-1")
                                .field("title", DataType::MarkupLine, "Policy and Procedures")
                                .field_with("prop", DataType::Token, "active", |p| {
                                    p.flag("name", DataType::Token, "status");
                                });
                        })
                        .assembly("control", |c| {
                            c.flag("id", DataType::Token, "ac-2")
                                .field("title", DataType::MarkupLine, "Account Management")
                                .field_with("prop", DataType::Token, "withdrawn", |p| {
                                    p.flag("name", DataType::Token, "status");
                                });
                        });
                })
                .assembly("group", |g| {
                    g.flag("id", DataType::Token, "au")
                        .field("title", DataType::MarkupLine, "Audit")
                        .assembly("control", |c| {
                            c.flag("id", DataType::Token, "au-1")
                                .field("title", DataType::MarkupLine, "Event Logging")
                                .field_with("link", DataType::String, "see", |l| {
                                    l.flag("href", DataType::UriReference, "#ac-1");
                                });
                        });
                });
        })
        .build()
}

/// Evaluates `source` without a context item.
pub fn eval(source: &str) -> Result<Sequence, MetapathError> {
    MetapathExpression::compile(source)?.evaluate(None, &DynamicContext::default())
}

/// Evaluates `source` with the document node of `document` as context item.
pub fn eval_on(source: &str, document: &Document) -> Result<Sequence, MetapathError> {
    MetapathExpression::compile(source)?
        .evaluate(Some(Item::Node(document.root())), &DynamicContext::default())
}

/// The string values of every item in `sequence`.
pub fn strings(sequence: &Sequence) -> Vec<String> {
    sequence
        .iter()
        .map(|item| item.string_value().unwrap_or_default())
        .collect()
}
