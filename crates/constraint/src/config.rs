use chrono::FixedOffset;
use metaschema_model::{MetapathPathFormatter, NamePathFormatter, PathFormatter};

/// How node locations are rendered in findings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PathFormat {
    /// `/catalog[1]/group[2]/@id`
    #[default]
    Metapath,
    /// `/catalog/group/@id`
    Name,
}

impl PathFormat {
    pub fn formatter(&self) -> &'static dyn PathFormatter {
        match self {
            PathFormat::Metapath => &MetapathPathFormatter,
            PathFormat::Name => &NamePathFormatter,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    /// Also record a `Pass` finding for every successful check, for audit
    /// output.
    ///
    /// Defaults to `false`.
    pub report_passing: bool,

    /// Maximum nesting of dynamic function calls while evaluating constraint
    /// expressions.
    ///
    /// Defaults to `256`.
    pub recursion_limit: usize,

    /// Timezone assumed for date and time values that carry none. `None` uses
    /// the local offset.
    pub implicit_timezone: Option<FixedOffset>,

    pub path_format: PathFormat,

    /// Findings kept per constraint; the rest are counted and replaced by a
    /// single summary finding. `None` keeps everything.
    pub max_findings_per_constraint: Option<usize>,

    /// Indent the JSON report.
    ///
    /// Defaults to `true`.
    pub pretty_json: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            report_passing: false,
            recursion_limit: 256,
            implicit_timezone: None,
            path_format: PathFormat::default(),
            max_findings_per_constraint: None,
            pretty_json: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_model::{DataType, Document};

    #[test]
    fn test_path_formats() {
        let doc = Document::builder()
            .root_assembly("catalog", |c| {
                c.flag("id", DataType::Token, "x");
            })
            .build();
        let Some(id) = doc.root_assembly().and_then(|c| c.flag("id")) else {
            panic!("Expected the id flag");
        };
        assert_eq!(id.to_path(PathFormat::Metapath.formatter()), "/catalog[1]/@id");
        assert_eq!(id.to_path(PathFormat::Name.formatter()), "/catalog/@id");
    }

    #[test]
    fn test_defaults() {
        let config = ValidationConfig::default();
        assert!(!config.report_passing);
        assert_eq!(config.recursion_limit, 256);
        assert_eq!(config.path_format, PathFormat::Metapath);
        assert!(config.max_findings_per_constraint.is_none());
    }
}
