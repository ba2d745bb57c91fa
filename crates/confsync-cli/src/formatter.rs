//! Output formatters.

use clap::ValueEnum;
use comfy_table::Table;
use serde_json::json;

use confsync_client::{CollectionUpdate, ConfigurationUpdate, ManagerStats};
use confsync_proto::{ConfigurationVariables, OperationDescriptor, PageFilter};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format an operation descriptor.
    fn format_descriptor(&self, descriptor: &OperationDescriptor) -> String;

    /// Format a validated variables bundle.
    fn format_variables(&self, variables: &ConfigurationVariables) -> String;

    /// Format the update produced by replayed payload number `index`.
    fn format_update(&self, index: usize, update: &ConfigurationUpdate) -> String;

    /// Format end-of-replay counters.
    fn format_summary(&self, stats: &ManagerStats) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_descriptor(&self, descriptor: &OperationDescriptor) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Variable", "Type", "Required"]);
        for variable in &descriptor.variables.variables {
            table.add_row(vec![
                variable.name.clone(),
                format!("{:?}", variable.ty),
                variable.required.to_string(),
            ]);
        }

        let mut collections = Table::new();
        collections.set_header(vec!["Collection", "Selector"]);
        for shape in &descriptor.selection.collections {
            collections.add_row(vec![
                shape.field.clone(),
                shape.selector.clone().unwrap_or_else(|| "-".to_string()),
            ]);
        }

        format!(
            "{} ({:?})\ncache id: {}\n\n{}\n\n{}\n\n{}",
            descriptor.name, descriptor.kind, descriptor.cache_id, table, collections, descriptor.text
        )
    }

    fn format_variables(&self, variables: &ConfigurationVariables) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Selector", "Page", "Page size", "Order", "Search"]);
        for (name, filter) in selectors(variables) {
            table.add_row(vec![
                name.to_string(),
                filter.page.clone(),
                filter.page_size.clone(),
                filter.order.clone().unwrap_or_default(),
                filter.search.clone().unwrap_or_default(),
            ]);
        }
        format!("variables are valid\n{}", table)
    }

    fn format_update(&self, index: usize, update: &ConfigurationUpdate) -> String {
        let present: Vec<&CollectionUpdate> = update.collections().collect();
        if present.is_empty() {
            return format!("#{}: no collections in payload", index);
        }

        let mut table = Table::new();
        table.set_header(vec![
            "Collection", "Page", "Total", "Added", "Updated", "Removed", "Failed",
        ]);
        for collection in present {
            table.add_row(vec![
                collection.key.collection().to_string(),
                collection.meta.page.to_string(),
                collection.meta.total_count.to_string(),
                collection.changes.added.join(", "),
                collection.changes.updated.join(", "),
                collection.changes.removed.join(", "),
                collection.failed_rows.to_string(),
            ]);
        }
        format!("#{}\n{}", index, table)
    }

    fn format_summary(&self, stats: &ManagerStats) -> String {
        format!(
            "{} payload(s), {} rejected, {} notification(s) delivered",
            stats.payloads(),
            stats.rejected_payloads(),
            stats.delivered()
        )
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_descriptor(&self, descriptor: &OperationDescriptor) -> String {
        serde_json::to_string_pretty(descriptor).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_variables(&self, variables: &ConfigurationVariables) -> String {
        json!({"valid": true, "variables": variables}).to_string()
    }

    fn format_update(&self, index: usize, update: &ConfigurationUpdate) -> String {
        json!({"payload": index, "update": update}).to_string()
    }

    fn format_summary(&self, stats: &ManagerStats) -> String {
        json!({
            "payloads": stats.payloads(),
            "rejected": stats.rejected_payloads(),
            "delivered": stats.delivered(),
            "dropped": stats.dropped(),
        })
        .to_string()
    }
}

fn selectors(variables: &ConfigurationVariables) -> [(&'static str, &PageFilter); 3] {
    [
        (confsync_proto::APPLICATION_SELECTOR, &variables.application_selector),
        (confsync_proto::PATTERN_SELECTOR, &variables.pattern_selector),
        (confsync_proto::FILTER_SELECTOR, &variables.filter_selector),
    ]
}
