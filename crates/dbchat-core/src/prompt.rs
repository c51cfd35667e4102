//! System prompt assembly from live host context.

use chrono::Local;
use log::warn;

use crate::host::{ConnectionInfo, HostEnvironment, TableRef};

/// Base instruction template. Placeholders are substituted once each,
/// in document order.
pub const INSTRUCTIONS_TEMPLATE: &str = "\
You are an AI assistant embedded in a database client. You help the \
user explore and query the database they are connected to.

Today is {current_date}.

Connection details:
- Connection type: {connection_type}
- Database name: {database_name}
- Default schema: {default_schema}
- Read-only mode: {read_only_mode}

The tables available on this connection are:
{tables}

Use the provided tools to inspect table structure before writing \
queries, and prefer queries scoped to the tables listed above. Never \
run a destructive statement without making clear to the user what it \
will do.";

/// Wrapper applied when the connection is MongoDB; the base template
/// substitutes at `{instructions.txt}`.
pub const MONGODB_TEMPLATE: &str = "\
This connection is MongoDB, not a SQL database. Tables in the \
instructions below are collections, and queries must use MongoDB \
query syntax rather than SQL.

{instructions.txt}";

/// Schemas hidden from the model; system catalogs add noise without
/// being useful query targets.
const SYSTEM_SCHEMAS: &[&str] = &[
    "information_schema",
    "pg_catalog",
    "pg_toast",
    "sys",
    "INFORMATION_SCHEMA",
];

/// Drop tables living in system schemas.
pub fn filter_system_tables(tables: Vec<TableRef>) -> Vec<TableRef> {
    tables
        .into_iter()
        .filter(|table| {
            table
                .schema
                .as_deref()
                .is_none_or(|schema| !SYSTEM_SCHEMAS.contains(&schema))
        })
        .collect()
}

/// Today's date in long weekday form, e.g. "Friday, August 28, 2026".
pub fn current_date_formatted() -> String {
    Local::now().format("%A, %B %-d, %Y").to_string()
}

/// Substitute host context into the instruction template.
pub fn render_instructions(
    info: &ConnectionInfo,
    tables: &[TableRef],
    current_date: &str,
) -> String {
    let tables_json = serde_json::to_string(tables).unwrap_or_else(|_| "[]".to_string());
    let result = INSTRUCTIONS_TEMPLATE
        .replacen("{current_date}", current_date, 1)
        .replacen("{connection_type}", &info.connection_type, 1)
        .replacen("{database_name}", &info.database_name, 1)
        .replacen("{default_schema}", &info.default_schema, 1)
        .replacen("{read_only_mode}", &info.read_only_mode.to_string(), 1)
        .replacen("{tables}", &tables_json, 1);
    if info.connection_type == "mongodb" {
        MONGODB_TEMPLATE.replacen("{instructions.txt}", &result, 1)
    } else {
        result
    }
}

/// Build the system prompt from live host context. Host failures fall
/// back to neutral defaults rather than failing the turn.
pub async fn default_instructions(host: &dyn HostEnvironment) -> String {
    let info = match host.connection_info().await {
        Ok(info) => info,
        Err(err) => {
            warn!("failed to get connection info, using defaults (error={err})");
            ConnectionInfo::default()
        }
    };
    let tables = match host.tables().await {
        Ok(tables) => filter_system_tables(tables),
        Err(err) => {
            warn!("failed to get tables, using empty list (error={err})");
            Vec::new()
        }
    };
    render_instructions(&info, &tables, &current_date_formatted())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(name: &str, schema: Option<&str>) -> TableRef {
        TableRef {
            name: name.to_string(),
            schema: schema.map(str::to_string),
        }
    }

    #[test]
    fn system_schemas_are_filtered() {
        let tables = vec![
            table("users", Some("public")),
            table("tables", Some("information_schema")),
            table("pg_type", Some("pg_catalog")),
            table("orders", None),
        ];
        let kept = filter_system_tables(tables);
        let names: Vec<_> = kept.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["users", "orders"]);
    }

    #[test]
    fn placeholders_are_substituted() {
        let info = ConnectionInfo {
            connection_type: "postgresql".to_string(),
            read_only_mode: true,
            database_name: "shop".to_string(),
            default_schema: "public".to_string(),
        };
        let rendered = render_instructions(
            &info,
            &[table("users", Some("public"))],
            "Friday, August 28, 2026",
        );
        assert!(rendered.contains("Connection type: postgresql"));
        assert!(rendered.contains("Database name: shop"));
        assert!(rendered.contains("Read-only mode: true"));
        assert!(rendered.contains("Friday, August 28, 2026"));
        assert!(rendered.contains("\"users\""));
        assert!(!rendered.contains("{connection_type}"));
        assert!(!rendered.contains("{tables}"));
    }

    #[test]
    fn mongodb_connection_wraps_base_template() {
        let info = ConnectionInfo {
            connection_type: "mongodb".to_string(),
            ..ConnectionInfo::default()
        };
        let rendered = render_instructions(&info, &[], "Monday, January 5, 2026");
        assert!(rendered.starts_with("This connection is MongoDB"));
        assert!(rendered.contains("Connection type: mongodb"));
    }

    #[test]
    fn default_connection_info_matches_fallbacks() {
        let info = ConnectionInfo::default();
        assert_eq!(info.connection_type, "unknown");
        assert_eq!(info.database_name, "unknown");
        assert_eq!(info.read_only_mode, false);
        assert_eq!(info.default_schema, "");
    }
}
