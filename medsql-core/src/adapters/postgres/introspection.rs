//! Catalog reads for the schema snapshot.

use crate::adapters::helpers::RowExt;
use crate::error::SchemaFetchError;
use crate::models::{ColumnInfo, SchemaSnapshot};
use sqlx::PgPool;

/// Base tables and their columns in one namespace.
///
/// information_schema exposes domain types (`sql_identifier`,
/// `yes_or_no`), so every column is cast to text for decoding.
const SCHEMA_QUERY: &str = r#"
    SELECT
        t.table_name::text AS table_name,
        c.column_name::text AS column_name,
        c.data_type::text AS data_type,
        c.is_nullable::text AS is_nullable,
        c.column_default::text AS column_default
    FROM information_schema.tables t
    JOIN information_schema.columns c
        ON c.table_schema = t.table_schema
       AND c.table_name = t.table_name
    WHERE t.table_schema = $1
      AND t.table_type = 'BASE TABLE'
    ORDER BY t.table_name, c.ordinal_position
"#;

const CONTEXT: &str = "information_schema.columns";

pub(crate) async fn fetch_schema(
    pool: &PgPool,
    namespace: &str,
) -> Result<SchemaSnapshot, SchemaFetchError> {
    let rows = sqlx::query(SCHEMA_QUERY)
        .bind(namespace)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            SchemaFetchError::new(
                format!("Failed to read catalog for namespace '{}'", namespace),
                e,
            )
        })?;

    let mut catalog = Vec::with_capacity(rows.len());
    for row in &rows {
        let decode_error = |e| SchemaFetchError::new("Malformed catalog row", e);

        let table_name: String = row
            .get_field("table_name", Some(CONTEXT))
            .map_err(decode_error)?;
        let column_name: String = row
            .get_field("column_name", Some(CONTEXT))
            .map_err(decode_error)?;
        let data_type: String = row
            .get_field("data_type", Some(CONTEXT))
            .map_err(decode_error)?;
        let is_nullable: String = row
            .get_field("is_nullable", Some(CONTEXT))
            .map_err(decode_error)?;
        let column_default: Option<String> = row
            .get_field("column_default", Some(CONTEXT))
            .map_err(decode_error)?;

        catalog.push((
            table_name,
            ColumnInfo::new(
                column_name,
                data_type,
                is_nullable.eq_ignore_ascii_case("YES"),
                column_default,
            ),
        ));
    }

    let snapshot = SchemaSnapshot::from_catalog_rows(catalog);
    tracing::debug!(
        "Read {} tables ({} columns) from namespace '{}'",
        snapshot.table_count(),
        snapshot.column_count(),
        namespace
    );
    Ok(snapshot)
}
