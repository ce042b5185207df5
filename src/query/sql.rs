//! SQL text for the pipeline tables
//!
//! Identifiers come from validated config and are quoted here; locations
//! are embedded as escaped string literals.

/// eBird columns and their types in the raw table
pub const RAW_COLUMNS: &[(&str, &str)] = &[
    ("speciesCode", "VARCHAR"),
    ("comName", "VARCHAR"),
    ("sciName", "VARCHAR"),
    ("locId", "VARCHAR"),
    ("locName", "VARCHAR"),
    ("obsDt", "VARCHAR"),
    ("howMany", "INTEGER"),
    ("lat", "DOUBLE"),
    ("lng", "DOUBLE"),
    ("obsValid", "BOOLEAN"),
    ("obsReviewed", "BOOLEAN"),
    ("locationPrivate", "BOOLEAN"),
    ("subId", "VARCHAR"),
];

/// Quote an identifier, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `"database"."table"`
pub fn qualified_table(database: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(database), quote_identifier(table))
}

/// View over the raw newline-delimited JSON objects
pub fn create_raw_view(target: &str, glob_url: &str) -> String {
    let columns = RAW_COLUMNS
        .iter()
        .map(|(name, ty)| format!("{}: {}", quote_literal(name), quote_literal(ty)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "CREATE OR REPLACE VIEW {target} AS SELECT * FROM read_json({}, format = 'newline_delimited', columns = {{{columns}}})",
        quote_literal(glob_url)
    )
}

/// Dev projection of the raw table plus the `YYYY-MM` partition column
pub fn dev_select(source: &str, partition_column: &str) -> String {
    let columns = RAW_COLUMNS
        .iter()
        .map(|(name, _)| name.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT {columns}, SUBSTRING(obsdt, 1, 7) AS {} FROM {source}",
        quote_identifier(partition_column)
    )
}

/// `SELECT *` from a table
pub fn select_all(source: &str) -> String {
    format!("SELECT * FROM {source}")
}

/// Write a query result as Snappy-compressed Parquet partitioned by one column
pub fn copy_partitioned(select: &str, location: &str, partition_column: &str) -> String {
    format!(
        "COPY ({select}) TO {} (FORMAT PARQUET, COMPRESSION 'SNAPPY', PARTITION_BY ({}), OVERWRITE_OR_IGNORE true)",
        quote_literal(location),
        quote_identifier(partition_column)
    )
}

/// View over a Hive-partitioned Parquet location
pub fn create_parquet_view(target: &str, location: &str) -> String {
    let glob = format!("{}/**/*.parquet", location.trim_end_matches('/'));
    format!(
        "CREATE OR REPLACE VIEW {target} AS SELECT * FROM read_parquet({}, hive_partitioning = true)",
        quote_literal(&glob)
    )
}

/// Row count of a table, as column `row_count`
pub fn row_count(source: &str) -> String {
    format!("SELECT COUNT(*) AS row_count FROM {source}")
}
