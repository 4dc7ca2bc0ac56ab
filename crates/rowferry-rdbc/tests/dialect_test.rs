//! Statement builder output across dialects

use rowferry_rdbc::builder::{DialectStatementBuilder, StatementBuilder};
use rowferry_rdbc::connection::DatabaseDriver;
use rowferry_rdbc::types::{ColumnMetadata, TableMetadata};

fn orders_table() -> TableMetadata {
    let mut table = TableMetadata::parse("shop.orders");
    table
        .columns
        .push(ColumnMetadata::new("id", "bigint").primary_key());
    table.columns.push(ColumnMetadata::new("customer", "varchar"));
    table.columns.push(ColumnMetadata::new("total", "numeric"));
    table
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn postgres_insert_uses_numbered_placeholders() {
    let builder = DialectStatementBuilder::new(DatabaseDriver::Postgres);
    let stmt = builder
        .insert(&orders_table(), &columns(&["id", "customer", "total"]))
        .unwrap();

    assert!(stmt.sql.contains("$1") && stmt.sql.contains("$2") && stmt.sql.contains("$3"));
    assert!(!stmt.sql.contains('?'));
    assert_eq!(stmt.parameters.len(), 3);
}

#[test]
fn mysql_insert_uses_question_marks_and_backticks() {
    let builder = DialectStatementBuilder::new(DatabaseDriver::MySql);
    let stmt = builder
        .insert(&orders_table(), &columns(&["id", "customer"]))
        .unwrap();

    assert_eq!(stmt.sql.matches('?').count(), 2);
    assert!(stmt.sql.contains("`orders`"), "{}", stmt.sql);
}

#[test]
fn ansi_fallback_quotes_with_double_quotes() {
    let builder = DialectStatementBuilder::new(DatabaseDriver::Sqlite);
    let stmt = builder
        .insert(&orders_table(), &columns(&["id"]))
        .unwrap();

    assert_eq!(
        stmt.sql,
        "INSERT INTO \"shop\".\"orders\" (\"id\") VALUES (?)"
    );
}

#[test]
fn update_places_set_before_key_parameters() {
    let builder = DialectStatementBuilder::new(DatabaseDriver::Postgres);
    let stmt = builder
        .update(
            &orders_table(),
            &columns(&["customer", "total"]),
            &columns(&["id"]),
        )
        .unwrap();

    assert_eq!(stmt.parameters, vec!["customer", "total", "id"]);
    assert!(stmt.sql.contains("\"customer\" = $1"));
    assert!(stmt.sql.contains("\"total\" = $2"));
    assert!(stmt.sql.contains("WHERE \"id\" = $3"));
}

#[test]
fn unqualified_table_has_no_schema_prefix() {
    let mut table = TableMetadata::new("plain");
    table.columns.push(ColumnMetadata::new("a", "integer"));

    let builder = DialectStatementBuilder::new(DatabaseDriver::Sqlite);
    let stmt = builder.insert(&table, &columns(&["a"])).unwrap();
    assert!(stmt.sql.starts_with("INSERT INTO \"plain\""), "{}", stmt.sql);
}
