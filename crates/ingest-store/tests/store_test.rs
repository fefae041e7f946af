//! Store behaviour against a real in-memory libsql database.

use chrono::NaiveDate;
use ingest_ir::{ColumnType, ErrorKind, ImportedRow, SchemaColumn, Value};
use ingest_store::{
    AccessMode, Commodity, DatabaseLocator, Error, RemoteSource, TableRef, TabularStore,
};

fn order_schema() -> Vec<SchemaColumn> {
    vec![
        SchemaColumn::new("order_id", ColumnType::Text).with_nullable(false),
        SchemaColumn::new("qty", ColumnType::Integer),
        SchemaColumn::new("shipped", ColumnType::Boolean),
        SchemaColumn::new("ordered_on", ColumnType::Date),
    ]
}

fn order_rows() -> Vec<ImportedRow> {
    let date = |d| Value::Date(NaiveDate::from_ymd_opt(2024, 1, d).unwrap());
    vec![
        ImportedRow::new(1, vec!["A-1".into(), Value::Integer(2), Value::Boolean(true), date(3)]),
        ImportedRow::new(3, vec!["A-3".into(), Value::Integer(5), Value::Boolean(false), date(4)]),
        ImportedRow::new(4, vec!["A-4".into(), Value::Null, Value::Null, Value::Null]),
    ]
}

async fn loaded_store() -> TabularStore {
    let store = TabularStore::open_in_memory().await.unwrap();
    store.load(&order_schema(), &order_rows()).await.unwrap();
    store
}

#[tokio::test]
async fn test_rows_are_addressed_by_identity_not_offset() {
    let store = loaded_store().await;
    assert_eq!(store.row_count().await.unwrap(), 3);

    let row = store.get_row(3).await.unwrap().unwrap();
    assert_eq!(row.source_row_num, 3);
    assert_eq!(row.get("order_id"), Some(&Value::from("A-3")));
    assert_eq!(row.get("shipped"), Some(&Value::Boolean(false)));
    assert_eq!(
        row.get("ordered_on"),
        Some(&Value::Date(NaiveDate::from_ymd_opt(2024, 1, 4).unwrap()))
    );
    assert!(store.get_row(2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_load_keeps_previous_import() {
    let store = loaded_store().await;
    let duplicate = vec![
        ImportedRow::new(1, vec!["X".into()]),
        ImportedRow::new(1, vec!["Y".into()]),
    ];
    let err = store
        .load(&[SchemaColumn::new("other", ColumnType::Text)], &duplicate)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    assert_eq!(store.columns().await.unwrap(), order_schema());
    assert_eq!(store.row_count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_reload_replaces_schema_and_overrides() {
    let store = loaded_store().await;
    store.set_override("qty", "VARCHAR").await.unwrap();

    let columns = vec![SchemaColumn::new("sku", ColumnType::Text)];
    store
        .load(&columns, &[ImportedRow::new(1, vec!["S1".into()])])
        .await
        .unwrap();
    assert_eq!(store.columns().await.unwrap(), columns);
    assert!(store.overrides().await.is_empty());
}

#[tokio::test]
async fn test_filter_binds_parameters_and_pages() {
    let store = loaded_store().await;
    let page = store
        .filter("qty >= ?", &[Value::Integer(2)], 1, 0)
        .await
        .unwrap();
    assert_eq!(page.total_count, 2);
    assert_eq!(page.rows.len(), 1);
    assert_eq!(page.rows[0].source_row_num, 1);

    let next = store
        .filter("qty >= ?", &[Value::Integer(2)], 1, 1)
        .await
        .unwrap();
    assert_eq!(next.rows[0].source_row_num, 3);

    let err = store.filter("1=1; DELETE FROM imported_data", &[], 10, 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRejected);
}

#[tokio::test]
async fn test_override_changes_read_type_but_not_data() {
    let store = loaded_store().await;
    let over = store.set_override("qty", "varchar").await.unwrap();
    assert_eq!(over.target, ColumnType::Text);

    let row = store.get_row(1).await.unwrap().unwrap();
    assert_eq!(row.get("qty"), Some(&Value::from("2")));

    assert_eq!(store.clear_overrides().await, 1);
    let row = store.get_row(1).await.unwrap().unwrap();
    assert_eq!(row.get("qty"), Some(&Value::Integer(2)));

    let err = store.set_override("qty", "INT); DROP TABLE x").await.unwrap_err();
    assert!(matches!(err, Error::InvalidOverride { .. }));
    let err = store.set_override("missing", "INT").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_stored_row_ignores_overrides() {
    let store = loaded_store().await;
    store.set_override("order_id", "INTEGER").await.unwrap();
    store.set_override("shipped", "TEXT").await.unwrap();

    let overridden = store.get_row(3).await.unwrap().unwrap();
    assert_eq!(overridden.get("order_id"), Some(&Value::Integer(0)));

    let stored = store.get_stored_row(3).await.unwrap().unwrap();
    assert_eq!(stored.source_row_num, 3);
    assert_eq!(stored.get("order_id"), Some(&Value::from("A-3")));
    assert_eq!(stored.get("shipped"), Some(&Value::Boolean(false)));
    assert!(store.get_stored_row(2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_checksum_follows_values_not_identity() {
    let store = TabularStore::open_in_memory().await.unwrap();
    let columns = vec![SchemaColumn::new("v", ColumnType::Text)];
    store
        .load(
            &columns,
            &[
                ImportedRow::new(1, vec!["same".into()]),
                ImportedRow::new(2, vec!["same".into()]),
            ],
        )
        .await
        .unwrap();
    let rows = store.rows_between(1, 2).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].checksum(), rows[1].checksum());
}

#[tokio::test]
async fn test_adhoc_query_hides_identity_and_blocks_writes() {
    let store = loaded_store().await;
    let output = store
        .query("SELECT * FROM imported_data /* DROP TABLE x */ WHERE qty > 1")
        .await
        .unwrap();
    assert_eq!(output.columns, vec!["order_id", "qty", "shipped", "ordered_on"]);
    assert_eq!(output.row_count, 2);
    assert_eq!(output.rows[0][2], Value::Boolean(true));

    let err = store.query("DELETE FROM imported_data").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRejected);

    // The store is writable again after a guarded query.
    store
        .update_row(1, &[("tracking_number".to_string(), "1Z999".into())])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_update_row_adds_text_columns() {
    let store = loaded_store().await;
    let added = store
        .update_row(
            3,
            &[
                ("tracking_number".to_string(), "1Z1".into()),
                ("qty".to_string(), Value::Integer(9)),
            ],
        )
        .await
        .unwrap();
    assert_eq!(added, vec!["tracking_number"]);

    let row = store.get_row(3).await.unwrap().unwrap();
    assert_eq!(row.get("tracking_number"), Some(&Value::from("1Z1")));
    assert_eq!(row.get("qty"), Some(&Value::Integer(9)));
    assert!(store.get_row(1).await.unwrap().unwrap().get("tracking_number").unwrap().is_null());

    let err = store
        .update_row(99, &[("qty".to_string(), Value::Integer(1))])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_column_samples_are_distinct_and_sorted() {
    let store = loaded_store().await;
    let samples = store.column_samples("qty", 10).await.unwrap();
    assert_eq!(samples, vec![Value::Integer(2), Value::Integer(5)]);
    assert!(store.column_samples("nope", 10).await.is_err());
}

#[tokio::test]
async fn test_clear_drops_active_import() {
    let store = loaded_store().await;
    store.clear().await.unwrap();
    assert!(!store.is_loaded().await);
    assert!(matches!(store.get_row(1).await.unwrap_err(), Error::NoActiveImport));
}

#[tokio::test]
async fn test_commodities_group_by_order_and_replace() {
    let store = TabularStore::open_in_memory().await.unwrap();
    assert!(store.commodities_for(&[1]).await.unwrap().is_empty());

    let mut scarf = Commodity::new(1, "Scarf");
    scarf.origin_country = "it".to_string();
    scarf.quantity = 2;
    let lines = vec![scarf, Commodity::new(2, "Mug"), Commodity::new(1, "Gloves")];
    assert_eq!(store.load_commodities(&lines).await.unwrap(), 3);
    // Commodities load without an active import and leave it absent.
    assert!(!store.is_loaded().await);

    let found = store.commodities_for(&[1, 5]).await.unwrap();
    assert_eq!(found.len(), 1);
    let order = &found[&1];
    assert_eq!(order.len(), 2);
    assert_eq!(order[0].description, "Scarf");
    assert_eq!(order[0].origin_country, "IT");
    assert_eq!(order[0].quantity, 2);
    assert_eq!(order[1].description, "Gloves");
    assert_eq!(order[1].unit_of_measure, "PCS");
    assert!(store.commodities_for(&[]).await.unwrap().is_empty());

    store.load_commodities(&[Commodity::new(2, "Plate")]).await.unwrap();
    let found = store.commodities_for(&[1, 2]).await.unwrap();
    assert_eq!(found.keys().copied().collect::<Vec<_>>(), vec![2]);
    assert_eq!(found[&2][0].description, "Plate");

    let mut bad = Commodity::new(3, "Vase");
    bad.origin_country = "Italy".to_string();
    let err = store.load_commodities(&[bad]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRejected);
    // A rejected load keeps the previous lines.
    assert_eq!(store.commodities_for(&[2]).await.unwrap().len(), 1);

    store.clear().await.unwrap();
    assert!(store.commodities_for(&[2]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_source_key_introspection() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("orders.db");
    {
        let db = libsql::Builder::new_local(&path).build().await?;
        let conn = db.connect()?;
        conn.execute(
            "CREATE TABLE orders (region TEXT, num INTEGER, note TEXT, PRIMARY KEY (num, region))",
            (),
        )
        .await?;
        conn.execute(
            "CREATE TABLE skus (id INTEGER, code TEXT, label TEXT)",
            (),
        )
        .await?;
        conn.execute("CREATE UNIQUE INDEX skus_code ON skus(code)", ()).await?;
        conn.execute("INSERT INTO orders VALUES ('west', 2, 'b'), ('east', 1, 'a')", ())
            .await?;
    }

    let locator = DatabaseLocator::local(path.display().to_string());
    let source = RemoteSource::attach(&locator, AccessMode::ReadOnly).await?;
    let orders = TableRef::new("orders");
    assert_eq!(source.primary_key_columns(&orders).await?, vec!["num", "region"]);
    assert_eq!(source.count_rows(&orders).await?, 2);
    assert_eq!(
        source.unique_key_columns(&TableRef::new("skus")).await?,
        Some(vec!["code".to_string()])
    );
    assert_eq!(source.list_tables().await?, vec!["orders", "skus"]);
    assert_eq!(
        source.output_columns("SELECT note, num FROM orders").await?,
        vec!["note", "num"]
    );

    let err = source.execute("DELETE FROM orders", Vec::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRejected);
    Ok(())
}
