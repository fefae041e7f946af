//! Each adapter end to end against a real in-memory store.

use std::path::Path;

use chrono::NaiveDate;
use ingest_adapters::{
    AdapterRegistry, ColumnSpan, Error, FormatOptions, ImportLimits, ImportRequest, list_sheets,
    list_tables,
};
use ingest_ir::{ColumnType, ErrorKind, ImportResult, RowKeyStrategy, SourceType, Value};
use ingest_store::{DatabaseLocator, TabularStore};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

async fn import(store: &TabularStore, source_type: SourceType, request: ImportRequest) -> Result<ImportResult, Error> {
    let registry = AdapterRegistry::with_defaults();
    registry.get(source_type)?.import(store, &request).await
}

fn column_types(result: &ImportResult) -> Vec<(&str, ColumnType)> {
    result
        .columns
        .iter()
        .map(|column| (column.name.as_str(), column.column_type))
        .collect()
}

#[tokio::test]
async fn test_delimited_identity_reflects_original_position() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("orders.csv");
    std::fs::write(&path, "name,city,zip\nJohn,Dallas,07302\n,,\nJane,Austin,73301\n")?;

    let store = TabularStore::open_in_memory().await?;
    let result = import(&store, SourceType::Delimited, ImportRequest::file(&path)).await?;
    assert_eq!(result.row_count, 2);
    assert_eq!(
        column_types(&result),
        vec![("name", ColumnType::Text), ("city", ColumnType::Text), ("zip", ColumnType::Text)]
    );

    let jane = store.get_row(3).await?.expect("row 3");
    assert_eq!(jane.get("name"), Some(&Value::from("Jane")));
    assert!(store.get_row(2).await?.is_none());
    assert_eq!(
        store.get_row(1).await?.expect("row 1").get("zip"),
        Some(&Value::from("07302"))
    );
    Ok(())
}

#[tokio::test]
async fn test_delimited_warnings() -> anyhow::Result<()> {
    let store = TabularStore::open_in_memory().await?;
    let ambiguous = ImportRequest::inline("dates.csv", "id;shipped\n1;03/04/2024\n2;13/04/2024\n");
    let result = import(&store, SourceType::Delimited, ambiguous).await?;
    assert_eq!(result.column("shipped").map(|c| c.column_type), Some(ColumnType::Date));
    assert!(result.warnings.iter().any(|w| w.contains("ambiguous date '03/04/2024'")));
    assert_eq!(
        store.get_row(1).await?.expect("row 1").get("shipped"),
        Some(&Value::Date(NaiveDate::from_ymd_opt(2024, 3, 4).expect("date")))
    );

    let single = ImportRequest::inline("report.txt", "HEADER LINE\nsome text\n");
    let result = import(&store, SourceType::Delimited, single).await?;
    assert!(result.warnings.iter().any(|w| w.contains("Only one column")));
    Ok(())
}

fn write_workbook(path: &Path) -> anyhow::Result<()> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    let sheet = workbook.add_worksheet();
    sheet.set_name("Orders")?;
    sheet.write_string(0, 0, "order_id")?;
    sheet.write_string(0, 1, "qty")?;
    sheet.write_string(0, 2, "ordered")?;
    sheet.write_string(0, 3, "order_id")?;
    sheet.write_string(1, 0, "A-1")?;
    sheet.write_number(1, 1, 2.0)?;
    sheet.write_datetime_with_format(1, 2, &ExcelDateTime::from_ymd(2024, 1, 15)?, &date_format)?;
    sheet.write_string(1, 3, "dup")?;
    sheet.write_string(3, 0, "A-3")?;
    sheet.write_number(3, 1, 5.0)?;
    sheet.write_datetime_with_format(3, 2, &ExcelDateTime::from_ymd(2024, 2, 1)?, &date_format)?;

    let notes = workbook.add_worksheet();
    notes.set_name("Notes")?;
    notes.write_string(0, 0, "text")?;
    notes.write_string(1, 0, "hello")?;

    workbook.save(path)?;
    Ok(())
}

#[tokio::test]
async fn test_spreadsheet_stray_far_cell_keeps_its_row_number() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stray.xlsx");
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "order_id")?;
    sheet.write_string(0, 1, "note")?;
    sheet.write_string(1, 0, "A-1")?;
    sheet.write_string(200_000, 1, "stray")?;
    workbook.save(&path)?;

    let store = TabularStore::open_in_memory().await?;
    let result = import(&store, SourceType::Spreadsheet, ImportRequest::file(&path)).await?;
    assert_eq!(result.row_count, 2);
    assert!(result.warnings.contains(&"Skipped 199998 empty rows".to_string()));

    let stray = store.get_row(200_000).await?.expect("stray row");
    assert_eq!(stray.get("note"), Some(&Value::from("stray")));
    assert!(stray.get("order_id").is_some_and(Value::is_null));
    Ok(())
}

#[tokio::test]
async fn test_spreadsheet_import_skips_blank_rows() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("orders.xlsx");
    write_workbook(&path)?;

    assert_eq!(list_sheets(&path)?, vec!["Orders", "Notes"]);

    let store = TabularStore::open_in_memory().await?;
    let result = import(&store, SourceType::Spreadsheet, ImportRequest::file(&path)).await?;
    assert_eq!(result.row_count, 2);
    assert_eq!(
        column_types(&result),
        vec![
            ("order_id", ColumnType::Text),
            ("qty", ColumnType::Integer),
            ("ordered", ColumnType::Date),
            ("order_id_1", ColumnType::Text),
        ]
    );
    assert!(result.warnings.contains(&"Skipped 1 empty rows".to_string()));

    let row = store.get_row(3).await?.expect("row 3");
    assert_eq!(row.get("qty"), Some(&Value::Integer(5)));
    assert_eq!(
        row.get("ordered"),
        Some(&Value::Date(NaiveDate::from_ymd_opt(2024, 2, 1).expect("date")))
    );

    let notes = ImportRequest::file(&path).with_options(FormatOptions::new().sheet("Notes"));
    let result = import(&store, SourceType::Spreadsheet, notes).await?;
    assert_eq!(result.row_count, 1);

    let missing = ImportRequest::file(&path).with_options(FormatOptions::new().sheet("Nope"));
    let err = import(&store, SourceType::Spreadsheet, missing).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    // the failed import left the Notes sheet loaded
    assert_eq!(store.row_count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_fixed_width_with_header_line() -> anyhow::Result<()> {
    let text = concat!(
        "ORDER_NUM RECIPIENT_NAME      QTY\n",
        "\n",
        "ORD-2001  Sarah Mitchell      3\n",
        "ORD-2002  James Thornton      12\n",
    );
    let specs = vec![ColumnSpan::new(0, 10), ColumnSpan::new(10, 30), ColumnSpan::new(30, 35)];
    let request = ImportRequest::inline("ship.fwf", text)
        .with_options(FormatOptions::new().col_specs(specs.clone()));

    let store = TabularStore::open_in_memory().await?;
    let result = import(&store, SourceType::FixedWidth, request).await?;
    assert_eq!(
        column_types(&result),
        vec![
            ("ORDER_NUM", ColumnType::Text),
            ("RECIPIENT_NAME", ColumnType::Text),
            ("QTY", ColumnType::Integer),
        ]
    );
    let row = store.get_row(2).await?.expect("row 2");
    assert_eq!(row.get("RECIPIENT_NAME"), Some(&Value::from("James Thornton")));
    assert_eq!(row.get("QTY"), Some(&Value::Integer(12)));

    let headerless = ImportRequest::inline("ship.fwf", "AAAA  1\n")
        .with_options(FormatOptions::new().without_header().col_specs(vec![
            ColumnSpan::new(0, 4),
            ColumnSpan::new(6, 7),
        ]));
    let result = import(&store, SourceType::FixedWidth, headerless).await?;
    assert_eq!(result.columns[0].name, "col_0");

    let err = import(&store, SourceType::FixedWidth, ImportRequest::inline("x.fwf", "abc"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRejected);
    Ok(())
}

#[tokio::test]
async fn test_json_flattens_and_guards_size() -> anyhow::Result<()> {
    let doc = r#"{"meta": {"count": 2}, "orders": [
        {"id": 1, "ship_to": {"city": "Dallas", "geo": {"lat": 32.7}}, "tags": ["a", "b"]},
        {"id": 2, "ship_to": {"city": "Austin"}, "rush": true}
    ]}"#;
    let store = TabularStore::open_in_memory().await?;
    let result = import(&store, SourceType::Json, ImportRequest::inline("o.json", doc)).await?;
    let names: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "ship_to_city", "ship_to_geo_lat", "tags", "rush"]);
    assert_eq!(result.column("id").map(|c| c.column_type), Some(ColumnType::Integer));

    let first = store.get_row(1).await?.expect("row 1");
    assert_eq!(first.get("tags"), Some(&Value::from(r#"["a","b"]"#)));
    assert!(first.get("rush").is_some_and(Value::is_null));

    let limits = ImportLimits {
        max_document_bytes: 8,
        ..ImportLimits::default()
    };
    let err = import(&store, SourceType::Json, ImportRequest::inline("o.json", doc).with_limits(limits))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SizeExceeded);
    assert_eq!(store.row_count().await?, 2);

    let err = import(&store, SourceType::Json, ImportRequest::inline("bad.json", "{\"a\": ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FormatInvalid);
    Ok(())
}

#[tokio::test]
async fn test_xml_values_stay_text() -> anyhow::Result<()> {
    let doc = r#"<Feed><Orders>
        <Order id="7"><Total>10.50</Total><ShipTo><City>Dallas</City></ShipTo></Order>
        <Order id="8"><Total>3</Total><ShipTo><City>Austin</City></ShipTo></Order>
    </Orders></Feed>"#;
    let store = TabularStore::open_in_memory().await?;
    let result = import(&store, SourceType::Xml, ImportRequest::inline("feed.xml", doc)).await?;
    assert_eq!(result.row_count, 2);
    assert!(result.columns.iter().all(|c| c.column_type == ColumnType::Text));
    assert!(result.warnings.iter().any(|w| w.contains("auto-discovered")));

    let row = store.get_row(2).await?.expect("row 2");
    assert_eq!(row.get("id"), Some(&Value::from("8")));
    assert_eq!(row.get("ShipTo_City"), Some(&Value::from("Austin")));

    let explicit = ImportRequest::inline("feed.xml", doc)
        .with_options(FormatOptions::new().record_path("Feed/Orders/Order"));
    let result = import(&store, SourceType::Xml, explicit).await?;
    assert!(result.warnings.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_xml_leaf_attributes_become_columns() -> anyhow::Result<()> {
    let doc = r#"<orders>
        <order><id>1</id><price currency="EUR">4</price></order>
        <order><id>2</id><price currency="USD">9</price></order>
    </orders>"#;
    let store = TabularStore::open_in_memory().await?;
    let result = import(&store, SourceType::Xml, ImportRequest::inline("orders.xml", doc)).await?;
    let names: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "price_currency", "price_text"]);

    let row = store.get_row(2).await?.expect("row 2");
    assert_eq!(row.get("price_currency"), Some(&Value::from("USD")));
    assert_eq!(row.get("price_text"), Some(&Value::from("9")));
    Ok(())
}

async fn seed_database(path: &Path) -> anyhow::Result<()> {
    let db = libsql::Builder::new_local(path).build().await?;
    let conn = db.connect()?;
    conn.execute(
        "CREATE TABLE orders (region TEXT, num INTEGER, note TEXT, PRIMARY KEY (region, num))",
        (),
    )
    .await?;
    conn.execute(
        "INSERT INTO orders VALUES ('west', 2, 'c'), ('east', 9, 'b'), ('east', 1, 'a')",
        (),
    )
    .await?;
    conn.execute("CREATE TABLE events (label TEXT, payload BLOB)", ()).await?;
    conn.execute("INSERT INTO events VALUES ('x', x'beef')", ()).await?;
    Ok(())
}

#[tokio::test]
async fn test_database_orders_identity_by_key() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("source.db");
    seed_database(&path).await?;
    let locator = DatabaseLocator::local(path.display().to_string());
    let store = TabularStore::open_in_memory().await?;

    let request = ImportRequest::database(locator.clone(), "SELECT note, num, region FROM orders");
    let result = import(&store, SourceType::Database, request).await?;
    assert_eq!(result.row_key_strategy, Some(RowKeyStrategy::AutoPrimaryKey));
    assert_eq!(result.row_key_columns, Some(vec!["region".to_string(), "num".to_string()]));
    assert_eq!(result.deterministic_ready, Some(true));
    assert_eq!(store.get_row(1).await?.expect("row 1").get("note"), Some(&Value::from("a")));
    assert_eq!(store.get_row(3).await?.expect("row 3").get("note"), Some(&Value::from("c")));

    let explicit = ImportRequest::database(locator.clone(), "SELECT note, num FROM orders")
        .with_options(FormatOptions::new().row_key_columns(vec!["NOTE".to_string()]));
    let result = import(&store, SourceType::Database, explicit).await?;
    assert_eq!(result.row_key_strategy, Some(RowKeyStrategy::Explicit));
    assert_eq!(result.row_key_columns, Some(vec!["note".to_string()]));

    let unkeyed = ImportRequest::database(locator.clone(), "SELECT * FROM events");
    let result = import(&store, SourceType::Database, unkeyed).await?;
    assert_eq!(result.row_key_strategy, Some(RowKeyStrategy::None));
    assert!(result.warnings.iter().any(|w| w.contains("no deterministic row key")));
    assert_eq!(
        store.get_row(1).await?.expect("row 1").get("payload"),
        Some(&Value::from("beef"))
    );
    Ok(())
}

#[tokio::test]
async fn test_database_reimport_reproduces_numbering() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("source.db");
    seed_database(&path).await?;
    let locator = DatabaseLocator::local(path.display().to_string());
    let query = "SELECT region, num, note FROM orders WHERE note <> 'z'";

    let mut runs = Vec::new();
    for _ in 0..2 {
        let store = TabularStore::open_in_memory().await?;
        let result = import(&store, SourceType::Database, ImportRequest::database(locator.clone(), query)).await?;
        assert_eq!(result.row_count, 3);
        let rows: Vec<(u64, Option<Value>, String)> = store
            .rows_between(1, 3)
            .await?
            .into_iter()
            .map(|row| (row.source_row_num, row.get("note").cloned(), row.checksum()))
            .collect();
        runs.push(rows);
    }

    assert_eq!(runs[0], runs[1]);
    // Inserted as c, b, a; numbered by (region, num).
    let notes: Vec<Option<Value>> = runs[0].iter().map(|(_, note, _)| note.clone()).collect();
    assert_eq!(notes, vec![Some(Value::from("a")), Some(Value::from("b")), Some(Value::from("c"))]);
    Ok(())
}

#[tokio::test]
async fn test_database_guards() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("source.db");
    seed_database(&path).await?;
    let locator = DatabaseLocator::local(path.display().to_string());
    let store = TabularStore::open_in_memory().await?;
    let limits = ImportLimits {
        large_table_threshold: 2,
        ..ImportLimits::default()
    };

    let unfiltered = ImportRequest::database(locator.clone(), "SELECT * FROM orders").with_limits(limits);
    let err = import(&store, SourceType::Database, unfiltered).await.unwrap_err();
    assert!(matches!(err, Error::LargeTable { count: 3, .. }));
    assert_eq!(err.kind(), ErrorKind::ValidationRejected);

    let filtered = ImportRequest::database(locator.clone(), "SELECT * FROM orders WHERE num > 1")
        .with_limits(limits);
    assert_eq!(import(&store, SourceType::Database, filtered).await?.row_count, 2);

    let write = ImportRequest::database(locator.clone(), "DELETE FROM orders");
    let err = import(&store, SourceType::Database, write).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRejected);

    let bad_key = ImportRequest::database(locator.clone(), "SELECT note FROM orders")
        .with_options(FormatOptions::new().row_key_columns(vec!["num".to_string()]));
    let err = import(&store, SourceType::Database, bad_key).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRejected);

    let missing = DatabaseLocator::local(dir.path().join("nope.db").display().to_string());
    let err = import(&store, SourceType::Database, ImportRequest::database(missing, "SELECT 1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let tables = list_tables(&locator, 2).await?;
    let summary: Vec<(&str, u64, bool)> = tables
        .iter()
        .map(|t| (t.name.as_str(), t.row_count, t.requires_filter))
        .collect();
    assert_eq!(summary, vec![("events", 1, false), ("orders", 3, true)]);
    Ok(())
}

const ISA: &str = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *240101*1200*U*00401*000000001*0*P*>~";

#[tokio::test]
async fn test_edi_orders_become_rows() -> anyhow::Result<()> {
    let doc = format!(
        "{ISA}\nGS*PO*SENDER*RECEIVER*20240101*1200*1*X*004010~\n\
         ST*850*0001~\nBEG*00*SA*PO-1001**20240101~\nN1*ST*Alice Smith~\nN4*Dallas*TX*75201~\n\
         PO1*1*2*EA*10.00**VP*SKU-A~\nSE*6*0001~\n\
         ST*850*0002~\nBEG*00*SA*PO-1002**20240102~\nPO1*1*1*EA*1.00**VP*SKU-B~\nSE*4*0002~\n\
         GE*2*1~\nIEA*1*000000001~\n"
    );
    let store = TabularStore::open_in_memory().await?;
    let result = import(&store, SourceType::Edi, ImportRequest::inline("po.edi", doc)).await?;
    assert_eq!(result.row_count, 2);
    assert_eq!(result.columns.len(), 18);

    let first = store.get_row(1).await?.expect("row 1");
    assert_eq!(first.get("po_number"), Some(&Value::from("PO-1001")));
    assert_eq!(first.get("country"), Some(&Value::from("US")));
    assert_eq!(first.get("edi_format"), Some(&Value::from("X12")));

    let err = import(&store, SourceType::Edi, ImportRequest::inline("x.edi", "HELLO"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FormatInvalid);
    Ok(())
}
