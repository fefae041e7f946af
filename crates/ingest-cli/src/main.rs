//! # ingest-cli
//!
//! Thin command-line harness over [`IngestSession`]. Every command prints
//! JSON on stdout; failures print `{"error": <kind>, "message": ..}` on
//! stderr and exit non-zero. Logging goes to stderr and follows `RUST_LOG`.

mod cli;

use std::path::Path;

use anyhow::{Context, bail};
use clap::Parser;
use ingest_ir::ImportResult;
use ingest_session::{IngestConfig, IngestSession};
use ingest_store::Commodity;
use ingest_writeback::WriteBackRequest;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, SourceArgs, param_value};

fn read_json_array<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {} as a JSON array", path.display()))
}

fn to_json<T: Serialize>(value: &T) -> anyhow::Result<JsonValue> {
    serde_json::to_value(value).context("serialize output")
}

async fn import(session: &mut IngestSession, source: &SourceArgs) -> anyhow::Result<ImportResult> {
    let result = match (&source.file, source.locator()) {
        (Some(path), _) => session.import_file(path.clone(), source.options()).await?,
        (None, Some(locator)) => {
            let sql = source.sql.clone().unwrap_or_default();
            session.import_database(locator, sql, source.key.clone()).await?
        }
        (None, None) => bail!("pass --file or --db with --sql"),
    };
    for (column, type_name) in &source.overrides {
        session.override_column_type(column, type_name).await?;
    }
    Ok(result)
}

async fn run(cli: Cli) -> anyhow::Result<JsonValue> {
    let config = match &cli.config {
        Some(path) => IngestConfig::from_yaml_file(path)?,
        None => IngestConfig::default(),
    };
    let mut session = IngestSession::open(config).await?;

    match cli.command {
        Command::Import(source) => to_json(&import(&mut session, &source).await?),
        Command::Describe(source) => {
            import(&mut session, &source).await?;
            to_json(&session.describe().await?)
        }
        Command::Row { source, row } => {
            import(&mut session, &source).await?;
            to_json(&session.get_row(row).await?)
        }
        Command::Filter {
            source,
            predicate,
            params,
            limit,
            offset,
        } => {
            import(&mut session, &source).await?;
            let params: Vec<_> = params.iter().map(|raw| param_value(raw)).collect();
            to_json(&session.get_rows_by_filter(&predicate, &params, limit, offset).await?)
        }
        Command::Query { source, statement } => {
            import(&mut session, &source).await?;
            to_json(&session.query(&statement).await?)
        }
        Command::Samples {
            source,
            column,
            limit,
        } => {
            import(&mut session, &source).await?;
            to_json(&session.column_samples(&column, limit).await?)
        }
        Command::Checksums { source, start, end } => {
            import(&mut session, &source).await?;
            to_json(&session.compute_checksums(start, end).await?)
        }
        Command::Verify {
            source,
            row,
            expected,
        } => {
            import(&mut session, &source).await?;
            to_json(&session.verify_checksum(row, &expected).await?)
        }
        Command::WriteBack {
            source,
            row,
            tracking,
            fields,
            shipped_at,
        } => {
            import(&mut session, &source).await?;
            let mut request = match tracking {
                Some(number) => WriteBackRequest::tracking(row, number),
                None => WriteBackRequest::new(row),
            };
            for (column, value) in fields {
                request = request.with_field(column, value);
            }
            if let Some(when) = shipped_at {
                request = request.with_shipped_at(when);
            }
            let locator = source.locator();
            to_json(&session.write_back(&request, locator.as_ref()).await?)
        }
        Command::Records { path, label } => {
            let records: Vec<JsonValue> = read_json_array(&path)?;
            to_json(&session.import_records(records, label).await?)
        }
        Command::Commodities { path, orders } => {
            let commodities: Vec<Commodity> = read_json_array(&path)?;
            let imported = session.import_commodities(&commodities).await?;
            let found = session.get_commodities_bulk(&orders).await?;
            Ok(json!({ "import": to_json(&imported)?, "commodities": to_json(&found)? }))
        }
        Command::Sheets { path } => to_json(&session.list_sheets(&path)?),
        Command::Sniff {
            path,
            lines,
            offset,
        } => to_json(&session.sniff_file(&path, lines, offset).await?),
        Command::GuessColumns { path } => to_json(&session.guess_fixed_width_columns(&path).await?),
        Command::Tables { db, auth_token } => {
            let source = SourceArgs {
                db: Some(db),
                auth_token,
                ..SourceArgs::default()
            };
            let locator = source.locator().context("database locator")?;
            to_json(&session.list_tables(&locator).await?)
        }
    }
}

fn error_json(err: &anyhow::Error) -> JsonValue {
    let kind = err
        .downcast_ref::<ingest_session::Error>()
        .map(|err| err.kind().as_str())
        .unwrap_or("usage");
    json!({ "error": kind, "message": format!("{err:#}") })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", serde_json::to_string_pretty(&error_json(&err))?);
            std::process::exit(1);
        }
    }
}
