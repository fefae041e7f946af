//! Command-line arguments.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use ingest_adapters::{ColumnSpan, FormatOptions};
use ingest_ir::{SourceType, Value};
use ingest_store::DatabaseLocator;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Import order data, query it and write outcomes back")]
#[command(version)]
pub struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Where rows come from. Every row-level command imports first.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// File to import
    #[arg(long, conflicts_with = "db")]
    pub file: Option<PathBuf>,

    /// Database path or libsql URL
    #[arg(long, requires = "sql")]
    pub db: Option<String>,

    /// Auth token for a remote database
    #[arg(long)]
    pub auth_token: Option<String>,

    /// Read-only query for a database import
    #[arg(long)]
    pub sql: Option<String>,

    /// Force the adapter instead of routing by extension
    #[arg(long)]
    pub format: Option<SourceType>,

    #[arg(long)]
    pub delimiter: Option<char>,

    /// The file has no header row
    #[arg(long)]
    pub no_header: bool,

    #[arg(long)]
    pub sheet: Option<String>,

    /// Slash-separated path to the JSON/XML record collection
    #[arg(long)]
    pub record_path: Option<String>,

    /// Fixed-width spans as start:end, repeatable
    #[arg(long = "col", value_name = "START:END")]
    pub col_specs: Vec<ColumnSpan>,

    /// Names for headerless fixed-width columns, comma separated
    #[arg(long, value_delimiter = ',')]
    pub names: Option<Vec<String>>,

    /// Row key columns for a database import, comma separated
    #[arg(long, value_delimiter = ',')]
    pub key: Option<Vec<String>>,

    /// Type override COLUMN=TYPE applied after the import, repeatable
    #[arg(long = "override", value_name = "COLUMN=TYPE", value_parser = parse_pair)]
    pub overrides: Vec<(String, String)>,
}

impl SourceArgs {
    pub fn locator(&self) -> Option<DatabaseLocator> {
        self.db.as_ref().map(|url| match &self.auth_token {
            Some(token) => DatabaseLocator::remote(url.clone(), token.clone()),
            None => DatabaseLocator::local(url.clone()),
        })
    }

    pub fn options(&self) -> FormatOptions {
        let mut options = FormatOptions::new().has_header(!self.no_header);
        options.format = self.format;
        options.delimiter = self.delimiter;
        options.sheet = self.sheet.clone();
        options.record_path = self.record_path.clone();
        options.col_specs = self.col_specs.clone();
        options.column_names = self.names.clone();
        options.row_key_columns = self.key.clone();
        options
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import a source and print the import result
    Import(SourceArgs),

    /// Import, then print schema and metadata
    Describe(SourceArgs),

    /// Import, then print one row by its row number
    Row {
        #[command(flatten)]
        source: SourceArgs,
        row: u64,
    },

    /// Import, then print rows matching a predicate
    Filter {
        #[command(flatten)]
        source: SourceArgs,
        /// Predicate with ? placeholders, e.g. "city = ?"
        #[arg(long = "where", default_value = "")]
        predicate: String,
        /// Placeholder values in order
        #[arg(long = "param")]
        params: Vec<String>,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },

    /// Import, then run a read-only query against imported_data
    Query {
        #[command(flatten)]
        source: SourceArgs,
        statement: String,
    },

    /// Import, then print distinct values of a column
    Samples {
        #[command(flatten)]
        source: SourceArgs,
        column: String,
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Import, then print checksums for a row range
    Checksums {
        #[command(flatten)]
        source: SourceArgs,
        start: u64,
        end: u64,
    },

    /// Import, then compare a row against an expected checksum
    Verify {
        #[command(flatten)]
        source: SourceArgs,
        row: u64,
        expected: String,
    },

    /// Import, then write an outcome back to a row's source
    WriteBack {
        #[command(flatten)]
        source: SourceArgs,
        row: u64,
        #[arg(long)]
        tracking: Option<String>,
        /// Extra outcome field COLUMN=VALUE, repeatable
        #[arg(long = "field", value_parser = parse_pair)]
        fields: Vec<(String, String)>,
        /// Explicit ship time (RFC 3339); defaults to now
        #[arg(long)]
        shipped_at: Option<DateTime<Utc>>,
    },

    /// Import a JSON array of flat records handed over by another system
    Records {
        /// JSON file holding the array of records
        path: PathBuf,
        /// Label naming where the records came from
        #[arg(long)]
        label: String,
    },

    /// Load commodity lines from a JSON array and list them per order
    Commodities {
        /// JSON file holding the array of commodity lines
        path: PathBuf,
        /// Order ids to list; repeatable
        #[arg(long = "order")]
        orders: Vec<i64>,
    },

    /// List the sheets of a workbook
    Sheets { path: PathBuf },

    /// Show raw lines of a file
    Sniff {
        path: PathBuf,
        #[arg(long)]
        lines: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Guess fixed-width column spans from a file's header line
    GuessColumns { path: PathBuf },

    /// List tables of a database with their sizes
    Tables {
        db: String,
        #[arg(long)]
        auth_token: Option<String>,
    },
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Filter parameters typed the way a literal would be.
pub fn param_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::Float(f);
    }
    Value::Text(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_commodities_orders() {
        let cli = Cli::parse_from(["ingest", "commodities", "lines.json", "--order", "4", "--order", "9"]);
        match cli.command {
            Command::Commodities { path, orders } => {
                assert_eq!(path, PathBuf::from("lines.json"));
                assert_eq!(orders, vec![4, 9]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_write_back() {
        let cli = Cli::parse_from([
            "ingest",
            "write-back",
            "--file",
            "orders.csv",
            "--tracking",
            "1Z9",
            "--field",
            "carrier=UPS",
            "3",
        ]);
        match cli.command {
            Command::WriteBack {
                source,
                row,
                tracking,
                fields,
                ..
            } => {
                assert_eq!(source.file, Some(PathBuf::from("orders.csv")));
                assert_eq!(row, 3);
                assert_eq!(tracking.as_deref(), Some("1Z9"));
                assert_eq!(fields, vec![("carrier".to_string(), "UPS".to_string())]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_fixed_width_options() {
        let cli = Cli::parse_from([
            "ingest", "import", "--file", "a.dat", "--col", "0:5", "--col", "5-9", "--no-header", "--names", "id,name",
        ]);
        let Command::Import(source) = cli.command else {
            panic!("expected import");
        };
        let options = source.options();
        assert_eq!(options.col_specs, vec![ColumnSpan::new(0, 5), ColumnSpan::new(5, 9)]);
        assert!(!options.has_header);
        assert_eq!(options.column_names, Some(vec!["id".to_string(), "name".to_string()]));
    }

    #[test]
    fn test_param_value_typing() {
        assert_eq!(param_value("42"), Value::Integer(42));
        assert_eq!(param_value("2.5"), Value::Float(2.5));
        assert_eq!(param_value("Dallas"), Value::from("Dallas"));
    }
}
