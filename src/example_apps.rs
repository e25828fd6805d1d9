use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, ValueEnum, error::ErrorKind};
use serde_json::Value;

use crate::aggregate::{CachePolicy, CursorQuery};
use crate::cache::{FileCacheStore, ResultCache};
use crate::config::{AggregatorConfig, HasMoreMode, MergeMode};
use crate::data::{Record, ResourceKind, Scope};
use crate::source::InMemorySource;
use crate::{AggregateError, AggregateResponse, Aggregator};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResourceArg {
    Project,
    Employee,
    Financial,
    Request,
}

impl From<ResourceArg> for ResourceKind {
    fn from(value: ResourceArg) -> Self {
        match value {
            ResourceArg::Project => ResourceKind::Project,
            ResourceArg::Employee => ResourceKind::Employee,
            ResourceArg::Financial => ResourceKind::Financial,
            ResourceArg::Request => ResourceKind::Request,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "aggregate_demo",
    disable_help_subcommand = true,
    about = "Aggregate one UI page from a records file",
    long_about = "Serve a JSON array of records through an in-memory page source and print the aggregated response envelope.",
    after_help = "The backend page size and scan window emulate a backend that returns short or empty pages inside the id range."
)]
struct AggregateDemoCli {
    #[arg(long, value_name = "PATH", help = "JSON file holding an array of records")]
    records: PathBuf,
    #[arg(long, value_enum, default_value = "project", help = "Resource to aggregate")]
    resource: ResourceArg,
    #[arg(long, default_value = "1", help = "Company scope")]
    company: String,
    #[arg(long, help = "Optional branch scope")]
    branch: Option<String>,
    #[arg(long = "kind-filter", help = "Optional record type filter")]
    kind_filter: Option<String>,
    #[arg(long, help = "Start after this identifier (cursor-paged resources)")]
    cursor: Option<i64>,
    #[arg(long, default_value_t = 20, help = "Records per UI page")]
    size: usize,
    #[arg(long, default_value_t = 1, help = "1-based page number (requests only)")]
    page: usize,
    #[arg(
        long = "backend-page-size",
        default_value_t = 3,
        help = "Records the emulated backend returns per call"
    )]
    backend_page_size: usize,
    #[arg(
        long = "scan-window",
        help = "Only return ids within this distance of the cursor on each call"
    )]
    scan_window: Option<i64>,
    #[arg(long = "include-disabled", help = "Forward the disabled flag (employees)")]
    include_disabled: bool,
    #[arg(long, help = "Fetch one extra record so hasMore is exact")]
    lookahead: bool,
    #[arg(long, help = "Drain request partitions on parallel threads")]
    concurrent: bool,
    #[arg(
        long = "cache-store",
        value_name = "PATH",
        help = "Persist cached pages in this store file (or a directory to hold one)"
    )]
    cache_store: Option<PathBuf>,
    #[arg(long, help = "Bypass cache reads and overwrite the entry")]
    refresh: bool,
}

/// Run the aggregation demo over a JSON records file and print the envelope.
pub fn run_aggregate_demo<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<AggregateDemoCli, _>(
        std::iter::once("aggregate_demo".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let response = aggregate_from_cli(&cli)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn aggregate_from_cli(cli: &AggregateDemoCli) -> Result<AggregateResponse, Box<dyn Error>> {
    if cli.size == 0 {
        return Err("--size must be greater than zero".into());
    }
    let kind = ResourceKind::from(cli.resource);
    let records = load_records(&cli.records)?;
    println!(
        "Loaded {} {} record(s) from {}",
        records.len(),
        kind,
        cli.records.display()
    );

    let mut source = InMemorySource::new(cli.backend_page_size).with_records(kind, records);
    if let Some(window) = cli.scan_window {
        source = source.with_scan_window(window);
    }
    let source = Arc::new(source);

    let mut config = AggregatorConfig::default();
    if cli.lookahead {
        config.has_more = HasMoreMode::Lookahead;
    }
    if cli.concurrent {
        config.merge.mode = MergeMode::Concurrent;
    }
    if !config.cache.covers(kind) {
        config.cache.resources.push(kind);
    }

    let mut aggregator =
        Aggregator::new(source.clone(), config.clone())?.with_counts(source.clone());
    if let Some(path) = &cli.cache_store {
        let store = FileCacheStore::open(path)?;
        aggregator = aggregator.with_cache(ResultCache::new(Arc::new(store), &config.cache));
    }

    let mut scope = Scope::company(cli.company.clone());
    if let Some(branch) = &cli.branch {
        scope = scope.with_branch(branch.clone());
    }
    if let Some(filter) = &cli.kind_filter {
        scope = scope.with_kind_filter(filter.clone());
    }

    let policy = if cli.refresh {
        CachePolicy::Refresh
    } else {
        CachePolicy::UseCache
    };
    let response = match kind {
        ResourceKind::Request if cli.refresh => {
            aggregator.refresh_requests(&scope, cli.page, cli.size)
        }
        ResourceKind::Request => aggregator.fetch_requests(&scope, cli.page, cli.size),
        _ => {
            let mut query = CursorQuery::new(kind, scope, cli.size)
                .include_disabled(cli.include_disabled);
            if let Some(cursor) = cli.cursor {
                query = query.after(cursor);
            }
            aggregator.fetch_cursor_with(&query, policy)
        }
    };
    println!("Backend calls: {}", source.calls());
    Ok(response)
}

fn load_records(path: &Path) -> Result<Vec<Record>, AggregateError> {
    let raw = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&raw)? {
        Value::Array(items) => Ok(items.into_iter().filter_map(Record::from_value).collect()),
        other => Err(AggregateError::Configuration(format!(
            "{} must hold a JSON array of records, found {}",
            path.display(),
            if other.is_object() { "an object" } else { "a scalar" }
        ))),
    }
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_records(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn help_prints_and_returns_ok() {
        let parsed = parse_cli::<AggregateDemoCli, _>(["aggregate_demo", "--help"]).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn rejects_unknown_resource() {
        let result = parse_cli::<AggregateDemoCli, _>([
            "aggregate_demo",
            "--records",
            "x.json",
            "--resource",
            "invoice",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn aggregates_projects_from_a_records_file() {
        let file = write_records(
            r#"[{"project_id": 1}, {"project_id": 2}, {"project_id": 9}, {"project_id": 10}]"#,
        );
        let path = file.path().to_string_lossy().to_string();
        let cli = parse_cli::<AggregateDemoCli, _>([
            "aggregate_demo",
            "--records",
            path.as_str(),
            "--size",
            "3",
            "--backend-page-size",
            "2",
        ])
        .unwrap()
        .unwrap();
        let response = aggregate_from_cli(&cli).unwrap();
        assert!(response.success);
        let ids: Vec<i64> = response
            .data
            .iter()
            .filter_map(|r| r.id(ResourceKind::Project))
            .collect();
        assert_eq!(ids, vec![1, 2, 9]);
        assert_eq!(response.has_more, Some(true));
    }

    #[test]
    fn non_array_records_file_is_rejected() {
        let file = write_records(r#"{"project_id": 1}"#);
        assert!(load_records(file.path()).is_err());
    }
}
