//! `tally`: lab + lecture grade reconciliation.
//!
//! Reads `tally.toml` (or the path given with `--config`), opens the SQLite
//! grade store, and either ingests section exports or answers a query. Every
//! command prints one JSON document on stdout.
//!
//! ```
//! tally ingest exports/*.json --workers 4
//! tally ingest --dir exports 10219699 10219700
//! tally cohort online --term 202580 --stats
//! ```

mod config;
mod source;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, bail};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tally_core::{
  component::SectionKind,
  export::{SectionExport, SectionSource},
  ingest::{BatchReport, ingest_all},
  section::Cohort,
  stats::cohort_statistics,
  store::{GradeStore, RecordQuery, SnapshotQuery},
  term::Term,
};
use tally_dispatch::{Strategy, WorkerPool};
use tally_store_sqlite::SqliteStore;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use crate::{
  config::AppConfig,
  source::{ExportDir, ExportFiles},
};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tally", version, about = "Lab + lecture grade reconciliation")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "tally.toml", global = true)]
  config: PathBuf,

  /// Grade database; overrides `store_path`.
  #[arg(long, env = "TALLY_STORE_PATH", global = true)]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Parse section exports in parallel, then apply them one section at a time.
  Ingest {
    /// Export files, or unit ids when `--dir` is given.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Directory of `<unit_id>.json` exports.
    #[arg(long)]
    dir: Option<PathBuf>,

    #[arg(long)]
    workers: Option<usize>,

    /// `chunked` or `round_robin`.
    #[arg(long)]
    strategy: Option<Strategy>,
  },

  /// One student's record for a term.
  Student {
    /// Organization id.
    #[arg(required_unless_present = "username", conflicts_with = "username")]
    id: Option<String>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    term: Option<Term>,
  },

  /// Students whose name or username contains TEXT.
  Search { text: String },

  /// A section and its roster with grades.
  Section { unit: String },

  Sections {
    #[arg(long)]
    term: Option<Term>,

    /// `lab` or `lecture`.
    #[arg(long)]
    kind: Option<SectionKind>,
  },

  /// All records in a cohort.
  Cohort {
    /// `in-person` or `online`.
    cohort: Cohort,

    #[arg(long)]
    term: Option<Term>,

    /// Print summary statistics instead of the rows.
    #[arg(long)]
    stats: bool,
  },

  /// A student's snapshot history.
  History {
    student: String,

    #[arg(long)]
    unit: Option<String>,

    #[arg(long)]
    term: Option<Term>,

    /// Only snapshots recorded at or before this RFC 3339 instant.
    #[arg(long)]
    as_of: Option<DateTime<Utc>>,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = AppConfig::load(&cli.config)
    .with_context(|| format!("failed to read config {:?}", cli.config))?;
  let store_path = cli.store.clone().unwrap_or_else(|| cfg.store_path.clone());

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_divisor(cfg.pre_final_divisor);

  match cli.command {
    Command::Ingest { inputs, dir, workers, strategy } => {
      let pool = WorkerPool::new(workers.unwrap_or(cfg.workers))?;
      let strategy = strategy.unwrap_or(cfg.strategy);
      let summary = match dir {
        Some(dir) => ingest(&store, pool, strategy, ExportDir::new(dir), inputs).await?,
        None => ingest(&store, pool, strategy, ExportFiles, inputs).await?,
      };
      print_json(&summary)
    }

    Command::Student { id, username, term } => {
      let org_id = match (id, username) {
        (Some(id), _) => id,
        (None, Some(username)) => store
          .find_student_by_username(&username)
          .await?
          .map(|s| s.org_id)
          .with_context(|| format!("no student with username {username:?}"))?,
        (None, None) => bail!("a student id or --username is required"),
      };
      let term = term.unwrap_or_else(current_term);
      let row = store
        .get_record(&org_id, &term)
        .await?
        .with_context(|| format!("no record for student {org_id} in term {term}"))?;
      print_json(&row)
    }

    Command::Search { text } => print_json(&store.search_students(&text).await?),

    Command::Section { unit } => {
      let section = store
        .get_section(&unit)
        .await?
        .with_context(|| format!("unknown section {unit}"))?;
      let query = RecordQuery {
        term: Some(section.term.clone()),
        unit_id: Some(unit),
        ..RecordQuery::default()
      };
      let students = store.list_records(&query).await?;
      print_json(&serde_json::json!({ "section": section, "students": students }))
    }

    Command::Sections { term, kind } => {
      let term = term.unwrap_or_else(current_term);
      print_json(&store.list_sections(Some(&term), kind).await?)
    }

    Command::Cohort { cohort, term, stats } => {
      let query = RecordQuery {
        term: Some(term.unwrap_or_else(current_term)),
        cohort: Some(cohort),
        ..RecordQuery::default()
      };
      let rows = store.list_records(&query).await?;
      if stats {
        print_json(&cohort_statistics(&rows, cfg.passing_threshold))
      } else {
        print_json(&rows)
      }
    }

    Command::History { student, unit, term, as_of } => {
      let query = SnapshotQuery {
        course_unit: unit,
        term,
        as_of,
        ..SnapshotQuery::for_student(student)
      };
      print_json(&store.snapshots(&query).await?)
    }
  }
}

fn current_term() -> Term { Term::current(Local::now().date_naive()) }

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

// ─── Ingest ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct IngestSummary {
  parsed:     usize,
  unreadable: Vec<UnreadableInput>,
  #[serde(flatten)]
  batch:      BatchReport,
}

/// An input that produced no export and was not applied.
#[derive(Debug, Serialize)]
struct UnreadableInput {
  input: String,
  error: String,
}

/// Export every input on the worker pool, then apply the parsed sections to
/// the store serially, in input order. An unreadable input is reported on its
/// own and does not hold back the other inputs of its partition.
async fn ingest<S>(
  store: &SqliteStore,
  pool: WorkerPool,
  strategy: Strategy,
  source: S,
  inputs: Vec<String>,
) -> anyhow::Result<IngestSummary>
where
  S: SectionSource + 'static,
{
  let source = Arc::new(source);
  let items = pool
    .run_each(strategy, inputs.clone(), move |input: String| source.export(&input))
    .await
    .into_items();

  let mut unreadable: Vec<UnreadableInput> = items
    .failed
    .into_iter()
    .map(|(i, error)| {
      warn!(input = %inputs[i], %error, "export failed");
      UnreadableInput { input: inputs[i].clone(), error: error.to_string() }
    })
    .collect();
  for lost in items.lost {
    warn!(worker = lost.worker, error = %lost.error, "export partition failed");
    unreadable.extend(lost.indices.iter().map(|&i| UnreadableInput {
      input: inputs[i].clone(),
      error: lost.error.to_string(),
    }));
  }

  let exports: Vec<SectionExport> = items.ok.into_iter().map(|(_, export)| export).collect();
  let count = exports.len();
  info!(sections = count, "applying section exports");

  let batch = ingest_all(store, exports).await.context("ingest aborted")?;
  info!(
    upserted = batch.upserted(),
    rejected = batch.rejected.len(),
    student_failures = batch.student_failures(),
    "ingest finished"
  );

  Ok(IngestSummary { parsed: count, unreadable, batch })
}
