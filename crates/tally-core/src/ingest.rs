//! Applies section exports to a [`GradeStore`], one section at a time.
//!
//! Each section is normalized as a whole first, so a bad roster is rejected
//! before anything is written. Students are then upserted one by one. Merge
//! conflicts for a single student are collected in the report; any other
//! store failure (an invariant violation or a storage error) aborts the
//! section.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  component::Component,
  export::SectionExport,
  grade::ComponentPatch,
  normalize::{NormalizedComponent, ScoreRow, normalize},
  store::{GradeStore, GradeUpdate, StoreError},
  student::{StudentInfo, normalize_org_id},
};

// ─── Reports ─────────────────────────────────────────────────────────────────

/// A student whose write was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentFailure {
  pub student_id: String,
  pub reason:     String,
}

/// Outcome of applying one section.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
  pub unit_id:    String,
  pub components: Vec<Component>,
  /// Records written, each with one new snapshot.
  pub upserted:   usize,
  /// Records that did not exist before this section.
  pub created:    usize,
  pub failures:   Vec<StudentFailure>,
}

/// A section that was rejected without writing anything.
#[derive(Debug, Clone, Serialize)]
pub struct SectionFailure {
  pub unit_id: String,
  pub reason:  String,
}

/// Outcome of applying a batch of sections.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
  pub sections: Vec<IngestReport>,
  pub rejected: Vec<SectionFailure>,
}

impl BatchReport {
  pub fn upserted(&self) -> usize {
    self.sections.iter().map(|s| s.upserted).sum()
  }

  pub fn student_failures(&self) -> usize {
    self.sections.iter().map(|s| s.failures.len()).sum()
  }
}

#[derive(Debug, Error)]
pub enum SectionError<E> {
  /// The export could not be normalized; nothing was written.
  #[error("section {unit_id} rejected: {source}")]
  Rejected {
    unit_id: String,
    #[source]
    source:  crate::Error,
  },

  /// A write failed in a way that must stop the batch.
  #[error("section {unit_id} aborted: {source}")]
  Aborted {
    unit_id: String,
    #[source]
    source:  E,
  },
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Normalize and apply one section export.
pub async fn ingest_section<S: GradeStore>(
  store: &S,
  export: &SectionExport,
) -> Result<IngestReport, SectionError<S::Error>> {
  let section = &export.section;
  let unit_id = section.unit_id.clone();
  let rejected = |source: crate::Error| -> SectionError<S::Error> {
    SectionError::Rejected { unit_id: unit_id.clone(), source }
  };

  section.validate().map_err(rejected)?;

  let mut report = IngestReport {
    unit_id: unit_id.clone(),
    components: export.components(),
    ..IngestReport::default()
  };
  if report.components.is_empty() {
    info!(unit = %unit_id, "section export has no grade rows; skipping");
    return Ok(report);
  }

  for component in &report.components {
    if component.section_kind() != section.kind {
      return Err(rejected(crate::Error::ComponentMismatch {
        component: *component,
        kind:      section.kind,
      }));
    }
  }

  let mut invalid: BTreeSet<String> = BTreeSet::new();
  let mut students: BTreeMap<String, StudentInfo> = BTreeMap::new();
  for info in &export.students {
    match info.clone().normalized() {
      Ok(info) => {
        students.insert(info.org_id.clone(), info);
      }
      Err(_) => {
        invalid.insert(info.org_id.clone());
      }
    }
  }

  let mut normalized: Vec<NormalizedComponent> = Vec::new();
  for component in &report.components {
    let mut rows: Vec<ScoreRow> = Vec::new();
    for row in export.rows_for(*component) {
      match normalize_org_id(&row.student_id) {
        Ok(id) => {
          students
            .entry(id.clone())
            .or_insert_with(|| StudentInfo::new(id.clone()));
          rows.push(ScoreRow { student_id: id, ..row });
        }
        Err(_) => {
          invalid.insert(row.student_id);
        }
      }
    }
    let roster = students.keys().map(String::as_str);
    let scores = normalize(*component, roster, &rows).map_err(rejected)?;
    if let Some(denominator) = scores.imputed_denominator {
      debug!(unit = %unit_id, %component, denominator, "imputed zero denominators");
    }
    normalized.push(scores);
  }

  report.failures.extend(invalid.into_iter().map(|student_id| {
    warn!(unit = %unit_id, student = %student_id, "skipping malformed student id");
    StudentFailure {
      student_id,
      reason: "malformed student identifier".to_owned(),
    }
  }));

  for (student_id, info) in students {
    let values = normalized
      .iter()
      .fold(ComponentPatch::default(), |patch, scores| {
        patch.with(scores.component, scores.get(&student_id))
      });

    let update = GradeUpdate {
      student: info,
      term: section.term.clone(),
      section: section.clone(),
      values,
    };

    match store.upsert(update).await {
      Ok(outcome) => {
        report.upserted += 1;
        if outcome.created {
          report.created += 1;
        }
      }
      Err(e) if e.core().is_some_and(crate::Error::is_merge_conflict) => {
        warn!(unit = %unit_id, student = %student_id, error = %e, "merge conflict");
        report.failures.push(StudentFailure { student_id, reason: e.to_string() });
      }
      Err(source) => {
        return Err(SectionError::Aborted { unit_id, source });
      }
    }
  }

  info!(
    unit = %unit_id,
    upserted = report.upserted,
    created = report.created,
    failures = report.failures.len(),
    "section applied"
  );
  Ok(report)
}

/// Apply exports in order. Rejected sections are recorded and skipped; an
/// aborted section stops the batch.
pub async fn ingest_all<S, I>(
  store: &S,
  exports: I,
) -> Result<BatchReport, SectionError<S::Error>>
where
  S: GradeStore,
  I: IntoIterator<Item = SectionExport>,
{
  let mut batch = BatchReport::default();
  for export in exports {
    match ingest_section(store, &export).await {
      Ok(report) => batch.sections.push(report),
      Err(SectionError::Rejected { unit_id, source }) => {
        warn!(unit = %unit_id, error = %source, "section rejected");
        batch.rejected.push(SectionFailure { unit_id, reason: source.to_string() });
      }
      Err(aborted) => return Err(aborted),
    }
  }
  Ok(batch)
}
