//! The `GradeStore` trait and supporting query types.
//!
//! Implemented by storage backends (e.g. `tally-store-sqlite`). The ingest
//! pipeline and the CLI depend on this abstraction only.
//!
//! Read accessors return plain records ([`Student`], [`CourseSection`],
//! [`StudentGradeRow`], [`Snapshot`]); nothing engine-specific crosses this
//! boundary.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  component::SectionKind,
  grade::{ComponentPatch, GradeRecord, Snapshot, StudentGradeRow},
  section::{Cohort, CourseSection},
  student::{Student, StudentInfo},
  term::Term,
};

// ─── Write input ─────────────────────────────────────────────────────────────

/// Input to [`GradeStore::upsert`].
#[derive(Debug, Clone)]
pub struct GradeUpdate {
  /// Demographics for the student; only `org_id` is required.
  pub student: StudentInfo,
  pub term:    Term,
  /// The section this write came from. Must belong to `term`.
  pub section: CourseSection,
  pub values:  ComponentPatch,
}

/// Result of a successful upsert.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
  pub record:   GradeRecord,
  /// The snapshot appended by this write.
  pub snapshot: Snapshot,
  /// `true` when this write created the record.
  pub created:  bool,
}

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`GradeStore::list_records`].
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
  pub term:    Option<Term>,
  /// Records referencing this unit as either their lab or lecture section.
  pub unit_id: Option<String>,
  /// Cohort by lecture section code. Records without a lecture section never
  /// match a cohort filter.
  pub cohort:  Option<Cohort>,
  pub limit:   Option<usize>,
  pub offset:  Option<usize>,
}

/// Parameters for [`GradeStore::snapshots`].
#[derive(Debug, Clone)]
pub struct SnapshotQuery {
  pub student_id:  String,
  pub course_unit: Option<String>,
  pub term:        Option<Term>,
  /// Point-in-time filter on `recorded_at`; defaults to now.
  pub as_of:       Option<DateTime<Utc>>,
  pub since:       Option<DateTime<Utc>>,
}

impl SnapshotQuery {
  pub fn for_student(student_id: impl Into<String>) -> Self {
    Self {
      student_id:  student_id.into(),
      course_unit: None,
      term:        None,
      as_of:       None,
      since:       None,
    }
  }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Backend errors expose the domain error they wrap, if any, so callers can
/// tell merge conflicts from storage failures.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn core(&self) -> Option<&crate::Error>;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a versioned grade store backend.
///
/// Aggregate records are updated in place (one per student and term), and
/// every update appends an immutable snapshot. Each upsert is its own
/// transaction: it either commits the record, the snapshot and any new
/// student or section rows together, or commits nothing.
///
/// The store is single-writer: callers must serialise upserts.
pub trait GradeStore: Send + Sync {
  type Error: StoreError;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Merge the supplied components into the record for
  /// `(update.student.org_id, update.term)`, creating the student, section
  /// and record rows if needed, recompute overall grades, and append a
  /// snapshot.
  fn upsert(
    &self,
    update: GradeUpdate,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + '_;

  // ── Reference data ────────────────────────────────────────────────────

  fn get_student<'a>(
    &'a self,
    org_id: &'a str,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + 'a;

  fn find_student_by_username<'a>(
    &'a self,
    username: &'a str,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + 'a;

  /// Case-insensitive substring match over first name, last name and
  /// username.
  fn search_students<'a>(
    &'a self,
    text: &'a str,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + 'a;

  fn get_section<'a>(
    &'a self,
    unit_id: &'a str,
  ) -> impl Future<Output = Result<Option<CourseSection>, Self::Error>> + Send + 'a;

  /// Sections ordered by course name, then section code.
  fn list_sections<'a>(
    &'a self,
    term: Option<&'a Term>,
    kind: Option<SectionKind>,
  ) -> impl Future<Output = Result<Vec<CourseSection>, Self::Error>> + Send + 'a;

  // ── Records ───────────────────────────────────────────────────────────

  fn get_record<'a>(
    &'a self,
    student_id: &'a str,
    term: &'a Term,
  ) -> impl Future<Output = Result<Option<StudentGradeRow>, Self::Error>> + Send + 'a;

  /// Records ordered by last name, first name, then student id.
  fn list_records<'a>(
    &'a self,
    query: &'a RecordQuery,
  ) -> impl Future<Output = Result<Vec<StudentGradeRow>, Self::Error>> + Send + 'a;

  /// Snapshot history ordered by `(student_id, course_unit, recorded_at)`.
  fn snapshots<'a>(
    &'a self,
    query: &'a SnapshotQuery,
  ) -> impl Future<Output = Result<Vec<Snapshot>, Self::Error>> + Send + 'a;
}
