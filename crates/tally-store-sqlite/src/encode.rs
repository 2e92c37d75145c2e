//! Encoding and decoding helpers between Tally domain types and the plain
//! column values stored in SQLite.
//!
//! Timestamps are stored as RFC 3339 UTC strings with fixed microsecond
//! precision so that lexical order is chronological. UUIDs are stored as
//! hyphenated lowercase strings. Percentages are plain `REAL` columns.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use tally_core::{
  component::SectionKind,
  grade::{ComponentValues, GradeRecord, OverallGrades, Snapshot, StudentGradeRow},
  section::CourseSection,
  student::Student,
  term::Term,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// The current time at the precision the store keeps, so values handed back
/// to callers compare equal to what a later read decodes.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── SectionKind ─────────────────────────────────────────────────────────────

pub fn encode_kind(kind: SectionKind) -> &'static str {
  match kind {
    SectionKind::Lab => "LAB",
    SectionKind::Lecture => "LECTURE",
  }
}

pub fn decode_kind(s: &str) -> Result<SectionKind> {
  match s {
    "LAB" => Ok(SectionKind::Lab),
    "LECTURE" => Ok(SectionKind::Lecture),
    other => Err(Error::Decode(format!("unknown section kind: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const STUDENT_COLUMNS: &str = "org_id, username, first_name, last_name, email";

pub fn student_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
  Ok(Student {
    org_id:     row.get(0)?,
    username:   row.get(1)?,
    first_name: row.get(2)?,
    last_name:  row.get(3)?,
    email:      row.get(4)?,
  })
}

/// Raw strings read directly from a `sections` row.
pub struct RawSection {
  pub unit_id:      String,
  pub course_name:  String,
  pub section_code: String,
  pub term:         String,
  pub kind:         String,
}

pub const SECTION_COLUMNS: &str = "unit_id, course_name, section_code, term, kind";

impl RawSection {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      unit_id:      row.get(0)?,
      course_name:  row.get(1)?,
      section_code: row.get(2)?,
      term:         row.get(3)?,
      kind:         row.get(4)?,
    })
  }

  /// A section joined onto a record; every column is NULL when the record
  /// has no such section yet.
  fn joined(row: &rusqlite::Row<'_>, unit: usize, first: usize) -> rusqlite::Result<Option<Self>> {
    let unit_id: Option<String> = row.get(unit)?;
    let course_name: Option<String> = row.get(first)?;
    let section_code: Option<String> = row.get(first + 1)?;
    let term: Option<String> = row.get(first + 2)?;
    let kind: Option<String> = row.get(first + 3)?;
    Ok(match (unit_id, course_name, section_code, term, kind) {
      (Some(unit_id), Some(course_name), Some(section_code), Some(term), Some(kind)) => {
        Some(Self { unit_id, course_name, section_code, term, kind })
      }
      _ => None,
    })
  }

  pub fn into_section(self) -> Result<CourseSection> {
    Ok(CourseSection {
      unit_id:      self.unit_id,
      course_name:  self.course_name,
      section_code: self.section_code,
      term:         Term::parse(&self.term)?,
      kind:         decode_kind(&self.kind)?,
    })
  }
}

/// `SELECT` for the joined read model. Callers append `WHERE`/`ORDER BY`.
pub const GRADE_ROW_SELECT: &str = "
SELECT
  s.org_id, s.username, s.first_name, s.last_name, s.email,
  r.record_id, r.term, r.lab_unit, r.lecture_unit,
  r.lab, r.quizzes, r.exit_tickets, r.capstone,
  r.pre_final, r.post_final, r.has_final_project, r.last_updated,
  lab.course_name, lab.section_code, lab.term, lab.kind,
  lec.course_name, lec.section_code, lec.term, lec.kind
FROM grade_records r
JOIN students s       ON s.org_id    = r.student_id
LEFT JOIN sections lab ON lab.unit_id = r.lab_unit
LEFT JOIN sections lec ON lec.unit_id = r.lecture_unit";

/// Raw values read from [`GRADE_ROW_SELECT`].
pub struct RawGradeRow {
  pub student:      Student,
  pub record_id:    String,
  pub term:         String,
  pub lab_unit:     Option<String>,
  pub lecture_unit: Option<String>,
  pub components:   ComponentValues,
  pub overall:      OverallGrades,
  pub last_updated: String,
  pub lab:          Option<RawSection>,
  pub lecture:      Option<RawSection>,
}

impl RawGradeRow {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      student:      student_from_row(row)?,
      record_id:    row.get(5)?,
      term:         row.get(6)?,
      lab_unit:     row.get(7)?,
      lecture_unit: row.get(8)?,
      components:   ComponentValues {
        lab:          row.get(9)?,
        quizzes:      row.get(10)?,
        exit_tickets: row.get(11)?,
        capstone:     row.get(12)?,
      },
      overall:      OverallGrades {
        pre_final:         row.get(13)?,
        post_final:        row.get(14)?,
        has_final_project: row.get(15)?,
      },
      last_updated: row.get(16)?,
      lab:          RawSection::joined(row, 7, 17)?,
      lecture:      RawSection::joined(row, 8, 21)?,
    })
  }

  pub fn into_row(self) -> Result<StudentGradeRow> {
    let record = GradeRecord {
      record_id:    decode_uuid(&self.record_id)?,
      student_id:   self.student.org_id.clone(),
      term:         Term::parse(&self.term)?,
      lab_unit:     self.lab_unit,
      lecture_unit: self.lecture_unit,
      components:   self.components,
      overall:      self.overall,
      last_updated: decode_dt(&self.last_updated)?,
    };
    Ok(StudentGradeRow {
      student: self.student,
      record,
      lab: self.lab.map(RawSection::into_section).transpose()?,
      lecture: self.lecture.map(RawSection::into_section).transpose()?,
    })
  }
}

/// Raw values read directly from a `grade_snapshots` row.
pub struct RawSnapshot {
  pub snapshot_id: String,
  pub student_id:  String,
  pub term:        String,
  pub course_unit: String,
  pub components:  ComponentValues,
  pub overall:     OverallGrades,
  pub recorded_at: String,
}

pub const SNAPSHOT_COLUMNS: &str = "snapshot_id, student_id, term, course_unit, \
   lab, quizzes, exit_tickets, capstone, \
   pre_final, post_final, has_final_project, recorded_at";

impl RawSnapshot {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      snapshot_id: row.get(0)?,
      student_id:  row.get(1)?,
      term:        row.get(2)?,
      course_unit: row.get(3)?,
      components:  ComponentValues {
        lab:          row.get(4)?,
        quizzes:      row.get(5)?,
        exit_tickets: row.get(6)?,
        capstone:     row.get(7)?,
      },
      overall:     OverallGrades {
        pre_final:         row.get(8)?,
        post_final:        row.get(9)?,
        has_final_project: row.get(10)?,
      },
      recorded_at: row.get(11)?,
    })
  }

  pub fn into_snapshot(self) -> Result<Snapshot> {
    Ok(Snapshot {
      snapshot_id: decode_uuid(&self.snapshot_id)?,
      student_id:  self.student_id,
      term:        Term::parse(&self.term)?,
      course_unit: self.course_unit,
      components:  self.components,
      overall:     self.overall,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
