//! [`SqliteStore`]: the SQLite implementation of [`GradeStore`].

use std::path::Path;

use rusqlite::{OptionalExtension as _, Transaction};
use tracing::debug;
use uuid::Uuid;

use tally_core::{
  aggregate::{PreFinalDivisor, aggregate},
  component::SectionKind,
  grade::{ComponentPatch, ComponentValues, GradeRecord, OverallGrades, Snapshot, StudentGradeRow},
  section::CourseSection,
  store::{GradeStore, GradeUpdate, RecordQuery, SnapshotQuery, UpsertOutcome},
  student::{Student, StudentInfo},
  term::Term,
};

use crate::{
  Error, Result,
  encode::{
    GRADE_ROW_SELECT, RawGradeRow, RawSection, RawSnapshot, SECTION_COLUMNS, SNAPSHOT_COLUMNS,
    STUDENT_COLUMNS, encode_dt, encode_kind, encode_uuid, now, student_from_row,
  },
  schema::SCHEMA,
};

/// Result type inside a connection closure.
type CallResult<T> = std::result::Result<T, tokio_rusqlite::Error>;

/// Carry a domain error out of a connection closure. Returning it rolls back
/// any open transaction.
fn core_err(e: tally_core::Error) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tally grade store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  divisor: PreFinalDivisor,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, divisor: PreFinalDivisor::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, divisor: PreFinalDivisor::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Use `divisor` for the pre-final mean on subsequent writes.
  pub fn with_divisor(mut self, divisor: PreFinalDivisor) -> Self {
    self.divisor = divisor;
    self
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Transaction steps ───────────────────────────────────────────────────────

/// Insert the student, or fill fields the stored row is missing. Returns
/// the persisted student.
fn merge_student(tx: &Transaction<'_>, info: &StudentInfo) -> CallResult<Student> {
  let existing: Option<Student> = tx
    .query_row(
      &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE org_id = ?1"),
      rusqlite::params![info.org_id],
      student_from_row,
    )
    .optional()?;

  let (mut student, created) = match existing {
    Some(s) => (s, false),
    None => (Student::from(StudentInfo::new(info.org_id.clone())), true),
  };
  let had_username = student.username.is_some();
  let changed = student.fill_missing(info);

  if let (false, Some(username)) = (had_username, &student.username) {
    let owner: Option<String> = tx
      .query_row(
        "SELECT org_id FROM students WHERE username = ?1 AND org_id != ?2",
        rusqlite::params![username, student.org_id],
        |r| r.get(0),
      )
      .optional()?;
    if let Some(owner) = owner {
      return Err(core_err(tally_core::Error::UsernameTaken {
        username: username.clone(),
        owner,
      }));
    }
  }

  if created {
    tx.execute(
      "INSERT INTO students (org_id, username, first_name, last_name, email)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      rusqlite::params![
        student.org_id,
        student.username,
        student.first_name,
        student.last_name,
        student.email,
      ],
    )?;
    debug!(student = %student.org_id, "created student");
  } else if changed {
    tx.execute(
      "UPDATE students
       SET username = ?2, first_name = ?3, last_name = ?4, email = ?5
       WHERE org_id = ?1",
      rusqlite::params![
        student.org_id,
        student.username,
        student.first_name,
        student.last_name,
        student.email,
      ],
    )?;
    debug!(student = %student.org_id, "filled missing student fields");
  }

  Ok(student)
}

/// Insert the section, or check the stored one agrees on kind and term.
/// Course name and section code are corrected in place.
fn merge_section(tx: &Transaction<'_>, section: &CourseSection) -> CallResult<()> {
  let existing: Option<RawSection> = tx
    .query_row(
      &format!("SELECT {SECTION_COLUMNS} FROM sections WHERE unit_id = ?1"),
      rusqlite::params![section.unit_id],
      RawSection::from_row,
    )
    .optional()?;

  let kind = encode_kind(section.kind);
  let Some(stored) = existing else {
    tx.execute(
      "INSERT INTO sections (unit_id, course_name, section_code, term, kind)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      rusqlite::params![
        section.unit_id,
        section.course_name,
        section.section_code,
        section.term.as_str(),
        kind,
      ],
    )?;
    debug!(unit = %section.unit_id, label = %section.label(), "created section");
    return Ok(());
  };

  let conflict = |reason: String| {
    core_err(tally_core::Error::SectionConflict {
      unit_id: section.unit_id.clone(),
      reason,
    })
  };
  if stored.kind != kind {
    return Err(conflict(format!("stored as {}, written as {kind}", stored.kind)));
  }
  if stored.term != section.term.as_str() {
    return Err(conflict(format!("stored for term {}, written for {}", stored.term, section.term)));
  }

  if stored.course_name != section.course_name || stored.section_code != section.section_code {
    tx.execute(
      "UPDATE sections SET course_name = ?2, section_code = ?3 WHERE unit_id = ?1",
      rusqlite::params![section.unit_id, section.course_name, section.section_code],
    )?;
    debug!(unit = %section.unit_id, label = %section.label(), "corrected section label");
  }
  Ok(())
}

/// The parts of an existing record an upsert merges into.
struct ExistingRecord {
  record_id:    String,
  lab_unit:     Option<String>,
  lecture_unit: Option<String>,
  components:   ComponentValues,
}

fn load_record(tx: &Transaction<'_>, student_id: &str, term: &str) -> CallResult<Option<ExistingRecord>> {
  Ok(
    tx.query_row(
      "SELECT record_id, lab_unit, lecture_unit, lab, quizzes, exit_tickets, capstone
       FROM grade_records WHERE student_id = ?1 AND term = ?2",
      rusqlite::params![student_id, term],
      |row| {
        Ok(ExistingRecord {
          record_id:    row.get(0)?,
          lab_unit:     row.get(1)?,
          lecture_unit: row.get(2)?,
          components:   ComponentValues {
            lab:          row.get(3)?,
            quizzes:      row.get(4)?,
            exit_tickets: row.get(5)?,
            capstone:     row.get(6)?,
          },
        })
      },
    )
    .optional()?,
  )
}

/// What a committed upsert wrote.
struct Written {
  record_id:    Uuid,
  created:      bool,
  lab_unit:     Option<String>,
  lecture_unit: Option<String>,
  components:   ComponentValues,
  overall:      OverallGrades,
}

fn write_record(
  tx: &Transaction<'_>,
  student_id: &str,
  section: &CourseSection,
  values: &ComponentPatch,
  divisor: PreFinalDivisor,
  snapshot_id: Uuid,
  at: &str,
) -> CallResult<Written> {
  let term = section.term.as_str();
  let existing = load_record(tx, student_id, term)?;
  let created = existing.is_none();

  let (record_id, base, mut lab_unit, mut lecture_unit) = match existing {
    Some(e) => {
      let id = Uuid::parse_str(&e.record_id).map_err(|err| tokio_rusqlite::Error::Other(Box::new(err)))?;
      (id, e.components, e.lab_unit, e.lecture_unit)
    }
    None => (Uuid::new_v4(), ComponentValues::default(), None, None),
  };
  match section.kind {
    SectionKind::Lab => lab_unit = Some(section.unit_id.clone()),
    SectionKind::Lecture => lecture_unit = Some(section.unit_id.clone()),
  }

  let components = values.apply(base);
  let overall = aggregate(&components, divisor).map_err(core_err)?;

  tx.execute(
    "INSERT INTO grade_records (
       record_id, student_id, term, lab_unit, lecture_unit,
       lab, quizzes, exit_tickets, capstone,
       pre_final, post_final, has_final_project, last_updated
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
     ON CONFLICT (student_id, term) DO UPDATE SET
       lab_unit          = excluded.lab_unit,
       lecture_unit      = excluded.lecture_unit,
       lab               = excluded.lab,
       quizzes           = excluded.quizzes,
       exit_tickets      = excluded.exit_tickets,
       capstone          = excluded.capstone,
       pre_final         = excluded.pre_final,
       post_final        = excluded.post_final,
       has_final_project = excluded.has_final_project,
       last_updated      = excluded.last_updated",
    rusqlite::params![
      encode_uuid(record_id),
      student_id,
      term,
      lab_unit,
      lecture_unit,
      components.lab,
      components.quizzes,
      components.exit_tickets,
      components.capstone,
      overall.pre_final,
      overall.post_final,
      overall.has_final_project,
      at,
    ],
  )?;

  tx.execute(
    &format!(
      "INSERT INTO grade_snapshots ({SNAPSHOT_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
    ),
    rusqlite::params![
      encode_uuid(snapshot_id),
      student_id,
      term,
      section.unit_id,
      components.lab,
      components.quizzes,
      components.exit_tickets,
      components.capstone,
      overall.pre_final,
      overall.post_final,
      overall.has_final_project,
      at,
    ],
  )?;

  Ok(Written { record_id, created, lab_unit, lecture_unit, components, overall })
}

// ─── GradeStore impl ─────────────────────────────────────────────────────────

impl GradeStore for SqliteStore {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn upsert(&self, update: GradeUpdate) -> Result<UpsertOutcome> {
    let info = update.student.normalized()?;
    let section = update.section;
    section.validate()?;
    if section.term != update.term {
      return Err(Error::Core(tally_core::Error::TermMismatch {
        unit_id:      section.unit_id.clone(),
        section_term: section.term.to_string(),
        term:         update.term.to_string(),
      }));
    }

    let values = update.values;
    let foreign = values.supplied().into_iter().find(|c| c.section_kind() != section.kind);
    if let Some(component) = foreign {
      return Err(Error::Core(tally_core::Error::ComponentMismatch {
        component,
        kind: section.kind,
      }));
    }
    let divisor = self.divisor;
    let snapshot_id = Uuid::new_v4();
    let recorded_at = now();
    let at = encode_dt(recorded_at);
    let student_id = info.org_id.clone();
    let unit_id = section.unit_id.clone();

    let written: Written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        merge_student(&tx, &info)?;
        merge_section(&tx, &section)?;
        let written = write_record(&tx, &info.org_id, &section, &values, divisor, snapshot_id, &at)?;
        tx.commit()?;
        Ok(written)
      })
      .await?;

    debug!(
      student = %student_id,
      unit = %unit_id,
      created = written.created,
      supplied = ?values.supplied(),
      "upserted grade record"
    );

    let record = GradeRecord {
      record_id:    written.record_id,
      student_id:   student_id.clone(),
      term:         update.term.clone(),
      lab_unit:     written.lab_unit,
      lecture_unit: written.lecture_unit,
      components:   written.components,
      overall:      written.overall,
      last_updated: recorded_at,
    };
    let snapshot = Snapshot {
      snapshot_id,
      student_id,
      term: update.term,
      course_unit: unit_id,
      components: written.components,
      overall: written.overall,
      recorded_at,
    };
    Ok(UpsertOutcome { record, snapshot, created: written.created })
  }

  // ── Reference data ────────────────────────────────────────────────────────

  async fn get_student(&self, org_id: &str) -> Result<Option<Student>> {
    let id = org_id.to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE org_id = ?1"),
                rusqlite::params![id],
                student_from_row,
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  async fn find_student_by_username(&self, username: &str) -> Result<Option<Student>> {
    let username = username.to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE username = ?1"),
                rusqlite::params![username],
                student_from_row,
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  async fn search_students(&self, text: &str) -> Result<Vec<Student>> {
    let pattern = format!("%{}%", text.trim().to_lowercase());
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students
             WHERE lower(first_name) LIKE ?1
                OR lower(last_name)  LIKE ?1
                OR lower(username)   LIKE ?1
             ORDER BY last_name, first_name, org_id"
          ))?;
          let rows = stmt
            .query_map(rusqlite::params![pattern], student_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  async fn get_section(&self, unit_id: &str) -> Result<Option<CourseSection>> {
    let id = unit_id.to_owned();
    let raw: Option<RawSection> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {SECTION_COLUMNS} FROM sections WHERE unit_id = ?1"),
              rusqlite::params![id],
              RawSection::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSection::into_section).transpose()
  }

  async fn list_sections(
    &self,
    term: Option<&Term>,
    kind: Option<SectionKind>,
  ) -> Result<Vec<CourseSection>> {
    let term_str = term.map(|t| t.as_str().to_owned());
    let kind_str = kind.map(encode_kind);

    let raws: Vec<RawSection> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SECTION_COLUMNS} FROM sections
           WHERE (?1 IS NULL OR term = ?1)
             AND (?2 IS NULL OR kind = ?2)
           ORDER BY course_name, section_code"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![term_str, kind_str], RawSection::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSection::into_section).collect()
  }

  // ── Records ───────────────────────────────────────────────────────────────

  async fn get_record(&self, student_id: &str, term: &Term) -> Result<Option<StudentGradeRow>> {
    let id = student_id.to_owned();
    let term_str = term.as_str().to_owned();

    let raw: Option<RawGradeRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("{GRADE_ROW_SELECT} WHERE r.student_id = ?1 AND r.term = ?2"),
              rusqlite::params![id, term_str],
              RawGradeRow::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawGradeRow::into_row).transpose()
  }

  async fn list_records(&self, query: &RecordQuery) -> Result<Vec<StudentGradeRow>> {
    let term_str = query.term.as_ref().map(|t| t.as_str().to_owned());
    let unit_id = query.unit_id.clone();
    let (lo, hi) = match query.cohort.map(|c| c.section_range()) {
      Some((lo, hi)) => (Some(i64::from(lo)), Some(i64::from(hi))),
      None => (None, None),
    };
    // SQLite treats a negative LIMIT as unbounded.
    let limit_val = query.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
    let offset_val = query.offset.map_or(0, |o| i64::try_from(o).unwrap_or(i64::MAX));

    let raws: Vec<RawGradeRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "{GRADE_ROW_SELECT}
           WHERE (?1 IS NULL OR r.term = ?1)
             AND (?2 IS NULL OR r.lab_unit = ?2 OR r.lecture_unit = ?2)
             AND (?3 IS NULL OR (CAST(lec.section_code AS INTEGER) >= ?3
                             AND CAST(lec.section_code AS INTEGER) <  ?4))
           ORDER BY s.last_name, s.first_name, s.org_id, r.term
           LIMIT ?5 OFFSET ?6"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![term_str, unit_id, lo, hi, limit_val, offset_val],
            RawGradeRow::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawGradeRow::into_row).collect()
  }

  async fn snapshots(&self, query: &SnapshotQuery) -> Result<Vec<Snapshot>> {
    let student_id = query.student_id.clone();
    let course_unit = query.course_unit.clone();
    let term_str = query.term.as_ref().map(|t| t.as_str().to_owned());
    let as_of_str = encode_dt(query.as_of.unwrap_or_else(now));
    let since_str = query.since.map(encode_dt);

    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SNAPSHOT_COLUMNS} FROM grade_snapshots
           WHERE student_id = ?1
             AND (?2 IS NULL OR course_unit = ?2)
             AND (?3 IS NULL OR term = ?3)
             AND recorded_at <= ?4
             AND (?5 IS NULL OR recorded_at >= ?5)
           ORDER BY student_id, course_unit, recorded_at, rowid"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![student_id, course_unit, term_str, as_of_str, since_str],
            RawSnapshot::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }
}
