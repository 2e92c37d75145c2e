//! SQL schema for the Tally SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Reference data, created lazily by writes. Rows are never deleted.
CREATE TABLE IF NOT EXISTS students (
    org_id      TEXT PRIMARY KEY,
    username    TEXT UNIQUE,       -- NULLs do not collide
    first_name  TEXT,
    last_name   TEXT,
    email       TEXT
);

CREATE TABLE IF NOT EXISTS sections (
    unit_id       TEXT PRIMARY KEY,
    course_name   TEXT NOT NULL,
    section_code  TEXT NOT NULL,
    term          TEXT NOT NULL,
    kind          TEXT NOT NULL CHECK (kind IN ('LAB', 'LECTURE'))
);

-- One current row per (student, term), updated in place.
CREATE TABLE IF NOT EXISTS grade_records (
    record_id          TEXT PRIMARY KEY,
    student_id         TEXT NOT NULL REFERENCES students(org_id),
    term               TEXT NOT NULL,
    lab_unit           TEXT REFERENCES sections(unit_id),
    lecture_unit       TEXT REFERENCES sections(unit_id),
    lab                REAL CHECK (lab          BETWEEN 0 AND 100),
    quizzes            REAL CHECK (quizzes      BETWEEN 0 AND 100),
    exit_tickets       REAL CHECK (exit_tickets BETWEEN 0 AND 100),
    capstone           REAL CHECK (capstone     BETWEEN 0 AND 100),
    pre_final          REAL CHECK (pre_final    BETWEEN 0 AND 100),
    post_final         REAL CHECK (post_final   BETWEEN 0 AND 100),
    has_final_project  INTEGER NOT NULL DEFAULT 0,
    last_updated       TEXT NOT NULL,   -- RFC 3339 UTC, microseconds
    UNIQUE (student_id, term),
    CHECK  ((pre_final IS NULL) = (post_final IS NULL))
);

-- Strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS grade_snapshots (
    snapshot_id        TEXT PRIMARY KEY,
    student_id         TEXT NOT NULL REFERENCES students(org_id),
    term               TEXT NOT NULL,
    course_unit        TEXT NOT NULL REFERENCES sections(unit_id),
    lab                REAL,
    quizzes            REAL,
    exit_tickets       REAL,
    capstone           REAL,
    pre_final          REAL,
    post_final         REAL,
    has_final_project  INTEGER NOT NULL,
    recorded_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS grade_records_term_idx ON grade_records(term);
CREATE INDEX IF NOT EXISTS grade_snapshots_history_idx
    ON grade_snapshots(student_id, course_unit, recorded_at);
CREATE INDEX IF NOT EXISTS sections_term_idx ON sections(term, kind);

PRAGMA user_version = 1;
";
