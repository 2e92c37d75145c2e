//! Summary statistics over a set of grade rows (typically one cohort).

use serde::Serialize;

use crate::grade::StudentGradeRow;

pub const DEFAULT_PASSING_THRESHOLD: f64 = 60.0;

/// Count of post-final grades per letter band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LetterDistribution {
  pub a: usize,
  pub b: usize,
  pub c: usize,
  pub d: usize,
  pub f: usize,
}

impl LetterDistribution {
  fn record(&mut self, grade: f64) {
    match grade {
      g if g >= 90.0 => self.a += 1,
      g if g >= 80.0 => self.b += 1,
      g if g >= 70.0 => self.c += 1,
      g if g >= 60.0 => self.d += 1,
      _ => self.f += 1,
    }
  }
}

/// Averages skip students that have no value for the field; rates are over
/// students that have a pre-final grade at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CohortStatistics {
  pub total_students:         usize,
  pub graded_students:        usize,
  pub avg_lab:                Option<f64>,
  pub avg_quizzes:            Option<f64>,
  pub avg_exit_tickets:       Option<f64>,
  pub avg_capstone:           Option<f64>,
  pub avg_pre_final:          Option<f64>,
  pub avg_post_final:         Option<f64>,
  pub students_with_capstone: usize,
  pub passing_threshold:      f64,
  pub passing_rate_pre:       Option<f64>,
  pub passing_rate_post:      Option<f64>,
  pub distribution:           LetterDistribution,
}

pub fn cohort_statistics(rows: &[StudentGradeRow], passing_threshold: f64) -> CohortStatistics {
  let components = |f: fn(&StudentGradeRow) -> Option<f64>| rows.iter().filter_map(f);

  let graded: Vec<&StudentGradeRow> = rows
    .iter()
    .filter(|r| r.record.overall.pre_final.is_some())
    .collect();

  let rate = |f: fn(&StudentGradeRow) -> Option<f64>| {
    if graded.is_empty() {
      return None;
    }
    let passing = graded
      .iter()
      .filter(|r| f(r).is_some_and(|g| g >= passing_threshold))
      .count();
    Some(100.0 * passing as f64 / graded.len() as f64)
  };

  let mut distribution = LetterDistribution::default();
  for grade in components(|r| r.record.overall.post_final) {
    distribution.record(grade);
  }

  CohortStatistics {
    total_students: rows.len(),
    graded_students: graded.len(),
    avg_lab: mean(components(|r| r.record.components.lab)),
    avg_quizzes: mean(components(|r| r.record.components.quizzes)),
    avg_exit_tickets: mean(components(|r| r.record.components.exit_tickets)),
    avg_capstone: mean(components(|r| r.record.components.capstone)),
    avg_pre_final: mean(components(|r| r.record.overall.pre_final)),
    avg_post_final: mean(components(|r| r.record.overall.post_final)),
    students_with_capstone: rows
      .iter()
      .filter(|r| r.record.overall.has_final_project)
      .count(),
    passing_threshold,
    passing_rate_pre: rate(|r| r.record.overall.pre_final),
    passing_rate_post: rate(|r| r.record.overall.post_final),
    distribution,
  }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
  let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
  (n > 0).then(|| sum / n as f64)
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::{
    aggregate::{PreFinalDivisor, aggregate},
    grade::{ComponentValues, GradeRecord},
    student::{Student, StudentInfo},
    term::Term,
  };

  fn row(id: &str, values: ComponentValues) -> StudentGradeRow {
    StudentGradeRow {
      student: Student::from(StudentInfo::new(id)),
      record:  GradeRecord {
        record_id:    Uuid::new_v4(),
        student_id:   id.to_owned(),
        term:         Term::parse("202580").unwrap(),
        lab_unit:     None,
        lecture_unit: None,
        components:   values,
        overall:      aggregate(&values, PreFinalDivisor::Available).unwrap(),
        last_updated: Utc::now(),
      },
      lab:     None,
      lecture: None,
    }
  }

  fn all(score: f64, capstone: Option<f64>) -> ComponentValues {
    ComponentValues {
      lab: Some(score),
      quizzes: Some(score),
      exit_tickets: Some(score),
      capstone,
    }
  }

  #[test]
  fn empty_cohort_has_no_averages() {
    let stats = cohort_statistics(&[], DEFAULT_PASSING_THRESHOLD);
    assert_eq!(stats.total_students, 0);
    assert_eq!(stats.avg_lab, None);
    assert_eq!(stats.passing_rate_pre, None);
  }

  #[test]
  fn averages_skip_missing_components() {
    let rows = vec![
      row("a", all(80.0, Some(100.0))),
      row("b", ComponentValues { lab: Some(60.0), ..Default::default() }),
      row("c", ComponentValues::default()),
    ];
    let stats = cohort_statistics(&rows, DEFAULT_PASSING_THRESHOLD);

    assert_eq!(stats.total_students, 3);
    assert_eq!(stats.graded_students, 2);
    assert_eq!(stats.avg_lab, Some(70.0));
    assert_eq!(stats.avg_quizzes, Some(80.0));
    assert_eq!(stats.avg_capstone, Some(100.0));
    assert_eq!(stats.students_with_capstone, 1);
    // a: pre 80, post 90; b: pre 60, post 30
    assert_eq!(stats.avg_pre_final, Some(70.0));
    assert_eq!(stats.avg_post_final, Some(60.0));
    assert_eq!(stats.passing_rate_pre, Some(100.0));
    assert_eq!(stats.passing_rate_post, Some(50.0));
  }

  #[test]
  fn distribution_uses_post_final() {
    let rows = vec![
      row("a", all(90.0, Some(90.0))),
      row("b", all(85.0, Some(75.0))),
      row("c", all(70.0, Some(70.0))),
      row("d", all(100.0, Some(20.0))),
      row("e", all(90.0, None)),
    ];
    let stats = cohort_statistics(&rows, DEFAULT_PASSING_THRESHOLD);
    assert_eq!(
      stats.distribution,
      LetterDistribution { a: 1, b: 1, c: 1, d: 1, f: 1 }
    );
  }
}
