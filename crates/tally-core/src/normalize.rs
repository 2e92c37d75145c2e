//! Component normalization: raw `numerator / denominator` rows for one
//! component across one roster become a percentage per student.
//!
//! Rules, in order:
//!
//! 1. A missing numerator or denominator counts as `0`. A student with no row
//!    at all gets no data (`None`), not zero. For the capstone a missing
//!    numerator means "not yet graded" and also yields `None`; its missing
//!    denominator defaults to [`CAPSTONE_DEFAULT_MAX_POINTS`].
//! 2. A zero denominator is replaced by the mode of the roster's non-zero
//!    denominators (ties go to the smallest value). Ungraded placeholder rows
//!    report `0/0` while graded peers carry the real points possible.
//! 3. `100 × numerator / denominator`, with the exit-ticket ratio rounded to
//!    six places first.
//!
//! A roster that needs imputation but has no non-zero denominator is a hard
//! failure; silently producing 0% would corrupt the whole section.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result, component::Component};

pub const CAPSTONE_DEFAULT_MAX_POINTS: f64 = 100.0;

const RATIO_PLACES: f64 = 1e6;

/// One student's raw points for one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
  pub student_id:  String,
  #[serde(default)]
  pub numerator:   Option<f64>,
  #[serde(default)]
  pub denominator: Option<f64>,
}

impl ScoreRow {
  pub fn new(
    student_id: impl Into<String>,
    numerator: Option<f64>,
    denominator: Option<f64>,
  ) -> Self {
    Self { student_id: student_id.into(), numerator, denominator }
  }
}

/// Percentages for one component, keyed by student id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedComponent {
  pub component: Component,
  /// The imputed denominator, if any zero denominator needed one.
  pub imputed_denominator: Option<f64>,
  pub scores: BTreeMap<String, Option<f64>>,
}

impl NormalizedComponent {
  /// `None` when the student has no data, including students absent from the
  /// roster.
  pub fn get(&self, student_id: &str) -> Option<f64> {
    self.scores.get(student_id).copied().flatten()
  }
}

/// Normalize `rows` for `component`. Students listed in `roster` without a
/// row are reported with `None`. When a student has several rows, the last
/// one wins.
pub fn normalize<'a>(
  component: Component,
  roster: impl IntoIterator<Item = &'a str>,
  rows: &[ScoreRow],
) -> Result<NormalizedComponent> {
  let mut filled: BTreeMap<&str, Option<(f64, f64)>> = BTreeMap::new();
  for row in rows {
    let numerator = finite(row.numerator);
    let denominator = finite(row.denominator);
    if numerator.is_some_and(|n| n < 0.0) || denominator.is_some_and(|d| d < 0.0) {
      return Err(Error::NegativeScore {
        component,
        student_id: row.student_id.clone(),
      });
    }

    let points = match (component.is_tri_state(), numerator) {
      (true, None) => None,
      (true, Some(n)) => {
        Some((n, denominator.unwrap_or(CAPSTONE_DEFAULT_MAX_POINTS)))
      }
      (false, n) => Some((n.unwrap_or(0.0), denominator.unwrap_or(0.0))),
    };
    if filled.insert(row.student_id.as_str(), points).is_some() {
      debug!(%component, student = %row.student_id, "duplicate row; keeping the last");
    }
  }

  let mode = denominator_mode(filled.values().flatten().map(|(_, d)| *d));
  let needs_imputation = filled.values().flatten().any(|(_, d)| *d == 0.0);
  if needs_imputation && mode.is_none() {
    return Err(Error::NoDenominator { component });
  }

  let mut scores: BTreeMap<String, Option<f64>> = roster
    .into_iter()
    .map(|id| (id.to_owned(), None))
    .collect();

  for (student_id, points) in filled {
    let percent = points.map(|(numerator, denominator)| {
      let denominator = if denominator == 0.0 {
        mode.unwrap_or(denominator)
      } else {
        denominator
      };
      let pct = percentage(component, numerator, denominator);
      if pct > 100.0 {
        warn!(%component, student = %student_id, pct, "score above 100%; clamping");
        100.0
      } else {
        pct
      }
    });
    scores.insert(student_id.to_owned(), percent);
  }

  Ok(NormalizedComponent {
    component,
    imputed_denominator: mode.filter(|_| needs_imputation),
    scores,
  })
}

/// `100 × numerator / denominator`, rounding the exit-ticket ratio to six
/// decimal places before scaling.
pub fn percentage(component: Component, numerator: f64, denominator: f64) -> f64 {
  let ratio = numerator / denominator;
  let ratio = if component.rounds_ratio() {
    (ratio * RATIO_PLACES).round_ties_even() / RATIO_PLACES
  } else {
    ratio
  };
  100.0 * ratio
}

/// Most frequent non-zero value; ties resolve to the smallest.
pub fn denominator_mode(values: impl IntoIterator<Item = f64>) -> Option<f64> {
  let mut counts: Vec<(f64, usize)> = Vec::new();
  for value in values.into_iter().filter(|v| *v != 0.0) {
    match counts.iter_mut().find(|(v, _)| *v == value) {
      Some((_, n)) => *n += 1,
      None => counts.push((value, 1)),
    }
  }
  counts
    .into_iter()
    .max_by(|a, b| a.1.cmp(&b.1).then(b.0.total_cmp(&a.0)))
    .map(|(value, _)| value)
}

fn finite(value: Option<f64>) -> Option<f64> { value.filter(|v| v.is_finite()) }

#[cfg(test)]
mod tests {
  use super::*;

  fn row(id: &str, n: Option<f64>, d: Option<f64>) -> ScoreRow {
    ScoreRow::new(id, n, d)
  }

  #[test]
  fn zero_denominator_takes_the_mode() {
    let rows = vec![
      row("A", Some(10.0), Some(20.0)),
      row("B", Some(15.0), Some(0.0)),
      row("C", Some(12.0), Some(20.0)),
    ];
    let out = normalize(Component::Lab, [], &rows).unwrap();
    assert_eq!(out.imputed_denominator, Some(20.0));
    assert_eq!(out.get("A"), Some(50.0));
    assert_eq!(out.get("B"), Some(75.0));
    assert_eq!(out.get("C"), Some(60.0));
  }

  #[test]
  fn missing_values_count_as_zero_but_absent_students_are_null() {
    let rows = vec![row("A", None, Some(50.0)), row("B", Some(25.0), Some(50.0))];
    let out = normalize(Component::Quizzes, ["A", "B", "Z"], &rows).unwrap();
    assert_eq!(out.get("A"), Some(0.0));
    assert_eq!(out.get("B"), Some(50.0));
    assert_eq!(out.scores.get("Z"), Some(&None));
    assert_eq!(out.get("nobody"), None);
  }

  #[test]
  fn all_zero_denominators_is_a_hard_failure() {
    let rows = vec![row("A", Some(0.0), Some(0.0)), row("B", None, None)];
    let err = normalize(Component::Lab, [], &rows).unwrap_err();
    assert!(matches!(err, Error::NoDenominator { component: Component::Lab }));
  }

  #[test]
  fn empty_roster_is_not_a_failure() {
    let out = normalize(Component::Lab, [], &[]).unwrap();
    assert!(out.scores.is_empty());
    assert_eq!(out.imputed_denominator, None);
  }

  #[test]
  fn mode_ties_resolve_to_smallest() {
    assert_eq!(denominator_mode([30.0, 20.0, 30.0, 20.0, 0.0, 0.0, 0.0]), Some(20.0));
    assert_eq!(denominator_mode([0.0, 0.0]), None);
    assert_eq!(denominator_mode([40.0, 40.0, 10.0]), Some(40.0));
  }

  #[test]
  fn exit_tickets_round_the_ratio() {
    // 1/3 → 0.333333 → 33.3333%
    let pct = percentage(Component::ExitTickets, 1.0, 3.0);
    assert!((pct - 33.3333).abs() < 1e-9);
    let unrounded = percentage(Component::Quizzes, 1.0, 3.0);
    assert!((unrounded - 100.0 / 3.0).abs() < 1e-12);
  }

  #[test]
  fn capstone_without_score_is_ungraded() {
    let rows = vec![
      row("A", None, Some(300.0)),
      row("B", Some(0.0), Some(300.0)),
      row("C", Some(75.0), None),
    ];
    let out = normalize(Component::Capstone, [], &rows).unwrap();
    assert_eq!(out.scores.get("A"), Some(&None));
    assert_eq!(out.get("B"), Some(0.0));
    assert_eq!(out.get("C"), Some(75.0));
  }

  #[test]
  fn negative_points_are_rejected() {
    let rows = vec![row("A", Some(-1.0), Some(10.0))];
    assert!(matches!(
      normalize(Component::Lab, [], &rows),
      Err(Error::NegativeScore { .. })
    ));
  }

  #[test]
  fn extra_credit_is_clamped() {
    let rows = vec![row("A", Some(22.0), Some(20.0))];
    let out = normalize(Component::Lab, [], &rows).unwrap();
    assert_eq!(out.get("A"), Some(100.0));
  }

  #[test]
  fn normalization_is_idempotent() {
    let rows = vec![
      row("A", Some(7.5), Some(9.0)),
      row("B", None, Some(0.0)),
      row("C", Some(3.0), None),
      row("D", Some(8.0), Some(9.0)),
    ];
    let first = normalize(Component::ExitTickets, ["E"], &rows).unwrap();
    let second = normalize(Component::ExitTickets, ["E"], &rows).unwrap();
    assert_eq!(first, second);
  }
}
