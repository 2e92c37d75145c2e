//! Overall grade derivation.
//!
//! Pre-final is the mean of the lab, quiz and exit-ticket percentages.
//! Post-final averages pre-final with the capstone, treating an ungraded
//! capstone as a projected zero so the gap between the two numbers is an early
//! warning while the capstone is still outstanding.

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  grade::{ComponentValues, OverallGrades},
};

/// How the pre-final mean treats missing components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreFinalDivisor {
  /// Divide by the number of components present, so a student whose lecture
  /// data has not been loaded yet is not zeroed on it.
  #[default]
  Available,
  /// Always divide by three; missing components count as zero.
  Fixed,
}

/// Derive overall grades for one student.
pub fn aggregate(
  values: &ComponentValues,
  divisor: PreFinalDivisor,
) -> Result<OverallGrades> {
  let present: Vec<f64> = [values.lab, values.quizzes, values.exit_tickets]
    .into_iter()
    .flatten()
    .collect();

  let pre_final = if present.is_empty() {
    None
  } else {
    let denominator = match divisor {
      PreFinalDivisor::Available => present.len() as f64,
      PreFinalDivisor::Fixed => 3.0,
    };
    Some(present.iter().sum::<f64>() / denominator)
  };

  let post_final = pre_final.map(|pre| match values.capstone {
    None => pre / 2.0,
    Some(capstone) => (pre + capstone) / 2.0,
  });

  let grades = OverallGrades {
    pre_final,
    post_final,
    has_final_project: values.capstone.is_some(),
  };
  check_consistency(&grades)?;
  Ok(grades)
}

/// Pre-final and post-final must be null together.
pub fn check_consistency(grades: &OverallGrades) -> Result<()> {
  let consistent = grades.pre_final.is_some() == grades.post_final.is_some()
    && grades.pre_final.is_none_or(f64::is_finite)
    && grades.post_final.is_none_or(f64::is_finite);
  debug_assert!(consistent, "inconsistent derived grades: {grades:?}");
  if consistent {
    Ok(())
  } else {
    Err(Error::DerivedGradeInconsistency {
      pre_final:  grades.pre_final,
      post_final: grades.post_final,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const EPS: f64 = 1e-9;

  fn lecture_and_lab(capstone: Option<f64>) -> ComponentValues {
    ComponentValues {
      lab: Some(85.5),
      quizzes: Some(92.0),
      exit_tickets: Some(88.3),
      capstone,
    }
  }

  fn close(a: Option<f64>, b: f64) -> bool {
    a.is_some_and(|a| (a - b).abs() < EPS)
  }

  #[test]
  fn ungraded_capstone_halves_pre_final() {
    let g = aggregate(&lecture_and_lab(None), PreFinalDivisor::Available).unwrap();
    assert!(close(g.pre_final, 88.6));
    assert!(close(g.post_final, 44.3));
    assert!(!g.has_final_project);
  }

  #[test]
  fn graded_zero_matches_ungraded_but_is_entered() {
    let g = aggregate(&lecture_and_lab(Some(0.0)), PreFinalDivisor::Available).unwrap();
    assert!(close(g.post_final, 44.3));
    assert!(g.has_final_project);
  }

  #[test]
  fn graded_capstone_is_averaged_in() {
    let g = aggregate(&lecture_and_lab(Some(95.0)), PreFinalDivisor::Available).unwrap();
    assert!(close(g.post_final, 91.8));

    let g = aggregate(&lecture_and_lab(Some(50.0)), PreFinalDivisor::Available).unwrap();
    assert!(close(g.post_final, 69.3));
  }

  #[test]
  fn no_components_means_no_grades() {
    let values = ComponentValues { capstone: Some(100.0), ..Default::default() };
    let g = aggregate(&values, PreFinalDivisor::Available).unwrap();
    assert_eq!(g.pre_final, None);
    assert_eq!(g.post_final, None);
    assert!(g.has_final_project);
  }

  #[test]
  fn divisor_choice_only_matters_with_gaps() {
    let lab_only = ComponentValues { lab: Some(90.0), ..Default::default() };

    let available = aggregate(&lab_only, PreFinalDivisor::Available).unwrap();
    assert!(close(available.pre_final, 90.0));

    let fixed = aggregate(&lab_only, PreFinalDivisor::Fixed).unwrap();
    assert!(close(fixed.pre_final, 30.0));

    let full = lecture_and_lab(None);
    assert_eq!(
      aggregate(&full, PreFinalDivisor::Available).unwrap(),
      aggregate(&full, PreFinalDivisor::Fixed).unwrap(),
    );
  }

  #[test]
  #[cfg_attr(debug_assertions, should_panic(expected = "inconsistent derived grades"))]
  fn inconsistent_grades_are_rejected() {
    let bad = OverallGrades {
      pre_final: None,
      post_final: Some(10.0),
      has_final_project: false,
    };
    let err = check_consistency(&bad).unwrap_err();
    assert!(err.is_invariant_violation());
  }
}
