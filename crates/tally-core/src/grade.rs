//! Aggregate grade records, historical snapshots and the joined read model.
//!
//! A [`GradeRecord`] is the single current row per `(student, term)`. Every
//! write to it appends a [`Snapshot`]; snapshots are never updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  component::Component,
  section::{Cohort, CourseSection},
  student::Student,
  term::Term,
};

// ─── Component values ────────────────────────────────────────────────────────

/// The four component percentages; `None` means no data has arrived yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentValues {
  pub lab:          Option<f64>,
  pub quizzes:      Option<f64>,
  pub exit_tickets: Option<f64>,
  /// `None` is "not yet graded", distinct from a graded zero.
  pub capstone:     Option<f64>,
}

impl ComponentValues {
  pub fn get(&self, component: Component) -> Option<f64> {
    match component {
      Component::Lab => self.lab,
      Component::Quizzes => self.quizzes,
      Component::ExitTickets => self.exit_tickets,
      Component::Capstone => self.capstone,
    }
  }

  pub fn state(&self) -> RecordState {
    let all = [self.lab, self.quizzes, self.exit_tickets, self.capstone];
    if all.iter().all(Option::is_some) {
      RecordState::Complete
    } else {
      RecordState::Partial
    }
  }
}

/// A field-level update. The outer `Option` says whether the field was
/// supplied; the inner one is the supplied value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComponentPatch {
  pub lab:          Option<Option<f64>>,
  pub quizzes:      Option<Option<f64>>,
  pub exit_tickets: Option<Option<f64>>,
  pub capstone:     Option<Option<f64>>,
}

impl ComponentPatch {
  pub fn set(&mut self, component: Component, value: Option<f64>) {
    let slot = match component {
      Component::Lab => &mut self.lab,
      Component::Quizzes => &mut self.quizzes,
      Component::ExitTickets => &mut self.exit_tickets,
      Component::Capstone => &mut self.capstone,
    };
    *slot = Some(value);
  }

  pub fn with(mut self, component: Component, value: Option<f64>) -> Self {
    self.set(component, value);
    self
  }

  /// Components this patch supplies, in declaration order.
  pub fn supplied(&self) -> Vec<Component> {
    [
      (Component::Lab, self.lab.is_some()),
      (Component::Quizzes, self.quizzes.is_some()),
      (Component::ExitTickets, self.exit_tickets.is_some()),
      (Component::Capstone, self.capstone.is_some()),
    ]
    .into_iter()
    .filter_map(|(c, present)| present.then_some(c))
    .collect()
  }

  pub fn is_empty(&self) -> bool { self.supplied().is_empty() }

  /// Merge into `base`, touching only supplied fields.
  pub fn apply(&self, base: ComponentValues) -> ComponentValues {
    ComponentValues {
      lab:          self.lab.unwrap_or(base.lab),
      quizzes:      self.quizzes.unwrap_or(base.quizzes),
      exit_tickets: self.exit_tickets.unwrap_or(base.exit_tickets),
      capstone:     self.capstone.unwrap_or(base.capstone),
    }
  }
}

// ─── Derived grades ─────────────────────────────────────────────────────────

/// Overall grades derived from [`ComponentValues`] by
/// [`crate::aggregate::aggregate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallGrades {
  pub pre_final:         Option<f64>,
  /// Always computed when `pre_final` is; an ungraded capstone counts as a
  /// projected zero.
  pub post_final:        Option<f64>,
  /// The capstone has been entered (zero included).
  pub has_final_project: bool,
}

impl OverallGrades {
  /// Post-final when known, pre-final otherwise.
  pub fn current(&self) -> Option<f64> { self.post_final.or(self.pre_final) }
}

/// Lifecycle of an aggregate record once it exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
  /// At least one component is still missing.
  Partial,
  /// All four components are present.
  Complete,
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// The current aggregate for one student in one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
  pub record_id:       Uuid,
  pub student_id:      String,
  pub term:            Term,
  pub lab_unit:        Option<String>,
  pub lecture_unit:    Option<String>,
  pub components:      ComponentValues,
  pub overall:         OverallGrades,
  pub last_updated:    DateTime<Utc>,
}

impl GradeRecord {
  pub fn state(&self) -> RecordState { self.components.state() }
}

/// An immutable copy of a record's values at the moment of one update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub snapshot_id:   Uuid,
  pub student_id:    String,
  pub term:          Term,
  /// The section whose write produced this snapshot.
  pub course_unit:   String,
  pub components:    ComponentValues,
  pub overall:       OverallGrades,
  pub recorded_at:   DateTime<Utc>,
}

/// The read model for query collaborators: a record joined with its student
/// and both section rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentGradeRow {
  pub student: Student,
  pub record:  GradeRecord,
  pub lab:     Option<CourseSection>,
  pub lecture: Option<CourseSection>,
}

impl StudentGradeRow {
  /// Cohort from the lecture section; `None` until lecture data arrives.
  pub fn cohort(&self) -> Option<Cohort> {
    self.lecture.as_ref().and_then(CourseSection::cohort)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn patch_only_touches_supplied_fields() {
    let base = ComponentValues {
      lab:          Some(80.0),
      quizzes:      Some(70.0),
      exit_tickets: Some(90.0),
      capstone:     None,
    };
    let patch = ComponentPatch::default()
      .with(Component::Lab, Some(85.0))
      .with(Component::Capstone, Some(0.0));

    let merged = patch.apply(base);
    assert_eq!(merged.lab, Some(85.0));
    assert_eq!(merged.quizzes, Some(70.0));
    assert_eq!(merged.exit_tickets, Some(90.0));
    assert_eq!(merged.capstone, Some(0.0));
    assert_eq!(merged.state(), RecordState::Complete);
  }

  #[test]
  fn supplying_null_clears_a_field() {
    let base = ComponentValues { capstone: Some(40.0), ..Default::default() };
    let merged = ComponentPatch::default()
      .with(Component::Capstone, None)
      .apply(base);
    assert_eq!(merged.capstone, None);
  }

  #[test]
  fn supplied_lists_components_in_order() {
    let patch = ComponentPatch::default()
      .with(Component::ExitTickets, Some(1.0))
      .with(Component::Quizzes, None);
    assert_eq!(patch.supplied(), vec![Component::Quizzes, Component::ExitTickets]);
    assert!(ComponentPatch::default().is_empty());
  }
}
