//! The input boundary: section exports handed over by the scraping layer.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
  component::Component, normalize::ScoreRow, section::CourseSection,
  student::StudentInfo,
};

/// One raw grade row as exported for a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterRow {
  pub student_id:  String,
  pub component:   Component,
  #[serde(default)]
  pub numerator:   Option<f64>,
  #[serde(default)]
  pub denominator: Option<f64>,
}

/// A complete export for one section: the section itself, the roster's
/// demographics, and every component row. Ends at end-of-section; there is no
/// streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionExport {
  pub section:  CourseSection,
  #[serde(default)]
  pub students: Vec<StudentInfo>,
  #[serde(default)]
  pub rows:     Vec<RosterRow>,
}

impl SectionExport {
  /// Components that have at least one row, in declaration order.
  pub fn components(&self) -> Vec<Component> {
    self
      .rows
      .iter()
      .map(|r| r.component)
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect()
  }

  pub fn rows_for(&self, component: Component) -> Vec<ScoreRow> {
    self
      .rows
      .iter()
      .filter(|r| r.component == component)
      .map(|r| ScoreRow::new(r.student_id.clone(), r.numerator, r.denominator))
      .collect()
  }
}

/// Capability interface for anything that can export a section by unit id:
/// a browser scraper or a directory of saved exports.
///
/// Implementations run on worker threads and must not touch the grade store.
pub trait SectionSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn export(&self, unit_id: &str) -> Result<SectionExport, Self::Error>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{component::SectionKind, term::Term};

  #[test]
  fn components_are_deduplicated_and_ordered() {
    let export = SectionExport {
      section:  CourseSection::from_label(
        "1",
        "CSCI-1100-001",
        Term::parse("202580").unwrap(),
        SectionKind::Lecture,
      )
      .unwrap(),
      students: vec![],
      rows:     vec![
        RosterRow {
          student_id:  "a".into(),
          component:   Component::ExitTickets,
          numerator:   Some(1.0),
          denominator: Some(2.0),
        },
        RosterRow {
          student_id:  "a".into(),
          component:   Component::Quizzes,
          numerator:   None,
          denominator: Some(10.0),
        },
        RosterRow {
          student_id:  "b".into(),
          component:   Component::ExitTickets,
          numerator:   Some(2.0),
          denominator: Some(2.0),
        },
      ],
    };

    assert_eq!(export.components(), vec![Component::Quizzes, Component::ExitTickets]);
    assert_eq!(export.rows_for(Component::ExitTickets).len(), 2);
    assert_eq!(export.rows_for(Component::Lab), vec![]);
  }
}
