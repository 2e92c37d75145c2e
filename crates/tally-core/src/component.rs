//! Grade components and the section kinds that carry them.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// The two kinds of course section in the program.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum SectionKind {
  Lab,
  Lecture,
}

/// One gradable category contributing to the overall grade.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Component {
  Lab,
  Quizzes,
  ExitTickets,
  /// The final project (a.k.a. DCA). Tri-state: ungraded, zero, positive.
  Capstone,
}

impl Component {
  /// The section kind whose export carries this component.
  pub fn section_kind(self) -> SectionKind {
    match self {
      Self::Lab | Self::Capstone => SectionKind::Lab,
      Self::Quizzes | Self::ExitTickets => SectionKind::Lecture,
    }
  }

  /// Exit tickets are summed from many small per-item fractions upstream, so
  /// their ratio is rounded to six places before scaling.
  pub fn rounds_ratio(self) -> bool { matches!(self, Self::ExitTickets) }

  /// Whether a missing numerator means "not yet graded" rather than zero.
  pub fn is_tri_state(self) -> bool { matches!(self, Self::Capstone) }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use strum::IntoEnumIterator;

  use super::*;

  #[test]
  fn components_parse_from_snake_case() {
    assert_eq!(Component::from_str("exit_tickets").unwrap(), Component::ExitTickets);
    assert_eq!(Component::from_str("CAPSTONE").unwrap(), Component::Capstone);
    assert!(Component::from_str("homework").is_err());
  }

  #[test]
  fn each_component_has_one_owning_kind() {
    let lab: Vec<_> = Component::iter()
      .filter(|c| c.section_kind() == SectionKind::Lab)
      .collect();
    assert_eq!(lab, vec![Component::Lab, Component::Capstone]);
  }

  #[test]
  fn section_kind_round_trips_through_its_column_form() {
    assert_eq!(SectionKind::Lecture.as_ref(), "LECTURE");
    assert_eq!(SectionKind::from_str("lab").unwrap(), SectionKind::Lab);
  }
}
