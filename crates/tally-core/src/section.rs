//! Course sections and the cohort rule derived from them.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result, component::SectionKind, term::Term};

/// One lab or lecture section for one term, keyed by its LMS unit id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSection {
  pub unit_id:      String,
  /// Course name without section suffix, e.g. `CSCI-1150`.
  pub course_name:  String,
  /// Three-digit section code, e.g. `001` or `901`.
  pub section_code: String,
  pub term:         Term,
  pub kind:         SectionKind,
}

impl CourseSection {
  /// Build a section from an LMS label such as `CSCI-1150-001`, whose last
  /// dash-separated segment is the section code.
  pub fn from_label(
    unit_id: impl Into<String>,
    label: &str,
    term: Term,
    kind: SectionKind,
  ) -> Result<Self> {
    let (course_name, section_code) = label
      .trim()
      .rsplit_once('-')
      .ok_or_else(|| Error::InvalidSectionCode(label.to_owned()))?;
    let section = Self {
      unit_id: unit_id.into(),
      course_name: course_name.to_owned(),
      section_code: section_code.to_owned(),
      term,
      kind,
    };
    section.validate()?;
    Ok(section)
  }

  /// Reject identifiers the store cannot key on.
  pub fn validate(&self) -> Result<()> {
    let unit_ok = !self.unit_id.is_empty()
      && self.unit_id.chars().all(|c| c.is_ascii_alphanumeric());
    if !unit_ok {
      return Err(Error::InvalidIdentifier(self.unit_id.clone()));
    }
    section_number(&self.section_code)?;
    Ok(())
  }

  pub fn label(&self) -> String {
    format!("{}-{}", self.course_name, self.section_code)
  }

  /// The cohort this section assigns its students to. Only meaningful for
  /// lecture sections; a lab section's code never decides cohort.
  pub fn cohort(&self) -> Option<Cohort> {
    match self.kind {
      SectionKind::Lecture => Cohort::of_section_code(&self.section_code).ok(),
      SectionKind::Lab => None,
    }
  }
}

/// Student grouping derived from the lecture section code.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Cohort {
  /// Lecture section codes below 900.
  InPerson,
  /// Lecture section codes 900 and above.
  Online,
}

impl Cohort {
  pub const ONLINE_THRESHOLD: u16 = 900;

  pub fn of_section_code(code: &str) -> Result<Self> {
    Ok(if section_number(code)? < Self::ONLINE_THRESHOLD {
      Self::InPerson
    } else {
      Self::Online
    })
  }

  /// Inclusive-exclusive range of section numbers in this cohort.
  pub fn section_range(self) -> (u16, u16) {
    match self {
      Self::InPerson => (0, Self::ONLINE_THRESHOLD),
      Self::Online => (Self::ONLINE_THRESHOLD, 1000),
    }
  }
}

fn section_number(code: &str) -> Result<u16> {
  if code.len() == 3 && code.bytes().all(|b| b.is_ascii_digit()) {
    code
      .parse()
      .map_err(|_| Error::InvalidSectionCode(code.to_owned()))
  } else {
    Err(Error::InvalidSectionCode(code.to_owned()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn term() -> Term { Term::parse("202580").unwrap() }

  #[test]
  fn from_label_splits_on_last_dash() {
    let s = CourseSection::from_label("10219699", "CSCI-1100-901", term(), SectionKind::Lecture)
      .unwrap();
    assert_eq!(s.course_name, "CSCI-1100");
    assert_eq!(s.section_code, "901");
    assert_eq!(s.label(), "CSCI-1100-901");
  }

  #[test]
  fn malformed_sections_are_rejected() {
    assert!(CourseSection::from_label("1", "CSCI-1150-01", term(), SectionKind::Lab).is_err());
    assert!(CourseSection::from_label("1", "CSCI1150", term(), SectionKind::Lab).is_err());
    assert!(CourseSection::from_label("", "CSCI-1150-001", term(), SectionKind::Lab).is_err());
  }

  #[test]
  fn cohort_boundary_is_900() {
    assert_eq!(Cohort::of_section_code("001").unwrap(), Cohort::InPerson);
    assert_eq!(Cohort::of_section_code("899").unwrap(), Cohort::InPerson);
    assert_eq!(Cohort::of_section_code("900").unwrap(), Cohort::Online);
    assert_eq!(Cohort::of_section_code("942").unwrap(), Cohort::Online);
  }

  #[test]
  fn lab_sections_have_no_cohort() {
    let lab = CourseSection::from_label("7", "CSCI-1150-901", term(), SectionKind::Lab).unwrap();
    assert_eq!(lab.cohort(), None);
  }
}
