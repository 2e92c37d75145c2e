//! Error types for `tally-core`.

use thiserror::Error;

use crate::component::{Component, SectionKind};

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid term code: {0:?} (expected YYYYPP)")]
  InvalidTerm(String),

  #[error("invalid student identifier: {0:?}")]
  InvalidIdentifier(String),

  #[error("invalid section code: {0:?} (expected three digits)")]
  InvalidSectionCode(String),

  /// The roster has no non-zero denominator to impute a missing one from.
  #[error("{component} roster has no non-zero denominator to impute from")]
  NoDenominator { component: Component },

  #[error("negative {component} score for student {student_id}")]
  NegativeScore {
    component:  Component,
    student_id: String,
  },

  #[error("{component} rows cannot be loaded from a {kind} section")]
  ComponentMismatch {
    component: Component,
    kind:      SectionKind,
  },

  #[error("section {unit_id} belongs to term {section_term}, not {term}")]
  TermMismatch {
    unit_id:      String,
    section_term: String,
    term:         String,
  },

  #[error("username {username:?} already belongs to student {owner}")]
  UsernameTaken { username: String, owner: String },

  /// An existing section row disagrees with the incoming reference on a field
  /// that cannot be corrected in place.
  #[error("section {unit_id} conflicts with stored section: {reason}")]
  SectionConflict { unit_id: String, reason: String },

  #[error(
    "derived grades are inconsistent: pre_final={pre_final:?}, \
     post_final={post_final:?}"
  )]
  DerivedGradeInconsistency {
    pre_final:  Option<f64>,
    post_final: Option<f64>,
  },
}

impl Error {
  /// Invariant violations abort the current unit of work instead of being
  /// collected as per-student failures.
  pub fn is_invariant_violation(&self) -> bool {
    matches!(self, Self::DerivedGradeInconsistency { .. })
  }

  /// Failures that identify a write whose student or section cannot be
  /// resolved or created.
  pub fn is_merge_conflict(&self) -> bool {
    matches!(
      self,
      Self::InvalidIdentifier(_)
        | Self::InvalidSectionCode(_)
        | Self::TermMismatch { .. }
        | Self::UsernameTaken { .. }
        | Self::SectionConflict { .. }
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
