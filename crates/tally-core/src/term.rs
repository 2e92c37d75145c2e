//! Term identifiers.
//!
//! A term is a six-digit code: a four-digit year followed by a two-digit
//! period (`10` spring, `50` summer, `80` fall). The core treats it as an
//! opaque partition key and never does date arithmetic with it.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Term(String);

impl Term {
  pub fn parse(code: &str) -> Result<Self> {
    let code = code.trim();
    if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
      Ok(Self(code.to_owned()))
    } else {
      Err(Error::InvalidTerm(code.to_owned()))
    }
  }

  /// The term in progress on `date`: January–April is spring, 16 August
  /// onward is fall, anything in between is summer.
  pub fn current(date: NaiveDate) -> Self {
    let period = match (date.month(), date.day()) {
      (m, _) if m < 5 => "10",
      (m, _) if m > 8 => "80",
      (8, d) if d > 15 => "80",
      _ => "50",
    };
    Self(format!("{:04}{period}", date.year()))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Term {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl TryFrom<String> for Term {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> { Self::parse(&value) }
}

impl From<Term> for String {
  fn from(term: Term) -> Self { term.0 }
}

impl std::str::FromStr for Term {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn parse_accepts_six_digits_only() {
    assert_eq!(Term::parse("202580").unwrap().as_str(), "202580");
    assert_eq!(Term::parse(" 202610 ").unwrap().as_str(), "202610");
    assert!(Term::parse("2025F").is_err());
    assert!(Term::parse("2025800").is_err());
    assert!(Term::parse("20258a").is_err());
  }

  #[test]
  fn current_term_boundaries() {
    assert_eq!(Term::current(date(2025, 1, 10)).as_str(), "202510");
    assert_eq!(Term::current(date(2025, 4, 30)).as_str(), "202510");
    assert_eq!(Term::current(date(2025, 5, 1)).as_str(), "202550");
    assert_eq!(Term::current(date(2025, 8, 15)).as_str(), "202550");
    assert_eq!(Term::current(date(2025, 8, 16)).as_str(), "202580");
    assert_eq!(Term::current(date(2025, 12, 1)).as_str(), "202580");
  }

  #[test]
  fn deserialising_validates() {
    let ok: Term = serde_json::from_str("\"202580\"").unwrap();
    assert_eq!(ok.to_string(), "202580");
    assert!(serde_json::from_str::<Term>("\"fall\"").is_err());
  }
}
