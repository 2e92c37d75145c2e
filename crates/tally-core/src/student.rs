//! Student identity records.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Demographics as they arrive from a section export. Everything but the
/// organization id is optional; the store uses whatever is present to fill
/// gaps in the persisted [`Student`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentInfo {
  pub org_id:     String,
  #[serde(default)]
  pub username:   Option<String>,
  #[serde(default)]
  pub first_name: Option<String>,
  #[serde(default)]
  pub last_name:  Option<String>,
  #[serde(default)]
  pub email:      Option<String>,
}

impl StudentInfo {
  pub fn new(org_id: impl Into<String>) -> Self {
    Self { org_id: org_id.into(), ..Self::default() }
  }

  /// Clean the record the way LMS exports need: strip the `#` prefix from
  /// the id, lower-case the email, and derive a missing username from the
  /// email's local part. Blank strings become `None`.
  pub fn normalized(self) -> Result<Self> {
    let org_id = normalize_org_id(&self.org_id)?;
    let email = non_blank(self.email).map(|e| e.to_lowercase());
    let username = non_blank(self.username).or_else(|| {
      email
        .as_deref()
        .and_then(|e| e.split('@').next())
        .filter(|local| !local.is_empty())
        .map(str::to_owned)
    });

    Ok(Self {
      org_id,
      username,
      first_name: non_blank(self.first_name),
      last_name: non_blank(self.last_name),
      email,
    })
  }
}

/// A persisted student. `org_id` is the stable primary key; `username` is
/// unique when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
  pub org_id:     String,
  pub username:   Option<String>,
  pub first_name: Option<String>,
  pub last_name:  Option<String>,
  pub email:      Option<String>,
}

impl Student {
  /// Fill fields that are still missing from `info`. Present fields are never
  /// overwritten. Returns whether anything changed.
  pub fn fill_missing(&mut self, info: &StudentInfo) -> bool {
    let mut changed = false;
    for (slot, incoming) in [
      (&mut self.username, &info.username),
      (&mut self.first_name, &info.first_name),
      (&mut self.last_name, &info.last_name),
      (&mut self.email, &info.email),
    ] {
      if slot.is_none() && incoming.is_some() {
        slot.clone_from(incoming);
        changed = true;
      }
    }
    changed
  }
}

impl From<StudentInfo> for Student {
  fn from(info: StudentInfo) -> Self {
    Self {
      org_id:     info.org_id,
      username:   info.username,
      first_name: info.first_name,
      last_name:  info.last_name,
      email:      info.email,
    }
  }
}

/// Validate and clean an organization id.
pub fn normalize_org_id(raw: &str) -> Result<String> {
  let id: String = raw.trim().chars().filter(|c| *c != '#').collect();
  let valid = !id.is_empty()
    && id.len() <= 20
    && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
  if valid {
    Ok(id)
  } else {
    Err(Error::InvalidIdentifier(raw.to_owned()))
  }
}

fn non_blank(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}
