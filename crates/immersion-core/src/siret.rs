//! `Siret`: the 14-digit business identifier keying every establishment.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// A validated siret: exactly 14 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Siret(String);

impl Siret {
  pub const LEN: usize = 14;

  pub fn as_str(&self) -> &str { &self.0 }
}

impl FromStr for Siret {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.len() == Self::LEN && s.bytes().all(|b| b.is_ascii_digit()) {
      Ok(Self(s.to_owned()))
    } else {
      Err(Error::InvalidSiret(s.to_owned()))
    }
  }
}

impl TryFrom<String> for Siret {
  type Error = Error;

  fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<Siret> for String {
  fn from(siret: Siret) -> Self { siret.0 }
}

impl fmt::Display for Siret {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
