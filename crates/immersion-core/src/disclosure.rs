//! Contact disclosure on search results.
//!
//! Unauthorized callers get no `contact_details` key at all, so "no contact on
//! file" and "not allowed to see it" look the same on the wire. Whether the
//! caller is authorized is decided upstream (API-consumer credentials).

use crate::search::SearchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactDisclosurePolicy {
  include_contact_details: bool,
}

impl ContactDisclosurePolicy {
  pub fn new(include_contact_details: bool) -> Self { Self { include_contact_details } }

  pub fn apply(&self, mut result: SearchResult) -> SearchResult {
    if !self.include_contact_details {
      result.contact_details = None;
    }
    result
  }
}
