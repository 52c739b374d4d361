//! Pattern classification of raw identifier strings.
//!
//! Rules are ordered and non-overlapping: numeric IDs classify as nothing
//! (they are already canonical and bypass resolution), emails as people,
//! `PRJ-`/`P-` numbers as projects, `DEAL-`/`D-` numbers as deals. Anything
//! else is free text the caller must type explicitly.

use regex::Regex;
use std::sync::OnceLock;

use crate::api::ResourceType;

fn numeric_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^\d+$").expect("valid regex"))
}

fn email_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"))
}

fn project_number_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^(?i)(?:PRJ|P)-(\d+)$").expect("valid regex"))
}

fn deal_number_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^(?i)(?:DEAL|D)-(\d+)$").expect("valid regex"))
}

/// An already-canonical numeric ID. These never go through resolution.
pub fn is_numeric_id(raw: &str) -> bool {
  numeric_re().is_match(raw.trim())
}

pub fn is_email(raw: &str) -> bool {
  email_re().is_match(raw.trim())
}

pub fn is_project_number(raw: &str) -> bool {
  project_number_re().is_match(raw.trim())
}

pub fn is_deal_number(raw: &str) -> bool {
  deal_number_re().is_match(raw.trim())
}

/// Classify a raw identifier string, or `None` when no type can be inferred
/// (canonical numeric IDs and ambiguous free text).
pub fn detect(raw: &str) -> Option<ResourceType> {
  let raw = raw.trim();

  if is_numeric_id(raw) {
    return None;
  }
  if is_email(raw) {
    return Some(ResourceType::Person);
  }
  if is_project_number(raw) {
    return Some(ResourceType::Project);
  }
  if is_deal_number(raw) {
    return Some(ResourceType::Deal);
  }

  None
}

/// Whether a query hits the kind's uniquely-keyed column.
pub fn matches_unique(kind: ResourceType, raw: &str) -> bool {
  match kind {
    ResourceType::Person => is_email(raw),
    ResourceType::Project => is_project_number(raw),
    ResourceType::Deal => is_deal_number(raw),
    ResourceType::Service | ResourceType::Company => false,
  }
}

/// Canonical form of a unique-field value: emails lowercased, project numbers
/// as `PRJ-<digits>`, deal numbers as `D-<digits>`. Both stored columns and
/// incoming queries go through this, so `DEAL-456` and `D-456` meet in the
/// middle.
pub fn normalize_unique(kind: ResourceType, raw: &str) -> String {
  let raw = raw.trim();
  match kind {
    ResourceType::Person => raw.to_lowercase(),
    ResourceType::Project => match project_number_re().captures(raw) {
      Some(caps) => format!("PRJ-{}", &caps[1]),
      None => raw.to_uppercase(),
    },
    ResourceType::Deal => match deal_number_re().captures(raw) {
      Some(caps) => format!("D-{}", &caps[1]),
      None => raw.to_uppercase(),
    },
    ResourceType::Service | ResourceType::Company => raw.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_numeric_ids_detect_as_nothing() {
    assert!(is_numeric_id("123"));
    assert!(is_numeric_id(" 42 "));
    assert_eq!(detect("123"), None);
  }

  #[test]
  fn test_emails_detect_as_person() {
    assert_eq!(detect("jane@example.com"), Some(ResourceType::Person));
    assert!(!is_email("not an email"));
    assert!(!is_email("missing@tld"));
  }

  #[test]
  fn test_project_numbers_detect_as_project() {
    assert_eq!(detect("PRJ-123"), Some(ResourceType::Project));
    assert_eq!(detect("prj-123"), Some(ResourceType::Project));
    assert_eq!(detect("P-7"), Some(ResourceType::Project));
    assert_eq!(detect("PRJ-"), None);
    assert_eq!(detect("PRJ-12a"), None);
  }

  #[test]
  fn test_deal_numbers_detect_as_deal() {
    assert_eq!(detect("D-456"), Some(ResourceType::Deal));
    assert_eq!(detect("DEAL-456"), Some(ResourceType::Deal));
    assert_eq!(detect("deal-1"), Some(ResourceType::Deal));
  }

  #[test]
  fn test_free_text_detects_as_nothing() {
    assert_eq!(detect("Website Redesign"), None);
    assert_eq!(detect(""), None);
  }

  #[test]
  fn test_normalize_project_number() {
    assert_eq!(
      normalize_unique(ResourceType::Project, "p-12"),
      "PRJ-12".to_string()
    );
    assert_eq!(
      normalize_unique(ResourceType::Project, "PRJ-12"),
      "PRJ-12".to_string()
    );
  }

  #[test]
  fn test_normalize_deal_number_equivalence() {
    let short = normalize_unique(ResourceType::Deal, "D-456");
    let long = normalize_unique(ResourceType::Deal, "DEAL-456");
    assert_eq!(short, long);
    assert_eq!(short, "D-456");
  }

  #[test]
  fn test_normalize_email_lowercases() {
    assert_eq!(
      normalize_unique(ResourceType::Person, "Jane@Example.COM "),
      "jane@example.com"
    );
  }
}
