//! Author identities and timezone resolution
//!
//! CVS records only a bare login per delta. An externally supplied author
//! dictionary maps those keys to full identities; anything the dictionary
//! misses falls back to a synthetic `key <key>` identity in UTC so the
//! stream never loses a commit over a missing map entry.
//!
//! Timezones are resolved through a static table instead of mutating `TZ`:
//! a zone name maps to a fixed UTC offset, numeric `+HHMM`/`-HHMM` forms
//! are parsed directly, and unknown names fall back to UTC.

use chrono::{FixedOffset, Offset, Utc};
use derive_new::new;
use std::collections::HashMap;

/// Full identity for one author key.
#[derive(Debug, Clone, Eq, PartialEq, new)]
pub struct AuthorEntry {
    pub full_name: String,
    pub email: String,
    /// Zone name resolved through [`zone_offset`]; empty means UTC.
    pub timezone: String,
}

impl AuthorEntry {
    /// Synthesize an identity for a key the dictionary does not know.
    pub fn fallback(key: &str) -> Self {
        AuthorEntry::new(key.to_string(), key.to_string(), String::new())
    }

    /// Format name and email the way the stream wants them.
    ///
    /// # Returns
    ///
    /// String in format "Name <email@example.com>"
    pub fn display_name(&self) -> String {
        format!("{} <{}>", self.full_name, self.email)
    }

    pub fn offset(&self) -> FixedOffset {
        zone_offset(&self.timezone)
    }
}

/// Author dictionary keyed by CVS login.
#[derive(Debug, Default)]
pub struct AuthorMap {
    entries: HashMap<String, AuthorEntry>,
}

impl AuthorMap {
    pub fn new() -> Self {
        AuthorMap::default()
    }

    pub fn insert(&mut self, key: &str, entry: AuthorEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    pub fn lookup(&self, key: &str) -> Option<&AuthorEntry> {
        self.entries.get(key)
    }

    /// Resolve a key, synthesizing a fallback identity on a miss.
    pub fn resolve(&self, key: &str) -> AuthorEntry {
        self.lookup(key)
            .cloned()
            .unwrap_or_else(|| AuthorEntry::fallback(key))
    }
}

/// Fixed UTC offsets for the zone names author maps actually contain.
///
/// POSIX-style composites (`EST5EDT`) resolve to their standard offset;
/// daylight shifts are not modeled.
static ZONE_OFFSETS: phf::Map<&'static str, i32> = phf::phf_map! {
    "UTC" => 0,
    "GMT" => 0,
    "EST" => -5 * 3600,
    "EDT" => -4 * 3600,
    "CST" => -6 * 3600,
    "CDT" => -5 * 3600,
    "MST" => -7 * 3600,
    "MDT" => -6 * 3600,
    "PST" => -8 * 3600,
    "PDT" => -7 * 3600,
    "EST5EDT" => -5 * 3600,
    "CST6CDT" => -6 * 3600,
    "MST7MDT" => -7 * 3600,
    "PST8PDT" => -8 * 3600,
    "CET" => 3600,
    "EET" => 2 * 3600,
    "America/New_York" => -5 * 3600,
    "America/Chicago" => -6 * 3600,
    "America/Denver" => -7 * 3600,
    "America/Los_Angeles" => -8 * 3600,
    "Europe/London" => 0,
    "Europe/Paris" => 3600,
    "Europe/Berlin" => 3600,
    "Asia/Tokyo" => 9 * 3600,
    "Australia/Sydney" => 10 * 3600,
};

/// Resolve a zone name to a fixed UTC offset.
///
/// Accepts numeric `+HHMM`/`-HHMM` forms and the names in the static zone
/// table, and falls back to UTC for anything else (including the empty
/// string).
pub fn zone_offset(zone: &str) -> FixedOffset {
    let utc = Utc.fix();

    if zone.is_empty() {
        return utc;
    }
    if let Some(seconds) = parse_numeric_offset(zone) {
        return FixedOffset::east_opt(seconds).unwrap_or(utc);
    }
    match ZONE_OFFSETS.get(zone) {
        Some(&seconds) => FixedOffset::east_opt(seconds).unwrap_or(utc),
        None => {
            log::warn!("unknown timezone {:?}, falling back to UTC", zone);
            utc
        }
    }
}

fn parse_numeric_offset(zone: &str) -> Option<i32> {
    let (sign, digits) = match zone.split_at_checked(1)? {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    Some(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("UTC", 0)]
    #[case("EST", -5 * 3600)]
    #[case("EST5EDT", -5 * 3600)]
    #[case("Asia/Tokyo", 9 * 3600)]
    #[case("+0230", 2 * 3600 + 30 * 60)]
    #[case("-0700", -7 * 3600)]
    fn known_zones_resolve(#[case] zone: &str, #[case] seconds: i32) {
        assert_eq!(zone_offset(zone).local_minus_utc(), seconds);
    }

    #[rstest]
    #[case("")]
    #[case("Mars/Olympus_Mons")]
    #[case("+12")]
    #[case("0500")]
    fn unknown_zones_fall_back_to_utc(#[case] zone: &str) {
        assert_eq!(zone_offset(zone).local_minus_utc(), 0);
    }

    #[test]
    fn missing_author_synthesizes_identity() {
        let map = AuthorMap::new();
        let entry = map.resolve("jrh");

        assert_eq!(entry.display_name(), "jrh <jrh>");
        assert_eq!(entry.offset().local_minus_utc(), 0);
    }

    #[test]
    fn known_author_resolves_to_dictionary_entry() {
        let mut map = AuthorMap::new();
        map.insert(
            "esr",
            AuthorEntry::new(
                "Eric S. Raymond".to_string(),
                "esr@thyrsus.com".to_string(),
                "EST5EDT".to_string(),
            ),
        );

        let entry = map.resolve("esr");
        assert_eq!(entry.display_name(), "Eric S. Raymond <esr@thyrsus.com>");
        assert_eq!(entry.offset().local_minus_utc(), -5 * 3600);
    }
}
