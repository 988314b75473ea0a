//! Value types as they cross the RQL wire.
//!
//! - GUIDs are 32 upper-case hex digits without dashes.
//! - Booleans are `"1"` / `"0"` (some replies use `"true"` / `"false"`).
//! - Timestamps are OLE automation dates: fractional days since 1899-12-30.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::error::RqlError;

// ============================================================================
// GUID
// ============================================================================

/// Identity of a server-side object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Guid(Uuid);

impl Guid {
    /// The all-zero GUID, which the server uses for "no object".
    pub const fn nil() -> Self {
        Guid(Uuid::nil())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Guid(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Parse an optional attribute value; empty strings and the nil GUID map to `None`.
    pub fn parse_optional(value: &str) -> Option<Guid> {
        value.parse::<Guid>().ok().filter(|g| !g.is_nil())
    }
}

impl FromStr for Guid {
    type Err = RqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Uuid::try_parse(trimmed)
            .map(Guid)
            .map_err(|_| RqlError::InvalidGuid(trimmed.to_string()))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0.simple())
    }
}

impl From<Uuid> for Guid {
    fn from(uuid: Uuid) -> Self {
        Guid(uuid)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Guid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Guid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Booleans
// ============================================================================

/// Encode a boolean the way RQL attributes expect it.
pub fn rql_bool(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Decode an RQL boolean attribute.
pub fn parse_rql_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "-1" => Some(true),
        "0" | "" => Some(false),
        other if other.eq_ignore_ascii_case("true") => Some(true),
        other if other.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

// ============================================================================
// OLE automation dates
// ============================================================================

/// Largest OLE date the server produces (9999-12-31).
const MAX_OLE_DATE: f64 = 2_958_465.999_999;

fn ole_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)
}

/// Convert an OLE automation date into a timestamp.
///
/// The integral part counts days from 1899-12-30; the fractional part is the
/// time of day, and is added even for negative dates.
pub fn ole_date_to_datetime(value: f64) -> Option<NaiveDateTime> {
    if !value.is_finite() || value.abs() > MAX_OLE_DATE {
        return None;
    }
    let days = value.trunc() as i64;
    let millis = (value.fract().abs() * 86_400_000.0).round() as i64;
    ole_epoch()?
        .checked_add_signed(Duration::days(days))?
        .checked_add_signed(Duration::milliseconds(millis))
}

/// Parse an OLE date attribute value (`"45123.5"`).
pub fn parse_ole_date(value: &str) -> Option<NaiveDateTime> {
    value.trim().parse::<f64>().ok().and_then(ole_date_to_datetime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_guid_display_is_upper_simple() {
        let guid: Guid = "6d3b5c1e-22a1-4f77-9cbb-0e2f2a1b3c4d".parse().unwrap();
        assert_eq!(guid.to_string(), "6D3B5C1E22A14F779CBB0E2F2A1B3C4D");
    }

    #[test]
    fn test_guid_parses_wire_format() {
        let guid: Guid = "6D3B5C1E22A14F779CBB0E2F2A1B3C4D".parse().unwrap();
        let again: Guid = guid.to_string().parse().unwrap();
        assert_eq!(guid, again);
    }

    #[test]
    fn test_guid_rejects_garbage() {
        assert!(matches!(
            "not-a-guid".parse::<Guid>(),
            Err(RqlError::InvalidGuid(s)) if s == "not-a-guid"
        ));
    }

    #[test]
    fn test_optional_guid() {
        assert_eq!(Guid::parse_optional(""), None);
        assert_eq!(Guid::parse_optional("00000000000000000000000000000000"), None);
        assert!(Guid::parse_optional("6D3B5C1E22A14F779CBB0E2F2A1B3C4D").is_some());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_guid_serde_uses_wire_form() {
        let guid: Guid = "6d3b5c1e-22a1-4f77-9cbb-0e2f2a1b3c4d".parse().unwrap();
        let json = serde_json::to_string(&guid).unwrap();
        assert_eq!(json, r#""6D3B5C1E22A14F779CBB0E2F2A1B3C4D""#);
        assert_eq!(serde_json::from_str::<Guid>(&json).unwrap(), guid);
        assert!(serde_json::from_str::<Guid>(r#""not-a-guid""#).is_err());
    }

    #[test]
    fn test_rql_bool() {
        assert_eq!(rql_bool(true), "1");
        assert_eq!(rql_bool(false), "0");
        assert_eq!(parse_rql_bool("1"), Some(true));
        assert_eq!(parse_rql_bool("0"), Some(false));
        assert_eq!(parse_rql_bool("True"), Some(true));
        assert_eq!(parse_rql_bool("maybe"), None);
    }

    #[test]
    fn test_ole_date_epoch_and_known_dates() {
        let epoch = ole_date_to_datetime(0.0).unwrap();
        assert_eq!(epoch.to_string(), "1899-12-30 00:00:00");

        // 2000-01-01 is day 36526
        let y2k = ole_date_to_datetime(36526.0).unwrap();
        assert_eq!(y2k.date(), NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());

        let noon = ole_date_to_datetime(36526.5).unwrap();
        assert_eq!(noon.hour(), 12);
        assert_eq!(noon.minute(), 0);
    }

    #[test]
    fn test_ole_date_negative_fraction_is_time_of_day() {
        // -1.25 is 1899-12-29 06:00
        let dt = ole_date_to_datetime(-1.25).unwrap();
        assert_eq!(dt.to_string(), "1899-12-29 06:00:00");
    }

    #[test]
    fn test_ole_date_recent() {
        let dt = NaiveDate::from_ymd_opt(2023, 7, 14)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();
        assert_eq!(parse_ole_date("45121.75"), Some(dt));
    }

    #[test]
    fn test_ole_date_rejects_out_of_range() {
        assert_eq!(ole_date_to_datetime(f64::NAN), None);
        assert_eq!(ole_date_to_datetime(1e12), None);
        assert_eq!(parse_ole_date("abc"), None);
        assert!(parse_ole_date(" 36526.0 ").is_some());
    }
}
