//! UTC timestamp parsing and the `Z`-suffixed wire format.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Format an instant as ISO-8601 with an explicit `Z` marker.
pub fn iso_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an ISO-8601 timestamp into UTC.
///
/// Offsets (`Z`, `+02:00`) are honoured; a timestamp without any offset is
/// taken to be UTC already.
pub fn parse_utc(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
}

/// `#[serde(with = "utc_z")]` for `DateTime<Utc>` fields.
pub mod utc_z {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::iso_utc(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_utc(&text).map_err(de::Error::custom)
    }
}
