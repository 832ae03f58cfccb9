//! Version 2 of the aws cli prints timestamps as ISO 8601 strings, version 1 prints fractional seconds since the
//! epoch. The log service always uses integer milliseconds.

use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Text(String),
    Seconds(f64),
}

fn from_seconds(seconds: f64) -> Option<time::OffsetDateTime> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    // Round the fraction separately, the full value in nanoseconds exceeds f64 precision.
    let nanos = ((seconds - whole) * 1e9).round() as i64;
    time::OffsetDateTime::from_unix_timestamp(whole as i64)
        .ok()?
        .checked_add(time::Duration::nanoseconds(nanos))
}

pub fn from_millis(millis: i64) -> Option<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

pub mod option {
    use serde::de::Error as _;

    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<time::OffsetDateTime>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => None,
            Some(Raw::Text(text)) => Some(
                time::OffsetDateTime::parse(&text, &time::format_description::well_known::Rfc3339)
                    .map_err(D::Error::custom)?,
            ),
            Some(Raw::Seconds(seconds)) => Some(from_seconds(seconds).ok_or_else(|| {
                D::Error::custom(format!("timestamp {seconds} is out of range"))
            })?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(default, with = "option")]
        at: Option<time::OffsetDateTime>,
    }

    #[test]
    fn parses_both_cli_formats() {
        let text: Wrapper =
            serde_json::from_str(r#"{"at": "2024-05-01T10:20:30.500000+00:00"}"#).unwrap();
        let seconds: Wrapper = serde_json::from_str(r#"{"at": 1714558830.5}"#).unwrap();
        assert_eq!(text.at, seconds.at);
        assert_eq!(
            text.at.unwrap(),
            time::macros::datetime!(2024-05-01 10:20:30.5 UTC)
        );

        let missing: Wrapper = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.at, None);
    }

    #[test]
    fn parses_millis() {
        assert_eq!(
            from_millis(1_714_558_830_500),
            Some(time::macros::datetime!(2024-05-01 10:20:30.5 UTC))
        );
    }
}
