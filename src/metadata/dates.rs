use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

pub const ISO_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const DATE_TIME_FORMATS: [&str; 9] = [
    "%Y:%m:%d %H:%M:%S",
    "%Y:%m:%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y:%m:%d", "%Y-%m-%d", "%Y.%m.%d"];

/// Normalizes an image date (EXIF, IPTC or service output) to
/// `yyyy-MM-ddTHH:mm:ssZ`, interpreted as UTC. Dates in the future are
/// clamped to now.
pub fn normalize_date(value: &str) -> Option<String> {
    normalize_date_at(value, Utc::now())
}

pub fn normalize_date_at(value: &str, now: DateTime<Utc>) -> Option<String> {
    let parsed = parse_date(value.trim())?;
    let date = Utc.from_utc_datetime(&parsed).min(now);
    Some(date.format(ISO_DATE_FORMAT).to_string())
}

fn parse_date(value: &str) -> Option<NaiveDateTime> {
    if value.is_empty() {
        return None;
    }

    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .or_else(|| parse_partial_date(value))
}

/// `yyyyMMdd`, `yyyy-MM` and `yyyy`.
fn parse_partial_date(value: &str) -> Option<NaiveDateTime> {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    let date = match value.len() {
        8 if digits(value) => NaiveDate::from_ymd_opt(
            value[0..4].parse().ok()?,
            value[4..6].parse().ok()?,
            value[6..8].parse().ok()?,
        ),
        4 if digits(value) => NaiveDate::from_ymd_opt(value.parse().ok()?, 1, 1),
        _ => {
            let (year, month) = value.split_once('-')?;
            if year.len() != 4 || !digits(year) || month.len() > 2 || !digits(month) {
                return None;
            }
            NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
        }
    }?;
    date.and_hms_opt(0, 0, 0)
}
