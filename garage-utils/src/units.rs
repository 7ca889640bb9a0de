use chrono::{DateTime, Utc};

pub const KMH_PER_MPH: f64 = 1.609344;

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    parse_display::Display,
    parse_display::FromStr,
    tsify::Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "lowercase")]
#[display(style = "lowercase")]
pub enum Unit {
    #[default]
    Metric,
    Imperial,
}

pub fn kmh_to_mph(kmh: f64) -> f64 {
    kmh / KMH_PER_MPH
}

pub fn mph_to_kmh(mph: f64) -> f64 {
    mph * KMH_PER_MPH
}

/// Convert a speed entered in `unit` back to km/h.
pub fn speed_to_kmh(value: f64, unit: Unit) -> f64 {
    match unit {
        Unit::Metric => value,
        Unit::Imperial => mph_to_kmh(value),
    }
}

/// Speed in the preferred unit, rounded to a whole number.
pub fn format_speed(kmh: f64, unit: Unit) -> String {
    match unit {
        Unit::Metric => format!("{:.0} km/h", kmh),
        Unit::Imperial => format!("{:.0} mph", kmh_to_mph(kmh)),
    }
}

pub fn format_date(date: DateTime<Utc>) -> String {
    date.format("%b %-d, %Y").to_string()
}

/// "just now", "5 minutes ago", ... falling back to [`format_date`] after a week.
pub fn format_relative(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(date);
    let plural = |n: i64, unit: &str| {
        format!("{n} {unit}{} ago", if n == 1 { "" } else { "s" })
    };

    if elapsed.num_seconds() < 60 {
        "just now".to_string()
    } else if elapsed.num_minutes() < 60 {
        plural(elapsed.num_minutes(), "minute")
    } else if elapsed.num_hours() < 24 {
        plural(elapsed.num_hours(), "hour")
    } else if elapsed.num_days() < 7 {
        plural(elapsed.num_days(), "day")
    } else {
        format_date(date)
    }
}

/// [`format_relative`] for an RFC 3339 timestamp as the backend sends it. Unparseable input is
/// returned unchanged.
pub fn format_timestamp(raw: &str, now: DateTime<Utc>) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(date) => format_relative(date.with_timezone(&Utc), now),
        Err(e) => {
            log::warn!("Unparseable timestamp `{raw}`: {e}");
            raw.to_string()
        }
    }
}
