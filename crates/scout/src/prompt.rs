use chrono::{DateTime, TimeZone};
use serde::Serialize;
use tera::Error as TeraError;

use crate::geo::GeoHint;
use crate::prompt_template::load_prompt;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const UNKNOWN: &str = "unknown";

#[derive(Serialize)]
struct SystemContext {
    city: String,
    latitude: String,
    longitude: String,
    date: String,
}

/// Format a timestamp as `YYYY-Mon-DD (Weekday)`, e.g. `2024-Jun-20 (Thu)`
pub fn format_date<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%Y-%b-%d (%a)").to_string()
}

/// Assemble the system instruction for one request
pub fn system_prompt<Tz: TimeZone>(now: &DateTime<Tz>, geo: &GeoHint) -> Result<String, TeraError>
where
    Tz::Offset: std::fmt::Display,
{
    let context = SystemContext {
        city: geo.city.clone().unwrap_or_else(|| UNKNOWN.to_string()),
        latitude: geo
            .latitude
            .map(|v| v.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        longitude: geo
            .longitude
            .map(|v| v.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        date: format_date(now),
    };
    load_prompt(SYSTEM_TEMPLATE, &context)
}
