//! Best-effort location of the caller, derived from edge-network request headers.

use serde::Serialize;

pub const LATITUDE_HEADER: &str = "x-vercel-ip-latitude";
pub const LONGITUDE_HEADER: &str = "x-vercel-ip-longitude";
pub const CITY_HEADER: &str = "x-vercel-ip-city";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeoHint {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
}

impl GeoHint {
    /// Build a hint from raw header values. Values that are missing or fail to parse
    /// are left absent.
    pub fn from_header_values(
        latitude: Option<&str>,
        longitude: Option<&str>,
        city: Option<&str>,
    ) -> Self {
        let coordinate = |raw: Option<&str>| raw.and_then(|v| v.trim().parse::<f64>().ok());
        let city = city
            .and_then(|raw| urlencoding::decode(raw).ok())
            .map(|decoded| decoded.trim().to_string())
            .filter(|decoded| !decoded.is_empty());

        Self {
            latitude: coordinate(latitude),
            longitude: coordinate(longitude),
            city,
        }
    }
}
