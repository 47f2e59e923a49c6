//! GeoIP fallback using a MaxMind City MMDB.
//!
//! The primary geolocation source is the platform geo headers on the inbound
//! request; this memory-mapped lookup only fills the gap when those headers
//! are absent and a database path is configured.

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

/// Geo fields the visit fingerprint cares about.
#[derive(Debug, Clone, Default)]
pub struct GeoInfo {
    /// ISO country code (e.g. "US").
    pub country: Option<String>,
    pub city: Option<String>,
    /// Continent code (e.g. "NA", "EU").
    pub continent: Option<String>,
}

pub struct GeoIpService {
    city_reader: Arc<Reader<Mmap>>,
}

impl GeoIpService {
    pub fn new(city_path: &str) -> Result<Self> {
        let reader = unsafe { Reader::open_mmap(city_path) }
            .with_context(|| format!("Failed to open GeoIP City database at {city_path}"))?;
        Ok(Self {
            city_reader: Arc::new(reader),
        })
    }

    /// Lookup geo fields for an IP. Lookup failures yield an empty record,
    /// never an error; missing geo data must not disturb ingestion.
    pub fn lookup(&self, ip: IpAddr) -> GeoInfo {
        let mut info = GeoInfo::default();

        if let Ok(result) = self.city_reader.lookup(ip) {
            if let Ok(Some(city)) = result.decode::<geoip2::City>() {
                info.country = city.country.iso_code.map(|s| s.to_string());
                info.city = city.city.names.english.map(|s| s.to_string());
                info.continent = city.continent.code.map(|s| s.to_string());
            }
        }

        info
    }
}
