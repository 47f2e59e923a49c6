//! Device and geolocation extraction from inbound request headers.
//!
//! Extraction is a pure function of the request: user-agent parsing via
//! woothee, geolocation from the hosting platform's geo headers with an
//! optional MMDB fallback. Missing headers degrade to `None`, never to an
//! error.

use axum::http::HeaderMap;
use std::net::IpAddr;
use woothee::parser::Parser;

use crate::analytics::geoip::GeoIpService;

/// Owned snapshot of everything the ingestion pipeline needs from a request.
///
/// The pipeline runs on a detached task after the redirect response has been
/// sent, so it cannot borrow the request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    /// Client IP as reported by forwarded-for headers (socket address as a
    /// fallback). Hashed for unique-visitor dedup; also feeds the GeoIP
    /// fallback.
    pub client_ip: String,
    pub header_country: Option<String>,
    pub header_city: Option<String>,
    pub header_continent: Option<String>,
}

impl RequestContext {
    pub fn from_request(headers: &HeaderMap, socket_ip: IpAddr) -> Self {
        Self {
            user_agent: header_string(headers, "user-agent"),
            referer: header_string(headers, "referer"),
            client_ip: client_ip(headers, socket_ip),
            header_country: header_string(headers, "x-vercel-ip-country")
                .or_else(|| header_string(headers, "cf-ipcountry")),
            header_city: header_string(headers, "x-vercel-ip-city"),
            header_continent: header_string(headers, "x-vercel-ip-continent"),
        }
    }
}

/// Structured visit fingerprint persisted as a `LinkVisit` row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitFingerprint {
    pub device: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub model: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub continent: Option<String>,
    /// Raw referer value. The "null"/empty → "Direct" mapping is a
    /// presentation concern, applied by [`display_referer`] downstream.
    pub referer: Option<String>,
}

impl VisitFingerprint {
    pub fn from_context(ctx: &RequestContext, geoip: Option<&GeoIpService>) -> Self {
        let (browser, os, device, model) = parse_user_agent(ctx.user_agent.as_deref());

        let mut country = ctx.header_country.clone();
        let mut city = ctx.header_city.clone();
        let mut continent = ctx.header_continent.clone();

        // Header-less deployments fall back to a local MMDB lookup.
        if country.is_none() && city.is_none() {
            if let Some(geoip) = geoip {
                if let Ok(ip) = ctx.client_ip.parse::<IpAddr>() {
                    let info = geoip.lookup(ip);
                    country = info.country;
                    city = info.city;
                    continent = continent.or(info.continent);
                }
            }
        }

        Self {
            device,
            os,
            browser,
            model,
            country,
            city,
            continent,
            referer: ctx.referer.clone(),
        }
    }
}

/// Referer as shown to dashboard readers: absent, empty and the literal
/// string "null" all collapse to the "Direct" sentinel.
pub fn display_referer(referer: Option<&str>) -> &str {
    match referer {
        None | Some("") | Some("null") => "Direct",
        Some(r) => r,
    }
}

/// Client IP preferring forwarded-for style headers, first entry wins.
pub fn client_ip(headers: &HeaderMap, socket_ip: IpAddr) -> String {
    if let Some(xff) = header_string(headers, "x-forwarded-for") {
        if let Some(ip) = xff.split(',').next().map(str::trim) {
            if !ip.is_empty() {
                return ip.to_owned();
            }
        }
    }

    if let Some(real_ip) = header_string(headers, "x-real-ip") {
        if !real_ip.is_empty() {
            return real_ip;
        }
    }

    socket_ip.to_string()
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Parse a user-agent with woothee into `(browser, os, device, model)`.
/// Woothee reports the vendor rather than a hardware model; that is the
/// closest field available and is stored as the model.
fn parse_user_agent(
    ua: Option<&str>,
) -> (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
) {
    let ua = match ua {
        Some(s) if !s.is_empty() => s,
        _ => return (None, None, None, None),
    };

    match Parser::new().parse(ua) {
        Some(result) => (
            known(result.name),
            known(result.os),
            known(result.category),
            known(result.vendor),
        ),
        None => (None, None, None, None),
    }
}

fn known(value: &str) -> Option<String> {
    if value.is_empty() || value == "UNKNOWN" {
        None
    } else {
        Some(value.to_owned())
    }
}
