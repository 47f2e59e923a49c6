//! Analytics ingestion for the redirect hot path.
//!
//! A qualifying visit flows through a fixed pipeline: bot filter → usage
//! meter → device/geo fingerprint → visit insert → unique-visitor dedup.
//! Each stage can short-circuit the rest; none of them may fail the
//! redirect itself.

pub mod bot;
pub mod device;
pub mod geoip;
pub mod recorder;
pub mod usage;

pub use device::{RequestContext, VisitFingerprint};
pub use geoip::GeoIpService;
pub use recorder::{hash_ip, VisitOutcome, VisitRecorder};
pub use usage::{EventUsage, UsageAlert, UsageMeter};
