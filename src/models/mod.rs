pub mod link;
pub mod plan;

pub use link::{cache_key, Link, LinkUpdate, LinkVisit, NewLink, NewVisit};
pub use plan::{Owner, Plan};
