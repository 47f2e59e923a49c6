pub mod analytics;
pub mod cache;
pub mod config;
pub mod links;
pub mod models;
pub mod password;
pub mod resolver;
pub mod storage;

pub mod api;
pub mod redirect;
