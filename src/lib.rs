pub mod auth;
pub mod backend;
pub mod config;
pub mod core;
pub mod db;
pub mod http;
pub mod provider;
pub mod util;
