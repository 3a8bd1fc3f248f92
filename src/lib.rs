pub mod admin;
pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod images;
pub mod monitoring;
pub mod profile;
pub mod rate_limit;
pub mod security;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod users;
