pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod log;
pub mod lookup;
pub mod nutrition;
pub mod response;
pub mod state;
pub mod stock;
pub mod targets;
pub mod types;
