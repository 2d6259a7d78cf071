pub mod annotation;
pub mod auth;
pub mod configuration;
pub mod controller;
pub mod dashboard;
pub mod error_handling;
pub mod inspection;
pub mod monitor;
pub mod storage;
pub mod telemetry;
pub mod web_interface;
