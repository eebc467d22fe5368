//! Client for the UVSQ CAS portal: bulletin login and IUT de Vélizy timetable scraping.

pub mod auth;
pub mod config;
pub mod fmt;
pub mod json;
pub mod portal;
pub mod relay;
pub mod session;
pub mod timetable;

pub use portal::{Portal, PortalError};
