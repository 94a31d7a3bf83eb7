//! vpnscope: connectivity monitor for an OpenVPN self-service portal.
//!
//! Detects whether this device is routed through the portal's VPN, polls the
//! origin server's health, and runs DNS, connectivity and stability
//! diagnostics against it.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod state;
