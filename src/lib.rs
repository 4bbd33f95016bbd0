//! cert-expiry - inactivity-based expiration dates for on-chain certificates.
//!
//! # Overview
//!
//! A certificate stays valid while its holder keeps using their account. It
//! expires at the end of the first run of 180 (configurable) consecutive days
//! without on-chain activity after issuance; if there never was such a run, it
//! expires 180 days after the most recent activity.
//!
//! # Modules
//!
//! - [`expiration`]: the inactivity-window algorithm and its calculator
//! - [`data_sources`]: where activity history comes from
//! - [`storage`]: SQLite activity index and issuance records
//! - [`model`]: data types and API bodies
//! - [`api`]: HTTP API handlers
//! - [`config`]: environment configuration
//! - [`error`]: error types

pub mod api;
pub mod config;
pub mod data_sources;
pub mod error;
pub mod expiration;
pub mod model;
pub mod storage;
