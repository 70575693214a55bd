//! Billing Admin Console Library
//!
//! Operator-side logic for the billing platform: KYB review, SMS pricing, manual/MNO/MPESA
//! top-ups and the dashboard, on top of the external billing API.
//!
//! # Modules
//!
//! - `alerts`: Operator alert sinks.
//! - `billing_client`: HTTP wrapper for the billing API.
//! - `config`: Configuration management.
//! - `envelope`: List envelope normalization.
//! - `errors`: Error handling types.
//! - `events`: Balance-change events and listeners.
//! - `handlers`: Console HTTP handlers.
//! - `models`: Billing data models.
//! - `mutations`: Write layer.
//! - `queries`: Cached read layer.
//! - `query_cache`: Keyed query cache.
//! - `screens`: Page state machines, gates and badges.
//! - `services`: Per-resource service functions.
//! - `session`: Operator credential.
//! - `validation`: Client-side input validation.

pub mod alerts;
pub mod billing_client;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod mutations;
pub mod queries;
pub mod query_cache;
pub mod screens;
pub mod services;
pub mod session;
pub mod validation;
