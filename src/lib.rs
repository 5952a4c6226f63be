//! Local, wire-compatible double of the Amazon S3 HTTP API.
//!
//! `app_state::AppState` wires the pieces below into a single
//! `web::Data<AppState>` that `handlers::dispatch` closes over for every
//! request: `router` resolves addressing, `auth` verifies signatures,
//! `store` holds buckets/objects/configs and `store::listing` implements
//! the paged listing protocol, `cors` and `website` are the
//! bucket-configuration engines, `handlers` hosts the operation table,
//! `events` is the in-process notification bus, and `error` shapes every
//! failure into the XML envelope.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod cors;
pub mod error;
pub mod events;
pub mod handlers;
pub mod router;
pub mod store;
pub mod website;
pub mod xml_util;
