//! # authgate
//!
//! Session service and edge gateway for a small set of HTTP services.
//!
//! - `auth`: credential hashing, verification codes, access tokens, the
//!   refresh token ledger and the session service on top of them
//! - `db` / `ephemeral`: durable and short-lived stores (Postgres or memory)
//! - `email`: queued, retried outbound mail
//! - `handlers` / `app`: the `/auth` HTTP surface
//! - `gateway`: prefix routing with bearer verification and `X-User-ID`

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod ephemeral;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod logging;
pub mod response;

#[cfg(test)]
pub(crate) mod testing;
