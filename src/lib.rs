//! # Turnstile (Session & Token Lifecycle)
//!
//! `turnstile` issues, validates, rotates and revokes credentials for the users
//! of a networked service.
//!
//! ## Credentials
//!
//! - **Access credential:** a short-lived `HS256` JWT carrying the subject id,
//!   issued-at and expiry. Stateless: validity is signature + expiry only.
//! - **Refresh token:** a 256-bit opaque random value stored server side, at
//!   most one per subject. Every refresh consumes the presented token and
//!   stores its replacement in a single step, so a replayed token is rejected.
//!
//! ## Revocation
//!
//! Logout deletes the subject's refresh token, and so do a password change and
//! account deletion. Access credentials that were
//! already issued stay valid until their natural expiry, so keep the access
//! lifetime short when immediate revocation matters.

pub mod accounts;
pub mod api;
pub mod cli;
pub mod db;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
