//! Session lifecycle: credential codec, refresh token storage and the manager
//! that ties them to accounts.

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod manager;
pub mod store;
pub mod sweep;

pub use clock::{Clock, SystemClock};
pub use codec::CredentialCodec;
pub use config::{parse_duration, SessionConfig};
pub use error::AuthError;
pub use manager::{SessionManager, TokenPair};
pub use sweep::spawn_sweeper;
