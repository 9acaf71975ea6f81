//! Pull images from an OCI registry based on [OCI distribution specification](https://github.com/opencontainers/distribution-spec)

mod auth;
mod client;

pub use auth::{AuthChallenge, StoredAuth};
pub use client::Client;
