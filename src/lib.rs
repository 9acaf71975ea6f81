//! ocisave
//! =======
//!
//! Pull container images from an OCI/Docker registry and save them locally,
//! either as a `docker save` style tarball, a legacy (pre-1.10 docker)
//! tarball, or an [OCI image layout] directory.
//!
//! [OCI image layout]: https://github.com/opencontainers/image-spec/blob/main/image-layout.md

pub mod config;
pub mod distribution;
pub mod error;
pub mod image;
pub mod pull;

mod digest;
mod image_name;
mod name;
mod reference;
mod tag;

pub use config::PullConfig;
pub use digest::Digest;
pub use image_name::ImageName;
pub use name::Name;
pub use pull::{pull, Format};
pub use reference::{RefKind, Reference};
pub use tag::Tag;
