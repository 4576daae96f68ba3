//! The `hermit.toml` build descriptor and `hermit.lock` lockfile.

pub mod descriptor;
pub mod lockfile;

pub use descriptor::Descriptor;
pub use lockfile::Lockfile;
