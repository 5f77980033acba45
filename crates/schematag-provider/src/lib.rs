//! # Tag Provider
//!
//! The seam between generated UDT definitions and the gateway that stores
//! them.
//!
//! ## Providers
//!
//! - `FileTagProvider`: writes tag JSON files below a directory tree
//! - `HttpTagProvider`: imports through the gateway's tag import endpoint
//! - `MemoryTagProvider`: in-process store, for tests and dry runs
//!
//! `UdtSynchronizer` drives any of them: nested types first, then the main
//! type, always with the `Overwrite` collision policy.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod file;
pub mod http;
pub mod memory;
pub mod path;
pub mod provider;
pub mod sync;

pub use file::FileTagProvider;
pub use http::{HttpProviderConfig, HttpTagProvider};
pub use memory::MemoryTagProvider;
pub use path::{CollisionPolicy, QualityCode, TagPath};
pub use provider::{AnyTagProvider, ProviderError, TagProvider};
pub use sync::{UdtSynchronizer, TYPES_FOLDER};
