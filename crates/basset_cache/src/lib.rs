//! # basset_cache
//!
//! The durable half of Basset: a mapping from [`AssetKey`] to [`CacheEntry`]
//! that is loaded once at startup and saved atomically at shutdown.
//!
//! Loading never fails. A missing file starts an empty map, a garbled file is
//! discarded with a warning, and individual unreadable records are dropped
//! while the rest of the map survives.

mod entry;
mod error;
mod key;
mod map;

pub use entry::{CacheEntry, SourceKind};
pub use error::CacheError;
pub use key::{AssetKey, fingerprint};
pub use map::{CACHE_MAP_VERSION, CacheMap, Lookup};
