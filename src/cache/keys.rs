//! Cache key and tag naming.
//!
//! Keys are plain strings so the store stays agnostic of the values it holds;
//! the helpers here keep the catalog's key and tag vocabulary in one place so
//! writers invalidate exactly the tags readers attached.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use uuid::Uuid;

/// Tag carried by every list of destinations.
pub const TAG_DESTINATIONS_LIST: &str = "destinations:list";
/// Tag carried by every list of travel packages.
pub const TAG_PACKAGES_LIST: &str = "packages:list";
/// Tag carried by every HTTP response stored by the response cache.
pub const TAG_HTTP: &str = "http";

/// Tag identifying everything derived from one destination.
pub fn destination_tag(id: Uuid) -> String {
    format!("destination:{id}")
}

/// Tag identifying everything derived from one travel package.
pub fn package_tag(id: Uuid) -> String {
    format!("package:{id}")
}

/// Key of a destination list page for the given filter.
pub fn destination_list_key<F: Hash>(filter: &F) -> String {
    format!("destinations:list:{:016x}", hash_value(filter))
}

/// Key of a single destination.
pub fn destination_key(id: Uuid) -> String {
    format!("destinations:item:{id}")
}

/// Key of a package list page for the given filter.
pub fn package_list_key<F: Hash>(filter: &F) -> String {
    format!("packages:list:{:016x}", hash_value(filter))
}

/// Key of a single travel package.
pub fn package_key(id: Uuid) -> String {
    format!("packages:item:{id}")
}

/// Compute a hash for any hashable value.
///
/// `DefaultHasher::new()` is keyed identically on every call, so the result is
/// stable for the lifetime of the process, which is all an in-memory key needs.
pub fn hash_value<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
