//! Per-request tag collector for the response cache.
//!
//! The response middleware opens a collector around each handler run; service
//! code records the tags of whatever it reads, and the stored response is
//! registered under those tags so a write to any of them invalidates it.

use std::cell::RefCell;
use std::collections::HashSet;
use std::future::Future;

tokio::task_local! {
    static DEPS: RefCell<HashSet<String>>;
}

/// Record a tag the current response depends on.
///
/// Silently ignored when no collector is active.
///
/// ```ignore
/// crate::cache::deps::record(keys::destination_tag(id));
/// let destination = self.repo.find_destination(id).await?;
/// ```
pub fn record(tag: impl Into<String>) {
    let _ = DEPS.try_with(|deps| {
        deps.borrow_mut().insert(tag.into());
    });
}

/// Tags recorded so far in the current collector, or empty outside one.
pub fn collect() -> HashSet<String> {
    DEPS.try_with(|deps| deps.borrow().clone())
        .unwrap_or_default()
}

/// Run `f` with a fresh collector; returns its output and the recorded tags.
pub async fn with_collector<F, R>(f: F) -> (R, HashSet<String>)
where
    F: Future<Output = R>,
{
    DEPS.scope(RefCell::new(HashSet::new()), async move {
        let result = f.await;
        (result, collect())
    })
    .await
}
