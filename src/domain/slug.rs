//! URL slugs for catalog records.
//!
//! `slug` transliterates non-ASCII input, so "Kyōto" becomes `kyoto`.
//! Uniqueness is checked by the caller's predicate; collisions get a numeric
//! suffix starting at `-2`.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX: usize = 33;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("`{input}` has no characters usable in a slug")]
    Unrepresentable { input: String },
    #[error("no free slug left for `{base}`")]
    Exhausted { base: String },
}

#[derive(Debug, Error)]
pub enum UniqueSlugError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Lookup(E),
}

pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }
    match slugify(input) {
        slug if slug.is_empty() => Err(SlugError::Unrepresentable {
            input: input.to_string(),
        }),
        slug => Ok(slug),
    }
}

/// `base`, then `base-2` through `base-33`.
fn candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string())
        .chain((2..=MAX_SUFFIX).map(move |suffix| format!("{base}-{suffix}")))
}

/// First candidate slug for `input` that `is_free` accepts.
pub async fn unique_slug<F, Fut, E>(
    input: &str,
    mut is_free: F,
) -> Result<String, UniqueSlugError<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;
    for candidate in candidates(&base) {
        if is_free(candidate.clone())
            .await
            .map_err(UniqueSlugError::Lookup)?
        {
            return Ok(candidate);
        }
    }
    Err(SlugError::Exhausted { base }.into())
}
