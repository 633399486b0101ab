//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{Destination, TravelPackage};

#[derive(Debug, Clone, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Destination list filter. Also the identity of a cached list page, so two
/// equal filters must hash equally; see [`DestinationFilter::normalized`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationFilter {
    pub country: Option<String>,
    pub featured: Option<bool>,
    pub search: Option<String>,
}

impl DestinationFilter {
    pub fn normalized(self) -> Self {
        Self {
            country: normalize(self.country).map(|country| country.to_ascii_uppercase()),
            featured: self.featured,
            search: normalize(self.search).map(|search| search.to_lowercase()),
        }
    }

    pub fn matches(&self, destination: &Destination) -> bool {
        if let Some(country) = self.country.as_deref()
            && destination.country != country
        {
            return false;
        }
        if let Some(featured) = self.featured
            && destination.featured != featured
        {
            return false;
        }
        if let Some(search) = self.search.as_deref() {
            let name = destination.name.to_lowercase();
            let summary = destination.summary.to_lowercase();
            if !name.contains(search) && !summary.contains(search) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageFilter {
    pub destination_id: Option<Uuid>,
    pub active: Option<bool>,
    pub max_price_cents: Option<i64>,
    pub currency: Option<String>,
}

impl PackageFilter {
    pub fn normalized(self) -> Self {
        Self {
            destination_id: self.destination_id,
            active: self.active,
            max_price_cents: self.max_price_cents,
            currency: normalize(self.currency).map(|currency| currency.to_ascii_uppercase()),
        }
    }

    pub fn matches(&self, package: &TravelPackage) -> bool {
        if let Some(destination_id) = self.destination_id
            && package.destination_id != destination_id
        {
            return false;
        }
        if let Some(active) = self.active
            && package.active != active
        {
            return false;
        }
        if let Some(max) = self.max_price_cents
            && package.price_cents > max
        {
            return false;
        }
        if let Some(currency) = self.currency.as_deref()
            && package.currency != currency
        {
            return false;
        }
        true
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[async_trait]
pub trait CatalogRepo: Send + Sync {
    async fn list_destinations(
        &self,
        filter: &DestinationFilter,
    ) -> Result<Vec<Destination>, RepoError>;

    async fn find_destination(&self, id: Uuid) -> Result<Option<Destination>, RepoError>;

    async fn find_destination_by_slug(&self, slug: &str)
    -> Result<Option<Destination>, RepoError>;

    async fn insert_destination(&self, record: Destination) -> Result<Destination, RepoError>;

    async fn update_destination(&self, record: Destination) -> Result<Destination, RepoError>;

    /// Delete a destination together with its packages; returns the ids of
    /// the packages removed alongside it.
    async fn delete_destination(&self, id: Uuid) -> Result<Vec<Uuid>, RepoError>;

    async fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<TravelPackage>, RepoError>;

    async fn find_package(&self, id: Uuid) -> Result<Option<TravelPackage>, RepoError>;

    async fn insert_package(&self, record: TravelPackage) -> Result<TravelPackage, RepoError>;

    async fn update_package(&self, record: TravelPackage) -> Result<TravelPackage, RepoError>;

    async fn delete_package(&self, id: Uuid) -> Result<(), RepoError>;
}
