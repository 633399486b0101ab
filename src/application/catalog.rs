//! Catalog reads and writes, cached through the shared [`Cache`].
//!
//! Reads go through `get_or_set` and record their tags with
//! [`deps::record`] so the response cache can tag whole HTTP responses too.
//! Every successful write invalidates exactly the tags it affects, in a
//! single `invalidate_by_tags` call.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::application::repos::{CatalogRepo, DestinationFilter, PackageFilter, RepoError};
use crate::cache::keys::{
    TAG_DESTINATIONS_LIST, TAG_PACKAGES_LIST, destination_key, destination_list_key,
    destination_tag, package_key, package_list_key, package_tag,
};
use crate::cache::{Cache, CacheError, CacheOptions, WarmItem, deps};
use crate::domain::entities::{Destination, TravelPackage};
use crate::domain::error::DomainError;
use crate::domain::slug::{SlugError, UniqueSlugError, unique_slug};
use crate::domain::validation::{
    MAX_NAME_LEN, MAX_SUMMARY_LEN, country_code, currency_code, duration_days, price_cents,
    required_text,
};

/// Lists change whenever any member changes, so they live shorter than items.
const LIST_TTL: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("timed out waiting for a concurrent load of `{key}`")]
    Busy { key: String },
}

impl From<CacheError> for CatalogError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Compute(err) => match err.downcast_ref::<RepoError>() {
                Some(repo) => CatalogError::Repo(repo.clone()),
                None => CatalogError::Repo(RepoError::from_persistence(err)),
            },
            CacheError::WaitTimeout { key, .. } => CatalogError::Busy { key },
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateDestinationCommand {
    pub name: String,
    pub country: String,
    pub summary: String,
    pub featured: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateDestinationCommand {
    pub name: Option<String>,
    pub country: Option<String>,
    pub summary: Option<String>,
    pub featured: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct CreatePackageCommand {
    pub destination_id: Uuid,
    pub title: String,
    pub price_cents: i64,
    pub currency: String,
    pub duration_days: u16,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePackageCommand {
    pub title: Option<String>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub duration_days: Option<u16>,
    pub active: Option<bool>,
}

#[derive(Clone)]
pub struct CatalogService {
    repo: Arc<dyn CatalogRepo>,
    cache: Arc<Cache>,
}

impl CatalogService {
    pub fn new(repo: Arc<dyn CatalogRepo>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    pub async fn list_destinations(
        &self,
        filter: DestinationFilter,
    ) -> Result<Vec<Destination>, CatalogError> {
        let filter = filter.normalized();
        deps::record(TAG_DESTINATIONS_LIST);

        let destinations = self
            .cache
            .get_or_set(
                &destination_list_key(&filter),
                destination_list_options(),
                || async { self.repo.list_destinations(&filter).await },
            )
            .await?;
        Ok(destinations)
    }

    pub async fn get_destination(&self, id: Uuid) -> Result<Destination, CatalogError> {
        deps::record(destination_tag(id));

        let destination = self
            .cache
            .get_or_set(&destination_key(id), destination_options(id), || async {
                self.repo
                    .find_destination(id)
                    .await?
                    .ok_or(RepoError::NotFound)
            })
            .await?;
        Ok(destination)
    }

    #[instrument(skip(self, command), fields(name = %command.name))]
    pub async fn create_destination(
        &self,
        command: CreateDestinationCommand,
    ) -> Result<Destination, CatalogError> {
        let name = required_text("name", &command.name, MAX_NAME_LEN)?;
        let country = country_code(&command.country)?;
        let summary = optional_summary(&command.summary)?;
        let slug = self.unique_slug(&name).await?;

        let now = OffsetDateTime::now_utc();
        let destination = self
            .repo
            .insert_destination(Destination {
                id: Uuid::new_v4(),
                slug,
                name,
                country,
                summary,
                featured: command.featured,
                created_at: now,
                updated_at: now,
            })
            .await?;

        self.invalidate(&[TAG_DESTINATIONS_LIST.to_string()]).await;
        info!(
            target = "roamly::catalog",
            destination_id = %destination.id,
            slug = %destination.slug,
            "destination created"
        );
        Ok(destination)
    }

    #[instrument(skip(self, command))]
    pub async fn update_destination(
        &self,
        id: Uuid,
        command: UpdateDestinationCommand,
    ) -> Result<Destination, CatalogError> {
        let mut destination = self
            .repo
            .find_destination(id)
            .await?
            .ok_or(DomainError::not_found("destination"))?;

        if let Some(name) = command.name.as_deref() {
            destination.name = required_text("name", name, MAX_NAME_LEN)?;
        }
        if let Some(country) = command.country.as_deref() {
            destination.country = country_code(country)?;
        }
        if let Some(summary) = command.summary.as_deref() {
            destination.summary = optional_summary(summary)?;
        }
        if let Some(featured) = command.featured {
            destination.featured = featured;
        }
        destination.updated_at = OffsetDateTime::now_utc();

        let destination = self.repo.update_destination(destination).await?;
        self.invalidate(&[TAG_DESTINATIONS_LIST.to_string(), destination_tag(id)])
            .await;
        Ok(destination)
    }

    /// Delete a destination and every package that belongs to it.
    #[instrument(skip(self))]
    pub async fn delete_destination(&self, id: Uuid) -> Result<(), CatalogError> {
        let removed_packages = self.repo.delete_destination(id).await?;

        let mut tags = vec![TAG_DESTINATIONS_LIST.to_string(), destination_tag(id)];
        if !removed_packages.is_empty() {
            tags.push(TAG_PACKAGES_LIST.to_string());
            tags.extend(removed_packages.iter().copied().map(package_tag));
        }
        self.invalidate(&tags).await;
        info!(
            target = "roamly::catalog",
            destination_id = %id,
            packages = removed_packages.len(),
            "destination deleted"
        );
        Ok(())
    }

    pub async fn list_packages(
        &self,
        filter: PackageFilter,
    ) -> Result<Vec<TravelPackage>, CatalogError> {
        let filter = filter.normalized();
        deps::record(TAG_PACKAGES_LIST);

        let packages = self
            .cache
            .get_or_set(&package_list_key(&filter), package_list_options(), || async {
                self.repo.list_packages(&filter).await
            })
            .await?;
        Ok(packages)
    }

    pub async fn get_package(&self, id: Uuid) -> Result<TravelPackage, CatalogError> {
        deps::record(package_tag(id));

        let package = self
            .cache
            .get_or_set(&package_key(id), package_options(id), || async {
                self.repo.find_package(id).await?.ok_or(RepoError::NotFound)
            })
            .await?;
        Ok(package)
    }

    #[instrument(skip(self, command), fields(destination_id = %command.destination_id))]
    pub async fn create_package(
        &self,
        command: CreatePackageCommand,
    ) -> Result<TravelPackage, CatalogError> {
        let title = required_text("title", &command.title, MAX_NAME_LEN)?;
        let price = price_cents(command.price_cents)?;
        let currency = currency_code(&command.currency)?;
        let days = duration_days(command.duration_days)?;
        self.ensure_destination(command.destination_id).await?;

        let now = OffsetDateTime::now_utc();
        let package = self
            .repo
            .insert_package(TravelPackage {
                id: Uuid::new_v4(),
                destination_id: command.destination_id,
                title,
                price_cents: price,
                currency,
                duration_days: days,
                active: command.active,
                created_at: now,
                updated_at: now,
            })
            .await?;

        self.invalidate(&[TAG_PACKAGES_LIST.to_string()]).await;
        info!(
            target = "roamly::catalog",
            package_id = %package.id,
            destination_id = %package.destination_id,
            "package created"
        );
        Ok(package)
    }

    #[instrument(skip(self, command))]
    pub async fn update_package(
        &self,
        id: Uuid,
        command: UpdatePackageCommand,
    ) -> Result<TravelPackage, CatalogError> {
        let mut package = self
            .repo
            .find_package(id)
            .await?
            .ok_or(DomainError::not_found("package"))?;

        if let Some(title) = command.title.as_deref() {
            package.title = required_text("title", title, MAX_NAME_LEN)?;
        }
        if let Some(value) = command.price_cents {
            package.price_cents = price_cents(value)?;
        }
        if let Some(currency) = command.currency.as_deref() {
            package.currency = currency_code(currency)?;
        }
        if let Some(days) = command.duration_days {
            package.duration_days = duration_days(days)?;
        }
        if let Some(active) = command.active {
            package.active = active;
        }
        package.updated_at = OffsetDateTime::now_utc();

        let package = self.repo.update_package(package).await?;
        self.invalidate(&[TAG_PACKAGES_LIST.to_string(), package_tag(id)])
            .await;
        Ok(package)
    }

    #[instrument(skip(self))]
    pub async fn delete_package(&self, id: Uuid) -> Result<(), CatalogError> {
        self.repo.delete_package(id).await?;
        self.invalidate(&[TAG_PACKAGES_LIST.to_string(), package_tag(id)])
            .await;
        Ok(())
    }

    /// Entries for the list pages requested most often: the unfiltered
    /// destination list, featured destinations and active packages.
    pub async fn warm_items(&self) -> Result<Vec<WarmItem>, CatalogError> {
        let mut items = Vec::new();

        for filter in [
            DestinationFilter::default(),
            DestinationFilter {
                featured: Some(true),
                ..Default::default()
            },
        ] {
            let filter = filter.normalized();
            let destinations = self.repo.list_destinations(&filter).await?;
            items.push(WarmItem::new(
                destination_list_key(&filter),
                &destinations,
                destination_list_options(),
            ));
        }

        for filter in [
            PackageFilter::default(),
            PackageFilter {
                active: Some(true),
                ..Default::default()
            },
        ] {
            let filter = filter.normalized();
            let packages = self.repo.list_packages(&filter).await?;
            items.push(WarmItem::new(
                package_list_key(&filter),
                &packages,
                package_list_options(),
            ));
        }

        Ok(items)
    }

    async fn ensure_destination(&self, id: Uuid) -> Result<(), CatalogError> {
        match self.repo.find_destination(id).await? {
            Some(_) => Ok(()),
            None => Err(DomainError::validation(format!("destination `{id}` does not exist")).into()),
        }
    }

    async fn unique_slug(&self, name: &str) -> Result<String, CatalogError> {
        let repo = &self.repo;
        let result = unique_slug(name, |candidate| async move {
            repo.find_destination_by_slug(&candidate)
                .await
                .map(|existing| existing.is_none())
        })
        .await;

        match result {
            Ok(slug) => Ok(slug),
            Err(UniqueSlugError::Slug(SlugError::Exhausted { base })) => Err(RepoError::Duplicate {
                constraint: format!("destinations_slug_key ({base})"),
            }
            .into()),
            Err(UniqueSlugError::Slug(err)) => Err(DomainError::validation(err.to_string()).into()),
            Err(UniqueSlugError::Lookup(err)) => Err(err.into()),
        }
    }

    async fn invalidate(&self, tags: &[String]) {
        let removed = self.cache.invalidate_by_tags(tags).await;
        debug!(target = "roamly::catalog", tags = ?tags, removed, "catalog cache invalidated");
    }
}

fn optional_summary(value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.chars().count() > MAX_SUMMARY_LEN {
        return Err(DomainError::validation(format!(
            "summary must be at most {MAX_SUMMARY_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn destination_list_options() -> CacheOptions {
    CacheOptions::new()
        .with_ttl(LIST_TTL)
        .with_tag(TAG_DESTINATIONS_LIST)
}

fn destination_options(id: Uuid) -> CacheOptions {
    CacheOptions::new().with_tag(destination_tag(id))
}

fn package_list_options() -> CacheOptions {
    CacheOptions::new()
        .with_ttl(LIST_TTL)
        .with_tag(TAG_PACKAGES_LIST)
}

fn package_options(id: Uuid) -> CacheOptions {
    CacheOptions::new().with_tag(package_tag(id))
}
