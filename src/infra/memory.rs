//! In-process catalog store used by the server binary and the tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::repos::{CatalogRepo, DestinationFilter, PackageFilter, RepoError};
use crate::domain::entities::{Destination, TravelPackage};

#[derive(Debug, Default)]
struct Tables {
    destinations: BTreeMap<Uuid, Destination>,
    packages: BTreeMap<Uuid, TravelPackage>,
}

#[derive(Debug, Default)]
pub struct MemoryCatalogRepo {
    tables: RwLock<Tables>,
}

impl MemoryCatalogRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small catalog so a fresh server has something to serve and warm.
    pub fn seeded() -> Self {
        let now = OffsetDateTime::now_utc();
        let mut tables = Tables::default();

        let seeds = [
            (
                "kyoto",
                "Kyoto",
                "JP",
                "Temples, gardens and tea houses.",
                true,
                [("Kyoto Temple Trail", 189_000, 7), ("Arashiyama Weekend", 64_000, 3)],
            ),
            (
                "lisbon",
                "Lisbon",
                "PT",
                "Hills, trams and the Atlantic light.",
                true,
                [("Lisbon City Break", 72_000, 4), ("Alfama by Night", 38_000, 2)],
            ),
            (
                "reykjavik",
                "Reykjavik",
                "IS",
                "Gateway to glaciers and the northern lights.",
                false,
                [("Golden Circle Explorer", 145_000, 5), ("Aurora Hunt", 99_000, 3)],
            ),
        ];

        for (slug, name, country, summary, featured, packages) in seeds {
            let destination = Destination {
                id: Uuid::new_v4(),
                slug: slug.to_string(),
                name: name.to_string(),
                country: country.to_string(),
                summary: summary.to_string(),
                featured,
                created_at: now,
                updated_at: now,
            };
            for (title, price_cents, duration_days) in packages {
                let package = TravelPackage {
                    id: Uuid::new_v4(),
                    destination_id: destination.id,
                    title: title.to_string(),
                    price_cents,
                    currency: "EUR".to_string(),
                    duration_days,
                    active: true,
                    created_at: now,
                    updated_at: now,
                };
                tables.packages.insert(package.id, package);
            }
            tables.destinations.insert(destination.id, destination);
        }

        Self {
            tables: RwLock::new(tables),
        }
    }
}

#[async_trait]
impl CatalogRepo for MemoryCatalogRepo {
    async fn list_destinations(
        &self,
        filter: &DestinationFilter,
    ) -> Result<Vec<Destination>, RepoError> {
        let tables = self.tables.read().await;
        let mut items: Vec<Destination> = tables
            .destinations
            .values()
            .filter(|destination| filter.matches(destination))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn find_destination(&self, id: Uuid) -> Result<Option<Destination>, RepoError> {
        Ok(self.tables.read().await.destinations.get(&id).cloned())
    }

    async fn find_destination_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<Destination>, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables
            .destinations
            .values()
            .find(|destination| destination.slug == slug)
            .cloned())
    }

    async fn insert_destination(&self, record: Destination) -> Result<Destination, RepoError> {
        let mut tables = self.tables.write().await;
        if tables
            .destinations
            .values()
            .any(|existing| existing.slug == record.slug)
        {
            return Err(RepoError::Duplicate {
                constraint: "destinations_slug_key".to_string(),
            });
        }
        tables.destinations.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_destination(&self, record: Destination) -> Result<Destination, RepoError> {
        let mut tables = self.tables.write().await;
        match tables.destinations.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(record)
            }
            None => Err(RepoError::NotFound),
        }
    }

    async fn delete_destination(&self, id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        let mut tables = self.tables.write().await;
        if tables.destinations.remove(&id).is_none() {
            return Err(RepoError::NotFound);
        }
        let removed: Vec<Uuid> = tables
            .packages
            .values()
            .filter(|package| package.destination_id == id)
            .map(|package| package.id)
            .collect();
        for package_id in &removed {
            tables.packages.remove(package_id);
        }
        Ok(removed)
    }

    async fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<TravelPackage>, RepoError> {
        let tables = self.tables.read().await;
        let mut items: Vec<TravelPackage> = tables
            .packages
            .values()
            .filter(|package| filter.matches(package))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.price_cents
                .cmp(&b.price_cents)
                .then(a.title.cmp(&b.title))
                .then(a.id.cmp(&b.id))
        });
        Ok(items)
    }

    async fn find_package(&self, id: Uuid) -> Result<Option<TravelPackage>, RepoError> {
        Ok(self.tables.read().await.packages.get(&id).cloned())
    }

    async fn insert_package(&self, record: TravelPackage) -> Result<TravelPackage, RepoError> {
        let mut tables = self.tables.write().await;
        if !tables.destinations.contains_key(&record.destination_id) {
            return Err(RepoError::InvalidInput {
                message: format!("destination `{}` does not exist", record.destination_id),
            });
        }
        tables.packages.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_package(&self, record: TravelPackage) -> Result<TravelPackage, RepoError> {
        let mut tables = self.tables.write().await;
        match tables.packages.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(record)
            }
            None => Err(RepoError::NotFound),
        }
    }

    async fn delete_package(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tables = self.tables.write().await;
        tables
            .packages
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}
