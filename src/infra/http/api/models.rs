use serde::Deserialize;
use uuid::Uuid;

use crate::application::catalog::{
    CreateDestinationCommand, CreatePackageCommand, UpdateDestinationCommand,
    UpdatePackageCommand,
};

#[derive(Debug, Deserialize)]
pub struct DestinationCreateRequest {
    pub name: String,
    pub country: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub featured: bool,
}

impl From<DestinationCreateRequest> for CreateDestinationCommand {
    fn from(request: DestinationCreateRequest) -> Self {
        Self {
            name: request.name,
            country: request.country,
            summary: request.summary,
            featured: request.featured,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DestinationUpdateRequest {
    pub name: Option<String>,
    pub country: Option<String>,
    pub summary: Option<String>,
    pub featured: Option<bool>,
}

impl From<DestinationUpdateRequest> for UpdateDestinationCommand {
    fn from(request: DestinationUpdateRequest) -> Self {
        Self {
            name: request.name,
            country: request.country,
            summary: request.summary,
            featured: request.featured,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PackageCreateRequest {
    pub destination_id: Uuid,
    pub title: String,
    pub price_cents: i64,
    pub currency: String,
    pub duration_days: u16,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl From<PackageCreateRequest> for CreatePackageCommand {
    fn from(request: PackageCreateRequest) -> Self {
        Self {
            destination_id: request.destination_id,
            title: request.title,
            price_cents: request.price_cents,
            currency: request.currency,
            duration_days: request.duration_days,
            active: request.active,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PackageUpdateRequest {
    pub title: Option<String>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub duration_days: Option<u16>,
    pub active: Option<bool>,
}

impl From<PackageUpdateRequest> for UpdatePackageCommand {
    fn from(request: PackageUpdateRequest) -> Self {
        Self {
            title: request.title,
            price_cents: request.price_cents,
            currency: request.currency,
            duration_days: request.duration_days,
            active: request.active,
        }
    }
}
