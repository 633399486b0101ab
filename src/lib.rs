//! Roamly catalog service with a tag-indexed response cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
