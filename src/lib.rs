//! Persistence and query engine for a geospatial metadata catalog.
//!
//! A catalog stores one wide row per described resource (dataset, service,
//! collection). This crate provides the repository layer on top of that
//! table: capability detection for the backing store, constrained, sorted
//! and paginated queries with spatial relevance ranking, and mutations that
//! keep the scalar columns, the embedded XML document and the derived
//! `anytext` search blob consistent with each other.
//!
//! The storage backend is selected at compile time via the `sqlite`
//! (default) and `postgres` cargo features.

#[cfg(all(feature = "sqlite", feature = "postgres"))]
compile_error!("features `sqlite` and `postgres` are mutually exclusive; build with --no-default-features to switch backends");

pub mod config;
pub mod db;
pub mod error;
pub mod spatial;
pub mod util;
pub mod xml;

pub use config::Config;
pub use db::{
    Capabilities, Constraint, DbPool, DomainQueryType, DomainResult, PoolRegistry, PropertyUpdate,
    QueryResult, Queryables, Record, Repository, SortBy, SortOrder, SpatialFilter, SpatialRanking,
    SpatialSupport,
};
pub use error::RepositoryError;
pub use spatial::{OverlayRanker, geometry_area, query_spatial};
