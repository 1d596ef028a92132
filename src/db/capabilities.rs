//! Backend capability detection.
//!
//! A repository adapts to what its backing store can do: a plain
//! relational table, a spatial extension addressing geometries as WKT, or
//! a native geometry column, plus an optional full-text index. Detection
//! runs once per connection target; absence of a capability is the normal
//! steady state, so probe failures are logged and swallowed, never raised.

use super::DbPool;

/// Spatial ability of the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpatialSupport {
    /// No spatial extension; geometry work happens in the engine.
    Generic,
    /// Spatial extension present, geometries addressed as WKT.
    ExtendedWkt,
    /// Spatial extension with a native geometry column on the bound table.
    ExtendedNative { geometry_column: String },
}

/// What was detected for one connection target.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub dialect: &'static str,
    pub spatial: SpatialSupport,
    pub fts: bool,
}

/// Detect the capabilities of the store behind `pool` for `table`.
#[cfg(feature = "sqlite")]
pub async fn detect(_pool: &DbPool, _table: &str) -> Capabilities {
    Capabilities {
        dialect: "sqlite",
        spatial: SpatialSupport::Generic,
        fts: false,
    }
}

/// Detect the capabilities of the store behind `pool` for `table`.
///
/// Three explicit steps: spatial extension version, native geometry column,
/// full-text index. Each step that fails leaves the prior state unchanged.
#[cfg(feature = "postgres")]
pub async fn detect(pool: &DbPool, table: &str) -> Capabilities {
    use tracing::debug;

    let mut spatial = SpatialSupport::Generic;

    match probe_spatial_extension(pool).await {
        Some(version) => {
            debug!("spatial extension detected: {version}");
            spatial = SpatialSupport::ExtendedWkt;
        }
        None => debug!("no spatial extension detected"),
    }

    match probe_native_geometry_column(pool, table).await {
        Some(geometry_column) => {
            debug!("native geometry column detected: {geometry_column}");
            spatial = SpatialSupport::ExtendedNative { geometry_column };
        }
        None => debug!("no native geometry column for {table}"),
    }

    let fts = probe_fts_index(pool).await;
    debug!("full-text index enabled: {fts}");

    Capabilities {
        dialect: "postgresql",
        spatial,
        fts,
    }
}

#[cfg(feature = "postgres")]
async fn probe_spatial_extension(pool: &DbPool) -> Option<String> {
    match sqlx::query_scalar::<_, String>("SELECT postgis_version()")
        .fetch_one(pool)
        .await
    {
        Ok(version) => Some(version),
        Err(err) => {
            tracing::debug!("spatial extension probe failed: {err}");
            None
        }
    }
}

#[cfg(feature = "postgres")]
async fn probe_native_geometry_column(pool: &DbPool, table: &str) -> Option<String> {
    // the bound table may be schema-qualified; geometry_columns stores the
    // bare table name
    let table_name = table.rsplit('.').next().unwrap_or(table);
    let result = sqlx::query_scalar::<_, String>(
        "SELECT f_geometry_column FROM geometry_columns \
         WHERE f_table_name = $1 AND f_geometry_column != 'wkt_geometry' LIMIT 1",
    )
    .bind(table_name)
    .fetch_optional(pool)
    .await;

    match result {
        Ok(column) => column,
        Err(err) => {
            tracing::debug!("native geometry column probe failed: {err}");
            None
        }
    }
}

#[cfg(feature = "postgres")]
async fn probe_fts_index(pool: &DbPool) -> bool {
    let result =
        sqlx::query_scalar::<_, String>("SELECT relname FROM pg_class WHERE relname = 'fts_gin_idx'")
            .fetch_optional(pool)
            .await;

    match result {
        Ok(row) => row.is_some(),
        Err(err) => {
            tracing::debug!("full-text index probe failed: {err}");
            false
        }
    }
}
