//! Catalog table bootstrap.
//!
//! Builds the wide record table from the static column schema, plus the
//! backend-specific extras: the full-text artifacts and, when a spatial
//! extension is present, a native geometry column kept in sync with
//! `wkt_geometry` by trigger.

use tracing::info;

use super::DbPool;
use super::records::{COLUMNS, ColumnType};
use crate::error::RepositoryError;

/// Create the catalog table and its indexes if they don't exist yet.
pub async fn setup(pool: &DbPool, table: &str) -> Result<(), RepositoryError> {
    info!("creating table {table}");

    let mut columns: Vec<String> = Vec::new();
    for column in COLUMNS {
        let ty = match column.ty {
            ColumnType::Text => "TEXT",
            ColumnType::Float => "FLOAT",
        };
        let mut line = format!("{} {ty}", column.name);
        if column.name == "identifier" {
            line.push_str(" PRIMARY KEY");
        } else if !column.nullable {
            line.push_str(" NOT NULL");
        }
        if let Some(default) = column.default {
            line.push_str(&format!(" DEFAULT '{default}'"));
        }
        columns.push(line);
    }

    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} ({})",
        columns.join(", ")
    );
    sqlx::query(&sql).execute(pool).await?;

    let index_prefix = table.replace('.', "_");
    for column in COLUMNS {
        if !column.indexed || column.name == "identifier" {
            continue;
        }
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS ix_{index_prefix}_{} ON {table} ({})",
            column.name, column.name
        );
        sqlx::query(&sql).execute(pool).await?;
    }

    #[cfg(feature = "postgres")]
    setup_postgres_extras(pool, table).await?;

    Ok(())
}

/// Full-text artifacts and, when PostGIS is around, the native geometry
/// column and its sync trigger. Mirrors what capability detection probes
/// for at repository construction.
#[cfg(feature = "postgres")]
async fn setup_postgres_extras(pool: &DbPool, table: &str) -> Result<(), RepositoryError> {
    use tracing::debug;

    let table_name = table.rsplit('.').next().unwrap_or(table);

    info!("creating full-text search artifacts");
    sqlx::query(&format!(
        "ALTER TABLE {table} ADD COLUMN IF NOT EXISTS anytext_tsvector tsvector"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS fts_gin_idx ON {table} USING gin(anytext_tsvector)"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE OR REPLACE TRIGGER ftsupdate BEFORE INSERT OR UPDATE ON {table} \
         FOR EACH ROW EXECUTE PROCEDURE \
         tsvector_update_trigger('anytext_tsvector', 'pg_catalog.english', 'anytext')"
    ))
    .execute(pool)
    .await?;

    let postgis: Result<String, _> = sqlx::query_scalar("SELECT postgis_lib_version()")
        .fetch_one(pool)
        .await;
    let Ok(version) = postgis else {
        debug!("no spatial extension; skipping native geometry column");
        return Ok(());
    };
    info!("spatial extension {version} detected; creating native geometry column");

    sqlx::query(&format!(
        "ALTER TABLE {table} ADD COLUMN IF NOT EXISTS wkb_geometry geometry(Geometry,4326)"
    ))
    .execute(pool)
    .await?;

    let trigger = format!(
        r#"
CREATE OR REPLACE FUNCTION {table_name}_update_geometry() RETURNS trigger AS ${table_name}_update_geometry$
BEGIN
    IF NEW.wkt_geometry IS NULL THEN
        RETURN NEW;
    END IF;
    NEW.wkb_geometry := ST_GeomFromText(NEW.wkt_geometry,4326);
    RETURN NEW;
END;
${table_name}_update_geometry$ LANGUAGE plpgsql
"#
    );
    sqlx::query(&trigger).execute(pool).await?;
    sqlx::query(&format!(
        "CREATE OR REPLACE TRIGGER {table_name}_update_geometry BEFORE INSERT OR UPDATE ON {table} \
         FOR EACH ROW EXECUTE PROCEDURE {table_name}_update_geometry()"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS wkb_geometry_idx ON {table} USING GIST (wkb_geometry)"
    ))
    .execute(pool)
    .await?;

    Ok(())
}
