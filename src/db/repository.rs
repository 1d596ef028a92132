//! The catalog repository: query execution and mutations.

use std::cmp::Ordering;

use tracing::{debug, info};

use super::queryables::Queryables;
use super::records::{COLUMNS, ColumnValue, Record};
use super::{Capabilities, DbPool, PoolRegistry};
use crate::config::Config;
use crate::error::RepositoryError;
use crate::spatial::{self, OverlayRanker, geometry_area};
use crate::util;
use crate::xml;

/// Typenames that mark a record as a collection regardless of parentage.
const COLLECTION_TYPENAMES: &[&str] = &["stac:Collection"];

/// A boolean filter over catalog rows: raw predicate text plus the values
/// bound to its placeholders, in order. A constraint's values are always
/// the only bind parameters of a statement embedding its predicate, so
/// placeholders number from 1.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub where_clause: String,
    pub values: Vec<String>,
}

impl Constraint {
    pub fn new(where_clause: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            where_clause: where_clause.into(),
            values,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Requested ordering on one queryable. A spatial sort orders by computed
/// geometry area instead of the raw column value.
#[derive(Debug, Clone)]
pub struct SortBy {
    pub propertyname: String,
    pub order: SortOrder,
    pub spatial: bool,
}

/// A spatial predicate applied to candidate rows after retrieval.
#[derive(Debug, Clone)]
pub struct SpatialFilter {
    pub predicate: String,
    pub geometry: String,
    pub distance: f64,
}

/// Ranking intent for one query call: order results by overlay rank
/// against this geometry, best first. Travels as an explicit parameter so
/// no ranking state outlives the call that asked for it.
#[derive(Debug, Clone)]
pub struct SpatialRanking {
    pub geometry: String,
}

/// One property-level update: a queryable name and its new value.
#[derive(Debug, Clone)]
pub struct PropertyUpdate {
    pub name: String,
    pub value: String,
}

/// A page of results plus the exact pre-limit total.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub total: i64,
    pub records: Vec<Record>,
}

/// Shape of a domain query over one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainQueryType {
    List,
    Range,
}

/// Domain query results.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainResult {
    Range {
        min: Option<String>,
        max: Option<String>,
    },
    Values(Vec<Option<String>>),
    Frequencies(Vec<(Option<String>, i64)>),
}

#[cfg(feature = "sqlite")]
fn placeholder(i: usize) -> String {
    format!("?{i}")
}

#[cfg(feature = "postgres")]
fn placeholder(i: usize) -> String {
    format!("${i}")
}

/// Repository bound to one connection target and one queryable mapping.
pub struct Repository {
    pool: DbPool,
    table: String,
    mask: Option<String>,
    queryables: Queryables,
    capabilities: Capabilities,
    ranker: OverlayRanker,
}

impl Repository {
    /// Bind a repository using a shared pool registry: the pool is created
    /// once per target and capabilities are probed once per target.
    pub async fn open(
        registry: &PoolRegistry,
        config: &Config,
        queryables: Queryables,
    ) -> Result<Self, RepositoryError> {
        let pool = registry.get_or_connect(&config.database_url).await?;
        let capabilities = registry
            .capabilities_for(&config.database_url, &pool, &config.table)
            .await;
        info!(
            "repository bound to table {} on {} ({})",
            config.table,
            util::sanitize_db_connect(&config.database_url),
            capabilities.dialect
        );
        Ok(Self::new(
            pool,
            &config.table,
            config.repo_filter.clone(),
            queryables,
            capabilities,
        ))
    }

    pub fn new(
        pool: DbPool,
        table: &str,
        mask: Option<String>,
        queryables: Queryables,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            pool,
            table: table.to_string(),
            mask,
            queryables,
            capabilities,
            ranker: OverlayRanker::default(),
        }
    }

    /// Override the overlay rank weights (defaults are 1.0/1.0).
    pub fn with_rank_weights(mut self, kt: f64, kq: f64) -> Self {
        self.ranker = OverlayRanker::new(kt, kq);
        self
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn queryables(&self) -> &Queryables {
        &self.queryables
    }

    /// Property schema of the catalog table.
    pub fn describe(&self) -> serde_json::Map<String, serde_json::Value> {
        super::records::describe()
    }

    /// WHERE clause combining the repository mask filter with an optional
    /// caller constraint. The mask carries no binds, so the constraint's
    /// placeholder numbering is unaffected.
    fn build_where(&self, constraint: Option<&Constraint>) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(constraint) = constraint {
            parts.push(format!("({})", constraint.where_clause));
        }
        if let Some(mask) = &self.mask {
            parts.push(format!("({mask})"));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        }
    }

    async fn fetch_records(
        &self,
        sql: &str,
        constraint: Option<&Constraint>,
    ) -> Result<Vec<Record>, RepositoryError> {
        let mut query = sqlx::query_as::<_, Record>(sql);
        if let Some(constraint) = constraint {
            for value in &constraint.values {
                query = query.bind(value);
            }
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Query records: mask filter, optional constraint, optional spatial
    /// predicate, ordering and pagination. Returns the exact pre-limit
    /// total next to the requested page.
    ///
    /// Non-spatial ordering and pagination push down into SQL. A spatial
    /// filter, spatial sort or ranking request switches to an
    /// evaluate-after-retrieval pass over the filtered set, with ranking
    /// as the primary order and any explicit sort as the secondary key.
    pub async fn query(
        &self,
        constraint: Option<&Constraint>,
        spatial: Option<&SpatialFilter>,
        sort: Option<&SortBy>,
        ranking: Option<&SpatialRanking>,
        limit: i64,
        offset: i64,
    ) -> Result<QueryResult, RepositoryError> {
        // configuration errors surface before any I/O
        if let Some(filter) = spatial {
            spatial::ensure_supported(&filter.predicate)?;
        }
        let order_sql = match sort {
            Some(s) if !s.spatial => {
                let column = self.queryables.column(None, &s.propertyname)?;
                Some(format!(" ORDER BY {column} {}", s.order.sql()))
            }
            _ => None,
        };
        let spatial_sort = match sort {
            Some(s) if s.spatial => Some((
                self.queryables.column(None, &s.propertyname)?.to_string(),
                s.order,
            )),
            _ => None,
        };

        let where_sql = self.build_where(constraint);
        let limit = limit.max(0);
        let offset = offset.max(0);

        let mut sql = format!("SELECT * FROM {}{}", self.table, where_sql);
        if let Some(order) = &order_sql {
            sql.push_str(order);
        }

        if spatial.is_none() && ranking.is_none() && spatial_sort.is_none() {
            let count_sql = format!("SELECT COUNT(*) FROM {}{}", self.table, where_sql);
            let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
            if let Some(constraint) = constraint {
                for value in &constraint.values {
                    count_query = count_query.bind(value);
                }
            }
            let total = count_query.fetch_one(&self.pool).await?;

            sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
            let records = self.fetch_records(&sql, constraint).await?;
            return Ok(QueryResult { total, records });
        }

        debug!("spatial evaluation pass over the filtered set");
        let mut rows = self.fetch_records(&sql, constraint).await?;

        if let Some(filter) = spatial {
            rows.retain(|record| {
                matches!(
                    spatial::query_spatial(
                        record.wkt_geometry.as_deref().unwrap_or(""),
                        &filter.geometry,
                        &filter.predicate,
                        filter.distance,
                    ),
                    Ok(true)
                )
            });
        }
        let total = rows.len() as i64;

        if let Some((column, order)) = &spatial_sort {
            rows = sort_keyed(
                rows,
                |record| geometry_area(text_column(record, column)),
                *order,
            );
        }

        if let Some(ranking) = ranking {
            debug!("ordering by spatial overlay rank");
            rows = sort_keyed(
                rows,
                |record| {
                    self.ranker
                        .rank(record.wkt_geometry.as_deref(), Some(&ranking.geometry))
                },
                SortOrder::Desc,
            );
        }

        let records = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(QueryResult { total, records })
    }

    /// Fetch records by identifier list, mask-filtered.
    pub async fn query_ids(&self, ids: &[String]) -> Result<Vec<Record>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (1..=ids.len()).map(placeholder).collect();
        let mut sql = format!(
            "SELECT * FROM {} WHERE identifier IN ({})",
            self.table,
            placeholders.join(", ")
        );
        if let Some(mask) = &self.mask {
            sql.push_str(&format!(" AND ({mask})"));
        }
        let mut query = sqlx::query_as::<_, Record>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Fetch parent collections: records referenced as a parent by the
    /// mask-filtered set, unioned with records of a collection typename,
    /// deduplicated by identifier and capped at `limit`.
    pub async fn query_collections(
        &self,
        filters: Option<&Constraint>,
        limit: i64,
    ) -> Result<Vec<Record>, RepositoryError> {
        let mut sql = format!("SELECT DISTINCT parentidentifier FROM {}", self.table);
        if let Some(mask) = &self.mask {
            sql.push_str(&format!(" WHERE ({mask})"));
        }
        let parents: Vec<Option<String>> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        let ids: Vec<String> = parents.into_iter().flatten().collect();

        let limit = limit.max(0);
        let mut collections: Vec<Record> = Vec::new();

        if !ids.is_empty() {
            let values: Vec<&str> = ids.iter().map(String::as_str).collect();
            collections.extend(
                self.fetch_in_list(filters, "identifier", &values, limit)
                    .await?,
            );
        }

        for record in self
            .fetch_in_list(filters, "typename", COLLECTION_TYPENAMES, limit)
            .await?
        {
            if !collections
                .iter()
                .any(|c| c.identifier == record.identifier)
            {
                collections.push(record);
            }
        }

        collections.truncate(limit as usize);
        Ok(collections)
    }

    /// `SELECT * WHERE <filters> AND <column> IN (...) AND <mask> LIMIT n`.
    /// The caller filter comes first so its placeholders keep numbering
    /// from 1; the list placeholders continue after its values.
    async fn fetch_in_list(
        &self,
        filters: Option<&Constraint>,
        column: &str,
        values: &[&str],
        limit: i64,
    ) -> Result<Vec<Record>, RepositoryError> {
        let offset = filters.map(|f| f.values.len()).unwrap_or(0);
        let mut parts: Vec<String> = Vec::new();
        if let Some(filters) = filters {
            parts.push(format!("({})", filters.where_clause));
        }
        let placeholders: Vec<String> = (1..=values.len()).map(|i| placeholder(offset + i)).collect();
        parts.push(format!("{column} IN ({})", placeholders.join(", ")));
        if let Some(mask) = &self.mask {
            parts.push(format!("({mask})"));
        }
        let sql = format!(
            "SELECT * FROM {} WHERE {} LIMIT {limit}",
            self.table,
            parts.join(" AND ")
        );
        let mut query = sqlx::query_as::<_, Record>(&sql);
        if let Some(filters) = filters {
            for value in &filters.values {
                query = query.bind(value);
            }
        }
        for value in values {
            query = query.bind(*value);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Domain of one resolved column: min/max range, distinct values, or
    /// grouped frequency counts, always mask-filtered.
    pub async fn query_domain(
        &self,
        domain: &str,
        query_type: DomainQueryType,
        count: bool,
    ) -> Result<DomainResult, RepositoryError> {
        let column = self.queryables.column(None, domain)?;
        let where_sql = self.build_where(None);

        match query_type {
            DomainQueryType::Range => {
                info!("generating property range values for {domain}");
                let sql = format!(
                    "SELECT MIN({column}), MAX({column}) FROM {}{where_sql}",
                    self.table
                );
                let (min, max) = sqlx::query_as::<_, (Option<String>, Option<String>)>(&sql)
                    .fetch_one(&self.pool)
                    .await?;
                Ok(DomainResult::Range { min, max })
            }
            DomainQueryType::List if count => {
                info!("generating property frequency counts for {domain}");
                let sql = format!(
                    "SELECT {column}, COUNT({column}) FROM {}{where_sql} GROUP BY {column}",
                    self.table
                );
                let rows = sqlx::query_as::<_, (Option<String>, i64)>(&sql)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(DomainResult::Frequencies(rows))
            }
            DomainQueryType::List => {
                let sql = format!("SELECT DISTINCT {column} FROM {}{where_sql}", self.table);
                let rows = sqlx::query_scalar::<_, Option<String>>(&sql)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(DomainResult::Values(rows))
            }
        }
    }

    /// Timestamp of the most recent insertion, mask-filtered.
    pub async fn latest_insert_date(&self) -> Result<Option<String>, RepositoryError> {
        self.insert_date_bound("MAX").await
    }

    /// Timestamp of the earliest insertion, mask-filtered.
    pub async fn earliest_insert_date(&self) -> Result<Option<String>, RepositoryError> {
        self.insert_date_bound("MIN").await
    }

    async fn insert_date_bound(&self, agg: &str) -> Result<Option<String>, RepositoryError> {
        let sql = format!(
            "SELECT {agg}(insert_date) FROM {}{}",
            self.table,
            self.build_where(None)
        );
        Ok(sqlx::query_scalar::<_, Option<String>>(&sql)
            .fetch_one(&self.pool)
            .await?)
    }

    /// Records from one harvest source.
    pub async fn query_source(&self, source: &str) -> Result<Vec<Record>, RepositoryError> {
        let mut sql = format!(
            "SELECT * FROM {} WHERE mdsource = {}",
            self.table,
            placeholder(1)
        );
        if let Some(mask) = &self.mask {
            sql.push_str(&format!(" AND ({mask})"));
        }
        Ok(sqlx::query_as::<_, Record>(&sql)
            .bind(source)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Insert one record.
    ///
    /// `anytext` is re-derived from the XML document and an empty
    /// `insert_date` is stamped, so the stored row always satisfies the
    /// derivation invariant no matter what the caller filled in.
    pub async fn insert(&self, record: &Record) -> Result<(), RepositoryError> {
        let mut record = record.clone();
        record.anytext = xml::get_anytext(&record.xml)?;
        if record.insert_date.is_empty() {
            record.insert_date = util::now_iso8601();
        }

        let names: Vec<&str> = COLUMNS.iter().map(|c| c.name).collect();
        let placeholders: Vec<String> = (1..=COLUMNS.len()).map(placeholder).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            names.join(", "),
            placeholders.join(", ")
        );

        let mut tx = self.pool.begin().await?;
        let mut query = sqlx::query(&sql);
        for column in COLUMNS {
            query = match record.column_value(column.name) {
                ColumnValue::Text(value) => query.bind(value.map(str::to_owned)),
                ColumnValue::Float(value) => query.bind(value),
            };
        }
        query.execute(&mut *tx).await?;
        tx.commit().await?;
        debug!("inserted record {}", record.identifier);
        Ok(())
    }

    /// Replace a record in full, addressed by its identifier. Every column
    /// except the identifier is written; `anytext` is re-derived from the
    /// incoming XML.
    pub async fn update(&self, record: &Record) -> Result<u64, RepositoryError> {
        let mut record = record.clone();
        record.anytext = xml::get_anytext(&record.xml)?;

        let columns: Vec<&str> = COLUMNS
            .iter()
            .map(|c| c.name)
            .filter(|name| *name != "identifier")
            .collect();
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{name} = {}", placeholder(i + 1)))
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {} WHERE identifier = {}",
            self.table,
            assignments.join(", "),
            placeholder(columns.len() + 1)
        );
        if let Some(mask) = &self.mask {
            sql.push_str(&format!(" AND ({mask})"));
        }

        let mut tx = self.pool.begin().await?;
        let mut query = sqlx::query(&sql);
        for name in &columns {
            query = match record.column_value(name) {
                ColumnValue::Text(value) => query.bind(value.map(str::to_owned)),
                ColumnValue::Float(value) => query.bind(value),
            };
        }
        query = query.bind(record.identifier.clone());
        let rows = query
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::Commit)?
            .rows_affected();
        tx.commit().await.map_err(RepositoryError::Commit)?;
        debug!("updated {rows} records");
        Ok(rows)
    }

    /// Property-level update of all rows matching a constraint.
    ///
    /// Each pair must resolve to both an XPath locator and a destination
    /// column; missing either is fatal before any row is touched. Per pair,
    /// in declaration order and inside one transaction, the column is set
    /// and the XML document is rewritten at the locator (text nodes change
    /// only where the current value differs), then `anytext` is recomputed
    /// from the result. Returns the row count of the last column-update
    /// step.
    pub async fn update_properties(
        &self,
        constraint: &Constraint,
        updates: &[PropertyUpdate],
    ) -> Result<u64, RepositoryError> {
        let mut resolved: Vec<(&PropertyUpdate, String, String)> = Vec::new();
        for update in updates {
            let def = self.queryables.resolve(None, &update.name)?;
            let xpath = def
                .xpath
                .clone()
                .ok_or_else(|| RepositoryError::MissingXpath(update.name.clone()))?;
            let dbcol = def
                .dbcol
                .clone()
                .ok_or_else(|| RepositoryError::MissingColumn(update.name.clone()))?;
            resolved.push((update, xpath, dbcol));
        }

        let select_sql = format!(
            "SELECT identifier, xml FROM {}{}",
            self.table,
            self.build_where(Some(constraint))
        );

        let mut tx = self.pool.begin().await?;
        let mut select = sqlx::query_as::<_, (String, String)>(&select_sql);
        for value in &constraint.values {
            select = select.bind(value);
        }
        let mut rows = select
            .fetch_all(&mut *tx)
            .await
            .map_err(RepositoryError::Commit)?;

        let namespaces = self.queryables.namespaces();
        let mut updated: u64 = 0;
        for (update, xpath, dbcol) in &resolved {
            let update_sql = format!(
                "UPDATE {} SET {dbcol} = {}, xml = {}, anytext = {} WHERE identifier = {}",
                self.table,
                placeholder(1),
                placeholder(2),
                placeholder(3),
                placeholder(4)
            );
            updated = 0;
            for (identifier, current_xml) in &mut rows {
                let new_xml = xml::update_xpath(namespaces, current_xml, xpath, &update.value)?;
                let anytext = xml::get_anytext(&new_xml)?;
                let result = sqlx::query(&update_sql)
                    .bind(&update.value)
                    .bind(&new_xml)
                    .bind(&anytext)
                    .bind(&*identifier)
                    .execute(&mut *tx)
                    .await
                    .map_err(RepositoryError::Commit)?;
                updated += result.rows_affected();
                // later pairs operate on the rewritten document
                *current_xml = new_xml;
            }
        }

        tx.commit().await.map_err(RepositoryError::Commit)?;
        debug!("updated {updated} records");
        Ok(updated)
    }

    /// Delete all rows matching a constraint, cascading to rows whose
    /// parent identifier is among the deleted ones. Parents and children
    /// go in one transaction; the returned count covers both.
    pub async fn delete(&self, constraint: &Constraint) -> Result<u64, RepositoryError> {
        debug!(
            "deleting records with constraint: {}",
            constraint.where_clause
        );
        let where_sql = self.build_where(Some(constraint));

        let mut tx = self.pool.begin().await?;

        // enumerate before deleting; the row set is gone afterwards
        let select_sql = format!("SELECT identifier FROM {}{}", self.table, where_sql);
        let mut select = sqlx::query_scalar::<_, String>(&select_sql);
        for value in &constraint.values {
            select = select.bind(value);
        }
        let parent_ids = select
            .fetch_all(&mut *tx)
            .await
            .map_err(RepositoryError::Commit)?;

        let delete_sql = format!("DELETE FROM {}{}", self.table, where_sql);
        let mut delete = sqlx::query(&delete_sql);
        for value in &constraint.values {
            delete = delete.bind(value);
        }
        let mut rows = delete
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::Commit)?
            .rows_affected();

        if rows > 0 && !parent_ids.is_empty() {
            debug!("deleting all child records");
            let placeholders: Vec<String> = (1..=parent_ids.len()).map(placeholder).collect();
            let mut sql = format!(
                "DELETE FROM {} WHERE parentidentifier IN ({})",
                self.table,
                placeholders.join(", ")
            );
            if let Some(mask) = &self.mask {
                sql.push_str(&format!(" AND ({mask})"));
            }
            let mut cascade = sqlx::query(&sql);
            for id in &parent_ids {
                cascade = cascade.bind(id);
            }
            rows += cascade
                .execute(&mut *tx)
                .await
                .map_err(RepositoryError::Commit)?
                .rows_affected();
        }

        tx.commit().await.map_err(RepositoryError::Commit)?;
        debug!("deleted {rows} records");
        Ok(rows)
    }

    /// Rebuild the table's indexes.
    pub async fn rebuild_indexes(&self) -> Result<(), RepositoryError> {
        info!("rebuilding indexes for {}", self.table);
        #[cfg(feature = "postgres")]
        let sql = format!("REINDEX TABLE {}", self.table);
        #[cfg(feature = "sqlite")]
        let sql = format!("REINDEX {}", self.table);
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Vacuum and analyze the backing store.
    pub async fn optimize(&self) -> Result<(), RepositoryError> {
        info!("optimizing database");
        #[cfg(feature = "postgres")]
        {
            sqlx::query("VACUUM ANALYZE").execute(&self.pool).await?;
        }
        #[cfg(feature = "sqlite")]
        {
            sqlx::query("VACUUM").execute(&self.pool).await?;
            sqlx::query("ANALYZE").execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Stable sort by a computed key; `Desc` reverses the comparison rather
/// than the result so stability is preserved.
fn sort_keyed<K>(rows: Vec<Record>, key: K, order: SortOrder) -> Vec<Record>
where
    K: Fn(&Record) -> f64,
{
    let mut keyed: Vec<(f64, Record)> = rows
        .into_iter()
        .map(|record| (key(&record), record))
        .collect();
    keyed.sort_by(|a, b| {
        let ordering = a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    keyed.into_iter().map(|(_, record)| record).collect()
}

fn text_column<'a>(record: &'a Record, column: &str) -> Option<&'a str> {
    match record.column_value(column) {
        ColumnValue::Text(value) => value,
        ColumnValue::Float(_) => None,
    }
}
