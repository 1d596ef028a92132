//! Repository error taxonomy.

use thiserror::Error;

/// Errors surfaced by the repository engine.
///
/// Configuration problems (unknown queryables, missing bindings) are raised
/// before any transactional work starts. Transaction failures roll back
/// first and carry the original cause. Per-row spatial evaluation failures
/// never appear here; those degrade to "no match" / zero rank inside query
/// execution.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A queryable name has no mapping for the requested typename or `_all`.
    #[error("unknown queryable: {0}")]
    UnknownQueryable(String),

    /// A property update requires an XPath locator the mapping doesn't supply.
    #[error("no XPath binding for property {0}")]
    MissingXpath(String),

    /// A queryable resolves but carries no destination column.
    #[error("no column binding for property {0}")]
    MissingColumn(String),

    /// The queryable mapping document itself could not be parsed.
    #[error("invalid queryable mapping: {0}")]
    InvalidMapping(String),

    /// A spatial predicate name outside the supported set. Unlike malformed
    /// geometry this is a caller error and fails loudly.
    #[error("invalid spatial query predicate: {0}")]
    InvalidPredicate(String),

    /// A mutation failed mid-transaction; the transaction was rolled back.
    #[error("cannot commit to repository")]
    Commit(#[source] sqlx::Error),

    /// Any other backend error.
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// A malformed XML document where the document is the subject of the
    /// operation (payload decoding, property updates).
    #[error("invalid XML document: {0}")]
    Xml(String),
}
