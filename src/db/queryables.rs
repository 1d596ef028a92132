//! Queryable name resolution.
//!
//! Callers address catalog properties by abstract queryable names
//! (`dc:title`, `apiso:TempExtent_begin`, ...). The mapping from those
//! names to physical columns and XPath locators is supplied as
//! configuration, built once per repository and immutable afterwards.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::RepositoryError;

/// Typename whose table merges every per-type mapping.
pub const ALL_TYPENAMES: &str = "_all";

/// Core queryables every repository understands, independent of the
/// mapping document. These carry no XPath; they address columns directly.
const CORE_MAPPINGS: &[(&str, &str)] = &[
    ("identifier", "identifier"),
    ("typename", "typename"),
    ("schema", "schema"),
    ("parentidentifier", "parentidentifier"),
    ("collections", "parentidentifier"),
    ("source", "mdsource"),
    ("insert_date", "insert_date"),
    ("updated", "insert_date"),
    ("language", "language"),
    ("type", "type"),
    ("title", "title"),
    ("description", "abstract"),
    ("keywords", "keywords"),
    ("anytext", "anytext"),
    ("xml", "xml"),
    ("bbox", "wkt_geometry"),
    ("date", "date"),
    ("datetime", "date"),
    ("time_begin", "time_begin"),
    ("time_end", "time_end"),
    ("platform", "platform"),
    ("instrument", "instrument"),
    ("sensortype", "sensortype"),
];

/// Physical binding of one queryable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryableDef {
    /// Destination column, when the queryable is column-backed.
    #[serde(default)]
    pub dbcol: Option<String>,
    /// XPath locator inside the record's XML document, when one exists.
    #[serde(default)]
    pub xpath: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TypenameMapping {
    queryables: HashMap<String, QueryableDef>,
}

/// Raw shape of the externally supplied mapping document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingDocument {
    #[serde(default)]
    pub namespaces: HashMap<String, String>,
    #[serde(default)]
    typenames: HashMap<String, TypenameMapping>,
}

/// The immutable queryable lookup built at repository construction.
#[derive(Debug, Clone)]
pub struct Queryables {
    namespaces: HashMap<String, String>,
    by_typename: HashMap<String, HashMap<String, QueryableDef>>,
}

impl Queryables {
    /// Build the lookup: per-typename tables plus the synthetic `_all`
    /// table merging every mapping and the built-in core queryables.
    pub fn from_document(document: MappingDocument) -> Self {
        let mut by_typename: HashMap<String, HashMap<String, QueryableDef>> = HashMap::new();
        let mut all: HashMap<String, QueryableDef> = HashMap::new();

        for (name, column) in CORE_MAPPINGS {
            all.insert(
                (*name).to_string(),
                QueryableDef {
                    dbcol: Some((*column).to_string()),
                    xpath: None,
                },
            );
        }

        for (typename, mapping) in document.typenames {
            all.extend(mapping.queryables.clone());
            by_typename.insert(typename, mapping.queryables);
        }

        by_typename.insert(ALL_TYPENAMES.to_string(), all);

        Self {
            namespaces: document.namespaces,
            by_typename,
        }
    }

    /// Parse a mapping document from JSON and build the lookup.
    pub fn from_json(text: &str) -> Result<Self, RepositoryError> {
        let document: MappingDocument = serde_json::from_str(text)
            .map_err(|err| RepositoryError::InvalidMapping(err.to_string()))?;
        Ok(Self::from_document(document))
    }

    /// Lookup with only the core mappings, for repositories that run
    /// without an external mapping document.
    pub fn core() -> Self {
        Self::from_document(MappingDocument::default())
    }

    /// Namespace prefix table used by XPath locators.
    pub fn namespaces(&self) -> &HashMap<String, String> {
        &self.namespaces
    }

    /// Resolve a queryable name, preferring the typename-specific table
    /// and falling back to `_all`. Unknown names are an error; the stages
    /// after this one trust the binding without re-validating.
    pub fn resolve(
        &self,
        typename: Option<&str>,
        name: &str,
    ) -> Result<&QueryableDef, RepositoryError> {
        if let Some(typename) = typename
            && let Some(def) = self.by_typename.get(typename).and_then(|m| m.get(name))
        {
            return Ok(def);
        }
        self.by_typename
            .get(ALL_TYPENAMES)
            .and_then(|m| m.get(name))
            .ok_or_else(|| RepositoryError::UnknownQueryable(name.to_string()))
    }

    /// Resolve a queryable straight to its destination column.
    pub fn column(&self, typename: Option<&str>, name: &str) -> Result<&str, RepositoryError> {
        let def = self.resolve(typename, name)?;
        def.dbcol
            .as_deref()
            .ok_or_else(|| RepositoryError::MissingColumn(name.to_string()))
    }
}
