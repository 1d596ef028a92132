//! Geometry evaluation for catalog queries.
//!
//! Geometries live in the catalog as well-known text. Everything here is a
//! pure function over that text: predicate evaluation for spatial filters,
//! and the overlay rank / area computations used for relevance ordering.
//! These run once per candidate row, so malformed geometry is a soft
//! failure (no match, zero score), never an abort.

mod predicates;
mod rank;

pub use predicates::{ensure_supported, query_spatial};
pub use rank::{OverlayRanker, geometry_area};

use std::str::FromStr;

use geo::Geometry;
use wkt::Wkt;

/// Parse well-known text into a geometry, `None` on any parse failure.
pub(crate) fn parse_wkt(text: &str) -> Option<Geometry<f64>> {
    let parsed = Wkt::<f64>::from_str(text.trim()).ok()?;
    Geometry::try_from(parsed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_polygon() {
        assert!(parse_wkt("POLYGON((0 0, 4 0, 4 4, 0 4, 0 0))").is_some());
    }

    #[test]
    fn test_parse_rejects_junk() {
        assert!(parse_wkt("").is_none());
        assert!(parse_wkt("not wkt at all").is_none());
        assert!(parse_wkt("POLYGON((0 0").is_none());
    }
}
