//! Spatial overlay ranking for geospatial search, per Lanfear (2006).
//! <http://pubs.usgs.gov/of/2006/1279/2006-1279.pdf>

use geo::{Area, BooleanOps, Geometry, MultiPolygon};
use tracing::warn;

use super::parse_wkt;

/// Area-overlap relevance scorer.
///
/// For a query geometry with area `Q`, a target geometry with area `T` and
/// an intersection of area `X`, the rank is `(X/Q)^kq * (X/T)^kt`, a value
/// in `[0, 1]`. Zero doubles as the failure sentinel: absent geometry, zero
/// area, or any parse/operation failure.
#[derive(Debug, Clone, Copy)]
pub struct OverlayRanker {
    kt: f64,
    kq: f64,
}

impl Default for OverlayRanker {
    fn default() -> Self {
        Self { kt: 1.0, kq: 1.0 }
    }
}

impl OverlayRanker {
    /// Ranker with explicit exponent weights for the target and query terms.
    pub fn new(kt: f64, kq: f64) -> Self {
        Self { kt, kq }
    }

    /// Overlay rank between a candidate geometry and the query geometry.
    pub fn rank(&self, target_wkt: Option<&str>, query_wkt: Option<&str>) -> f64 {
        let (Some(target_wkt), Some(query_wkt)) = (target_wkt, query_wkt) else {
            return 0.0;
        };
        let (Some(target), Some(query)) = (parse_wkt(target_wkt), parse_wkt(query_wkt)) else {
            return 0.0;
        };

        let q = query.unsigned_area();
        let t = target.unsigned_area();
        if q == 0.0 || t == 0.0 {
            warn!("geometry has no area");
            return 0.0;
        }

        let x = intersection_area(&target, &query);
        if self.kt == 1.0 && self.kq == 1.0 {
            (x / q) * (x / t)
        } else {
            (x / q).powf(self.kq) * (x / t).powf(self.kt)
        }
    }
}

/// Area of a geometry given as well-known text; 0 for absent or malformed
/// input. Used for spatial sorting.
pub fn geometry_area(wkt: Option<&str>) -> f64 {
    wkt.and_then(parse_wkt)
        .map(|g| g.unsigned_area())
        .unwrap_or(0.0)
}

fn intersection_area(a: &Geometry<f64>, b: &Geometry<f64>) -> f64 {
    match (as_multi_polygon(a), as_multi_polygon(b)) {
        (Some(a), Some(b)) => a.intersection(&b).unsigned_area(),
        _ => 0.0,
    }
}

/// Polygonal view of a geometry; non-areal geometries have no overlay rank.
fn as_multi_polygon(g: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match g {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        Geometry::Rect(r) => Some(MultiPolygon::new(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Some(MultiPolygon::new(vec![t.to_polygon()])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = "POLYGON((0 0, 4 0, 4 4, 0 4, 0 0))";
    const INNER: &str = "POLYGON((1 1, 3 1, 3 3, 1 3, 1 1))";
    const POINT: &str = "POINT(1 1)";

    #[test]
    fn test_identical_geometry_ranks_one() {
        let ranker = OverlayRanker::default();
        let rank = ranker.rank(Some(QUERY), Some(QUERY));
        assert!((rank - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_contained_target_rank() {
        // Q = 16, T = 4, X = 4 -> (4/16) * (4/4) = 0.25
        let ranker = OverlayRanker::default();
        let rank = ranker.rank(Some(INNER), Some(QUERY));
        assert!((rank - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_absent_geometry_ranks_zero() {
        let ranker = OverlayRanker::default();
        assert_eq!(ranker.rank(None, Some(QUERY)), 0.0);
        assert_eq!(ranker.rank(Some(QUERY), None), 0.0);
        assert_eq!(ranker.rank(None, None), 0.0);
    }

    #[test]
    fn test_zero_area_geometry_ranks_zero() {
        let ranker = OverlayRanker::default();
        assert_eq!(ranker.rank(Some(POINT), Some(QUERY)), 0.0);
        assert_eq!(ranker.rank(Some(QUERY), Some(POINT)), 0.0);
    }

    #[test]
    fn test_malformed_geometry_ranks_zero() {
        let ranker = OverlayRanker::default();
        assert_eq!(ranker.rank(Some("bogus"), Some(QUERY)), 0.0);
        assert_eq!(ranker.rank(Some(QUERY), Some("")), 0.0);
    }

    #[test]
    fn test_disjoint_target_ranks_zero() {
        let far = "POLYGON((10 10, 12 10, 12 12, 10 12, 10 10))";
        let ranker = OverlayRanker::default();
        assert_eq!(ranker.rank(Some(far), Some(QUERY)), 0.0);
    }

    #[test]
    fn test_custom_weights_damp_partial_overlap() {
        let flat = OverlayRanker::default();
        let weighted = OverlayRanker::new(2.0, 2.0);
        let base = flat.rank(Some(INNER), Some(QUERY));
        let damped = weighted.rank(Some(INNER), Some(QUERY));
        assert!((damped - base * base).abs() < 1e-9);
        // a perfect overlap is unaffected by the exponents
        assert!((weighted.rank(Some(QUERY), Some(QUERY)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_geometry_area() {
        assert_eq!(geometry_area(Some(QUERY)), 16.0);
        assert_eq!(geometry_area(Some(POINT)), 0.0);
        assert_eq!(geometry_area(Some("junk")), 0.0);
        assert_eq!(geometry_area(None), 0.0);
    }
}
