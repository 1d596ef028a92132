//! Spatial predicate evaluation over well-known text.

use geo::{EuclideanDistance, Geometry, LineString, Point, Polygon, Relate};

use super::parse_wkt;
use crate::error::RepositoryError;

/// Predicate names accepted by [`query_spatial`].
const SUPPORTED: &[&str] = &[
    "bbox",
    "beyond",
    "contains",
    "crosses",
    "disjoint",
    "dwithin",
    "equals",
    "intersects",
    "overlaps",
    "touches",
    "within",
];

/// Fail loudly on a predicate name outside the supported set.
///
/// Run before query execution so an unsupported name surfaces even when the
/// constraint matches zero rows.
pub fn ensure_supported(predicate: &str) -> Result<(), RepositoryError> {
    if SUPPORTED.contains(&predicate) {
        Ok(())
    } else {
        Err(RepositoryError::InvalidPredicate(predicate.to_string()))
    }
}

/// Evaluate a spatial predicate between two geometries.
///
/// `data_wkt` is the candidate row's geometry and may carry a dialect
/// prefix terminated by `;` (`SRID=4326;POLYGON(...)`), which is stripped
/// before parsing. `distance` applies to `beyond` and `dwithin` only.
///
/// Geometry parse failures and geometric-operation failures return
/// `Ok(false)`; only an unsupported predicate name is an error.
pub fn query_spatial(
    data_wkt: &str,
    input_wkt: &str,
    predicate: &str,
    distance: f64,
) -> Result<bool, RepositoryError> {
    let data = data_wkt.rsplit(';').next().unwrap_or(data_wkt);

    let (Some(a), Some(b)) = (parse_wkt(data), parse_wkt(input_wkt)) else {
        // mirror the per-row soft-failure contract even for junk input,
        // but an unknown predicate still has to surface
        ensure_supported(predicate)?;
        return Ok(false);
    };

    let result = match predicate {
        "bbox" | "intersects" => a.relate(&b).is_intersects(),
        "beyond" => min_distance(&a, &b) > distance,
        "contains" => a.relate(&b).is_contains(),
        "crosses" => a.relate(&b).is_crosses(),
        "disjoint" => a.relate(&b).is_disjoint(),
        "dwithin" => min_distance(&a, &b) <= distance,
        "equals" => a.relate(&b).is_equal_topo(),
        "overlaps" => {
            // intersects-and-not-touches, the definition the catalog has
            // always used; not DE-9IM overlaps
            let im = a.relate(&b);
            im.is_intersects() && !im.is_touches()
        }
        "touches" => a.relate(&b).is_touches(),
        "within" => a.relate(&b).is_within(),
        other => return Err(RepositoryError::InvalidPredicate(other.to_string())),
    };

    Ok(result)
}

/// Minimum euclidean distance between two geometries of any type.
///
/// Intersecting geometries are at distance zero; otherwise the distance is
/// the minimum over the primitive parts of both sides.
fn min_distance(a: &Geometry<f64>, b: &Geometry<f64>) -> f64 {
    if a.relate(b).is_intersects() {
        return 0.0;
    }
    let mut min = f64::INFINITY;
    for x in &decompose(a) {
        for y in &decompose(b) {
            min = min.min(part_distance(x, y));
        }
    }
    if min.is_finite() { min } else { 0.0 }
}

enum Part {
    Point(Point<f64>),
    Line(LineString<f64>),
    Poly(Polygon<f64>),
}

fn decompose(g: &Geometry<f64>) -> Vec<Part> {
    match g {
        Geometry::Point(p) => vec![Part::Point(*p)],
        Geometry::MultiPoint(mp) => mp.iter().map(|p| Part::Point(*p)).collect(),
        Geometry::Line(l) => vec![Part::Line(LineString::from(vec![l.start, l.end]))],
        Geometry::LineString(ls) => vec![Part::Line(ls.clone())],
        Geometry::MultiLineString(mls) => mls.iter().map(|ls| Part::Line(ls.clone())).collect(),
        Geometry::Polygon(p) => vec![Part::Poly(p.clone())],
        Geometry::MultiPolygon(mp) => mp.iter().map(|p| Part::Poly(p.clone())).collect(),
        Geometry::Rect(r) => vec![Part::Poly(r.to_polygon())],
        Geometry::Triangle(t) => vec![Part::Poly(t.to_polygon())],
        Geometry::GeometryCollection(gc) => gc.iter().flat_map(decompose).collect(),
    }
}

fn part_distance(a: &Part, b: &Part) -> f64 {
    match (a, b) {
        (Part::Point(x), Part::Point(y)) => x.euclidean_distance(y),
        (Part::Point(x), Part::Line(y)) => x.euclidean_distance(y),
        (Part::Point(x), Part::Poly(y)) => x.euclidean_distance(y),
        (Part::Line(x), Part::Point(y)) => x.euclidean_distance(y),
        (Part::Line(x), Part::Line(y)) => x.euclidean_distance(y),
        (Part::Line(x), Part::Poly(y)) => x.euclidean_distance(y),
        (Part::Poly(x), Part::Point(y)) => x.euclidean_distance(y),
        (Part::Poly(x), Part::Line(y)) => x.euclidean_distance(y),
        (Part::Poly(x), Part::Poly(y)) => x.euclidean_distance(y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const UNIT: &str = "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))";
    const SHIFTED: &str = "POLYGON((0.5 0.5, 1.5 0.5, 1.5 1.5, 0.5 1.5, 0.5 0.5))";
    const FAR: &str = "POLYGON((10 10, 11 10, 11 11, 10 11, 10 10))";
    const ADJACENT: &str = "POLYGON((1 0, 2 0, 2 1, 1 1, 1 0))";
    const INNER: &str = "POLYGON((0.25 0.25, 0.75 0.25, 0.75 0.75, 0.25 0.75, 0.25 0.25))";

    fn eval(a: &str, b: &str, predicate: &str) -> bool {
        query_spatial(a, b, predicate, 0.0).unwrap()
    }

    #[test]
    fn test_intersects_and_bbox_agree() {
        assert!(eval(UNIT, SHIFTED, "intersects"));
        assert!(eval(UNIT, SHIFTED, "bbox"));
        assert!(!eval(UNIT, FAR, "intersects"));
        assert!(!eval(UNIT, FAR, "bbox"));
    }

    #[test]
    fn test_disjoint_is_not_intersects() {
        for other in [SHIFTED, FAR, ADJACENT, INNER] {
            assert_eq!(
                eval(UNIT, other, "disjoint"),
                !eval(UNIT, other, "intersects"),
            );
        }
    }

    #[test]
    fn test_containment() {
        assert!(eval(UNIT, INNER, "contains"));
        assert!(!eval(INNER, UNIT, "contains"));
        assert!(eval(INNER, UNIT, "within"));
        assert!(!eval(UNIT, INNER, "within"));
    }

    #[test]
    fn test_equals() {
        assert!(eval(UNIT, UNIT, "equals"));
        assert!(!eval(UNIT, SHIFTED, "equals"));
    }

    #[test]
    fn test_touches_shared_edge_only() {
        assert!(eval(UNIT, ADJACENT, "touches"));
        assert!(!eval(UNIT, SHIFTED, "touches"));
        assert!(!eval(UNIT, FAR, "touches"));
    }

    #[test]
    fn test_overlaps_is_intersects_and_not_touches() {
        // edge-adjacent polygons intersect but only touch
        assert!(eval(UNIT, ADJACENT, "intersects"));
        assert!(!eval(UNIT, ADJACENT, "overlaps"));
        assert!(eval(UNIT, SHIFTED, "overlaps"));
        // containment still counts as overlaps under this definition
        assert!(eval(UNIT, INNER, "overlaps"));
    }

    #[test]
    fn test_crosses_line_through_polygon() {
        let line = "LINESTRING(-1 0.5, 2 0.5)";
        assert!(query_spatial(line, UNIT, "crosses", 0.0).unwrap());
        let outside = "LINESTRING(-1 5, 2 5)";
        assert!(!query_spatial(outside, UNIT, "crosses", 0.0).unwrap());
    }

    #[test]
    fn test_distance_predicates() {
        // UNIT and FAR are sqrt(81+81) ~ 12.73 apart at their closest corners
        assert!(query_spatial(UNIT, FAR, "beyond", 10.0).unwrap());
        assert!(!query_spatial(UNIT, FAR, "beyond", 20.0).unwrap());
        assert!(query_spatial(UNIT, FAR, "dwithin", 20.0).unwrap());
        assert!(!query_spatial(UNIT, FAR, "dwithin", 10.0).unwrap());
        // intersecting geometries are at distance zero
        assert!(query_spatial(UNIT, SHIFTED, "dwithin", 0.0).unwrap());
    }

    #[test]
    fn test_dialect_prefix_is_stripped() {
        let prefixed = format!("SRID=4326;{UNIT}");
        assert!(query_spatial(&prefixed, SHIFTED, "intersects", 0.0).unwrap());
    }

    #[test]
    fn test_malformed_geometry_is_a_non_match() {
        assert!(!query_spatial("", UNIT, "intersects", 0.0).unwrap());
        assert!(!query_spatial(UNIT, "garbage", "contains", 0.0).unwrap());
        assert!(!query_spatial("POLYGON((0 0", UNIT, "within", 0.0).unwrap());
    }

    #[test]
    fn test_unknown_predicate_is_an_error() {
        assert_matches!(
            query_spatial(UNIT, SHIFTED, "nearby", 0.0),
            Err(RepositoryError::InvalidPredicate(name)) if name == "nearby"
        );
        assert_matches!(
            ensure_supported("nearby"),
            Err(RepositoryError::InvalidPredicate(_))
        );
        assert!(ensure_supported("dwithin").is_ok());
    }
}
