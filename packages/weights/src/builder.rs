//! Builders that derive [`SpatialWeights`] from geometry.
//!
//! Both builders index their inputs in an R-tree so that candidate
//! neighbors are found by envelope or radius queries instead of comparing
//! every pair of units.

use std::collections::BTreeSet;

use geo::{BoundingRect, Coord, Line, MultiPolygon, Point};
use rstar::{AABB, RTree, RTreeObject, primitives::GeomWithData};

use crate::{SpatialWeights, WeightsError};

/// Rule deciding when two polygons are neighbors.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Contiguity {
    /// Polygons sharing at least one vertex.
    #[default]
    Queen,
    /// Polygons sharing at least one edge.
    Rook,
}

impl std::fmt::Display for Contiguity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queen => write!(f, "queen"),
            Self::Rook => write!(f, "rook"),
        }
    }
}

/// Exact coordinate identity. `-0.0` and `0.0` compare equal.
type VertexKey = (u64, u64);

/// An undirected edge between two vertices, smaller key first.
type EdgeKey = (VertexKey, VertexKey);

/// Relative tolerance for collinearity and overlap of boundary segments.
const COLLINEAR_TOLERANCE: f64 = 1e-9;

/// A polygon stored in the R-tree with its vertex and edge sets.
struct PolygonEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
    vertices: BTreeSet<VertexKey>,
    edges: BTreeSet<EdgeKey>,
    segments: Vec<Line<f64>>,
}

impl RTreeObject for PolygonEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PolygonEntry {
    fn new(index: usize, polygon: &MultiPolygon<f64>) -> Self {
        let mut vertices = BTreeSet::new();
        let mut edges = BTreeSet::new();
        let mut segments = Vec::new();

        for part in &polygon.0 {
            for ring in std::iter::once(part.exterior()).chain(part.interiors()) {
                for line in ring.lines() {
                    let a = vertex_key(line.start.x, line.start.y);
                    let b = vertex_key(line.end.x, line.end.y);
                    vertices.insert(a);
                    vertices.insert(b);
                    if a != b {
                        edges.insert(if a < b { (a, b) } else { (b, a) });
                        segments.push(line);
                    }
                }
            }
        }

        Self {
            index,
            envelope: compute_envelope(polygon),
            vertices,
            edges,
            segments,
        }
    }

    fn touches(&self, other: &Self, rule: Contiguity) -> bool {
        let shares_edge = || !self.edges.is_disjoint(&other.edges) || self.overlaps(other);
        match rule {
            Contiguity::Queen => !self.vertices.is_disjoint(&other.vertices) || shares_edge(),
            Contiguity::Rook => shares_edge(),
        }
    }

    /// Whether any boundary segment runs along one of `other`'s for a
    /// positive length, even where the two sides split it at different
    /// vertices.
    fn overlaps(&self, other: &Self) -> bool {
        self.segments
            .iter()
            .filter(|line| line_in_envelope(line, &other.envelope))
            .any(|line| {
                other
                    .segments
                    .iter()
                    .filter(|candidate| line_in_envelope(candidate, &self.envelope))
                    .any(|candidate| collinear_overlap(line, candidate))
            })
    }
}

fn line_in_envelope(line: &Line<f64>, envelope: &AABB<[f64; 2]>) -> bool {
    let (lower, upper) = (envelope.lower(), envelope.upper());
    line.start.x.max(line.end.x) >= lower[0]
        && line.start.x.min(line.end.x) <= upper[0]
        && line.start.y.max(line.end.y) >= lower[1]
        && line.start.y.min(line.end.y) <= upper[1]
}

/// Whether `b` lies on the line through `a` and the two overlap for more
/// than a point.
fn collinear_overlap(a: &Line<f64>, b: &Line<f64>) -> bool {
    let delta = a.delta();
    let len_sq = delta.x * delta.x + delta.y * delta.y;
    if len_sq <= 0.0 {
        return false;
    }

    // |cross| / |a| is the distance from the line through a
    let cross = |p: Coord<f64>| delta.x * (p.y - a.start.y) - delta.y * (p.x - a.start.x);
    let tolerance = COLLINEAR_TOLERANCE * len_sq;
    if cross(b.start).abs() > tolerance || cross(b.end).abs() > tolerance {
        return false;
    }

    let along = |p: Coord<f64>| (delta.x * (p.x - a.start.x) + delta.y * (p.y - a.start.y)) / len_sq;
    let (s, e) = (along(b.start), along(b.end));
    s.max(e).min(1.0) - s.min(e).max(0.0) > COLLINEAR_TOLERANCE
}

fn vertex_key(x: f64, y: f64) -> VertexKey {
    ((x + 0.0).to_bits(), (y + 0.0).to_bits())
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

/// Builds binary contiguity weights over keyed polygons.
///
/// Shared vertices are matched on exact coordinates, which is what
/// topologically clean boundary files (e.g. TIGER tracts) provide. A shared
/// edge is either an identical segment or two collinear segments that
/// overlap for a positive length, so a boundary split at different
/// vertices on each side still links the pair. Boundaries that only
/// nearly coincide (slivers, gaps) are not linked. Units without any
/// touching polygon become islands.
///
/// # Errors
///
/// * [`WeightsError::DuplicateKey`] if a key repeats
pub fn contiguity(
    features: &[(String, MultiPolygon<f64>)],
    rule: Contiguity,
) -> Result<SpatialWeights, WeightsError> {
    let entries: Vec<PolygonEntry> = features
        .iter()
        .enumerate()
        .map(|(i, (_, polygon))| PolygonEntry::new(i, polygon))
        .collect();

    let mut adjacency = vec![Vec::new(); features.len()];
    let tree = RTree::bulk_load(entries);

    for entry in tree.iter() {
        for candidate in tree.locate_in_envelope_intersecting(&entry.envelope) {
            if candidate.index > entry.index && entry.touches(candidate, rule) {
                adjacency[entry.index].push(candidate.index);
                adjacency[candidate.index].push(entry.index);
            }
        }
    }

    let keys = features.iter().map(|(key, _)| key.clone()).collect();
    let weights = SpatialWeights::from_adjacency(keys, &adjacency)?;

    log::info!(
        "Built {rule} contiguity weights: {} units, {} links, {} islands",
        weights.len(),
        weights.s0(),
        weights.islands().len()
    );

    Ok(weights)
}

/// Builds binary distance-band weights over keyed points.
///
/// Two units are neighbors when their Euclidean distance, in coordinate
/// units, is at most `radius`. A unit is never its own neighbor; use
/// [`SpatialWeights::with_self`] for self-inclusive weights.
///
/// # Errors
///
/// * [`WeightsError::InvalidRadius`] if `radius` is negative or non-finite
/// * [`WeightsError::DuplicateKey`] if a key repeats
pub fn distance_band(
    points: &[(String, Point<f64>)],
    radius: f64,
) -> Result<SpatialWeights, WeightsError> {
    if !radius.is_finite() || radius < 0.0 {
        return Err(WeightsError::InvalidRadius(radius));
    }

    let tree: RTree<GeomWithData<[f64; 2], usize>> = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(i, (_, point))| GeomWithData::new([point.x(), point.y()], i))
            .collect(),
    );

    let radius_2 = radius * radius;
    let adjacency: Vec<Vec<usize>> = points
        .iter()
        .enumerate()
        .map(|(i, (_, point))| {
            tree.locate_within_distance([point.x(), point.y()], radius_2)
                .map(|neighbor| neighbor.data)
                .filter(|&j| j != i)
                .collect()
        })
        .collect();

    let keys = points.iter().map(|(key, _)| key.clone()).collect();
    let weights = SpatialWeights::from_adjacency(keys, &adjacency)?;

    log::info!(
        "Built distance band weights (radius {radius}): {} units, {} links, {} islands",
        weights.len(),
        weights.s0(),
        weights.islands().len()
    );

    Ok(weights)
}
