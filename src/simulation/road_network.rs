//! Immutable road segment graph
//!
//! Segments are the nodes of the graph; an edge `a -> b` means a vehicle at
//! the end of `a` can continue onto `b`, and it is weighted with the travel
//! time of `a` itself.

use log::{debug, info};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::config::{DEFAULT_MIN_SPEED_MPS, DEFAULT_SPATIAL_CELL_SIZE_M};
use super::error::{RoutingError, RoutingResult};
use super::spatial_index::SpatialIndex;
use super::types::{GeoProjection, Position, SegmentId};

/// Endpoints closer than this are treated as the same junction
const ENDPOINT_TOLERANCE_M: f64 = 0.01;

/// Raw segment data handed over by the network-preparation collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub id: SegmentId,
    pub length_m: f64,
    pub speed_mps: f64,
    pub start: Position,
    pub end: Position,
    #[serde(default)]
    pub successors: Vec<SegmentId>,
    #[serde(default = "default_allows_vehicles")]
    pub allows_vehicles: bool,
}

fn default_allows_vehicles() -> bool {
    true
}

impl SegmentSpec {
    /// A drivable straight segment whose length is the endpoint distance
    pub fn straight(id: SegmentId, start: Position, end: Position, speed_mps: f64) -> Self {
        Self {
            id,
            length_m: start.distance(&end),
            speed_mps,
            start,
            end,
            successors: Vec::new(),
            allows_vehicles: true,
        }
    }
}

/// Fill every spec's successor list from shared endpoints: `b` follows `a`
/// when `b` starts where `a` ends. Lists come out sorted by id.
pub fn link_by_shared_endpoints(specs: &mut [SegmentSpec]) {
    let starts: Vec<(SegmentId, Position)> = specs.iter().map(|s| (s.id, s.start)).collect();

    for spec in specs.iter_mut() {
        let mut successors: Vec<SegmentId> = starts
            .iter()
            .filter(|(id, start)| *id != spec.id && start.distance(&spec.end) <= ENDPOINT_TOLERANCE_M)
            .map(|(id, _)| *id)
            .collect();
        successors.sort();
        spec.successors = successors;
    }
}

/// An immutable directed street segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub id: SegmentId,
    pub length_m: f64,
    pub speed_mps: f64,
    pub start: Position,
    pub end: Position,
    pub successors: Vec<SegmentId>,
    pub allows_vehicles: bool,
}

/// Construction options for [`RoadGraph`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphOptions {
    pub projection: GeoProjection,
    pub min_speed_mps: f64,
    pub spatial_cell_size_m: f64,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            projection: GeoProjection::default(),
            min_speed_mps: DEFAULT_MIN_SPEED_MPS,
            spatial_cell_size_m: DEFAULT_SPATIAL_CELL_SIZE_M,
        }
    }
}

/// Road graph with adjacency and a coordinate -> segment index
#[derive(Debug, Clone)]
pub struct RoadGraph {
    /// Segment-to-segment transitions weighted by travel time of the source
    graph: DiGraph<SegmentId, f64>,

    segment_to_node: HashMap<SegmentId, NodeIndex>,

    segments: BTreeMap<SegmentId, Segment>,

    spatial: SpatialIndex,

    projection: GeoProjection,

    min_speed_mps: f64,
}

impl RoadGraph {
    /// Build the graph with default options
    pub fn build(segments: Vec<SegmentSpec>) -> RoutingResult<Self> {
        Self::build_with(segments, GraphOptions::default())
    }

    /// Build the graph, validating ids and successor references
    pub fn build_with(segments: Vec<SegmentSpec>, options: GraphOptions) -> RoutingResult<Self> {
        let min_speed_mps = if options.min_speed_mps > 0.0 {
            options.min_speed_mps
        } else {
            DEFAULT_MIN_SPEED_MPS
        };

        let mut by_id: BTreeMap<SegmentId, Segment> = BTreeMap::new();
        for spec in segments {
            let id = spec.id;
            if !spec.length_m.is_finite() || spec.length_m < 0.0 {
                return Err(RoutingError::InvalidSpec(format!(
                    "segment {:?} has invalid length {}",
                    id, spec.length_m
                )));
            }
            if !spec.speed_mps.is_finite() || spec.speed_mps < 0.0 {
                return Err(RoutingError::InvalidSpec(format!(
                    "segment {:?} has invalid speed {}",
                    id, spec.speed_mps
                )));
            }

            let segment = Segment {
                id,
                length_m: spec.length_m,
                speed_mps: spec.speed_mps,
                start: spec.start,
                end: spec.end,
                successors: spec.successors,
                allows_vehicles: spec.allows_vehicles,
            };
            if by_id.insert(id, segment).is_some() {
                return Err(RoutingError::DuplicateSegment(id));
            }
        }

        for segment in by_id.values() {
            if let Some(missing) = segment.successors.iter().find(|s| !by_id.contains_key(s)) {
                return Err(RoutingError::MalformedGraph {
                    segment: segment.id,
                    successor: *missing,
                });
            }
        }

        let mut graph = DiGraph::with_capacity(by_id.len(), 0);
        let mut segment_to_node = HashMap::with_capacity(by_id.len());
        let mut spatial = SpatialIndex::new(options.spatial_cell_size_m);

        // BTreeMap order keeps node indices stable across identical inputs
        for segment in by_id.values() {
            let node = graph.add_node(segment.id);
            segment_to_node.insert(segment.id, node);
            spatial.insert(segment.id, &segment.start, &segment.end);
        }

        for segment in by_id.values() {
            let from = segment_to_node[&segment.id];
            let weight = segment.length_m / segment.speed_mps.max(min_speed_mps);
            for successor in &segment.successors {
                graph.add_edge(from, segment_to_node[successor], weight);
            }
        }

        let road_graph = Self {
            graph,
            segment_to_node,
            segments: by_id,
            spatial,
            projection: options.projection,
            min_speed_mps,
        };

        info!(
            "Road graph built: {} segments, {} transitions, {} strongly connected components",
            road_graph.segment_count(),
            road_graph.transition_count(),
            road_graph.component_count()
        );

        Ok(road_graph)
    }

    /// Gets a segment by ID
    pub fn segment(&self, segment_id: SegmentId) -> Option<&Segment> {
        self.segments.get(&segment_id)
    }

    pub fn contains(&self, segment_id: SegmentId) -> bool {
        self.segments.contains_key(&segment_id)
    }

    /// Iterate all segments in ascending id order
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn transition_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn projection(&self) -> &GeoProjection {
        &self.projection
    }

    /// Time to traverse a whole segment, `length / max(speed, min_speed)`
    pub fn travel_time(&self, segment_id: SegmentId) -> Option<f64> {
        self.segments
            .get(&segment_id)
            .map(|s| s.length_m / s.speed_mps.max(self.min_speed_mps))
    }

    /// Successors of a segment with the travel time spent on the segment
    /// itself before the transition
    pub fn neighbors(&self, segment_id: SegmentId) -> Option<Vec<(SegmentId, f64)>> {
        let node = self.segment_to_node.get(&segment_id)?;

        let mut neighbors: Vec<(SegmentId, f64)> = self
            .graph
            .edges(*node)
            .map(|edge| (self.graph[edge.target()], *edge.weight()))
            .collect();
        neighbors.sort_by_key(|(id, _)| *id);

        Some(neighbors)
    }

    /// Nearest drivable segment to a WGS84 coordinate within `radius_m`
    pub fn nearest_segment(&self, lat: f64, lon: f64, radius_m: f64) -> RoutingResult<SegmentId> {
        let position = self.projection.to_local(lat, lon);
        self.nearest_segment_at(&position, radius_m)
            .map(|(segment_id, _)| segment_id)
            .ok_or(RoutingError::NoSegmentInRadius { lat, lon, radius_m })
    }

    /// Nearest drivable segment to a planar position, with its distance.
    ///
    /// Ties go to the lower segment id.
    pub fn nearest_segment_at(&self, position: &Position, radius_m: f64) -> Option<(SegmentId, f64)> {
        let mut closest: Option<(SegmentId, f64)> = None;

        for segment_id in self.spatial.query_radius(position, radius_m) {
            let Some(segment) = self.segments.get(&segment_id) else {
                continue;
            };
            if !segment.allows_vehicles {
                continue;
            }

            let (point, _) = position.project_onto(&segment.start, &segment.end);
            let distance = position.distance(&point);
            if distance > radius_m {
                continue;
            }

            match closest {
                Some((_, best)) if distance >= best => {}
                _ => closest = Some((segment_id, distance)),
            }
        }

        debug!("Nearest segment to {:?}: {:?}", position, closest);
        closest
    }

    /// Number of strongly connected components; anything above one means
    /// some segments cannot reach others
    pub fn component_count(&self) -> usize {
        tarjan_scc(&self.graph).len()
    }

    /// Segments of the largest strongly connected component, ascending
    pub fn largest_component(&self) -> Vec<SegmentId> {
        let mut largest: Vec<SegmentId> = tarjan_scc(&self.graph)
            .into_iter()
            .max_by_key(|component| component.len())
            .unwrap_or_default()
            .into_iter()
            .map(|node| self.graph[node])
            .collect();
        largest.sort();
        largest
    }
}
