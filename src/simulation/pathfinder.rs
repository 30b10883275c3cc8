//! A* shortest-path search over the segment graph
//!
//! Cost is accumulated travel time. The heuristic is the straight-line
//! distance between a candidate's end point and the target's end point
//! divided by an assumed free-flow speed. Street speeds vary, so this is
//! only approximately admissible: paths are near-optimal, which is fine for
//! fleet simulation and not meant for anything safety-critical.

use log::trace;
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::config::DEFAULT_FREE_FLOW_SPEED_MPS;
use super::road_network::RoadGraph;
use super::types::SegmentId;

/// An ordered list of segments from source to target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub segments: Vec<SegmentId>,
    /// Total travel time in seconds
    pub cost_secs: f64,
    /// Distance driven from the start of the first segment to the start of
    /// the last one
    pub length_m: f64,
}

impl Route {
    pub fn first(&self) -> Option<SegmentId> {
        self.segments.first().copied()
    }

    pub fn last(&self) -> Option<SegmentId> {
        self.segments.last().copied()
    }

    /// `true` if source and target are the same segment
    pub fn is_trivial(&self) -> bool {
        self.segments.len() <= 1
    }
}

/// Open-set entry. `Reverse` turns the max-heap into a min-heap on
/// `(f, g, id)`: lowest f first, then lowest g, then lowest id.
type OpenEntry = Reverse<(OrderedFloat<f64>, OrderedFloat<f64>, SegmentId)>;

/// Borrowed A* search over a [`RoadGraph`]
#[derive(Debug, Clone, Copy)]
pub struct PathFinder<'g> {
    graph: &'g RoadGraph,
    free_flow_speed_mps: f64,
}

impl<'g> PathFinder<'g> {
    pub fn new(graph: &'g RoadGraph) -> Self {
        Self::with_free_flow_speed(graph, DEFAULT_FREE_FLOW_SPEED_MPS)
    }

    pub fn with_free_flow_speed(graph: &'g RoadGraph, free_flow_speed_mps: f64) -> Self {
        Self {
            graph,
            free_flow_speed_mps: if free_flow_speed_mps > 0.0 {
                free_flow_speed_mps
            } else {
                DEFAULT_FREE_FLOW_SPEED_MPS
            },
        }
    }

    pub fn graph(&self) -> &'g RoadGraph {
        self.graph
    }

    /// Shortest path from `from` to `to` never entering a segment in `avoid`.
    ///
    /// Returns `None` when either end is unknown or the open set empties
    /// before the target is reached.
    pub fn shortest_path(
        &self,
        from: SegmentId,
        to: SegmentId,
        avoid: &HashSet<SegmentId>,
    ) -> Option<Route> {
        if !self.graph.contains(from) {
            return None;
        }
        if from == to {
            return Some(Route {
                segments: vec![from],
                cost_secs: 0.0,
                length_m: 0.0,
            });
        }
        if avoid.contains(&to) {
            return None;
        }

        let target_end = self.graph.segment(to)?.end;
        let heuristic = |segment_id: SegmentId| -> f64 {
            self.graph
                .segment(segment_id)
                .map(|s| s.end.distance(&target_end) / self.free_flow_speed_mps)
                .unwrap_or(0.0)
        };

        let mut open: BinaryHeap<OpenEntry> = BinaryHeap::new();
        let mut g_score: HashMap<SegmentId, f64> = HashMap::new();
        let mut came_from: HashMap<SegmentId, SegmentId> = HashMap::new();
        let mut closed: HashSet<SegmentId> = HashSet::new();

        g_score.insert(from, 0.0);
        open.push(Reverse((OrderedFloat(heuristic(from)), OrderedFloat(0.0), from)));

        while let Some(Reverse((_, OrderedFloat(g), current))) = open.pop() {
            if current == to {
                let route = self.reconstruct(&came_from, from, to, g);
                trace!("A* {:?} -> {:?}: {:?}", from, to, route.segments);
                return Some(route);
            }

            if !closed.insert(current) {
                continue;
            }

            let Some(neighbors) = self.graph.neighbors(current) else {
                continue;
            };

            for (next, travel_time) in neighbors {
                if avoid.contains(&next) || closed.contains(&next) {
                    continue;
                }

                let tentative = g + travel_time;
                let improves = g_score
                    .get(&next)
                    .map_or(true, |&known| tentative < known);

                if improves {
                    g_score.insert(next, tentative);
                    came_from.insert(next, current);
                    open.push(Reverse((
                        OrderedFloat(tentative + heuristic(next)),
                        OrderedFloat(tentative),
                        next,
                    )));
                }
            }
        }

        trace!("A* {:?} -> {:?}: open set exhausted", from, to);
        None
    }

    /// Shortest path with nothing avoided
    pub fn path(&self, from: SegmentId, to: SegmentId) -> Option<Route> {
        self.shortest_path(from, to, &HashSet::new())
    }

    fn reconstruct(
        &self,
        came_from: &HashMap<SegmentId, SegmentId>,
        from: SegmentId,
        to: SegmentId,
        cost_secs: f64,
    ) -> Route {
        let mut segments = vec![to];
        let mut current = to;
        while current != from {
            match came_from.get(&current) {
                Some(previous) => {
                    current = *previous;
                    segments.push(current);
                }
                None => break,
            }
        }
        segments.reverse();

        let length_m = segments[..segments.len() - 1]
            .iter()
            .filter_map(|id| self.graph.segment(*id))
            .map(|s| s.length_m)
            .sum();

        Route {
            segments,
            cost_secs,
            length_m,
        }
    }
}
