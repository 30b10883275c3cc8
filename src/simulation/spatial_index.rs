//! Bucketed spatial index over road segments
//!
//! Segments are registered in every bucket their bounding box touches, so a
//! radius query only has to look at the buckets overlapping the query circle.

use std::collections::{BTreeSet, HashMap};

use super::types::{Position, SegmentId};

#[derive(Debug, Clone)]
pub struct SpatialIndex {
    bucket_size: f64,
    buckets: HashMap<(i64, i64), Vec<SegmentId>>,
}

impl SpatialIndex {
    pub fn new(bucket_size: f64) -> Self {
        Self {
            bucket_size: if bucket_size > 0.0 { bucket_size } else { 1.0 },
            buckets: HashMap::new(),
        }
    }

    #[inline]
    fn bucket_of(&self, value: f64) -> i64 {
        (value / self.bucket_size).floor() as i64
    }

    pub fn insert(&mut self, segment: SegmentId, start: &Position, end: &Position) {
        let min_bx = self.bucket_of(start.x.min(end.x));
        let max_bx = self.bucket_of(start.x.max(end.x));
        let min_by = self.bucket_of(start.y.min(end.y));
        let max_by = self.bucket_of(start.y.max(end.y));

        for by in min_by..=max_by {
            for bx in min_bx..=max_bx {
                self.buckets.entry((bx, by)).or_default().push(segment);
            }
        }
    }

    /// Candidate segments whose bounding box may intersect the circle.
    ///
    /// Returned in ascending id order; callers still have to check the exact
    /// distance. A non-finite or negative radius matches nothing.
    pub fn query_radius(&self, center: &Position, radius: f64) -> BTreeSet<SegmentId> {
        let mut result = BTreeSet::new();
        if !radius.is_finite() || radius < 0.0 || !center.x.is_finite() || !center.y.is_finite() {
            return result;
        }

        let min_bx = self.bucket_of(center.x - radius);
        let max_bx = self.bucket_of(center.x + radius);
        let min_by = self.bucket_of(center.y - radius);
        let max_by = self.bucket_of(center.y + radius);

        let span = (max_bx as f64 - min_bx as f64 + 1.0) * (max_by as f64 - min_by as f64 + 1.0);
        if span > self.buckets.len() as f64 {
            // Fewer occupied buckets than cells in range: filter those instead
            for ((bx, by), bucket) in &self.buckets {
                if (min_bx..=max_bx).contains(bx) && (min_by..=max_by).contains(by) {
                    result.extend(bucket.iter().copied());
                }
            }
            return result;
        }

        for by in min_by..=max_by {
            for bx in min_bx..=max_bx {
                if let Some(bucket) = self.buckets.get(&(bx, by)) {
                    result.extend(bucket.iter().copied());
                }
            }
        }
        result
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
