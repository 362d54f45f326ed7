//! Per-object bounding box filter and track identity allocation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock};

use nalgebra::{DMatrix, DVector};

use crate::bbox::Bbox;
use crate::error::TrackError;
use crate::kalman::{KalmanFilter, KalmanFilterParams};

const STATE_DIM: usize = 7;

static GLOBAL_IDS: LazyLock<TrackIdAllocator> = LazyLock::new(TrackIdAllocator::new);

/// Hands out track ids: monotonically increasing, never reused.
///
/// Every tracker in the process draws from [`TrackIdAllocator::global`] by
/// default, so ids stay unique process-wide even with several trackers on
/// several threads. Tests inject a fresh allocator to start from 1 again.
#[derive(Debug, Clone)]
pub struct TrackIdAllocator {
    next: Arc<AtomicU32>,
}

impl TrackIdAllocator {
    /// Fresh allocator whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU32::new(1)),
        }
    }

    /// The process-wide allocator.
    pub fn global() -> Self {
        GLOBAL_IDS.clone()
    }

    /// Consume and return the next id.
    pub fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

impl Default for TrackIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Kalman filter specialised to bounding-box state.
///
/// State layout: [cx, cy, s, r, vx, vy, vs] with s = w * h and r = w / h.
/// The aspect ratio carries no velocity component.
#[derive(Debug, Clone)]
pub struct KalmanBoxTracker {
    id: u32,
    kf: KalmanFilter,
    /// predict() calls since the last update()
    time_since_update: u32,
    /// consecutive frames with a matched detection, the founding one included
    hit_streak: u32,
    /// total predict() steps this filter has run
    age: u32,
}

impl KalmanBoxTracker {
    /// Start a filter on a detection box, consuming a fresh track id.
    pub fn new(bbox: &Bbox, ids: &TrackIdAllocator) -> Self {
        let z = bbox.to_z();
        let params = KalmanFilterParams {
            x: DVector::from_vec(vec![z[0], z[1], z[2], z[3], 0.0, 0.0, 0.0]),
            p: DMatrix::from_diagonal(&DVector::from_vec(vec![
                10.0, 10.0, 10.0, 10.0, 10_000.0, 10_000.0, 10_000.0,
            ])),
            f: DMatrix::from_row_slice(
                STATE_DIM,
                STATE_DIM,
                &[
                    1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, // cx' = cx + vx
                    0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, // cy' = cy + vy
                    0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, // s'  = s + vs
                    0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, // r'  = r
                    0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, //
                    0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, //
                    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, //
                ],
            ),
            h: DMatrix::from_row_slice(
                4,
                STATE_DIM,
                &[
                    1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
                    1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0,
                ],
            ),
            r: DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 1.0, 10.0, 10.0])),
            q: DMatrix::from_diagonal(&DVector::from_vec(vec![
                1.0, 1.0, 1.0, 1.0, 0.01, 0.01, 0.0001,
            ])),
        };

        Self {
            id: ids.next_id(),
            kf: KalmanFilter::new(params),
            time_since_update: 0,
            hit_streak: 1,
            age: 0,
        }
    }

    /// Advance the state one frame and return the predicted box.
    pub fn predict(&mut self) -> Bbox {
        // next-step area s + vs must stay positive
        if self.kf.x[6] + self.kf.x[2] <= 0.0 {
            self.kf.x[6] = 0.0;
        }

        self.kf.predict();
        self.age += 1;

        if self.time_since_update > 0 {
            self.hit_streak = 0;
        }
        self.time_since_update += 1;

        self.current_box()
    }

    /// Fold a matched detection into the state and return the corrected box.
    pub fn update(&mut self, bbox: &Bbox) -> Result<Bbox, TrackError> {
        self.time_since_update = 0;
        self.hit_streak += 1;

        let z = bbox.to_z();
        self.kf.update(&DVector::from_vec(z.to_vec()))?;
        Ok(self.current_box())
    }

    /// Center-form box of the current state estimate.
    pub fn current_box(&self) -> Bbox {
        let x = self.kf.state();
        Bbox::from_z(&[x[0], x[1], x[2], x[3]])
    }

    /// Read-only copy of the full state [cx, cy, s, r, vx, vy, vs].
    pub fn state(&self) -> [f32; 7] {
        let x = self.kf.state();
        [x[0], x[1], x[2], x[3], x[4], x[5], x[6]]
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn time_since_update(&self) -> u32 {
        self.time_since_update
    }

    pub fn hit_streak(&self) -> u32 {
        self.hit_streak
    }

    pub fn age(&self) -> u32 {
        self.age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_allocator_is_monotone() {
        let ids = TrackIdAllocator::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.allocated(), 2);
    }

    #[test]
    fn test_allocator_unique_across_threads() {
        let ids = TrackIdAllocator::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..100).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
    }

    #[test]
    fn test_stationary_box_stays_put() {
        let ids = TrackIdAllocator::new();
        let bbox = Bbox::new(100.0, 100.0, 40.0, 80.0);
        let mut tracker = KalmanBoxTracker::new(&bbox, &ids);

        for _ in 0..5 {
            tracker.predict();
            tracker.update(&bbox).unwrap();
        }

        let b = tracker.current_box();
        assert_abs_diff_eq!(b.cx, 100.0, epsilon = 0.5);
        assert_abs_diff_eq!(b.cy, 100.0, epsilon = 0.5);
        assert_abs_diff_eq!(b.w, 40.0, epsilon = 1.0);
        assert_abs_diff_eq!(b.h, 80.0, epsilon = 1.0);
        let state = tracker.state();
        assert_abs_diff_eq!(state[4], 0.0, epsilon = 0.1);
        assert_abs_diff_eq!(state[5], 0.0, epsilon = 0.1);
        assert_eq!(tracker.age(), 5);
    }

    #[test]
    fn test_moving_box_learns_velocity() {
        let ids = TrackIdAllocator::new();
        let mut tracker = KalmanBoxTracker::new(&Bbox::new(0.0, 0.0, 20.0, 20.0), &ids);

        for step in 1..=10 {
            tracker.predict();
            tracker
                .update(&Bbox::new(5.0 * step as f32, 0.0, 20.0, 20.0))
                .unwrap();
        }

        let state = tracker.state();
        assert_abs_diff_eq!(state[4], 5.0, epsilon = 0.5);
        assert_abs_diff_eq!(state[5], 0.0, epsilon = 0.5);
    }

    #[test]
    fn test_hit_streak_lifecycle() {
        let ids = TrackIdAllocator::new();
        let bbox = Bbox::new(10.0, 10.0, 4.0, 4.0);
        let mut tracker = KalmanBoxTracker::new(&bbox, &ids);
        // the founding detection opens the streak
        assert_eq!(tracker.hit_streak(), 1);
        assert_eq!(tracker.time_since_update(), 0);

        tracker.predict();
        assert_eq!(tracker.hit_streak(), 1);
        assert_eq!(tracker.time_since_update(), 1);

        tracker.update(&bbox).unwrap();
        assert_eq!(tracker.hit_streak(), 2);
        assert_eq!(tracker.time_since_update(), 0);

        // two predicts without an update break the streak
        tracker.predict();
        assert_eq!(tracker.hit_streak(), 2);
        tracker.predict();
        assert_eq!(tracker.hit_streak(), 0);
        assert_eq!(tracker.time_since_update(), 2);
    }

    #[test]
    fn test_area_velocity_guard() {
        let ids = TrackIdAllocator::new();
        let mut tracker = KalmanBoxTracker::new(&Bbox::new(10.0, 10.0, 4.0, 4.0), &ids);
        // force a shrink rate that would drive the area negative
        tracker.kf.x[6] = -100.0;

        let predicted = tracker.predict();
        assert!(tracker.state()[2] >= 0.0);
        assert!(predicted.is_finite());
        assert_abs_diff_eq!(predicted.w, 4.0, epsilon = 0.01);
    }
}
