//! Per-frame SORT driver: prediction, association, lifecycle.

use log::{debug, warn};
use ndarray::prelude::*;
use num::cast;
use serde::{Deserialize, Serialize};

use crate::bbox::{iou_matrix, Bbox};
use crate::box_tracker::{KalmanBoxTracker, TrackIdAllocator};
use crate::error::TrackError;
use crate::hungarian::HungarianSolver;

/// Columns of the detection input: [cx, cy, w, h, score, class_id].
pub const DETECTION_COLS: usize = 6;
/// Columns of the tracked output: [cx, cy, w, h, score, class_id, vx, vy, track_id].
pub const TRACK_COLS: usize = 9;

/// Lifecycle and association parameters of a [`SortTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Frames a track may coast without a matched detection before removal.
    pub max_age: u32,
    /// Consecutive hits required before a track is emitted.
    pub min_hits: u32,
    /// Minimum IoU for a solver pair to count as a match.
    pub iou_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_age: 1,
            min_hits: 3,
            iou_threshold: 0.3,
        }
    }
}

/// Result of matching one frame's detections against track predictions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Association {
    /// Accepted (detection index, prediction index) pairs.
    pub matched: Vec<(usize, usize)>,
    pub unmatched_detections: Vec<usize>,
    pub unmatched_predictions: Vec<usize>,
}

/// Match detections to predictions: IoU matrix, 1 - IoU costs, assignment
/// solver, then the IoU threshold filter on the proposed pairs.
///
/// An unsolvable cost matrix is not an error here; the frame is simply
/// treated as fully unmatched.
pub fn associate(detections: &[Bbox], predictions: &[Bbox], iou_threshold: f32) -> Association {
    let mut association = Association {
        matched: Vec::new(),
        unmatched_detections: (0..detections.len()).collect(),
        unmatched_predictions: (0..predictions.len()).collect(),
    };
    if detections.is_empty() || predictions.is_empty() {
        return association;
    }

    let ious = iou_matrix(detections, predictions);
    let costs = ious.mapv(|v| 1.0 - v);
    let pairs = match HungarianSolver::solve(costs.view()) {
        Ok(pairs) => pairs,
        Err(err) => {
            warn!("assignment failed, treating frame as unmatched: {err}");
            return association;
        }
    };

    for (det_idx, pred_idx) in pairs {
        if ious[[det_idx, pred_idx]] >= iou_threshold {
            association.matched.push((det_idx, pred_idx));
            association.unmatched_detections.retain(|&d| d != det_idx);
            association.unmatched_predictions.retain(|&p| p != pred_idx);
        }
    }
    association
}

/// SORT: a set of Kalman box filters kept in sync with per-frame
/// detections through IoU association.
///
/// One instance tracks one camera stream; it is not meant to be shared
/// across threads. Track ids come from the process-wide allocator unless
/// one is injected via [`SortTracker::with_id_allocator`].
#[derive(Debug)]
pub struct SortTracker {
    config: TrackerConfig,
    ids: TrackIdAllocator,
    trackers: Vec<KalmanBoxTracker>,
}

impl SortTracker {
    pub fn new(max_age: u32, min_hits: u32, iou_threshold: f32) -> Self {
        Self::with_config(TrackerConfig {
            max_age,
            min_hits,
            iou_threshold,
        })
    }

    pub fn with_config(config: TrackerConfig) -> Self {
        Self::with_id_allocator(config, TrackIdAllocator::global())
    }

    /// Tracker drawing ids from a caller-owned allocator.
    pub fn with_id_allocator(config: TrackerConfig, ids: TrackIdAllocator) -> Self {
        Self {
            config,
            ids,
            trackers: Vec::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Number of live tracks, confirmed or not.
    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Drop every live track. Ids keep increasing; none are reused.
    pub fn clear(&mut self) {
        self.trackers.clear();
    }

    /// Advance one frame.
    ///
    /// `detections` is (m, 6) rows of [cx, cy, w, h, score, class_id]; the
    /// result is (k, 9) rows of [cx, cy, w, h, score, class_id, vx, vy,
    /// track_id], one per confirmed track matched this frame. Must be
    /// called once per frame, with an empty matrix when nothing was
    /// detected.
    pub fn update(&mut self, detections: ArrayView2<f32>) -> Result<Array2<f32>, TrackError> {
        let boxes = parse_detections(detections)?;

        // predict stage: advance every filter, dropping the ones whose
        // prediction is no longer finite; predictions stay index-aligned
        // with the surviving filters
        let predictions = self.predict_tracks();

        // associate stage
        let association = associate(&boxes, &predictions, self.config.iou_threshold);

        // update stage: correct matched filters, emit confirmed rows
        let mut rows: Vec<[f32; TRACK_COLS]> = Vec::new();
        let mut dead: Vec<usize> = Vec::new();
        for &(det_idx, pred_idx) in &association.matched {
            match self.trackers[pred_idx].update(&boxes[det_idx]) {
                Ok(corrected) => {
                    let tracker = &self.trackers[pred_idx];
                    if tracker.hit_streak() >= self.config.min_hits {
                        let state = tracker.state();
                        let det = detections.row(det_idx);
                        rows.push([
                            corrected.cx,
                            corrected.cy,
                            corrected.w,
                            corrected.h,
                            det[4],
                            det[5],
                            state[4],
                            state[5],
                            cast(tracker.id()).unwrap(),
                        ]);
                    }
                }
                Err(err) => {
                    warn!(
                        "track {} dropped on failed update: {err}",
                        self.trackers[pred_idx].id()
                    );
                    dead.push(pred_idx);
                }
            }
        }
        dead.sort_unstable_by(|a, b| b.cmp(a));
        for idx in dead {
            self.trackers.remove(idx);
        }

        // age stage
        let max_age = self.config.max_age;
        self.trackers
            .retain(|tracker| tracker.time_since_update() <= max_age);

        // birth stage
        for &det_idx in &association.unmatched_detections {
            self.trackers
                .push(KalmanBoxTracker::new(&boxes[det_idx], &self.ids));
        }

        debug!(
            "frame: {} detections, {} matched, {} emitted, {} live",
            boxes.len(),
            association.matched.len(),
            rows.len(),
            self.trackers.len()
        );

        if rows.is_empty() {
            Ok(Array2::zeros((0, TRACK_COLS)))
        } else {
            let mut data = Vec::with_capacity(rows.len() * TRACK_COLS);
            for row in &rows {
                data.extend_from_slice(row);
            }
            Ok(Array2::from_shape_vec((rows.len(), TRACK_COLS), data).unwrap())
        }
    }

    fn predict_tracks(&mut self) -> Vec<Bbox> {
        let mut survivors = Vec::with_capacity(self.trackers.len());
        let mut predictions = Vec::with_capacity(self.trackers.len());
        for mut tracker in self.trackers.drain(..) {
            let predicted = tracker.predict();
            if predicted.is_finite() {
                predictions.push(predicted);
                survivors.push(tracker);
            } else {
                debug!("track {} retired on non-finite prediction", tracker.id());
            }
        }
        self.trackers = survivors;
        predictions
    }
}

fn parse_detections(detections: ArrayView2<f32>) -> Result<Vec<Bbox>, TrackError> {
    if detections.ncols() != DETECTION_COLS {
        return Err(TrackError::DetectionShape(detections.ncols()));
    }
    let mut boxes = Vec::with_capacity(detections.nrows());
    for (index, row) in detections.rows().into_iter().enumerate() {
        let (width, height) = (row[2], row[3]);
        if !(width > 0.0 && height > 0.0) {
            return Err(TrackError::DegenerateDetection {
                index,
                width,
                height,
            });
        }
        boxes.push(Bbox::new(row[0], row[1], width, height));
    }
    Ok(boxes)
}
