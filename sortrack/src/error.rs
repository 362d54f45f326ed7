use thiserror::Error;

/// Errors produced by the tracking core.
///
/// Only the contract violations (`DetectionShape`, `DegenerateDetection`)
/// reach callers of [`crate::SortTracker::update`]; the remaining variants
/// are raised and consumed inside the tracker.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    /// Detection matrix does not follow the [cx, cy, w, h, score, class_id] layout.
    #[error("detection matrix must have 6 columns, got {0}")]
    DetectionShape(usize),
    /// A detection row carries a non-positive width or height.
    #[error("detection {index} has non-positive extent {width}x{height}")]
    DegenerateDetection {
        index: usize,
        width: f32,
        height: f32,
    },
    /// Innovation covariance could not be inverted during a Kalman update.
    #[error("innovation covariance is singular")]
    SingularInnovation,
    /// Step 6 of the assignment solver found nothing left to relax.
    #[error("cost matrix cannot be reduced any further")]
    UnsolvableMatrix,
}
