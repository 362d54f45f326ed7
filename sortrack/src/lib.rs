//! SORT (Simple Online and Realtime Tracking) in pure Rust
//!
//! Per-frame association of externally produced detections to
//! constant-velocity Kalman filters that keep object identity stable
//! across frames. Three parts: a bounding-box Kalman filter
//! ([`KalmanBoxTracker`]), a Kuhn-Munkres assignment solver
//! ([`HungarianSolver`]), and the per-frame driver ([`SortTracker`]) that
//! owns the filters and applies the lifecycle rules.
//!
//! Detections go in as an (m, 6) matrix of
//! [cx, cy, w, h, score, class_id] rows; confirmed tracks come out as a
//! (k, 9) matrix of [cx, cy, w, h, score, class_id, vx, vy, track_id]:
//!
//! ```rust,ignore
//! use ndarray::array;
//! use sortrack::SortTracker;
//!
//! let mut tracker = SortTracker::new(1, 3, 0.3);
//! for detections in frames {
//!     let tracks = tracker.update(detections.view())?;
//! }
//! ```
//!
//! Detectors, image decoding, and rendering are the host application's
//! business; this crate only maintains the tracks.

pub mod bbox;
pub mod box_tracker;
pub mod error;
pub mod hungarian;
pub mod kalman;
pub mod tracker;

pub use box_tracker::{KalmanBoxTracker, TrackIdAllocator};
pub use error::TrackError;
pub use hungarian::HungarianSolver;
pub use tracker::{associate, Association, SortTracker, TrackerConfig};
