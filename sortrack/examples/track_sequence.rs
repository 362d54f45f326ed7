use anyhow::Result;
use ndarray::Array2;
use sortrack::{SortTracker, TrackIdAllocator, TrackerConfig};

/// Two synthetic objects on crossing linear trajectories.
fn detections_for(step: usize) -> Array2<f32> {
    let t = step as f32;
    let rows = [
        [20.0 + 8.0 * t, 60.0, 24.0, 24.0, 0.9, 0.0],
        [180.0 - 8.0 * t, 66.0, 24.0, 24.0, 0.8, 0.0],
    ];
    let mut data = Vec::with_capacity(12);
    for row in &rows {
        data.extend_from_slice(row);
    }
    Array2::from_shape_vec((2, 6), data).unwrap()
}

fn main() -> Result<()> {
    let config = TrackerConfig {
        max_age: 3,
        min_hits: 3,
        iou_threshold: 0.3,
    };
    let mut tracker = SortTracker::with_id_allocator(config, TrackIdAllocator::new());

    for step in 0..20 {
        let tracks = tracker.update(detections_for(step).view())?;
        println!("frame {step:>2}: {} confirmed tracks", tracks.nrows());
        for row in tracks.rows() {
            println!(
                "  id {:>2}  center ({:>6.1}, {:>6.1})  velocity ({:>5.1}, {:>5.1})",
                row[8] as u32,
                row[0],
                row[1],
                row[6],
                row[7]
            );
        }
    }

    Ok(())
}
