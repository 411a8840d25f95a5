use std::cmp::Ordering;

use super::Detection;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

/// Greedy non-max suppression. Keeps the best-scoring detection of every
/// overlapping cluster; equal scores keep detection order. Survivors are
/// returned in detection order, not score order.
pub fn deduplicate(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let mut sorted: Vec<(usize, Detection)> = detections.into_iter().enumerate().collect();
    sorted.sort_by(|(_, a), (_, b)| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<(usize, Detection)> = Vec::with_capacity(sorted.len());
    'outer: for (idx, candidate) in sorted {
        for (_, existing) in &kept {
            if existing.bbox.iou(&candidate.bbox) > iou_threshold {
                continue 'outer;
            }
        }
        kept.push((idx, candidate));
    }
    kept.sort_by_key(|(idx, _)| *idx);
    kept.into_iter().map(|(_, detection)| detection).collect()
}
