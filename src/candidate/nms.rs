//! Class-aware non-maximum suppression for box detections.

use crate::candidate::topk::sort_by_score_desc;
use crate::structures::{box_iou, BoxCoords};

/// Greedy IoU suppression that only compares boxes of the same class.
///
/// Candidates are visited by descending score (input order on ties) and
/// kept if their IoU with every previously kept box of the same class is at
/// most `iou_threshold`. Returns the kept indices in visiting order.
pub fn batched_nms(
    boxes: &[BoxCoords],
    scores: &[f32],
    classes: &[usize],
    iou_threshold: f32,
) -> Vec<usize> {
    let count = boxes.len().min(scores.len()).min(classes.len());
    let mut order: Vec<usize> = (0..count).collect();
    sort_by_score_desc(&mut order, |&idx| scores[idx]);

    let mut kept: Vec<usize> = Vec::new();
    'outer: for idx in order {
        for &kept_idx in kept.iter() {
            if classes[kept_idx] != classes[idx] {
                continue;
            }
            if box_iou(&boxes[idx], &boxes[kept_idx]) > iou_threshold {
                continue 'outer;
            }
        }
        kept.push(idx);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::batched_nms;

    #[test]
    fn suppresses_overlapping_boxes_of_same_class() {
        let boxes = [
            [0.0, 0.0, 10.0, 10.0],
            [1.0, 1.0, 10.0, 10.0],
            [20.0, 20.0, 30.0, 30.0],
        ];
        let keep = batched_nms(&boxes, &[0.8, 0.9, 0.5], &[0, 0, 0], 0.5);
        assert_eq!(keep, vec![1, 2]);
    }

    #[test]
    fn different_classes_do_not_suppress_each_other() {
        let boxes = [[0.0, 0.0, 10.0, 10.0], [0.0, 0.0, 10.0, 10.0]];
        let keep = batched_nms(&boxes, &[0.8, 0.9], &[0, 1], 0.5);
        assert_eq!(keep, vec![1, 0]);
    }

    #[test]
    fn empty_input_keeps_nothing() {
        assert!(batched_nms(&[], &[], &[], 0.5).is_empty());
    }
}
