use std::fmt::{Display, Formatter, Result as FmtResult};

/// Minimum share of a box's area that must lie inside another same-class box
/// before [`nms`] drops it even when the IoU is low.
pub const COVER_THRESHOLD: f32 = 0.7;

/// IoU above which [`smooth`] treats an old box as the same object.
pub const SMOOTH_IOU_THRESHOLD: f32 = 0.7;

/// An axis-aligned detection in `(x, y, w, h)` form.
///
/// `class_index == -1` marks a suppressed box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub score: f32,
    pub class_index: i32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32, score: f32, class_index: i32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            score,
            class_index,
        }
    }

    pub fn from_corners(xmin: f32, ymin: f32, xmax: f32, ymax: f32, score: f32, class_index: i32) -> Self {
        Self::new(xmin, ymin, xmax - xmin, ymax - ymin, score, class_index)
    }

    /// `[xmin, ymin, xmax, ymax]`
    pub fn corners(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.w, self.y + self.h]
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn is_suppressed(&self) -> bool {
        self.class_index == -1
    }

    pub fn suppress(&mut self) {
        self.class_index = -1;
    }

    /// Overlap area, 0 when the boxes are disjoint on either axis.
    pub fn intersection(&self, other: &Self) -> f32 {
        let [ax1, ay1, ax2, ay2] = self.corners();
        let [bx1, by1, bx2, by2] = other.corners();
        let w = ax2.min(bx2) - ax1.max(bx1);
        let h = ay2.min(by2) - ay1.max(by1);
        if w <= 0.0 || h <= 0.0 { 0.0 } else { w * h }
    }

    pub fn union(&self, other: &Self) -> f32 {
        self.area() + other.area() - self.intersection(other)
    }

    pub fn iou(&self, other: &Self) -> f32 {
        let union = self.union(other);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection(other) / union
    }
}

impl Display for BoundingBox {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "BoundingBox(class={}, score={:.3}, x={:.1}, y={:.1}, w={:.1}, h={:.1})",
            self.class_index, self.score, self.x, self.y, self.w, self.h
        )
    }
}

/// Suppress overlapping same-class detections across every ROI.
///
/// Pairs are visited in flattened index order. Above `iou_threshold` the
/// lower-scored box goes; otherwise the strictly more covered box goes once
/// more than [`COVER_THRESHOLD`] of it lies inside the other. Equal covers
/// keep both. Because of the index ordering the result can depend on input
/// order.
pub fn nms(boxes: &[Vec<BoundingBox>], iou_threshold: f32) -> Vec<BoundingBox> {
    let mut all: Vec<BoundingBox> = boxes.iter().flatten().copied().collect();

    for i in 0..all.len() {
        if all[i].is_suppressed() {
            continue;
        }
        for j in i + 1..all.len() {
            if all[j].is_suppressed() || all[j].class_index != all[i].class_index {
                continue;
            }
            let (a, b) = (all[i], all[j]);
            let inter = a.intersection(&b);
            let iou = inter / (a.area() + b.area() - inter).max(f32::MIN_POSITIVE);
            let drop_i = if iou > iou_threshold {
                a.score < b.score
            } else {
                let cover_a = if a.area() > 0.0 { inter / a.area() } else { 0.0 };
                let cover_b = if b.area() > 0.0 { inter / b.area() } else { 0.0 };
                if cover_a > cover_b && cover_a > COVER_THRESHOLD {
                    true
                } else if cover_b > cover_a && cover_b > COVER_THRESHOLD {
                    false
                } else {
                    continue;
                }
            };
            if drop_i {
                all[i].suppress();
                break;
            }
            all[j].suppress();
        }
    }

    all.retain(|b| !b.is_suppressed());
    all
}

/// Blend each new box toward the first old box it overlaps by more than
/// [`SMOOTH_IOU_THRESHOLD`]: `new = old + (new - old) * alpha`.
pub fn smooth(old_boxes: &[BoundingBox], new_boxes: &mut [BoundingBox], alpha: f32) {
    for new in new_boxes.iter_mut() {
        let Some(old) = old_boxes.iter().find(|old| old.iou(new) > SMOOTH_IOU_THRESHOLD) else {
            continue;
        };
        new.x = old.x + (new.x - old.x) * alpha;
        new.y = old.y + (new.y - old.y) * alpha;
        new.w = old.w + (new.w - old.w) * alpha;
        new.h = old.h + (new.h - old.h) * alpha;
    }
}

/// Shift boxes detected inside a crop back into full-image coordinates.
///
/// `boxes[i]` belongs to `rois[i]`, whose origin is scaled by the image
/// `width`/`height`: pass the image size for normalized ROIs, 1 for pixel
/// ROIs. Box sizes are unchanged.
pub fn amend(boxes: &mut [Vec<BoundingBox>], rois: &[BoundingBox], height: f32, width: f32) {
    for (roi_boxes, roi) in boxes.iter_mut().zip(rois) {
        for b in roi_boxes.iter_mut() {
            b.x += roi.x * width;
            b.y += roi.y * height;
        }
    }
}

/// Boxes from `[batch_index, xmin, ymin, xmax, ymax]` rows, all class 0.
pub fn from_proposals(rows: &[f32]) -> Vec<BoundingBox> {
    rows.chunks_exact(5)
        .map(|r| BoundingBox::from_corners(r[1], r[2], r[3], r[4], 0.0, 0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32, score: f32) -> BoundingBox {
        BoundingBox::new(x, y, w, h, score, 0)
    }

    #[test]
    fn corners_round_trip() {
        let b = BoundingBox::from_corners(2.0, 3.0, 12.0, 8.0, 0.5, 1);
        assert_eq!((b.w, b.h), (10.0, 5.0));
        assert_eq!(b.corners(), [2.0, 3.0, 12.0, 8.0]);
        assert_eq!(b.area(), 50.0);
    }

    #[test]
    fn overlapping_box_is_suppressed() {
        let b1 = bbox(0.0, 0.0, 10.0, 10.0, 0.9);
        let b2 = bbox(1.0, 1.0, 10.0, 10.0, 0.5);
        let kept = nms(&[vec![b1, b2]], 0.5);
        assert_eq!(kept, vec![b1]);

        // Order does not matter for the IoU branch.
        let kept = nms(&[vec![b2], vec![b1]], 0.5);
        assert_eq!(kept, vec![b1]);
    }

    #[test]
    fn disjoint_boxes_survive() {
        let b1 = bbox(0.0, 0.0, 10.0, 10.0, 0.9);
        let b3 = bbox(100.0, 100.0, 10.0, 10.0, 0.9);
        assert_eq!(nms(&[vec![b1, b3]], 0.5), vec![b1, b3]);
    }

    #[test]
    fn other_classes_are_ignored() {
        let b1 = bbox(0.0, 0.0, 10.0, 10.0, 0.9);
        let mut b2 = b1;
        b2.class_index = 1;
        assert_eq!(nms(&[vec![b1, b2]], 0.5).len(), 2);
    }

    #[test]
    fn enclosed_box_is_removed_by_cover() {
        let big = bbox(0.0, 0.0, 10.0, 10.0, 0.2);
        let small = bbox(2.0, 2.0, 4.0, 4.0, 0.9);
        // IoU is 0.16, but the small box is fully covered.
        assert_eq!(nms(&[vec![big, small]], 0.5), vec![big]);
        assert_eq!(nms(&[vec![small, big]], 0.5), vec![big]);
    }

    #[test]
    fn equal_covers_keep_both_boxes() {
        // Same-area neighbours overlap 75% each way, below the 0.9 IoU.
        let a = bbox(0.0, 0.0, 4.0, 10.0, 0.5);
        let b = bbox(1.0, 0.0, 4.0, 10.0, 0.5);
        let c = bbox(2.0, 0.0, 4.0, 10.0, 0.5);
        assert_eq!(nms(&[vec![a, b]], 0.9), vec![a, b]);
        assert_eq!(nms(&[vec![a, b, c]], 0.9), vec![a, b, c]);
    }

    #[test]
    fn cover_chain_depends_on_input_order() {
        // b is 78% inside a, c lies wholly inside b and touches a.
        let a = bbox(0.0, 0.0, 10.0, 10.0, 0.5);
        let b = bbox(3.0, 0.0, 9.0, 10.0, 0.5);
        let c = bbox(10.0, 0.0, 2.0, 10.0, 0.5);
        // a drops b before b can drop c.
        assert_eq!(nms(&[vec![a, b, c]], 0.9), vec![a, c]);
        // b drops c, then a drops b.
        assert_eq!(nms(&[vec![b, c, a]], 0.9), vec![a]);
    }

    #[test]
    fn smooth_blends_first_match() {
        let old = [bbox(0.0, 0.0, 10.0, 10.0, 0.9), bbox(0.0, 0.0, 10.0, 10.0, 0.9)];
        let mut new = [bbox(1.0, 0.0, 10.0, 10.0, 0.8), bbox(50.0, 50.0, 5.0, 5.0, 0.8)];
        smooth(&old, &mut new, 0.5);
        assert_eq!(new[0].x, 0.5);
        assert_eq!(new[1].x, 50.0);
    }

    #[test]
    fn amend_offsets_by_the_roi_origin() {
        let mut boxes = vec![vec![bbox(5.0, 5.0, 10.0, 10.0, 0.7)]];
        amend(&mut boxes, &[bbox(100.0, 200.0, 50.0, 50.0, 0.0)], 1.0, 1.0);
        assert_eq!(boxes[0][0].corners(), [105.0, 205.0, 115.0, 215.0]);

        let mut boxes = vec![vec![bbox(5.0, 5.0, 10.0, 10.0, 0.7)], vec![]];
        let rois = [bbox(0.5, 0.25, 0.5, 0.5, 0.0), bbox(0.0, 0.0, 1.0, 1.0, 0.0)];
        amend(&mut boxes, &rois, 200.0, 100.0);
        assert_eq!(boxes[0][0].corners(), [55.0, 55.0, 65.0, 65.0]);
    }

    #[test]
    fn proposals_become_class_zero_boxes() {
        let rows = [0.0, 1.0, 2.0, 11.0, 22.0, 0.0, 5.0, 5.0, 6.0, 6.0];
        let boxes = from_proposals(&rows);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].corners(), [1.0, 2.0, 11.0, 22.0]);
        assert!(boxes.iter().all(|b| b.class_index == 0));
    }

    fn any_box() -> impl Strategy<Value = BoundingBox> {
        (-50.0f32..50.0, -50.0f32..50.0, 0.5f32..40.0, 0.5f32..40.0)
            .prop_map(|(x, y, w, h)| bbox(x, y, w, h, 1.0))
    }

    proptest! {
        #[test]
        fn iou_is_symmetric_and_bounded(a in any_box(), b in any_box()) {
            let (ab, ba) = (a.iou(&b), b.iou(&a));
            prop_assert!((ab - ba).abs() < 1e-6);
            prop_assert!((0.0..=1.0 + 1e-6).contains(&ab));
            prop_assert!((a.iou(&a) - 1.0).abs() < 1e-5);
        }

        #[test]
        fn disjoint_boxes_have_zero_iou(a in any_box(), gap in 0.0f32..10.0) {
            let b = bbox(a.x + a.w + gap, a.y, a.w, a.h, 1.0);
            prop_assert_eq!(a.iou(&b), 0.0);
        }
    }
}
