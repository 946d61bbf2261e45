use crate::utils::math::round;

/// Reference anchors centred on a `base_size` cell, one per (ratio, scale)
/// pair in ratio-major order, as `[xmin, ymin, xmax, ymax]` rows.
///
/// A ratio is height over width.
pub fn generate_anchors(base_size: usize, ratios: &[f32], scales: &[f32]) -> Vec<f32> {
    let base = base_size as f32;
    let (cx, cy) = ((base - 1.0) * 0.5, (base - 1.0) * 0.5);
    let mut anchors = Vec::with_capacity(4 * ratios.len() * scales.len());
    for &ratio in ratios {
        let r_w = round((base * base / ratio).sqrt());
        let r_h = round(r_w * ratio);
        for &scale in scales {
            let (rs_w, rs_h) = (r_w * scale, r_h * scale);
            anchors.extend_from_slice(&[
                cx - (rs_w - 1.0) * 0.5,
                cy - (rs_h - 1.0) * 0.5,
                cx + (rs_w - 1.0) * 0.5,
                cy + (rs_h - 1.0) * 0.5,
            ]);
        }
    }
    anchors
}

/// Input geometry of one proposal decode.
#[derive(Clone, Copy, Debug)]
pub struct ProposalGeometry {
    pub num_anchors: usize,
    pub height: usize,
    pub width: usize,
    pub feat_stride: usize,
    pub min_size: f32,
}

/// Decode every (location, anchor) pair into a 6-float row
/// `[xmin, ymin, xmax, ymax, score, valid]`, rows ordered location-major.
///
/// `scores` holds background then foreground channels, `deltas` holds
/// `(dx, dy, dw, dh)` for anchor `k` in channels `4k .. 4k+4`. Boxes are
/// clipped to the image from `im_info = [height, width, scale]`; `valid` is
/// 0 when a side is shorter than `min_size * scale`.
pub fn decode_proposals(
    anchors: &[f32],
    scores: &[f32],
    deltas: &[f32],
    im_info: &[f32],
    g: &ProposalGeometry,
    proposals: &mut [f32],
) {
    let spatial = g.height * g.width;
    let a = g.num_anchors;
    assert!(anchors.len() >= 4 * a, "proposal: anchors too small");
    assert!(scores.len() >= 2 * a * spatial, "proposal: scores too small");
    assert!(deltas.len() >= 4 * a * spatial, "proposal: deltas too small");
    assert!(proposals.len() >= 6 * a * spatial, "proposal: output too small");

    let (im_h, im_w, im_scale) = (im_info[0], im_info[1], im_info[2]);
    let min_box = g.min_size * im_scale;
    let clip = |v: f32, hi: f32| v.max(0.0).min(hi);

    for h in 0..g.height {
        for w in 0..g.width {
            let hw = h * g.width + w;
            let (shift_x, shift_y) = ((w * g.feat_stride) as f32, (h * g.feat_stride) as f32);
            for k in 0..a {
                let anchor = &anchors[4 * k..4 * k + 4];
                let x1 = anchor[0] + shift_x;
                let y1 = anchor[1] + shift_y;
                let x2 = anchor[2] + shift_x;
                let y2 = anchor[3] + shift_y;
                let aw = x2 - x1 + 1.0;
                let ah = y2 - y1 + 1.0;
                let ctr_x = x1 + 0.5 * aw;
                let ctr_y = y1 + 0.5 * ah;

                let delta = |c: usize| deltas[(4 * k + c) * spatial + hw];
                let pred_ctr_x = delta(0) * aw + ctr_x;
                let pred_ctr_y = delta(1) * ah + ctr_y;
                let pred_w = delta(2).exp() * aw;
                let pred_h = delta(3).exp() * ah;

                let px1 = clip(pred_ctr_x - 0.5 * pred_w, im_w - 1.0);
                let py1 = clip(pred_ctr_y - 0.5 * pred_h, im_h - 1.0);
                let px2 = clip(pred_ctr_x + 0.5 * pred_w - 1.0, im_w - 1.0);
                let py2 = clip(pred_ctr_y + 0.5 * pred_h - 1.0, im_h - 1.0);

                let valid = px2 - px1 + 1.0 >= min_box && py2 - py1 + 1.0 >= min_box;
                let row = &mut proposals[(hw * a + k) * 6..(hw * a + k) * 6 + 6];
                row.copy_from_slice(&[
                    px1,
                    py1,
                    px2,
                    py2,
                    scores[(a + k) * spatial + hw],
                    if valid { 1.0 } else { 0.0 },
                ]);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RectInfo {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    pub score: f32,
}

impl RectInfo {
    fn area(&self) -> f32 {
        (self.xmax - self.xmin + 1.0) * (self.ymax - self.ymin + 1.0)
    }

    // Areas are pixel-inclusive, the overlap is not.
    fn intersection(&self, other: &RectInfo) -> f32 {
        if self.xmin > other.xmax
            || self.xmax < other.xmin
            || self.ymin > other.ymax
            || self.ymax < other.ymin
        {
            return 0.0;
        }
        let w = self.xmax.min(other.xmax) - self.xmin.max(other.xmin);
        let h = self.ymax.min(other.ymax) - self.ymin.max(other.ymin);
        w * h
    }
}

/// Greedy NMS over rects already sorted by descending score: a rect is
/// kept iff its IoU with every kept rect is at most `threshold`.
pub fn nms_sorted(rects: &[RectInfo], threshold: f32) -> Vec<usize> {
    let areas: Vec<f32> = rects.iter().map(RectInfo::area).collect();
    let mut picked: Vec<usize> = Vec::new();
    for (n, rect) in rects.iter().enumerate() {
        let keep = picked.iter().all(|&p| {
            let inter = rect.intersection(&rects[p]);
            inter / (areas[n] + areas[p] - inter) <= threshold
        });
        if keep {
            picked.push(n);
        }
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nine_anchors_follow_their_ratios() {
        let ratios = [0.5, 1.0, 2.0];
        let anchors = generate_anchors(16, &ratios, &[8.0, 16.0, 32.0]);
        assert_eq!(anchors.len(), 9 * 4);
        for (i, anchor) in anchors.chunks(4).enumerate() {
            let w = anchor[2] - anchor[0] + 1.0;
            let h = anchor[3] - anchor[1] + 1.0;
            let ratio = ratios[i / 3];
            assert!((h / w - ratio).abs() / ratio < 0.05, "anchor {}: {}x{}", i, w, h);
            // Every anchor is centred on the base cell.
            assert!(((anchor[0] + anchor[2]) * 0.5 - 7.5).abs() < 1e-4);
        }
        // The classic first anchor.
        assert_eq!(&anchors[..4], &[-84.0, -40.0, 99.0, 55.0]);
    }

    #[test]
    fn zero_deltas_reproduce_shifted_anchors() {
        let anchors = [0.0, 0.0, 15.0, 15.0];
        let g = ProposalGeometry {
            num_anchors: 1,
            height: 1,
            width: 2,
            feat_stride: 16,
            min_size: 16.0,
        };
        let scores = [0.0, 0.0, 0.25, 0.75];
        let deltas = [0.0; 8];
        let mut out = vec![0.0; 12];
        decode_proposals(&anchors, &scores, &deltas, &[100.0, 100.0, 1.0], &g, &mut out);
        assert_eq!(&out[..6], &[0.0, 0.0, 15.0, 15.0, 0.25, 1.0]);
        assert_eq!(&out[6..], &[16.0, 0.0, 31.0, 15.0, 0.75, 1.0]);
    }

    #[test]
    fn clipping_and_min_size() {
        let anchors = [0.0, 0.0, 15.0, 15.0];
        let g = ProposalGeometry {
            num_anchors: 1,
            height: 1,
            width: 1,
            feat_stride: 16,
            min_size: 16.0,
        };
        let mut out = vec![0.0; 6];
        // Image narrower than the anchor: the box is clipped to 10 wide and dropped.
        decode_proposals(&anchors, &[0.0, 1.0], &[0.0; 4], &[100.0, 10.0, 1.0], &g, &mut out);
        assert_eq!(out[2], 9.0);
        assert_eq!(out[5], 0.0);
    }

    #[test]
    fn nms_keeps_disjoint_and_drops_overlapping() {
        let rect = |x: f32, score: f32| RectInfo {
            xmin: x,
            ymin: 0.0,
            xmax: x + 15.0,
            ymax: 15.0,
            score,
        };
        // A one-pixel shift overlaps 14x15 = 210 over a union of 302.
        let rects = [rect(0.0, 0.9), rect(1.0, 0.8), rect(40.0, 0.7)];
        assert_eq!(nms_sorted(&rects, 0.7), vec![0, 1, 2]);
        assert_eq!(nms_sorted(&rects, 0.69), vec![0, 2]);
    }

    #[test]
    fn touching_rects_do_not_overlap() {
        let a = RectInfo { xmin: 0.0, ymin: 0.0, xmax: 15.0, ymax: 15.0, score: 0.9 };
        let b = RectInfo { xmin: 15.0, ..a };
        let c = RectInfo { xmin: 16.0, xmax: 31.0, ..a };
        assert_eq!(a.intersection(&b), 0.0);
        assert_eq!(a.intersection(&c), 0.0);
        assert_eq!(a.area(), 256.0);
        assert_eq!(nms_sorted(&[a, b], 0.0), vec![0, 1]);
    }
}
