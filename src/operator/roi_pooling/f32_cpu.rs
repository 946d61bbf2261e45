use crate::utils::math::round;

#[derive(Clone, Copy, Debug)]
pub struct RoiPoolGeometry {
    pub batch: usize,
    pub channels: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub pooled_h: usize,
    pub pooled_w: usize,
    pub spatial_scale: f32,
}

/// Max-pool each `[batch_index, xmin, ymin, xmax, ymax]` region of the NCHW
/// feature map into a fixed `pooled_h x pooled_w` grid.
///
/// Region corners are scaled into feature coordinates and rounded; bins
/// that fall outside the map produce 0.
pub fn roi_pooling(src: &[f32], rois: &[f32], num_rois: usize, g: &RoiPoolGeometry, dst: &mut [f32]) {
    let plane = g.in_h * g.in_w;
    let out_plane = g.pooled_h * g.pooled_w;
    assert!(src.len() >= g.batch * g.channels * plane, "roi_pooling: src too small");
    assert!(rois.len() >= num_rois * 5, "roi_pooling: rois too small");
    assert!(dst.len() >= num_rois * g.channels * out_plane, "roi_pooling: dst too small");

    let clip = |v: isize, hi: usize| v.clamp(0, hi as isize) as usize;

    for (n, roi) in rois.chunks_exact(5).take(num_rois).enumerate() {
        let batch = (roi[0].max(0.0) as usize).min(g.batch.saturating_sub(1));
        let start_w = round(roi[1] * g.spatial_scale) as isize;
        let start_h = round(roi[2] * g.spatial_scale) as isize;
        let end_w = round(roi[3] * g.spatial_scale) as isize;
        let end_h = round(roi[4] * g.spatial_scale) as isize;

        let roi_h = (end_h - start_h + 1).max(1) as f32;
        let roi_w = (end_w - start_w + 1).max(1) as f32;
        let bin_h = roi_h / g.pooled_h as f32;
        let bin_w = roi_w / g.pooled_w as f32;

        for c in 0..g.channels {
            let src_plane = &src[(batch * g.channels + c) * plane..][..plane];
            let dst_plane = &mut dst[(n * g.channels + c) * out_plane..][..out_plane];
            for ph in 0..g.pooled_h {
                let hs = clip((ph as f32 * bin_h).floor() as isize + start_h, g.in_h);
                let he = clip(((ph + 1) as f32 * bin_h).ceil() as isize + start_h, g.in_h);
                for pw in 0..g.pooled_w {
                    let ws = clip((pw as f32 * bin_w).floor() as isize + start_w, g.in_w);
                    let we = clip(((pw + 1) as f32 * bin_w).ceil() as isize + start_w, g.in_w);
                    let mut max = f32::NEG_INFINITY;
                    for h in hs..he {
                        for w in ws..we {
                            max = max.max(src_plane[h * g.in_w + w]);
                        }
                    }
                    dst_plane[ph * g.pooled_w + pw] = if hs >= he || ws >= we { 0.0 } else { max };
                }
            }
        }
    }
}
