#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolMode {
    Max,
    Ave,
}

#[derive(Clone, Copy, Debug)]
pub struct PoolGeometry {
    pub batch: usize,
    pub channels: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub stride: usize,
    pub pad: usize,
    pub out_h: usize,
    pub out_w: usize,
}

/// NCHW 2-D pooling.
///
/// Max windows are clipped to the input. Average windows divide by the
/// window size clipped to the padded input, so padding counts as zeros.
pub fn pooling(src: &[f32], g: &PoolGeometry, mode: PoolMode, dst: &mut [f32]) {
    let planes = g.batch * g.channels;
    assert!(src.len() >= planes * g.in_h * g.in_w, "pooling: src too small");
    assert!(dst.len() >= planes * g.out_h * g.out_w, "pooling: dst too small");
    let pad = g.pad as isize;

    for p in 0..planes {
        let plane = &src[p * g.in_h * g.in_w..(p + 1) * g.in_h * g.in_w];
        let out = &mut dst[p * g.out_h * g.out_w..(p + 1) * g.out_h * g.out_w];
        for ph in 0..g.out_h {
            for pw in 0..g.out_w {
                let h0 = (ph * g.stride) as isize - pad;
                let w0 = (pw * g.stride) as isize - pad;
                let value = match mode {
                    PoolMode::Max => {
                        let hs = h0.max(0) as usize;
                        let ws = w0.max(0) as usize;
                        let he = ((h0 + g.kernel_h as isize).min(g.in_h as isize)).max(0) as usize;
                        let we = ((w0 + g.kernel_w as isize).min(g.in_w as isize)).max(0) as usize;
                        if hs >= he || ws >= we {
                            0.0
                        } else {
                            let mut max = f32::NEG_INFINITY;
                            for h in hs..he {
                                for w in ws..we {
                                    max = max.max(plane[h * g.in_w + w]);
                                }
                            }
                            max
                        }
                    }
                    PoolMode::Ave => {
                        let he = (h0 + g.kernel_h as isize).min(g.in_h as isize + pad);
                        let we = (w0 + g.kernel_w as isize).min(g.in_w as isize + pad);
                        let pool_size = ((he - h0) * (we - w0)).max(1) as f32;
                        let hs = h0.max(0) as usize;
                        let ws = w0.max(0) as usize;
                        let he = he.min(g.in_h as isize).max(0) as usize;
                        let we = we.min(g.in_w as isize).max(0) as usize;
                        let mut sum = 0.0;
                        for h in hs..he {
                            for w in ws..we {
                                sum += plane[h * g.in_w + w];
                            }
                        }
                        sum / pool_size
                    }
                };
                out[ph * g.out_w + pw] = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(in_hw: usize, kernel: usize, stride: usize, pad: usize, out_hw: usize) -> PoolGeometry {
        PoolGeometry {
            batch: 1,
            channels: 1,
            in_h: in_hw,
            in_w: in_hw,
            kernel_h: kernel,
            kernel_w: kernel,
            stride,
            pad,
            out_h: out_hw,
            out_w: out_hw,
        }
    }

    #[test]
    fn max_pool_clips_the_last_window() {
        // 3×3 input, 2×2 kernel, stride 2, ceil mode → 2×2 output.
        let src: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        let mut dst = vec![0.0; 4];
        pooling(&src, &geometry(3, 2, 2, 0, 2), PoolMode::Max, &mut dst);
        assert_eq!(dst, vec![5.0, 6.0, 8.0, 9.0]);
    }

    #[test]
    fn average_pool_counts_padding() {
        let src = vec![4.0; 4];
        let mut dst = vec![0.0; 4];
        // 2×2 input, 2×2 kernel, stride 1, pad 1 → 3×3, corner windows cover one input.
        let mut dst9 = vec![0.0; 9];
        pooling(&src, &geometry(2, 2, 1, 1, 3), PoolMode::Ave, &mut dst9);
        assert_eq!(dst9[0], 1.0);
        assert_eq!(dst9[4], 4.0);

        pooling(&src, &geometry(2, 2, 2, 0, 1), PoolMode::Ave, &mut dst);
        assert_eq!(dst[0], 4.0);
    }

    #[test]
    fn empty_max_window_is_zero() {
        // 1×1 input padded by 2: corner windows see only padding.
        let mut dst = vec![1.0; 25];
        pooling(&[f32::NEG_INFINITY], &geometry(1, 1, 1, 2, 5), PoolMode::Max, &mut dst);
        assert_eq!(dst[0], 0.0);
        assert_eq!(dst[12], f32::NEG_INFINITY);
    }
}
