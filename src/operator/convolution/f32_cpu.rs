/// Geometry of one 2-D sliding window pass.
#[derive(Clone, Copy, Debug)]
pub struct ConvGeometry {
    pub channels: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub kernel: usize,
    pub stride: usize,
    pub pad: usize,
    pub dilation: usize,
    pub out_h: usize,
    pub out_w: usize,
}

/// Unfold one image (`channels × in_h × in_w`, starting at `offset`) into a
/// `(channels·kernel²) × (out_h·out_w)` column matrix. Padding reads as 0.
pub fn im2col(src: &[f32], offset: usize, g: &ConvGeometry, col: &mut [f32]) {
    let out_spatial = g.out_h * g.out_w;
    assert!(
        col.len() >= g.channels * g.kernel * g.kernel * out_spatial,
        "im2col: column buffer too small"
    );

    for c in 0..g.channels {
        let channel = &src[offset + c * g.in_h * g.in_w..offset + (c + 1) * g.in_h * g.in_w];
        for kh in 0..g.kernel {
            for kw in 0..g.kernel {
                let row = (c * g.kernel + kh) * g.kernel + kw;
                let dst = &mut col[row * out_spatial..(row + 1) * out_spatial];
                for oh in 0..g.out_h {
                    let ih = (oh * g.stride + kh * g.dilation) as isize - g.pad as isize;
                    let dst_row = &mut dst[oh * g.out_w..(oh + 1) * g.out_w];
                    if ih < 0 || ih >= g.in_h as isize {
                        dst_row.fill(0.0);
                        continue;
                    }
                    let src_row = &channel[ih as usize * g.in_w..(ih as usize + 1) * g.in_w];
                    for (ow, v) in dst_row.iter_mut().enumerate() {
                        let iw = (ow * g.stride + kw * g.dilation) as isize - g.pad as isize;
                        *v = if iw < 0 || iw >= g.in_w as isize {
                            0.0
                        } else {
                            src_row[iw as usize]
                        };
                    }
                }
            }
        }
    }
}
