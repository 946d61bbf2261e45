/// Fill `scale` with `k + alpha/size · Σ x²` over a channel window of width
/// `size` centred on each channel (edge-clamped).
///
/// The window sum slides along the channel axis: each step adds the square
/// entering the window and subtracts the one leaving it.
pub fn lrn_scale(
    src: &[f32],
    (batch, channels, height, width): (usize, usize, usize, usize),
    size: usize,
    alpha: f32,
    k: f32,
    scale: &mut [f32],
) {
    let step = height * width;
    assert!(src.len() >= batch * channels * step, "lrn: src too small");
    assert!(scale.len() >= batch * channels * step, "lrn: scale too small");
    let pre_pad = (size - 1) / 2;
    let post_pad = size - pre_pad - 1;
    let alpha_over_size = alpha / size as f32;
    let sq = |c: usize, offset: usize| {
        let v = src[offset + c * step];
        v * v
    };

    for b in 0..batch {
        for s in 0..step {
            let offset = b * channels * step + s;
            let mut accum = 0.0f32;
            // Prime the window with the channels ahead of channel 0.
            for head in 0..post_pad.min(channels) {
                accum += sq(head, offset);
            }
            for head in post_pad..channels + post_pad {
                if head < channels {
                    accum += sq(head, offset);
                }
                if head >= size {
                    accum -= sq(head - size, offset);
                }
                scale[offset + (head - post_pad) * step] = k + accum * alpha_over_size;
            }
        }
    }
}

/// `dst = src · scale^(-beta)`.
pub fn lrn_apply(src: &[f32], scale: &[f32], beta: f32, dst: &mut [f32]) {
    for ((d, &x), &s) in dst.iter_mut().zip(src).zip(scale) {
        *d = x * s.powf(-beta);
    }
}
