use crate::tensor::shape::compute_strides;

/// Physically reorder `src` (shape `old_shape`) so that output axis `j` is
/// input axis `order[j]`.
pub fn permute(src: &[f32], old_shape: &[usize], order: &[usize], dst: &mut [f32]) {
    assert_eq!(old_shape.len(), order.len(), "permute: order rank mismatch");
    let count: usize = old_shape.iter().product();
    assert!(src.len() >= count && dst.len() >= count, "permute: buffer too small");

    let new_shape: Vec<usize> = order.iter().map(|&axis| old_shape[axis]).collect();
    let old_steps = compute_strides(old_shape);
    let new_steps = compute_strides(&new_shape);

    for (i, d) in dst[..count].iter_mut().enumerate() {
        let mut remainder = i;
        let mut old_idx = 0;
        for (j, &step) in new_steps.iter().enumerate() {
            old_idx += (remainder / step) * old_steps[order[j]];
            remainder %= step;
        }
        *d = src[old_idx];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transposes_a_matrix() {
        let src = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut dst = [0.0; 6];
        permute(&src, &[2, 3], &[1, 0], &mut dst);
        assert_eq!(dst, [1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn identity_order_copies() {
        let src: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let mut dst = vec![0.0; 24];
        permute(&src, &[2, 3, 4], &[0, 1, 2], &mut dst);
        assert_eq!(dst, src);
    }
}
