/// Row-major strides for a dimension list.
pub fn compute_strides(dims: &[usize]) -> Vec<usize> {
    let mut s = vec![1; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        s[i] = s[i + 1] * dims[i + 1];
    }
    s
}

/// Output extent of a sliding window along one spatial axis.
pub fn conv_out_size(input: usize, kernel: usize, stride: usize, pad: usize, dilation: usize) -> usize {
    let extent = dilation * (kernel - 1) + 1;
    (input + 2 * pad).saturating_sub(extent) / stride + 1
}

/// Pooling output extent; in full mode the size is rounded up and the last
/// window is dropped if it would start inside the bottom padding only.
pub fn pool_out_size(input: usize, kernel: usize, stride: usize, pad: usize, full: bool) -> usize {
    let span = (input + 2 * pad).saturating_sub(kernel);
    if !full {
        return span / stride + 1;
    }
    let mut out = span.div_ceil(stride) + 1;
    if pad > 0 && (out - 1) * stride >= input + pad {
        out -= 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_are_row_major() {
        assert_eq!(compute_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(compute_strides(&[5]), vec![1]);
        assert!(compute_strides(&[]).is_empty());
    }

    #[test]
    fn conv_sizes() {
        assert_eq!(conv_out_size(224, 7, 2, 3, 1), 112);
        assert_eq!(conv_out_size(5, 3, 1, 0, 1), 3);
        assert_eq!(conv_out_size(5, 3, 1, 2, 2), 5);
    }

    #[test]
    fn pooling_rounds_up_in_full_mode() {
        assert_eq!(pool_out_size(6, 3, 2, 0, true), 3);
        assert_eq!(pool_out_size(6, 3, 2, 0, false), 2);
        assert_eq!(pool_out_size(13, 3, 2, 0, true), 6);
        assert_eq!(pool_out_size(4, 2, 2, 1, true), 3);
    }
}
