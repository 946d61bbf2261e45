/// Add `bias[d]` to every element of the `d`-th run of `inner_dim` values,
/// cycling `d` through `bias_dim`.
pub fn bias_inplace(data: &mut [f32], bias: &[f32], bias_dim: usize, inner_dim: usize) {
    assert!(bias.len() >= bias_dim, "bias: bias blob too small");
    if bias_dim == 0 || inner_dim == 0 {
        return;
    }
    for (i, run) in data.chunks_mut(inner_dim).enumerate() {
        let b = bias[i % bias_dim];
        for v in run {
            *v += b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcasts_over_inner_dim() {
        // (2, 2, 3): bias per axis-1 entry.
        let mut data = vec![0.0; 12];
        bias_inplace(&mut data, &[1.0, 2.0], 2, 3);
        assert_eq!(
            data,
            vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0]
        );
    }
}
