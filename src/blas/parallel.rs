use rayon::prelude::*;

use super::{Blas, BinaryOp, UnaryOp, scale_by_beta};

/// Rayon-backed backend: GEMM/GEMV split by output rows, elementwise ops by
/// chunks. Below `min_parallel_len` elements everything runs inline.
#[derive(Clone, Copy, Debug)]
pub struct ParallelBlas {
    pub min_parallel_len: usize,
}

impl Default for ParallelBlas {
    fn default() -> Self {
        Self {
            min_parallel_len: 4096,
        }
    }
}

impl ParallelBlas {
    fn chunk_len(&self) -> usize {
        self.min_parallel_len.max(1)
    }
}

impl Blas for ParallelBlas {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn binary(
        &self,
        op: BinaryOp,
        n: usize,
        a: &[f32],
        offa: usize,
        b: &[f32],
        offb: usize,
        y: &mut [f32],
        offy: usize,
    ) {
        y[offy..offy + n]
            .par_iter_mut()
            .with_min_len(self.chunk_len())
            .zip(&a[offa..offa + n])
            .zip(&b[offb..offb + n])
            .for_each(|((y, &a), &b)| *y = op.apply(a, b));
    }

    fn binary_inplace(&self, op: BinaryOp, n: usize, y: &mut [f32], offy: usize, b: &[f32], offb: usize) {
        y[offy..offy + n]
            .par_iter_mut()
            .with_min_len(self.chunk_len())
            .zip(&b[offb..offb + n])
            .for_each(|(y, &b)| *y = op.apply(*y, b));
    }

    fn binary_scalar(
        &self,
        op: BinaryOp,
        n: usize,
        a: &[f32],
        offa: usize,
        alpha: f32,
        y: &mut [f32],
        offy: usize,
    ) {
        y[offy..offy + n]
            .par_iter_mut()
            .with_min_len(self.chunk_len())
            .zip(&a[offa..offa + n])
            .for_each(|(y, &a)| *y = op.apply(a, alpha));
    }

    fn binary_scalar_inplace(&self, op: BinaryOp, n: usize, y: &mut [f32], offy: usize, alpha: f32) {
        y[offy..offy + n]
            .par_iter_mut()
            .with_min_len(self.chunk_len())
            .for_each(|y| *y = op.apply(*y, alpha));
    }

    fn unary(&self, op: UnaryOp, n: usize, a: &[f32], offa: usize, y: &mut [f32], offy: usize) {
        y[offy..offy + n]
            .par_iter_mut()
            .with_min_len(self.chunk_len())
            .zip(&a[offa..offa + n])
            .for_each(|(y, &a)| *y = op.apply(a));
    }

    fn unary_inplace(&self, op: UnaryOp, n: usize, y: &mut [f32], offy: usize) {
        y[offy..offy + n]
            .par_iter_mut()
            .with_min_len(self.chunk_len())
            .for_each(|y| *y = op.apply(*y));
    }

    fn scal(&self, n: usize, alpha: f32, x: &mut [f32], offx: usize) {
        x[offx..offx + n]
            .par_iter_mut()
            .with_min_len(self.chunk_len())
            .for_each(|v| *v *= alpha);
    }

    fn axpy(&self, n: usize, alpha: f32, x: &[f32], offx: usize, y: &mut [f32], offy: usize) {
        y[offy..offy + n]
            .par_iter_mut()
            .with_min_len(self.chunk_len())
            .zip(&x[offx..offx + n])
            .for_each(|(y, &x)| *y += alpha * x);
    }

    fn asum(&self, n: usize, x: &[f32], offx: usize) -> f32 {
        let sum: f64 = x[offx..offx + n]
            .par_iter()
            .with_min_len(self.chunk_len())
            .map(|v| v.abs() as f64)
            .sum();
        sum as f32
    }

    fn gemv(
        &self,
        trans_a: bool,
        m: usize,
        n: usize,
        alpha: f32,
        a: &[f32],
        offa: usize,
        x: &[f32],
        offx: usize,
        beta: f32,
        y: &mut [f32],
        offy: usize,
    ) {
        let y_len = if trans_a { n } else { m };
        let y = &mut y[offy..offy + y_len];
        scale_by_beta(y, beta);
        let a = &a[offa..offa + m * n];
        if trans_a {
            let x = &x[offx..offx + m];
            y.par_iter_mut().enumerate().for_each(|(i, y)| {
                let sum: f64 = (0..m).map(|j| (alpha * a[j * n + i] * x[j]) as f64).sum();
                *y += sum as f32;
            });
        } else {
            let x = &x[offx..offx + n];
            y.par_iter_mut()
                .zip(a.par_chunks(n.max(1)))
                .for_each(|(y, row)| {
                    let sum: f64 = row.iter().zip(x).map(|(&a, &x)| (alpha * a * x) as f64).sum();
                    *y += sum as f32;
                });
        }
    }

    fn gemm(
        &self,
        trans_a: bool,
        trans_b: bool,
        m: usize,
        n: usize,
        k: usize,
        alpha: f32,
        a: &[f32],
        offa: usize,
        b: &[f32],
        offb: usize,
        beta: f32,
        c: &mut [f32],
        offc: usize,
    ) {
        if n == 0 {
            return;
        }
        let c = &mut c[offc..offc + m * n];
        scale_by_beta(c, beta);
        let a = &a[offa..offa + m * k];
        let b = &b[offb..offb + k * n];
        c.par_chunks_mut(n).enumerate().for_each(|(i, c_row)| {
            for p in 0..k {
                let a_part = alpha * if trans_a { a[p * m + i] } else { a[i * k + p] };
                if trans_b {
                    for (j, c) in c_row.iter_mut().enumerate() {
                        *c += a_part * b[j * k + p];
                    }
                } else {
                    for (c, &b) in c_row.iter_mut().zip(&b[p * n..p * n + n]) {
                        *c += a_part * b;
                    }
                }
            }
        });
    }
}
