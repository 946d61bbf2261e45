use super::{Blas, scale_by_beta};

/// Plain-loop backend. Long reductions (`asum`, `gemv`) accumulate in f64.
#[derive(Clone, Copy, Debug, Default)]
pub struct NaiveBlas;

fn sgemv_n(m: usize, n: usize, alpha: f32, a: &[f32], x: &[f32], y: &mut [f32]) {
    for i in 0..m {
        let row = &a[i * n..i * n + n];
        let sum: f64 = row
            .iter()
            .zip(&x[..n])
            .map(|(&a, &x)| (alpha * a * x) as f64)
            .sum();
        y[i] += sum as f32;
    }
}

fn sgemv_t(m: usize, n: usize, alpha: f32, a: &[f32], x: &[f32], y: &mut [f32]) {
    for i in 0..n {
        let mut sum = 0.0f64;
        for j in 0..m {
            sum += (alpha * a[j * n + i] * x[j]) as f64;
        }
        y[i] += sum as f32;
    }
}

fn sgemm_nn(m: usize, n: usize, k: usize, alpha: f32, a: &[f32], b: &[f32], c: &mut [f32]) {
    for i in 0..m {
        for p in 0..k {
            let a_part = alpha * a[i * k + p];
            let b_row = &b[p * n..p * n + n];
            for (c, &b) in c[i * n..i * n + n].iter_mut().zip(b_row) {
                *c += a_part * b;
            }
        }
    }
}

fn sgemm_tn(m: usize, n: usize, k: usize, alpha: f32, a: &[f32], b: &[f32], c: &mut [f32]) {
    for i in 0..m {
        for p in 0..k {
            let a_part = alpha * a[p * m + i];
            let b_row = &b[p * n..p * n + n];
            for (c, &b) in c[i * n..i * n + n].iter_mut().zip(b_row) {
                *c += a_part * b;
            }
        }
    }
}

fn sgemm_nt(m: usize, n: usize, k: usize, alpha: f32, a: &[f32], b: &[f32], c: &mut [f32]) {
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f32;
            for p in 0..k {
                sum += alpha * a[i * k + p] * b[j * k + p];
            }
            c[i * n + j] += sum;
        }
    }
}

fn sgemm_tt(m: usize, n: usize, k: usize, alpha: f32, a: &[f32], b: &[f32], c: &mut [f32]) {
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f32;
            for p in 0..k {
                sum += alpha * a[p * m + i] * b[j * k + p];
            }
            c[i * n + j] += sum;
        }
    }
}

impl Blas for NaiveBlas {
    fn name(&self) -> &'static str {
        "naive"
    }

    fn scal(&self, n: usize, alpha: f32, x: &mut [f32], offx: usize) {
        for v in &mut x[offx..offx + n] {
            *v *= alpha;
        }
    }

    fn axpy(&self, n: usize, alpha: f32, x: &[f32], offx: usize, y: &mut [f32], offy: usize) {
        for (y, &x) in y[offy..offy + n].iter_mut().zip(&x[offx..offx + n]) {
            *y += alpha * x;
        }
    }

    fn asum(&self, n: usize, x: &[f32], offx: usize) -> f32 {
        let sum: f64 = x[offx..offx + n].iter().map(|v| v.abs() as f64).sum();
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
            sgemv_t(m, n, alpha, a, &x[offx..offx + m], y);
        } else {
            sgemv_n(m, n, alpha, a, &x[offx..offx + n], y);
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
        let c = &mut c[offc..offc + m * n];
        scale_by_beta(c, beta);
        let a = &a[offa..offa + m * k];
        let b = &b[offb..offb + k * n];
        match (trans_a, trans_b) {
            (false, false) => sgemm_nn(m, n, k, alpha, a, b, c),
            (true, false) => sgemm_tn(m, n, k, alpha, a, b, c),
            (false, true) => sgemm_nt(m, n, k, alpha, a, b, c),
            (true, true) => sgemm_tt(m, n, k, alpha, a, b, c),
        }
    }
}
