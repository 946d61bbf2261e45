//! Elementwise and matrix primitives behind a pluggable backend.
//!
//! Every primitive addresses flat buffers through explicit offsets plus an
//! element count, so operators can work on arbitrary spans of a shared
//! buffer. Where the output would alias an input, use the `*_inplace` form:
//! it computes `y[i] = y[i] (op) b[i]` in index order.

mod naive;
mod parallel;

pub use naive::NaiveBlas;
pub use parallel::ParallelBlas;

use crate::config::BackendKind;
use std::fmt::Debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Max,
    Min,
}

impl BinaryOp {
    #[inline]
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Max => a.max(b),
            BinaryOp::Min => a.min(b),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Abs,
    Square,
    Sqrt,
    Log,
    Exp,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Floor,
    Ceil,
    Neg,
    Reciprocal,
}

impl UnaryOp {
    #[inline]
    pub fn apply(self, a: f32) -> f32 {
        match self {
            UnaryOp::Abs => a.abs(),
            UnaryOp::Square => a * a,
            UnaryOp::Sqrt => a.sqrt(),
            UnaryOp::Log => a.ln(),
            UnaryOp::Exp => a.exp(),
            UnaryOp::Sin => a.sin(),
            UnaryOp::Cos => a.cos(),
            UnaryOp::Tan => a.tan(),
            UnaryOp::Asin => a.asin(),
            UnaryOp::Acos => a.acos(),
            UnaryOp::Atan => a.atan(),
            UnaryOp::Floor => a.floor(),
            UnaryOp::Ceil => a.ceil(),
            UnaryOp::Neg => -a,
            UnaryOp::Reciprocal => 1.0 / a,
        }
    }
}

/// The math backend contract. All matrices are row-major.
#[allow(clippy::too_many_arguments)]
pub trait Blas: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn set(&self, n: usize, val: f32, y: &mut [f32], offy: usize) {
        y[offy..offy + n].fill(val);
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
        let (a, b) = (&a[offa..offa + n], &b[offb..offb + n]);
        for ((y, &a), &b) in y[offy..offy + n].iter_mut().zip(a).zip(b) {
            *y = op.apply(a, b);
        }
    }

    fn binary_inplace(&self, op: BinaryOp, n: usize, y: &mut [f32], offy: usize, b: &[f32], offb: usize) {
        for (y, &b) in y[offy..offy + n].iter_mut().zip(&b[offb..offb + n]) {
            *y = op.apply(*y, b);
        }
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
        for (y, &a) in y[offy..offy + n].iter_mut().zip(&a[offa..offa + n]) {
            *y = op.apply(a, alpha);
        }
    }

    fn binary_scalar_inplace(&self, op: BinaryOp, n: usize, y: &mut [f32], offy: usize, alpha: f32) {
        for y in &mut y[offy..offy + n] {
            *y = op.apply(*y, alpha);
        }
    }

    fn unary(&self, op: UnaryOp, n: usize, a: &[f32], offa: usize, y: &mut [f32], offy: usize) {
        for (y, &a) in y[offy..offy + n].iter_mut().zip(&a[offa..offa + n]) {
            *y = op.apply(a);
        }
    }

    fn unary_inplace(&self, op: UnaryOp, n: usize, y: &mut [f32], offy: usize) {
        for y in &mut y[offy..offy + n] {
            *y = op.apply(*y);
        }
    }

    // Level 1
    fn scal(&self, n: usize, alpha: f32, x: &mut [f32], offx: usize);

    fn copy(&self, n: usize, x: &[f32], offx: usize, y: &mut [f32], offy: usize) {
        y[offy..offy + n].copy_from_slice(&x[offx..offx + n]);
    }

    fn axpy(&self, n: usize, alpha: f32, x: &[f32], offx: usize, y: &mut [f32], offy: usize);

    fn asum(&self, n: usize, x: &[f32], offx: usize) -> f32;

    // Level 2
    /// `y = alpha * op(A) * x + beta * y` with A stored as M×N.
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
    );

    // Level 3
    /// `C = alpha * op(A) * op(B) + beta * C` with C stored as M×N.
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
    );

    /// Barrier after which written buffers are readable by the host.
    fn finish(&self) {}
}

/// Scale `y` by `beta`, treating `beta == 0` as an overwrite so stale
/// NaNs in the destination never leak through.
#[inline]
pub(crate) fn scale_by_beta(y: &mut [f32], beta: f32) {
    if beta == 0.0 {
        y.fill(0.0);
    } else if beta != 1.0 {
        y.iter_mut().for_each(|v| *v *= beta);
    }
}

/// The compute context every operator runs against.
#[derive(Debug)]
pub struct Context {
    blas: Box<dyn Blas>,
}

impl Context {
    pub fn new(kind: BackendKind) -> Self {
        let blas: Box<dyn Blas> = match kind {
            BackendKind::Naive => Box::new(NaiveBlas),
            BackendKind::Parallel => Box::new(ParallelBlas::default()),
        };
        Self { blas }
    }

    pub fn with_blas(blas: Box<dyn Blas>) -> Self {
        Self { blas }
    }

    pub fn blas(&self) -> &dyn Blas {
        self.blas.as_ref()
    }

    pub fn finish(&self) {
        self.blas.finish();
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(BackendKind::Naive)
    }
}
