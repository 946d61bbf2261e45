use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    blas::Context,
    network::{net_def::OpDef, weights::WeightReader},
    operator::{
        activate::{ActivateType, activate_inplace},
        operator::{OpBase, Operator},
    },
    tensor::shape::conv_out_size,
    utils::{error::Result, macros::op_ensure},
    workspace::{BlobId, Workspace},
};

use super::f32_cpu::{ConvGeometry, im2col};

const WEIGHT: usize = 0;
const BIAS: usize = 1;

/// 2-D convolution lowered to im2col + GEMM, one GEMM per group.
///
/// Parameters are `weight [num_output, channels/group, k, k]` and
/// `bias [num_output]`, either supplied inline or loaded from the weight
/// stream (bias first).
pub struct ConvolutionOp {
    base: OpBase,
    num_output: usize,
    kernel_size: usize,
    stride: usize,
    pad: usize,
    dilation: usize,
    group: usize,
    bias_term: bool,
    activate_type: Option<ActivateType>,
    channels: usize,
    geometry: Option<ConvGeometry>,
    batch: usize,
    bias_multiplier: BlobId,
}

impl ConvolutionOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        let base = OpBase::new(def, ws)?;
        let bias_multiplier = ws.create_blob(&format!("{}_bias_multiplier", def.name));
        Ok(Self {
            base,
            num_output: 0,
            kernel_size: 0,
            stride: 1,
            pad: 0,
            dilation: 1,
            group: 1,
            bias_term: true,
            activate_type: None,
            channels: 0,
            geometry: None,
            batch: 0,
            bias_multiplier,
        })
    }

    fn weight_count(&self) -> usize {
        self.num_output * (self.channels / self.group) * self.kernel_size * self.kernel_size
    }
}

impl Debug for ConvolutionOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Convolution(name={}, num_output={}, kernel_size={}, stride={}, pad={}, dilation={}, group={}, bias_term={}, activate={:?})",
            self.base.name(),
            self.num_output,
            self.kernel_size,
            self.stride,
            self.pad,
            self.dilation,
            self.group,
            self.bias_term,
            self.activate_type
        )
    }
}

impl Operator for ConvolutionOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        base.check_io(1, 1, false)?;
        op_ensure!(base, !base.in_place(), "cannot run in place");

        self.num_output = base.arg("num_output", 0usize)?;
        self.kernel_size = base.arg("kernel_size", 0usize)?;
        self.stride = base.arg("stride", 1usize)?;
        self.pad = base.arg("pad", 0usize)?;
        self.dilation = base.arg("dilation", 1usize)?;
        self.group = base.arg("group", 1usize)?;
        self.bias_term = base.arg("bias_term", true)?;
        self.activate_type = if base.has_arg("activate_type") {
            let code = base.arg::<i32>("activate_type", 0)?;
            Some(
                ActivateType::from_code(code)
                    .ok_or_else(|| base.error(format!("unknown activation type {}", code)))?,
            )
        } else {
            None
        };

        op_ensure!(base, self.num_output > 0, "num_output must be > 0");
        op_ensure!(base, self.kernel_size > 0, "kernel_size must be > 0");
        op_ensure!(base, self.stride > 0, "stride must be > 0");
        op_ensure!(base, self.dilation > 0, "dilation must be > 0");
        op_ensure!(base, self.group > 0, "group must be > 0");

        let bottom = ws.blob(base.bottom(0));
        op_ensure!(
            base,
            bottom.num_axes() == 4,
            "expects a 4-D bottom, got {} axes",
            bottom.num_axes()
        );
        self.channels = bottom.dim(1);
        drop(bottom);
        op_ensure!(
            base,
            self.channels % self.group == 0 && self.num_output % self.group == 0,
            "channels {} and num_output {} must be divisible by group {}",
            self.channels,
            self.num_output,
            self.group
        );

        let weight_shape = [
            self.num_output,
            self.channels / self.group,
            self.kernel_size,
            self.kernel_size,
        ];
        match self.base.params().len() {
            0 => {
                let weight = self.base.new_param("weight", &weight_shape)?;
                self.base.params_mut().push(weight);
            }
            1 | 2 => {}
            n => return Err(self.base.error(format!("expects at most 2 parameter blobs, got {}", n))),
        }
        if self.base.params().len() == 1 {
            let bias = self.base.new_param("bias", &[self.num_output])?;
            self.base.params_mut().push(bias);
        }
        let base = &self.base;
        op_ensure!(
            base,
            base.param(WEIGHT).shape() == weight_shape,
            "weight blob must be {:?}, got {:?}",
            weight_shape,
            base.param(WEIGHT).shape()
        );
        op_ensure!(
            base,
            base.param(BIAS).count() == self.num_output,
            "bias blob must hold {} values, got {}",
            self.num_output,
            base.param(BIAS).count()
        );
        Ok(())
    }

    fn reshape(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        let shape = ws.blob_shape(base.bottom(0));
        op_ensure!(
            base,
            shape.len() == 4 && shape[1] == self.channels,
            "bottom must be (N,{},H,W), got {:?}",
            self.channels,
            shape
        );
        let (batch, in_h, in_w) = (shape[0], shape[2], shape[3]);
        let extent = self.dilation * (self.kernel_size - 1) + 1;
        op_ensure!(
            base,
            in_h + 2 * self.pad >= extent && in_w + 2 * self.pad >= extent,
            "kernel extent {} exceeds padded input {}x{}",
            extent,
            in_h + 2 * self.pad,
            in_w + 2 * self.pad
        );

        let out_h = conv_out_size(in_h, self.kernel_size, self.stride, self.pad, self.dilation);
        let out_w = conv_out_size(in_w, self.kernel_size, self.stride, self.pad, self.dilation);
        base.reshape_top(ws, 0, &[batch, self.num_output, out_h, out_w])?;

        let col_count = self.channels * self.kernel_size * self.kernel_size * out_h * out_w;
        base.grow_temp_buffer(ws, col_count)?;

        base.reshape_blob(ws, self.bias_multiplier, &[out_h * out_w])?;
        ws.blob_mut(self.bias_multiplier).data_mut().fill(1.0);

        self.batch = batch;
        self.geometry = Some(ConvGeometry {
            channels: self.channels,
            in_h,
            in_w,
            kernel: self.kernel_size,
            stride: self.stride,
            pad: self.pad,
            dilation: self.dilation,
            out_h,
            out_w,
        });
        self.base.trace_reshape(ws);
        Ok(())
    }

    fn forward(&self, ws: &Workspace, ctx: &Context) {
        let Some(g) = self.geometry.as_ref() else {
            debug_assert!(false, "{} forwarded before reshape", self.base.name());
            return;
        };
        let blas = ctx.blas();
        let bottom = ws.blob(self.base.bottom(0));
        let mut top = ws.blob_mut(self.base.top(0));
        let mut col = ws.temp_buffer_mut();
        let multiplier = ws.blob(self.bias_multiplier);
        let weight = self.base.param(WEIGHT).data();
        let bias = self.base.param(BIAS).data();

        let out_spatial = g.out_h * g.out_w;
        let in_num = self.channels * g.in_h * g.in_w;
        let top_num = self.num_output * out_spatial;
        let m = self.num_output / self.group;
        let k = (self.channels / self.group) * self.kernel_size * self.kernel_size;

        for n in 0..self.batch {
            im2col(bottom.data(), n * in_num, g, &mut col);
            for grp in 0..self.group {
                blas.gemm(
                    false,
                    false,
                    m,
                    out_spatial,
                    k,
                    1.0,
                    weight,
                    grp * m * k,
                    &col,
                    grp * k * out_spatial,
                    0.0,
                    top.data_mut(),
                    n * top_num + grp * m * out_spatial,
                );
            }
            if self.bias_term {
                blas.gemm(
                    false,
                    false,
                    self.num_output,
                    out_spatial,
                    1,
                    1.0,
                    bias,
                    0,
                    multiplier.data(),
                    0,
                    1.0,
                    top.data_mut(),
                    n * top_num,
                );
            }
        }

        if let Some(activate_type) = self.activate_type {
            activate_inplace(top.data_mut(), activate_type, 0.1);
        }
    }

    fn load_weights(&mut self, reader: &mut WeightReader<'_>) -> Result<()> {
        let name = self.base.name().to_string();
        let weight_count = self.weight_count();
        let biases = reader.take(&name, self.num_output)?;
        let filters = reader.take(&name, weight_count)?;
        let params = self.base.params_mut();
        params[BIAS].set_data(biases)?;
        params[WEIGHT].set_data(filters)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blas::{Context, NaiveBlas, ParallelBlas},
        operator::operator::tests::{build, setup_err},
        utils::error::ShadowError,
    };
    use rand::{Rng, SeedableRng, rngs::StdRng};

    #[allow(clippy::too_many_arguments)]
    fn direct_conv(
        input: &[f32],
        (c, h, w): (usize, usize, usize),
        weight: &[f32],
        bias: &[f32],
        num_output: usize,
        k: usize,
        stride: usize,
        pad: usize,
    ) -> Vec<f32> {
        let out_h = (h + 2 * pad - k) / stride + 1;
        let out_w = (w + 2 * pad - k) / stride + 1;
        let mut out = vec![0.0; num_output * out_h * out_w];
        for o in 0..num_output {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut acc = bias[o];
                    for ci in 0..c {
                        for kh in 0..k {
                            for kw in 0..k {
                                let ih = (oh * stride + kh) as isize - pad as isize;
                                let iw = (ow * stride + kw) as isize - pad as isize;
                                if ih < 0 || iw < 0 || ih >= h as isize || iw >= w as isize {
                                    continue;
                                }
                                acc += input[(ci * h + ih as usize) * w + iw as usize]
                                    * weight[((o * c + ci) * k + kh) * k + kw];
                            }
                        }
                    }
                    out[(o * out_h + oh) * out_w + ow] = acc;
                }
            }
        }
        out
    }

    #[test]
    fn matches_direct_convolution() {
        let mut rng = StdRng::seed_from_u64(7);
        let (c, h, w, num_output, k) = (3, 6, 5, 4, 3);
        let input: Vec<f32> = (0..c * h * w).map(|_| rng.random_range(-1.0..1.0)).collect();
        let weight: Vec<f32> = (0..num_output * c * k * k)
            .map(|_| rng.random_range(-1.0..1.0))
            .collect();
        let bias: Vec<f32> = (0..num_output).map(|_| rng.random_range(-1.0..1.0)).collect();

        let def = OpDef::new("Convolution", "conv")
            .input("data")
            .output("conv")
            .arg("num_output", num_output)
            .arg("kernel_size", k)
            .arg("stride", 2)
            .arg("pad", 1)
            .blob(&[num_output, c, k, k], weight.clone())
            .blob(&[num_output], bias.clone());
        let expected = direct_conv(&input, (c, h, w), &weight, &bias, num_output, k, 2, 1);

        for ctx in [
            Context::with_blas(Box::new(NaiveBlas)),
            Context::with_blas(Box::new(ParallelBlas { min_parallel_len: 1 })),
        ] {
            let (ws, op) = build(&def, &[("data", &[1, c, h, w], &input)]);
            op.forward(&ws, &ctx);
            let top = ws.blob(op.base().top(0));
            assert_eq!(top.shape(), &[1, num_output, 3, 3]);
            for (a, b) in top.data().iter().zip(&expected) {
                assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn grouped_convolution_keeps_groups_apart() {
        // Two groups of one channel each, 1×1 kernels: output o only sees channel o.
        let def = OpDef::new("Convolution", "conv")
            .input("data")
            .output("conv")
            .arg("num_output", 2)
            .arg("kernel_size", 1)
            .arg("group", 2)
            .arg("bias_term", false)
            .blob(&[2, 1, 1, 1], vec![2.0, 3.0]);
        let (ws, op) = build(&def, &[("data", &[1, 2, 1, 2], &[1.0, 2.0, 10.0, 20.0])]);
        op.forward(&ws, &Context::default());
        assert_eq!(ws.blob(op.base().top(0)).data(), &[2.0, 4.0, 30.0, 60.0]);
    }

    #[test]
    fn fused_relu() {
        let def = OpDef::new("Convolution", "conv")
            .input("data")
            .output("conv")
            .arg("num_output", 1)
            .arg("kernel_size", 1)
            .arg("activate_type", 1)
            .blob(&[1, 1, 1, 1], vec![1.0])
            .blob(&[1], vec![0.0]);
        let (ws, op) = build(&def, &[("data", &[1, 1, 1, 3], &[-1.0, 0.5, -2.0])]);
        op.forward(&ws, &Context::default());
        assert_eq!(ws.blob(op.base().top(0)).data(), &[0.0, 0.5, 0.0]);
    }

    #[test]
    fn loads_bias_then_filters() {
        let def = OpDef::new("Convolution", "conv")
            .input("data")
            .output("conv")
            .arg("num_output", 1)
            .arg("kernel_size", 1);
        let (mut ws, mut op) = build(&def, &[("data", &[1, 1, 1, 1], &[1.0])]);
        let weights = [0.5, 2.0];
        let mut reader = WeightReader::new(&weights);
        op.load_weights(&mut reader).unwrap();
        assert_eq!(reader.remaining(), 0);
        op.reshape(&mut ws).unwrap();
        op.forward(&ws, &Context::default());
        assert_eq!(ws.blob(op.base().top(0)).data(), &[2.5]);
    }

    #[test]
    fn short_weight_stream_fails() {
        let def = OpDef::new("Convolution", "conv")
            .input("data")
            .output("conv")
            .arg("num_output", 2)
            .arg("kernel_size", 1);
        let (_ws, mut op) = build(&def, &[("data", &[1, 1, 1, 1], &[])]);
        let weights = [0.5, 2.0, 1.0];
        let err = op.load_weights(&mut WeightReader::new(&weights)).unwrap_err();
        assert!(matches!(err, ShadowError::WeightUnderrun { needed: 2, remaining: 1, .. }));
    }

    #[test]
    fn rejects_bad_configuration() {
        let missing_output = OpDef::new("Convolution", "conv")
            .input("data")
            .output("conv")
            .arg("kernel_size", 3);
        let err = setup_err(&missing_output, &[("data", &[1, 3, 8, 8], &[])]);
        assert!(err.to_string().contains("num_output"));

        let bad_group = OpDef::new("Convolution", "conv")
            .input("data")
            .output("conv")
            .arg("num_output", 4)
            .arg("kernel_size", 1)
            .arg("group", 2);
        let err = setup_err(&bad_group, &[("data", &[1, 3, 8, 8], &[])]);
        assert!(err.to_string().contains("group"));

        let too_big = OpDef::new("Convolution", "conv")
            .input("data")
            .output("conv")
            .arg("num_output", 1)
            .arg("kernel_size", 5);
        let err = setup_err(&too_big, &[("data", &[1, 1, 3, 3], &[])]);
        assert!(err.to_string().contains("kernel extent"));
    }
}
