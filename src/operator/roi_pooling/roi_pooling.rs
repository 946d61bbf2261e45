use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    blas::Context,
    network::net_def::OpDef,
    operator::operator::{OpBase, Operator},
    utils::{error::Result, macros::op_ensure},
    workspace::Workspace,
};

use super::f32_cpu::{RoiPoolGeometry, roi_pooling};

/// Pools every region of bottom 1 over the feature map in bottom 0.
///
/// The top is sized for the region count seen at reshape time and shrinks
/// to the live count on each forward pass.
pub struct RoiPoolingOp {
    base: OpBase,
    pooled_h: usize,
    pooled_w: usize,
    spatial_scale: f32,
    geometry: Option<RoiPoolGeometry>,
}

impl RoiPoolingOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        Ok(Self {
            base: OpBase::new(def, ws)?,
            pooled_h: 0,
            pooled_w: 0,
            spatial_scale: 1.0 / 16.0,
            geometry: None,
        })
    }
}

impl Debug for RoiPoolingOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "ROIPooling(name={}, pooled={}x{}, spatial_scale={})",
            self.base.name(),
            self.pooled_h,
            self.pooled_w,
            self.spatial_scale
        )
    }
}

impl Operator for RoiPoolingOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, _ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        base.check_io(2, 1, false)?;
        op_ensure!(base, !base.in_place(), "cannot run in place");
        self.pooled_h = base.arg("pooled_h", 0usize)?;
        self.pooled_w = base.arg("pooled_w", 0usize)?;
        self.spatial_scale = base.arg("spatial_scale", 1.0f32 / 16.0)?;
        op_ensure!(base, self.pooled_h > 0, "pooled_h must be > 0");
        op_ensure!(base, self.pooled_w > 0, "pooled_w must be > 0");
        Ok(())
    }

    fn reshape(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        let feature = ws.blob_shape(base.bottom(0));
        let rois = ws.blob_shape(base.bottom(1));
        op_ensure!(base, feature.len() == 4, "expects a 4-D feature map, got {:?}", feature);
        op_ensure!(
            base,
            rois.len() == 2 && rois[1] == 5,
            "regions must be (N,5), got {:?}",
            rois
        );

        base.reshape_top(ws, 0, &[rois[0], feature[1], self.pooled_h, self.pooled_w])?;
        self.geometry = Some(RoiPoolGeometry {
            batch: feature[0],
            channels: feature[1],
            in_h: feature[2],
            in_w: feature[3],
            pooled_h: self.pooled_h,
            pooled_w: self.pooled_w,
            spatial_scale: self.spatial_scale,
        });
        self.base.trace_reshape(ws);
        Ok(())
    }

    fn reshapes_in_forward(&self) -> bool {
        true
    }

    fn forward(&self, ws: &Workspace, _ctx: &Context) {
        let Some(g) = self.geometry.as_ref() else {
            return;
        };
        let feature = ws.blob(self.base.bottom(0));
        let rois = ws.blob(self.base.bottom(1));
        let mut top = ws.blob_mut(self.base.top(0));
        let num_rois = rois.dim(0);
        top.reshape_in_place(&[num_rois, g.channels, g.pooled_h, g.pooled_w]);
        roi_pooling(feature.data(), rois.data(), num_rois, g, top.data_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::operator::tests::{run, setup_err};

    fn roi_def() -> OpDef {
        OpDef::new("ROIPooling", "roi_pool")
            .input("conv")
            .input("rois")
            .output("pool")
            .arg("pooled_h", 1)
            .arg("pooled_w", 2)
            .arg("spatial_scale", 1.0)
    }

    #[test]
    fn pools_each_region_per_channel() {
        let feature: Vec<f32> = (0..32).map(|v| v as f32).collect();
        let rois = [0.0, 0.0, 0.0, 3.0, 1.0, 0.0, 2.0, 2.0, 3.0, 3.0];
        let (shape, out) = run(
            &roi_def(),
            &[("conv", &[1, 2, 4, 4], &feature), ("rois", &[2, 5], &rois)],
        );
        assert_eq!(shape, vec![2, 2, 1, 2]);
        assert_eq!(
            out,
            vec![5.0, 7.0, 21.0, 23.0, 14.0, 15.0, 30.0, 31.0]
        );
    }

    #[test]
    fn pooled_size_is_required() {
        let def = OpDef::new("ROIPooling", "roi_pool")
            .input("conv")
            .input("rois")
            .output("pool");
        let err = setup_err(&def, &[("conv", &[1, 1, 4, 4], &[]), ("rois", &[1, 5], &[])]);
        assert!(err.to_string().contains("pooled_h must be > 0"));
    }
}
