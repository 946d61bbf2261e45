use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    blas::Context,
    network::net_def::OpDef,
    operator::operator::{OpBase, Operator},
    utils::{error::Result, macros::op_ensure},
    workspace::{BlobId, Workspace},
};

use super::f32_cpu::{ProposalGeometry, RectInfo, decode_proposals, generate_anchors, nms_sorted};

/// Region proposal head.
///
/// Bottoms: objectness scores `(1, 2A, H, W)`, box deltas `(1, 4A, H, W)`
/// and image info `[height, width, scale]`. The top holds up to
/// `post_nms_top_n` rows of `[batch_index = 0, xmin, ymin, xmax, ymax]`.
pub struct ProposalOp {
    base: OpBase,
    feat_stride: usize,
    pre_nms_top_n: usize,
    post_nms_top_n: usize,
    min_size: f32,
    nms_thresh: f32,
    anchors: Vec<f32>,
    num_anchors: usize,
    geometry: Option<ProposalGeometry>,
    proposals: BlobId,
}

impl ProposalOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        let base = OpBase::new(def, ws)?;
        let proposals = ws.create_blob(&format!("{}_proposals", def.name));
        Ok(Self {
            base,
            feat_stride: 16,
            pre_nms_top_n: 6000,
            post_nms_top_n: 300,
            min_size: 16.0,
            nms_thresh: 0.7,
            anchors: Vec::new(),
            num_anchors: 0,
            geometry: None,
            proposals,
        })
    }
}

impl Debug for ProposalOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Proposal(name={}, feat_stride={}, anchors={}, pre_nms_top_n={}, post_nms_top_n={}, min_size={}, nms_thresh={})",
            self.base.name(),
            self.feat_stride,
            self.num_anchors,
            self.pre_nms_top_n,
            self.post_nms_top_n,
            self.min_size,
            self.nms_thresh
        )
    }
}

impl Operator for ProposalOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, _ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        base.check_io(3, 1, false)?;
        self.feat_stride = base.arg("feat_stride", 16usize)?;
        self.pre_nms_top_n = base.arg("pre_nms_top_n", 6000usize)?;
        self.post_nms_top_n = base.arg("post_nms_top_n", 300usize)?;
        self.min_size = base.arg("min_size", 16.0f32)?;
        self.nms_thresh = base.arg("nms_thresh", 0.7f32)?;
        let base_size = base.arg("base_size", 16usize)?;
        let ratios = base.repeated_arg("ratios", vec![0.5f32, 1.0, 2.0])?;
        let scales = base.repeated_arg("scales", vec![8.0f32, 16.0, 32.0])?;

        op_ensure!(base, self.feat_stride > 0, "feat_stride must be > 0");
        op_ensure!(base, self.post_nms_top_n > 0, "post_nms_top_n must be > 0");
        op_ensure!(base, base_size > 0, "base_size must be > 0");
        op_ensure!(
            base,
            !ratios.is_empty() && !scales.is_empty(),
            "ratios and scales must not be empty"
        );
        op_ensure!(
            base,
            ratios.iter().chain(&scales).all(|&v| v > 0.0),
            "ratios and scales must be positive"
        );

        self.anchors = generate_anchors(base_size, &ratios, &scales);
        self.num_anchors = ratios.len() * scales.len();
        Ok(())
    }

    fn reshape(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        let score = ws.blob_shape(base.bottom(0));
        let delta = ws.blob_shape(base.bottom(1));
        let info_count = ws.blob(base.bottom(2)).count();
        let a = self.num_anchors;

        op_ensure!(base, score.len() == 4, "score blob must be 4-D, got {:?}", score);
        op_ensure!(base, score[0] == 1, "only single item batches are supported");
        op_ensure!(
            base,
            score[1] == 2 * a,
            "score blob needs {} channels for {} anchors, got {}",
            2 * a,
            a,
            score[1]
        );
        op_ensure!(
            base,
            delta.len() == 4 && delta[1] == 4 * a && delta[2..] == score[2..],
            "delta blob must be (1,{},{},{}), got {:?}",
            4 * a,
            score[2],
            score[3],
            delta
        );
        op_ensure!(base, info_count == 3, "image info must hold 3 values, got {}", info_count);

        let (height, width) = (score[2], score[3]);
        base.reshape_top(ws, 0, &[self.post_nms_top_n, 5])?;
        base.reshape_blob(ws, self.proposals, &[height * width * a, 6])?;
        self.geometry = Some(ProposalGeometry {
            num_anchors: a,
            height,
            width,
            feat_stride: self.feat_stride,
            min_size: self.min_size,
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
        let mut proposals = ws.blob_mut(self.proposals);
        {
            let scores = ws.blob(self.base.bottom(0));
            let deltas = ws.blob(self.base.bottom(1));
            let info = ws.blob(self.base.bottom(2));
            decode_proposals(
                &self.anchors,
                scores.data(),
                deltas.data(),
                info.data(),
                g,
                proposals.data_mut(),
            );
        }

        let mut rects: Vec<RectInfo> = proposals
            .data()
            .chunks_exact(6)
            .filter(|row| row[5] > 0.0)
            .map(|row| RectInfo {
                xmin: row[0],
                ymin: row[1],
                xmax: row[2],
                ymax: row[3],
                score: row[4],
            })
            .collect();
        // Stable, so equal scores keep location order.
        rects.sort_by(|a, b| b.score.total_cmp(&a.score));
        if self.pre_nms_top_n > 0 && self.pre_nms_top_n < rects.len() {
            rects.truncate(self.pre_nms_top_n);
        }

        let picked = nms_sorted(&rects, self.nms_thresh);
        let picked_count = picked.len().min(self.post_nms_top_n);

        let mut top = ws.blob_mut(self.base.top(0));
        top.reshape_in_place(&[picked_count, 5]);
        for (row, &p) in top.data_mut().chunks_exact_mut(5).zip(&picked) {
            let rect = &rects[p];
            row.copy_from_slice(&[0.0, rect.xmin, rect.ymin, rect.xmax, rect.ymax]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::operator::tests::{build, setup_err};

    fn proposal_def(feat_stride: usize) -> OpDef {
        OpDef::new("Proposal", "proposal")
            .input("score")
            .input("delta")
            .input("info")
            .output("rois")
            .arg("feat_stride", feat_stride)
            .arg("ratios", vec![1.0f32])
            .arg("scales", vec![1.0f32])
            .arg("min_size", 1.0)
    }

    fn run_proposal(def: &OpDef, fg: [f32; 2], info: [f32; 3]) -> (Vec<usize>, Vec<f32>) {
        let scores = [0.0, 0.0, fg[0], fg[1]];
        let (ws, op) = build(
            def,
            &[
                ("score", &[1, 2, 1, 2], &scores),
                ("delta", &[1, 4, 1, 2], &[0.0; 8]),
                ("info", &[1, 3], &info),
            ],
        );
        op.forward(&ws, &Context::default());
        let top = ws.blob(op.base().top(0));
        (top.shape().to_vec(), top.data().to_vec())
    }

    #[test]
    fn emits_rois_by_descending_score() {
        let (shape, rois) = run_proposal(&proposal_def(16), [0.3, 0.9], [100.0, 100.0, 1.0]);
        assert_eq!(shape, vec![2, 5]);
        assert_eq!(
            rois,
            vec![0.0, 16.0, 0.0, 31.0, 15.0, 0.0, 0.0, 0.0, 15.0, 15.0]
        );
    }

    #[test]
    fn overlapping_proposals_are_suppressed() {
        // One-pixel stride: the two anchors overlap with IoU ≈ 0.695.
        let (shape, _) = run_proposal(&proposal_def(1), [0.9, 0.3], [100.0, 100.0, 1.0]);
        assert_eq!(shape, vec![2, 5]);

        let def = proposal_def(1).arg("nms_thresh", 0.6);
        let (shape, rois) = run_proposal(&def, [0.9, 0.3], [100.0, 100.0, 1.0]);
        assert_eq!(shape, vec![1, 5]);
        assert_eq!(rois, vec![0.0, 0.0, 0.0, 15.0, 15.0]);
    }

    #[test]
    fn post_nms_limit_and_min_size() {
        let def = proposal_def(16).arg("post_nms_top_n", 1);
        let (shape, rois) = run_proposal(&def, [0.3, 0.9], [100.0, 100.0, 1.0]);
        assert_eq!(shape, vec![1, 5]);
        assert_eq!(rois[1], 16.0);

        // min_size 1 at scale 32 rejects 16-pixel boxes.
        let (shape, _) = run_proposal(&proposal_def(16), [0.3, 0.9], [100.0, 100.0, 32.0]);
        assert_eq!(shape, vec![0, 5]);
    }

    #[test]
    fn channel_counts_are_checked() {
        let def = OpDef::new("Proposal", "proposal")
            .input("score")
            .input("delta")
            .input("info")
            .output("rois");
        let err = setup_err(
            &def,
            &[
                ("score", &[1, 2, 4, 4], &[]),
                ("delta", &[1, 4, 4, 4], &[]),
                ("info", &[1, 3], &[]),
            ],
        );
        assert!(err.to_string().contains("18 channels for 9 anchors"));
    }
}
