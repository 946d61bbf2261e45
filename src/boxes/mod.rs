mod boxes;

pub use boxes::{BoundingBox, COVER_THRESHOLD, SMOOTH_IOU_THRESHOLD, amend, from_proposals, nms, smooth};
