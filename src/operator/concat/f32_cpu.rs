/// Copy `src` (axis length `src_axis`) into `dst` (axis length `dst_axis`)
/// starting at `axis_offset` along the concat axis.
///
/// `outer` is the product of dims before the axis, `inner` the product after.
pub fn concat_into(
    src: &[f32],
    outer: usize,
    inner: usize,
    src_axis: usize,
    dst_axis: usize,
    axis_offset: usize,
    dst: &mut [f32],
) {
    let block = src_axis * inner;
    assert!(src.len() >= outer * block, "concat: src too small");
    assert!(dst.len() >= outer * dst_axis * inner, "concat: dst too small");
    for o in 0..outer {
        let src_start = o * block;
        let dst_start = (o * dst_axis + axis_offset) * inner;
        dst[dst_start..dst_start + block].copy_from_slice(&src[src_start..src_start + block]);
    }
}
