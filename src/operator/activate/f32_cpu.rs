use super::activate::ActivateType;

pub(crate) fn activate_inplace(data: &mut [f32], activate_type: ActivateType, slope: f32) {
    if activate_type == ActivateType::Linear {
        return;
    }
    for v in data.iter_mut() {
        *v = activate_type.apply(*v, slope);
    }
}
