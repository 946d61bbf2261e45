/// Round half away from zero, the rounding anchor generation expects.
pub fn round(x: f32) -> f32 {
    x.round()
}

/// Product of a dimension list; an empty list is a scalar with one element.
pub fn product(dims: &[usize]) -> usize {
    dims.iter().product()
}

pub fn format_shape(dims: &[usize]) -> String {
    let parts: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
    format!("({})", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_is_half_away_from_zero() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(-2.5), -3.0);
        assert_eq!(round(22.627417), 23.0);
    }

    #[test]
    fn format_shape_matches_trace_layout() {
        assert_eq!(format_shape(&[1, 3, 224, 224]), "(1,3,224,224)");
        assert_eq!(format_shape(&[]), "()");
    }
}
