/// Arithmetic mean; `0.0` for an empty slice
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// Population standard deviation; `0.0` for an empty slice
pub fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let variance = values.iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f32>() / values.len() as f32;
    variance.sqrt()
}
