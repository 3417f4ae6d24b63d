use anyhow::Result;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::env::Observation;
use crate::error::PgError;

/// Edge length of the square pixel blocks averaged into one feature
pub const POOL_SIZE: usize = 7;

/// Reduces a stacked observation to a feature vector by block-averaging each channel.
///
/// Features are scaled into `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureExtractor {
    observation_shape: [usize; 3],
    pool_size: usize,
}

impl FeatureExtractor {
    pub fn new(
        observation_shape: [usize; 3],
        pool_size: usize,
    ) -> Self {
        assert!(pool_size > 0);
        Self {
            observation_shape,
            pool_size,
        }
    }

    fn cells(&self) -> (usize, usize) {
        let [_, height, width] = self.observation_shape;
        (height.div_ceil(self.pool_size), width.div_ceil(self.pool_size))
    }

    /// Length of the produced feature vectors
    pub fn feature_len(&self) -> usize {
        let (rows, cols) = self.cells();
        self.observation_shape[0] * rows * cols
    }

    pub fn extract(
        &self,
        observation: &Observation,
    ) -> Result<DVector<f32>> {
        if observation.shape() != self.observation_shape {
            return Err(PgError::environment(format!(
                "observation shape {:?} does not match expected {:?}",
                observation.shape(),
                self.observation_shape
            )))?;
        }
        let [channels, height, width] = self.observation_shape;
        let (rows, cols) = self.cells();
        let mut features = DVector::zeros(self.feature_len());
        for c in 0..channels {
            let plane = observation.channel(c);
            for row in 0..rows {
                let y_range = row * self.pool_size..((row + 1) * self.pool_size).min(height);
                for col in 0..cols {
                    let x_range = col * self.pool_size..((col + 1) * self.pool_size).min(width);
                    let mut sum = 0_u32;
                    for y in y_range.clone() {
                        sum += plane[y * width + x_range.start..y * width + x_range.end]
                            .iter()
                            .map(|&p| p as u32)
                            .sum::<u32>();
                    }
                    let count = y_range.len() * x_range.len();
                    features[(c * rows + row) * cols + col] = sum as f32 / (count as f32 * 255.0);
                }
            }
        }
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_observation_feature_len() {
        let extractor = FeatureExtractor::new([4, 84, 84], POOL_SIZE);
        assert_eq!(extractor.feature_len(), 4 * 12 * 12);
    }

    #[test]
    fn test_block_average_with_ragged_edge() {
        // 1 channel, 3x5 pixels, pool 2 -> 2x3 cells
        let data = vec![
            255, 255, 0, 0, 255,
            255, 255, 0, 0, 255,
            0, 0, 0, 0, 51,
        ];
        let observation = Observation::new([1, 3, 5], data);
        let extractor = FeatureExtractor::new([1, 3, 5], 2);
        assert_eq!(extractor.feature_len(), 6);

        let features = extractor.extract(&observation).unwrap();
        assert!((features[0] - 1.0).abs() < 1e-6);
        assert!(features[1].abs() < 1e-6);
        assert!((features[2] - 1.0).abs() < 1e-6);
        assert!(features[3].abs() < 1e-6);
        assert!(features[4].abs() < 1e-6);
        assert!((features[5] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let extractor = FeatureExtractor::new([4, 84, 84], POOL_SIZE);
        let observation = Observation::new([1, 2, 2], vec![0; 4]);
        assert!(extractor.extract(&observation).is_err());
    }
}
