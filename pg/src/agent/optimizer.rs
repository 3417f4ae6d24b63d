use serde::{Deserialize, Serialize};

/// Adam optimizer state for a fixed list of parameter slices
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: u64,
    m: Vec<Vec<f32>>,
    v: Vec<Vec<f32>>,
}

impl Adam {
    /// `shapes` lists the length of each parameter slice
    pub fn new(shapes: &[usize]) -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-5,
            t: 0,
            m: shapes.iter().map(|&n| vec![0.0; n]).collect(),
            v: shapes.iter().map(|&n| vec![0.0; n]).collect(),
        }
    }

    /// Number of applied steps
    pub fn steps(&self) -> u64 { self.t }

    /// Descends along `grads`
    pub fn step(
        &mut self,
        params: &mut [&mut [f32]],
        grads: &[&[f32]],
        learning_rate: f32,
    ) {
        assert_eq!(params.len(), self.m.len());
        assert_eq!(grads.len(), self.m.len());
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias2 = 1.0 - self.beta2.powi(self.t as i32);

        for (k, (param, grad)) in params.iter_mut().zip(grads).enumerate() {
            let (m, v) = (&mut self.m[k], &mut self.v[k]);
            assert_eq!(param.len(), m.len());
            for i in 0..param.len() {
                let g = grad[i];
                m[i] = self.beta1 * m[i] + (1.0 - self.beta1) * g;
                v[i] = self.beta2 * v[i] + (1.0 - self.beta2) * g * g;
                let m_hat = m[i] / bias1;
                let v_hat = v[i] / bias2;
                param[i] -= learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
    }
}
