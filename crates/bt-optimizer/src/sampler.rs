//! Initial designs over the unit cube of a search space.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Draws points of `[0, 1]^dimension`; the search space maps them to values.
pub trait InitialDesign: Send {
    fn sample(&mut self, dimension: usize, count: usize) -> Vec<Vec<f64>>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignKind {
    #[default]
    LatinHypercube,
    Uniform,
}

impl DesignKind {
    pub fn build(self, seed: u64) -> Box<dyn InitialDesign> {
        match self {
            Self::LatinHypercube => Box::new(LatinHypercube::new(seed)),
            Self::Uniform => Box::new(UniformSampler::new(seed)),
        }
    }
}

/// Independent uniform sampling.
#[derive(Debug, Clone)]
pub struct UniformSampler {
    rng: ChaCha8Rng,
}

impl UniformSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl InitialDesign for UniformSampler {
    fn sample(&mut self, dimension: usize, count: usize) -> Vec<Vec<f64>> {
        (0..count)
            .map(|_| (0..dimension).map(|_| self.rng.random::<f64>()).collect())
            .collect()
    }

    fn name(&self) -> &str {
        "uniform"
    }
}

/// Latin hypercube: each axis is cut into `count` strata and every stratum
/// receives exactly one point.
#[derive(Debug, Clone)]
pub struct LatinHypercube {
    rng: ChaCha8Rng,
}

impl LatinHypercube {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl InitialDesign for LatinHypercube {
    fn sample(&mut self, dimension: usize, count: usize) -> Vec<Vec<f64>> {
        let mut points = vec![vec![0.0; dimension]; count];
        let mut strata: Vec<usize> = (0..count).collect();
        for axis in 0..dimension {
            strata.shuffle(&mut self.rng);
            for (point, &stratum) in points.iter_mut().zip(&strata) {
                point[axis] = (stratum as f64 + self.rng.random::<f64>()) / count as f64;
            }
        }
        points
    }

    fn name(&self) -> &str {
        "latin_hypercube"
    }
}
