use std::collections::VecDeque;

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::config::{Algorithm, Randomization};
use crate::foundation::error::{OneoffError, OneoffResult};

/// Added to every weighted-mode weight so heavily used shaders keep a small chance.
const WEIGHT_FLOOR: f64 = 0.1;

/// Fair cycling over a fixed set of shader names.
///
/// Usage counters and the recency queue live for one job. Candidates are all names not in
/// the queue; when that set is empty the least recent entry is the only candidate.
#[derive(Clone, Debug)]
pub struct ShaderCycler {
    names: Vec<String>,
    usage: Vec<u32>,
    /// Indices into `names`, oldest first.
    history: VecDeque<usize>,
    max_history: usize,
    algorithm: Algorithm,
    distribution_weight: f64,
}

impl ShaderCycler {
    /// The effective history is capped at `names.len() - 1` so one candidate always remains.
    pub fn new(names: Vec<String>, cfg: &Randomization) -> OneoffResult<Self> {
        if names.is_empty() {
            return Err(OneoffError::validation("shader cycling needs at least one shader"));
        }
        let max_history = cfg.history_size.min(names.len() - 1);
        Ok(Self {
            usage: vec![0; names.len()],
            names,
            history: VecDeque::with_capacity(max_history + 1),
            max_history,
            algorithm: cfg.algorithm,
            distribution_weight: cfg.distribution_weight,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Uniformly random first pick, recorded.
    pub fn first(&mut self, rng: &mut impl Rng) -> String {
        let idx = rng.random_range(0..self.names.len());
        self.record_index(idx);
        self.names[idx].clone()
    }

    /// Pick and record the next shader.
    pub fn next(&mut self, rng: &mut impl Rng) -> String {
        let idx = self.select_index(rng);
        self.record_index(idx);
        self.names[idx].clone()
    }

    /// Pick the next shader without recording it.
    pub fn select(&self, rng: &mut impl Rng) -> &str {
        &self.names[self.select_index(rng)]
    }

    /// Count a use of `name` and push it onto the recency queue. Unknown names are ignored.
    pub fn record(&mut self, name: &str) {
        if let Some(idx) = self.names.iter().position(|n| n == name) {
            self.record_index(idx);
        }
    }

    pub fn usage(&self) -> impl Iterator<Item = (&str, u32)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.usage.iter().copied())
    }

    fn record_index(&mut self, idx: usize) {
        self.usage[idx] += 1;
        self.history.push_back(idx);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    fn candidates(&self) -> Vec<usize> {
        let fresh: Vec<usize> = (0..self.names.len())
            .filter(|i| !self.history.contains(i))
            .collect();
        if !fresh.is_empty() {
            return fresh;
        }
        match self.history.front() {
            Some(oldest) => vec![*oldest],
            None => (0..self.names.len()).collect(),
        }
    }

    fn weights(&self, candidates: &[usize]) -> Vec<f64> {
        match self.algorithm {
            Algorithm::Weighted => {
                let usage = |i: &usize| self.usage[*i];
                let min = candidates.iter().map(usage).min().unwrap_or(0);
                let max = candidates.iter().map(usage).max().unwrap_or(0);
                candidates
                    .iter()
                    .map(|i| {
                        if max == min {
                            1.0
                        } else {
                            let normalized = f64::from(usage(i) - min) / f64::from(max - min);
                            (1.0 - normalized).powf(self.distribution_weight) + WEIGHT_FLOOR
                        }
                    })
                    .collect()
            }
            Algorithm::PureRandom | Algorithm::Uniform => vec![1.0; candidates.len()],
        }
    }

    fn select_index(&self, rng: &mut impl Rng) -> usize {
        let candidates = self.candidates();
        let weights = self.weights(&candidates);
        roulette(&candidates, &weights, rng)
            .or_else(|| candidates.choose(rng).copied())
            .unwrap_or(0)
    }
}

/// Roulette-wheel pick: a uniform draw in `[0, total)` walked over the cumulative weights.
fn roulette(items: &[usize], weights: &[f64], rng: &mut impl Rng) -> Option<usize> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    let draw = rng.random::<f64>() * total;
    let mut cumulative = 0.0;
    for (item, w) in items.iter().zip(weights) {
        cumulative += w;
        if draw < cumulative {
            return Some(*item);
        }
    }
    items.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("s{i}.glsl")).collect()
    }

    fn cfg(algorithm: Algorithm, history_size: usize) -> Randomization {
        Randomization {
            algorithm,
            distribution_weight: 2.0,
            history_size,
        }
    }

    #[test]
    fn history_is_capped_below_shader_count() {
        let c = ShaderCycler::new(names(3), &cfg(Algorithm::Weighted, 10)).unwrap();
        assert_eq!(c.max_history(), 2);
        let single = ShaderCycler::new(names(1), &cfg(Algorithm::Weighted, 3)).unwrap();
        assert_eq!(single.max_history(), 0);
        assert!(ShaderCycler::new(Vec::new(), &Randomization::default()).is_err());
    }

    #[test]
    fn recent_shaders_are_never_repeated() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut c = ShaderCycler::new(names(4), &cfg(Algorithm::Weighted, 2)).unwrap();
        let mut picks = vec![c.first(&mut rng)];
        for _ in 0..200 {
            picks.push(c.next(&mut rng));
        }
        for w in picks.windows(3) {
            assert_ne!(w[0], w[1]);
            assert_ne!(w[0], w[2]);
            assert_ne!(w[1], w[2]);
        }
    }

    #[test]
    fn single_shader_always_repeats() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut c = ShaderCycler::new(names(1), &cfg(Algorithm::Weighted, 3)).unwrap();
        for _ in 0..5 {
            assert_eq!(c.next(&mut rng), "s0.glsl");
        }
        assert_eq!(c.usage().next(), Some(("s0.glsl", 5)));
    }

    #[test]
    fn weighted_mode_favors_the_least_used_candidate() {
        let mut c = ShaderCycler::new(names(3), &cfg(Algorithm::Weighted, 0)).unwrap();
        for _ in 0..10 {
            c.record("s0.glsl");
        }
        for _ in 0..5 {
            c.record("s1.glsl");
        }
        let w = c.weights(&[0, 1, 2]);
        assert!((w[0] - 0.1).abs() < 1e-12);
        assert!((w[1] - (0.25 + 0.1)).abs() < 1e-12);
        assert!((w[2] - 1.1).abs() < 1e-12);
    }

    #[test]
    fn equal_usage_and_pure_random_use_flat_weights() {
        let c = ShaderCycler::new(names(3), &cfg(Algorithm::Weighted, 0)).unwrap();
        assert_eq!(c.weights(&[0, 1, 2]), vec![1.0; 3]);
        let mut p = ShaderCycler::new(names(3), &cfg(Algorithm::PureRandom, 0)).unwrap();
        p.record("s0.glsl");
        assert_eq!(p.weights(&[0, 1, 2]), vec![1.0; 3]);
    }

    #[test]
    fn select_does_not_record() {
        let mut rng = StdRng::seed_from_u64(3);
        let c = ShaderCycler::new(names(2), &cfg(Algorithm::Weighted, 1)).unwrap();
        let _ = c.select(&mut rng);
        assert!(c.usage().all(|(_, n)| n == 0));
    }

    #[test]
    fn roulette_walks_cumulative_weights() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut hits = [0u32; 2];
        for _ in 0..2000 {
            let i = roulette(&[0, 1], &[1.0, 3.0], &mut rng).unwrap();
            hits[i] += 1;
        }
        assert!(hits[1] > hits[0] * 2, "{hits:?}");
        assert_eq!(roulette(&[0], &[0.0], &mut rng), None);
    }
}
