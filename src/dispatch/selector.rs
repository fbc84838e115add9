use crate::config::SinkConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Picks one sink per message with probability proportional to its weight.
///
/// The RNG is seeded once per process from OS entropy and shared behind a
/// mutex; fairness is statistical across many draws, not per-draw.
pub struct WeightedSelector {
    rng: Mutex<StdRng>,
}

impl WeightedSelector {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Select one sink from `candidates` by weighted random draw.
    ///
    /// Returns `None` for an empty candidate set. A single candidate is
    /// returned unconditionally. If every candidate weighs zero the first
    /// one is returned, so a caller with candidates always gets a sink.
    pub fn pick<'a>(&self, candidates: &[&'a SinkConfig]) -> Option<&'a SinkConfig> {
        match candidates {
            [] => None,
            [only] => Some(*only),
            _ => {
                let total: f64 = candidates.iter().map(|s| s.weight).sum();
                if total <= 0.0 {
                    return Some(candidates[0]);
                }

                let draw = {
                    let mut rng = self.rng.lock().expect("selector rng lock poisoned");
                    rng.gen_range(0.0..total)
                };

                let mut running = 0.0;
                for sink in candidates.iter().copied() {
                    running += sink.weight;
                    if running >= draw {
                        return Some(sink);
                    }
                }

                // Floating-point rounding can leave the draw above the final
                // running sum.
                candidates.last().copied()
            }
        }
    }
}

impl Default for WeightedSelector {
    fn default() -> Self {
        Self::new()
    }
}
