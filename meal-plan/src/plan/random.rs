const MULTIPLIER: i128 = 9301;
const INCREMENT: i128 = 49297;
const MODULUS: i128 = 233280;

/// Linear congruential stream used for reproducible plans.
///
/// `state_{k+1} = (state_k * 9301 + 49297) mod 233280`, starting from the seed.
/// Every draw is `state / 233280`, so the same seed always yields the same plan.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    state: i128,
}

impl SeededRandom {
    pub fn new(seed: i64) -> Self {
        Self {
            state: i128::from(seed),
        }
    }

    /// Next draw in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        // rem_euclid keeps negative seeds inside [0, MODULUS)
        self.state = (self.state * MULTIPLIER + INCREMENT).rem_euclid(MODULUS);
        self.state as f64 / MODULUS as f64
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    pub fn pick_index(&mut self, len: usize) -> usize {
        let index = (self.next_f64() * len as f64) as usize;
        index.min(len.saturating_sub(1))
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.pick_index(items.len());
        items.get(index)
    }

    /// Reorders `items` with an insertion sort whose comparator consumes one
    /// draw per comparison.
    pub fn shuffle_by_comparison<T>(&mut self, items: &mut [T]) {
        for i in 1..items.len() {
            let mut j = i;
            while j > 0 && self.next_f64() < 0.5 {
                items.swap(j - 1, j);
                j -= 1;
            }
        }
    }
}
