use std::hash::{DefaultHasher, Hash, Hasher};

const DEPTH: usize = 4;
const MAX_COUNT: u8 = 15;
const SEEDS: [u64; DEPTH] = [
    0x9E37_79B9_7F4A_7C15,
    0xC2B2_AE3D_27D4_EB4F,
    0x1656_67B1_9E37_79F9,
    0x85EB_CA77_C2B2_AE63,
];

pub(crate) fn hash_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Count-min sketch of recent key popularity.
///
/// Counters saturate at 15 and are halved once the number of recorded
/// accesses reaches ten times the width, so old popularity fades.
pub(crate) struct FrequencySketch {
    counters: Vec<u8>,
    width: usize,
    mask: usize,
    additions: usize,
    sample_size: usize,
}

impl FrequencySketch {
    pub fn new(num_counters: usize) -> Self {
        let width = num_counters.max(1).next_power_of_two();
        Self {
            counters: vec![0; width * DEPTH],
            width,
            mask: width - 1,
            additions: 0,
            sample_size: width.saturating_mul(10),
        }
    }

    pub fn increment(&mut self, hash: u64) {
        for row in 0..DEPTH {
            let slot = self.slot(row, hash);
            if self.counters[slot] < MAX_COUNT {
                self.counters[slot] += 1;
            }
        }

        self.additions += 1;
        if self.additions >= self.sample_size {
            self.age();
        }
    }

    pub fn estimate(&self, hash: u64) -> u8 {
        (0..DEPTH)
            .map(|row| self.counters[self.slot(row, hash)])
            .min()
            .unwrap_or(0)
    }

    fn age(&mut self) {
        for counter in self.counters.iter_mut() {
            *counter >>= 1;
        }
        self.additions /= 2;
    }

    fn slot(&self, row: usize, hash: u64) -> usize {
        let mixed = (hash ^ SEEDS[row]).wrapping_mul(0x2545_F491_4F6C_DD1D);
        row * self.width + ((mixed ^ (mixed >> 32)) as usize & self.mask)
    }
}
