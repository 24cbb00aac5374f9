//! Surface and callback id generation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Produces `f`-prefixed hex ids: eight hex digits of a random 30-bit value
/// followed by a per-generator counter, so ids never repeat within one
/// generator and are hard to guess across pages.
#[derive(Debug)]
pub struct IdGenerator {
    rng: StdRng,
    counter: u32,
}

impl IdGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            counter: 0,
        }
    }

    pub fn next_id(&mut self) -> String {
        self.counter = self.counter.wrapping_add(1);
        let random: u32 = self.rng.gen_range(0..1 << 30);
        format!("f{random:08x}{:x}", self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_prefixed_hex() {
        let mut ids = IdGenerator::new(1);
        let id = ids.next_id();
        assert!(id.starts_with('f'));
        assert!(id.len() >= 10);
        assert!(id[1..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ids_are_unique() {
        let mut ids = IdGenerator::new(7);
        let seen: HashSet<String> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = IdGenerator::new(99);
        let mut b = IdGenerator::new(99);
        assert_eq!(a.next_id(), b.next_id());
    }
}
