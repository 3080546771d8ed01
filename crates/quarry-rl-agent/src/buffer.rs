//! Experience replay buffer

use std::collections::VecDeque;

use rand::Rng;

use quarry_rl_core::Experience;

/// Fixed-capacity, insertion-ordered transition store with FIFO eviction
#[derive(Debug, Clone)]
pub struct ExperienceBuffer {
    /// Buffer storage
    buffer: VecDeque<Experience>,
    /// Maximum capacity
    capacity: usize,
}

impl ExperienceBuffer {
    /// Create a new buffer. A capacity of 0 is raised to 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Add an experience, returning the evicted oldest one when full
    pub fn push(&mut self, experience: Experience) -> Option<Experience> {
        let evicted = if self.buffer.len() >= self.capacity {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(experience);
        evicted
    }

    /// Draw `count` experiences uniformly at random, with replacement
    pub fn sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<Experience> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        (0..count)
            .map(|_| self.buffer[rng.gen_range(0..self.buffer.len())].clone())
            .collect()
    }

    /// Get the current size of the buffer
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Maximum number of experiences kept
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest experience still held
    #[must_use]
    pub fn oldest(&self) -> Option<&Experience> {
        self.buffer.front()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.buffer.iter()
    }

    /// Drop every experience and adopt `capacity` (raised to 1 if 0)
    pub fn clear(&mut self, capacity: usize) {
        self.buffer.clear();
        self.capacity = capacity.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn exp(i: usize) -> Experience {
        Experience::new(format!("s{i}"), "a", 0.0, format!("s{}", i + 1), false)
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut buffer = ExperienceBuffer::new(2);
        assert!(buffer.push(exp(0)).is_none());
        assert!(buffer.push(exp(1)).is_none());
        let evicted = buffer.push(exp(2)).unwrap();
        assert_eq!(evicted.state().as_str(), "s0");
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.oldest().unwrap().state().as_str(), "s1");
    }

    #[test]
    fn test_sample_with_replacement() {
        let mut buffer = ExperienceBuffer::new(8);
        buffer.push(exp(0));
        let mut rng = StdRng::seed_from_u64(7);
        let batch = buffer.sample(5, &mut rng);
        assert_eq!(batch.len(), 5);
        assert!(batch.iter().all(|e| e.state().as_str() == "s0"));
        assert!(ExperienceBuffer::new(4).sample(3, &mut rng).is_empty());
    }

    proptest! {
        #[test]
        fn prop_fifo_eviction(capacity in 1usize..16, pushes in 0usize..64) {
            let mut buffer = ExperienceBuffer::new(capacity);
            let mut evicted = Vec::new();
            for i in 0..pushes {
                if let Some(old) = buffer.push(exp(i)) {
                    evicted.push(old);
                }
            }

            prop_assert_eq!(buffer.len(), pushes.min(capacity));
            // evicted in insertion order, starting from the first pushed
            for (n, old) in evicted.iter().enumerate() {
                prop_assert_eq!(old.state().as_str(), format!("s{n}"));
            }
            // survivors are the newest, still in insertion order
            let first_kept = pushes.saturating_sub(capacity);
            for (offset, kept) in buffer.iter().enumerate() {
                prop_assert_eq!(kept.state().as_str(), format!("s{}", first_kept + offset));
            }
        }
    }
}
