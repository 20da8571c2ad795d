use std::collections::VecDeque;

/// Fixed-capacity rolling window of samples. Pushing into a full window
/// evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + Clone + '_ {
        self.samples.iter().copied()
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Population standard deviation over the current contents.
    pub fn std_dev(&self) -> f64 {
        crate::landmarks::population_std(self.iter())
    }
}
