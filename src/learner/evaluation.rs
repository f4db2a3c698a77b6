//! Classification scoring for fitted estimators.

use ndarray::ArrayView2;

/// Confusion matrix for a `K`-class classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    /// Tally paired labels; pairs outside `0..n_classes` are ignored.
    pub fn from_labels(n_classes: usize, truth: &[usize], predicted: &[usize]) -> Self {
        let mut cm = Self::new(n_classes);
        for (&t, &p) in truth.iter().zip(predicted) {
            cm.add(t, p);
        }
        cm
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    /// Fraction of tallied pairs on the diagonal, 0 when empty.
    pub fn accuracy(&self) -> f64 {
        let total: u64 = self.counts.iter().map(|&v| u64::from(v)).sum();
        if total == 0 {
            return 0.0;
        }
        let correct: u64 = (0..self.n_classes)
            .map(|class| u64::from(self.get(class, class)))
            .sum();
        correct as f64 / total as f64
    }
}

/// Index of the largest probability per row. NaN entries never win.
pub fn argmax_rows(proba: ArrayView2<'_, f32>) -> Vec<usize> {
    proba
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            let mut best_value = f32::NEG_INFINITY;
            for (idx, &value) in row.iter().enumerate() {
                if value > best_value {
                    best = idx;
                    best_value = value;
                }
            }
            best
        })
        .collect()
}
