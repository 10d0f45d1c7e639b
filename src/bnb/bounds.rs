use std::sync::atomic::{AtomicI64, Ordering::Relaxed};

/// Triangular table of lower bounds on the travel cost between pairs of
/// rounds, shared between the main search and the background bound engine.
///
/// Cells only ever increase, so plain relaxed atomics are enough: a stale
/// read yields a weaker bound, never an invalid one.
pub struct Bounds {
    n_rounds: usize,
    cells: Vec<AtomicI64>,
}

impl Bounds {
    pub fn new(n_rounds: usize) -> Bounds {
        Bounds {
            n_rounds,
            cells: (0..n_rounds * n_rounds).map(|_| AtomicI64::new(0)).collect(),
        }
    }

    /// Lower bound on the cost incurred between `first` and `last`.
    pub fn get(&self, first: usize, last: usize) -> i64 {
        debug_assert!(first <= last && last < self.n_rounds);
        self.cells[first * self.n_rounds + last].load(Relaxed)
    }

    /// Record that the rounds `[first, last]` cost at least `lb`, and
    /// propagate through every enclosing range: a bound for `[i, j]` is the
    /// chain `[i, first] + lb + [last, j]`.
    pub fn set(&self, first: usize, last: usize, lb: i64) {
        debug_assert!(first < last && last < self.n_rounds);
        for i in (0..=first).rev() {
            let head = self.get(i, first);
            for j in last..self.n_rounds {
                let candidate = head + lb + self.get(last, j);
                self.cells[i * self.n_rounds + j].fetch_max(candidate, Relaxed);
            }
        }
    }
}
