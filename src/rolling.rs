//! Rolling aggregation
//!
//! Fixed-width rolling sum and mean computed with a sliding accumulator: each
//! step adds the entering value and removes the leaving one, so a segment of
//! `n` samples costs O(n). Callers run one aggregator per segment so windows
//! never straddle a segment boundary.

use std::collections::VecDeque;

/// Rolling statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Mean,
}

/// Sliding window state over one sequence
#[derive(Debug, Clone)]
pub struct RollingWindow {
    width: usize,
    values: VecDeque<Option<f64>>,
    sum: f64,
    missing: usize,
}

impl RollingWindow {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            values: VecDeque::with_capacity(width),
            sum: 0.0,
            missing: 0,
        }
    }

    /// Push the next value and return the window sum once the window is full
    /// and every value in it is present.
    pub fn push(&mut self, value: Option<f64>) -> Option<f64> {
        let value = value.filter(|v| v.is_finite());
        match value {
            Some(v) => self.sum += v,
            None => self.missing += 1,
        }
        self.values.push_back(value);

        while self.values.len() > self.width {
            match self.values.pop_front().flatten() {
                Some(v) => self.sum -= v,
                None => self.missing -= 1,
            }
        }

        // Resynchronise once the window holds only missing values again
        if self.missing == self.values.len() {
            self.sum = 0.0;
        }

        (self.width > 0 && self.values.len() == self.width && self.missing == 0).then_some(self.sum)
    }
}

/// Fixed-width rolling aggregate over one segment's values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingAggregator {
    width: usize,
    aggregate: Aggregate,
}

impl RollingAggregator {
    pub fn new(width: usize, aggregate: Aggregate) -> Self {
        Self { width, aggregate }
    }

    pub fn sum(width: usize) -> Self {
        Self::new(width, Aggregate::Sum)
    }

    pub fn mean(width: usize) -> Self {
        Self::new(width, Aggregate::Mean)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Aggregate at every row `i`, covering rows `[i - width + 1, i]`.
    ///
    /// Rows before the `width`-th and windows holding a missing value are
    /// `None`.
    pub fn apply(&self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        let mut window = RollingWindow::new(self.width);
        let width = self.width as f64;

        values
            .iter()
            .map(|value| {
                window.push(*value).map(|sum| match self.aggregate {
                    Aggregate::Sum => sum,
                    Aggregate::Mean => sum / width,
                })
            })
            .collect()
    }
}

/// Negated first difference: each row's drop versus the previous row.
///
/// The first row has no predecessor and contributes zero; a row next to a
/// missing value is missing.
pub fn negated_diff(values: &[Option<f64>]) -> Vec<Option<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(i, current)| {
            if i == 0 {
                return current.map(|_| 0.0);
            }
            match (values[i - 1], current) {
                (Some(prev), Some(curr)) => Some(prev - curr),
                _ => None,
            }
        })
        .collect()
}
