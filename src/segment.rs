//! Segmentation
//!
//! Splits an ordered sample sequence into maximal runs of strictly consecutive
//! timestamps. A row-to-row delta other than exactly one second (a gap, a
//! repeated timestamp or a step backwards) starts a new segment.

use crate::error::ComputeError;
use crate::types::{Sample, Segment};

/// Result of segmenting a sample sequence
#[derive(Debug, Clone, PartialEq)]
pub enum Segmentation {
    /// There were no samples at all
    NoData,
    /// Samples existed but every segment was shorter than the minimum
    AllTooShort { discarded: usize },
    /// Retained segments, in encounter order
    Segments(Vec<Segment>),
}

impl Segmentation {
    /// Retained segments, or the reason there are none
    pub fn into_segments(self) -> Result<Vec<Segment>, ComputeError> {
        match self {
            Segmentation::NoData => Err(ComputeError::MissingData("no samples".to_string())),
            Segmentation::AllTooShort { discarded } => Err(ComputeError::InsufficientLength(
                format!("all {discarded} segments are below the minimum length"),
            )),
            Segmentation::Segments(segments) => Ok(segments),
        }
    }
}

/// Segment id of every row: a cumulative count of timestamp breaks
pub fn segment_ids(secs: &[i64]) -> Vec<usize> {
    let mut ids = Vec::with_capacity(secs.len());
    let mut current = 0usize;
    for (i, &t) in secs.iter().enumerate() {
        if i > 0 && t - secs[i - 1] != 1 {
            current += 1;
        }
        ids.push(current);
    }
    ids
}

/// Builds contiguous segments and discards short ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentBuilder {
    min_len: usize,
}

impl SegmentBuilder {
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    /// Split samples into segments without dropping any
    pub fn split(&self, samples: &[Sample]) -> Vec<Segment> {
        let secs: Vec<i64> = samples.iter().map(|s| s.secs).collect();
        let ids = segment_ids(&secs);

        let mut segments: Vec<Segment> = Vec::new();
        for (sample, id) in samples.iter().zip(ids) {
            match segments.last_mut() {
                Some(segment) if segment.id == id => segment.samples.push(*sample),
                _ => segments.push(Segment {
                    id,
                    samples: vec![*sample],
                }),
            }
        }
        segments
    }

    /// Split samples and keep only segments of at least `min_len` samples
    pub fn build(&self, samples: &[Sample]) -> Segmentation {
        if samples.is_empty() {
            return Segmentation::NoData;
        }

        let all = self.split(samples);
        let total = all.len();
        let kept: Vec<Segment> = all
            .into_iter()
            .filter(|segment| segment.len() >= self.min_len)
            .collect();

        if kept.is_empty() {
            Segmentation::AllTooShort { discarded: total }
        } else {
            Segmentation::Segments(kept)
        }
    }
}
