pub mod bins;
pub mod classic;
pub mod combinatorics;
pub mod compact;
pub mod enzyme;
pub mod fdr;
pub mod index;
pub mod mass;
pub mod modern;
pub mod modification;
pub mod parsimony;
pub mod peptide;
pub mod protein;
pub mod scoring;
pub mod search_mode;
pub mod spectrum;

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A character outside the amino-acid alphabet
    InvalidResidue(char),
    /// A modification definition or placement string that fails validation
    InvalidModification(String),
    /// Configuration rejected before any parallel work starts
    InvalidParameter(&'static str),
    /// An explicitly unimplemented combination, reported rather than
    /// silently approximated
    Unsupported(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidResidue(c) => write!(f, "invalid amino acid: {}", c),
            Self::InvalidModification(s) => write!(f, "invalid modification: {}", s),
            Self::InvalidParameter(s) => write!(f, "invalid parameter: {}", s),
            Self::Unsupported(s) => write!(f, "unsupported: {}", s),
        }
    }
}

impl std::error::Error for Error {}

/// Coarse progress reporting for the parallel engines: incremented once per
/// completed partition, logged at decile boundaries. Monotonic as long as
/// increments happen under the same lock as the result merge.
pub struct Progress {
    total: usize,
    completed: AtomicUsize,
    stage: &'static str,
}

impl Progress {
    pub fn new(total: usize, stage: &'static str) -> Self {
        Progress {
            total,
            completed: AtomicUsize::new(0),
            stage,
        }
    }

    pub fn inc(&self, n: usize) {
        if self.total == 0 {
            return;
        }
        let done = self.completed.fetch_add(n, Ordering::Relaxed) + n;
        let before = (done - n) * 10 / self.total;
        let after = (done.min(self.total)) * 10 / self.total;
        if after > before {
            log::info!("{}: {}%", self.stage, after * 10);
        }
    }
}
