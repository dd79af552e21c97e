use serde::{Deserialize, Serialize};

use crate::mass::Tolerance;
use crate::Error;

/// Precursor acceptance rule: which (scan mass, peptide mass) pairs a search
/// mode considers candidates for scoring
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acceptor {
    /// Scan mass within a tolerance of the peptide mass
    Tolerance(Tolerance),
    /// Scan mass within a tolerance of (peptide mass + offset), for a fixed
    /// set of Dalton offsets (isotope errors, known shifts)
    Offsets {
        tolerance: Tolerance,
        offsets: Vec<f64>,
    },
    /// Scan minus peptide mass falls into one of a fixed set of closed
    /// Dalton intervals
    Intervals(Vec<(f64, f64)>),
}

/// A named acceptance predicate plus its inverse: given a peptide mass,
/// enumerate the scan-mass intervals that would accept it. Both forms must
/// agree; classic search walks the intervals, modern search asks the
/// predicate directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchMode {
    pub name: String,
    acceptor: Acceptor,
}

impl SearchMode {
    pub fn new(name: impl Into<String>, acceptor: Acceptor) -> Result<Self, Error> {
        match &acceptor {
            Acceptor::Tolerance(_) => {}
            Acceptor::Offsets { offsets, .. } => {
                if offsets.is_empty() {
                    return Err(Error::InvalidParameter("search mode has no offsets"));
                }
                if offsets.iter().any(|o| !o.is_finite()) {
                    return Err(Error::InvalidParameter("non-finite search mode offset"));
                }
            }
            Acceptor::Intervals(intervals) => {
                if intervals.is_empty() {
                    return Err(Error::InvalidParameter("search mode has no intervals"));
                }
                if intervals
                    .iter()
                    .any(|&(lo, hi)| !lo.is_finite() || !hi.is_finite() || lo > hi)
                {
                    return Err(Error::InvalidParameter("malformed search mode interval"));
                }
            }
        }
        Ok(SearchMode {
            name: name.into(),
            acceptor,
        })
    }

    /// Standard open-tolerance mode around the peptide mass
    pub fn tolerance(name: impl Into<String>, tolerance: Tolerance) -> Self {
        SearchMode {
            name: name.into(),
            acceptor: Acceptor::Tolerance(tolerance),
        }
    }

    /// Does this mode accept `scan_mass` as a candidate precursor for a
    /// peptide of `peptide_mass`? Tolerance windows are computed on the
    /// peptide mass, matching [`SearchMode::intervals`].
    pub fn accepts(&self, scan_mass: f64, peptide_mass: f64) -> bool {
        match &self.acceptor {
            Acceptor::Tolerance(tol) => tol.contains(peptide_mass, scan_mass),
            Acceptor::Offsets { tolerance, offsets } => offsets
                .iter()
                .any(|offset| tolerance.contains(peptide_mass + offset, scan_mass)),
            Acceptor::Intervals(intervals) => {
                let delta = scan_mass - peptide_mass;
                intervals.iter().any(|&(lo, hi)| delta >= lo && delta <= hi)
            }
        }
    }

    /// The scan-mass intervals that accept a peptide of `peptide_mass`,
    /// sorted ascending. Used by classic search to binary-search the
    /// precursor-mass-sorted scan array.
    pub fn intervals(&self, peptide_mass: f64) -> Vec<(f64, f64)> {
        let mut out = match &self.acceptor {
            Acceptor::Tolerance(tol) => vec![tol.bounds(peptide_mass)],
            Acceptor::Offsets { tolerance, offsets } => offsets
                .iter()
                .map(|offset| tolerance.bounds(peptide_mass + offset))
                .collect(),
            Acceptor::Intervals(intervals) => intervals
                .iter()
                .map(|&(lo, hi)| (peptide_mass + lo, peptide_mass + hi))
                .collect(),
        };
        out.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
        out
    }
}
