use std::sync::Mutex;

use rayon::prelude::*;

use crate::index::FragmentIndex;
use crate::mass::PROTON;
use crate::scoring::{keep_best, Psm};
use crate::search_mode::SearchMode;
use crate::spectrum::Scan;
use crate::{Error, Progress};

/// The index-accelerated strategy: iterate scans, look up every peak in the
/// fragment index, and accumulate intensity-weighted scores per peptide.
/// This inverts the classic nested loop; precursor filtering happens per
/// search mode after scoring, via the mode's accept predicate.
pub struct ModernSearch {
    /// Fragment matching window applied to the rounded index keys
    pub fragment_tolerance_da: f64,
    pub modes: Vec<SearchMode>,
}

impl ModernSearch {
    pub fn new(fragment_tolerance_da: f64, modes: Vec<SearchMode>) -> Self {
        ModernSearch {
            fragment_tolerance_da,
            modes,
        }
    }

    /// Returns, for each search mode, one `Option<Psm>` per scan, in scan
    /// array order
    pub fn search(
        &self,
        index: &FragmentIndex,
        scans: &[Scan],
    ) -> Result<Vec<Vec<Option<Psm>>>, Error> {
        if self.modes.is_empty() {
            return Err(Error::InvalidParameter("no search modes configured"));
        }
        if !self.fragment_tolerance_da.is_finite() || self.fragment_tolerance_da <= 0.0 {
            return Err(Error::InvalidParameter("invalid fragment tolerance"));
        }
        log::trace!(
            "modern search: {} scans against {} peptides",
            scans.len(),
            index.len()
        );

        let progress = Progress::new(scans.len(), "modern search");
        let best: Mutex<Vec<Vec<Option<Psm>>>> =
            Mutex::new(vec![vec![None; scans.len()]; self.modes.len()]);

        scans.par_iter().enumerate().for_each_init(
            // one accumulator per worker, cleared per scan, never reallocated
            || vec![0f64; index.len()],
            |accumulator, (scan_ix, scan)| {
                accumulator.iter_mut().for_each(|slot| *slot = 0.0);
                for (&mz, &intensity) in scan.mz.iter().zip(&scan.intensity) {
                    let neutral = mz - PROTON;
                    let increment = 1.0 + intensity / scan.total_ion_current;
                    index.peptides_within(neutral, self.fragment_tolerance_da, |ix| {
                        accumulator[ix.0 as usize] += increment;
                    });
                }

                // one pass over the accumulator, all modes at once
                let mut local: Vec<Option<Psm>> = vec![None; self.modes.len()];
                for (peptide_ix, &score) in accumulator.iter().enumerate() {
                    if score <= 1.0 {
                        continue;
                    }
                    let entry = &index.peptides[peptide_ix];
                    for (mode_ix, mode) in self.modes.iter().enumerate() {
                        if mode.accepts(scan.precursor_mass, entry.peptide.monoisotopic) {
                            keep_best(&mut local[mode_ix], Psm::new(scan_ix, scan, entry, score));
                        }
                    }
                }

                let mut best = match best.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                for (mode_ix, psm) in local.into_iter().enumerate() {
                    if let Some(psm) = psm {
                        keep_best(&mut best[mode_ix][scan_ix], psm);
                    }
                }
                progress.inc(1);
            },
        );

        Ok(best.into_inner().unwrap_or_else(|p| p.into_inner()))
    }
}
