use std::sync::Mutex;

use rayon::prelude::*;

use crate::index::{binary_search_slice, IndexParameters};
use crate::mass::Tolerance;
use crate::protein::Protein;
use crate::scoring::{keep_best, match_ions, Psm};
use crate::search_mode::SearchMode;
use crate::spectrum::Scan;
use crate::{Error, Progress};

/// The classic strategy: iterate peptides, binary-search the
/// precursor-mass-sorted scan array for each search mode's acceptance
/// interval, and score every candidate scan directly. Cost is roughly
/// O(peptides * log(scans) + matches).
pub struct ClassicSearch {
    pub parameters: IndexParameters,
    pub fragment_tolerance: Tolerance,
    pub modes: Vec<SearchMode>,
    pub chunk_size: usize,
}

impl ClassicSearch {
    pub fn new(
        parameters: IndexParameters,
        fragment_tolerance: Tolerance,
        modes: Vec<SearchMode>,
    ) -> Self {
        ClassicSearch {
            parameters,
            fragment_tolerance,
            modes,
            chunk_size: 512,
        }
    }

    /// Returns, for each search mode, one `Option<Psm>` per scan (indexed by
    /// position in the sorted scan array). Scans must be sorted by precursor
    /// mass, as produced by [`crate::spectrum::prepare`].
    pub fn search(
        &self,
        proteins: &[Protein],
        scans: &[Scan],
    ) -> Result<Vec<Vec<Option<Psm>>>, Error> {
        if self.modes.is_empty() {
            return Err(Error::InvalidParameter("no search modes configured"));
        }
        // One deduplicated entry per distinct (sequence, mods, termini),
        // protein lists merged, so each is scored exactly once
        let peptides = self.parameters.enumerate_peptides(proteins)?;
        log::trace!("classic search over {} peptides", peptides.len());

        let progress = Progress::new(peptides.len(), "classic search");
        let best: Mutex<Vec<Vec<Option<Psm>>>> =
            Mutex::new(vec![vec![None; scans.len()]; self.modes.len()]);

        peptides.par_chunks(self.chunk_size.max(1)).for_each(|chunk| {
            let mut local: Vec<Vec<(usize, Psm)>> = vec![Vec::new(); self.modes.len()];
            for entry in chunk {
                let masses = match entry.peptide.product_masses(
                    &self.parameters.catalog,
                    &self.parameters.fixed_mods,
                    &self.parameters.fragment_kinds,
                ) {
                    Ok(masses) => masses,
                    Err(e) => {
                        log::warn!("skipping peptide: {}", e);
                        continue;
                    }
                };
                for (mode_ix, mode) in self.modes.iter().enumerate() {
                    for (lo, hi) in mode.intervals(entry.peptide.monoisotopic) {
                        let (left, right) = binary_search_slice(
                            scans,
                            |scan, mass| scan.precursor_mass.total_cmp(mass),
                            lo,
                            hi,
                        );
                        for scan_ix in left..right {
                            let scan = &scans[scan_ix];
                            if scan.precursor_mass < lo || scan.precursor_mass > hi {
                                continue;
                            }
                            let (score, _) = match_ions(scan, self.fragment_tolerance, &masses);
                            if score > 1.0 {
                                local[mode_ix].push((scan_ix, Psm::new(scan_ix, scan, entry, score)));
                            }
                        }
                    }
                }
            }

            // merge and progress under one lock so progress stays monotone
            // with visible results
            let mut best = match best.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for (mode_ix, candidates) in local.into_iter().enumerate() {
                for (scan_ix, psm) in candidates {
                    keep_best(&mut best[mode_ix][scan_ix], psm);
                }
            }
            progress.inc(chunk.len());
        });

        Ok(best.into_inner().unwrap_or_else(|p| p.into_inner()))
    }
}
