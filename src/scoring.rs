use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use crate::compact::{CompactPeptide, FixedMods};
use crate::index::IndexedPeptide;
use crate::mass::{Tolerance, PROTON};
use crate::modification::ModificationCatalog;
use crate::peptide::FragmentKind;
use crate::spectrum::Scan;
use crate::Error;

/// Scores closer than this are treated as equal when ranking matches
pub const SCORE_EPSILON: f64 = 1e-9;

/// On a score tie, a match whose mass sits within this many Daltons of the
/// observed precursor outranks one that does not
pub const PROXIMITY_DA: f64 = 0.5;

/// Match a sorted theoretical fragment-mass array against a scan's peaks.
///
/// Two-pointer merge: the experimental pointer advances while below the
/// current theoretical target; each theoretical mass is recorded once in the
/// output, positive if matched, negative if not. Score is the match count
/// plus each matched peak's share of the total ion current. An empty
/// theoretical list scores 0.
pub fn match_ions(scan: &Scan, tolerance: Tolerance, theoretical: &[f64]) -> (f64, Vec<f64>) {
    let mut score = 0.0;
    let mut matched = Vec::with_capacity(theoretical.len());
    let mut exp = 0;
    for &mass in theoretical {
        let (lo, hi) = tolerance.bounds(mass + PROTON);
        while exp < scan.mz.len() && scan.mz[exp] < lo {
            exp += 1;
        }
        if exp < scan.mz.len() && scan.mz[exp] <= hi {
            score += 1.0 + scan.intensity[exp] / scan.total_ion_current;
            matched.push(mass);
        } else {
            matched.push(-mass);
        }
    }
    (score, matched)
}

/// Re-score a matched peptide with the observed precursor mass delta pinned
/// to each residue position in turn. The resulting per-residue score array
/// feeds bin-analysis residue identification.
pub fn localization_scores(
    peptide: &CompactPeptide,
    catalog: &ModificationCatalog,
    fixed_mods: &FixedMods,
    kinds: &[FragmentKind],
    scan: &Scan,
    tolerance: Tolerance,
) -> Result<Vec<f64>, Error> {
    let delta = scan.precursor_mass - peptide.monoisotopic;
    (0..peptide.len())
        .map(|i| {
            let masses =
                peptide.product_masses_with_shift(catalog, fixed_mods, kinds, i + 2, delta)?;
            Ok(match_ions(scan, tolerance, &masses).0)
        })
        .collect()
}

/// One peptide-spectrum match. Identity fields are fixed at creation; the
/// FDR engine later fills in the cumulative counts and q-value, and bin
/// analysis may attach localization scores.
#[derive(Clone, Debug, Serialize)]
pub struct Psm {
    pub peptide: CompactPeptide,
    pub proteins: Vec<Arc<String>>,
    /// Position of the scan in the precursor-mass-sorted scan array
    pub scan_index: usize,
    pub scan_number: usize,
    pub precursor_mass: f64,
    pub score: f64,
    pub decoy: bool,
    pub localized_scores: Option<Vec<f64>>,
    pub cumulative_target: u32,
    pub cumulative_decoy: u32,
    pub q_value: f64,
}

impl Psm {
    pub fn new(scan_index: usize, scan: &Scan, entry: &IndexedPeptide, score: f64) -> Psm {
        Psm {
            peptide: entry.peptide.clone(),
            proteins: entry.proteins.clone(),
            scan_index,
            scan_number: scan.scan_number,
            precursor_mass: scan.precursor_mass,
            score,
            decoy: entry.peptide.decoy,
            localized_scores: None,
            cumulative_target: 0,
            cumulative_decoy: 0,
            q_value: 1.0,
        }
    }

    fn precursor_delta(&self) -> f64 {
        (self.precursor_mass - self.peptide.monoisotopic).abs()
    }
}

/// Total order over matches, best first. Higher score wins (ties within
/// [`SCORE_EPSILON`]); then a match within [`PROXIMITY_DA`] of the observed
/// precursor beats one that is not; then fewer variable modifications; then
/// the lexicographically smaller compact encoding; then the lower scan
/// index. The final steps exist so that results are identical across thread
/// counts and runs.
pub fn rank(a: &Psm, b: &Psm) -> Ordering {
    if (a.score - b.score).abs() > SCORE_EPSILON {
        return b.score.total_cmp(&a.score);
    }
    let a_close = a.precursor_delta() <= PROXIMITY_DA;
    let b_close = b.precursor_delta() <= PROXIMITY_DA;
    if a_close != b_close {
        return if a_close { Ordering::Less } else { Ordering::Greater };
    }
    a.peptide
        .variable_mods()
        .cmp(&b.peptide.variable_mods())
        .then_with(|| a.peptide.cmp(&b.peptide))
        .then_with(|| a.scan_index.cmp(&b.scan_index))
}

/// Keep the better of an existing best match and a challenger
pub fn keep_best(best: &mut Option<Psm>, challenger: Psm) {
    match best {
        Some(current) if rank(current, &challenger) != Ordering::Greater => {}
        _ => *best = Some(challenger),
    }
}
