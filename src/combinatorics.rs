use std::sync::Arc;

use crate::enzyme::PeptideSpan;
use crate::modification::Modification;
use crate::peptide::{ModPattern, ModifiedPeptide};
use crate::protein::Protein;

/// Candidate variable/localized modifications for one peptide, keyed by
/// two-based position. Positions with no candidates are absent entirely, so
/// they contribute zero branching to the enumeration.
fn candidate_sites(
    protein: &Protein,
    span: PeptideSpan,
    variable_mods: &[Arc<Modification>],
) -> Vec<(usize, Vec<Arc<Modification>>)> {
    let seq = span.sequence(protein);
    let len = seq.len();
    let plen = protein.len();
    let mut sites: Vec<(usize, Vec<Arc<Modification>>)> = Vec::new();

    let mut push = |pos: usize, m: &Arc<Modification>| {
        match sites.iter_mut().find(|(p, _)| *p == pos) {
            Some((_, mods)) => {
                if !mods.iter().any(|other| other.id == m.id) {
                    mods.push(m.clone())
                }
            }
            None => sites.push((pos, vec![m.clone()])),
        }
    };

    for m in variable_mods {
        match m.placement.anchor(len) {
            Some(pos) => {
                if m.placement.fits(seq, pos, span.start, span.end, plen) {
                    push(pos, m);
                }
            }
            None => {
                for pos in 2..=len + 1 {
                    if m.placement.fits(seq, pos, span.start, span.end, plen) {
                        push(pos, m);
                    }
                }
            }
        }
    }

    // Localized annotations from the parent protein. On decoys the
    // positional fit check is skipped: the annotation survives reversal
    // even though the mirrored context no longer matches.
    for (&ppos, mods) in &protein.localized_mods {
        if ppos < span.start || ppos > span.end {
            continue;
        }
        let pos = ppos - span.start + 2;
        for m in mods {
            if protein.decoy || m.placement.fits(seq, pos, span.start, span.end, plen) {
                push(pos, m);
            } else if let Some(anchor) = m.placement.anchor(len) {
                // terminal annotation sitting on a terminal residue
                if m.placement.fits(seq, anchor, span.start, span.end, plen) {
                    push(anchor, m);
                }
            }
        }
    }

    sites.sort_by_key(|(pos, _)| *pos);
    sites
}

/// Enumerate all modification patterns for a peptide: every way to place
/// `k = 0..=max_mods` variable/localized modifications over the candidate
/// sites, each overlaid with the fixed modifications at unclaimed positions.
///
/// Yields at most `max_isoforms` patterns, fewest-modifications first; the
/// cap is an early termination, not a post-hoc truncation.
pub fn modification_patterns(
    protein: &Protein,
    span: PeptideSpan,
    fixed_mods: &[Arc<Modification>],
    variable_mods: &[Arc<Modification>],
    max_mods: usize,
    max_isoforms: usize,
) -> Vec<(ModPattern, Vec<(usize, Arc<Modification>)>)> {
    let sites = candidate_sites(protein, span, variable_mods);
    let seq = span.sequence(protein);
    let len = seq.len();
    let plen = protein.len();

    let mut out: Vec<(ModPattern, Vec<(usize, Arc<Modification>)>)> = Vec::new();
    let mut current: Vec<(usize, Arc<Modification>)> = Vec::new();

    let mut emit = |chosen: &[(usize, Arc<Modification>)],
                    out: &mut Vec<(ModPattern, Vec<(usize, Arc<Modification>)>)>|
     -> bool {
        let mut pattern = ModPattern::default();
        for (pos, m) in chosen {
            pattern.insert(*pos, m.clone());
        }
        // fixed mods fill in anywhere the variable pattern left open
        for m in fixed_mods {
            match m.placement.anchor(len) {
                Some(pos) => {
                    if m.placement.fits(seq, pos, span.start, span.end, plen) {
                        pattern.insert(pos, m.clone());
                    }
                }
                None => {
                    for pos in 2..=len + 1 {
                        if m.placement.fits(seq, pos, span.start, span.end, plen) {
                            pattern.insert(pos, m.clone());
                        }
                    }
                }
            }
        }
        out.push((pattern, chosen.to_vec()));
        out.len() < max_isoforms
    };

    let max_k = max_mods.min(sites.len());
    'outer: for k in 0..=max_k {
        if !choose_exact(&sites, 0, k, &mut current, &mut emit, &mut out) {
            break 'outer;
        }
    }
    out
}

/// Choose exactly `k` (position, modification) placements from `sites[ix..]`,
/// multiplying out positions that admit several candidates. Returns false
/// once the emitter declines more patterns.
fn choose_exact(
    sites: &[(usize, Vec<Arc<Modification>>)],
    ix: usize,
    k: usize,
    current: &mut Vec<(usize, Arc<Modification>)>,
    emit: &mut impl FnMut(
        &[(usize, Arc<Modification>)],
        &mut Vec<(ModPattern, Vec<(usize, Arc<Modification>)>)>,
    ) -> bool,
    out: &mut Vec<(ModPattern, Vec<(usize, Arc<Modification>)>)>,
) -> bool {
    if k == 0 {
        return emit(current, out);
    }
    if sites.len() - ix < k {
        return true;
    }
    // claim this site with each of its candidates
    for m in &sites[ix].1 {
        current.push((sites[ix].0, m.clone()));
        let keep_going = choose_exact(sites, ix + 1, k - 1, current, emit, out);
        current.pop();
        if !keep_going {
            return false;
        }
    }
    // or leave it open
    choose_exact(sites, ix + 1, k, current, emit, out)
}

/// Digestion product -> all modified peptide isoforms. Items whose mass
/// cannot be resolved are dropped rather than aborting the batch.
pub fn modified_peptides(
    protein: &Protein,
    span: PeptideSpan,
    fixed_mods: &[Arc<Modification>],
    variable_mods: &[Arc<Modification>],
    max_mods: usize,
    max_isoforms: usize,
) -> Vec<ModifiedPeptide> {
    modification_patterns(protein, span, fixed_mods, variable_mods, max_mods, max_isoforms)
        .into_iter()
        .filter_map(|(pattern, variable)| {
            ModifiedPeptide::new(protein, span, pattern, variable).ok()
        })
        .collect()
}
