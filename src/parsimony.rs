use std::sync::Arc;

use fnv::{FnvHashMap, FnvHashSet};
use itertools::Itertools;
use serde::Serialize;

use crate::fdr::q_values;
use crate::scoring::Psm;

/// A set of proteins indistinguishable on the observed peptide evidence,
/// with the peptides supporting it and protein-level FDR fields
#[derive(Clone, Debug, Serialize)]
pub struct ProteinGroup {
    /// Sorted member accessions
    pub proteins: Vec<Arc<String>>,
    /// Sorted base sequences supporting the group
    pub peptides: Vec<String>,
    /// Subset of `peptides` whose candidate set was this group alone
    pub unique_peptides: Vec<String>,
    /// Sum over base sequences of the best supporting match score
    pub score: f64,
    pub decoy: bool,
    pub cumulative_target: u32,
    pub cumulative_decoy: u32,
    pub q_value: f64,
}

/// Greedy minimum-set-cover protein inference over FDR-filtered matches.
///
/// Each peptide (base sequence) maps to its candidate proteins, pooled over
/// every match that identified it; if any candidate is a decoy, the target
/// candidates are dropped. The cover repeatedly selects the protein
/// explaining the most still-uncovered peptides, breaking count ties by
/// lexicographic accession so the result is independent of map iteration
/// order. Every candidate protein whose peptide set is identical to a
/// selected protein's joins that group, so proteins indistinguishable on
/// the evidence are grouped rather than dropped. Groups are scored, ordered
/// best-first, and assigned group-level q-values with the same
/// monotonization as match-level FDR.
pub fn resolve(psms: &[Psm]) -> Vec<ProteinGroup> {
    // peptide base sequence -> (candidate proteins, best score, decoy)
    let mut candidates: FnvHashMap<String, FnvHashSet<Arc<String>>> = FnvHashMap::default();
    let mut peptide_decoy: FnvHashMap<String, bool> = FnvHashMap::default();
    let mut best_score: FnvHashMap<String, f64> = FnvHashMap::default();

    for psm in psms {
        let base = String::from_utf8_lossy(&psm.peptide.sequence).into_owned();
        let entry = candidates.entry(base.clone()).or_default();
        let known_decoy = peptide_decoy.entry(base.clone()).or_insert(false);
        if psm.decoy && !*known_decoy {
            // decoy evidence drops any target candidates gathered so far
            entry.clear();
            *known_decoy = true;
        }
        if psm.decoy == *known_decoy {
            entry.extend(psm.proteins.iter().cloned());
        }
        let score = best_score.entry(base).or_insert(f64::MIN);
        *score = score.max(psm.score);
    }

    // invert to protein -> peptides
    let mut coverage: FnvHashMap<Arc<String>, FnvHashSet<String>> = FnvHashMap::default();
    for (peptide, proteins) in &candidates {
        for protein in proteins {
            coverage
                .entry(protein.clone())
                .or_default()
                .insert(peptide.clone());
        }
    }

    let mut uncovered: FnvHashSet<String> = candidates.keys().cloned().collect();
    let mut remaining = coverage.clone();
    let mut selected: Vec<Arc<String>> = Vec::new();
    while !uncovered.is_empty() {
        let best = remaining
            .iter()
            .map(|(protein, peptides)| (peptides.len(), protein.clone()))
            .filter(|&(count, _)| count > 0)
            // most new peptides, then lexicographically first accession
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));
        let (_, protein) = match best {
            Some(best) => best,
            None => break,
        };
        let covered = match remaining.remove(&protein) {
            Some(covered) => covered,
            None => break,
        };
        for peptides in remaining.values_mut() {
            for peptide in &covered {
                peptides.remove(peptide);
            }
        }
        for peptide in &covered {
            uncovered.remove(peptide);
        }
        selected.push(protein);
    }

    // proteins indistinguishable on the evidence share a coverage set; any
    // candidate whose set matches a selected protein's joins that group,
    // selected or not (greedy picks only one of a tie)
    let selected_sets: FnvHashSet<Vec<String>> = selected
        .iter()
        .map(|protein| coverage[protein].iter().cloned().sorted().collect())
        .collect();
    let by_peptides = coverage
        .keys()
        .map(|protein| {
            let peptides: Vec<String> = coverage[protein].iter().cloned().sorted().collect();
            (peptides, protein.clone())
        })
        .filter(|(peptides, _)| selected_sets.contains(peptides))
        .into_group_map();

    let unique_candidates: FnvHashSet<&String> = candidates
        .iter()
        .filter(|(_, proteins)| proteins.len() == 1)
        .map(|(peptide, _)| peptide)
        .collect();
    let decoy_proteins: FnvHashSet<Arc<String>> = psms
        .iter()
        .filter(|psm| psm.decoy)
        .flat_map(|psm| psm.proteins.iter().cloned())
        .collect();

    let mut groups: Vec<ProteinGroup> = by_peptides
        .into_iter()
        .map(|(peptides, mut proteins)| {
            proteins.sort_unstable();
            let score = peptides
                .iter()
                .map(|p| best_score.get(p).copied().unwrap_or(0.0))
                .sum();
            let unique_peptides = peptides
                .iter()
                .filter(|p| unique_candidates.contains(p))
                .cloned()
                .collect();
            let decoy = proteins.iter().any(|p| decoy_proteins.contains(p));
            ProteinGroup {
                unique_peptides,
                score,
                decoy,
                proteins,
                peptides,
                cumulative_target: 0,
                cumulative_decoy: 0,
                q_value: 1.0,
            }
        })
        .collect();

    groups.sort_unstable_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.proteins.cmp(&b.proteins))
    });
    let decoys: Vec<bool> = groups.iter().map(|g| g.decoy).collect();
    let qs = q_values(&decoys);
    let mut targets = 0u32;
    let mut decoy_count = 0u32;
    for (group, q) in groups.iter_mut().zip(qs) {
        match group.decoy {
            true => decoy_count += 1,
            false => targets += 1,
        }
        group.cumulative_target = targets;
        group.cumulative_decoy = decoy_count;
        group.q_value = q;
    }
    groups
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compact::CompactPeptide;
    use crate::enzyme::PeptideSpan;
    use crate::modification::ModificationCatalog;
    use crate::peptide::{ModPattern, ModifiedPeptide};
    use crate::protein::Protein;

    fn psm(sequence: &str, proteins: &[&str], score: f64, decoy: bool) -> Psm {
        let catalog = ModificationCatalog::default();
        let mut protein = Protein::new(proteins[0], sequence).unwrap();
        protein.decoy = decoy;
        let span = PeptideSpan {
            start: 1,
            end: protein.len(),
            missed_cleavages: 0,
        };
        let peptide = ModifiedPeptide::new(&protein, span, ModPattern::default(), vec![]).unwrap();
        let peptide = CompactPeptide::new(&peptide, &catalog).unwrap();
        Psm {
            precursor_mass: peptide.monoisotopic,
            peptide,
            proteins: proteins.iter().map(|p| Arc::new(p.to_string())).collect(),
            scan_index: 0,
            scan_number: 1,
            score,
            decoy,
            localized_scores: None,
            cumulative_target: 0,
            cumulative_decoy: 0,
            q_value: 0.0,
        }
    }

    #[test]
    fn greedy_cover_is_sound_with_no_free_riders() {
        // P1 explains three peptides, P2 adds one unique, P3 is subsumed
        let psms = vec![
            psm("AAAK", &["P1", "P3"], 10.0, false),
            psm("CCCK", &["P1"], 9.0, false),
            psm("DDDK", &["P1", "P2"], 8.0, false),
            psm("EEEK", &["P2", "P3"], 7.0, false),
        ];
        let groups = resolve(&psms);

        // soundness: every peptide covered
        let covered: FnvHashSet<&String> =
            groups.iter().flat_map(|g| g.peptides.iter()).collect();
        for peptide in ["AAAK", "CCCK", "DDDK", "EEEK"] {
            assert!(covered.contains(&peptide.to_string()));
        }

        // P3 contributes nothing once P1 and P2 are chosen
        let members: Vec<&str> = groups
            .iter()
            .flat_map(|g| g.proteins.iter().map(|p| p.as_str()))
            .collect();
        assert!(members.contains(&"P1"));
        assert!(members.contains(&"P2"));
        assert!(!members.contains(&"P3"));

        // no free riders: dropping any group uncovers something
        for skip in 0..groups.len() {
            let covered: FnvHashSet<&String> = groups
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != skip)
                .flat_map(|(_, g)| g.peptides.iter())
                .collect();
            assert!(covered.len() < 4);
        }

        // CCCK is unique evidence for P1
        let p1 = groups
            .iter()
            .find(|g| g.proteins.iter().any(|p| p.as_str() == "P1"))
            .unwrap();
        assert_eq!(p1.unique_peptides, vec!["CCCK".to_string()]);
    }

    #[test]
    fn indistinguishable_proteins_form_one_group() {
        // Alpha and Zeta cover both peptides; greedy picks only one of the
        // tie, but the other must join its group rather than vanish. Beta
        // covers a strict subset and stays out.
        let psms = vec![
            psm("AAAK", &["Zeta", "Alpha", "Beta"], 5.0, false),
            psm("CCCK", &["Zeta", "Alpha"], 5.0, false),
        ];
        let groups = resolve(&psms);
        assert_eq!(groups.len(), 1);
        let members: Vec<&str> = groups[0].proteins.iter().map(|p| p.as_str()).collect();
        assert_eq!(members, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn decoy_candidates_drop_targets() {
        let psms = vec![
            psm("AAAK", &["P1"], 5.0, false),
            psm("AAAK", &["rev_P9"], 4.0, true),
            psm("CCCK", &["P1"], 3.0, false),
        ];
        let groups = resolve(&psms);
        // AAAK's target candidate is discarded; P1 survives on CCCK alone
        let with_aaak = groups
            .iter()
            .find(|g| g.peptides.contains(&"AAAK".to_string()))
            .unwrap();
        assert!(with_aaak.decoy);
        assert_eq!(with_aaak.proteins[0].as_str(), "rev_P9");

        let p1 = groups
            .iter()
            .find(|g| g.proteins.iter().any(|p| p.as_str() == "P1"))
            .unwrap();
        assert_eq!(p1.peptides, vec!["CCCK".to_string()]);
    }

    #[test]
    fn group_level_q_values_are_monotone() {
        let psms = vec![
            psm("AAAK", &["P1"], 10.0, false),
            psm("CCCK", &["P2"], 8.0, false),
            psm("DDDK", &["rev_P3"], 6.0, true),
            psm("EEEK", &["P4"], 4.0, false),
        ];
        let groups = resolve(&psms);
        assert_eq!(groups.len(), 4);
        assert!(groups.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(groups.windows(2).all(|w| w[0].q_value <= w[1].q_value));
        assert_eq!(groups.last().unwrap().cumulative_target, 3);
    }
}
