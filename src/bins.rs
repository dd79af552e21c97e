use fnv::FnvHashMap;
use serde::Serialize;

use crate::mass::Mass;
use crate::modification::ModificationCatalog;
use crate::scoring::Psm;

/// Default clustering radius over precursor mass shifts, in Daltons
pub const DEFAULT_BIN_RADIUS: f64 = 0.003;

/// A candidate bin center must have at least this many other shifts inside
/// its radius
const MIN_ADDITIONAL_IN_BIN: usize = 1;

const STANDARD_AA: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";

/// Explicit configuration for bin analysis: the reference tables that the
/// annotation passes consult. Constructed once by the caller and passed in,
/// never global.
#[derive(Clone, Debug)]
pub struct BinConfig {
    pub radius: f64,
    /// Known modification database: (identifier, monoisotopic shift)
    pub known_mods: Vec<(String, f64)>,
    /// Curated explanations for frequently observed shifts
    pub curated: Vec<(f64, &'static str)>,
}

impl Default for BinConfig {
    fn default() -> Self {
        BinConfig {
            radius: DEFAULT_BIN_RADIUS,
            known_mods: Vec::new(),
            curated: vec![
                (0.0, "exact match"),
                (-48.128629, "phosphorylation minus lysine: reverse likely the correct match"),
                (-76.134779, "phosphorylation minus arginine: reverse likely the correct match"),
                (1.003, "one isotope error"),
                (2.005, "two isotope errors"),
                (3.008, "three isotope errors"),
                (173.051055, "acetylation plus methionine: usually protein N-terminus"),
                (-91.009185, "negative carbamidomethylation minus H2S: usually cysteine"),
                (-32.008456, "oxidation then loss of oxidized M side chain"),
                (-79.966331, "negative phosphorylation"),
                (189.045969, "carboxymethylation plus methionine: usually protein N-terminus"),
                (356.20596, "lysine+V+E or lysine+L+D"),
                (239.126988, "lysine + H(5) C(5) N O(2), possibly nmethylmaleimide"),
            ],
        }
    }
}

/// One cluster of precursor mass shifts with its annotation fields. Member
/// indices point into the PSM slice the bins were generated from.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MassShiftBin {
    /// Average shift of the points inside the radius of the accepted center
    pub mass_shift: f64,
    pub members: Vec<usize>,
    pub count_target: usize,
    pub count_decoy: usize,
    /// Best-scoring member per distinct modified sequence
    pub unique_members: Vec<usize>,
    pub mods_in_common: Vec<(String, usize)>,
    pub aas_in_common: Vec<(char, usize)>,
    /// Residue-level localization evidence, with terminal counts
    pub residue_count: Vec<(char, usize)>,
    pub nterm_loc_count: usize,
    pub cterm_loc_count: usize,
    pub known_mods: Vec<String>,
    pub aa_explanations: Vec<String>,
    pub combos: Vec<String>,
    pub curated: Option<&'static str>,
    pub median_target_length: f64,
}

impl MassShiftBin {
    pub fn count(&self) -> usize {
        self.members.len()
    }
}

/// Cluster the (precursor - peptide) mass shifts of FDR-filtered matches
/// with 1-D density-peak clustering and annotate the surviving bins.
///
/// Density `p[i]` is the number of other shifts within the radius (sliding
/// two-pointer window, O(n)); `sigma[i]` is the distance to the nearest
/// shift with strictly higher density. Candidate centers need
/// `sigma >= radius`, are taken in descending density, and are suppressed
/// within the radius of an already-accepted center. Bins keeping one member
/// or fewer are dropped. Single-threaded and deterministic.
pub fn generate_bins(
    psms: &[Psm],
    catalog: &ModificationCatalog,
    config: &BinConfig,
) -> Vec<MassShiftBin> {
    let mut shifts: Vec<(f64, usize)> = psms
        .iter()
        .enumerate()
        .map(|(ix, psm)| (psm.precursor_mass - psm.peptide.monoisotopic, ix))
        .collect();
    if shifts.is_empty() {
        return Vec::new();
    }
    shifts.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
    let n = shifts.len();
    let min_shift = shifts[0].0;
    let max_shift = shifts[n - 1].0;

    let mut p = vec![0usize; n];
    let mut first = 0;
    let mut last = 0;
    for i in 0..n {
        let shift = shifts[i].0;
        while shift - shifts[first].0 > config.radius {
            first += 1;
        }
        while last + 1 < n && shifts[last + 1].0 - shift <= config.radius {
            last += 1;
        }
        p[i] = last - first;
    }

    let max_p = match p.iter().max() {
        Some(&max) => max,
        None => return Vec::new(),
    };
    let sigma: Vec<f64> = (0..n)
        .map(|i| match p[i] == max_p {
            true => (max_shift - shifts[i].0).max(shifts[i].0 - min_shift),
            false => nearest_higher_density(i, &shifts, &p),
        })
        .collect();

    // candidates in descending density; shift order breaks density ties
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_unstable_by(|&a, &b| p[b].cmp(&p[a]).then_with(|| shifts[a].0.total_cmp(&shifts[b].0)));

    let mut centers: Vec<f64> = Vec::new();
    for i in order {
        if sigma[i] < config.radius || p[i] < MIN_ADDITIONAL_IN_BIN {
            continue;
        }
        if centers
            .iter()
            .all(|c| (shifts[i].0 - c).abs() > config.radius)
        {
            centers.push(shifts[i].0);
        }
    }

    let mut bins: Vec<MassShiftBin> = centers
        .into_iter()
        .map(|center| {
            let near: Vec<f64> = shifts
                .iter()
                .map(|&(shift, _)| shift)
                .filter(|shift| (shift - center).abs() <= config.radius)
                .collect();
            MassShiftBin {
                mass_shift: near.iter().sum::<f64>() / near.len() as f64,
                ..MassShiftBin::default()
            }
        })
        .collect();

    for &(shift, psm_ix) in &shifts {
        for bin in bins.iter_mut() {
            if (shift - bin.mass_shift).abs() <= config.radius {
                bin.members.push(psm_ix);
                match psms[psm_ix].decoy {
                    true => bin.count_decoy += 1,
                    false => bin.count_target += 1,
                }
            }
        }
    }
    bins.retain(|bin| bin.count() > 1);
    bins.sort_unstable_by(|a, b| a.mass_shift.total_cmp(&b.mass_shift));

    for bin in bins.iter_mut() {
        collect_unique_members(bin, psms, catalog);
    }
    annotate_known_mods(&mut bins, config);
    annotate_amino_acids(&mut bins, config.radius);
    annotate_combos(&mut bins, config.radius);
    for bin in bins.iter_mut() {
        annotate_residues(bin, psms);
        annotate_mods_in_common(bin, psms, catalog);
        annotate_aas_in_common(bin, psms);
        annotate_median_length(bin, psms);
        bin.curated = config
            .curated
            .iter()
            .find(|(shift, _)| (shift - bin.mass_shift).abs() <= config.radius)
            .map(|&(_, label)| label);
    }
    bins
}

/// Distance from point `i` to the nearest shift with a strictly higher
/// density, searched outward in both directions at once
fn nearest_higher_density(i: usize, shifts: &[(f64, usize)], p: &[usize]) -> f64 {
    let shift = shifts[i].0;
    let mut down = i.checked_sub(1);
    let mut up = i + 1;
    loop {
        let dist_down = down.map_or(f64::MAX, |d| shift - shifts[d].0);
        let dist_up = match shifts.get(up) {
            Some(&(s, _)) => s - shift,
            None => f64::MAX,
        };
        if dist_down < dist_up {
            let d = match down {
                Some(d) => d,
                None => return f64::MAX,
            };
            if p[d] > p[i] {
                return dist_down;
            }
            down = d.checked_sub(1);
        } else {
            if up >= shifts.len() && down.is_none() {
                return f64::MAX;
            }
            if up < shifts.len() {
                if p[up] > p[i] {
                    return dist_up;
                }
                up += 1;
            } else {
                // only the down side remains
                let d = match down {
                    Some(d) => d,
                    None => return f64::MAX,
                };
                if p[d] > p[i] {
                    return dist_down;
                }
                down = d.checked_sub(1);
            }
        }
    }
}

fn collect_unique_members(bin: &mut MassShiftBin, psms: &[Psm], catalog: &ModificationCatalog) {
    let mut best: FnvHashMap<String, usize> = FnvHashMap::default();
    for &ix in &bin.members {
        let key = psms[ix].peptide.modified_sequence(catalog);
        match best.get(&key) {
            Some(&held) if psms[held].score >= psms[ix].score => {}
            _ => {
                best.insert(key, ix);
            }
        }
    }
    bin.unique_members = best.into_values().collect();
    bin.unique_members.sort_unstable();
}

fn annotate_known_mods(bins: &mut [MassShiftBin], config: &BinConfig) {
    for bin in bins.iter_mut() {
        bin.known_mods = config
            .known_mods
            .iter()
            .filter(|(_, mass)| (mass - bin.mass_shift).abs() <= config.radius)
            .map(|(id, _)| id.clone())
            .collect();
    }
}

/// Explain shifts as gained or lost residues, singly or in pairs
fn annotate_amino_acids(bins: &mut [MassShiftBin], radius: f64) {
    for bin in bins.iter_mut() {
        let mut out = Vec::new();
        for &a in STANDARD_AA {
            let mass = a.monoisotopic();
            if (mass - bin.mass_shift).abs() <= radius {
                out.push(format!("add {}", a as char));
            }
            if (mass + bin.mass_shift).abs() <= radius {
                out.push(format!("remove {}", a as char));
            }
            for &b in STANDARD_AA {
                let pair = mass + b.monoisotopic();
                if (pair - bin.mass_shift).abs() <= radius {
                    out.push(format!("add ({}+{})", a as char, b as char));
                }
                if (pair + bin.mass_shift).abs() <= radius {
                    out.push(format!("remove ({}+{})", a as char, b as char));
                }
            }
        }
        out.dedup();
        bin.aa_explanations = out;
    }
}

/// Flag bins whose shift is the sum of two other well-populated bins
fn annotate_combos(bins: &mut [MassShiftBin], radius: f64) {
    let total_targets: usize = bins.iter().map(|b| b.count_target).sum();
    let mut pairs: Vec<(f64, f64, usize)> = Vec::new();
    for a in bins.iter().filter(|b| b.mass_shift.abs() > radius) {
        for b in bins.iter().filter(|b| b.mass_shift.abs() > radius) {
            if a.count_target * b.count_target >= total_targets {
                pairs.push((a.mass_shift, b.mass_shift, a.count_target.min(b.count_target)));
            }
        }
    }
    for bin in bins.iter_mut() {
        let mut out = Vec::new();
        for &(s1, s2, support) in &pairs {
            if (s1 + s2 - bin.mass_shift).abs() <= radius && bin.count_target < support {
                out.push(format!("combo {:.3} and {:.3}", s1.min(s2), s1.max(s2)));
            }
        }
        out.sort_unstable();
        out.dedup();
        bin.combos = out;
    }
}

/// Count the residues whose localization score explains the shift, for
/// target members where localization improved on the raw score by at least
/// one matched ion
fn annotate_residues(bin: &mut MassShiftBin, psms: &[Psm]) {
    let mut counts: FnvHashMap<char, usize> = FnvHashMap::default();
    for &ix in &bin.unique_members {
        let psm = &psms[ix];
        let localized = match &psm.localized_scores {
            Some(scores) if !scores.is_empty() => scores,
            _ => continue,
        };
        let best = localized.iter().fold(f64::MIN, |acc, &s| acc.max(s));
        if psm.decoy || best < psm.score + 1.0 {
            continue;
        }
        for (i, &score) in localized.iter().enumerate() {
            if best - score < 0.5 {
                *counts.entry(psm.peptide.sequence[i] as char).or_default() += 1;
            }
        }
        if best - localized[0] < 0.5 {
            bin.nterm_loc_count += 1;
        }
        if best - localized[localized.len() - 1] < 0.5 {
            bin.cterm_loc_count += 1;
        }
    }
    bin.residue_count = sorted_counts(counts);
}

/// Count the bracketed modification labels shared by the bin's unique
/// target members
fn annotate_mods_in_common(bin: &mut MassShiftBin, psms: &[Psm], catalog: &ModificationCatalog) {
    let mut counts: FnvHashMap<String, usize> = FnvHashMap::default();
    for &ix in &bin.unique_members {
        if psms[ix].decoy {
            continue;
        }
        let rendered = psms[ix].peptide.modified_sequence(catalog);
        let mut current = String::new();
        let mut depth = 0usize;
        for ch in rendered.chars() {
            match ch {
                '[' => depth += 1,
                ']' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        *counts.entry(std::mem::take(&mut current)).or_default() += 1;
                    }
                }
                _ if depth > 0 => current.push(ch),
                _ => {}
            }
        }
    }
    bin.mods_in_common = sorted_counts(counts);
}

fn annotate_aas_in_common(bin: &mut MassShiftBin, psms: &[Psm]) {
    let mut counts: FnvHashMap<char, usize> = FnvHashMap::default();
    for &ix in &bin.unique_members {
        if psms[ix].decoy {
            continue;
        }
        let mut seen: Vec<u8> = psms[ix].peptide.sequence.to_vec();
        seen.sort_unstable();
        seen.dedup();
        for c in seen {
            *counts.entry(c as char).or_default() += 1;
        }
    }
    bin.aas_in_common = sorted_counts(counts);
}

fn annotate_median_length(bin: &mut MassShiftBin, psms: &[Psm]) {
    let mut lengths: Vec<f64> = bin
        .unique_members
        .iter()
        .filter(|&&ix| !psms[ix].decoy)
        .map(|&ix| psms[ix].peptide.len() as f64)
        .collect();
    if lengths.is_empty() {
        return;
    }
    lengths.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = lengths.len() / 2;
    bin.median_target_length = match lengths.len() % 2 {
        0 => (lengths[mid - 1] + lengths[mid]) / 2.0,
        _ => lengths[mid],
    };
}

fn sorted_counts<K: Ord>(counts: FnvHashMap<K, usize>) -> Vec<(K, usize)> {
    let mut out: Vec<(K, usize)> = counts.into_iter().collect();
    out.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}
