use std::cmp::Ordering;
use std::sync::Arc;

use dashmap::DashSet;
use fnv::FnvBuildHasher;
use rayon::prelude::*;

use crate::combinatorics::modified_peptides;
use crate::compact::{CompactPeptide, FixedMods, MAX_MOD_SLOTS};
use crate::enzyme::DigestParameters;
use crate::modification::{Modification, ModificationCatalog};
use crate::peptide::FragmentKind;
use crate::protein::Protein;
use crate::Error;

/// Index keys are fragment masses rounded to 3 decimal places. The lossy
/// bucketing bounds index memory and is what makes the key array searchable;
/// query tolerances are applied on top of it.
const KEY_SCALE: f64 = 1000.0;

pub fn round_key(mass: f64) -> f64 {
    (mass * KEY_SCALE).round() / KEY_SCALE
}

/// Stable position of a peptide in [`FragmentIndex::peptides`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PeptideIx(pub u32);

// This is unsafe for use outside of this crate
impl Default for PeptideIx {
    fn default() -> Self {
        PeptideIx(u32::MAX)
    }
}

/// One deduplicated peptide entry: the compact encoding plus every protein
/// accession it was observed in
#[derive(Clone, Debug)]
pub struct IndexedPeptide {
    pub peptide: CompactPeptide,
    pub proteins: Vec<Arc<String>>,
}

#[derive(Copy, Clone, Debug)]
struct Theoretical {
    peptide_index: PeptideIx,
    fragment_mass: f64,
}

#[derive(Clone, Debug)]
pub struct IndexParameters {
    pub digest: DigestParameters,
    pub catalog: ModificationCatalog,
    pub fixed_mods: FixedMods,
    pub variable_mods: Vec<Arc<Modification>>,
    pub max_mods: usize,
    pub max_isoforms: usize,
    pub generate_decoys: bool,
    pub decoy_tag: String,
    pub fragment_kinds: Vec<FragmentKind>,
    pub peptide_min_mass: f64,
    pub peptide_max_mass: f64,
}

impl IndexParameters {
    pub fn new(
        digest: DigestParameters,
        catalog: ModificationCatalog,
        fixed_mods: FixedMods,
        variable_mods: Vec<Arc<Modification>>,
    ) -> Self {
        IndexParameters {
            digest,
            catalog,
            fixed_mods,
            variable_mods,
            max_mods: MAX_MOD_SLOTS,
            max_isoforms: 4096,
            generate_decoys: true,
            decoy_tag: "rev_".into(),
            fragment_kinds: vec![FragmentKind::B, FragmentKind::Y],
            peptide_min_mass: 150.0,
            peptide_max_mass: 5000.0,
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if self.max_mods > MAX_MOD_SLOTS {
            return Err(Error::InvalidParameter(
                "max_mods exceeds compact encoding slots",
            ));
        }
        if self.max_isoforms == 0 {
            return Err(Error::InvalidParameter("max_isoforms must be positive"));
        }
        if self.peptide_min_mass >= self.peptide_max_mass {
            return Err(Error::InvalidParameter("empty peptide mass window"));
        }
        if self.fragment_kinds.is_empty() {
            return Err(Error::InvalidParameter("no fragment kinds requested"));
        }
        Ok(())
    }

    /// Digest + modify every protein, encode, and deduplicate. Peptides are
    /// returned sorted by monoisotopic mass with protein lists merged, one
    /// entry per distinct (sequence, mod slots, terminus flags).
    pub fn enumerate_peptides(&self, proteins: &[Protein]) -> Result<Vec<IndexedPeptide>, Error> {
        self.validate()?;
        log::trace!("digesting {} proteins", proteins.len());

        let decoys = match self.generate_decoys {
            true => proteins
                .par_iter()
                .filter(|p| !p.decoy)
                .map(|p| p.reversed(&self.decoy_tag))
                .collect::<Vec<_>>(),
            false => Vec::new(),
        };

        // Target peptide sequences, used to drop decoy peptides that are
        // chemically identical to some target peptide
        let targets: DashSet<Vec<u8>, FnvBuildHasher> = DashSet::default();
        proteins
            .par_iter()
            .filter(|p| !p.decoy)
            .for_each(|protein| {
                for span in self.digest.digest(protein) {
                    targets.insert(span.sequence(protein).to_vec());
                }
            });

        log::trace!("modifying peptides");
        let mut entries = proteins
            .par_iter()
            .chain(decoys.par_iter())
            .flat_map_iter(|protein| {
                self.digest
                    .digest(protein)
                    .into_iter()
                    .flat_map(|span| {
                        modified_peptides(
                            protein,
                            span,
                            self.fixed_mods.as_slice(),
                            &self.variable_mods,
                            self.max_mods,
                            self.max_isoforms,
                        )
                    })
                    .filter(|peptide| {
                        peptide.monoisotopic >= self.peptide_min_mass
                            && peptide.monoisotopic <= self.peptide_max_mass
                    })
                    .filter(|peptide| !peptide.decoy || !targets.contains(&peptide.sequence))
                    .filter_map(|peptide| {
                        let accession = peptide.protein.clone();
                        match CompactPeptide::new(&peptide, &self.catalog) {
                            Ok(compact) => Some(IndexedPeptide {
                                peptide: compact,
                                proteins: vec![accession],
                            }),
                            Err(e) => {
                                log::warn!("skipping peptide from {}: {}", accession, e);
                                None
                            }
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        log::trace!("sorting and deduplicating {} peptides", entries.len());

        // Equivalent to a stable sort; targets order before decoys and
        // interior occurrences before protein-terminal ones, so the survivor
        // of a merged duplicate run is deterministic
        entries.par_sort_unstable_by(|a, b| {
            a.peptide
                .monoisotopic
                .total_cmp(&b.peptide.monoisotopic)
                .then_with(|| a.peptide.cmp(&b.peptide))
                .then_with(|| a.peptide.decoy.cmp(&b.peptide.decoy))
                .then_with(|| {
                    (a.peptide.protein_nterm, a.peptide.protein_cterm)
                        .cmp(&(b.peptide.protein_nterm, b.peptide.protein_cterm))
                })
        });
        entries.dedup_by(|remove, keep| {
            if remove.peptide == keep.peptide {
                keep.proteins.extend(remove.proteins.iter().cloned());
                true
            } else {
                false
            }
        });

        entries
            .par_iter_mut()
            .for_each(|entry| entry.proteins.sort_unstable());

        Ok(entries)
    }

    pub fn build(self, proteins: &[Protein]) -> Result<FragmentIndex, Error> {
        let peptides = self.enumerate_peptides(proteins)?;
        log::trace!("generating fragments for {} peptides", peptides.len());

        // All theoretical fragments are monoisotopic and uncharged; charge
        // states are handled at query time
        let mut fragments = peptides
            .par_iter()
            .enumerate()
            .flat_map_iter(|(idx, entry)| {
                let masses = entry
                    .peptide
                    .product_masses(&self.catalog, &self.fixed_mods, &self.fragment_kinds)
                    .unwrap_or_default();
                masses.into_iter().map(move |mass| Theoretical {
                    peptide_index: PeptideIx(idx as u32),
                    fragment_mass: round_key(mass),
                })
            })
            .collect::<Vec<_>>();

        log::trace!("finalizing index over {} fragments", fragments.len());
        fragments.par_sort_unstable_by(|a, b| {
            a.fragment_mass
                .total_cmp(&b.fragment_mass)
                .then_with(|| a.peptide_index.cmp(&b.peptide_index))
        });
        fragments.dedup_by(|a, b| {
            a.fragment_mass.total_cmp(&b.fragment_mass) == Ordering::Equal
                && a.peptide_index == b.peptide_index
        });

        // Materialize the rounded-key map: a sorted key array parallel to
        // per-key peptide lists
        let mut keys: Vec<f64> = Vec::new();
        let mut entries: Vec<Vec<PeptideIx>> = Vec::new();
        for fragment in fragments {
            match keys.last() {
                Some(last) if last.total_cmp(&fragment.fragment_mass) == Ordering::Equal => {
                    if let Some(bucket) = entries.last_mut() {
                        bucket.push(fragment.peptide_index);
                    }
                }
                _ => {
                    keys.push(fragment.fragment_mass);
                    entries.push(vec![fragment.peptide_index]);
                }
            }
        }

        Ok(FragmentIndex {
            peptides,
            keys,
            entries,
            catalog: self.catalog,
            fixed_mods: self.fixed_mods,
            fragment_kinds: self.fragment_kinds,
        })
    }
}

/// The built index: a deduplicated peptide list plus a sorted rounded
/// fragment-mass key array mapping to per-key peptide-index lists
pub struct FragmentIndex {
    pub peptides: Vec<IndexedPeptide>,
    pub keys: Vec<f64>,
    pub entries: Vec<Vec<PeptideIx>>,
    pub catalog: ModificationCatalog,
    pub fixed_mods: FixedMods,
    pub fragment_kinds: Vec<FragmentKind>,
}

impl FragmentIndex {
    pub fn len(&self) -> usize {
        self.peptides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peptides.is_empty()
    }

    /// Visit every peptide index bucketed under a key within `tolerance_da`
    /// of `mass`. Keys are walked outward from a binary-search seed in both
    /// directions; a small epsilon absorbs the rounding of the keys.
    pub fn peptides_within<F>(&self, mass: f64, tolerance_da: f64, mut visit: F)
    where
        F: FnMut(PeptideIx),
    {
        let tolerance = tolerance_da + 1e-9;
        let seed = match self.keys.binary_search_by(|key| key.total_cmp(&mass)) {
            Ok(ix) | Err(ix) => ix,
        };
        let mut down = seed;
        while down > 0 && mass - self.keys[down - 1] <= tolerance {
            down -= 1;
        }
        let mut up = seed;
        while up < self.keys.len() && self.keys[up] - mass <= tolerance {
            up += 1;
        }
        for bucket in &self.entries[down..up] {
            for &ix in bucket {
                visit(ix);
            }
        }
    }

    pub fn peptide(&self, ix: PeptideIx) -> &IndexedPeptide {
        &self.peptides[ix.0 as usize]
    }
}

/// Return the widest `left` and `right` indices into a `slice` (sorted by the
/// function `key`) such that all values between `low` and `high` are
/// contained in `slice[left..right]`
///
/// # Invariants
///
/// * `slice[left] <= low || left == 0`
/// * `slice[right] <= high && (slice[right+1] > high || right == slice.len())`
/// * `0 <= left <= right <= slice.len()`
#[inline]
pub fn binary_search_slice<T, F, S>(slice: &[T], key: F, low: S, high: S) -> (usize, usize)
where
    F: Fn(&T, &S) -> Ordering,
{
    let left_idx = match slice.binary_search_by(|a| key(a, &low)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx.saturating_sub(1);
            while idx > 0 && key(&slice[idx], &low) != Ordering::Less {
                idx -= 1;
            }
            idx
        }
    };

    let right_idx = match slice[left_idx..].binary_search_by(|a| key(a, &high)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx + left_idx;
            while idx < slice.len() && key(&slice[idx], &high) != Ordering::Greater {
                idx = idx.saturating_add(1);
            }
            idx.min(slice.len())
        }
    };
    (left_idx, right_idx)
}
