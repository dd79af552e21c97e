use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::mass::H2O;
use crate::modification::{ModificationCatalog, NO_MOD};
use crate::peptide::{sorted_product_masses, FragmentKind, ModifiedPeptide, ModPattern};
use crate::Error;

/// Maximum variable/localized modifications a compact encoding can record.
/// Matches the default per-peptide modification cap.
pub const MAX_MOD_SLOTS: usize = 3;

/// Fixed-form fingerprint of a modified peptide: base sequence bytes plus up
/// to [`MAX_MOD_SLOTS`] (catalog code, two-based position) slots for the
/// variable/localized placements. Fixed modifications are not recorded, since
/// they are a pure function of the sequence, the terminus flags, and the
/// run's fixed-mod list; they are re-overlaid on demand.
///
/// Equality and hashing cover the sequence and the occupied slots (identity
/// and position both). The terminus flags, the cached monoisotopic mass, and
/// the decoy flag are deliberately excluded: the same peptide found at a
/// different locus, or in a target and its decoy, compares equal.
#[derive(Clone, Debug)]
pub struct CompactPeptide {
    pub sequence: Box<[u8]>,
    mods: [(u16, u8); MAX_MOD_SLOTS],
    n_mods: u8,
    /// Peptide touches the protein N-terminus (directly or behind a cleaved
    /// initiator Met) / C-terminus. Not part of the identity; they determine
    /// which protein-terminal fixed mods re-apply.
    pub protein_nterm: bool,
    pub protein_cterm: bool,
    pub decoy: bool,
    pub monoisotopic: f64,
}

impl CompactPeptide {
    pub fn new(peptide: &ModifiedPeptide, catalog: &ModificationCatalog) -> Result<Self, Error> {
        if peptide.variable.len() > MAX_MOD_SLOTS {
            return Err(Error::InvalidParameter(
                "too many variable modifications for compact encoding",
            ));
        }
        if peptide.len() > u8::MAX as usize - 2 {
            return Err(Error::InvalidParameter(
                "peptide too long for compact encoding",
            ));
        }
        let mut mods = [(NO_MOD, 0u8); MAX_MOD_SLOTS];
        for (slot, (pos, m)) in peptide.variable.iter().enumerate() {
            let code = catalog
                .code(m)
                .ok_or_else(|| Error::InvalidModification(m.id.clone()))?;
            mods[slot] = (code, *pos as u8);
        }
        Ok(CompactPeptide {
            sequence: peptide.sequence.clone().into_boxed_slice(),
            mods,
            n_mods: peptide.variable.len() as u8,
            protein_nterm: peptide.protein_nterm,
            protein_cterm: peptide.protein_cterm,
            decoy: peptide.decoy,
            monoisotopic: peptide.monoisotopic,
        })
    }

    /// Occupied modification slots, position-ordered
    pub fn mods(&self) -> &[(u16, u8)] {
        &self.mods[..self.n_mods as usize]
    }

    pub fn variable_mods(&self) -> u8 {
        self.n_mods
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Rebuild the full modification pattern: recorded slots plus the fixed
    /// overlay at unclaimed positions. The positional fit-check runs against
    /// a synthetic protein context reconstructed from the terminus flags.
    fn pattern(&self, catalog: &ModificationCatalog, fixed_mods: &FixedMods) -> Result<ModPattern, Error> {
        let len = self.sequence.len();
        let mut pattern = ModPattern::default();
        for &(code, pos) in self.mods() {
            let m = catalog
                .get(code)
                .ok_or(Error::InvalidParameter("unknown modification code"))?;
            pattern.insert(pos as usize, m.clone());
        }
        let (start, end, plen) = self.synthetic_context();
        for m in fixed_mods.iter() {
            match m.placement.anchor(len) {
                Some(pos) => {
                    if m.placement.fits(&self.sequence, pos, start, end, plen) {
                        pattern.insert(pos, m.clone());
                    }
                }
                None => {
                    for pos in 2..=len + 1 {
                        if m.placement.fits(&self.sequence, pos, start, end, plen) {
                            pattern.insert(pos, m.clone());
                        }
                    }
                }
            }
        }
        Ok(pattern)
    }

    /// (start, end, protein_len) consistent with the terminus flags: a
    /// non-N-terminal peptide starts at 3 (past the Met-cleavage window), a
    /// non-C-terminal peptide leaves one residue after its end
    fn synthetic_context(&self) -> (usize, usize, usize) {
        let len = self.sequence.len();
        let start = if self.protein_nterm { 1 } else { 3 };
        let end = start + len - 1;
        let plen = if self.protein_cterm { end } else { end + 1 };
        (start, end, plen)
    }

    /// Recomputed monoisotopic mass including the fixed overlay
    pub fn mass_with_fixed(
        &self,
        catalog: &ModificationCatalog,
        fixed_mods: &FixedMods,
    ) -> Result<f64, Error> {
        use crate::mass::Mass;
        let pattern = self.pattern(catalog, fixed_mods)?;
        Ok(H2O
            + self.sequence.iter().map(Mass::monoisotopic).sum::<f64>()
            + pattern.total_mass())
    }

    /// Sorted, uncharged product masses for the requested fragment families
    pub fn product_masses(
        &self,
        catalog: &ModificationCatalog,
        fixed_mods: &FixedMods,
        kinds: &[FragmentKind],
    ) -> Result<Vec<f64>, Error> {
        let pattern = self.pattern(catalog, fixed_mods)?;
        sorted_product_masses(&self.sequence, |pos| pattern.mass_at(pos), kinds)
    }

    /// Product masses with an extra mass delta pinned to one two-based
    /// position, used for residue-level localization scoring
    pub fn product_masses_with_shift(
        &self,
        catalog: &ModificationCatalog,
        fixed_mods: &FixedMods,
        kinds: &[FragmentKind],
        shift_pos: usize,
        shift: f64,
    ) -> Result<Vec<f64>, Error> {
        let pattern = self.pattern(catalog, fixed_mods)?;
        sorted_product_masses(
            &self.sequence,
            |pos| {
                let extra = if pos == shift_pos { shift } else { 0.0 };
                pattern.mass_at(pos) + extra
            },
            kinds,
        )
    }

    /// Human-readable modified sequence, resolving slot codes through the
    /// catalog. Unknown codes render as `[?]`.
    pub fn modified_sequence(&self, catalog: &ModificationCatalog) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(self.sequence.len());
        let write_mod = |out: &mut String, code: u16| match catalog.get(code) {
            Some(m) if m.monoisotopic.is_sign_positive() => {
                let _ = write!(out, "[+{}]", m.monoisotopic);
            }
            Some(m) => {
                let _ = write!(out, "[{}]", m.monoisotopic);
            }
            None => out.push_str("[?]"),
        };
        if let Some(&(code, _)) = self.mods().iter().find(|(_, pos)| *pos == 1) {
            write_mod(&mut out, code);
            out.push('-');
        }
        let len = self.sequence.len();
        for (i, c) in self.sequence.iter().enumerate() {
            out.push(*c as char);
            if let Some(&(code, _)) = self.mods().iter().find(|(_, pos)| *pos as usize == i + 2) {
                write_mod(&mut out, code);
            }
        }
        if let Some(&(code, _)) = self.mods().iter().find(|(_, pos)| *pos as usize == len + 2) {
            out.push('-');
            write_mod(&mut out, code);
        }
        out
    }

    fn identity(&self) -> (&[u8], &[(u16, u8)]) {
        (&self.sequence, self.mods())
    }
}

impl serde::Serialize for CompactPeptide {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("CompactPeptide", 6)?;
        s.serialize_field("sequence", &String::from_utf8_lossy(&self.sequence))?;
        s.serialize_field("mods", &self.mods())?;
        s.serialize_field("protein_nterm", &self.protein_nterm)?;
        s.serialize_field("protein_cterm", &self.protein_cterm)?;
        s.serialize_field("decoy", &self.decoy)?;
        s.serialize_field("monoisotopic", &self.monoisotopic)?;
        s.end()
    }
}

impl PartialEq for CompactPeptide {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for CompactPeptide {}

impl Hash for CompactPeptide {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state)
    }
}

impl PartialOrd for CompactPeptide {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lexicographic total order on the identity tuple, used as the final
/// deterministic fallback when ranking otherwise-equal matches
impl Ord for CompactPeptide {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

/// The run-wide fixed modification list. Uniform across every peptide of a
/// search, which is what lets the compact encoding omit fixed placements.
#[derive(Clone, Debug, Default)]
pub struct FixedMods(Vec<std::sync::Arc<crate::modification::Modification>>);

impl FixedMods {
    pub fn new(mods: Vec<std::sync::Arc<crate::modification::Modification>>) -> Self {
        FixedMods(mods)
    }

    pub fn iter(&self) -> impl Iterator<Item = &std::sync::Arc<crate::modification::Modification>> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[std::sync::Arc<crate::modification::Modification>] {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::enzyme::PeptideSpan;
    use crate::modification::{Modification, Placement};
    use crate::protein::Protein;
    use std::collections::hash_map::DefaultHasher;
    use std::sync::Arc;

    fn hash_of(c: &CompactPeptide) -> u64 {
        let mut h = DefaultHasher::new();
        c.hash(&mut h);
        h.finish()
    }

    fn build(
        protein: &Protein,
        variable: Vec<(usize, Arc<Modification>)>,
        catalog: &ModificationCatalog,
    ) -> CompactPeptide {
        let span = PeptideSpan {
            start: 1,
            end: protein.len(),
            missed_cleavages: 0,
        };
        let mut pattern = ModPattern::default();
        for (pos, m) in &variable {
            pattern.insert(*pos, m.clone());
        }
        let peptide = ModifiedPeptide::new(protein, span, pattern, variable).unwrap();
        CompactPeptide::new(&peptide, catalog).unwrap()
    }

    #[test]
    fn equality_and_hashing() {
        let mut catalog = ModificationCatalog::default();
        let phospho = catalog
            .register(Modification::new("phospho", Placement::Residue(b'T'), 79.96633).unwrap())
            .unwrap();

        let a = Protein::new("P1", "PEPTIDTK").unwrap();
        let b = Protein::new("P2", "PEPTIDTK").unwrap();

        // same sequence, same pattern, different parent proteins
        let x = build(&a, vec![(5, phospho.clone())], &catalog);
        let y = build(&b, vec![(5, phospho.clone())], &catalog);
        assert_eq!(x, y);
        assert_eq!(hash_of(&x), hash_of(&y));

        // moving the mod to the other T changes identity
        let z = build(&a, vec![(8, phospho.clone())], &catalog);
        assert_ne!(x, z);
        assert_ne!(hash_of(&x), hash_of(&z));

        // decoy flag is not part of identity
        let decoy = a.reversed("rev_");
        let span = PeptideSpan {
            start: 1,
            end: decoy.len(),
            missed_cleavages: 0,
        };
        let peptide =
            ModifiedPeptide::new(&decoy, span, ModPattern::default(), vec![]).unwrap();
        let d = CompactPeptide::new(&peptide, &catalog).unwrap();
        let t = build(&Protein::new("P3", "KTDITPEP").unwrap(), vec![], &catalog);
        assert_eq!(d, t);
        assert!(d.decoy && !t.decoy);
    }

    #[test]
    fn terminus_flags_are_not_part_of_identity() {
        let catalog = ModificationCatalog::default();
        let encode = |sequence: &str, start: usize, end: usize| {
            let protein = Protein::new("P1", sequence).unwrap();
            let span = PeptideSpan {
                start,
                end,
                missed_cleavages: 0,
            };
            let peptide =
                ModifiedPeptide::new(&protein, span, ModPattern::default(), vec![]).unwrap();
            CompactPeptide::new(&peptide, &catalog).unwrap()
        };

        // LLNGR mid-protein vs at the protein C-terminus
        let interior = encode("KLLNGRA", 2, 6);
        let terminal = encode("KLLNGR", 2, 6);
        assert!(!interior.protein_cterm && terminal.protein_cterm);
        assert_eq!(interior, terminal);
        assert_eq!(hash_of(&interior), hash_of(&terminal));
        assert_eq!(interior.cmp(&terminal), std::cmp::Ordering::Equal);
    }

    #[test]
    fn slot_overflow_is_rejected() {
        let mut catalog = ModificationCatalog::default();
        let ox = catalog
            .register(Modification::new("oxidation", Placement::Residue(b'M'), 15.99491).unwrap())
            .unwrap();
        let protein = Protein::new("P1", "MMMMMM").unwrap();
        let span = PeptideSpan {
            start: 1,
            end: 6,
            missed_cleavages: 0,
        };
        let variable: Vec<_> = (2..=5).map(|pos| (pos, ox.clone())).collect();
        let mut pattern = ModPattern::default();
        for (pos, m) in &variable {
            pattern.insert(*pos, m.clone());
        }
        let peptide = ModifiedPeptide::new(&protein, span, pattern, variable).unwrap();
        assert!(CompactPeptide::new(&peptide, &catalog).is_err());
    }

    #[test]
    fn fixed_overlay_restores_full_mass() {
        let mut catalog = ModificationCatalog::default();
        let cam = catalog
            .register(
                Modification::new("carbamidomethyl", Placement::Residue(b'C'), 57.02146).unwrap(),
            )
            .unwrap();
        let fixed = FixedMods::new(vec![cam.clone()]);

        let protein = Protein::new("P1", "ACDCEK").unwrap();
        let span = PeptideSpan {
            start: 1,
            end: 6,
            missed_cleavages: 0,
        };
        // build with the fixed overlay applied, as combinatorics would
        let peptides =
            crate::combinatorics::modified_peptides(&protein, span, fixed.as_slice(), &[], 3, 4096);
        assert_eq!(peptides.len(), 1);
        let full_mass = peptides[0].monoisotopic;
        let compact = CompactPeptide::new(&peptides[0], &catalog).unwrap();

        // the compact form records no slots, yet the fixed overlay recovers
        // both C placements
        assert!(compact.mods().is_empty());
        let recovered = compact.mass_with_fixed(&catalog, &fixed).unwrap();
        assert!((recovered - full_mass).abs() < 1e-9);

        let plain = compact.product_masses(&catalog, &FixedMods::default(), &[FragmentKind::Y]);
        let with_fixed = compact.product_masses(&catalog, &fixed, &[FragmentKind::Y]);
        assert_ne!(plain.unwrap(), with_fixed.unwrap());
    }

    #[test]
    fn shifted_product_masses_move_one_terminus() {
        let catalog = ModificationCatalog::default();
        let fixed = FixedMods::default();
        let protein = Protein::new("P1", "PEPTIDEK").unwrap();
        let compact = build(&protein, vec![], &catalog);

        let base = compact
            .product_masses(&catalog, &fixed, &[FragmentKind::Y])
            .unwrap();
        // shift pinned on the final residue: every y ion moves
        let shifted = compact
            .product_masses_with_shift(&catalog, &fixed, &[FragmentKind::Y], 9, 10.0)
            .unwrap();
        for (a, b) in base.iter().zip(&shifted) {
            assert!((b - a - 10.0).abs() < 1e-9);
        }
        // shift pinned on the first residue: y ions are untouched
        let shifted = compact
            .product_masses_with_shift(&catalog, &fixed, &[FragmentKind::Y], 2, 10.0)
            .unwrap();
        assert_eq!(base, shifted);
    }

    #[test]
    fn modified_sequence_rendering() {
        let mut catalog = ModificationCatalog::default();
        let phospho = catalog
            .register(Modification::new("phospho", Placement::Residue(b'T'), 79.96633).unwrap())
            .unwrap();
        let protein = Protein::new("P1", "PEPTIDEK").unwrap();
        let compact = build(&protein, vec![(5, phospho)], &catalog);
        assert_eq!(compact.modified_sequence(&catalog), "PEPT[+79.96633]IDEK");
    }
}
