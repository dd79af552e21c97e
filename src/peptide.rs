use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::enzyme::PeptideSpan;
use crate::mass::{Mass, H2O};
use crate::modification::Modification;
use crate::protein::Protein;
use crate::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    A,
    B,
    C,
    X,
    Y,
    Z,
}

/// A modification pattern over a peptide, keyed by two-based position:
/// key 1 is the peptide N-terminus, keys `2..=len + 1` are residues, key
/// `len + 2` is the C-terminus. The map keeps positions unique and ordered,
/// so iteration order is canonical.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModPattern {
    mods: BTreeMap<usize, Arc<Modification>>,
}

impl ModPattern {
    /// Claim a position. Returns false (and leaves the pattern untouched)
    /// if the position is already taken.
    pub fn insert(&mut self, pos: usize, m: Arc<Modification>) -> bool {
        if self.mods.contains_key(&pos) {
            return false;
        }
        self.mods.insert(pos, m);
        true
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.mods.contains_key(&pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Arc<Modification>)> {
        self.mods.iter().map(|(&pos, m)| (pos, m))
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    pub fn mass_at(&self, pos: usize) -> f64 {
        self.mods.get(&pos).map(|m| m.monoisotopic).unwrap_or(0.0)
    }

    pub fn total_mass(&self) -> f64 {
        self.mods.values().map(|m| m.monoisotopic).sum()
    }
}

/// A peptide interval with an assigned modification pattern. All derived
/// values (owned sequence, monoisotopic mass) are computed at construction;
/// the type is immutable afterwards.
#[derive(Clone, Debug)]
pub struct ModifiedPeptide {
    pub sequence: Vec<u8>,
    pub span: PeptideSpan,
    pub protein: Arc<String>,
    pub decoy: bool,
    /// Full pattern: variable/localized placements plus the fixed overlay
    pub mods: ModPattern,
    /// The variable/localized placements alone, position-ordered (these are
    /// what the compact encoding records)
    pub variable: Vec<(usize, Arc<Modification>)>,
    /// Peptide touches the protein N-terminus (start <= 2 covers the
    /// initiator-Met cleaved case) / C-terminus
    pub protein_nterm: bool,
    pub protein_cterm: bool,
    pub monoisotopic: f64,
}

impl ModifiedPeptide {
    pub fn new(
        protein: &Protein,
        span: PeptideSpan,
        mods: ModPattern,
        mut variable: Vec<(usize, Arc<Modification>)>,
    ) -> Result<Self, Error> {
        let sequence = span.sequence(protein).to_vec();
        let len = sequence.len();
        for (pos, _) in mods.iter() {
            if pos < 1 || pos > len + 2 {
                return Err(Error::InvalidParameter("modification position out of range"));
            }
        }
        let monoisotopic = H2O
            + sequence.iter().map(Mass::monoisotopic).sum::<f64>()
            + mods.total_mass();
        if !monoisotopic.is_finite() {
            return Err(Error::InvalidParameter("non-finite peptide mass"));
        }
        variable.sort_by_key(|(pos, _)| *pos);
        Ok(ModifiedPeptide {
            sequence,
            span,
            protein: protein.accession.clone(),
            decoy: protein.decoy,
            mods,
            variable,
            protein_nterm: span.start <= 2,
            protein_cterm: span.end == protein.len(),
            monoisotopic,
        })
    }

    pub fn variable_mods(&self) -> u8 {
        self.variable.len() as u8
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Sorted, uncharged product masses for the requested fragment families.
    /// b1 is never emitted (it is rarely observed and pollutes the index).
    pub fn product_masses(&self, kinds: &[FragmentKind]) -> Result<Vec<f64>, Error> {
        sorted_product_masses(&self.sequence, |pos| self.mods.mass_at(pos), kinds)
    }
}

/// Shared b/y product-mass walk over a residue sequence; `mod_mass` supplies
/// the modification mass at each two-based position. Other fragment families
/// are rejected rather than silently approximated.
pub fn sorted_product_masses<F>(
    sequence: &[u8],
    mod_mass: F,
    kinds: &[FragmentKind],
) -> Result<Vec<f64>, Error>
where
    F: Fn(usize) -> f64,
{
    let len = sequence.len();
    let mut out = Vec::with_capacity(kinds.len() * len.saturating_sub(1));
    for kind in kinds {
        match kind {
            FragmentKind::B => {
                // cumulative N-terminal walk, skipping b1
                let mut running = mod_mass(1);
                for i in 1..len {
                    running += sequence[i - 1].monoisotopic() + mod_mass(i + 1);
                    if i >= 2 {
                        out.push(running);
                    }
                }
            }
            FragmentKind::Y => {
                // cumulative C-terminal walk
                let mut running = H2O + mod_mass(len + 2);
                for j in 1..len {
                    let residue = len - j;
                    running += sequence[residue].monoisotopic() + mod_mass(residue + 2);
                    out.push(running);
                }
            }
            FragmentKind::A | FragmentKind::C | FragmentKind::X | FragmentKind::Z => {
                return Err(Error::Unsupported("only b/y fragment ions are implemented"));
            }
        }
    }
    out.sort_unstable_by(|a, b| a.total_cmp(b));
    Ok(out)
}

impl std::fmt::Display for ModifiedPeptide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.sequence.len();
        if let Some((_, m)) = self.mods.iter().find(|(pos, _)| *pos == 1) {
            if m.monoisotopic.is_sign_positive() {
                write!(f, "[+{}]-", m.monoisotopic)?;
            } else {
                write!(f, "[{}]-", m.monoisotopic)?;
            }
        }
        for (i, c) in self.sequence.iter().enumerate() {
            write!(f, "{}", *c as char)?;
            let mass = self.mods.mass_at(i + 2);
            if mass != 0.0 {
                if mass.is_sign_positive() {
                    write!(f, "[+{}]", mass)?;
                } else {
                    write!(f, "[{}]", mass)?;
                }
            }
        }
        let cterm = self.mods.mass_at(len + 2);
        if cterm != 0.0 {
            if cterm.is_sign_positive() {
                write!(f, "-[+{}]", cterm)?;
            } else {
                write!(f, "-[{}]", cterm)?;
            }
        }
        Ok(())
    }
}
