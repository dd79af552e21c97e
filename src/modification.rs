use std::{
    fmt::{Display, Write},
    str::FromStr,
    sync::Arc,
};

use fnv::FnvHashMap;
use serde::Serialize;

use crate::mass::{mass_identical, VALID_AA};
use crate::Error;

/// Sentinel for an empty modification slot in compact encodings
pub const NO_MOD: u16 = u16::MAX;

/// Terminus-localization rule for a modification: where on a peptide it is
/// allowed to sit, optionally constrained to a single residue.
///
/// Positions use the two-based convention: 1 is the peptide N-terminus,
/// `2..=len + 1` are residue positions, `len + 2` is the peptide C-terminus.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placement {
    PeptideN(Option<u8>),
    PeptideC(Option<u8>),
    ProteinN(Option<u8>),
    ProteinC(Option<u8>),
    Residue(u8),
}

impl Placement {
    /// Can a modification with this rule occupy two-based position `pos` of
    /// a peptide spanning `start..=end` (one-based) in a protein of
    /// `protein_len` residues?
    ///
    /// Protein-terminal rules additionally require the peptide to actually
    /// touch that protein terminus (`start <= 2` covers the initiator-Met
    /// cleaved case).
    pub fn fits(&self, seq: &[u8], pos: usize, start: usize, end: usize, protein_len: usize) -> bool {
        let len = seq.len();
        if pos < 1 || pos > len + 2 || len == 0 {
            return false;
        }
        let first = |r: &Option<u8>| r.map_or(true, |r| seq[0] == r);
        let last = |r: &Option<u8>| r.map_or(true, |r| seq[len - 1] == r);
        match self {
            Placement::Residue(r) => (2..=len + 1).contains(&pos) && seq[pos - 2] == *r,
            Placement::PeptideN(r) => pos == 1 && first(r),
            Placement::PeptideC(r) => pos == len + 2 && last(r),
            Placement::ProteinN(r) => pos == 1 && start <= 2 && first(r),
            Placement::ProteinC(r) => pos == len + 2 && end == protein_len && last(r),
        }
    }

    /// Two-based position this rule binds to for a peptide of `len`
    /// residues, or `None` for residue rules (which bind anywhere the
    /// residue occurs)
    pub fn anchor(&self, len: usize) -> Option<usize> {
        match self {
            Placement::PeptideN(_) | Placement::ProteinN(_) => Some(1),
            Placement::PeptideC(_) | Placement::ProteinC(_) => Some(len + 2),
            Placement::Residue(_) => None,
        }
    }
}

impl Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let r = match self {
            Placement::PeptideN(r) => {
                f.write_char('^')?;
                *r
            }
            Placement::PeptideC(r) => {
                f.write_char('$')?;
                *r
            }
            Placement::ProteinN(r) => {
                f.write_char('[')?;
                *r
            }
            Placement::ProteinC(r) => {
                f.write_char(']')?;
                *r
            }
            Placement::Residue(r) => Some(*r),
        };
        if let Some(r) = r {
            f.write_char(r as char)?;
        }
        Ok(())
    }
}

impl Serialize for Placement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl FromStr for Placement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > 2 {
            return Err(Error::InvalidModification(s.into()));
        }
        let residue = |rest: &str| rest.chars().next().map(|ch| ch as u8);
        if let Some(rest) = s.strip_prefix('^') {
            return Ok(Placement::PeptideN(residue(rest)));
        }
        if let Some(rest) = s.strip_prefix('$') {
            return Ok(Placement::PeptideC(residue(rest)));
        }
        if let Some(rest) = s.strip_prefix('[') {
            return Ok(Placement::ProteinN(residue(rest)));
        }
        if let Some(rest) = s.strip_prefix(']') {
            return Ok(Placement::ProteinC(residue(rest)));
        }
        match s.chars().next() {
            Some(c) if VALID_AA.contains(&(c as u8)) => Ok(Placement::Residue(c as u8)),
            Some(c) => Err(Error::InvalidResidue(c)),
            None => Err(Error::InvalidModification(s.into())),
        }
    }
}

/// An immutable modification definition, shared by reference across every
/// peptide that carries it.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Modification {
    pub id: String,
    pub placement: Placement,
    pub monoisotopic: f64,
}

impl Modification {
    pub fn new(id: impl Into<String>, placement: Placement, monoisotopic: f64) -> Result<Self, Error> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidModification("empty identifier".into()));
        }
        if !monoisotopic.is_finite() {
            return Err(Error::InvalidModification(id));
        }
        Ok(Modification {
            id,
            placement,
            monoisotopic,
        })
    }
}

impl Display for Modification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.placement)
    }
}

/// Registry assigning stable `u16` codes to modifications, used by the
/// compact peptide encoding. Codes are dense and start at 0; `u16::MAX` is
/// reserved as the empty-slot sentinel.
#[derive(Default, Clone, Debug)]
pub struct ModificationCatalog {
    mods: Vec<Arc<Modification>>,
    by_id: FnvHashMap<String, u16>,
}

impl ModificationCatalog {
    /// Register a modification, returning the shared handle. Re-registering
    /// the same identifier returns the existing handle if the definitions
    /// agree, and fails otherwise.
    pub fn register(&mut self, m: Modification) -> Result<Arc<Modification>, Error> {
        if let Some(&code) = self.by_id.get(&m.id) {
            let existing = &self.mods[code as usize];
            if existing.placement == m.placement
                && mass_identical(existing.monoisotopic, m.monoisotopic)
            {
                return Ok(existing.clone());
            }
            return Err(Error::InvalidModification(format!(
                "conflicting definitions for {}",
                m.id
            )));
        }
        if self.mods.len() >= NO_MOD as usize {
            return Err(Error::InvalidModification(format!(
                "catalog full, cannot register {}",
                m.id
            )));
        }
        let code = self.mods.len() as u16;
        self.by_id.insert(m.id.clone(), code);
        let m = Arc::new(m);
        self.mods.push(m.clone());
        Ok(m)
    }

    pub fn code(&self, m: &Modification) -> Option<u16> {
        self.by_id.get(&m.id).copied()
    }

    pub fn get(&self, code: u16) -> Option<&Arc<Modification>> {
        self.mods.get(code as usize)
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }
}

/// Build a catalog from raw `(identifier, placement, mass)` definitions,
/// logging and skipping any that fail validation
pub fn build_catalog<I, S>(entries: I) -> ModificationCatalog
where
    I: IntoIterator<Item = (S, S, f64)>,
    S: AsRef<str>,
{
    let mut catalog = ModificationCatalog::default();
    for (id, placement, mass) in entries {
        let placement = match placement.as_ref().parse::<Placement>() {
            Ok(p) => p,
            Err(e) => {
                log::error!("skipping modification {}: {}", id.as_ref(), e);
                continue;
            }
        };
        match Modification::new(id.as_ref(), placement, mass).map(|m| catalog.register(m)) {
            Ok(Ok(_)) => {}
            Ok(Err(e)) | Err(e) => {
                log::error!("skipping modification {}: {}", id.as_ref(), e)
            }
        }
    }
    catalog
}
