use std::sync::Arc;

use fnv::FnvHashMap;

use crate::mass::VALID_AA;
use crate::modification::Modification;
use crate::Error;

/// An immutable protein record. Loaded once, never mutated; decoys are
/// generated once by [`Protein::reversed`] and treated as ordinary proteins
/// with the `decoy` flag set.
#[derive(Clone, Debug)]
pub struct Protein {
    pub accession: Arc<String>,
    pub sequence: Vec<u8>,
    pub decoy: bool,
    pub contaminant: bool,
    /// One-based residue position -> modifications annotated at that site
    pub localized_mods: FnvHashMap<usize, Vec<Arc<Modification>>>,
    /// One-based inclusive (begin, end) spans of annotated proteolysis
    /// products (chains, signal-peptide remainders)
    pub products: Vec<(usize, usize)>,
}

impl Protein {
    pub fn new(accession: impl Into<String>, sequence: impl AsRef<[u8]>) -> Result<Self, Error> {
        let sequence = sequence.as_ref().to_vec();
        if sequence.is_empty() {
            return Err(Error::InvalidParameter("empty protein sequence"));
        }
        for &c in &sequence {
            if !VALID_AA.contains(&c) {
                return Err(Error::InvalidResidue(c as char));
            }
        }
        Ok(Protein {
            accession: Arc::new(accession.into()),
            sequence,
            decoy: false,
            contaminant: false,
            localized_mods: FnvHashMap::default(),
            products: Vec::new(),
        })
    }

    pub fn with_localized_mods(
        mut self,
        mods: impl IntoIterator<Item = (usize, Arc<Modification>)>,
    ) -> Result<Self, Error> {
        for (pos, m) in mods {
            if pos < 1 || pos > self.sequence.len() {
                return Err(Error::InvalidParameter("localized modification out of range"));
            }
            self.localized_mods.entry(pos).or_default().push(m);
        }
        Ok(self)
    }

    pub fn with_products(
        mut self,
        spans: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self, Error> {
        for (begin, end) in spans {
            if begin < 1 || end > self.sequence.len() || begin > end {
                return Err(Error::InvalidParameter("proteolysis product out of range"));
            }
            self.products.push((begin, end));
        }
        Ok(self)
    }

    pub fn contaminant(mut self) -> Self {
        self.contaminant = true;
        self
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Generate the decoy counterpart: full sequence reversal, with localized
    /// modification sites and product spans remapped to the mirrored
    /// positions
    pub fn reversed(&self, decoy_tag: &str) -> Protein {
        let n = self.sequence.len();
        let mut sequence = self.sequence.clone();
        sequence.reverse();

        let localized_mods = self
            .localized_mods
            .iter()
            .map(|(&pos, mods)| (n - pos + 1, mods.clone()))
            .collect();

        let products = self
            .products
            .iter()
            .map(|&(begin, end)| (n - end + 1, n - begin + 1))
            .collect();

        Protein {
            accession: Arc::new(format!("{}{}", decoy_tag, self.accession)),
            sequence,
            decoy: true,
            contaminant: self.contaminant,
            localized_mods,
            products,
        }
    }
}
