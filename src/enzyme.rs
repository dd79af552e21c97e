use fnv::FnvHashSet;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::mass::VALID_AA;
use crate::protein::Protein;
use crate::Error;

/// Hard length window for emitted peptides. The upper bound is an encoding
/// constraint: two-based positions must fit in one byte with reserved codes,
/// not a biological limit.
pub const MIN_PEPTIDE_LEN: usize = 2;
pub const MAX_PEPTIDE_LEN: usize = 252;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleavageSpecificity {
    Full,
    Semi,
    SingleN,
    SingleC,
    None,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitiatorMethionine {
    Retain,
    Cleave,
    Variable,
}

/// A contiguous interval of a protein produced by digestion. One-based,
/// inclusive on both ends; the sequence itself stays with the parent protein.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PeptideSpan {
    pub start: usize,
    pub end: usize,
    pub missed_cleavages: u8,
}

impl PeptideSpan {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn sequence<'p>(&self, protein: &'p Protein) -> &'p [u8] {
        &protein.sequence[self.start - 1..self.end]
    }
}

#[derive(Clone, Debug)]
pub struct Protease {
    // None means the motif never matches (whole-protein "digest")
    regex: Option<Regex>,
    pub skip_suffix: Option<char>,
    // Cleave at the C-terminal side of the matched residue?
    pub c_terminal: bool,
    pub specificity: CleavageSpecificity,
}

impl Protease {
    pub fn new(
        cleave: &str,
        skip_suffix: Option<char>,
        c_terminal: bool,
        specificity: CleavageSpecificity,
    ) -> Result<Self, Error> {
        if !(cleave.chars().all(|x| VALID_AA.contains(&(x as u8))) || cleave == "$") {
            return Err(Error::InvalidParameter(
                "cleavage motif contains non-amino acid characters",
            ));
        }
        if let Some(skip) = skip_suffix {
            if !VALID_AA.contains(&(skip as u8)) {
                return Err(Error::InvalidParameter(
                    "cleavage restriction is not an amino acid",
                ));
            }
        }
        let regex = match cleave {
            "" | "$" => None,
            _ => Some(
                Regex::new(&format!("[{}]", cleave))
                    .map_err(|_| Error::InvalidParameter("invalid cleavage motif"))?,
            ),
        };
        Ok(Protease {
            regex,
            skip_suffix,
            c_terminal,
            specificity,
        })
    }

    pub fn trypsin() -> Self {
        // Infallible: motif and restriction are valid amino acids
        Protease {
            regex: Some(Regex::new("[KR]").unwrap()),
            skip_suffix: Some('P'),
            c_terminal: true,
            specificity: CleavageSpecificity::Full,
        }
    }

    /// One-based residue indices this protease cleaves after, interior
    /// sites only
    pub fn cleavage_sites(&self, sequence: &[u8]) -> Vec<usize> {
        let regex = match &self.regex {
            Some(regex) => regex,
            None => return Vec::new(),
        };
        // Sequences are validated single-byte residues
        let s = std::str::from_utf8(sequence).unwrap_or_default();
        let mut sites = Vec::new();
        for mat in regex.find_iter(s) {
            let site = match self.c_terminal {
                true => mat.end(),
                false => mat.start(),
            };
            if let Some(skip) = self.skip_suffix {
                if site < s.len() && s[site..].starts_with(skip) {
                    continue;
                }
            }
            if site > 0 && site < s.len() {
                sites.push(site);
            }
        }
        sites
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DigestConfig {
    pub missed_cleavages: u8,
    /// Inclusive; clamped to the [2, 252] window
    pub min_len: usize,
    /// Inclusive; clamped to the [2, 252] window
    pub max_len: usize,
    pub initiator_methionine: InitiatorMethionine,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            missed_cleavages: 2,
            min_len: MIN_PEPTIDE_LEN,
            max_len: MAX_PEPTIDE_LEN,
            initiator_methionine: InitiatorMethionine::Variable,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DigestParameters {
    pub protease: Protease,
    pub config: DigestConfig,
}

impl DigestParameters {
    pub fn new(protease: Protease, config: DigestConfig) -> Self {
        Self { protease, config }
    }

    fn keep(&self, start: usize, end: usize) -> bool {
        if start > end {
            return false;
        }
        let len = end - start + 1;
        len >= self.config.min_len.max(MIN_PEPTIDE_LEN)
            && len <= self.config.max_len.min(MAX_PEPTIDE_LEN)
    }

    /// Digest a protein into peptide spans according to the protease's
    /// specificity mode and the initiator-methionine policy
    pub fn digest(&self, protein: &Protein) -> Vec<PeptideSpan> {
        let n = protein.len();
        // Virtual cleavage points before the first and after the last residue
        let mut sites = vec![0];
        sites.extend(self.protease.cleavage_sites(&protein.sequence));
        sites.push(n);

        let mut spans = Vec::new();
        let mut seen: FnvHashSet<(usize, usize)> = FnvHashSet::default();
        let mut emit = |start: usize, end: usize, mc: u8, spans: &mut Vec<PeptideSpan>| {
            if self.keep(start, end) && seen.insert((start, end)) {
                spans.push(PeptideSpan {
                    start,
                    end,
                    missed_cleavages: mc,
                });
            }
        };

        let starts_with_met = protein.sequence[0] == b'M';
        let met = self.config.initiator_methionine;

        match self.protease.specificity {
            CleavageSpecificity::Full => {
                for mc in 0..=self.config.missed_cleavages {
                    let window = mc as usize + 1;
                    if sites.len() <= window {
                        break;
                    }
                    for i in 0..sites.len() - window {
                        let start = sites[i] + 1;
                        let end = sites[i + window];
                        let at_nterm = i == 0;
                        if !(met == InitiatorMethionine::Cleave && at_nterm && starts_with_met) {
                            emit(start, end, mc, &mut spans);
                        }
                        if met != InitiatorMethionine::Retain && at_nterm && starts_with_met {
                            emit(2, end, mc, &mut spans);
                        }
                    }
                    self.digest_products(protein, &sites, mc, &mut |s, e| {
                        emit(s, e, mc, &mut spans)
                    });
                }
            }
            CleavageSpecificity::Semi | CleavageSpecificity::SingleN | CleavageSpecificity::SingleC => {
                let single_n = self.protease.specificity != CleavageSpecificity::SingleC;
                let single_c = self.protease.specificity != CleavageSpecificity::SingleN;
                let min = self.config.min_len.max(MIN_PEPTIDE_LEN);
                let max = self.config.max_len.min(MAX_PEPTIDE_LEN);
                for mc in 0..=self.config.missed_cleavages {
                    let window = mc as usize + 1;
                    if sites.len() <= window {
                        break;
                    }
                    for i in 0..sites.len() - window {
                        let start = sites[i] + 1;
                        let end = sites[i + window];
                        let starts = match met {
                            _ if !(i == 0 && starts_with_met) => vec![start],
                            InitiatorMethionine::Retain => vec![start],
                            InitiatorMethionine::Cleave => vec![2],
                            InitiatorMethionine::Variable => vec![start, 2],
                        };
                        for start in starts {
                            if start > end {
                                continue;
                            }
                            if single_n {
                                // relax the C-terminus, length bounds first
                                let lo = start + min - 1;
                                let hi = end.min(start + max - 1);
                                for e in lo..=hi {
                                    emit(start, e, mc, &mut spans);
                                }
                            }
                            if single_c {
                                // relax the N-terminus
                                let lo = start.max(end.saturating_sub(max - 1));
                                let hi = end.saturating_sub(min - 1);
                                for s in lo..=hi {
                                    emit(s, end, mc, &mut spans);
                                }
                            }
                        }
                    }
                }
            }
            CleavageSpecificity::None => {
                if !(met == InitiatorMethionine::Cleave && starts_with_met) {
                    emit(1, n, 0, &mut spans);
                }
                if met != InitiatorMethionine::Retain && starts_with_met {
                    emit(2, n, 0, &mut spans);
                }
            }
        }

        spans
    }

    /// Emit peptides bounded by annotated proteolysis-product spans that do
    /// not coincide with the whole protein
    fn digest_products(
        &self,
        protein: &Protein,
        sites: &[usize],
        mc: u8,
        emit: &mut impl FnMut(usize, usize),
    ) {
        let n = protein.len();
        let window = mc as usize;
        for &(begin, end) in &protein.products {
            if begin == 1 && end == n {
                continue;
            }
            // Product-start peptide: runs from the product boundary to the
            // (mc + 1)-th cleavage point at or after it
            let mut i = 0;
            while sites[i] < begin {
                i += 1;
            }
            if i + window < sites.len() && sites[i + window] <= end {
                emit(begin, sites[i + window]);
            }
            // Product-end peptide
            while sites[i] < end {
                i += 1;
            }
            if i >= window + 1 && sites[i - window - 1] + 1 >= begin {
                emit(sites[i - window - 1] + 1, end);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn seqs(protein: &Protein, spans: &[PeptideSpan]) -> Vec<String> {
        spans
            .iter()
            .map(|s| String::from_utf8(s.sequence(protein).to_vec()).unwrap())
            .collect()
    }

    fn params(protease: Protease, config: DigestConfig) -> DigestParameters {
        DigestParameters::new(protease, config)
    }

    #[test]
    fn trypsin() {
        let protein = Protein::new("P1", "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGN").unwrap();
        let tryp = params(
            Protease::trypsin(),
            DigestConfig {
                missed_cleavages: 0,
                initiator_methionine: InitiatorMethionine::Retain,
                ..Default::default()
            },
        );
        let expected = vec!["MADEEK", "LPPGWEK", "MSR", "SSGR", "VYYFNHITNASQWERPSGN"];
        assert_eq!(expected, seqs(&protein, &tryp.digest(&protein)));
    }

    #[test]
    fn trypsin_missed_cleavages() {
        let protein = Protein::new("P1", "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGN").unwrap();
        let tryp = params(
            Protease::trypsin(),
            DigestConfig {
                missed_cleavages: 1,
                initiator_methionine: InitiatorMethionine::Retain,
                ..Default::default()
            },
        );
        // "R" alone falls below the length floor; RMSR spans the skipped site
        let expected = vec![
            "MADEEK",
            "LPPGWEK",
            "MSR",
            "SSGR",
            "VYYFNHITNASQWERPSGN",
            "MADEEKLPPGWEK",
            "LPPGWEKR",
            "RMSR",
            "MSRSSGR",
            "SSGRVYYFNHITNASQWERPSGN",
        ];
        assert_eq!(expected, seqs(&protein, &tryp.digest(&protein)));
    }

    #[test]
    fn asp_n_cleaves_n_terminally() {
        let protein = Protein::new("P1", "MADEEKLPPGWEK").unwrap();
        let aspn = params(
            Protease::new("D", None, false, CleavageSpecificity::Full).unwrap(),
            DigestConfig {
                missed_cleavages: 0,
                initiator_methionine: InitiatorMethionine::Retain,
                ..Default::default()
            },
        );
        assert_eq!(vec!["MA", "DEEKLPPGWEK"], seqs(&protein, &aspn.digest(&protein)));
    }

    #[test]
    fn initiator_methionine_variants() {
        let protein = Protein::new("P1", "MPEPTIDEK").unwrap();
        let base = DigestConfig {
            missed_cleavages: 0,
            ..Default::default()
        };

        let variable = params(Protease::trypsin(), base.clone());
        assert_eq!(vec!["MPEPTIDEK", "PEPTIDEK"], seqs(&protein, &variable.digest(&protein)));

        let retain = params(
            Protease::trypsin(),
            DigestConfig {
                initiator_methionine: InitiatorMethionine::Retain,
                ..base.clone()
            },
        );
        assert_eq!(vec!["MPEPTIDEK"], seqs(&protein, &retain.digest(&protein)));

        let cleave = params(
            Protease::trypsin(),
            DigestConfig {
                initiator_methionine: InitiatorMethionine::Cleave,
                ..base
            },
        );
        assert_eq!(vec!["PEPTIDEK"], seqs(&protein, &cleave.digest(&protein)));
    }

    #[test]
    fn full_digest_tiles_protein() {
        let protein = Protein::new("P1", "MADEEKLPPGWEKMSR").unwrap();
        let tryp = params(
            Protease::trypsin(),
            DigestConfig {
                missed_cleavages: 0,
                initiator_methionine: InitiatorMethionine::Retain,
                ..Default::default()
            },
        );
        let mut spans = tryp.digest(&protein);
        spans.sort_unstable();

        // Spans must tile [1, L] with no gaps or overlaps
        assert_eq!(spans[0].start, 1);
        assert_eq!(spans.last().unwrap().end, protein.len());
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
    }

    #[test]
    fn no_digest_motif() {
        let protein = Protein::new("P1", "MADEEKLPPGWEK").unwrap();
        let whole = params(
            Protease::new("$", None, true, CleavageSpecificity::Full).unwrap(),
            DigestConfig {
                missed_cleavages: 0,
                initiator_methionine: InitiatorMethionine::Retain,
                ..Default::default()
            },
        );
        assert_eq!(vec!["MADEEKLPPGWEK"], seqs(&protein, &whole.digest(&protein)));
    }

    #[test]
    fn none_specificity_emits_whole_protein() {
        let protein = Protein::new("P1", "MADEEKLPPGWEK").unwrap();
        let none = params(
            Protease::new("KR", Some('P'), true, CleavageSpecificity::None).unwrap(),
            DigestConfig {
                missed_cleavages: 0,
                ..Default::default()
            },
        );
        assert_eq!(
            vec!["MADEEKLPPGWEK", "ADEEKLPPGWEK"],
            seqs(&protein, &none.digest(&protein))
        );
    }

    #[test]
    fn single_n_relaxes_c_terminus() {
        let protein = Protein::new("P1", "ADEEKLPPG").unwrap();
        let semi = params(
            Protease::new("K", None, true, CleavageSpecificity::SingleN).unwrap(),
            DigestConfig {
                missed_cleavages: 0,
                min_len: 3,
                max_len: 5,
                initiator_methionine: InitiatorMethionine::Retain,
            },
        );
        // Spans anchored at 1 and at 6, lengths 3..=5, clipped to span ends
        let expected = vec!["ADE", "ADEE", "ADEEK", "LPP", "LPPG"];
        assert_eq!(expected, seqs(&protein, &semi.digest(&protein)));
    }

    #[test]
    fn semi_dedups_shared_spans() {
        let protein = Protein::new("P1", "ADEEK").unwrap();
        let semi = params(
            Protease::new("K", None, true, CleavageSpecificity::Semi).unwrap(),
            DigestConfig {
                missed_cleavages: 0,
                min_len: 2,
                max_len: 5,
                initiator_methionine: InitiatorMethionine::Retain,
            },
        );
        let spans = semi.digest(&protein);
        let mut unique = spans.iter().map(|s| (s.start, s.end)).collect::<Vec<_>>();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(spans.len(), unique.len());
        // the full span appears exactly once even though both relaxations reach it
        assert_eq!(spans.iter().filter(|s| s.start == 1 && s.end == 5).count(), 1);
    }

    #[test]
    fn proteolysis_products() {
        // chain 3..=13 inside the protein
        let protein = Protein::new("P1", "MADEEKLPPGWEKR")
            .unwrap()
            .with_products([(3, 13)])
            .unwrap();
        let tryp = params(
            Protease::trypsin(),
            DigestConfig {
                missed_cleavages: 0,
                initiator_methionine: InitiatorMethionine::Retain,
                ..Default::default()
            },
        );
        let spans = tryp.digest(&protein);
        // product-start peptide DEEK (3..6) and product-end peptide LPPGWEK
        // (7..13, already a full cleavage product)
        assert!(spans.iter().any(|s| s.start == 3 && s.end == 6));
        assert!(spans.iter().any(|s| s.start == 7 && s.end == 13));
    }

    #[test]
    fn length_window() {
        let long = "A".repeat(300);
        let protein = Protein::new("P1", long.as_str()).unwrap();
        let whole = params(
            Protease::new("$", None, true, CleavageSpecificity::Full).unwrap(),
            DigestConfig {
                missed_cleavages: 0,
                max_len: 1000,
                initiator_methionine: InitiatorMethionine::Retain,
                ..Default::default()
            },
        );
        // 300 residues exceeds the hard encoding bound
        assert!(whole.digest(&protein).is_empty());
    }
}
