use osprey::classic::ClassicSearch;
use osprey::compact::FixedMods;
use osprey::enzyme::{DigestConfig, DigestParameters, Protease};
use osprey::fdr::assign_q_values;
use osprey::index::IndexParameters;
use osprey::mass::{Tolerance, PROTON};
use osprey::modern::ModernSearch;
use osprey::modification::ModificationCatalog;
use osprey::parsimony;
use osprey::protein::Protein;
use osprey::scoring::localization_scores;
use osprey::search_mode::SearchMode;
use osprey::spectrum::{prepare, RawScan};

fn parameters(missed_cleavages: u8) -> IndexParameters {
    let config = DigestConfig {
        missed_cleavages,
        ..DigestConfig::default()
    };
    let digest = DigestParameters::new(Protease::trypsin(), config);
    let mut params = IndexParameters::new(
        digest,
        ModificationCatalog::default(),
        FixedMods::default(),
        Vec::new(),
    );
    params.peptide_min_mass = 100.0;
    params
}

/// Singly-protonated b/y peaks of one indexed peptide
fn ideal_scan(params: &IndexParameters, proteins: &[Protein], sequence: &[u8], n: usize) -> RawScan {
    let peptides = params.enumerate_peptides(proteins).unwrap();
    let entry = peptides
        .iter()
        .find(|p| &*p.peptide.sequence == sequence && !p.peptide.decoy)
        .unwrap();
    let masses = entry
        .peptide
        .product_masses(&params.catalog, &params.fixed_mods, &params.fragment_kinds)
        .unwrap();
    RawScan {
        scan_number: n,
        rt: n as f64,
        precursor_mz: entry.peptide.monoisotopic + PROTON,
        charge: Some(1),
        intensity: vec![50.0; masses.len()],
        mz: masses.iter().map(|m| m + PROTON).collect(),
    }
}

#[test]
fn classic_identifies_peptidek_from_its_spectrum() {
    let proteins = vec![Protein::new("P1", "MPEPTIDEK").unwrap()];
    let params = parameters(0);

    // trypsin at 0 missed cleavages leaves MPEPTIDEK intact; variable
    // initiator-Met cleavage adds PEPTIDEK
    let peptides = params.enumerate_peptides(&proteins).unwrap();
    let targets: Vec<&[u8]> = peptides
        .iter()
        .filter(|p| !p.peptide.decoy)
        .map(|p| &*p.peptide.sequence)
        .collect();
    assert!(targets.contains(&&b"MPEPTIDEK"[..]));
    assert!(targets.contains(&&b"PEPTIDEK"[..]));

    let scans = prepare(vec![ideal_scan(&params, &proteins, b"PEPTIDEK", 1)]);
    let search = ClassicSearch::new(
        params.clone(),
        Tolerance::Ppm(10.0),
        vec![SearchMode::tolerance("5ppm", Tolerance::Ppm(5.0))],
    );
    let results = search.search(&proteins, &scans).unwrap();

    let psm = results[0][0].as_ref().unwrap();
    assert_eq!(&*psm.peptide.sequence, b"PEPTIDEK");
    assert!(psm.score > 0.0);
    assert!(!psm.decoy);
}

#[test]
fn classic_and_modern_agree_on_ideal_spectra() {
    let proteins = vec![
        Protein::new("P1", "MPEPTIDEKLLNGR").unwrap(),
        Protein::new("P2", "AVGAKFFDDER").unwrap(),
    ];
    let params = parameters(1);
    let scans = prepare(vec![
        ideal_scan(&params, &proteins, b"PEPTIDEK", 1),
        ideal_scan(&params, &proteins, b"LLNGR", 2),
        ideal_scan(&params, &proteins, b"FFDDER", 3),
    ]);
    let modes = vec![SearchMode::tolerance("5ppm", Tolerance::Ppm(5.0))];

    let classic = ClassicSearch::new(parameters(1), Tolerance::Ppm(10.0), modes.clone())
        .search(&proteins, &scans)
        .unwrap();

    let index = parameters(1).build(&proteins).unwrap();
    let modern = ModernSearch::new(0.01, modes).search(&index, &scans).unwrap();

    for scan_ix in 0..scans.len() {
        let a = classic[0][scan_ix].as_ref().unwrap();
        let b = modern[0][scan_ix].as_ref().unwrap();
        assert_eq!(a.peptide, b.peptide, "scan {}", scans[scan_ix].scan_number);
        assert!(!a.decoy);
    }
}

#[test]
fn search_fdr_bins_parsimony_pipeline() {
    let proteins = vec![
        Protein::new("ALB", "MPEPTIDEKLLNGRAVGAK").unwrap(),
        Protein::new("TRY", "FFDDERSSTTKAVGAK").unwrap(),
    ];
    let params = parameters(0);
    let scans = prepare(vec![
        ideal_scan(&params, &proteins, b"PEPTIDEK", 1),
        ideal_scan(&params, &proteins, b"LLNGR", 2),
        ideal_scan(&params, &proteins, b"AVGAK", 3),
        ideal_scan(&params, &proteins, b"FFDDER", 4),
        ideal_scan(&params, &proteins, b"SSTTK", 5),
    ]);

    let modes = vec![SearchMode::tolerance("5ppm", Tolerance::Ppm(5.0))];
    let search = ClassicSearch::new(parameters(0), Tolerance::Ppm(10.0), modes);
    let results = search.search(&proteins, &scans).unwrap();

    let mut psms: Vec<_> = results[0].iter().flatten().cloned().collect();
    assert_eq!(psms.len(), 5);

    let passing = assign_q_values(&mut psms);
    assert_eq!(passing, 5);
    assert!(psms.iter().all(|p| p.q_value == 0.0));
    assert!(psms
        .windows(2)
        .all(|w| w[0].cumulative_target < w[1].cumulative_target));

    // all deltas sit at zero; a lone oxidation-like outlier widens the
    // shift range so the zero cluster separates into a bin
    let mut for_bins = psms.clone();
    let mut outlier = for_bins[0].clone();
    outlier.precursor_mass += 15.9949;
    for_bins.push(outlier);
    let catalog = ModificationCatalog::default();
    let bins =
        osprey::bins::generate_bins(&for_bins, &catalog, &osprey::bins::BinConfig::default());
    assert_eq!(bins.len(), 1);
    assert!(bins[0].mass_shift.abs() < 1e-6);
    assert_eq!(bins[0].count(), 5);
    assert_eq!(bins[0].curated, Some("exact match"));

    let groups = parsimony::resolve(&psms);
    // AVGAK is shared; both proteins carry unique peptides, so both stay
    assert_eq!(groups.len(), 2);
    for group in &groups {
        assert!(!group.decoy);
        assert!(!group.unique_peptides.is_empty());
        assert!(group.q_value == 0.0);
    }
    let covered: Vec<&String> = groups.iter().flat_map(|g| g.peptides.iter()).collect();
    for peptide in ["PEPTIDEK", "LLNGR", "AVGAK", "FFDDER", "SSTTK"] {
        assert!(covered.contains(&&peptide.to_string()));
    }
}

#[test]
fn localization_pinpoints_an_unassigned_shift() {
    let proteins = vec![Protein::new("P1", "MPEPTIDEK").unwrap()];
    let mut params = parameters(0);
    params.generate_decoys = false;
    let catalog = ModificationCatalog::default();

    // spectrum of PEPTIDEK with +80 pinned to the T, searched without any
    // configured modification
    let peptides = params.enumerate_peptides(&proteins).unwrap();
    let entry = peptides
        .iter()
        .find(|p| &*p.peptide.sequence == b"PEPTIDEK")
        .unwrap();
    let shift = 79.96633;
    let masses = entry
        .peptide
        .product_masses_with_shift(
            &catalog,
            &params.fixed_mods,
            &params.fragment_kinds,
            5,
            shift,
        )
        .unwrap();
    let scans = prepare(vec![RawScan {
        scan_number: 1,
        rt: 1.0,
        precursor_mz: entry.peptide.monoisotopic + shift + PROTON,
        charge: Some(1),
        intensity: vec![50.0; masses.len()],
        mz: masses.iter().map(|m| m + PROTON).collect(),
    }]);

    let scores = localization_scores(
        &entry.peptide,
        &catalog,
        &params.fixed_mods,
        &params.fragment_kinds,
        &scans[0],
        Tolerance::Ppm(10.0),
    )
    .unwrap();
    assert_eq!(scores.len(), 8);

    // the true site (T, residue 4) explains every fragment
    let best = scores.iter().cloned().fold(f64::MIN, f64::max);
    assert!((scores[3] - best).abs() < 1e-9);
    assert!(scores[3] > scores[0]);
    assert!(scores[3] > scores[7]);
}
