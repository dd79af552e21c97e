use serde::{Deserialize, Serialize};

use crate::mass::PROTON;

/// Instrument data as handed over by an external spectral-file reader,
/// before any validation
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawScan {
    pub scan_number: usize,
    pub rt: f64,
    pub precursor_mz: f64,
    pub charge: Option<u8>,
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
}

/// A validated scan snapshot: peaks sorted by m/z, precursor neutral mass
/// resolved from m/z and charge. Immutable once built.
#[derive(Clone, Debug, Serialize)]
pub struct Scan {
    pub scan_number: usize,
    pub rt: f64,
    pub precursor_mz: f64,
    pub charge: u8,
    /// Neutral monoisotopic precursor mass
    pub precursor_mass: f64,
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
    pub total_ion_current: f64,
}

impl Scan {
    /// Validate one raw scan. `None` means the scan carries an anomaly
    /// (unresolved charge, bad precursor, mismatched or empty peak arrays)
    /// and is excluded from the run without aborting it.
    fn resolve(raw: RawScan) -> Option<Scan> {
        let charge = match raw.charge {
            Some(z) if z > 0 => z,
            _ => {
                log::warn!("scan {}: unresolved precursor charge", raw.scan_number);
                return None;
            }
        };
        if !raw.precursor_mz.is_finite() || raw.precursor_mz <= 0.0 {
            log::warn!("scan {}: invalid precursor m/z", raw.scan_number);
            return None;
        }
        if raw.mz.len() != raw.intensity.len() {
            log::warn!("scan {}: mismatched peak arrays", raw.scan_number);
            return None;
        }

        let mut peaks = raw
            .mz
            .into_iter()
            .zip(raw.intensity)
            .filter(|&(mz, int)| mz.is_finite() && mz > 0.0 && int.is_finite() && int > 0.0)
            .collect::<Vec<_>>();
        if peaks.is_empty() {
            log::warn!("scan {}: no usable peaks", raw.scan_number);
            return None;
        }
        peaks.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let (mz, intensity): (Vec<f64>, Vec<f64>) = peaks.into_iter().unzip();
        let total_ion_current = intensity.iter().sum();
        let precursor_mass = (raw.precursor_mz - PROTON) * charge as f64;

        Some(Scan {
            scan_number: raw.scan_number,
            rt: raw.rt,
            precursor_mz: raw.precursor_mz,
            charge,
            precursor_mass,
            mz,
            intensity,
            total_ion_current,
        })
    }
}

/// Validate a batch of raw scans and sort the survivors by precursor mass,
/// which is the order every search engine assumes
pub fn prepare(raw: Vec<RawScan>) -> Vec<Scan> {
    let total = raw.len();
    let mut scans = raw.into_iter().filter_map(Scan::resolve).collect::<Vec<_>>();
    if scans.len() < total {
        log::warn!("dropped {} of {} scans", total - scans.len(), total);
    }
    scans.sort_unstable_by(|a, b| a.precursor_mass.total_cmp(&b.precursor_mass));
    scans
}
