use crate::scoring::{rank, Psm};

/// q-values for a list already sorted best-first, given only the decoy
/// flags. Forward pass accumulates target/decoy counts; the backward pass
/// clamps each q-value down to the minimum seen at any better rank, so the
/// q-value is non-decreasing as the score threshold relaxes.
pub fn q_values(decoy: &[bool]) -> Vec<f64> {
    let mut out = Vec::with_capacity(decoy.len());
    let mut targets = 0u32;
    let mut decoys = 0u32;
    for &is_decoy in decoy {
        match is_decoy {
            true => decoys += 1,
            false => targets += 1,
        }
        out.push(decoys as f64 / (targets + decoys) as f64);
    }
    let mut min_q = 1.0f64;
    for q in out.iter_mut().rev() {
        min_q = min_q.min(*q);
        *q = min_q;
    }
    out
}

/// Sort matches best-first under the deterministic ranking, attach
/// cumulative target/decoy counts and monotone q-values, and return how
/// many matches pass a 1% FDR threshold
pub fn assign_q_values(psms: &mut [Psm]) -> usize {
    psms.sort_unstable_by(rank);

    let mut targets = 0u32;
    let mut decoys = 0u32;
    for psm in psms.iter_mut() {
        match psm.decoy {
            true => decoys += 1,
            false => targets += 1,
        }
        psm.cumulative_target = targets;
        psm.cumulative_decoy = decoys;
        psm.q_value = decoys as f64 / (targets + decoys) as f64;
    }

    let mut min_q = 1.0f64;
    for psm in psms.iter_mut().rev() {
        min_q = min_q.min(psm.q_value);
        psm.q_value = min_q;
    }

    psms.iter().filter(|psm| psm.q_value <= 0.01).count()
}
