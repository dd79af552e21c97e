use serde::{Deserialize, Serialize};

pub const H2O: f64 = 18.010565;
pub const PROTON: f64 = 1.00727646688;
pub const NEUTRON: f64 = 1.00335;
pub const NH3: f64 = 17.026548;

/// Two masses within this window are treated as chemically identical.
/// Equality tests on masses must go through [`mass_identical`] rather than
/// `==`: rounding can make two identical masses compare unequal.
pub const MASS_EPSILON: f64 = 1e-7;

pub fn mass_identical(a: f64, b: f64) -> bool {
    (a - b).abs() < MASS_EPSILON
}

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Ppm(f64),
    Da(f64),
}

impl Tolerance {
    /// Compute the (`lower`, `upper`) window (in Da) around a monoisotopic
    /// mass for this tolerance
    pub fn bounds(&self, center: f64) -> (f64, f64) {
        let delta = self.delta(center);
        (center - delta, center + delta)
    }

    /// Half-width of the window around `center`, in Da
    pub fn delta(&self, center: f64) -> f64 {
        match self {
            Tolerance::Ppm(ppm) => center.abs() * ppm / 1_000_000.0,
            Tolerance::Da(da) => *da,
        }
    }

    pub fn contains(&self, center: f64, rhs: f64) -> bool {
        let (lo, hi) = self.bounds(center);
        rhs >= lo && rhs <= hi
    }
}

pub trait Mass {
    fn monoisotopic(&self) -> f64;
}

pub const VALID_AA: [u8; 22] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y', b'U', b'O',
];

impl Mass for u8 {
    fn monoisotopic(&self) -> f64 {
        match self {
            b'A' => 71.03711138,
            b'R' => 156.10111102,
            b'N' => 114.04292744,
            b'D' => 115.02694302,
            b'C' => 103.00918448,
            b'E' => 129.04259308,
            b'Q' => 128.05857750,
            b'G' => 57.02146372,
            b'H' => 137.05891186,
            b'I' => 113.08406398,
            b'L' => 113.08406398,
            b'K' => 128.09496301,
            b'M' => 131.04048508,
            b'F' => 147.06841390,
            b'P' => 97.05276384,
            b'S' => 87.03202840,
            b'T' => 101.04767846,
            b'W' => 186.07931294,
            b'Y' => 163.06332852,
            b'V' => 99.06841390,
            b'U' => 150.95363508,
            b'O' => 237.14772686,
            _ => unreachable!("BUG: invalid amino acid {}", *self as char),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{mass_identical, Mass, Tolerance, VALID_AA};

    #[test]
    fn smoke() {
        for ch in VALID_AA {
            assert!(ch.monoisotopic() > 0.0);
        }
    }

    #[test]
    fn tolerances() {
        let (lo, hi) = Tolerance::Ppm(10.0).bounds(1000.0);
        assert!((lo - 999.99).abs() < 1e-9);
        assert!((hi - 1000.01).abs() < 1e-9);

        let (lo, hi) = Tolerance::Da(0.5).bounds(487.0);
        assert_eq!((lo, hi), (486.5, 487.5));

        assert!(Tolerance::Ppm(5.0).contains(500.0, 500.002));
        assert!(!Tolerance::Ppm(5.0).contains(500.0, 500.004));
    }

    #[test]
    fn epsilon_equality() {
        assert!(mass_identical(100.0, 100.0 + 5e-8));
        assert!(!mass_identical(100.0, 100.0 + 5e-7));
    }
}
