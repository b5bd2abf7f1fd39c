//! Random value DSL.
//!
//! Configuration never stores a sampled number, it stores the model
//! that produces one, written as `kind:arg1,arg2,...`:
//!
//! | spec                      | sample                                        |
//! |---------------------------|-----------------------------------------------|
//! | `randint:MIN,MAX`         | integer, MIN <= N <= MAX                      |
//! | `randrange:MIN,MAX`       | integer, MIN <= N < MAX                       |
//! | `randf:MIN,MAX`           | float, MIN <= F < MAX                         |
//! | `normal:MEAN,STDDEV`      | gaussian                                      |
//! | `triangular:MIN,PEAK,MAX` | triangular                                    |
//! | `binomial:P`              | 1.0 with probability P, else 0.0              |
//! | `cdc:`                    | age at death in earth years, life table       |
//! | `half:BEGIN,STEP`         | 50% in the first STEP band, 25% in the next.. |
//! | `42`                      | the constant 42                               |
//!
//! An unknown kind or malformed argument list is a configuration error.
//! An empty spec yields the caller's default.

use std::{fmt, str::FromStr};

use rand_distr::{Distribution as _, Normal, Triangular};

use crate::{
    error::{SimError, SimResult},
    rng::SimRng,
    types::years_to_sols,
};

/// Explicit bands for `half:` before the catch-all band.
const HALF_BANDS: u32 = 8;

/// Age-at-death weights, earth years. Five-year bands from 0 to 105,
/// shaped on the CDC period life table.
const LIFE_TABLE: [(f64, f64); 21] = [
    (0.0, 660.0),
    (5.0, 60.0),
    (10.0, 75.0),
    (15.0, 250.0),
    (20.0, 450.0),
    (25.0, 550.0),
    (30.0, 650.0),
    (35.0, 750.0),
    (40.0, 900.0),
    (45.0, 1300.0),
    (50.0, 2000.0),
    (55.0, 3000.0),
    (60.0, 4100.0),
    (65.0, 5200.0),
    (70.0, 6500.0),
    (75.0, 8100.0),
    (80.0, 10000.0),
    (85.0, 11500.0),
    (90.0, 10500.0),
    (95.0, 6000.0),
    (100.0, 2000.0),
];
const LIFE_TABLE_BAND: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    Constant(f64),
    RandInt { min: i64, max: i64 },
    RandRange { min: i64, max: i64 },
    RandF { min: f64, max: f64 },
    Normal { mean: f64, std_dev: f64 },
    Triangular { min: f64, peak: f64, max: f64 },
    Binomial { p: f64 },
    Cdc,
    Half { begin: f64, step: f64 },
}

impl Distribution {
    /// Parse a spec; `Ok(None)` for an empty (or all-whitespace) spec.
    pub fn parse(spec: &str) -> SimResult<Option<Self>> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Ok(None);
        }
        spec.parse().map(Some)
    }

    pub fn sample(&self, rng: &mut SimRng) -> f64 {
        match *self {
            Self::Constant(v) => v,
            Self::RandInt { min, max } => rng.range_inclusive(min, max) as f64,
            Self::RandRange { min, max } => rng.range(min, max) as f64,
            Self::RandF { min, max } => min + rng.next_f64() * (max - min),
            Self::Normal { mean, std_dev } => match Normal::new(mean, std_dev) {
                Ok(normal) => normal.sample(rng),
                Err(_) => mean,
            },
            Self::Triangular { min, peak, max } => {
                if max <= min {
                    return min;
                }
                match Triangular::new(min, max, peak) {
                    Ok(tri) => tri.sample(rng),
                    Err(_) => peak,
                }
            }
            Self::Binomial { p } => {
                if rng.chance(p) {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Cdc => sample_life_table(rng),
            Self::Half { begin, step } => {
                let roll = rng.next_f64();
                let mut upper = 0.0;
                let mut band = HALF_BANDS;
                for b in 0..HALF_BANDS {
                    upper += 0.5f64.powi(b as i32 + 1);
                    if roll < upper {
                        band = b;
                        break;
                    }
                }
                begin + step * (band as f64 + rng.next_f64())
            }
        }
    }

    /// Reinterpret every argument as earth years and express it in sols.
    /// `binomial` is a probability and stays untouched.
    pub fn in_years(self) -> Self {
        let sols = years_to_sols;
        let whole = |v: i64| years_to_sols(v as f64) as i64;
        match self {
            Self::Constant(v) => Self::Constant(sols(v)),
            Self::RandInt { min, max } => Self::RandInt { min: whole(min), max: whole(max) },
            Self::RandRange { min, max } => Self::RandRange { min: whole(min), max: whole(max) },
            Self::RandF { min, max } => Self::RandF { min: sols(min), max: sols(max) },
            Self::Normal { mean, std_dev } => Self::Normal { mean: sols(mean), std_dev: sols(std_dev) },
            Self::Triangular { min, peak, max } => Self::Triangular {
                min: sols(min),
                peak: sols(peak),
                max: sols(max),
            },
            Self::Half { begin, step } => Self::Half { begin: sols(begin), step: sols(step) },
            other @ (Self::Binomial { .. } | Self::Cdc) => other,
        }
    }

    /// Sample and return a value in sols, treating the spec as earth years.
    pub fn sample_years_as_sols(&self, rng: &mut SimRng) -> f64 {
        match self {
            Self::Cdc => years_to_sols(self.sample(rng)),
            other => other.clone().in_years().sample(rng),
        }
    }
}

/// Sample `spec`, or return `default` when the spec is empty.
pub fn parse_random_value(spec: &str, default: f64, rng: &mut SimRng) -> SimResult<f64> {
    Ok(match Distribution::parse(spec)? {
        Some(d) => d.sample(rng),
        None => default,
    })
}

/// As `parse_random_value`, but `spec` is written in earth years and the
/// result is in sols. `default` is already in sols.
pub fn parse_random_value_years(spec: &str, default: f64, rng: &mut SimRng) -> SimResult<f64> {
    Ok(match Distribution::parse(spec)? {
        Some(d) => d.sample_years_as_sols(rng),
        None => default,
    })
}

fn sample_life_table(rng: &mut SimRng) -> f64 {
    let total: f64 = LIFE_TABLE.iter().map(|(_, w)| w).sum();
    let mut roll = rng.next_f64() * total;
    for (age, weight) in LIFE_TABLE {
        if roll < weight {
            return age + rng.next_f64() * LIFE_TABLE_BAND;
        }
        roll -= weight;
    }
    let (last, _) = LIFE_TABLE[LIFE_TABLE.len() - 1];
    last + rng.next_f64() * LIFE_TABLE_BAND
}

fn numbers(kind: &str, args: &str, expected: usize) -> SimResult<Vec<f64>> {
    let values = args
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|a| {
            a.parse::<f64>()
                .map_err(|_| SimError::config(format!("{kind}: '{a}' is not a number")))
        })
        .collect::<SimResult<Vec<f64>>>()?;
    if values.len() != expected {
        return Err(SimError::config(format!(
            "{kind}: expected {expected} argument(s), got {}",
            values.len()
        )));
    }
    Ok(values)
}

/// Round an integer argument, refusing values an `i64` cannot hold.
fn integer(kind: &str, value: f64) -> SimResult<i64> {
    let rounded = value.round();
    // 2^63 is the first float past i64::MAX.
    if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded >= 9_223_372_036_854_775_808.0 {
        return Err(SimError::config(format!("{kind}: '{value}' is out of integer range")));
    }
    Ok(rounded as i64)
}

impl FromStr for Distribution {
    type Err = SimError;

    fn from_str(spec: &str) -> SimResult<Self> {
        let spec = spec.trim();
        let Some((kind, args)) = spec.split_once(':') else {
            return spec
                .parse::<f64>()
                .map(Self::Constant)
                .map_err(|_| SimError::config(format!("unrecognised random value '{spec}'")));
        };

        let dist = match kind.trim() {
            "randint" => {
                let a = numbers(kind, args, 2)?;
                Self::RandInt { min: integer(kind, a[0])?, max: integer(kind, a[1])? }
            }
            "randrange" => {
                let a = numbers(kind, args, 2)?;
                Self::RandRange { min: integer(kind, a[0])?, max: integer(kind, a[1])? }
            }
            "randf" => {
                let a = numbers(kind, args, 2)?;
                Self::RandF { min: a[0], max: a[1] }
            }
            "normal" => {
                let a = numbers(kind, args, 2)?;
                if !(a[1] >= 0.0 && a[1].is_finite()) {
                    return Err(SimError::config(format!("normal: bad std dev in '{spec}'")));
                }
                Self::Normal { mean: a[0], std_dev: a[1] }
            }
            "triangular" => {
                let a = numbers(kind, args, 3)?;
                if !(a[0] <= a[1] && a[1] <= a[2]) {
                    return Err(SimError::config(format!(
                        "triangular: need MIN <= PEAK <= MAX in '{spec}'"
                    )));
                }
                Self::Triangular { min: a[0], peak: a[1], max: a[2] }
            }
            "binomial" => {
                let a = numbers(kind, args, 1)?;
                if !(0.0..=1.0).contains(&a[0]) {
                    return Err(SimError::config(format!("binomial: P out of [0,1] in '{spec}'")));
                }
                Self::Binomial { p: a[0] }
            }
            "cdc" => Self::Cdc,
            "half" => {
                let a = numbers(kind, args, 2)?;
                Self::Half { begin: a[0], step: a[1] }
            }
            other => {
                return Err(SimError::config(format!(
                    "unrecognised random value kind '{other}' in '{spec}'"
                )))
            }
        };

        match dist {
            Self::RandInt { min, max } if min > max => Err(SimError::config(format!(
                "{kind}: MIN greater than MAX in '{spec}'"
            ))),
            Self::RandRange { min, max } if min >= max => Err(SimError::config(format!(
                "{kind}: empty range, MIN must be below MAX in '{spec}'"
            ))),
            d => Ok(d),
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => write!(f, "{v}"),
            Self::RandInt { min, max } => write!(f, "randint:{min},{max}"),
            Self::RandRange { min, max } => write!(f, "randrange:{min},{max}"),
            Self::RandF { min, max } => write!(f, "randf:{min},{max}"),
            Self::Normal { mean, std_dev } => write!(f, "normal:{mean},{std_dev}"),
            Self::Triangular { min, peak, max } => write!(f, "triangular:{min},{peak},{max}"),
            Self::Binomial { p } => write!(f, "binomial:{p}"),
            Self::Cdc => write!(f, "cdc:"),
            Self::Half { begin, step } => write!(f, "half:{begin},{step}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> SimRng {
        SimRng::new(0x5eed)
    }

    #[test]
    fn randint_is_inclusive_both_ends() {
        let d: Distribution = "randint:5,10".parse().unwrap();
        let mut rng = rng();
        let mut seen_max = false;
        for _ in 0..5000 {
            let v = d.sample(&mut rng);
            assert!((5.0..=10.0).contains(&v), "randint out of range: {v}");
            assert_eq!(v, v.trunc());
            seen_max |= v == 10.0;
        }
        assert!(seen_max, "randint never produced its upper bound");
    }

    #[test]
    fn randrange_excludes_upper_bound() {
        let d: Distribution = "randrange:5,10".parse().unwrap();
        let mut rng = rng();
        for _ in 0..5000 {
            let v = d.sample(&mut rng);
            assert!((5.0..10.0).contains(&v), "randrange out of range: {v}");
        }
    }

    #[test]
    fn randrange_with_equal_bounds_is_rejected() {
        let err = "randrange:5,5".parse::<Distribution>().unwrap_err();
        assert!(err.is_fatal(), "Expected a configuration error, got {err}");
        assert!("randrange:6,5".parse::<Distribution>().is_err());
        assert!("randrange:5,6".parse::<Distribution>().is_ok());
    }

    #[test]
    fn integer_bounds_outside_i64_are_rejected() {
        assert!("randint:0,1e19".parse::<Distribution>().is_err());
        assert!("randint:-1e19,0".parse::<Distribution>().is_err());
        assert!("randrange:0,inf".parse::<Distribution>().is_err());
    }

    #[test]
    fn randint_up_to_i64_max_samples_in_bounds() {
        let d = Distribution::RandInt { min: i64::MAX - 1, max: i64::MAX };
        let mut rng = rng();
        for _ in 0..100 {
            assert!(d.sample(&mut rng) >= (i64::MAX - 1) as f64);
        }
    }

    #[test]
    fn randint_with_equal_bounds_is_constant() {
        let d: Distribution = "randint:1,1".parse().unwrap();
        let mut rng = rng();
        assert!((0..100).all(|_| d.sample(&mut rng) == 1.0));
    }

    #[test]
    fn triangular_stays_inside_its_bounds() {
        let d: Distribution = "triangular:2,3,9".parse().unwrap();
        let mut rng = rng();
        for _ in 0..2000 {
            let v = d.sample(&mut rng);
            assert!((2.0..=9.0).contains(&v));
        }
    }

    #[test]
    fn normal_mean_is_close() {
        let d: Distribution = "normal:100,5".parse().unwrap();
        let mut rng = rng();
        let n = 10_000;
        let mean = (0..n).map(|_| d.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((mean - 100.0).abs() < 0.5, "mean drifted: {mean}");
    }

    #[test]
    fn binomial_is_boolean_with_expected_rate() {
        let d: Distribution = "binomial:0.25".parse().unwrap();
        let mut rng = rng();
        let n = 20_000;
        let hits = (0..n)
            .map(|_| d.sample(&mut rng))
            .inspect(|v| assert!(*v == 0.0 || *v == 1.0))
            .filter(|v| *v == 1.0)
            .count();
        let rate = hits as f64 / n as f64;
        assert!((rate - 0.25).abs() < 0.02, "rate {rate}");
    }

    #[test]
    fn half_halves_each_band() {
        let d: Distribution = "half:0,100".parse().unwrap();
        let mut rng = rng();
        let n = 40_000;
        let mut bands = [0usize; 10];
        for _ in 0..n {
            let v = d.sample(&mut rng);
            assert!(v >= 0.0);
            bands[((v / 100.0) as usize).min(9)] += 1;
        }
        let share = |b: usize| bands[b] as f64 / n as f64;
        assert!((share(0) - 0.5).abs() < 0.02, "band 0: {}", share(0));
        assert!((share(1) - 0.25).abs() < 0.02, "band 1: {}", share(1));
        assert!((share(2) - 0.125).abs() < 0.015, "band 2: {}", share(2));
        assert_eq!(bands[9], 0, "nothing lands past the catch-all band");
    }

    #[test]
    fn cdc_ages_are_plausible() {
        let d: Distribution = "cdc:".parse().unwrap();
        let mut rng = rng();
        let n = 5000;
        let ages: Vec<f64> = (0..n).map(|_| d.sample(&mut rng)).collect();
        assert!(ages.iter().all(|a| (0.0..105.0).contains(a)));
        let mean = ages.iter().sum::<f64>() / n as f64;
        assert!((65.0..85.0).contains(&mean), "mean age at death {mean}");
    }

    #[test]
    fn empty_spec_returns_default() {
        let mut rng = rng();
        assert_eq!(parse_random_value("", 759.0, &mut rng).unwrap(), 759.0);
        assert_eq!(parse_random_value("   ", 3.0, &mut rng).unwrap(), 3.0);
    }

    #[test]
    fn plain_number_is_a_constant() {
        let mut rng = rng();
        assert_eq!(parse_random_value("759", 0.0, &mut rng).unwrap(), 759.0);
    }

    #[test]
    fn unknown_kind_is_fatal() {
        let err = "poisson:3".parse::<Distribution>().unwrap_err();
        assert!(err.is_fatal());
        assert!(Distribution::parse("garbage").unwrap_err().is_fatal());
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        assert!("randint:5".parse::<Distribution>().is_err());
        assert!("randint:10,5".parse::<Distribution>().is_err());
        assert!("normal:a,b".parse::<Distribution>().is_err());
        assert!("binomial:1.5".parse::<Distribution>().is_err());
        assert!("triangular:5,1,3".parse::<Distribution>().is_err());
    }

    #[test]
    fn years_are_converted_before_sampling() {
        let mut rng = rng();
        let v = parse_random_value_years("randint:18,18", 0.0, &mut rng).unwrap();
        assert_eq!(v, years_to_sols(18.0));
        let age = parse_random_value_years("cdc:", 0.0, &mut rng).unwrap();
        assert!(age < years_to_sols(106.0));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let d: Distribution = "triangular:1,2,3".parse().unwrap();
        assert_eq!(d.to_string().parse::<Distribution>().unwrap(), d);
    }
}
