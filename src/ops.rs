use std::str::FromStr;

use num::Float;

use crate::error::{Error, Result};

/// Family of fuzzy AND / OR / NOT operators used to combine the propositions
/// of a rule premise.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogicFamily {
    #[default]
    Zadeh,
    Product,
    Drastic,
    Lukasiewicz,
    Fodor,
    Hamacher,
}

impl LogicFamily {
    pub const ALL: [LogicFamily; 6] = [
        Self::Zadeh,
        Self::Product,
        Self::Drastic,
        Self::Lukasiewicz,
        Self::Fodor,
        Self::Hamacher,
    ];

    /// t-norm
    pub fn and<F: Float>(self, x: F, y: F) -> F {
        match self {
            Self::Zadeh => F::min(x, y),
            Self::Product => x * y,
            Self::Drastic => {
                if F::max(x, y) == F::one() {
                    F::min(x, y)
                } else {
                    F::zero()
                }
            },
            Self::Lukasiewicz => F::max(x + y - F::one(), F::zero()),
            Self::Fodor => {
                if x + y > F::one() {
                    F::min(x, y)
                } else {
                    F::zero()
                }
            },
            Self::Hamacher => {
                if x == F::zero() && y == F::zero() {
                    F::zero()
                } else {
                    x * y / (x + y - x * y)
                }
            },
        }
    }

    /// t-conorm
    pub fn or<F: Float>(self, x: F, y: F) -> F {
        match self {
            Self::Zadeh => F::max(x, y),
            Self::Product => x + y - x * y,
            Self::Drastic => {
                if F::min(x, y) == F::zero() {
                    F::max(x, y)
                } else {
                    F::one()
                }
            },
            Self::Lukasiewicz => F::min(x + y, F::one()),
            Self::Fodor => {
                if x + y < F::one() {
                    F::max(x, y)
                } else {
                    F::one()
                }
            },
            Self::Hamacher => (x + y) / (F::one() + x * y),
        }
    }

    pub fn not<F: Float>(self, x: F) -> Result<F> {
        let value = match self {
            Self::Hamacher => (F::one() - x) / (F::one() + x),
            _ => F::one() - x,
        };

        if value < F::zero() || value > F::one() || value.is_nan() {
            return Err(Error::OutOfRangeMembership(value.to_f64().unwrap_or(f64::NAN)));
        }

        Ok(value)
    }
}

impl FromStr for LogicFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zadeh" => Ok(Self::Zadeh),
            "product" => Ok(Self::Product),
            "drastic" => Ok(Self::Drastic),
            "lukasiewicz" => Ok(Self::Lukasiewicz),
            "fodor" => Ok(Self::Fodor),
            "hamacher" => Ok(Self::Hamacher),
            other => Err(format!("unknown logic family `{other}`")),
        }
    }
}

/// Implication operator combining a rule's firing strength with its consequent.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ImplicationOp {
    /// Mamdani: clip the consequent
    #[default]
    Min,
    /// Larsen: scale the consequent
    Product,
}

impl ImplicationOp {
    pub fn call<F: Float>(self, antecedent: F, consequent: F) -> F {
        match self {
            Self::Min => F::min(antecedent, consequent),
            Self::Product => antecedent * consequent,
        }
    }
}

impl FromStr for ImplicationOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "min" | "minimum" => Ok(Self::Min),
            "product" | "prod" => Ok(Self::Product),
            other => Err(format!("unknown implication `{other}`")),
        }
    }
}

// Aggregate samples reaching the firing strength within this margin belong to the highest band
const HIGHEST_TOLERANCE: f64 = 1e-9;

/// Method for defuzzificating the aggregated membership function.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Defuzzification {
    /// Center of gravity
    #[default]
    Centroid,
    /// Point splitting the area in half
    Bisector,
    /// Smallest value where the aggregate reaches the highest firing strength
    MinOfHighest,
    /// Largest value where the aggregate reaches the highest firing strength
    MaxOfHighest,
    /// Membership weighted mean of the values reaching the highest firing strength
    MeanOfHighest,
}

impl Defuzzification {
    /// Whether only the strongest rules take part in the aggregation.
    pub fn is_rank_based(self) -> bool {
        matches!(self, Self::MinOfHighest | Self::MaxOfHighest | Self::MeanOfHighest)
    }

    /// Collapses `aggregate`, sampled at `universe`, into one crisp value.
    ///
    /// Returns `None` when the aggregate is empty (all zero).
    pub fn defuzzify(self, aggregate: &[f64], universe: &[f64], max_antecedent: f64) -> Option<f64> {
        debug_assert_eq!(aggregate.len(), universe.len());

        let n = aggregate.len().min(universe.len());
        let (aggregate, universe) = (&aggregate[..n], &universe[..n]);
        let total: f64 = aggregate.iter().sum();

        if n == 0 || total <= 0. {
            return None;
        }

        let threshold = max_antecedent - HIGHEST_TOLERANCE;
        let in_band = |i: &usize| aggregate[*i] > 0. && aggregate[*i] >= threshold;

        let value = match self {
            Self::Centroid => {
                let num: f64 = universe.iter().zip(aggregate).map(|(u, a)| u * a).sum();

                num / total
            },
            Self::Bisector => {
                let half = total / 2.;
                let mut cum = 0f64;
                let i = aggregate
                    .iter()
                    .position(|a| {
                        cum += *a;
                        cum >= half
                    })
                    .unwrap_or(n - 1);

                universe[i]
            },
            Self::MinOfHighest => (0..n).find(in_band).map_or(universe[0], |i| universe[i]),
            Self::MaxOfHighest => (0..n).rev().find(in_band).map_or(universe[n - 1], |i| universe[i]),
            Self::MeanOfHighest => {
                let (num, den) = (0..n)
                    .filter(in_band)
                    .fold((0f64, 0f64), |(num, den), i| (num + universe[i] * aggregate[i], den + aggregate[i]));

                if den > 0. {
                    num / den
                } else {
                    (universe[0] + universe[n - 1]) / 2.
                }
            },
        };

        Some(value)
    }
}

impl FromStr for Defuzzification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "centroid" => Ok(Self::Centroid),
            "bisector" => Ok(Self::Bisector),
            "min-of-highest" => Ok(Self::MinOfHighest),
            "max-of-highest" => Ok(Self::MaxOfHighest),
            "mean-of-highest" => Ok(Self::MeanOfHighest),
            other => Err(format!("unknown defuzzification `{other}`")),
        }
    }
}

#[test]
fn test_identity_laws() {
    for family in [LogicFamily::Zadeh, LogicFamily::Product, LogicFamily::Lukasiewicz] {
        for x in [0., 0.1, 0.25, 0.5, 0.75, 1.] {
            assert!((family.and(x, 1.) - x).abs() < 1e-12, "{family:?} and({x}, 1)");
            assert!((family.or(x, 0.) - x).abs() < 1e-12, "{family:?} or({x}, 0)");
        }
    }
}

#[test]
fn test_family_tables() {
    assert_eq!(LogicFamily::Drastic.and(0.4, 0.7), 0.);
    assert_eq!(LogicFamily::Drastic.and(1., 0.7), 0.7);
    assert_eq!(LogicFamily::Drastic.or(0.4, 0.7), 1.);
    assert_eq!(LogicFamily::Drastic.or(0., 0.7), 0.7);
    assert_eq!(LogicFamily::Fodor.and(0.4, 0.7), 0.4);
    assert_eq!(LogicFamily::Fodor.and(0.2, 0.3), 0.);
    assert_eq!(LogicFamily::Fodor.or(0.2, 0.3), 0.3);
    assert_eq!(LogicFamily::Fodor.or(0.4, 0.7), 1.);
    assert_eq!(LogicFamily::Hamacher.and(0., 0.), 0.);
    assert!((LogicFamily::Hamacher.and(0.5, 0.5) - 1. / 3.).abs() < 1e-12);
    assert!((LogicFamily::Hamacher.or(0.5, 0.5) - 0.8).abs() < 1e-12);
    assert!((LogicFamily::Hamacher.not(0.5).unwrap() - 1. / 3.).abs() < 1e-12);
    assert_eq!(LogicFamily::Product.and(0.5, 0.4), 0.2);
    assert!((LogicFamily::Lukasiewicz.and(0.5, 0.4)).abs() < 1e-12);
}

#[test]
fn test_not_out_of_range() {
    assert!(matches!(LogicFamily::Zadeh.not(1.5), Err(Error::OutOfRangeMembership(_))));
    assert_eq!(LogicFamily::Zadeh.not(0.25).unwrap(), 0.75);
}

#[test]
fn test_defuzzify_empty_aggregate() {
    let universe = [0., 1., 2.];

    for op in [
        Defuzzification::Centroid,
        Defuzzification::Bisector,
        Defuzzification::MinOfHighest,
        Defuzzification::MaxOfHighest,
        Defuzzification::MeanOfHighest,
    ] {
        assert_eq!(op.defuzzify(&[0., 0., 0.], &universe, 0.5), None);
    }
}

#[test]
fn test_defuzzify_strategies() {
    let universe = [0., 1., 2., 3., 4.];
    let aggregate = [0., 0.5, 0.5, 0.25, 0.];

    assert!((Defuzzification::Centroid.defuzzify(&aggregate, &universe, 0.5).unwrap() - 2.25 / 1.25).abs() < 1e-12);
    assert_eq!(Defuzzification::Bisector.defuzzify(&aggregate, &universe, 0.5), Some(2.));
    assert_eq!(Defuzzification::MinOfHighest.defuzzify(&aggregate, &universe, 0.5), Some(1.));
    assert_eq!(Defuzzification::MaxOfHighest.defuzzify(&aggregate, &universe, 0.5), Some(2.));
    assert_eq!(Defuzzification::MeanOfHighest.defuzzify(&aggregate, &universe, 0.5), Some(1.5));
}

#[test]
fn test_highest_band_falls_back_to_universe_bounds() {
    // nothing reaches the firing strength, e.g. a consequent lower than the antecedent
    let universe = [0., 1., 2., 3., 4.];
    let aggregate = [0., 0.2, 0.3, 0.2, 0.];

    assert_eq!(Defuzzification::MinOfHighest.defuzzify(&aggregate, &universe, 0.9), Some(0.));
    assert_eq!(Defuzzification::MaxOfHighest.defuzzify(&aggregate, &universe, 0.9), Some(4.));
    assert_eq!(Defuzzification::MeanOfHighest.defuzzify(&aggregate, &universe, 0.9), Some(2.));

    let edge = [0.9, 0., 0., 0., 0.9];

    assert_eq!(Defuzzification::MinOfHighest.defuzzify(&edge, &universe, 0.9), Some(0.));
    assert_eq!(Defuzzification::MaxOfHighest.defuzzify(&edge, &universe, 0.9), Some(4.));
}

#[test]
fn test_parse_ops() {
    assert_eq!("Lukasiewicz".parse::<LogicFamily>(), Ok(LogicFamily::Lukasiewicz));
    assert_eq!("prod".parse::<ImplicationOp>(), Ok(ImplicationOp::Product));
    assert_eq!("mean_of_highest".parse::<Defuzzification>(), Ok(Defuzzification::MeanOfHighest));
    assert!("median".parse::<Defuzzification>().is_err());
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        /// Property: every t-norm and t-conorm is commutative
        #[test]
        fn prop_commutative(x in 0.0f64..=1.0, y in 0.0f64..=1.0) {
            for family in LogicFamily::ALL {
                prop_assert_eq!(family.and(x, y), family.and(y, x));
                prop_assert_eq!(family.or(x, y), family.or(y, x));
            }
        }

        /// Property: rank-based strategies are ordered for any aggregate with a non-empty highest band
        #[test]
        fn prop_highest_ordering(aggregate in proptest::collection::vec(0.0f64..=1.0, 2..64)) {
            let universe: Vec<f64> = (0..aggregate.len()).map(|i| i as f64 * 0.5).collect();
            let max = aggregate.iter().copied().fold(0., f64::max);
            prop_assume!(max > 0.);

            let min_h = Defuzzification::MinOfHighest.defuzzify(&aggregate, &universe, max).unwrap();
            let mean_h = Defuzzification::MeanOfHighest.defuzzify(&aggregate, &universe, max).unwrap();
            let max_h = Defuzzification::MaxOfHighest.defuzzify(&aggregate, &universe, max).unwrap();

            prop_assert!(min_h <= mean_h + 1e-12);
            prop_assert!(mean_h <= max_h + 1e-12);
        }
    }
}
