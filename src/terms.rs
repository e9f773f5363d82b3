use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, E};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Which flanks of the membership function exist.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Side {
    /// Rising and falling flank, four inflection points
    Both,
    /// Rising flank only: zero below `p0`, full height above `p1`
    Left,
    /// Falling flank only: full height below `p0`, zero above `p1`
    Right,
}

impl Side {
    pub fn n_points(self) -> usize {
        match self {
            Side::Both => 4,
            Side::Left | Side::Right => 2,
        }
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "both" => Ok(Side::Both),
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            other => Err(Error::Parse(format!("unknown side `{other}`"))),
        }
    }
}

/// Shape of the flanks between two inflection points.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Shape {
    Linear,
    SShaped,
    JShaped,
    GShaped,
}

impl Shape {
    /// Maps a normalized ramp position `t` in [0, 1] onto the flank.
    pub fn transform(self, t: f64, modifier: f64) -> f64 {
        match self {
            Shape::Linear => t,
            Shape::JShaped => {
                let m = if modifier < 0. {
                    2f64.powf(1. + modifier)
                } else {
                    2f64.powf(E.powf(2. * modifier))
                };

                (t * FRAC_PI_4).tan().powf(m)
            },
            Shape::GShaped => {
                let m = if modifier > 0. {
                    2f64.powf(1. - modifier)
                } else {
                    2f64.powf(E.powf(-2. * modifier))
                };

                (t * FRAC_PI_4).tan().powf(1. / m)
            },
            Shape::SShaped => {
                let m = 2f64.powf(E.powf(2. * modifier.abs()));

                if modifier < 0. {
                    1. - (t * FRAC_PI_2).cos().powf(m)
                } else {
                    (t * FRAC_PI_2).sin().powf(m)
                }
            },
        }
    }
}

impl FromStr for Shape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "l" => Ok(Shape::Linear),
            "sshaped" | "s" => Ok(Shape::SShaped),
            "jshaped" | "j" => Ok(Shape::JShaped),
            "gshaped" | "g" => Ok(Shape::GShaped),
            _ => Err(Error::InvalidShape(s.trim().to_owned())),
        }
    }
}

/// A named membership function of a variable.
#[derive(Clone, Debug)]
pub struct FuzzySet {
    name: String,
    side: Side,
    shape: Shape,
    modifier: f64,
    height: f64,
    points: [f64; 4],
    hedge: i32,
}

impl FuzzySet {
    /// `points` must hold 2 values for one-sided sets and 4 for two-sided ones,
    /// in non-decreasing order.
    pub fn new(
        name: impl Into<String>,
        side: Side,
        shape: Shape,
        modifier: f64,
        height: f64,
        points: &[f64],
    ) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: String| Error::InvalidSet {
            name: name.clone(),
            reason,
        };

        if points.len() != side.n_points() {
            return Err(invalid(format!(
                "{:?} set needs {} points, got {}",
                side,
                side.n_points(),
                points.len()
            )));
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err(invalid("points must be finite".into()));
        }
        if points.windows(2).any(|w| w[0] > w[1]) {
            return Err(invalid(format!("points {points:?} are not in ascending order")));
        }
        if !(-1. ..=1.).contains(&modifier) {
            return Err(invalid(format!("shape modifier {modifier} is outside [-1, 1]")));
        }
        if !(0. ..=1.).contains(&height) {
            return Err(Error::OutOfRangeMembership(height));
        }

        let mut p = [0.; 4];
        p[..points.len()].copy_from_slice(points);

        Ok(Self {
            name,
            side,
            shape,
            modifier,
            height,
            points: p,
            hedge: 0,
        })
    }

    /// Positive hedges concentrate the set ("very"), negative ones dilate it ("somewhat").
    pub fn with_hedge(mut self, hedge: i32) -> Self {
        self.hedge = hedge;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn points(&self) -> &[f64] {
        &self.points[..self.side.n_points()]
    }

    /// Lowest value with non-zero membership, used to span the output universe.
    pub fn lower_bound(&self) -> f64 {
        self.points[0]
    }

    /// Highest inflection point, used to span the output universe.
    pub fn upper_bound(&self) -> f64 {
        self.points[self.side.n_points() - 1]
    }

    /// Degree to which `x` belongs to this set, in `[0, height]`.
    pub fn membership(&self, x: f64) -> f64 {
        let [p0, p1, p2, p3] = self.points;

        let t = match self.side {
            Side::Both => {
                if x <= p0 || x >= p3 {
                    return 0.;
                }
                if (p1..=p2).contains(&x) {
                    return self.height;
                }
                if x < p1 {
                    (x - p0) / (p1 - p0)
                } else {
                    (p3 - x) / (p3 - p2)
                }
            },
            Side::Left => {
                if x <= p0 {
                    return 0.;
                }
                if x >= p1 {
                    return self.height;
                }
                (x - p0) / (p1 - p0)
            },
            Side::Right => {
                if x <= p0 {
                    return self.height;
                }
                if x >= p1 {
                    return 0.;
                }
                (p1 - x) / (p1 - p0)
            },
        };

        let mut value = self.shape.transform(t, self.modifier).clamp(0., 1.);

        if self.hedge != 0 {
            value = value.powf(2f64.powi(self.hedge));
        }

        value * self.height
    }
}

#[cfg(test)]
fn trapezoid(points: &[f64]) -> FuzzySet {
    FuzzySet::new("t", Side::Both, Shape::Linear, 0., 1., points).unwrap()
}

#[test]
fn test_two_sided_linear() {
    let set = trapezoid(&[0., 10., 30., 50.]);

    assert_eq!(set.membership(-5.), 0.);
    assert_eq!(set.membership(0.), 0.);
    assert_eq!(set.membership(5.), 0.5);
    assert_eq!(set.membership(10.), 1.);
    assert_eq!(set.membership(20.), 1.);
    assert_eq!(set.membership(40.), 0.5);
    assert_eq!(set.membership(50.), 0.);
    assert_eq!(set.membership(70.), 0.);
}

#[test]
fn test_one_sided() {
    let left = FuzzySet::new("l", Side::Left, Shape::Linear, 0., 0.8, &[0., 10.]).unwrap();
    let right = FuzzySet::new("r", Side::Right, Shape::Linear, 0., 1., &[0., 10.]).unwrap();

    assert_eq!(left.membership(-1.), 0.);
    assert!((left.membership(5.) - 0.4).abs() < 1e-12);
    assert_eq!(left.membership(15.), 0.8);
    assert_eq!(right.membership(-1.), 1.);
    assert_eq!(right.membership(2.5), 0.75);
    assert_eq!(right.membership(10.), 0.);
}

#[test]
fn test_shapes_bend_the_ramp() {
    let linear = trapezoid(&[0., 10., 10., 20.]).membership(5.);
    let s = FuzzySet::new("s", Side::Both, Shape::SShaped, 0., 1., &[0., 10., 10., 20.]).unwrap();
    let j = FuzzySet::new("j", Side::Both, Shape::JShaped, 0., 1., &[0., 10., 10., 20.]).unwrap();
    let g = FuzzySet::new("g", Side::Both, Shape::GShaped, 0., 1., &[0., 10., 10., 20.]).unwrap();

    // sin(pi/4)^2
    assert!((s.membership(5.) - 0.5).abs() < 1e-12);
    assert!(j.membership(5.) < linear);
    assert!(g.membership(5.) > linear);
}

#[test]
fn test_hedge() {
    let plain = trapezoid(&[0., 10., 30., 50.]);
    let very = plain.clone().with_hedge(1);
    let somewhat = plain.clone().with_hedge(-1);

    assert!((very.membership(5.) - 0.25).abs() < 1e-12);
    assert!((somewhat.membership(5.) - 0.5f64.sqrt()).abs() < 1e-12);
    assert_eq!(very.membership(20.), 1.);
}

#[test]
fn test_invalid_sets() {
    assert!(matches!(
        FuzzySet::new("x", Side::Both, Shape::Linear, 0., 1., &[0., 5., 3., 9.]),
        Err(Error::InvalidSet { .. })
    ));
    assert!(matches!(
        FuzzySet::new("x", Side::Left, Shape::Linear, 0., 1., &[0., 5., 3., 9.]),
        Err(Error::InvalidSet { .. })
    ));
    assert!(matches!(
        FuzzySet::new("x", Side::Left, Shape::Linear, 0., 1.5, &[0., 5.]),
        Err(Error::OutOfRangeMembership(_))
    ));
    assert!(matches!("wavy".parse::<Shape>(), Err(Error::InvalidShape(_))));
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    fn shape() -> impl Strategy<Value = Shape> {
        prop_oneof![
            Just(Shape::Linear),
            Just(Shape::SShaped),
            Just(Shape::JShaped),
            Just(Shape::GShaped)
        ]
    }

    fn side() -> impl Strategy<Value = Side> {
        prop_oneof![Just(Side::Both), Just(Side::Left), Just(Side::Right)]
    }

    /// Sorted positions spread over `[lo, hi]`
    fn spread(fractions: &[f64], lo: f64, hi: f64) -> Vec<f64> {
        let mut xs: Vec<f64> = fractions.iter().map(|f| lo + f * (hi - lo)).collect();
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        xs
    }

    proptest! {
        /// Property: membership never leaves [0, height] and follows the flanks monotonically
        #[test]
        fn prop_membership_bounded_and_monotone(
            side in side(),
            mut points in proptest::collection::vec(-100.0f64..100.0, 4),
            shape in shape(),
            modifier in -1.0f64..=1.0,
            height in 0.0f64..=1.0,
            xs in proptest::collection::vec(0.0f64..1.0, 8),
        ) {
            points.truncate(side.n_points());
            points.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let set = FuzzySet::new("p", side, shape, modifier, height, &points).unwrap();

            for x in spread(&xs, -120., 120.) {
                let m = set.membership(x);
                prop_assert!((0. ..=height).contains(&m), "membership {} at {} exceeds {}", m, x, height);
            }

            let (rising, falling) = match side {
                Side::Both => (Some((points[0], points[1])), Some((points[2], points[3]))),
                Side::Left => (Some((points[0], points[1])), None),
                Side::Right => (None, Some((points[0], points[1]))),
            };

            if let Some((lo, hi)) = rising {
                for w in spread(&xs, lo, hi).windows(2) {
                    prop_assert!(set.membership(w[0]) <= set.membership(w[1]) + 1e-12);
                }
            }
            if let Some((lo, hi)) = falling {
                for w in spread(&xs, lo, hi).windows(2) {
                    prop_assert!(set.membership(w[0]) + 1e-12 >= set.membership(w[1]));
                }
            }
        }
    }
}
