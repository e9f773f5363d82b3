use std::fmt;

use crate::inference::Aggregate;

/// Everything computed for a single pixel.
#[derive(Debug)]
pub struct Outputs {
    value: Option<f64>,
    aggregate: Aggregate,
    universe: Vec<f64>,
}

impl Outputs {
    pub(crate) fn new(value: Option<f64>, aggregate: Aggregate, universe: Vec<f64>) -> Self {
        Self {
            value,
            aggregate,
            universe,
        }
    }

    /// Defuzzified value, `None` if the pixel has no defined output.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn antecedents(&self) -> &[f64] {
        self.aggregate.antecedents()
    }

    pub fn max_antecedent(&self) -> f64 {
        self.aggregate.max_antecedent()
    }

    /// The aggregated output membership as `(universe value, membership)` pairs.
    pub fn aggregate(&self) -> Vec<(f64, f64)> {
        self.universe
            .iter()
            .copied()
            .zip(self.aggregate.values().iter().copied())
            .collect()
    }
}

impl fmt::Display for Outputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rule\tstrength")?;
        for (i, a) in self.antecedents().iter().enumerate() {
            writeln!(f, "{i}\t{a:.6}")?;
        }

        writeln!(f, "value\tmembership")?;
        for (u, m) in self.aggregate() {
            writeln!(f, "{u:.6}\t{m:.6}")?;
        }

        match self.value {
            Some(value) => write!(f, "result\t{value:.6}"),
            None => write!(f, "result\tno data"),
        }
    }
}
