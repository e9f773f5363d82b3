use crate::error::{Error, Result};
use crate::ops::{Defuzzification, ImplicationOp, LogicFamily};

pub const DEFAULT_RESOLUTION: usize = 100;

/// Inference settings chosen once per model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    pub family: LogicFamily,
    pub implication: ImplicationOp,
    pub defuzzification: Defuzzification,
    /// Number of intervals the output universe is split into
    pub resolution: usize,
    /// Scale each firing strength by its rule weight
    pub apply_weights: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            family: LogicFamily::Zadeh,
            implication: ImplicationOp::Min,
            defuzzification: Defuzzification::Centroid,
            resolution: DEFAULT_RESOLUTION,
            apply_weights: false,
        }
    }
}

impl Config {
    pub fn new(family: LogicFamily, implication: ImplicationOp, defuzzification: Defuzzification) -> Self {
        Self {
            family,
            implication,
            defuzzification,
            ..Self::default()
        }
    }

    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_weights(mut self, apply_weights: bool) -> Self {
        self.apply_weights = apply_weights;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.resolution == 0 {
            return Err(Error::Config("resolution must be at least 1".into()));
        }

        Ok(())
    }
}
