//! Fuzzy rule inference over raster maps.
//!
//! Input maps are described by fuzzy sets, rules combine them with a chosen
//! logic family and every pixel is defuzzified into a crisp output value.

mod config;
mod dsl;
mod error;
mod inference;
mod inputs;
mod linspace;
mod loader;
mod ops;
mod outputs;
pub mod raster;
mod rules;
mod terms;
mod variable;

pub use config::{Config, DEFAULT_RESOLUTION};
pub use dsl::compile;
pub use error::{Error, Result};
pub use inference::{Aggregate, Model};
pub use inputs::Inputs;
pub use loader::{load_rules, load_variables, parse_rules, parse_variables, OUTPUT_MAP};
pub use ops::{Defuzzification, ImplicationOp, LogicFamily};
pub use outputs::Outputs;
pub use rules::{Rule, Rules};
pub use terms::{FuzzySet, Shape, Side};
pub use variable::{Variable, VariableKey, Variables};
