use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use crate::error::{Error, Result};
use crate::linspace::Linspace;
use crate::terms::FuzzySet;

new_key_type! {
    /// A variable key
    pub struct VariableKey;
}

/// A named map and the fuzzy sets defined over its values.
#[derive(Clone, Debug)]
pub struct Variable {
    name: String,
    sets: Vec<FuzzySet>,
    is_output: bool,
}

impl Variable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sets(&self) -> &[FuzzySet] {
        &self.sets
    }

    pub fn is_output(&self) -> bool {
        self.is_output
    }

    pub fn set_index(&self, name: &str) -> Option<usize> {
        self.sets.iter().position(|set| set.name() == name)
    }

    pub fn add_set(&mut self, set: FuzzySet) -> Result<usize> {
        if self.set_index(set.name()).is_some() {
            return Err(Error::InvalidSet {
                name: set.name().to_owned(),
                reason: format!("defined twice for map `{}`", self.name),
            });
        }

        self.sets.push(set);

        Ok(self.sets.len() - 1)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Variables {
    vars: SlotMap<VariableKey, Variable>,
    by_name: HashMap<String, VariableKey>,
    output: Option<VariableKey>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a map. At most one map may be the output.
    pub fn add(&mut self, name: impl Into<String>, is_output: bool) -> Result<VariableKey> {
        let name = name.into();

        if self.by_name.contains_key(&name) {
            return Err(Error::Config(format!("map `{name}` is defined twice")));
        }
        if is_output && self.output.is_some() {
            return Err(Error::Config(format!("`{name}` is a second output map")));
        }

        let key = self.vars.insert(Variable {
            name: name.clone(),
            sets: Vec::new(),
            is_output,
        });

        self.by_name.insert(name, key);
        if is_output {
            self.output = Some(key);
        }

        Ok(key)
    }

    pub fn add_set(&mut self, key: VariableKey, set: FuzzySet) -> Result<usize> {
        let var = self
            .vars
            .get_mut(key)
            .ok_or_else(|| Error::Config(format!("set `{}` added to an unknown map", set.name())))?;

        var.add_set(set)
    }

    pub fn get(&self, key: VariableKey) -> Option<&Variable> {
        self.vars.get(key)
    }

    pub fn key(&self, name: &str) -> Option<VariableKey> {
        self.by_name.get(name).copied()
    }

    pub fn output(&self) -> Option<VariableKey> {
        self.output
    }

    pub fn output_variable(&self) -> Option<&Variable> {
        self.output.and_then(|key| self.vars.get(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (VariableKey, &Variable)> {
        self.vars.iter()
    }

    /// Every map except the output, i.e. the maps read from rasters.
    pub fn inputs(&self) -> impl Iterator<Item = (VariableKey, &Variable)> {
        self.vars.iter().filter(|(_, var)| !var.is_output)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Samples the output universe at `resolution + 1` points spanning the output sets.
    pub fn universe(&self, resolution: usize) -> Result<Vec<f64>> {
        let output = self
            .output_variable()
            .ok_or_else(|| Error::Config("no output map is defined".into()))?;

        let min_u = output
            .sets
            .iter()
            .map(FuzzySet::lower_bound)
            .fold(f64::INFINITY, f64::min);
        let max_u = output
            .sets
            .iter()
            .map(FuzzySet::upper_bound)
            .fold(f64::NEG_INFINITY, f64::max);

        if !(min_u < max_u) {
            return Err(Error::DegenerateUniverse { min: min_u, max: max_u });
        }

        Ok(Linspace::new(min_u, max_u, resolution + 1).collect())
    }
}

impl std::ops::Index<VariableKey> for Variables {
    type Output = Variable;

    fn index(&self, key: VariableKey) -> &Variable {
        &self.vars[key]
    }
}

#[cfg(test)]
use crate::terms::{Shape, Side};

#[test]
fn test_universe_spans_output_sets() {
    let mut vars = Variables::new();
    let out = vars.add("_OUTPUT_", true).unwrap();

    vars.add_set(out, FuzzySet::new("low", Side::Right, Shape::Linear, 0., 1., &[5., 20.]).unwrap())
        .unwrap();
    vars.add_set(
        out,
        FuzzySet::new("high", Side::Both, Shape::Linear, 0., 1., &[10., 40., 60., 80.]).unwrap(),
    )
    .unwrap();

    let universe = vars.universe(100).unwrap();

    assert_eq!(universe.len(), 101);
    assert_eq!(universe[0], 5.);
    assert_eq!(universe[100], 80.);
    assert!((universe[1] - 5.75).abs() < 1e-12);
}

#[test]
fn test_duplicates_rejected() {
    let mut vars = Variables::new();
    let dem = vars.add("dem", false).unwrap();

    assert!(vars.add("dem", false).is_err());
    assert!(vars.add("_OUTPUT_", true).is_ok());
    assert!(vars.add("other", true).is_err());

    let set = FuzzySet::new("low", Side::Right, Shape::Linear, 0., 1., &[0., 1.]).unwrap();

    vars.add_set(dem, set.clone()).unwrap();
    assert!(vars.add_set(dem, set).is_err());
    assert_eq!(vars.inputs().count(), 1);
    assert_eq!(vars.key("dem"), Some(dem));
}

#[test]
fn test_degenerate_universe() {
    let mut vars = Variables::new();
    let out = vars.add("_OUTPUT_", true).unwrap();

    vars.add_set(out, FuzzySet::new("pt", Side::Left, Shape::Linear, 0., 1., &[3., 3.]).unwrap())
        .unwrap();

    assert!(matches!(vars.universe(10), Err(Error::DegenerateUniverse { .. })));
}
