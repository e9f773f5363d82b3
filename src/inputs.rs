use slotmap::SecondaryMap;

use crate::variable::VariableKey;

/// Crisp values of the input maps at one pixel.
///
/// A missing or NaN entry is the no-data value for that map.
#[derive(Clone, Debug, Default)]
pub struct Inputs(pub(crate) SecondaryMap<VariableKey, f64>);

impl Inputs {
    pub fn new() -> Self {
        Inputs(SecondaryMap::new())
    }

    pub fn add(&mut self, var: VariableKey, val: f64) {
        self.0.insert(var, val);
    }

    /// Sets or clears a value, `None` marking no-data.
    pub fn set(&mut self, var: VariableKey, val: Option<f64>) {
        match val {
            Some(val) => {
                self.0.insert(var, val);
            },
            None => {
                self.0.remove(var);
            },
        }
    }

    pub fn get(&self, var: VariableKey) -> Option<f64> {
        self.0.get(var).copied().filter(|val| !val.is_nan())
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}
