use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::inputs::Inputs;
use crate::outputs::Outputs;
use crate::rules::Rules;
use crate::variable::{VariableKey, Variables};

/// Per-worker scratch space for one pixel: firing strengths and the aggregated
/// output membership sampled over the universe.
#[derive(Clone, Debug, Default)]
pub struct Aggregate {
    pub(crate) antecedents: Vec<f64>,
    pub(crate) values: Vec<f64>,
    pub(crate) max_antecedent: f64,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn antecedents(&self) -> &[f64] {
        &self.antecedents
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn max_antecedent(&self) -> f64 {
        self.max_antecedent
    }

    fn reset(&mut self, n_rules: usize, n_samples: usize) {
        self.antecedents.clear();
        self.antecedents.resize(n_rules, 0.);
        self.values.clear();
        self.values.resize(n_samples, 0.);
        self.max_antecedent = 0.;
    }
}

/// A loaded fuzzy system: maps, compiled rules and the sampled output universe.
///
/// Immutable once built, so one model can be shared across threads.
#[derive(Clone, Debug)]
pub struct Model {
    variables: Variables,
    output: VariableKey,
    rules: Rules,
    universe: Vec<f64>,
    config: Config,
}

impl Model {
    /// Builds the output universe and dry-runs every rule so stack defects
    /// surface here rather than in the middle of a raster.
    pub fn new(variables: Variables, rules: Rules, config: Config) -> Result<Self> {
        config.validate()?;

        let output = variables
            .output()
            .ok_or_else(|| Error::Config("no output map is defined".into()))?;
        let universe = variables.universe(config.resolution)?;
        let mut probe = Inputs::new();

        for (key, var) in variables.inputs() {
            let x = var.sets().first().map_or(0., |set| set.lower_bound());
            probe.add(key, x);
        }

        for rule in &rules {
            rule.evaluate(config.family, &variables, &probe)?;
        }

        info!(
            maps = variables.len(),
            rules = rules.len(),
            min = universe[0],
            max = universe[universe.len() - 1],
            family = ?config.family,
            defuzzification = ?config.defuzzification,
            "fuzzy model loaded"
        );

        Ok(Self {
            variables,
            output,
            rules,
            universe,
            config,
        })
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn universe(&self) -> &[f64] {
        &self.universe
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn has_all_inputs(&self, inputs: &Inputs) -> bool {
        self.variables.inputs().all(|(key, _)| inputs.get(key).is_some())
    }

    /// Firing strength of every rule, scaled by the rule weights when enabled.
    ///
    /// Returns `false` without evaluating anything if an input is no-data.
    pub fn rule_strengths(&self, inputs: &Inputs, agg: &mut Aggregate) -> Result<bool> {
        agg.reset(self.rules.len(), self.universe.len());

        if !self.has_all_inputs(inputs) {
            return Ok(false);
        }

        for (j, rule) in self.rules.iter().enumerate() {
            let mut strength = rule.evaluate(self.config.family, &self.variables, inputs)?;

            if self.config.apply_weights {
                strength *= rule.weight;
            }

            agg.antecedents[j] = strength;
            agg.max_antecedent = f64::max(agg.max_antecedent, strength);
        }

        Ok(true)
    }

    /// Fills `agg` for one pixel. Returns `false` when no output is defined,
    /// i.e. an input is no-data or no rule fired.
    pub fn aggregate(&self, inputs: &Inputs, agg: &mut Aggregate) -> Result<bool> {
        if !self.rule_strengths(inputs, agg)? || agg.max_antecedent <= 0. {
            return Ok(false);
        }

        let output = &self.variables[self.output];
        let rank_based = self.config.defuzzification.is_rank_based();

        for (rule, &antecedent) in self.rules.iter().zip(&agg.antecedents) {
            let skip = if rank_based {
                antecedent != agg.max_antecedent
            } else {
                antecedent <= 0.
            };

            if skip {
                continue;
            }

            let set = &output.sets()[rule.output_set];

            for (value, &u) in agg.values.iter_mut().zip(&self.universe) {
                let implicated = self.config.implication.call(antecedent, set.membership(u));

                *value = f64::max(*value, implicated);
            }
        }

        Ok(true)
    }

    /// Crisp output for one pixel, `None` meaning no-data.
    pub fn infer(&self, inputs: &Inputs, agg: &mut Aggregate) -> Result<Option<f64>> {
        if !self.aggregate(inputs, agg)? {
            return Ok(None);
        }

        Ok(self
            .config
            .defuzzification
            .defuzzify(&agg.values, &self.universe, agg.max_antecedent))
    }

    /// Runs one pixel and keeps every intermediate result.
    pub fn explain(&self, inputs: &Inputs) -> Result<Outputs> {
        let mut agg = Aggregate::new();
        let value = self.infer(inputs, &mut agg)?;

        Ok(Outputs::new(value, agg, self.universe.clone()))
    }
}

#[cfg(test)]
use crate::dsl::{compile, test_variables};
#[cfg(test)]
use crate::ops::{Defuzzification, ImplicationOp, LogicFamily};
#[cfg(test)]
use crate::terms::{FuzzySet, Shape, Side};

#[cfg(test)]
fn model(rules: &[&str], config: Config) -> Model {
    let vars = test_variables();
    let mut compiled = Rules::with_capacity(rules.len());

    for (i, text) in rules.iter().enumerate() {
        compiled.add(compile(text, i, &vars).unwrap());
    }

    Model::new(vars, compiled, config).unwrap()
}

#[cfg(test)]
fn inputs(model: &Model, dem: Option<f64>, slope: Option<f64>) -> Inputs {
    let mut inputs = Inputs::new();

    inputs.set(model.variables().key("dem").unwrap(), dem);
    inputs.set(model.variables().key("slope").unwrap(), slope);
    inputs
}

#[test]
fn test_two_rule_scenario() {
    // dem = 100 gives dem=low 0.8; slope = 7 gives slope=flat 0.3
    let model = model(
        &["{dem = low} = high", "{slope = flat} = low"],
        Config::new(LogicFamily::Zadeh, ImplicationOp::Min, Defuzzification::Centroid),
    );
    let explained = model.explain(&inputs(&model, Some(100.), Some(7.))).unwrap();

    assert!((explained.antecedents()[0] - 0.8).abs() < 1e-12);
    assert!((explained.antecedents()[1] - 0.3).abs() < 1e-12);

    let curve = explained.aggregate();
    let mass = |range: std::ops::Range<f64>| -> f64 {
        curve.iter().filter(|(u, _)| range.contains(u)).map(|(_, m)| m).sum()
    };

    assert!(mass(50. ..100.1) > mass(0. ..50.));
    assert!(curve.iter().all(|(_, m)| *m <= 0.8 + 1e-12));
    assert!(explained.value().unwrap() > 50.);
}

#[test]
fn test_triangle_centroid() {
    let mut vars = Variables::new();
    let x = vars.add("x", false).unwrap();
    let out = vars.add("_OUTPUT_", true).unwrap();

    vars.add_set(x, FuzzySet::new("on", Side::Left, Shape::Linear, 0., 1., &[0., 1.]).unwrap())
        .unwrap();
    vars.add_set(out, FuzzySet::new("pad", Side::Both, Shape::Linear, 0., 1., &[0., 0., 0., 5.]).unwrap())
        .unwrap();
    vars.add_set(
        out,
        FuzzySet::new("peak", Side::Both, Shape::Linear, 0., 1., &[20., 40., 40., 60.]).unwrap(),
    )
    .unwrap();
    vars.add_set(out, FuzzySet::new("far", Side::Left, Shape::Linear, 0., 1., &[95., 100.]).unwrap())
        .unwrap();

    let mut rules = Rules::new();
    rules.add(compile("{x = on} = peak", 0, &vars).unwrap());

    let model = Model::new(vars, rules, Config::default()).unwrap();
    let mut inputs = Inputs::new();
    inputs.add(model.variables().key("x").unwrap(), 2.);

    let step = model.universe()[1] - model.universe()[0];
    let value = model.infer(&inputs, &mut Aggregate::new()).unwrap().unwrap();

    assert!((value - 40.).abs() <= step, "centroid {value} too far from 40");
}

#[test]
fn test_no_data_propagation() {
    let model = model(&["{dem = low & slope = flat} = high"], Config::default());
    let mut agg = Aggregate::new();

    assert_eq!(model.infer(&inputs(&model, None, Some(1.)), &mut agg).unwrap(), None);
    assert_eq!(model.infer(&inputs(&model, Some(1.), Some(f64::NAN)), &mut agg).unwrap(), None);
    // dem=low is 0 above 500, so no rule fires
    assert_eq!(model.infer(&inputs(&model, Some(900.), Some(1.)), &mut agg).unwrap(), None);
    assert!(model.infer(&inputs(&model, Some(100.), Some(1.)), &mut agg).unwrap().is_some());
}

#[test]
fn test_rank_based_uses_strongest_rules_only() {
    let config = Config::new(LogicFamily::Zadeh, ImplicationOp::Min, Defuzzification::MaxOfHighest);
    let model = model(&["{dem = low} = high", "{slope = flat} = low"], config);
    let mut agg = Aggregate::new();

    // slope=flat fires at 1 and wins, so the weaker high-set rule must not move the result
    let value = model.infer(&inputs(&model, Some(100.), Some(0.)), &mut agg).unwrap().unwrap();

    assert_eq!(value, 30.);
    assert!(agg.values().iter().zip(model.universe()).all(|(m, u)| *u <= 50. || *m == 0.));
}

#[test]
fn test_product_implication_and_weights() {
    let config =
        Config::new(LogicFamily::Zadeh, ImplicationOp::Product, Defuzzification::MeanOfHighest).with_weights(true);
    let model = model(&["{dem = low} = high * 0.5"], config);
    let mut agg = Aggregate::new();

    model.infer(&inputs(&model, Some(0.), Some(0.)), &mut agg).unwrap();

    assert_eq!(agg.max_antecedent(), 0.5);
    assert!(agg.values().iter().all(|m| *m <= 0.5));
    assert!(agg.values().iter().any(|m| *m == 0.5));
}

#[test]
fn test_new_rejects_broken_rules() {
    use crate::dsl::Token;

    let vars = test_variables();
    let mut rule = compile("{dem = low & slope = flat} = high", 0, &vars).unwrap();

    // drop the second operand so the AND has nothing to combine
    rule.work_stack = vec![Token::Start, Token::Value(0), Token::And, Token::Stop];

    let mut rules = Rules::new();
    rules.add(rule);

    assert!(matches!(
        Model::new(vars, rules, Config::default()),
        Err(Error::StackUnderflow { rule: 0 })
    ));
}
