use std::mem;

use crate::dsl::{Operand, Token};
use crate::error::{Error, Result};
use crate::inputs::Inputs;
use crate::ops::LogicFamily;
use crate::variable::Variables;

/// A compiled rule: premise token stream, its operands and the output set it fires.
#[derive(Clone, Debug)]
pub struct Rule {
    pub(crate) index: usize,
    pub(crate) output_set: usize,
    pub(crate) work_stack: Vec<Token>,
    pub(crate) value_stack: Vec<Operand>,
    pub(crate) weight: f64,
    pub(crate) text: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Operator {
    Start,
    LParen { negate: bool },
    Or,
    And,
}

impl Operator {
    fn precedence(self) -> u8 {
        match self {
            Operator::Start | Operator::LParen { .. } => 0,
            Operator::Or => 1,
            Operator::And => 2,
        }
    }
}

impl Rule {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn output_set(&self) -> usize {
        self.output_set
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Firing strength of the premise for the current pixel.
    ///
    /// Walks the token stream with an operand stack and an operator stack,
    /// shifting operators of strictly higher precedence and reducing otherwise.
    pub fn evaluate(&self, family: LogicFamily, variables: &Variables, inputs: &Inputs) -> Result<f64> {
        let mut operands: Vec<f64> = Vec::with_capacity(self.value_stack.len());
        let mut operators = vec![Operator::Start];
        let mut negate_group = false;
        let mut tokens = self.work_stack.iter().copied();

        if tokens.next() != Some(Token::Start) {
            return Err(Error::malformed(self.index, "token stream does not begin with START"));
        }

        for token in tokens {
            if negate_group && token != Token::LParen {
                return Err(Error::malformed(self.index, "NOT is not followed by `(`"));
            }

            match token {
                Token::Value(i) => {
                    let operand = self
                        .value_stack
                        .get(i)
                        .ok_or_else(|| Error::malformed(self.index, format!("operand {i} does not exist")))?;
                    let set = variables
                        .get(operand.var)
                        .and_then(|var| var.sets().get(operand.set))
                        .ok_or_else(|| Error::malformed(self.index, "operand is not bound to a set"))?;
                    let x = inputs
                        .get(operand.var)
                        .ok_or_else(|| Error::malformed(self.index, format!("no value for map of `{}`", set.name())))?;
                    let membership = set.membership(x);

                    operands.push(if operand.negate {
                        family.not(membership)?
                    } else {
                        membership
                    });
                },
                Token::And | Token::Or => {
                    let incoming = if token == Token::And {
                        Operator::And
                    } else {
                        Operator::Or
                    };

                    loop {
                        let top = *operators
                            .last()
                            .ok_or_else(|| Error::malformed(self.index, "operator stack is empty"))?;

                        if incoming.precedence() > top.precedence() {
                            operators.push(incoming);
                            break;
                        }

                        self.reduce(family, &mut operators, &mut operands)?;
                    }
                },
                Token::Not => negate_group = true,
                Token::LParen => operators.push(Operator::LParen {
                    negate: mem::take(&mut negate_group),
                }),
                Token::RParen => loop {
                    match operators.last().copied() {
                        Some(Operator::And | Operator::Or) => self.reduce(family, &mut operators, &mut operands)?,
                        Some(Operator::LParen { negate }) => {
                            operators.pop();

                            if negate {
                                let value = operands.pop().ok_or(Error::StackUnderflow { rule: self.index })?;
                                operands.push(family.not(value)?);
                            }
                            break;
                        },
                        _ => return Err(Error::malformed(self.index, "unbalanced `)`")),
                    }
                },
                Token::Stop => {
                    while matches!(operators.last(), Some(Operator::And | Operator::Or)) {
                        self.reduce(family, &mut operators, &mut operands)?;
                    }

                    if operators != [Operator::Start] {
                        return Err(Error::malformed(self.index, "unclosed `(`"));
                    }

                    return match operands[..] {
                        [value] => Ok(value),
                        _ => Err(Error::malformed(
                            self.index,
                            format!("{} values left on the operand stack", operands.len()),
                        )),
                    };
                },
                Token::Start | Token::Is => {
                    return Err(Error::malformed(self.index, format!("unexpected {token:?} token")));
                },
            }
        }

        Err(Error::malformed(self.index, "token stream does not end with STOP"))
    }

    fn reduce(&self, family: LogicFamily, operators: &mut Vec<Operator>, operands: &mut Vec<f64>) -> Result<()> {
        let op = operators.pop();
        let underflow = || Error::StackUnderflow { rule: self.index };
        let y = operands.pop().ok_or_else(underflow)?;
        let x = operands.pop().ok_or_else(underflow)?;

        operands.push(match op {
            Some(Operator::And) => family.and(x, y),
            Some(Operator::Or) => family.or(x, y),
            _ => return Err(Error::malformed(self.index, "reduced a non-binary operator")),
        });

        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Rules(pub(crate) Vec<Rule>);

impl Rules {
    pub fn new() -> Self {
        Rules(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Rules(Vec::with_capacity(capacity))
    }

    pub fn add(&mut self, rule: Rule) {
        self.0.push(rule);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'r> IntoIterator for &'r Rules {
    type Item = &'r Rule;
    type IntoIter = std::slice::Iter<'r, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
use crate::dsl::{compile, test_variables};

#[cfg(test)]
fn strength(text: &str, dem: f64, slope: f64, family: LogicFamily) -> f64 {
    let vars = test_variables();
    let rule = compile(text, 0, &vars).unwrap();
    let mut inputs = Inputs::new();

    inputs.add(vars.key("dem").unwrap(), dem);
    inputs.add(vars.key("slope").unwrap(), slope);

    rule.evaluate(family, &vars, &inputs).unwrap()
}

#[test]
fn test_boolean_round_trip() {
    // dem=low is 1 at 0 and 0 at 1000; slope=flat is 1 at 0 and 0 at 50
    let cases = [(0., 0., true, true), (0., 50., true, false), (1000., 0., false, true), (1000., 50., false, false)];

    for (dem, slope, a, b) in cases {
        let expect = |v: bool| if v { 1. } else { 0. };
        let zadeh = LogicFamily::Zadeh;

        assert_eq!(strength("{dem = low & slope = flat} = high", dem, slope, zadeh), expect(a && b));
        assert_eq!(strength("{dem = low | slope = flat} = high", dem, slope, zadeh), expect(a || b));
        assert_eq!(strength("{~dem = low & slope = flat} = high", dem, slope, zadeh), expect(!a && b));
        assert_eq!(
            strength("{~(dem = low | slope = flat)} = high", dem, slope, zadeh),
            expect(!(a || b))
        );
        assert_eq!(
            strength("{dem = low | dem = high & slope = flat} = high", dem, slope, zadeh),
            expect(a || (!a && b))
        );
    }
}

#[test]
fn test_precedence_and_grouping() {
    // dem=low = 0.8, dem=high = 0, slope=flat = 0.25, slope=steep = 0.1
    let (dem, slope) = (100., 7.5);
    let family = LogicFamily::Product;

    let flat_or = strength("{dem = low | dem = high & slope = flat} = high", dem, slope, family);
    let grouped = strength("{(dem = low | dem = high) & slope = flat} = high", dem, slope, family);
    let chained = strength("{dem = low & slope = flat & slope = steep} = high", dem, slope, family);

    assert!((flat_or - 0.8).abs() < 1e-12);
    assert!((grouped - 0.2).abs() < 1e-12);
    assert!((chained - 0.02).abs() < 1e-12);
}

#[test]
fn test_malformed_streams() {
    let vars = test_variables();
    let mut rule = compile("{dem = low & slope = flat} = high", 4, &vars).unwrap();
    let mut inputs = Inputs::new();

    inputs.add(vars.key("dem").unwrap(), 0.);
    inputs.add(vars.key("slope").unwrap(), 0.);

    let zadeh = LogicFamily::Zadeh;

    rule.work_stack = vec![Token::Start, Token::Value(0), Token::And, Token::Stop];
    assert!(matches!(rule.evaluate(zadeh, &vars, &inputs), Err(Error::StackUnderflow { rule: 4 })));

    rule.work_stack = vec![Token::Start, Token::Value(0), Token::Value(1), Token::Stop];
    assert!(matches!(rule.evaluate(zadeh, &vars, &inputs), Err(Error::MalformedRule { rule: 4, .. })));

    rule.work_stack = vec![Token::Start, Token::LParen, Token::Value(0), Token::Stop];
    assert!(matches!(rule.evaluate(zadeh, &vars, &inputs), Err(Error::MalformedRule { .. })));

    rule.work_stack = vec![Token::Start, Token::Value(0), Token::RParen, Token::Stop];
    assert!(matches!(rule.evaluate(zadeh, &vars, &inputs), Err(Error::MalformedRule { .. })));

    rule.work_stack = vec![Token::Start, Token::Value(0)];
    assert!(matches!(rule.evaluate(zadeh, &vars, &inputs), Err(Error::MalformedRule { .. })));
}
