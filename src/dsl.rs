//! Compiler for the rule language.
//!
//! ```text
//! rule := '{' expr '}' '=' outset ['*' weight]
//! expr := term (('&' | '|') term)*
//! term := ['~'] atom
//! atom := mapname '=' setname | '(' expr ')'
//! ```
//!
//! A rule compiles into a flat token stream in infix order, framed by
//! [`Token::Start`] and [`Token::Stop`], plus the table of operands its
//! [`Token::Value`] tokens point into.

use tracing::debug;

use crate::error::{Error, Result};
use crate::rules::Rule;
use crate::variable::{VariableKey, Variables};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Token {
    Start,
    And,
    Or,
    /// Negates the parenthesised group opened by the following `LParen`
    Not,
    /// `map = set`, only seen while lexing
    Is,
    LParen,
    RParen,
    Stop,
    /// Index into the rule's operand table
    Value(usize),
}

/// A `map = set` comparison bound to the model.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Operand {
    pub var: VariableKey,
    pub set: usize,
    pub negate: bool,
}

#[derive(Clone, Debug, PartialEq)]
enum Lexeme {
    Op(Token),
    LBrace,
    RBrace,
    Star,
    Ident(String),
}

fn is_ident_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '{' | '}' | '(' | ')' | '&' | '|' | '~' | '=' | '*' | '#')
}

/// Splits rule text into lexemes tagged with their character position.
fn lex(text: &str) -> Vec<(usize, Lexeme)> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let lexeme = match c {
            '#' => break,
            c if c.is_whitespace() => {
                i += 1;
                continue;
            },
            '{' => Lexeme::LBrace,
            '}' => Lexeme::RBrace,
            '(' => Lexeme::Op(Token::LParen),
            ')' => Lexeme::Op(Token::RParen),
            '&' => Lexeme::Op(Token::And),
            '|' => Lexeme::Op(Token::Or),
            '~' => Lexeme::Op(Token::Not),
            '=' => Lexeme::Op(Token::Is),
            '*' => Lexeme::Star,
            _ => {
                let start = i;

                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                out.push((start, Lexeme::Ident(chars[start..i].iter().collect())));
                continue;
            },
        };

        out.push((i, lexeme));
        i += 1;
    }

    out
}

struct Compiler<'v> {
    rule: usize,
    lexemes: Vec<(usize, Lexeme)>,
    cursor: usize,
    end: usize,
    variables: &'v Variables,
    work_stack: Vec<Token>,
    value_stack: Vec<Operand>,
}

impl<'v> Compiler<'v> {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.cursor).map(|(_, lexeme)| lexeme)
    }

    fn position(&self) -> usize {
        self.lexemes.get(self.cursor).map_or(self.end, |(pos, _)| *pos)
    }

    fn next(&mut self) -> Option<(usize, Lexeme)> {
        let item = self.lexemes.get(self.cursor).cloned();

        if item.is_some() {
            self.cursor += 1;
        }

        item
    }

    fn expect(&mut self, expected: Lexeme, what: &str) -> Result<()> {
        let pos = self.position();

        match self.next() {
            Some((_, lexeme)) if lexeme == expected => Ok(()),
            Some(_) => Err(Error::syntax(self.rule, pos, format!("expected {what}"))),
            None => Err(Error::syntax(self.rule, pos, format!("expected {what}, found end of rule"))),
        }
    }

    fn ident(&mut self, what: &str) -> Result<(usize, String)> {
        let pos = self.position();

        match self.next() {
            Some((pos, Lexeme::Ident(name))) => Ok((pos, name)),
            _ => Err(Error::syntax(self.rule, pos, format!("expected {what}"))),
        }
    }

    fn expr(&mut self) -> Result<()> {
        self.term()?;

        while let Some(Lexeme::Op(op @ (Token::And | Token::Or))) = self.peek() {
            let op = *op;

            self.next();
            self.work_stack.push(op);
            self.term()?;
        }

        Ok(())
    }

    fn term(&mut self) -> Result<()> {
        let negate = self.peek() == Some(&Lexeme::Op(Token::Not));

        if negate {
            self.next();

            if self.peek() == Some(&Lexeme::Op(Token::Not)) {
                return Err(Error::syntax(self.rule, self.position(), "double negation"));
            }
        }

        self.atom(negate)
    }

    fn atom(&mut self, negate: bool) -> Result<()> {
        let pos = self.position();

        match self.peek() {
            Some(Lexeme::Op(Token::LParen)) => {
                self.next();
                if negate {
                    self.work_stack.push(Token::Not);
                }
                self.work_stack.push(Token::LParen);
                self.expr()?;
                self.expect(Lexeme::Op(Token::RParen), "`)`")?;
                self.work_stack.push(Token::RParen);

                Ok(())
            },
            Some(Lexeme::Ident(_)) => {
                let (map_pos, map) = self.ident("a map name")?;
                self.expect(Lexeme::Op(Token::Is), "`=` after map name")?;
                let (set_pos, set) = self.ident("a set name")?;
                let operand = self.bind(map_pos, &map, set_pos, &set, negate)?;

                self.work_stack.push(Token::Value(self.value_stack.len()));
                self.value_stack.push(operand);

                Ok(())
            },
            _ => Err(Error::syntax(self.rule, pos, "expected a map name or `(`")),
        }
    }

    fn bind(&self, map_pos: usize, map: &str, set_pos: usize, set: &str, negate: bool) -> Result<Operand> {
        let var = self.variables.key(map).ok_or_else(|| Error::UnknownMap {
            rule: self.rule,
            position: map_pos,
            name: map.to_owned(),
        })?;
        let variable = &self.variables[var];

        if variable.is_output() {
            return Err(Error::syntax(
                self.rule,
                map_pos,
                format!("output map `{map}` cannot appear in a premise"),
            ));
        }

        let set = variable.set_index(set).ok_or_else(|| Error::UnknownSet {
            rule: self.rule,
            position: set_pos,
            map: map.to_owned(),
            name: set.to_owned(),
        })?;

        Ok(Operand { var, set, negate })
    }

    fn rule(mut self, text: &str) -> Result<Rule> {
        self.expect(Lexeme::LBrace, "`{` opening the premise")?;
        self.work_stack.push(Token::Start);
        self.expr()?;
        self.expect(Lexeme::RBrace, "`}` closing the premise")?;
        self.work_stack.push(Token::Stop);
        self.expect(Lexeme::Op(Token::Is), "`=` before the output set")?;

        let (set_pos, set_name) = self.ident("an output set name")?;
        let output = self
            .variables
            .output_variable()
            .ok_or_else(|| Error::syntax(self.rule, set_pos, "no output map is defined"))?;
        let output_set = output.set_index(&set_name).ok_or_else(|| Error::UnknownSet {
            rule: self.rule,
            position: set_pos,
            map: output.name().to_owned(),
            name: set_name.clone(),
        })?;

        let mut weight = 1.;

        if self.peek() == Some(&Lexeme::Star) {
            self.next();

            let (pos, raw) = self.ident("a weight")?;

            weight = match raw.parse::<f64>() {
                Ok(w) if (0. ..=1.).contains(&w) => w,
                _ => return Err(Error::syntax(self.rule, pos, format!("invalid weight `{raw}`"))),
            };
        }

        if self.peek().is_some() {
            return Err(Error::syntax(self.rule, self.position(), "unexpected text after rule"));
        }

        debug!(rule = self.rule, tokens = ?self.work_stack, "compiled rule");

        Ok(Rule {
            index: self.rule,
            output_set,
            work_stack: self.work_stack,
            value_stack: self.value_stack,
            weight,
            text: text.trim().to_owned(),
        })
    }
}

/// Compiles one rule against the maps and sets of `variables`.
///
/// `index` identifies the rule in error messages.
pub fn compile(text: &str, index: usize, variables: &Variables) -> Result<Rule> {
    let compiler = Compiler {
        rule: index,
        lexemes: lex(text),
        cursor: 0,
        end: text.chars().count(),
        variables,
        work_stack: Vec::new(),
        value_stack: Vec::new(),
    };

    compiler.rule(text)
}

#[cfg(test)]
pub(crate) fn test_variables() -> Variables {
    use crate::terms::{FuzzySet, Shape, Side};

    let mut vars = Variables::new();
    let dem = vars.add("dem", false).unwrap();
    let slope = vars.add("slope", false).unwrap();
    let out = vars.add("_OUTPUT_", true).unwrap();

    for (key, sets) in [
        (dem, [("low", Side::Right, [0., 500.]), ("high", Side::Left, [300., 800.])]),
        (slope, [("flat", Side::Right, [0., 10.]), ("steep", Side::Left, [5., 30.])]),
    ] {
        for (name, side, points) in sets {
            vars.add_set(key, FuzzySet::new(name, side, Shape::Linear, 0., 1., &points).unwrap())
                .unwrap();
        }
    }

    vars.add_set(
        out,
        FuzzySet::new("low", Side::Both, Shape::Linear, 0., 1., &[0., 10., 30., 50.]).unwrap(),
    )
    .unwrap();
    vars.add_set(
        out,
        FuzzySet::new("high", Side::Both, Shape::Linear, 0., 1., &[50., 70., 90., 100.]).unwrap(),
    )
    .unwrap();

    vars
}

#[test]
fn test_compile_token_stream() {
    let vars = test_variables();
    let rule = compile("{dem = low & ~(slope = flat | slope = steep)} = high * 0.5", 0, &vars).unwrap();

    assert_eq!(
        rule.work_stack,
        vec![
            Token::Start,
            Token::Value(0),
            Token::And,
            Token::Not,
            Token::LParen,
            Token::Value(1),
            Token::Or,
            Token::Value(2),
            Token::RParen,
            Token::Stop,
        ]
    );
    assert_eq!(rule.value_stack.len(), 3);
    assert_eq!(rule.value_stack[0].var, vars.key("dem").unwrap());
    assert_eq!(rule.value_stack[2].set, 1);
    assert_eq!(rule.output_set, 1);
    assert_eq!(rule.weight, 0.5);
    assert_eq!(rule.text(), "{dem = low & ~(slope = flat | slope = steep)} = high * 0.5");
}

#[test]
fn test_compile_negated_operand() {
    let vars = test_variables();
    let rule = compile("{~dem=high}=low", 3, &vars).unwrap();

    assert_eq!(rule.work_stack, vec![Token::Start, Token::Value(0), Token::Stop]);
    assert!(rule.value_stack[0].negate);
    assert_eq!(rule.weight, 1.);
    assert_eq!(rule.index, 3);
}

#[test]
fn test_compile_errors() {
    let vars = test_variables();

    assert!(matches!(
        compile("{rain = low} = high", 2, &vars),
        Err(Error::UnknownMap { rule: 2, position: 1, .. })
    ));
    assert!(matches!(
        compile("{dem = medium} = high", 0, &vars),
        Err(Error::UnknownSet { position: 7, .. })
    ));
    assert!(matches!(
        compile("{dem = low} = medium", 0, &vars),
        Err(Error::UnknownSet { position: 14, .. })
    ));
    assert!(matches!(
        compile("{dem = low & } = high", 0, &vars),
        Err(Error::Syntax { position: 13, .. })
    ));
    assert!(matches!(
        compile("{(dem = low} = high", 0, &vars),
        Err(Error::Syntax { position: 11, .. })
    ));
    assert!(matches!(
        compile("{dem = low} = high * -1", 0, &vars),
        Err(Error::Syntax { .. })
    ));
    assert!(matches!(
        compile("{dem = low} = high * 2", 0, &vars),
        Err(Error::Syntax { position: 21, .. })
    ));
    assert!(matches!(
        compile("{_OUTPUT_ = low} = high", 0, &vars),
        Err(Error::Syntax { position: 1, .. })
    ));
    assert!(matches!(
        compile("{~~dem = low} = high", 0, &vars),
        Err(Error::Syntax { position: 2, .. })
    ));
    assert!(matches!(
        compile("{dem = low} = high high", 0, &vars),
        Err(Error::Syntax { position: 19, .. })
    ));
}
