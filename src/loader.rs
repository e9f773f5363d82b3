//! Readers for the map definition file and the rule file.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::dsl::compile;
use crate::error::{Error, Result};
use crate::rules::Rules;
use crate::terms::{FuzzySet, Shape, Side};
use crate::variable::{VariableKey, Variables};

/// Name of the section holding the output sets.
pub const OUTPUT_MAP: &str = "_OUTPUT_";

fn strip_comment(line: &str) -> &str {
    line.split_once('#').map_or(line, |(content, _)| content)
}

fn parse_number<T: std::str::FromStr>(field: &str, what: &str) -> Result<T> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::Parse(format!("invalid {what} `{}`", field.trim())))
}

/// Parses `name {side; shape; modifier; height; p0, p1[, p2, p3][; hedge]}`.
fn parse_set(def: &str) -> Result<FuzzySet> {
    let (name, body) = def
        .split_once('{')
        .ok_or_else(|| Error::Parse("expected `{` after the set name".into()))?;
    let name = name.trim();

    if name.is_empty() {
        return Err(Error::Parse("missing set name".into()));
    }

    let body = body
        .trim_end()
        .strip_suffix('}')
        .ok_or_else(|| Error::Parse(format!("set `{name}` is missing its closing `}}`")))?;
    let fields: Vec<&str> = body.split(';').map(str::trim).collect();

    if !(5..=6).contains(&fields.len()) {
        return Err(Error::Parse(format!(
            "set `{name}` has {} fields, expected side; shape; modifier; height; points[; hedge]",
            fields.len()
        )));
    }

    let side: Side = fields[0].parse()?;
    let shape: Shape = fields[1].parse()?;
    let modifier = parse_number(fields[2], "shape modifier")?;
    let height = parse_number(fields[3], "height")?;
    let points = fields[4]
        .split(',')
        .map(|p| parse_number(p, "inflection point"))
        .collect::<Result<Vec<f64>>>()?;
    let hedge = match fields.get(5) {
        Some(field) => parse_number(field, "hedge")?,
        None => 0,
    };

    Ok(FuzzySet::new(name, side, shape, modifier, height, &points)?.with_hedge(hedge))
}

/// Parses a map definition file. `origin` only labels error messages.
pub fn parse_variables(text: &str, origin: &Path) -> Result<Variables> {
    let mut vars = Variables::new();
    let mut current: Option<VariableKey> = None;
    let mut declared = Vec::new();
    let mut lines = text.lines().enumerate().map(|(i, line)| (i + 1, line));

    for (line, raw) in lines.by_ref() {
        let content = strip_comment(raw).trim();

        if content.is_empty() {
            continue;
        }

        if let Some(name) = content.strip_prefix('%') {
            let name = name.trim();

            if name.is_empty() {
                break;
            }

            let key = vars.add(name, name == OUTPUT_MAP).map_err(|e| e.at(origin, line))?;

            current = Some(key);
            declared.push((key, line));
        } else if let Some(def) = content.strip_prefix('$') {
            let key = current.ok_or_else(|| {
                Error::Parse("fuzzy set defined before any `%map`".into()).at(origin, line)
            })?;
            let set = parse_set(def).map_err(|e| e.at(origin, line))?;

            debug!(map = vars[key].name(), set = set.name(), "loaded fuzzy set");
            vars.add_set(key, set).map_err(|e| e.at(origin, line))?;
        } else {
            return Err(Error::Parse("expected `%map` or `$set`".into()).at(origin, line));
        }
    }

    if let Some((line, _)) = lines.find(|(_, raw)| !strip_comment(raw).trim().is_empty()) {
        warn!(file = %origin.display(), line, "ignoring content after the closing `%`");
    }

    for (key, line) in declared {
        if vars[key].sets().is_empty() {
            return Err(Error::Parse(format!("map `{}` defines no fuzzy sets", vars[key].name())).at(origin, line));
        }
    }

    if vars.output().is_none() {
        return Err(Error::Config(format!("{} defines no `%{OUTPUT_MAP}` map", origin.display())));
    }

    Ok(vars)
}

/// Compiles every rule of a rule file against `variables`.
pub fn parse_rules(text: &str, origin: &Path, variables: &Variables) -> Result<Rules> {
    let mut rules = Rules::new();

    for (i, raw) in text.lines().enumerate() {
        if strip_comment(raw).trim().is_empty() {
            continue;
        }

        let rule = compile(raw, rules.len(), variables).map_err(|e| e.at(origin, i + 1))?;

        rules.add(rule);
    }

    if rules.is_empty() {
        return Err(Error::Config(format!("{} defines no rules", origin.display())));
    }

    Ok(rules)
}

pub fn load_variables(path: impl AsRef<Path>) -> Result<Variables> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;

    parse_variables(&text, path)
}

pub fn load_rules(path: impl AsRef<Path>, variables: &Variables) -> Result<Rules> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;

    parse_rules(&text, path, variables)
}

#[cfg(test)]
const MAPS: &str = "\
# terrain suitability
%dem
$low  {right; linear; 0; 1; 0, 500}
$high {left; sshaped; 0.5; 1; 300, 800; 1}   # very high

%slope
$flat {right; linear; 0; 1; 0, 10}

%_OUTPUT_
$poor {both; linear; 0; 1; 0, 10, 30, 50}
$good {both; jshaped; -0.5; 0.9; 50, 70, 90, 100}
%
this line is ignored
";

#[test]
fn test_parse_variables() {
    let vars = parse_variables(MAPS, Path::new("maps.txt")).unwrap();

    assert_eq!(vars.len(), 3);
    assert_eq!(vars.inputs().count(), 2);

    let dem = &vars[vars.key("dem").unwrap()];

    assert_eq!(dem.sets().len(), 2);
    assert_eq!(dem.sets()[1].points(), &[300., 800.]);

    let output = vars.output_variable().unwrap();

    assert_eq!(output.name(), OUTPUT_MAP);
    assert_eq!(output.sets()[1].height(), 0.9);
    assert_eq!(vars.universe(100).unwrap()[100], 100.);
}

#[test]
fn test_variable_file_errors() {
    let origin = Path::new("maps.txt");
    let err = |text: &str| parse_variables(text, origin).unwrap_err();

    assert!(matches!(err("$low {right; linear; 0; 1; 0, 1}\n"), Error::Located { line: 1, .. }));
    assert!(matches!(
        err("%dem\n\n$low {right; zigzag; 0; 1; 0, 1}\n"),
        Error::Located { line: 3, source, .. } if matches!(*source, Error::InvalidShape(_))
    ));
    assert!(matches!(
        err("%dem\n$low {both; linear; 0; 1; 0, 1}\n"),
        Error::Located { line: 2, source, .. } if matches!(*source, Error::InvalidSet { .. })
    ));
    assert!(matches!(
        err("%dem\n$low {right; linear; 0; 2; 0, 1}\n"),
        Error::Located { source, .. } if matches!(*source, Error::OutOfRangeMembership(_))
    ));
    assert!(matches!(err("%dem\n%_OUTPUT_\n$a {left; linear; 0; 1; 0, 1}\n"), Error::Located { line: 1, .. }));
    assert!(matches!(err("%dem\n$a {left; linear; 0; 1; 0, 1}\n"), Error::Config(_)));
    assert!(matches!(err("%dem\nlow 1 2\n"), Error::Located { line: 2, .. }));
}

#[test]
fn test_parse_rules() {
    let origin = Path::new("rules.txt");
    let vars = parse_variables(MAPS, origin).unwrap();
    let text = "\
# suitability rules
{dem = low & slope = flat} = good
{dem = high | ~slope = flat} = poor * 0.5  # penalty

";
    let rules = parse_rules(text, origin, &vars).unwrap();

    assert_eq!(rules.len(), 2);
    assert_eq!(rules.iter().nth(1).unwrap().weight(), 0.5);
    assert_eq!(rules.iter().nth(1).unwrap().index(), 1);

    let err = parse_rules("{dem = low} = good\n{dem = wet} = good\n", origin, &vars).unwrap_err();

    assert!(matches!(
        err,
        Error::Located { line: 2, ref source, .. }
            if matches!(**source, Error::UnknownSet { rule: 1, position: 7, .. })
    ));
    assert!(matches!(parse_rules("# nothing\n", origin, &vars), Err(Error::Config(_))));
}

#[test]
fn test_load_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let maps = dir.path().join("maps.txt");
    let rules = dir.path().join("rules.txt");

    fs::write(&maps, MAPS).unwrap();
    fs::write(&rules, "{slope = flat} = good\n").unwrap();

    let vars = load_variables(&maps).unwrap();
    let rules = load_rules(&rules, &vars).unwrap();

    assert_eq!(rules.len(), 1);
    assert!(matches!(load_variables(dir.path().join("missing.txt")), Err(Error::Io(_))));
}
