//! fuzzy-raster
//!
//! Command-line interface running a fuzzy rule base over ESRI ASCII grids.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use fuzzy_raster::raster::{self, AsciiGrid, AsciiGridWriter, RowSource};
use fuzzy_raster::{
    load_rules, load_variables, Config, Defuzzification, ImplicationOp, Inputs, LogicFamily, Model, VariableKey,
    DEFAULT_RESOLUTION,
};

#[derive(Parser)]
#[command(name = "fuzzy-raster")]
#[command(version)]
#[command(about = "Fuzzy rule inference over raster maps", long_about = None)]
struct Cli {
    /// Map definition file (`%map` sections with `$set` lines)
    #[arg(long, value_name = "FILE")]
    maps: PathBuf,

    /// Rule file, one rule per line
    #[arg(long, value_name = "FILE")]
    rules: PathBuf,

    /// Input grid for a map, repeated once per input map
    #[arg(long = "input", value_name = "NAME=PATH", value_parser = parse_input, required = true)]
    inputs: Vec<(String, PathBuf)>,

    /// Output grid
    #[arg(long, value_name = "PATH", required_unless_present = "probe")]
    output: Option<PathBuf>,

    /// Logic family used for and/or/not
    #[arg(long, default_value = "zadeh")]
    family: LogicFamily,

    /// Implication operator: min or product
    #[arg(long, default_value = "min")]
    implication: ImplicationOp,

    /// centroid, bisector, min-of-highest, max-of-highest or mean-of-highest
    #[arg(long, default_value = "centroid")]
    defuzzification: Defuzzification,

    /// Number of intervals the output universe is sampled with
    #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
    resolution: usize,

    /// Scale firing strengths by the rule weights
    #[arg(long)]
    apply_weights: bool,

    /// Also write one firing strength grid per rule into this directory
    #[arg(long, value_name = "DIR")]
    rule_maps: Option<PathBuf>,

    /// Print the inference details of a single cell and exit
    #[arg(long, value_name = "ROW,COL", value_parser = parse_cell)]
    probe: Option<(usize, usize)>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_input(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.is_empty() => {
            Ok((name.trim().to_owned(), PathBuf::from(path)))
        },
        _ => Err(format!("expected NAME=PATH, got `{s}`")),
    }
}

fn parse_cell(s: &str) -> Result<(usize, usize), String> {
    let (row, col) = s
        .split_once(',')
        .ok_or_else(|| format!("expected ROW,COL, got `{s}`"))?;
    let number = |v: &str| v.trim().parse::<usize>().map_err(|e| format!("`{v}`: {e}"));

    Ok((number(row)?, number(col)?))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        other => bail!("unknown log level `{other}`"),
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    let variables =
        load_variables(&cli.maps).with_context(|| format!("failed to load maps from {}", cli.maps.display()))?;
    let rules = load_rules(&cli.rules, &variables)
        .with_context(|| format!("failed to load rules from {}", cli.rules.display()))?;
    let config = Config::new(cli.family, cli.implication, cli.defuzzification)
        .with_resolution(cli.resolution)
        .with_weights(cli.apply_weights);
    let model = Model::new(variables, rules, config).context("invalid fuzzy model")?;

    let mut sources: Vec<(VariableKey, AsciiGrid)> = Vec::with_capacity(cli.inputs.len());

    for (name, path) in &cli.inputs {
        let key = match model.variables().key(name) {
            Some(key) if !model.variables()[key].is_output() => key,
            _ => bail!("`{name}` is not an input map of {}", cli.maps.display()),
        };
        let grid = AsciiGrid::load(path).with_context(|| format!("failed to read grid {}", path.display()))?;

        info!(map = %name, path = %path.display(), rows = grid.rows(), cols = grid.cols(), "loaded input grid");
        sources.push((key, grid));
    }

    if let Some((row, col)) = cli.probe {
        let mut inputs = Inputs::new();

        for (key, grid) in &sources {
            if row >= grid.rows() || col >= grid.cols() {
                bail!("cell {row},{col} lies outside the {}x{} grid", grid.rows(), grid.cols());
            }
            inputs.set(*key, grid.get(row, col));
        }

        println!("{}", model.explain(&inputs)?);
        return Ok(());
    }

    let Some(output) = &cli.output else {
        bail!("--output is required");
    };
    let Some((_, template)) = sources.first() else {
        bail!("no input grids given");
    };
    let header = template.header().clone();

    let mut sink = AsciiGridWriter::create(output, header.clone())
        .with_context(|| format!("failed to create {}", output.display()))?;
    let mut rule_sinks = Vec::new();

    if let Some(dir) = &cli.rule_maps {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let output_sets = model.variables()[model.variables().output().context("no output map")?].sets();

        for rule in model.rules() {
            let path = dir.join(format!("rule_{}_{}.asc", rule.index() + 1, output_sets[rule.output_set()].name()));

            rule_sinks.push(
                AsciiGridWriter::create(&path, header.clone())
                    .with_context(|| format!("failed to create {}", path.display()))?,
            );
        }
    }

    let summary = raster::run(&model, &mut sources, &mut sink, &mut rule_sinks)
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!(
        output = %output.display(),
        cells = summary.rows * summary.cols,
        no_data = summary.no_data,
        family = ?model.config().family,
        defuzzification = ?model.config().defuzzification,
        "done"
    );

    Ok(())
}
