//! Row-oriented raster plumbing and the driver running a model over whole maps.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use rayon::prelude::*;
use tracing::{info, trace};

use crate::error::{Error, Result};
use crate::inference::{Aggregate, Model};
use crate::inputs::Inputs;
use crate::variable::VariableKey;

pub const DEFAULT_NODATA: f64 = -9999.;

/// A raster read one row at a time; `None` cells are no-data.
pub trait RowSource {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;
    fn read_row(&mut self, row: usize, buf: &mut [Option<f64>]) -> Result<()>;
}

/// A raster written one row at a time, top to bottom.
pub trait RowSink {
    fn write_row(&mut self, row: &[Option<f64>]) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct GridHeader {
    pub ncols: usize,
    pub nrows: usize,
    pub xll: f64,
    pub yll: f64,
    /// `xllcenter`/`yllcenter` rather than the corner variants
    pub center: bool,
    pub cellsize: f64,
    pub nodata: f64,
}

impl GridHeader {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            ncols,
            nrows,
            xll: 0.,
            yll: 0.,
            center: false,
            cellsize: 1.,
            nodata: DEFAULT_NODATA,
        }
    }
}

/// An ESRI ASCII grid held in memory.
#[derive(Clone, Debug)]
pub struct AsciiGrid {
    header: GridHeader,
    cells: Vec<f64>,
}

impl AsciiGrid {
    pub fn parse(text: &str) -> Result<Self> {
        let mut header = GridHeader::new(0, 0);
        let (mut ncols, mut nrows) = (None, None);
        let mut cells = Vec::new();
        let mut in_header = true;

        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let Some(first) = parts.next() else {
                continue;
            };

            if in_header && first.starts_with(|c: char| c.is_ascii_alphabetic()) {
                let value = parts
                    .next()
                    .ok_or_else(|| Error::Raster(format!("header `{first}` has no value")))?;
                let number = |v: &str| -> Result<f64> {
                    v.parse()
                        .map_err(|_| Error::Raster(format!("invalid value `{v}` for `{first}`")))
                };
                let count = |v: &str| -> Result<usize> {
                    v.parse()
                        .map_err(|_| Error::Raster(format!("`{first}` must be a whole number, got `{v}`")))
                };

                match first.to_ascii_lowercase().as_str() {
                    "ncols" => ncols = Some(count(value)?),
                    "nrows" => nrows = Some(count(value)?),
                    "xllcorner" => header.xll = number(value)?,
                    "yllcorner" => header.yll = number(value)?,
                    "xllcenter" => {
                        header.xll = number(value)?;
                        header.center = true;
                    },
                    "yllcenter" => {
                        header.yll = number(value)?;
                        header.center = true;
                    },
                    "cellsize" => header.cellsize = number(value)?,
                    "nodata_value" => header.nodata = number(value)?,
                    other => return Err(Error::Raster(format!("unknown header `{other}`"))),
                }
                continue;
            }

            in_header = false;
            for token in std::iter::once(first).chain(parts) {
                let value = token
                    .parse::<f64>()
                    .map_err(|_| Error::Raster(format!("invalid cell value `{token}`")))?;
                cells.push(value);
            }
        }

        header.ncols = ncols.ok_or_else(|| Error::Raster("missing `ncols`".into()))?;
        header.nrows = nrows.ok_or_else(|| Error::Raster("missing `nrows`".into()))?;

        if cells.len() != header.ncols * header.nrows {
            return Err(Error::Raster(format!(
                "expected {} cells, found {}",
                header.ncols * header.nrows,
                cells.len()
            )));
        }

        Ok(Self { header, cells })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;

        Self::parse(&text).map_err(|e| match e {
            Error::Raster(msg) => Error::Raster(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.header.nrows || col >= self.header.ncols {
            return None;
        }

        let value = self.cells[row * self.header.ncols + col];

        (value != self.header.nodata && !value.is_nan()).then_some(value)
    }
}

impl RowSource for AsciiGrid {
    fn rows(&self) -> usize {
        self.header.nrows
    }

    fn cols(&self) -> usize {
        self.header.ncols
    }

    fn read_row(&mut self, row: usize, buf: &mut [Option<f64>]) -> Result<()> {
        if row >= self.header.nrows || buf.len() != self.header.ncols {
            return Err(Error::Raster(format!("row {row} is out of range")));
        }

        for (col, cell) in buf.iter_mut().enumerate() {
            *cell = self.get(row, col);
        }

        Ok(())
    }
}

/// Streams rows into an ESRI ASCII grid.
pub struct AsciiGridWriter<W: Write> {
    out: W,
    header: GridHeader,
    written: usize,
    line: String,
}

impl AsciiGridWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, header: GridHeader) -> Result<Self> {
        Self::new(BufWriter::new(File::create(path)?), header)
    }
}

impl<W: Write> AsciiGridWriter<W> {
    pub fn new(mut out: W, header: GridHeader) -> Result<Self> {
        let (x, y) = if header.center {
            ("xllcenter", "yllcenter")
        } else {
            ("xllcorner", "yllcorner")
        };

        writeln!(out, "ncols {}", header.ncols)?;
        writeln!(out, "nrows {}", header.nrows)?;
        writeln!(out, "{x} {}", header.xll)?;
        writeln!(out, "{y} {}", header.yll)?;
        writeln!(out, "cellsize {}", header.cellsize)?;
        writeln!(out, "NODATA_value {}", header.nodata)?;

        Ok(Self {
            out,
            header,
            written: 0,
            line: String::new(),
        })
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RowSink for AsciiGridWriter<W> {
    fn write_row(&mut self, row: &[Option<f64>]) -> Result<()> {
        if row.len() != self.header.ncols || self.written >= self.header.nrows {
            return Err(Error::Raster(format!("row {} does not fit the grid", self.written)));
        }

        self.line.clear();
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                self.line.push(' ');
            }
            // writing into a String cannot fail
            let _ = write!(self.line, "{}", cell.unwrap_or(self.header.nodata));
        }

        writeln!(self.out, "{}", self.line)?;
        self.written += 1;

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.written != self.header.nrows {
            return Err(Error::Raster(format!(
                "wrote {} of {} rows",
                self.written, self.header.nrows
            )));
        }

        self.out.flush()?;

        Ok(())
    }
}

/// A raster kept entirely in memory, usable as source and sink.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryRaster {
    cols: usize,
    cells: Vec<Option<f64>>,
}

impl MemoryRaster {
    pub fn new(cols: usize) -> Self {
        Self {
            cols,
            cells: Vec::new(),
        }
    }

    pub fn from_rows(rows: &[Vec<Option<f64>>]) -> Self {
        let cols = rows.first().map_or(0, Vec::len);

        Self {
            cols,
            cells: rows.iter().flatten().copied().collect(),
        }
    }

    pub fn row(&self, row: usize) -> &[Option<f64>] {
        &self.cells[row * self.cols..(row + 1) * self.cols]
    }
}

impl RowSource for MemoryRaster {
    fn rows(&self) -> usize {
        if self.cols == 0 {
            0
        } else {
            self.cells.len() / self.cols
        }
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn read_row(&mut self, row: usize, buf: &mut [Option<f64>]) -> Result<()> {
        if row >= self.rows() || buf.len() != self.cols {
            return Err(Error::Raster(format!("row {row} is out of range")));
        }

        buf.copy_from_slice(self.row(row));

        Ok(())
    }
}

impl RowSink for MemoryRaster {
    fn write_row(&mut self, row: &[Option<f64>]) -> Result<()> {
        if row.len() != self.cols {
            return Err(Error::Raster(format!("row of {} cells in a {}-column raster", row.len(), self.cols)));
        }

        self.cells.extend_from_slice(row);

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    pub rows: usize,
    pub cols: usize,
    pub no_data: usize,
}

/// Runs `model` over every cell of the input rasters.
///
/// `sources` pairs each input map with its raster; every input map of the
/// model must be present and all rasters must share dimensions. Rows are read
/// and written in order, the cells of a row are evaluated in parallel.
/// `rule_sinks`, if not empty, receives one raster per rule holding its firing strength.
pub fn run<S, W>(
    model: &Model,
    sources: &mut [(VariableKey, S)],
    sink: &mut W,
    rule_sinks: &mut [W],
) -> Result<RunSummary>
where
    S: RowSource,
    W: RowSink,
{
    let variables = model.variables();

    for (key, var) in variables.inputs() {
        if !sources.iter().any(|(k, _)| *k == key) {
            return Err(Error::Raster(format!("no raster given for map `{}`", var.name())));
        }
    }

    let n_rules = model.rules().len();

    if !rule_sinks.is_empty() && rule_sinks.len() != n_rules {
        return Err(Error::Raster(format!(
            "{} rule rasters given for {n_rules} rules",
            rule_sinks.len()
        )));
    }

    let (rows, cols) = match sources.first() {
        Some((_, src)) => (src.rows(), src.cols()),
        None => (0, 0),
    };

    for (key, src) in sources.iter() {
        if (src.rows(), src.cols()) != (rows, cols) {
            return Err(Error::DimensionMismatch {
                name: variables.get(*key).map_or_else(String::new, |v| v.name().to_owned()),
                rows: src.rows(),
                cols: src.cols(),
                expected_rows: rows,
                expected_cols: cols,
            });
        }
    }

    let keys: Vec<VariableKey> = sources.iter().map(|(k, _)| *k).collect();
    let stride = n_rules.max(1);
    let mut in_rows = vec![vec![None; cols]; sources.len()];
    let mut out_row = vec![None; cols];
    let mut strengths = vec![None; cols * stride];
    let mut rule_row = vec![None; cols];
    let mut summary = RunSummary {
        rows,
        cols,
        no_data: 0,
    };

    for row in 0..rows {
        for ((_, src), buf) in sources.iter_mut().zip(in_rows.iter_mut()) {
            src.read_row(row, buf)?;
        }

        let in_rows = &in_rows;
        let keys = &keys;

        out_row
            .par_iter_mut()
            .zip(strengths.par_chunks_mut(stride))
            .enumerate()
            .try_for_each_init(
                || (Inputs::new(), Aggregate::new()),
                |(inputs, agg), (col, (cell, rule_cells))| -> Result<()> {
                    inputs.clear();
                    for (key, values) in keys.iter().zip(in_rows) {
                        inputs.set(*key, values[col]);
                    }

                    *cell = model.infer(inputs, agg)?;

                    let complete = keys.iter().all(|key| inputs.get(*key).is_some());
                    for (dst, strength) in rule_cells.iter_mut().zip(agg.antecedents()) {
                        *dst = complete.then_some(*strength);
                    }

                    Ok(())
                },
            )?;

        summary.no_data += out_row.iter().filter(|cell| cell.is_none()).count();
        sink.write_row(&out_row)?;

        for (r, rule_sink) in rule_sinks.iter_mut().enumerate() {
            for (dst, chunk) in rule_row.iter_mut().zip(strengths.chunks(stride)) {
                *dst = chunk[r];
            }
            rule_sink.write_row(&rule_row)?;
        }

        trace!(row, rows, "row done");
    }

    sink.finish()?;
    for rule_sink in rule_sinks.iter_mut() {
        rule_sink.finish()?;
    }

    info!(rows, cols, no_data = summary.no_data, "inference finished");

    Ok(summary)
}

#[test]
fn test_ascii_grid_round_trip() {
    let text = "\
ncols 3
nrows 2
xllcorner 100.5
yllcorner 200
cellsize 10
NODATA_value -1
1 2 -1
4.5 5 6
";
    let mut grid = AsciiGrid::parse(text).unwrap();
    let mut buf = vec![None; 3];

    grid.read_row(0, &mut buf).unwrap();
    assert_eq!(buf, vec![Some(1.), Some(2.), None]);
    assert_eq!(grid.header().xll, 100.5);

    let mut writer = AsciiGridWriter::new(Vec::new(), grid.header().clone()).unwrap();

    writer.write_row(&buf).unwrap();
    grid.read_row(1, &mut buf).unwrap();
    writer.write_row(&buf).unwrap();
    writer.finish().unwrap();

    let written = String::from_utf8(writer.into_inner()).unwrap();

    assert_eq!(written, text);
}

#[test]
fn test_ascii_grid_errors() {
    assert!(matches!(AsciiGrid::parse("ncols 2\nnrows 2\n1 2 3\n"), Err(Error::Raster(_))));
    assert!(matches!(AsciiGrid::parse("nrows 1\n1\n"), Err(Error::Raster(_))));
    assert!(matches!(AsciiGrid::parse("ncols 1\nnrows 1\nx\n"), Err(Error::Raster(_))));
    assert!(matches!(AsciiGrid::parse("ncols -2\nnrows 1\n1 2\n"), Err(Error::Raster(_))));
    assert!(matches!(AsciiGrid::parse("ncols 2.5\nnrows 1\n1 2\n"), Err(Error::Raster(_))));

    let mut writer = AsciiGridWriter::new(Vec::new(), GridHeader::new(2, 2)).unwrap();

    assert!(writer.write_row(&[Some(1.)]).is_err());
    writer.write_row(&[Some(1.), None]).unwrap();
    assert!(writer.finish().is_err());
}

#[cfg(test)]
fn test_model() -> Model {
    use crate::config::Config;
    use crate::dsl::{compile, test_variables};
    use crate::rules::Rules;

    let vars = test_variables();
    let mut rules = Rules::new();

    rules.add(compile("{dem = low & slope = flat} = low", 0, &vars).unwrap());
    rules.add(compile("{dem = high} = high", 1, &vars).unwrap());

    Model::new(vars, rules, Config::default()).unwrap()
}

#[test]
fn test_run_over_rows() {
    let model = test_model();
    let dem = model.variables().key("dem").unwrap();
    let slope = model.variables().key("slope").unwrap();
    let mut sources = vec![
        (dem, MemoryRaster::from_rows(&[vec![Some(0.), Some(1000.)], vec![None, Some(100.)]])),
        (slope, MemoryRaster::from_rows(&[vec![Some(0.), Some(0.)], vec![Some(0.), Some(50.)]])),
    ];
    let mut sink = MemoryRaster::new(2);
    let mut rule_sinks = vec![MemoryRaster::new(2), MemoryRaster::new(2)];

    let summary = run(&model, &mut sources, &mut sink, &mut rule_sinks).unwrap();

    assert_eq!(summary, RunSummary { rows: 2, cols: 2, no_data: 2 });

    // low rule only: centroid of [0, 10, 30, 50]; high rule only: centroid of [50, 70, 90, 100]
    let low = sink.row(0)[0].unwrap();
    let high = sink.row(0)[1].unwrap();

    assert!(low > 10. && low < 30.);
    assert!(high > 70. && high < 90.);
    // no-data input and no rule firing
    assert_eq!(sink.row(1), &[None, None]);

    assert_eq!(rule_sinks[0].row(0), &[Some(1.), Some(0.)]);
    assert_eq!(rule_sinks[1].row(0), &[Some(0.), Some(1.)]);
    assert_eq!(rule_sinks[0].row(1)[0], None);
    assert_eq!(rule_sinks[0].row(1)[1], Some(0.));
}

#[test]
fn test_run_rejects_bad_inputs() {
    let model = test_model();
    let dem = model.variables().key("dem").unwrap();
    let slope = model.variables().key("slope").unwrap();
    let mut sink = MemoryRaster::new(2);

    let mut missing = vec![(dem, MemoryRaster::from_rows(&[vec![Some(0.), Some(0.)]]))];
    assert!(matches!(run(&model, &mut missing, &mut sink, &mut []), Err(Error::Raster(_))));

    let mut mismatched = vec![
        (dem, MemoryRaster::from_rows(&[vec![Some(0.), Some(0.)]])),
        (slope, MemoryRaster::from_rows(&[vec![Some(0.)]])),
    ];
    assert!(matches!(
        run(&model, &mut mismatched, &mut sink, &mut []),
        Err(Error::DimensionMismatch { .. })
    ));
}
