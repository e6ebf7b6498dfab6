//! Parameter tables and `.STEP` sweep expansion.

use std::collections::BTreeMap;
use std::fmt;

/// Variable bindings for one sweep point. Empty means "no sweep".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTable {
    values: BTreeMap<String, f64>,
}

impl ParamTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Bind a variable.
    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Iterate bindings in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ParamTable {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl fmt::Display for ParamTable {
    /// Formats as ` R=1000 C=1e-6` (each binding preceded by a space).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            write!(f, " {}={}", name, value)?;
        }
        Ok(())
    }
}

/// How a swept variable's values are generated.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepKind {
    /// `start, start + step, ...` up to and including `stop`
    Linear { start: f64, stop: f64, step: f64 },
    /// Explicit list of values
    List(Vec<f64>),
    /// `points` values per octave, geometric
    Octave { start: f64, stop: f64, points: f64 },
    /// `points` values per decade, geometric
    Decade { start: f64, stop: f64, points: f64 },
}

impl SweepKind {
    /// Expand into the concrete value list.
    pub fn values(&self) -> Vec<f64> {
        match self {
            SweepKind::Linear { start, stop, step } => {
                if *step <= 0.0 || stop < start {
                    return vec![*start];
                }
                // Tolerate floating error on the last point
                let count = ((stop - start) / step + 1e-9).floor() as usize + 1;
                (0..count).map(|n| start + step * n as f64).collect()
            }
            SweepKind::List(values) => values.clone(),
            SweepKind::Octave { start, stop, points } => {
                let count = log_count(points * (stop / start).log2());
                (0..count)
                    .map(|n| start * 2f64.powf(n as f64 / points))
                    .collect()
            }
            SweepKind::Decade { start, stop, points } => {
                let count = log_count(points * (stop / start).log10());
                (0..count)
                    .map(|n| start * 10f64.powf(n as f64 / points))
                    .collect()
            }
        }
    }
}

/// Number of points of a geometric sweep; always at least the start value.
fn log_count(span: f64) -> usize {
    if span.is_finite() && span >= 1.0 {
        span as usize
    } else {
        1
    }
}

/// Build one table per point of the cartesian product of all swept
/// variables. Variables are ordered by name, the first one outermost.
/// No sweeps yields a single empty table. A variable with no values (an
/// empty list) is left unbound, so the result is never empty.
pub fn expand_sweeps(sweeps: &BTreeMap<String, SweepKind>) -> Vec<ParamTable> {
    let mut tables = vec![ParamTable::new()];
    for (name, kind) in sweeps.iter().rev() {
        let values = kind.values();
        if values.is_empty() {
            continue;
        }
        let mut next = Vec::with_capacity(tables.len() * values.len());
        for value in values {
            for table in &tables {
                let mut table = table.clone();
                table.set(name.clone(), value);
                next.push(table);
            }
        }
        tables = next;
    }
    tables
}
