//! Results output formatting (CSV and tab separated).

use std::io::Write;
use std::str::FromStr;

use crate::circuit::ParamTable;
use crate::error::{NodalError, Result};
use crate::solver::{OperatingPointRun, SimulationResult, TransientRun};

/// Column separator for transient tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Comma separated, `.csv`
    #[default]
    Csv,
    /// Tab separated, `.txt`
    Space,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Space => "txt",
        }
    }

    /// Extension for a result file; operating-point reports are always text.
    pub fn extension_for(&self, result: &SimulationResult) -> &'static str {
        match result {
            SimulationResult::OperatingPoint { .. } => "txt",
            SimulationResult::Transient { .. } => self.extension(),
        }
    }

    fn separator(&self) -> char {
        match self {
            OutputFormat::Csv => ',',
            OutputFormat::Space => '\t',
        }
    }
}

impl FromStr for OutputFormat {
    type Err = NodalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "space" | "tab" | "txt" => Ok(Self::Space),
            _ => Err(NodalError::InvalidSimulationParam {
                message: format!("unknown output format '{}' (expected 'csv' or 'space')", s),
            }),
        }
    }
}

/// Write any analysis result.
pub fn write_result<W: Write>(result: &SimulationResult, format: OutputFormat, writer: &mut W) -> Result<()> {
    match result {
        SimulationResult::OperatingPoint { runs } => write_operating_point(runs, writer),
        SimulationResult::Transient { columns, runs } => write_transient(columns, runs, format, writer),
    }
}

fn write_step_line<W: Write>(step: &ParamTable, run: usize, total: usize, writer: &mut W) -> Result<()> {
    writeln!(writer, "Step Information:{} Run: {}/{}", step, run + 1, total)?;
    Ok(())
}

/// Write transient results.
///
/// Format (CSV):
/// ```csv
/// Time,V(0),V(in),V(out),I(R1),I(V1)
/// Step Information: R=1000 Run: 1/2
/// 0,0,5,2.5,0.0025,-0.0025
/// ```
///
/// The header is written once; a step line precedes each swept run.
pub fn write_transient<W: Write>(
    columns: &[String],
    runs: &[TransientRun],
    format: OutputFormat,
    writer: &mut W,
) -> Result<()> {
    let sep = format.separator();

    write!(writer, "Time")?;
    for column in columns {
        write!(writer, "{}{}", sep, column)?;
    }
    writeln!(writer)?;

    for (i, run) in runs.iter().enumerate() {
        if let Some(step) = &run.step {
            write_step_line(step, i, runs.len(), writer)?;
        }
        for row in &run.rows {
            write!(writer, "{}", row.time)?;
            for value in &row.values {
                write!(writer, "{}{}", sep, value)?;
            }
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Write operating-point reports, one block per run.
///
/// Format:
/// ```text
///     -----Operating Point-----
///
/// V(out)      2.5     node_voltage
/// I(R1)       0.0025      device_current
/// ```
pub fn write_operating_point<W: Write>(runs: &[OperatingPointRun], writer: &mut W) -> Result<()> {
    for (i, run) in runs.iter().enumerate() {
        writeln!(writer, "\t-----Operating Point-----\t")?;
        if let Some(step) = &run.step {
            write_step_line(step, i, runs.len(), writer)?;
        }
        writeln!(writer)?;
        for (name, voltage) in &run.node_voltages {
            writeln!(writer, "V({})\t\t{}\t\tnode_voltage", name, voltage)?;
        }
        for (name, current) in &run.device_currents {
            writeln!(writer, "I({})\t\t{}\t\tdevice_current", name, current)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::TransientRow;

    fn transient_runs(step: Option<ParamTable>) -> Vec<TransientRun> {
        vec![TransientRun {
            step,
            rows: vec![
                TransientRow {
                    time: 0.0,
                    values: vec![0.0, 1.0, 0.5],
                },
                TransientRow {
                    time: 0.5,
                    values: vec![0.0, 1.0, 0.25],
                },
            ],
        }]
    }

    fn columns() -> Vec<String> {
        vec!["V(0)".to_string(), "V(in)".to_string(), "I(R1)".to_string()]
    }

    #[test]
    fn test_transient_csv() {
        let mut out = Vec::new();
        write_transient(&columns(), &transient_runs(None), OutputFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "Time,V(0),V(in),I(R1)\n0,0,1,0.5\n0.5,0,1,0.25\n");
    }

    #[test]
    fn test_transient_tab_with_step() {
        let step: ParamTable = [("R".to_string(), 1000.0)].into_iter().collect();
        let mut out = Vec::new();
        write_transient(&columns(), &transient_runs(Some(step)), OutputFormat::Space, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Time\tV(0)\tV(in)\tI(R1)");
        assert_eq!(lines[1], "Step Information: R=1000 Run: 1/1");
        assert_eq!(lines[2], "0\t0\t1\t0.5");
    }

    #[test]
    fn test_operating_point_report() {
        let runs = vec![OperatingPointRun {
            step: None,
            node_voltages: vec![("out".to_string(), 2.5)],
            device_currents: vec![("R1".to_string(), 0.0025)],
        }];
        let mut out = Vec::new();
        write_operating_point(&runs, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "\t-----Operating Point-----\t\n\nV(out)\t\t2.5\t\tnode_voltage\nI(R1)\t\t0.0025\t\tdevice_current\n"
        );
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("space".parse::<OutputFormat>().unwrap().extension(), "txt");
        assert!("json".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_operating_point_always_txt() {
        let op = SimulationResult::OperatingPoint { runs: Vec::new() };
        let tran = SimulationResult::Transient {
            columns: Vec::new(),
            runs: Vec::new(),
        };
        assert_eq!(OutputFormat::Csv.extension_for(&op), "txt");
        assert_eq!(OutputFormat::Csv.extension_for(&tran), "csv");
    }
}
