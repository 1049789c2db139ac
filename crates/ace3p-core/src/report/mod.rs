//! Tab-delimited result tables.
//!
//! Sweep tables are rewritten in full after every completed point so a
//! partially finished sweep still leaves a readable file. The frequency
//! table is an append-only log; the history table is rewritten each
//! optimization iteration.

use crate::codec::solver::S3pOutput;
use crate::domain::{Ace3pError, Ace3pResult, ParamPoint, RunRecord};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

fn write_error(path: &Path, source: std::io::Error) -> Ace3pError {
    Ace3pError::io_system(
        "IO.TABLE_WRITE",
        format!("failed to write table '{}': {}", path.display(), source),
    )
}

fn render_output(value: Option<f64>) -> String {
    match value {
        Some(number) => number.to_string(),
        None => "nan".to_string(),
    }
}

/// Rewrites the sweep results table: one header of input names then
/// output names, one row per run, absent outputs rendered as `nan`.
pub fn write_sweep_table(
    path: &Path,
    input_names: &[&str],
    output_names: &[&str],
    records: &[RunRecord],
) -> Ace3pResult<()> {
    let mut text = String::new();
    let header: Vec<&str> = input_names.iter().chain(output_names.iter()).copied().collect();
    let _ = writeln!(text, "{}", header.join("\t"));
    for record in records {
        let mut row = Vec::with_capacity(header.len());
        for name in input_names {
            row.push(match record.input_value(name) {
                Some(value) => value.to_string(),
                None => "nan".to_string(),
            });
        }
        for name in output_names {
            row.push(render_output(record.outputs.get(*name).copied().flatten()));
        }
        let _ = writeln!(text, "{}", row.join("\t"));
    }
    std::fs::write(path, text).map_err(|source| write_error(path, source))
}

/// Appends one row per solved frequency to the all-values log, writing
/// the header first when the file does not exist yet. `iteration` adds a
/// leading `Iteration` column for optimization runs.
pub fn write_frequency_table(
    path: &Path,
    iteration: Option<usize>,
    inputs: &ParamPoint,
    output: &S3pOutput,
) -> Ace3pResult<()> {
    let needs_header = !path.exists();
    let mut text = String::new();
    if needs_header {
        let mut header = Vec::new();
        if iteration.is_some() {
            header.push("Iteration".to_string());
        }
        header.extend(inputs.iter().map(|(name, _)| name.clone()));
        header.push("Frequency".to_string());
        header.extend(output.s_parameter_names.iter().cloned());
        let _ = writeln!(text, "{}", header.join("\t"));
    }
    for (index, frequency) in output.frequencies.iter().enumerate() {
        let mut row = Vec::new();
        if let Some(iteration) = iteration {
            row.push(iteration.to_string());
        }
        row.extend(inputs.iter().map(|(_, value)| value.to_string()));
        row.push(frequency.to_string());
        row.extend(output.rows[index].iter().map(|value| value.to_string()));
        let _ = writeln!(text, "{}", row.join("\t"));
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| write_error(path, source))?;
    file.write_all(text.as_bytes())
        .map_err(|source| write_error(path, source))
}

/// Rewrites the optimization history table from scratch.
pub fn write_history_table(
    path: &Path,
    columns: &[String],
    rows: &[Vec<String>],
) -> Ace3pResult<()> {
    let mut text = String::new();
    let _ = writeln!(text, "{}", columns.join("\t"));
    for row in rows {
        let _ = writeln!(text, "{}", row.join("\t"));
    }
    std::fs::write(path, text).map_err(|source| write_error(path, source))
}

#[cfg(test)]
mod tests {
    use super::{write_frequency_table, write_history_table, write_sweep_table};
    use crate::codec::solver::S3pOutput;
    use crate::domain::{ParamValue, RunRecord};
    use tempfile::TempDir;

    fn record(radius: f64, roq: Option<f64>) -> RunRecord {
        let mut record = RunRecord::new(
            vec![("radius".to_string(), ParamValue::Number(radius))],
            "/tmp/run",
        );
        record.outputs.insert("RoQ".to_string(), roq);
        record
    }

    #[test]
    fn sweep_table_renders_absent_outputs_as_nan() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("sweep_output.txt");
        let records = vec![record(90.0, Some(120.5)), record(100.0, None)];
        write_sweep_table(&path, &["radius"], &["RoQ"], &records).expect("table writes");

        let text = std::fs::read_to_string(&path).expect("table readable");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "radius\tRoQ");
        assert_eq!(lines[1], "90\t120.5");
        assert_eq!(lines[2], "100\tnan");
    }

    #[test]
    fn sweep_table_rewrite_replaces_previous_content() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("sweep_output.txt");
        write_sweep_table(&path, &["radius"], &["RoQ"], &[record(90.0, Some(1.0))])
            .expect("first write");
        write_sweep_table(
            &path,
            &["radius"],
            &["RoQ"],
            &[record(90.0, Some(1.0)), record(100.0, Some(2.0))],
        )
        .expect("second write");

        let text = std::fs::read_to_string(&path).expect("table readable");
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn frequency_table_appends_and_writes_header_once() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("all_values.txt");
        let output = S3pOutput {
            s_parameter_names: vec!["S(0,0)".to_string()],
            frequencies: vec![1.0e9, 1.1e9],
            rows: vec![vec![-3.2], vec![-8.1]],
        };
        let inputs = vec![("radius".to_string(), ParamValue::Number(90.0))];

        write_frequency_table(&path, Some(0), &inputs, &output).expect("first append");
        write_frequency_table(&path, Some(1), &inputs, &output).expect("second append");

        let text = std::fs::read_to_string(&path).expect("table readable");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Iteration\tradius\tFrequency\tS(0,0)");
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1], "0\t90\t1000000000\t-3.2");
        assert_eq!(lines[3], "1\t90\t1000000000\t-3.2");
    }

    #[test]
    fn history_table_is_rewritten_in_full() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("history.txt");
        let columns = vec!["Iteration".to_string(), "radius".to_string()];
        write_history_table(&path, &columns, &[vec!["0".to_string(), "90".to_string()]])
            .expect("first write");
        write_history_table(
            &path,
            &columns,
            &[
                vec!["0".to_string(), "90".to_string()],
                vec!["1".to_string(), "95".to_string()],
            ],
        )
        .expect("second write");

        let text = std::fs::read_to_string(&path).expect("table readable");
        assert_eq!(text.lines().count(), 3);
    }
}
