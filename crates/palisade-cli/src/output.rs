//! Output formatting.

use std::io::Write;

use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

/// Writes `value` as JSON or YAML. Text output is left to the caller.
pub fn write_structured<T: Serialize>(out: &mut dyn Write, format: OutputFormat, value: &T) -> Result<bool, CliError> {
    match format {
        OutputFormat::Text => Ok(false),
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, value)?;
            writeln!(out)?;
            Ok(true)
        }
        OutputFormat::Yaml => {
            write!(out, "{}", serde_yaml::to_string(value)?)?;
            Ok(true)
        }
    }
}

/// Left-aligned columns sized to their widest cell.
pub fn write_table(out: &mut dyn Write, headers: &[&str], rows: &[Vec<String>]) -> std::io::Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    writeln!(out, "{}", line(headers.to_vec()))?;
    for row in rows {
        writeln!(out, "{}", line(row.iter().map(String::as_str).collect()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_alignment() {
        let mut out = Vec::new();
        let rows = vec![vec!["/a/".to_string(), "exclusive".to_string()]];
        write_table(&mut out, &["PATH", "TYPE"], &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "PATH  TYPE\n/a/   exclusive\n");
    }

    #[test]
    fn test_text_format_is_not_structured() {
        let mut out = Vec::new();
        assert!(!write_structured(&mut out, OutputFormat::Text, &1).unwrap());
        assert!(out.is_empty());
        assert!(write_structured(&mut out, OutputFormat::Json, &vec![1, 2]).unwrap());
    }
}
