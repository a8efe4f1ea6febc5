//! Reading and writing VASP POSCAR structure files.
//!
//! The writer emits one symbol/count pair per consecutive run of equal
//! species instead of regrouping sites, so the site order of the in-memory
//! structure survives a write/read round trip. Site indices are load-bearing
//! for the rest of the pipeline.

use crate::core::models::lattice::{Lattice, LatticeError};
use crate::core::models::structure::{CrystalStructure, Site};
use nalgebra::{Matrix3, Vector3};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoscarError {
    #[error("I/O error on '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Lattice(#[from] LatticeError),
}

fn parse_err(line: usize, message: impl Into<String>) -> PoscarError {
    PoscarError::Parse {
        line,
        message: message.into(),
    }
}

fn parse_floats(line: &str, line_no: usize, count: usize) -> Result<Vec<f64>, PoscarError> {
    let values: Vec<f64> = line
        .split_whitespace()
        .take(count)
        .map(|token| token.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| parse_err(line_no, format!("expected a number: {e}")))?;
    if values.len() < count {
        return Err(parse_err(
            line_no,
            format!("expected {count} numbers, found {}", values.len()),
        ));
    }
    Ok(values)
}

pub fn parse(content: &str) -> Result<CrystalStructure, PoscarError> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() < 8 {
        return Err(parse_err(lines.len(), "file too short for a POSCAR"));
    }

    let scale: f64 = lines[1]
        .trim()
        .parse()
        .map_err(|e| parse_err(2, format!("invalid scale factor: {e}")))?;

    let mut rows = [0.0; 9];
    for i in 0..3 {
        let v = parse_floats(lines[2 + i], 3 + i, 3)?;
        rows[3 * i..3 * i + 3].copy_from_slice(&v);
    }
    let lattice = Lattice::new(Matrix3::from_row_slice(&rows) * scale)?;

    let symbols: Vec<&str> = lines[5].split_whitespace().collect();
    if symbols.is_empty() || symbols[0].parse::<usize>().is_ok() {
        return Err(parse_err(
            6,
            "expected species symbols (VASP 5 format required)",
        ));
    }
    let counts: Vec<usize> = lines[6]
        .split_whitespace()
        .map(|token| token.parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|e| parse_err(7, format!("invalid species count: {e}")))?;
    if symbols.len() != counts.len() {
        return Err(parse_err(
            7,
            format!(
                "{} species symbols but {} counts",
                symbols.len(),
                counts.len()
            ),
        ));
    }

    let mut cursor = 7;
    let mode_line = lines
        .get(cursor)
        .ok_or_else(|| parse_err(cursor + 1, "missing coordinate mode line"))?;
    let mut mode = mode_line.trim();
    if mode.to_ascii_lowercase().starts_with('s') {
        // Selective dynamics: the flag line precedes the coordinate mode.
        cursor += 1;
        mode = lines
            .get(cursor)
            .ok_or_else(|| parse_err(cursor + 1, "missing coordinate mode line"))?
            .trim();
    }
    let direct = match mode.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('d') => true,
        Some('c') | Some('k') => false,
        _ => {
            return Err(parse_err(
                cursor + 1,
                format!("unrecognized coordinate mode '{mode}'"),
            ));
        }
    };
    cursor += 1;

    let total: usize = counts.iter().sum();
    let mut sites = Vec::with_capacity(total);
    let mut coord_line = cursor;
    for (symbol, count) in symbols.iter().zip(counts.iter()) {
        for _ in 0..*count {
            let line = lines
                .get(coord_line)
                .ok_or_else(|| parse_err(coord_line + 1, "missing coordinate line"))?;
            let v = parse_floats(line, coord_line + 1, 3)?;
            let raw = Vector3::new(v[0], v[1], v[2]);
            let frac = if direct {
                raw
            } else {
                lattice.to_fractional(&(raw * scale))
            };
            sites.push(Site::new(*symbol, frac));
            coord_line += 1;
        }
    }

    Ok(CrystalStructure::new(lattice, sites))
}

pub fn render(structure: &CrystalStructure) -> String {
    let mut out = String::new();
    out.push_str(&structure.formula());
    out.push_str("\n1.0\n");
    for i in 0..3 {
        let row = structure.lattice().row(i);
        out.push_str(&format!("{:>20.12} {:>20.12} {:>20.12}\n", row.x, row.y, row.z));
    }

    // Runs of consecutive equal species, preserving site order.
    let mut runs: Vec<(&str, usize)> = Vec::new();
    for site in structure.sites() {
        match runs.last_mut() {
            Some((species, count)) if *species == site.species => *count += 1,
            _ => runs.push((site.species.as_str(), 1)),
        }
    }
    let symbols: Vec<&str> = runs.iter().map(|(s, _)| *s).collect();
    let counts: Vec<String> = runs.iter().map(|(_, c)| c.to_string()).collect();
    out.push_str(&symbols.join(" "));
    out.push('\n');
    out.push_str(&counts.join(" "));
    out.push_str("\nDirect\n");
    for site in structure.sites() {
        out.push_str(&format!(
            "{:>18.12} {:>18.12} {:>18.12}\n",
            site.frac.x, site.frac.y, site.frac.z
        ));
    }
    out
}

pub fn read_from_path(path: &Path) -> Result<CrystalStructure, PoscarError> {
    let content = std::fs::read_to_string(path).map_err(|source| PoscarError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content)
}

pub fn write_to_path(path: &Path, structure: &CrystalStructure) -> Result<(), PoscarError> {
    std::fs::write(path, render(structure)).map_err(|source| PoscarError::Io {
        path: path.to_path_buf(),
        source,
    })
}
