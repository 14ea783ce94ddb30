use crate::error::LikelihoodError;
use crate::routines::settings::Columns;
use crate::structs::hubble::HubbleDiagram;
use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use std::fs;

const REDSHIFT_ALIASES: [&str; 4] = ["zcmb", "z", "zhd", "zhel"];
const MODULUS_ALIASES: [&str; 4] = ["mu", "distmod", "mb", "mu_obs"];
const ERROR_ALIASES: [&str; 5] = ["dmu", "err", "dmb", "sigma", "mu_err"];
const NAME_ALIASES: [&str; 4] = ["name", "sn", "snid", "cid"];

/// Read a Hubble diagram from a whitespace separated text table
///
/// See [parse_hubble_diagram] for the accepted layouts.
pub fn read_hubble_diagram(path: &str, columns: &Columns) -> Result<HubbleDiagram> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read Hubble diagram from {}", path))?;
    let diagram = parse_hubble_diagram(&text, columns)
        .with_context(|| format!("Failed to parse Hubble diagram {}", path))?;
    tracing::info!(
        "Hubble diagram {} contains {} supernovae with redshifts up to {:.3}",
        path,
        diagram.len(),
        diagram.max_redshift()
    );
    Ok(diagram)
}

/// Parse a Hubble diagram table
///
/// Lines starting with `#` are comments, except the first non-empty line,
/// which is read as a header when it names at least two columns (with or
/// without a leading `#`). Columns are then looked up by the names in
/// [Columns], falling back to common aliases (`zcmb`, `z`, `mu`, `mb`, `dmu`,
/// ...); a commented first line lacking either column stays a comment. Without a
/// header the columns are positional: an optional leading
/// name column, then redshift, distance modulus and an optional error.
pub fn parse_hubble_diagram(
    text: &str,
    columns: &Columns,
) -> std::result::Result<HubbleDiagram, LikelihoodError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .peekable();

    let header = match lines.peek() {
        Some((_, first)) => header_tokens(first),
        None => None,
    };
    if header.is_some() {
        lines.next();
    }

    let rows: Vec<(usize, Vec<&str>)> = lines
        .filter(|(_, line)| !line.starts_with('#'))
        .map(|(number, line)| (number, line.split_whitespace().collect()))
        .collect();
    if rows.is_empty() {
        return Err(LikelihoodError::InvalidData(
            "the Hubble diagram contains no data rows".to_string(),
        ));
    }

    let layout = match &header {
        Some(header) => match Layout::from_header(&header.names, columns) {
            Ok(layout) => layout,
            // A leading comment without the required columns is just a comment
            Err(_) if header.commented => Layout::positional(&rows[0].1),
            Err(err) => return Err(err),
        },
        None => Layout::positional(&rows[0].1),
    };

    let mut names = Vec::with_capacity(rows.len());
    let mut redshifts = Vec::with_capacity(rows.len());
    let mut moduli = Vec::with_capacity(rows.len());
    let mut errors = Vec::with_capacity(rows.len());

    for (number, tokens) in &rows {
        if let Some(i) = layout.name {
            names.push(field(tokens, i, *number)?.to_string());
        }
        redshifts.push(number_at(tokens, layout.redshift, *number)?);
        moduli.push(number_at(tokens, layout.modulus, *number)?);
        if let Some(i) = layout.error {
            errors.push(number_at(tokens, i, *number)?);
        }
    }

    let errors = layout.error.map(|_| Array1::from_vec(errors));
    let diagram = HubbleDiagram::new(Array1::from_vec(redshifts), Array1::from_vec(moduli), errors)?;
    match layout.name {
        Some(_) => diagram.with_names(names),
        None => Ok(diagram),
    }
}

/// Column positions within a row
#[derive(Debug, Clone, Copy, PartialEq)]
struct Layout {
    name: Option<usize>,
    redshift: usize,
    modulus: usize,
    error: Option<usize>,
}

impl Layout {
    fn from_header(header: &[String], columns: &Columns) -> std::result::Result<Self, LikelihoodError> {
        let find = |preferred: &str, aliases: &[&str]| -> Option<usize> {
            std::iter::once(preferred)
                .chain(aliases.iter().copied())
                .find_map(|name| header.iter().position(|h| h.eq_ignore_ascii_case(name)))
        };
        let missing = |what: &str, name: &str| {
            LikelihoodError::InvalidData(format!(
                "header {:?} has no {} column (looked for {:?} and its aliases)",
                header, what, name
            ))
        };

        Ok(Layout {
            name: find(&columns.name, &NAME_ALIASES),
            redshift: find(&columns.redshift, &REDSHIFT_ALIASES)
                .ok_or_else(|| missing("redshift", &columns.redshift))?,
            modulus: find(&columns.distance_modulus, &MODULUS_ALIASES)
                .ok_or_else(|| missing("distance modulus", &columns.distance_modulus))?,
            error: find(&columns.error, &ERROR_ALIASES),
        })
    }

    fn positional(first_row: &[&str]) -> Self {
        let offset = match first_row.first() {
            Some(token) if token.parse::<f64>().is_err() => 1,
            _ => 0,
        };
        Layout {
            name: (offset == 1).then_some(0),
            redshift: offset,
            modulus: offset + 1,
            error: (first_row.len() > offset + 2).then_some(offset + 2),
        }
    }
}

struct Header {
    names: Vec<String>,
    commented: bool,
}

/// Column names of a header line, if the line is one
fn header_tokens(line: &str) -> Option<Header> {
    let commented = line.starts_with('#');
    let names: Vec<String> = line
        .trim_start_matches('#')
        .split_whitespace()
        .map(|t| t.to_string())
        .collect();
    if names.len() < 2 {
        return None;
    }
    let all_text = names.iter().all(|t| t.parse::<f64>().is_err());
    (commented || all_text).then_some(Header { names, commented })
}

fn field<'a>(tokens: &[&'a str], index: usize, line: usize) -> std::result::Result<&'a str, LikelihoodError> {
    tokens.get(index).copied().ok_or_else(|| {
        LikelihoodError::InvalidData(format!(
            "line {} has {} columns, expected at least {}",
            line,
            tokens.len(),
            index + 1
        ))
    })
}

fn number_at(tokens: &[&str], index: usize, line: usize) -> std::result::Result<f64, LikelihoodError> {
    let token = field(tokens, index, line)?;
    token.parse::<f64>().map_err(|_| {
        LikelihoodError::InvalidData(format!(
            "line {}, column {}: {:?} is not a number",
            line,
            index + 1,
            token
        ))
    })
}

/// Read a covariance matrix from a whitespace separated text file
pub fn read_covariance(path: &str) -> Result<Array2<f64>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read covariance matrix from {}", path))?;
    let matrix =
        parse_covariance(&text).with_context(|| format!("Failed to parse covariance matrix {}", path))?;
    tracing::info!(
        "Covariance matrix {} has dimension {}x{}",
        path,
        matrix.nrows(),
        matrix.ncols()
    );
    Ok(matrix)
}

/// Parse an `N x N` matrix, optionally preceded by the dimension `N`
///
/// Values are read in row-major order regardless of line breaks. Lines
/// starting with `#` are ignored.
pub fn parse_covariance(text: &str) -> std::result::Result<Array2<f64>, LikelihoodError> {
    let tokens: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .flat_map(|line| line.split_whitespace())
        .collect();
    if tokens.is_empty() {
        return Err(LikelihoodError::InvalidCovariance(
            "the covariance file is empty".to_string(),
        ));
    }

    let header = tokens[0]
        .parse::<usize>()
        .ok()
        .filter(|n| n.checked_mul(*n).and_then(|m| m.checked_add(1)) == Some(tokens.len()));
    let (n, values) = match header {
        Some(n) => (n, &tokens[1..]),
        None => {
            let n = (tokens.len() as f64).sqrt().round() as usize;
            if n.checked_mul(n) != Some(tokens.len()) {
                return Err(LikelihoodError::InvalidCovariance(format!(
                    "{} values cannot form a square matrix",
                    tokens.len()
                )));
            }
            (n, &tokens[..])
        }
    };

    let values = values
        .iter()
        .enumerate()
        .map(|(k, token)| {
            token.parse::<f64>().map_err(|_| {
                LikelihoodError::InvalidCovariance(format!(
                    "entry ({}, {}) = {:?} is not a number",
                    k / n,
                    k % n,
                    token
                ))
            })
        })
        .collect::<std::result::Result<Vec<f64>, _>>()?;

    Array2::from_shape_vec((n, n), values)
        .map_err(|e| LikelihoodError::InvalidCovariance(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_with_named_columns() {
        let text = "#name zcmb mb dmb\nsn1 0.1 38.3 0.12\n# a comment\nsn2 0.5 42.3 0.15\n";
        let diagram = parse_hubble_diagram(text, &Columns::default()).unwrap();
        assert_eq!(diagram.len(), 2);
        assert_eq!(diagram.redshifts()[1], 0.5);
        assert_eq!(diagram.distance_moduli()[0], 38.3);
        assert_eq!(diagram.errors().unwrap()[1], 0.15);
        assert_eq!(diagram.names().unwrap(), &["sn1".to_string(), "sn2".to_string()]);
    }

    #[test]
    fn configured_column_names_take_precedence() {
        let columns = Columns {
            redshift: "zhel".to_string(),
            ..Columns::default()
        };
        let text = "zcmb zhel mu\n0.100 0.101 38.3\n0.200 0.202 39.9\n";
        let diagram = parse_hubble_diagram(text, &columns).unwrap();
        assert_eq!(diagram.redshifts()[0], 0.101);
        assert!(diagram.errors().is_none());
    }

    #[test]
    fn positional_columns_without_header() {
        let text = "0.1 38.3\n0.2 39.9\n";
        let diagram = parse_hubble_diagram(text, &Columns::default()).unwrap();
        assert_eq!(diagram.distance_moduli()[1], 39.9);
        assert!(diagram.names().is_none());

        let named = "SN2001a 0.1 38.3 0.1\nSN2001b 0.2 39.9 0.1\n";
        let diagram = parse_hubble_diagram(named, &Columns::default()).unwrap();
        assert_eq!(diagram.names().unwrap()[0], "SN2001a");
        assert_eq!(diagram.errors().unwrap()[0], 0.1);
    }

    #[test]
    fn leading_comment_is_not_mistaken_for_a_header() {
        let text = "# Union2.1 compilation\n0.1 38.3 0.2\n0.2 39.9 0.2\n";
        let diagram = parse_hubble_diagram(text, &Columns::default()).unwrap();
        assert_eq!(diagram.len(), 2);
        assert_eq!(diagram.errors().unwrap()[0], 0.2);
    }

    #[test]
    fn malformed_rows_report_their_line() {
        let text = "#z mu\n0.1 38.3\n0.2 abc\n";
        let err = parse_hubble_diagram(text, &Columns::default()).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn covariance_with_and_without_dimension_header() {
        let with_header = "2\n0.1 0.01\n0.01 0.2\n";
        let without = "0.1 0.01\n0.01 0.2\n";
        let a = parse_covariance(with_header).unwrap();
        let b = parse_covariance(without).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[[1, 1]], 0.2);
    }

    #[test]
    fn covariance_must_be_square() {
        assert!(parse_covariance("1 2 3").is_err());
        assert!(parse_covariance("").is_err());
    }

    #[test]
    fn oversized_dimension_is_an_error() {
        let err = parse_covariance("4294967296 1.0").unwrap_err();
        assert!(matches!(err, LikelihoodError::InvalidCovariance(_)));
        assert!(parse_covariance(&format!("{} 1.0", usize::MAX)).is_err());
    }
}
