//! Declared schema of an observation file and table
//!
//! Column order inside a source file is taken from its header; the schema
//! only fixes which columns must exist and what they mean. The same
//! descriptor drives the table DDL and CSV serialization, in declaration
//! order.

use crate::error::{Result, SyncError};

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Timestamp,
    Float,
    Text,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Timestamp => "timestamp",
            ColumnType::Float => "double precision",
            ColumnType::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub column_type: ColumnType,
}

/// The four observation columns in declaration order
pub const OBSERVATION_COLUMNS: [ColumnSpec; 4] = [
    ColumnSpec { name: "Time", column_type: ColumnType::Timestamp },
    ColumnSpec { name: "Value", column_type: ColumnType::Float },
    ColumnSpec { name: "Approval", column_type: ColumnType::Text },
    ColumnSpec { name: "myLocation", column_type: ColumnType::Text },
];

pub const TIME: usize = 0;
pub const VALUE: usize = 1;
pub const APPROVAL: usize = 2;
pub const LOCATION: usize = 3;

/// Where each schema column sits in a particular file
///
/// `positions[TIME]` is the field index of the `Time` column, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnPositions {
    positions: [usize; 4],
    width: usize,
}

impl ColumnPositions {
    /// Match a header row against the declared columns
    ///
    /// The header must contain exactly the four declared names, each once,
    /// in any order. Names are compared after trimming whitespace.
    pub fn from_header<'a>(header: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let names: Vec<&str> = header.into_iter().map(str::trim).collect();

        if names.len() != OBSERVATION_COLUMNS.len() {
            return Err(SyncError::SchemaMismatch(format!(
                "expected {} columns {:?}, found {} {:?}",
                OBSERVATION_COLUMNS.len(),
                expected_names(),
                names.len(),
                names
            )));
        }

        let mut positions = [0usize; 4];
        for (slot, spec) in OBSERVATION_COLUMNS.iter().enumerate() {
            let mut found = names.iter().enumerate().filter(|(_, name)| **name == spec.name);
            match (found.next(), found.next()) {
                (Some((index, _)), None) => positions[slot] = index,
                (None, _) => {
                    return Err(SyncError::SchemaMismatch(format!(
                        "missing column '{}' in header {:?}",
                        spec.name, names
                    )))
                },
                (Some(_), Some(_)) => {
                    return Err(SyncError::SchemaMismatch(format!(
                        "column '{}' appears more than once in header {:?}",
                        spec.name, names
                    )))
                },
            }
        }

        Ok(Self { positions, width: names.len() })
    }

    /// Field index of the schema column in `slot`
    pub fn get(&self, slot: usize) -> usize {
        self.positions[slot]
    }

    /// Number of fields every data row must have
    pub fn width(&self) -> usize {
        self.width
    }
}

pub fn expected_names() -> Vec<&'static str> {
    OBSERVATION_COLUMNS.iter().map(|c| c.name).collect()
}

/// `"Time" timestamp, "Value" double precision, ...`
pub fn column_definitions() -> String {
    OBSERVATION_COLUMNS
        .iter()
        .map(|c| format!("{} {}", quote_ident(c.name), c.column_type.sql_type()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `"Time", "Value", "Approval", "myLocation"`
pub fn column_list() -> String {
    OBSERVATION_COLUMNS
        .iter()
        .map(|c| quote_ident(c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Double-quote a SQL identifier, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
