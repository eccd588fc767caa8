//! Struct archiving functionality
//!
//! Archives are CSV files with a header row followed by one row per control
//! cycle. Rows can either be `Serialize` structs with scalar fields, or plain
//! columns of floats written against an explicit header.
//!
//! To add archiving functionality to a struct implement the `Archived` trait.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::path::Path;
use std::fs::{File, OpenOptions};
use csv::WriterBuilder;
pub use csv::Writer;
use serde::Serialize;
use thiserror::Error;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>,

    /// Number of columns expected by `write_row`, if a header was given.
    num_cols: Option<usize>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while archiving.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("The archiver has not been initialised with a file")]
    NotInitialised,

    #[error("Could not create the archive file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Could not write to the archive: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Expected {expected} columns but got {found}")]
    ColumnMismatch {
        expected: usize,
        found: usize
    }
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A trait which enables a struct to be archived as a timestamped csv.
///
/// To implement this trait, the struct shall have an `Archiver` member which
/// shall be setup in the struct's `init` or `new` functions. 
pub trait Archived {
    /// Write the archives for this struct, stamped with the given time.
    fn write(&mut self, time_s: f64) -> Result<(), ArchiveError>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    ///
    /// The header row is taken from the field names of the first serialised
    /// record.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session, path: P
    ) -> Result<Self, ArchiveError> {
        let file = open_archive_file(&session.arch_root.join(path))?;

        let w = WriterBuilder::new()
            .has_headers(true)
            .from_writer(file);

        Ok(Self {
            writer: Some(w),
            num_cols: None
        })
    }

    /// Create a new column archiver with an explicit header row, relative to
    /// the session's archive root.
    pub fn with_header<P: AsRef<Path>, S: AsRef<str>>(
        session: &Session, path: P, header: &[S]
    ) -> Result<Self, ArchiveError> {
        Self::create(session.arch_root.join(path), header)
    }

    /// Create a new column archiver at an explicit path.
    pub fn create<P: AsRef<Path>, S: AsRef<str>>(
        path: P, header: &[S]
    ) -> Result<Self, ArchiveError> {
        let file = open_archive_file(path.as_ref())?;

        let mut w = WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        w.write_record(header.iter().map(|s| s.as_ref()))?;
        w.flush()?;

        Ok(Self {
            writer: Some(w),
            num_cols: Some(header.len())
        })
    }

    /// Returns true if this archiver is backed by a file.
    pub fn is_init(&self) -> bool {
        self.writer.is_some()
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: Serialize>(
        &mut self, record: T
    ) -> Result<(), ArchiveError> {
        let w = self.writer.as_mut().ok_or(ArchiveError::NotInitialised)?;

        w.serialize(record)?;
        w.flush()?;

        Ok(())
    }

    /// Write one row of columns into an archive created with a header.
    pub fn write_row(&mut self, row: &[f64]) -> Result<(), ArchiveError> {
        if let Some(n) = self.num_cols {
            if n != row.len() {
                return Err(ArchiveError::ColumnMismatch {
                    expected: n,
                    found: row.len()
                })
            }
        }

        let w = self.writer.as_mut().ok_or(ArchiveError::NotInitialised)?;

        w.write_record(row.iter().map(|v| v.to_string()))?;
        w.flush()?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn open_archive_file(path: &Path) -> Result<File, ArchiveError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Truncate any previous archive then open the file in append mode
    File::create(path)?;
    let file = OpenOptions::new()
        .append(true)
        .open(path)?;

    Ok(file)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_uninit_archiver() {
        let mut a = Archiver::default();

        assert!(!a.is_init());
        assert!(matches!(
            a.write_row(&[1.0, 2.0]), 
            Err(ArchiveError::NotInitialised)
        ));
    }

    #[test]
    fn test_column_archive() {
        let path = std::env::temp_dir()
            .join(format!("mel_archive_test_{}", std::process::id()))
            .join("cols.csv");

        let mut a = Archiver::create(&path, &["t", "x"]).unwrap();
        assert!(a.is_init());

        a.write_row(&[0.0, 1.5]).unwrap();
        a.write_row(&[0.001, -2.0]).unwrap();
        assert!(matches!(
            a.write_row(&[1.0]),
            Err(ArchiveError::ColumnMismatch { expected: 2, found: 1 })
        ));

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["t,x", "0,1.5", "0.001,-2"]);

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
