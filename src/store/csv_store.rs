// src/store/csv_store.rs
//! Flat-file persistence: one CSV per collection inside a data directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};

use super::ArticleCollection;
use crate::error::{PipelineError, Result};

/// Raw fetch results, before any classification.
pub const FETCH_OUTPUT: &str = "gnews_output.csv";

#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a bare file name inside the data directory.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn load(&self, name: &str) -> Result<ArticleCollection> {
        let path = self.path_for(name)?;
        let file = fs::File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PipelineError::NotFound(name.to_string()),
            _ => PipelineError::Io(e),
        })?;

        let mut rdr = ReaderBuilder::new().flexible(true).from_reader(file);
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for rec in rdr.records() {
            let rec = rec?;
            rows.push(rec.iter().map(str::to_string).collect());
        }

        let coll = ArticleCollection::from_records(&headers, rows)?;
        tracing::debug!(file = name, rows = coll.len(), "csv loaded");
        Ok(coll)
    }

    /// Create or overwrite `name`. The previous file survives a failed write.
    pub fn save(&self, coll: &ArticleCollection, name: &str) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.dir)?;

        let tmp = self.dir.join(format!(".{name}.tmp"));
        let written = write_csv(coll, &tmp).and_then(|_| fs::rename(&tmp, &path).map_err(Into::into));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        tracing::info!(file = name, rows = coll.len(), "csv saved");
        Ok(path)
    }

    /// CSV file names in the data directory, sorted. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Serialized bytes, for downloads.
    pub fn to_bytes(coll: &ArticleCollection) -> Result<Vec<u8>> {
        let mut w = WriterBuilder::new().from_writer(Vec::new());
        write_records(coll, &mut w)?;
        w.into_inner()
            .map_err(|e| PipelineError::Io(std::io::Error::new(ErrorKind::Other, e.to_string())))
    }
}

fn write_csv(coll: &ArticleCollection, path: &Path) -> Result<()> {
    let mut w = WriterBuilder::new().from_path(path)?;
    write_records(coll, &mut w)?;
    w.flush()?;
    Ok(())
}

fn write_records<W: std::io::Write>(coll: &ArticleCollection, w: &mut csv::Writer<W>) -> Result<()> {
    w.write_record(coll.column_names())?;
    for row in coll.rows() {
        w.write_record(&row)?;
    }
    Ok(())
}

/// Bare `*.csv` names only; hidden files (our temp files) are excluded.
fn validate_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '"'])
        || name.chars().any(char::is_control)
        || name.contains("..")
        || !name.to_ascii_lowercase().ends_with(".csv");
    if bad {
        return Err(PipelineError::InvalidInput(format!(
            "'{name}' is not a CSV file name"
        )));
    }
    Ok(())
}
