//! Comma-separated flat files read by the engine at startup.
//!
//! Header row first, UTF-8, fields quoted only when they need it. Writes go
//! to sibling temp files that are renamed over their targets once every
//! table in a batch has been written, so a reader never sees a half-written
//! table or a mix of old and new tables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BridgeError, Result};

/// One data row keyed by column name.
pub type Row = HashMap<String, String>;

/// A parsed flat file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
    /// Source line each row starts on, parallel to `rows`.
    pub lines: Vec<usize>,
}

impl Table {
    /// Parse a table. Rows shorter than the header simply lack the trailing
    /// columns; blank rows are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(text.as_bytes());

        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut table = Self {
            header,
            ..Self::default()
        };
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            let line = record.position().map_or(0, |p| p.line() as usize);
            let row = table
                .header
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect();
            table.rows.push(row);
            table.lines.push(line);
        }
        Ok(table)
    }

    /// Line number of the `index`-th data row, header being line 1.
    pub fn line_of(&self, index: usize) -> usize {
        self.lines.get(index).copied().unwrap_or(index + 2)
    }
}

/// Header and rows as flat-file bytes.
pub fn render(header: &[&str], rows: &[Vec<String>]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| BridgeError::Io(e.into_error()))
}

/// Read a flat file. A missing file is `None`, not an error.
pub async fn read_table(path: &Path) -> Result<Option<Table>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Table::parse(&text).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// A table destined for `path`.
#[derive(Debug, Clone, Copy)]
pub struct TableFile<'a> {
    pub path: &'a Path,
    pub header: &'a [&'a str],
    pub rows: &'a [Vec<String>],
}

/// Replace `path` with a complete table.
pub async fn write_table(path: &Path, header: &[&str], rows: &[Vec<String>]) -> Result<()> {
    replace_tables(&[TableFile { path, header, rows }]).await
}

/// Replace every file in `tables`, or leave all of them as they were.
pub async fn replace_tables(tables: &[TableFile<'_>]) -> Result<()> {
    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(tables.len());
    for table in tables {
        match stage(table).await {
            Ok(tmp) => staged.push((tmp, table.path)),
            Err(e) => {
                discard(&staged).await;
                return Err(e);
            }
        }
    }

    for (i, (tmp, path)) in staged.iter().enumerate() {
        if let Err(e) = tokio::fs::rename(tmp, path).await {
            discard(&staged[i..]).await;
            return Err(e.into());
        }
    }
    Ok(())
}

async fn stage(table: &TableFile<'_>) -> Result<PathBuf> {
    if let Some(parent) = table.path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = temp_sibling(table.path);
    tokio::fs::write(&tmp, render(table.header, table.rows)?).await?;
    Ok(tmp)
}

async fn discard(staged: &[(PathBuf, &Path)]) {
    for (tmp, _) in staged {
        if let Err(e) = tokio::fs::remove_file(tmp).await {
            debug!(error = %e, tmp = %tmp.display(), "could not remove staged table");
        }
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
