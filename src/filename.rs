//! Names of the files that make up a database directory.
//!
//! ```text
//! 000012.log      write-ahead log
//! 000013.sst      table
//! MANIFEST-000002 version edits
//! CURRENT         name of the live manifest
//! 000014.dbtmp    scratch file for atomic renames
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Log,
    Table,
    Manifest,
    Current,
    Temp,
}

pub fn log_file_name(dbname: &Path, number: u64) -> PathBuf {
    dbname.join(format!("{:06}.log", number))
}

pub fn table_file_name(dbname: &Path, number: u64) -> PathBuf {
    dbname.join(format!("{:06}.sst", number))
}

pub fn descriptor_file_name(dbname: &Path, number: u64) -> PathBuf {
    dbname.join(format!("MANIFEST-{:06}", number))
}

pub fn current_file_name(dbname: &Path) -> PathBuf {
    dbname.join("CURRENT")
}

pub fn temp_file_name(dbname: &Path, number: u64) -> PathBuf {
    dbname.join(format!("{:06}.dbtmp", number))
}

/// Recognise a file name produced by this module.
pub fn parse_file_name(name: &str) -> Option<(u64, FileType)> {
    if name == "CURRENT" {
        return Some((0, FileType::Current));
    }
    if let Some(rest) = name.strip_prefix("MANIFEST-") {
        return parse_number(rest).map(|n| (n, FileType::Manifest));
    }
    let (stem, ext) = name.split_once('.')?;
    let number = parse_number(stem)?;
    let file_type = match ext {
        "log" => FileType::Log,
        "sst" => FileType::Table,
        "dbtmp" => FileType::Temp,
        _ => return None,
    };
    Some((number, file_type))
}

fn parse_number(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Point CURRENT at `MANIFEST-<number>`: write a temp file, sync it, rename.
pub fn set_current_file(dbname: &Path, descriptor_number: u64) -> Result<()> {
    let manifest = descriptor_file_name(dbname, descriptor_number);
    let contents = manifest
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidArgument("bad manifest name".into()))?;

    let tmp = temp_file_name(dbname, descriptor_number);
    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&tmp, current_file_name(dbname))?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Name of the manifest CURRENT points at.
pub fn read_current_file(dbname: &Path) -> Result<String> {
    let contents = fs::read_to_string(current_file_name(dbname))?;
    let Some(name) = contents.strip_suffix('\n') else {
        return Err(Error::Corruption("CURRENT file does not end with newline".into()));
    };
    if name.is_empty() {
        return Err(Error::Corruption("CURRENT file is empty".into()));
    }
    Ok(name.to_string())
}
