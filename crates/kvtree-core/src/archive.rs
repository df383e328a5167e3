//! Zip archives as a read-only file system, and packing file-system entries
//! into one.
use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use parking_lot::Mutex;
use zip::CompressionMethod;
use zip::ZipArchive;
use zip::result::ZipError;
use zip::write::FileOptions;

use crate::error::{Error, Result};
use crate::fs::FileSystem;

fn zip_err(e: ZipError) -> Error {
    match e {
        ZipError::FileNotFound => Error::not_found("entry not in archive"),
        ZipError::Io(io) => io.into(),
        other => Error::io(other.to_string()),
    }
}

pub struct ZipFileSystem<R> {
    archive: Mutex<ZipArchive<R>>,
}

impl ZipFileSystem<fs::File> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        Self::new(file)
    }
}

impl ZipFileSystem<Cursor<Vec<u8>>> {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::new(Cursor::new(data))
    }
}

impl<R: Read + Seek> ZipFileSystem<R> {
    pub fn new(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader).map_err(zip_err)?;
        Ok(Self {
            archive: Mutex::new(archive),
        })
    }

    /// File entries, sorted.
    pub fn list(&self) -> Vec<String> {
        let archive = self.archive.lock();
        let mut names: Vec<String> = archive
            .file_names()
            .filter(|n| !n.ends_with('/'))
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }
}

impl<R: Read + Seek> FileSystem for ZipFileSystem<R> {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let mut archive = self.archive.lock();
        let mut entry = archive.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => Error::not_found(name.to_string()),
            other => zip_err(other),
        })?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        Ok(data)
    }

    fn save(&self, name: &str, _data: &[u8]) -> Result<()> {
        Err(Error::io(format!("cannot write {name}: zip file systems are read-only")))
    }
}

/// Builds a zip archive in memory from `names`, each read through `fs`.
/// Entries keep the given names and order.
pub fn pack(fs: &dyn FileSystem, names: &[String]) -> Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for name in names {
        let data = fs.load(name)?;
        zip.start_file(name.as_str(), options).map_err(zip_err)?;
        zip.write_all(&data)?;
    }
    let out = zip.finish().map_err(zip_err)?.into_inner();
    tracing::debug!(entries = names.len(), bytes = out.len(), "packed archive");
    Ok(out)
}
