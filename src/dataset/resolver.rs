//! Compound path resolution.
//!
//! A path in a manifest is either a plain path relative to a base directory or
//! a compound path `archive@entry` naming one entry of a zip archive that sits
//! next to the manifest. Archives are opened lazily, at most once per
//! resolver, and kept open until the resolver is dropped.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::DatasetError;

/// Separator between an archive name and an entry name.
pub const ARCHIVE_SEPARATOR: char = '@';

/// A parsed manifest path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompoundPath<'a> {
    /// A plain file relative to the base directory.
    Plain(&'a str),
    /// An entry inside a zip archive relative to the base directory.
    Archived { archive: &'a str, entry: &'a str },
}

impl<'a> CompoundPath<'a> {
    /// Splits `path` on the first `@`.
    pub fn parse(path: &'a str) -> Self {
        match path.split_once(ARCHIVE_SEPARATOR) {
            Some((archive, entry)) => CompoundPath::Archived { archive, entry },
            None => CompoundPath::Plain(path),
        }
    }

    /// The final path component: the entry's file name, or the plain file's.
    pub fn file_name(&self) -> &'a str {
        let inner = match self {
            CompoundPath::Plain(path) => path,
            CompoundPath::Archived { entry, .. } => entry,
        };
        inner.rsplit(['/', '\\']).next().unwrap_or(inner)
    }

    /// The file that must exist on disk: the archive, or the plain file.
    pub fn file_on_disk(&self) -> &'a str {
        match self {
            CompoundPath::Plain(path) => path,
            CompoundPath::Archived { archive, .. } => archive,
        }
    }
}

/// Builds `archive@entry`.
pub fn compound(archive: &str, entry: &str) -> String {
    format!("{archive}{ARCHIVE_SEPARATOR}{entry}")
}

type OpenArchive = ZipArchive<BufReader<File>>;

/// Reads plain files and archive entries relative to a base directory.
pub struct PathResolver {
    base_dir: PathBuf,
    archives: Mutex<HashMap<String, OpenArchive>>,
}

impl PathResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            archives: Mutex::new(HashMap::new()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Reads the raw bytes behind `path`.
    ///
    /// # Errors
    /// `NotFound` if the file, archive, or entry is missing. `InvalidArchive`
    /// if the archive exists but is not a readable zip file.
    pub fn read_bytes(&self, path: &str) -> Result<Vec<u8>, DatasetError> {
        match CompoundPath::parse(path) {
            CompoundPath::Plain(file) => {
                std::fs::read(self.base_dir.join(file)).map_err(|e| match e.kind() {
                    ErrorKind::NotFound => DatasetError::NotFound {
                        path: path.to_string(),
                    },
                    _ => DatasetError::Io(e),
                })
            }
            CompoundPath::Archived { archive, entry } => self.read_entry(archive, entry),
        }
    }

    /// Reads `path` as UTF-8 text.
    pub fn read_text(&self, path: &str) -> Result<String, DatasetError> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes).map_err(|_| DatasetError::format("file is not valid UTF-8", path))
    }

    /// Whether the file or archive entry behind `path` exists.
    pub fn exists(&self, path: &str) -> bool {
        match CompoundPath::parse(path) {
            CompoundPath::Plain(file) => self.base_dir.join(file).is_file(),
            CompoundPath::Archived { archive, entry } => self
                .with_archive(archive, |zip| Ok(zip.index_for_name(entry).is_some()))
                .unwrap_or(false),
        }
    }

    /// Number of archives currently held open.
    pub fn open_archive_count(&self) -> usize {
        self.archives
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn read_entry(&self, archive: &str, entry: &str) -> Result<Vec<u8>, DatasetError> {
        self.with_archive(archive, |zip| {
            let mut file = match zip.by_name(entry) {
                Ok(file) => file,
                Err(ZipError::FileNotFound) => {
                    return Err(DatasetError::NotFound {
                        path: compound(archive, entry),
                    })
                }
                Err(e) => return Err(DatasetError::Archive(e)),
            };
            let mut buf = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buf)?;
            Ok(buf)
        })
    }

    fn with_archive<T>(
        &self,
        archive: &str,
        f: impl FnOnce(&mut OpenArchive) -> Result<T, DatasetError>,
    ) -> Result<T, DatasetError> {
        let mut archives = self.archives.lock().unwrap_or_else(PoisonError::into_inner);
        if !archives.contains_key(archive) {
            let opened = self.open_archive(archive)?;
            archives.insert(archive.to_string(), opened);
        }
        match archives.get_mut(archive) {
            Some(zip) => f(zip),
            None => Err(DatasetError::NotFound {
                path: archive.to_string(),
            }),
        }
    }

    fn open_archive(&self, archive: &str) -> Result<OpenArchive, DatasetError> {
        let path = self.base_dir.join(archive);
        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DatasetError::NotFound {
                path: archive.to_string(),
            },
            _ => DatasetError::Io(e),
        })?;
        ZipArchive::new(BufReader::new(file))
            .map_err(|source| DatasetError::InvalidArchive { path, source })
    }
}

impl std::fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathResolver")
            .field("base_dir", &self.base_dir)
            .field("open_archives", &self.open_archive_count())
            .finish()
    }
}
