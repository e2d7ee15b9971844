//! The fixed set of documents exposed by the server.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::assets;
use crate::error::{ServerError, ServerResult};

/// A user-supplied file, addressed publicly by its basename.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    /// Path as given on the command line.
    pub path: PathBuf,
    pub absolute: PathBuf,
    pub base_dir: PathBuf,
}

/// Entry returned by `GET /api/files`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
}

/// Ordered, immutable document set with its base-directory map.
#[derive(Debug)]
pub struct DocumentSet {
    documents: Vec<Document>,
    base_dirs: HashMap<String, PathBuf>,
}

impl DocumentSet {
    /// Resolve every path to an absolute file and index it by basename.
    ///
    /// Paths are made absolute lexically, so a symlinked document keeps the
    /// name it was given. Only its directory is canonicalised, which is what
    /// asset containment checks compare against.
    ///
    /// Duplicate basenames are rejected: the basename is the route key, so
    /// a second file with the same name would be unreachable.
    pub fn new<I, P>(paths: I) -> ServerResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let cwd = std::env::current_dir()?;
        let mut documents: Vec<Document> = Vec::new();
        let mut base_dirs = HashMap::new();

        for path in paths {
            let path = path.as_ref();
            let invalid = |source| ServerError::InvalidDocument {
                path: path.to_path_buf(),
                source,
            };

            let absolute = assets::normalize(&cwd, path);
            std::fs::metadata(&absolute).map_err(invalid)?;
            let (Some(name), Some(parent)) = (
                absolute.file_name().and_then(|n| n.to_str()),
                absolute.parent(),
            ) else {
                return Err(invalid(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path has no usable file name",
                )));
            };
            let base_dir = std::fs::canonicalize(parent).map_err(invalid)?;

            if let Some(existing) = documents.iter().find(|d| d.name == name) {
                return Err(ServerError::DuplicateDocument {
                    name: name.to_string(),
                    first: existing.path.clone(),
                    second: path.to_path_buf(),
                });
            }

            let name = name.to_string();
            base_dirs.insert(name.clone(), base_dir.clone());
            documents.push(Document {
                name,
                path: path.to_path_buf(),
                absolute,
                base_dir,
            });
        }

        if documents.is_empty() {
            return Err(ServerError::NoDocuments);
        }

        Ok(Self {
            documents,
            base_dirs,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Exact basename lookup.
    pub fn get(&self, name: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.name == name)
    }

    pub fn base_dir(&self, name: &str) -> Option<&Path> {
        self.base_dirs.get(name).map(PathBuf::as_path)
    }

    pub fn file_infos(&self) -> Vec<FileInfo> {
        self.documents
            .iter()
            .map(|d| FileInfo {
                name: d.name.clone(),
                path: d.path.display().to_string(),
            })
            .collect()
    }
}
