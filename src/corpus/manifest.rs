use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NavigatorError, NavigatorResult};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Txt,
    Csv,
    Pdf,
    Json,
}

impl DocumentFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Csv => "csv",
            Self::Pdf => "pdf",
            Self::Json => "json",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "txt" => Some(Self::Txt),
            "csv" => Some(Self::Csv),
            "pdf" => Some(Self::Pdf),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub path: PathBuf,
    pub format: DocumentFormat,
}

impl DocumentDescriptor {
    pub fn new(path: impl Into<PathBuf>, format: DocumentFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> NavigatorResult<Self> {
        let path = path.into();
        let format = DocumentFormat::from_path(&path).ok_or_else(|| {
            NavigatorError::configuration(format!(
                "cannot infer document format from path: {}",
                path.display()
            ))
        })?;
        Ok(Self { path, format })
    }

    pub fn path_key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

// Persisted as an ordered list, compared as a set.
#[derive(Debug, Clone, Default)]
pub struct CorpusManifest {
    documents: Vec<DocumentDescriptor>,
}

impl CorpusManifest {
    pub fn new(documents: Vec<DocumentDescriptor>) -> Self {
        let mut seen = BTreeSet::<String>::new();
        let documents = documents
            .into_iter()
            .filter(|document| seen.insert(document.path_key()))
            .collect();
        Self { documents }
    }

    pub fn documents(&self) -> &[DocumentDescriptor] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn path_keys(&self) -> Vec<String> {
        self.documents
            .iter()
            .map(DocumentDescriptor::path_key)
            .collect()
    }

    pub fn matches_paths(&self, recorded: &[String]) -> bool {
        manifest_paths_equal(&self.path_keys(), recorded)
    }
}

pub fn manifest_paths_equal(left: &[String], right: &[String]) -> bool {
    let left = left.iter().collect::<BTreeSet<&String>>();
    let right = right.iter().collect::<BTreeSet<&String>>();
    left == right
}

pub fn read_manifest_file(path: &Path) -> NavigatorResult<Option<Vec<String>>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read(path)
        .map_err(|err| NavigatorError::corruption(path, format!("manifest unreadable: {err}")))?;
    let paths: Vec<String> = serde_json::from_slice(&raw).map_err(|err| {
        NavigatorError::corruption(path, format!("manifest is not a JSON array of paths: {err}"))
    })?;

    Ok(Some(paths))
}
