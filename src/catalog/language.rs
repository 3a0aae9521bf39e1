//! catalog/language.rs
//!
//! Target language of a catalog plus heuristic detection from sources.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    C,
    #[serde(alias = "c++", alias = "cxx")]
    Cpp,
}

impl Language {
    /// Source file extension used for harness files.
    pub fn extension(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }

    /// Fence tags a model may put on a code block for this language.
    pub fn fence_tags(&self) -> &'static [&'static str] {
        match self {
            Language::C => &["c", "h"],
            Language::Cpp => &["cpp", "c++", "cxx", "cc"],
        }
    }

    /// Source extensions scanned when extracting signatures.
    pub fn source_extensions(&self) -> &'static [&'static str] {
        match self {
            Language::C => &["c", "h"],
            Language::Cpp => &["cpp", "hpp", "cc", "cxx", "h"],
        }
    }

    pub fn from_path(path: &Path) -> Option<Language> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("c") | Some("h") => Some(Language::C),
            Some("cpp") | Some("hpp") | Some("cc") | Some("cxx") => Some(Language::Cpp),
            _ => None,
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" => Ok(Language::C),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::C => "c",
            Language::Cpp => "cpp",
        };
        f.write_str(s)
    }
}

/* ============================================================
   Detection
   ============================================================ */

/// Picks C++ when C++-only extensions outnumber `.c` files, C otherwise.
pub fn detect_language(root: &Path) -> Language {
    let mut c = 0usize;
    let mut cpp = 0usize;

    for entry in WalkDir::new(root)
        .max_depth(6)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| !is_ignored(e.path()))
    {
        match entry.path().extension().and_then(|e| e.to_str()) {
            Some("c") => c += 1,
            Some("cpp") | Some("hpp") | Some("cc") | Some("cxx") => cpp += 1,
            _ => {}
        }
    }

    if cpp > c {
        Language::Cpp
    } else {
        Language::C
    }
}

pub(crate) fn is_ignored(path: &Path) -> bool {
    path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("target") | Some(".git") | Some("build") | Some("dist") | Some("node_modules")
        )
    })
}
