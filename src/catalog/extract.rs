// src/catalog/extract.rs
//
// Best-effort signature extraction for C/C++ sources.
//
// Guarantees:
// - Bounded file count
// - Only definitions (a body must follow the prototype)
// - Keywords and common libc names never become functions
//

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use super::language::{detect_language, is_ignored, Language};
use super::{Catalog, CatalogError, FunctionSignature, Param};

/* ============================================================
   Constants (hard limits)
   ============================================================ */

const MAX_SOURCE_FILES: usize = 100;
const PROJECT_CONFIG_FILE: &str = "fuzz_config.toml";

const KEYWORDS: &[&str] = &[
    "if", "else", "while", "for", "switch", "return", "do", "sizeof", "case", "goto",
];

const LIBC_NAMES: &[&str] = &[
    "printf", "scanf", "malloc", "free", "calloc", "realloc", "strcpy", "strncpy", "strcat",
    "strlen", "strcmp", "strstr", "memcpy", "memset", "memmove", "memcmp", "atoi", "atof",
    "atol", "strtol", "strtod", "fopen", "fclose", "fread", "fwrite", "fprintf", "fscanf",
    "exit", "abort", "assert",
];

/// Optional per-project settings read from `fuzz_config.toml`.
#[derive(Debug, Default, Deserialize)]
struct ProjectConfig {
    name: Option<String>,
    language: Option<String>,
    #[serde(default)]
    source_dirs: Vec<String>,
}

/* ============================================================
   Public entry
   ============================================================ */

pub fn extract_project(root: &Path) -> Result<Catalog, CatalogError> {
    if !root.exists() {
        return Err(CatalogError::NotFound(root.to_path_buf()));
    }

    let project = load_project_config(root)?;
    let language = match project.language.as_deref() {
        Some(l) => l.parse().unwrap_or_else(|_| detect_language(root)),
        None => detect_language(root),
    };

    let name = project.name.clone().unwrap_or_else(|| {
        root.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project")
            .to_string()
    });

    let files = collect_source_files(root, &project.source_dirs, language);
    debug!(files = files.len(), %language, "collected source files");

    let mut catalog = Catalog::new(name, language);
    let mut includes = BTreeSet::new();

    for file in &files {
        let content = match fs::read(file) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                debug!(file = %file.display(), error = %e, "skipping unreadable source");
                continue;
            }
        };

        catalog
            .functions
            .extend(extract_functions(&content, &file.display().to_string()));
        includes.extend(extract_includes(&content));
        catalog.source_files.push(file.display().to_string());
    }

    catalog.includes = includes.into_iter().collect();
    Ok(catalog)
}

pub fn extract_file(path: &Path) -> Result<Catalog, CatalogError> {
    if !path.exists() {
        return Err(CatalogError::NotFound(path.to_path_buf()));
    }
    let language =
        Language::from_path(path).ok_or_else(|| CatalogError::Unsupported(path.to_path_buf()))?;

    let bytes = fs::read(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);

    let name = path
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string();

    let mut catalog = Catalog::new(name, language);
    catalog.functions = extract_functions(&content, &path.display().to_string());
    catalog.includes = extract_includes(&content);
    catalog.source_files.push(path.display().to_string());
    Ok(catalog)
}

/* ============================================================
   Files
   ============================================================ */

fn load_project_config(root: &Path) -> Result<ProjectConfig, CatalogError> {
    let path = root.join(PROJECT_CONFIG_FILE);
    if !path.is_file() {
        return Ok(ProjectConfig::default());
    }
    let raw = fs::read_to_string(&path).map_err(|source| CatalogError::Io { path, source })?;
    Ok(toml::from_str(&raw)?)
}

fn collect_source_files(root: &Path, source_dirs: &[String], language: Language) -> Vec<PathBuf> {
    let exts = language.source_extensions();

    let walk = |dir: &Path| -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| !is_ignored(e.path()))
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|x| x.to_str())
                    .map(|x| exts.contains(&x))
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        out.sort();
        out
    };

    let mut files = Vec::new();
    for dir in source_dirs {
        let p = root.join(dir);
        if p.is_dir() {
            files.extend(walk(&p));
        }
    }

    if files.is_empty() {
        files = walk(root);
    }

    files.truncate(MAX_SOURCE_FILES);
    files
}

/* ============================================================
   Signatures
   ============================================================ */

fn definition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^[ \t]*(?P<quals>(?:(?:static|inline|extern)\s+)*)(?P<ret>[A-Za-z_]\w*(?:\s+[A-Za-z_]\w*)*(?:\s*\*+)?)\s*\b(?P<name>[A-Za-z_]\w*)\s*\((?P<params>[^)]*)\)\s*\{",
        )
        .expect("definition regex is valid")
    })
}

fn include_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*#\s*include\s*[<"]([^>"]+)[>"]"#).expect("include regex is valid")
    })
}

pub fn extract_functions(content: &str, file_path: &str) -> Vec<FunctionSignature> {
    let mut out = Vec::new();

    for caps in definition_regex().captures_iter(content) {
        let name = &caps["name"];
        let ret = caps["ret"].trim();
        let first_ret_word = ret.split_whitespace().next().unwrap_or("");

        if KEYWORDS.contains(&name) || KEYWORDS.contains(&first_ret_word) {
            continue;
        }
        if LIBC_NAMES.contains(&name) {
            continue;
        }

        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let line = content[..start].matches('\n').count() + 1;

        out.push(FunctionSignature {
            name: name.to_string(),
            return_type: ret.to_string(),
            params: parse_params(&caps["params"]),
            file_path: file_path.to_string(),
            line,
            is_public: !caps["quals"].contains("static"),
            docstring: None,
        });
    }

    out
}

fn parse_params(raw: &str) -> Vec<Param> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "void" {
        return Vec::new();
    }

    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "...")
        .filter_map(|p| {
            let is_pointer = p.contains('*') || p.contains('[');
            let cleaned = p.split('[').next().unwrap_or(p);
            let name_start = cleaned
                .rfind(|c: char| !(c.is_alphanumeric() || c == '_'))
                .map(|i| i + 1)
                .unwrap_or(0);

            let name = cleaned[name_start..].trim();
            let ty = cleaned[..name_start].replace('*', " ");
            let ty = ty.split_whitespace().collect::<Vec<_>>().join(" ");

            if name.is_empty() || ty.is_empty() {
                return None;
            }

            Some(Param {
                name: name.to_string(),
                ty,
                is_pointer,
            })
        })
        .collect()
}

pub fn extract_includes(content: &str) -> Vec<String> {
    include_regex()
        .captures_iter(content)
        .map(|c| c[1].to_string())
        .collect()
}
