//! Markdown knowledge base loading

use crate::errors::IngestionError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One knowledge base note
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// File name, e.g. `cpt_analysis.md`
    pub source: String,
    /// File name without extension
    pub stem: String,
    pub title: String,
    pub content: String,
    pub path: PathBuf,
}

/// Load every non-empty `*.md` file in `dir`, sorted by file name
pub fn load_documents(dir: impl AsRef<Path>) -> Result<Vec<Document>, IngestionError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(IngestionError::KnowledgeBaseNotFound(dir.display().to_string()));
    }

    let read_err = |source| IngestionError::Read {
        path: dir.display().to_string(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let content = std::fs::read_to_string(&path).map_err(|source| IngestionError::Read {
            path: path.display().to_string(),
            source,
        })?;
        if content.trim().is_empty() {
            warn!(file = %path.display(), "Skipping empty markdown file");
            continue;
        }

        let Some(source) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            warn!(file = %path.display(), "Skipping file with non UTF-8 name");
            continue;
        };
        let stem = source.trim_end_matches(".md").to_string();
        let title = extract_title(&content, &stem);

        debug!(source = %source, title = %title, words = content.split_whitespace().count(), "Loaded note");
        documents.push(Document {
            source,
            stem,
            title,
            content,
            path,
        });
    }

    info!(dir = %dir.display(), documents = documents.len(), "Knowledge base loaded");
    Ok(documents)
}

/// First `#`/`##` heading, or the title-cased file stem
pub fn extract_title(content: &str, stem: &str) -> String {
    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("# ").or_else(|| line.strip_prefix("## ")) {
            let rest = rest.trim();
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }

    stem.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
