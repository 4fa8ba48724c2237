use lazy_static::lazy_static;
use regex::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{IndexError, Result};

/// File in a corpus root that lists stop words rather than documents.
pub const STOPWORDS_FILE: &str = "stop_words.txt";

lazy_static! {
    static ref DOC_RE: Regex = Regex::new(r"(?s)<DOC>(.*?)</DOC>").expect("valid regex");
    static ref DOCNO_RE: Regex = Regex::new(r"(?s)<DOCNO>\s*(.*?)\s*</DOCNO>").expect("valid regex");
    static ref TEXT_RE: Regex = Regex::new(r"(?s)<TEXT>(.*?)</TEXT>").expect("valid regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub id: String,
    pub text: String,
}

/// Files of a corpus directory (or a single corpus file) and their total size.
#[derive(Debug, Clone)]
pub struct CorpusReader {
    root: PathBuf,
    files: Vec<PathBuf>,
    total_bytes: u64,
}

impl CorpusReader {
    pub fn open(root: &Path) -> Result<Self> {
        let meta = std::fs::metadata(root).map_err(|e| IndexError::input(root, e))?;
        let mut files = Vec::new();
        let mut total_bytes = 0;
        if meta.is_file() {
            total_bytes = meta.len();
            files.push(root.to_path_buf());
        } else {
            for entry in WalkDir::new(root).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                    IndexError::input(path, e.into())
                })?;
                if !entry.file_type().is_file() || entry.file_name() == STOPWORDS_FILE {
                    continue;
                }
                total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
                files.push(entry.into_path());
            }
        }
        tracing::info!(root = %root.display(), files = files.len(), total_bytes, "corpus opened");
        Ok(Self { root: root.to_path_buf(), files, total_bytes })
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// The corpus stop word list, when one ships next to the documents.
    pub fn stopwords_file(&self) -> Option<PathBuf> {
        let candidate = self.root.join(STOPWORDS_FILE);
        candidate.is_file().then_some(candidate)
    }

    pub fn documents(&self) -> Documents {
        Documents { files: self.files.clone().into(), pending: VecDeque::new() }
    }
}

/// Streams documents file by file.
pub struct Documents {
    files: VecDeque<PathBuf>,
    pending: VecDeque<RawDocument>,
}

impl Iterator for Documents {
    type Item = Result<RawDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.pending.pop_front() {
                return Some(Ok(doc));
            }
            let path = self.files.pop_front()?;
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => return Some(Err(IndexError::input(&path, e))),
            };
            let content = String::from_utf8_lossy(&bytes);
            self.pending.extend(extract_documents(&path, &content));
        }
    }
}

/// Pulls `<DOC>` records out of a file. Records without `<TEXT>` are skipped;
/// a file with no `<DOC>` markup is one document named after the file.
pub fn extract_documents(path: &Path, content: &str) -> Vec<RawDocument> {
    let mut docs = Vec::new();
    let mut tagged = false;
    for cap in DOC_RE.captures_iter(content) {
        tagged = true;
        let body = &cap[1];
        let (Some(id), Some(text)) = (DOCNO_RE.captures(body), TEXT_RE.captures(body)) else {
            tracing::warn!(file = %path.display(), "skipping <DOC> without <DOCNO> or <TEXT>");
            continue;
        };
        docs.push(RawDocument { id: id[1].to_string(), text: text[1].to_string() });
    }
    if !tagged && !content.trim().is_empty() {
        let id = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        docs.push(RawDocument { id, text: content.to_string() });
    }
    docs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn extracts_tagged_records() {
        let content = "<DOC>\n<DOCNO> FBIS3-1 </DOCNO>\n<TEXT>\nfirst body\n</TEXT>\n</DOC>\n\
                       <DOC><DOCNO>FBIS3-2</DOCNO><HEADER>no text</HEADER></DOC>\n\
                       <DOC><DOCNO>FBIS3-3</DOCNO><TEXT>third</TEXT></DOC>";
        let docs = extract_documents(Path::new("f"), content);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "FBIS3-1");
        assert_eq!(docs[0].text.trim(), "first body");
        assert_eq!(docs[1].id, "FBIS3-3");
    }

    #[test]
    fn walks_directory_and_skips_stopwords() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/a.txt"), "plain text document").unwrap();
        std::fs::write(dir.path().join("b"), "<DOC><DOCNO>B1</DOCNO><TEXT>x</TEXT></DOC>").unwrap();
        std::fs::write(dir.path().join(STOPWORDS_FILE), "the\n").unwrap();

        let corpus = CorpusReader::open(dir.path()).unwrap();
        assert_eq!(corpus.file_count(), 2);
        assert!(corpus.stopwords_file().is_some());
        let ids: Vec<String> = corpus.documents().map(|d| d.unwrap().id).collect();
        assert_eq!(ids, vec!["B1".to_string(), "a".to_string()]);
    }

    #[test]
    fn missing_corpus_is_an_input_error() {
        let dir = tempdir().unwrap();
        let err = CorpusReader::open(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, IndexError::Input { .. }));
    }
}
