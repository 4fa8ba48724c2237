//! Batch accumulation of postings and sorted segment files.
//!
//! A segment is a text file of posting lines ordered by [`term::compare`].
//! Segments are named from one build-wide [`SegmentNamer`] so a number is
//! never handed out twice, even across merge passes.

use crate::error::{IndexError, Result};
use crate::index::DocStats;
use crate::posting::{DocNum, PostingList};
use crate::term::{self, fold};
use crate::tokenizer::Token;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hands out monotonically increasing segment file names.
#[derive(Debug, Default)]
pub struct SegmentNamer {
    next: AtomicU64,
}

impl SegmentNamer {
    pub fn next_path(&self, dir: &Path) -> PathBuf {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        dir.join(format!("segment{n:06}.txt"))
    }

    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Buffers the postings of a batch of documents and flushes them as one
/// sorted segment.
pub struct SegmentWriter {
    dir: PathBuf,
    namer: Arc<SegmentNamer>,
    batch_size: usize,
    buffer: HashMap<String, PostingList>,
    docs_in_batch: usize,
    next_doc: DocNum,
    segments: Vec<PathBuf>,
    doc_stats: Vec<DocStats>,
}

impl SegmentWriter {
    pub fn new(dir: impl Into<PathBuf>, batch_size: usize, namer: Arc<SegmentNamer>) -> Self {
        Self {
            dir: dir.into(),
            namer,
            batch_size: batch_size.max(1),
            buffer: HashMap::new(),
            docs_in_batch: 0,
            next_doc: 0,
            segments: Vec::new(),
            doc_stats: Vec::new(),
        }
    }

    /// Records one token occurrence under its case-folded key. A lowercase
    /// sighting turns the stored form lowercase; digit terms keep their
    /// first form.
    pub fn record(&mut self, token: &Token, doc: DocNum, position: u32) {
        let key = fold(&token.text);
        match self.buffer.get_mut(&key) {
            Some(list) => {
                if list.term != token.text {
                    list.term = term::resolve_casing(&list.term, &token.text);
                }
                list.is_entity |= token.is_entity;
                list.record(doc, position);
            }
            None => {
                let mut list = PostingList::new(token.text.clone(), token.is_entity);
                list.record(doc, position);
                self.buffer.insert(key, list);
            }
        }
    }

    /// Assigns the next document number, records every token at its list
    /// position and flushes once the batch is full.
    pub fn add_document(&mut self, doc_id: &str, tokens: &[Token]) -> Result<DocNum> {
        let doc = self.next_doc;
        self.next_doc += 1;

        let mut tf: HashMap<String, u32> = HashMap::new();
        for (pos, token) in tokens.iter().enumerate() {
            self.record(token, doc, pos as u32);
            *tf.entry(fold(&token.text)).or_insert(0) += 1;
        }
        self.doc_stats.push(DocStats {
            doc_num: doc,
            doc_id: doc_id.to_string(),
            max_tf: tf.values().copied().max().unwrap_or(0),
            unique_terms: tf.len() as u32,
            length: tokens.len() as u32,
        });

        self.docs_in_batch += 1;
        if self.docs_in_batch >= self.batch_size {
            self.flush()?;
        }
        Ok(doc)
    }

    /// Writes the buffered terms as one sorted segment and clears the buffer.
    /// Returns `None` when nothing was buffered.
    pub fn flush(&mut self) -> Result<Option<PathBuf>> {
        self.docs_in_batch = 0;
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let mut lists: Vec<PostingList> = self.buffer.drain().map(|(_, list)| list).collect();
        lists.sort_by(|a, b| term::compare(&a.term, &b.term));

        let path = self.namer.next_path(&self.dir);
        let mut f = BufWriter::new(File::create(&path)?);
        for list in &lists {
            f.write_all(list.encode().as_bytes())?;
            f.write_all(b"\n")?;
        }
        f.flush()?;
        tracing::debug!(segment = %path.display(), terms = lists.len(), "flushed segment");
        self.segments.push(path.clone());
        Ok(Some(path))
    }

    pub fn documents_seen(&self) -> u32 {
        self.next_doc
    }

    /// Flushes the last partial batch and hands back every segment written
    /// plus the per-document statistics.
    pub fn finish(mut self) -> Result<(Vec<PathBuf>, Vec<DocStats>)> {
        self.flush()?;
        Ok((self.segments, self.doc_stats))
    }
}

/// Line-at-a-time reader over a segment with one line of lookahead.
pub struct SegmentReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    current: Option<String>,
}

impl SegmentReader {
    pub fn open(path: &Path) -> Result<Self> {
        let f = File::open(path).map_err(|e| IndexError::input(path, e))?;
        let mut reader = Self { path: path.to_path_buf(), lines: BufReader::new(f).lines(), current: None };
        reader.advance()?;
        Ok(reader)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn peek(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Takes the current line and loads the next non-empty one.
    pub fn advance(&mut self) -> Result<Option<String>> {
        let taken = self.current.take();
        for line in self.lines.by_ref() {
            let line = line?;
            if !line.is_empty() {
                self.current = Some(line);
                break;
            }
        }
        Ok(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn words(ws: &[&str]) -> Vec<Token> {
        ws.iter().map(|w| Token::word(*w)).collect()
    }

    #[test]
    fn flush_writes_sorted_case_insensitive_segment() {
        let dir = tempdir().unwrap();
        let mut w = SegmentWriter::new(dir.path(), 10, Arc::new(SegmentNamer::default()));
        w.add_document("d0", &words(&["zebra", "Apple", "42", "banana"])).unwrap();
        w.add_document("d1", &words(&["apple", "Zebra"])).unwrap();
        let path = w.flush().unwrap().unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "42|0:2_1_\napple|0:1_1_1:0_1_\nbanana|0:3_1_\nzebra|0:0_1_1:1_1_\n");
    }

    #[test]
    fn uppercase_form_kept_until_lowercase_seen() {
        let dir = tempdir().unwrap();
        let mut w = SegmentWriter::new(dir.path(), 10, Arc::new(SegmentNamer::default()));
        w.add_document("d0", &words(&["Apple", "APPLE", "Pear"])).unwrap();
        let text = std::fs::read_to_string(w.flush().unwrap().unwrap()).unwrap();
        assert_eq!(text, "Apple|0:0,1_2_\nPear|0:2_1_\n");
    }

    #[test]
    fn batch_size_triggers_flush_and_numbers_never_repeat() {
        let dir = tempdir().unwrap();
        let namer = Arc::new(SegmentNamer::default());
        let mut w = SegmentWriter::new(dir.path(), 2, namer.clone());
        for i in 0..5 {
            w.add_document(&format!("d{i}"), &words(&["term"])).unwrap();
        }
        let (segments, stats) = w.finish().unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(namer.issued(), 3);
        assert_eq!(stats.len(), 5);
        let names: std::collections::HashSet<_> = segments.iter().collect();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn document_statistics_count_folded_terms() {
        let dir = tempdir().unwrap();
        let mut w = SegmentWriter::new(dir.path(), 10, Arc::new(SegmentNamer::default()));
        w.add_document("FT-1", &words(&["Market", "market", "fall", "market"])).unwrap();
        let (_, stats) = w.finish().unwrap();
        assert_eq!(
            stats[0],
            DocStats { doc_num: 0, doc_id: "FT-1".into(), max_tf: 3, unique_terms: 2, length: 4 }
        );
    }

    #[test]
    fn empty_flush_writes_nothing() {
        let dir = tempdir().unwrap();
        let mut w = SegmentWriter::new(dir.path(), 10, Arc::new(SegmentNamer::default()));
        assert!(w.flush().unwrap().is_none());
    }
}
