//! Final split of the merged segments into the 27 bucket files, the term
//! dictionary and the document statistics table.

use crate::error::{IndexError, Result};
use crate::index::{DictionaryEntry, DocStats};
use crate::merge::LineSink;
use crate::persist::{save_document_details, save_entities, IndexPaths};
use crate::posting::{block_stats, split_line, Blocks, DocNum, LineStats};
use crate::segment::SegmentReader;
use crate::term::{self, TermClass};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SplitSummary {
    pub kept_terms: u64,
    pub dropped_terms: u64,
    /// Kept terms per bucket, indexed by [`TermClass::ordinal`].
    pub bucket_terms: Vec<u64>,
}

/// Entities remembered per document for the summary file.
pub const ENTITIES_PER_DOC: usize = 5;

/// Most frequent kept entities of each document, `(tf, term)` sorted by
/// descending tf then term.
pub type EntitySummary = HashMap<DocNum, Vec<(u32, String)>>;

pub struct IndexSplitter {
    min_total_tf: u64,
    buffer_bytes: usize,
}

impl IndexSplitter {
    pub fn new(min_total_tf: u64, buffer_bytes: usize) -> Self {
        Self { min_total_tf, buffer_bytes: buffer_bytes.max(1) }
    }

    /// Drains the sorted `segments` bucket by bucket (`Num`, then `A` to `Z`)
    /// in one forward pass, joining lines of the same term across inputs.
    /// Consumed segments are deleted afterwards.
    pub fn split(&self, segments: &[PathBuf], docs: &[DocStats], paths: &IndexPaths) -> Result<SplitSummary> {
        fs::create_dir_all(&paths.dir)?;
        let mut readers = segments.iter().map(|p| SegmentReader::open(p)).collect::<Result<Vec<_>>>()?;
        let mut dictionary = BufWriter::new(File::create(paths.dictionary())?);
        let mut summary = SplitSummary { bucket_terms: vec![0; TermClass::COUNT], ..SplitSummary::default() };
        let mut entities = EntitySummary::new();

        for class in TermClass::all() {
            let mut bucket = LineSink::create(&paths.bucket(class), self.buffer_bytes)?;
            let mut kept = 0u64;
            while let Some(members) = next_term_group(&readers, class)? {
                let lines = members
                    .iter()
                    .map(|&i| readers[i].advance().map(Option::unwrap_or_default))
                    .collect::<Result<Vec<String>>>()?;
                if self.write_term(&lines, &mut bucket, &mut dictionary, &mut entities)? {
                    kept += 1;
                } else {
                    summary.dropped_terms += 1;
                }
            }
            bucket.finish()?;
            summary.bucket_terms[class.ordinal()] = kept;
            summary.kept_terms += kept;
            tracing::debug!(bucket = %class.bucket_name(), terms = kept, "bucket written");
        }
        dictionary.flush()?;

        save_document_details(paths, docs)?;
        save_entities(paths, &entities)?;
        drop(readers);
        for segment in segments {
            fs::remove_file(segment)?;
        }
        tracing::info!(kept = summary.kept_terms, dropped = summary.dropped_terms, "index split finished");
        Ok(summary)
    }

    /// Joins the lines of one term, applies the frequency threshold and
    /// writes the survivor. Returns whether the term was kept.
    fn write_term(
        &self,
        lines: &[String],
        bucket: &mut LineSink,
        dictionary: &mut impl Write,
        entities: &mut EntitySummary,
    ) -> Result<bool> {
        let mut canonical: Option<String> = None;
        let mut blocks: Vec<&str> = Vec::with_capacity(lines.len());
        let mut stats = LineStats::default();
        for line in lines {
            let (term, body) = split_line(line)?;
            let line_stats = block_stats(body)?;
            stats.total_tf += line_stats.total_tf;
            stats.doc_freq += line_stats.doc_freq;
            canonical = Some(match canonical {
                Some(current) => term::resolve_casing(&current, term),
                None => term.to_string(),
            });
            blocks.push(body);
        }
        let term = canonical.ok_or_else(|| IndexError::format("posting", "empty term group"))?;
        if stats.total_tf < self.min_total_tf {
            return Ok(false);
        }

        let line_bytes = term.len() + 1 + blocks.iter().map(|b| b.len()).sum::<usize>();
        let mut parts: Vec<&str> = Vec::with_capacity(blocks.len() + 3);
        parts.push(term.as_str());
        parts.push("|");
        parts.extend(blocks.iter().copied());
        parts.push("\n");
        bucket.write_parts(&parts)?;

        let entry = DictionaryEntry {
            term: term.clone(),
            total_tf: stats.total_tf,
            doc_freq: stats.doc_freq,
            line_bytes: line_bytes as u64,
        };
        writeln!(dictionary, "{}", entry.encode())?;

        if term::looks_like_entity(&term) {
            for body in &blocks {
                for block in Blocks::new(body) {
                    let (doc, positions) = block?;
                    remember_entity(entities.entry(doc).or_default(), positions.len() as u32, &term);
                }
            }
        }
        Ok(true)
    }
}

fn remember_entity(top: &mut Vec<(u32, String)>, tf: u32, term: &str) {
    let outranked = top.last().map_or(false, |(least, least_term)| {
        *least > tf || (*least == tf && least_term.as_str() <= term)
    });
    if top.len() == ENTITIES_PER_DOC && outranked {
        return;
    }
    top.push((tf, term.to_string()));
    top.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    top.truncate(ENTITIES_PER_DOC);
}

/// Indices of the readers whose current line is the smallest term of
/// `class`, or `None` once the class is exhausted on every input.
fn next_term_group(readers: &[SegmentReader], class: TermClass) -> Result<Option<Vec<usize>>> {
    let mut best: Option<(&str, Vec<usize>)> = None;
    for (i, reader) in readers.iter().enumerate() {
        let Some(line) = reader.peek() else { continue };
        let (term, _) = split_line(line)?;
        let ordinal = TermClass::of(term).ordinal();
        if ordinal < class.ordinal() {
            return Err(IndexError::format(
                "segment",
                format!("{} is out of order at term {term:?}", reader.path().display()),
            ));
        }
        if ordinal > class.ordinal() {
            continue;
        }
        best = match best {
            None => Some((term, vec![i])),
            Some((best_term, mut members)) => match term::compare(term, best_term) {
                Ordering::Less => Some((term, vec![i])),
                Ordering::Equal => {
                    members.push(i);
                    Some((best_term, members))
                }
                Ordering::Greater => Some((best_term, members)),
            },
        };
    }
    Ok(best.map(|(_, members)| members))
}
