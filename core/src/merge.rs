//! External merge of sorted segments through two alternating staging
//! directories.

use crate::error::Result;
use crate::posting::split_line;
use crate::segment::{SegmentNamer, SegmentReader};
use crate::term;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where one merge pass reads from and writes to. Every pass consumes a state
/// and returns the next one with the directories swapped.
#[derive(Debug, Clone)]
pub struct MergeState {
    pub source_segments: Vec<PathBuf>,
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
}

impl MergeState {
    pub fn new(source_segments: Vec<PathBuf>, source_dir: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        Self { source_segments, source_dir: source_dir.into(), dest_dir: dest_dir.into() }
    }

    pub fn is_final(&self) -> bool {
        self.source_segments.len() <= 2
    }
}

pub struct SegmentMerger {
    namer: Arc<SegmentNamer>,
    buffer_bytes: usize,
    workers: usize,
}

impl SegmentMerger {
    pub fn new(namer: Arc<SegmentNamer>, buffer_bytes: usize, workers: usize) -> Self {
        Self { namer, buffer_bytes: buffer_bytes.max(1), workers: workers.max(1) }
    }

    /// Runs passes until at most two segments remain and returns them.
    pub fn merge_to_final(&self, mut state: MergeState) -> Result<Vec<PathBuf>> {
        let mut passes = 0;
        while !state.is_final() {
            state = self.run_pass(state)?;
            passes += 1;
        }
        tracing::info!(passes, remaining = state.source_segments.len(), "segment merge finished");
        Ok(state.source_segments)
    }

    /// One pass: merge neighbouring segments pairwise into the destination,
    /// carry an odd last segment over unchanged, delete what was consumed.
    ///
    /// `source_segments` is ordered by the document range it covers and the
    /// returned list keeps that order, so document blocks stay ascending.
    pub fn run_pass(&self, state: MergeState) -> Result<MergeState> {
        let MergeState { mut source_segments, source_dir, dest_dir } = state;
        fs::create_dir_all(&dest_dir)?;
        let carry = if source_segments.len() % 2 == 1 { source_segments.pop() } else { None };

        let jobs: Vec<(PathBuf, PathBuf, PathBuf)> = source_segments
            .chunks(2)
            .map(|pair| (pair[0].clone(), pair[1].clone(), self.namer.next_path(&dest_dir)))
            .collect();
        tracing::debug!(pairs = jobs.len(), carried = carry.is_some(), dest = %dest_dir.display(), "merge pass");

        self.run_jobs(&jobs)?;
        let mut produced: Vec<PathBuf> = jobs.into_iter().map(|(_, _, out)| out).collect();
        if let Some(carry) = carry {
            produced.push(move_into(&carry, &dest_dir)?);
        }

        Ok(MergeState { source_segments: produced, source_dir: dest_dir, dest_dir: source_dir })
    }

    fn run_jobs(&self, jobs: &[(PathBuf, PathBuf, PathBuf)]) -> Result<()> {
        let buffer_bytes = self.buffer_bytes;
        let run = |(left, right, out): &(PathBuf, PathBuf, PathBuf)| -> Result<()> {
            merge_pair(left, right, out, buffer_bytes)?;
            fs::remove_file(left)?;
            fs::remove_file(right)?;
            Ok(())
        };
        if self.workers == 1 || jobs.len() < 2 {
            return jobs.iter().try_for_each(run);
        }
        match rayon::ThreadPoolBuilder::new().num_threads(self.workers).build() {
            Ok(pool) => pool.install(|| jobs.par_iter().try_for_each(run)),
            Err(e) => {
                tracing::warn!(error = %e, "merge worker pool unavailable, merging sequentially");
                jobs.iter().try_for_each(run)
            }
        }
    }
}

fn move_into(segment: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = segment.file_name().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("carry.txt"));
    let dest = dest_dir.join(name);
    fs::rename(segment, &dest)?;
    Ok(dest)
}

/// Buffered output of a merge or of the split. `buffer_bytes` sizes the
/// write buffer only; input posting lines are still read whole.
pub(crate) struct LineSink {
    writer: BufWriter<File>,
}

impl LineSink {
    pub(crate) fn create(path: &Path, buffer_bytes: usize) -> Result<Self> {
        Ok(Self { writer: BufWriter::with_capacity(buffer_bytes.max(1), File::create(path)?) })
    }

    pub(crate) fn write_parts(&mut self, parts: &[&str]) -> Result<()> {
        for part in parts {
            self.writer.write_all(part.as_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

enum Step {
    Left,
    Right,
    Both,
    Done,
}

/// 2-way merge-join of two sorted segments into `out`. Lines of the same
/// term are joined by concatenating their document blocks.
pub fn merge_pair(left: &Path, right: &Path, out: &Path, buffer_bytes: usize) -> Result<()> {
    let result = merge_pair_inner(left, right, out, buffer_bytes);
    if result.is_err() {
        let _ = fs::remove_file(out);
    }
    result
}

fn merge_pair_inner(left: &Path, right: &Path, out: &Path, buffer_bytes: usize) -> Result<()> {
    let mut l = SegmentReader::open(left)?;
    let mut r = SegmentReader::open(right)?;
    let mut sink = LineSink::create(out, buffer_bytes)?;

    loop {
        let step = match (l.peek(), r.peek()) {
            (None, None) => Step::Done,
            (Some(_), None) => Step::Left,
            (None, Some(_)) => Step::Right,
            (Some(a), Some(b)) => {
                let (ta, _) = split_line(a)?;
                let (tb, _) = split_line(b)?;
                match term::compare(ta, tb) {
                    Ordering::Less => Step::Left,
                    Ordering::Greater => Step::Right,
                    Ordering::Equal => Step::Both,
                }
            }
        };
        match step {
            Step::Done => break,
            Step::Left => copy_line(&mut sink, l.advance()?)?,
            Step::Right => copy_line(&mut sink, r.advance()?)?,
            Step::Both => {
                let (a, b) = (l.advance()?.unwrap_or_default(), r.advance()?.unwrap_or_default());
                let (ta, blocks_a) = split_line(&a)?;
                let (tb, blocks_b) = split_line(&b)?;
                let merged = term::resolve_casing(ta, tb);
                sink.write_parts(&[merged.as_str(), "|", blocks_a, blocks_b, "\n"])?;
            }
        }
    }
    sink.finish()
}

fn copy_line(sink: &mut LineSink, line: Option<String>) -> Result<()> {
    match line {
        Some(line) => sink.write_parts(&[line.as_str(), "\n"]),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn pair_merge_joins_shared_terms() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a", "7up|0:1_1_\nApple|0:0_1_\nzoo|0:2_1_\n");
        let b = write(dir.path(), "b", "7UP|1:4_1_\napple|1:0,3_2_\nmango|1:1_1_\n");
        let out = dir.path().join("out");
        merge_pair(&a, &b, &out, 4).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert_eq!(
            text,
            "7up|0:1_1_1:4_1_\napple|0:0_1_1:0,3_2_\nmango|1:1_1_\nzoo|0:2_1_\n"
        );
    }

    #[test]
    fn uppercase_pair_stays_uppercase() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a", "NATO|0:0_1_\n");
        let b = write(dir.path(), "b", "Nato|1:0_1_\n");
        let out = dir.path().join("out");
        merge_pair(&a, &b, &out, 1 << 20).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "NATO|0:0_1_1:0_1_\n");
    }

    #[test]
    fn malformed_line_fails_and_removes_output() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a", "broken line\n");
        let b = write(dir.path(), "b", "apple|1:0_1_\n");
        let out = dir.path().join("out");
        assert!(merge_pair(&a, &b, &out, 1024).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn passes_reduce_to_two_segments() {
        let root = tempdir().unwrap();
        let (da, db) = (root.path().join("A"), root.path().join("B"));
        fs::create_dir_all(&da).unwrap();
        let namer = Arc::new(SegmentNamer::default());
        let mut segments = Vec::new();
        for i in 0..7u32 {
            let p = namer.next_path(&da);
            fs::write(&p, format!("common|{i}:0_1_\nterm{i}|{i}:1_1_\n")).unwrap();
            segments.push(p);
        }
        let merger = SegmentMerger::new(namer, 1024, 1);
        let finals = merger.merge_to_final(MergeState::new(segments, &da, &db)).unwrap();
        assert_eq!(finals.len(), 2);

        let remaining = fs::read_dir(&da).unwrap().count() + fs::read_dir(&db).unwrap().count();
        assert_eq!(remaining, 2);

        let mut common_docs = 0;
        for f in &finals {
            for line in fs::read_to_string(f).unwrap().lines() {
                if line.starts_with("common|") {
                    common_docs += crate::posting::block_stats(split_line(line).unwrap().1).unwrap().doc_freq;
                }
            }
        }
        assert_eq!(common_docs, 7);
    }

    #[test]
    fn carried_segment_keeps_document_order() {
        let root = tempdir().unwrap();
        let (da, db) = (root.path().join("A"), root.path().join("B"));
        fs::create_dir_all(&da).unwrap();
        let namer = Arc::new(SegmentNamer::default());
        let segments: Vec<PathBuf> = (0..5u32)
            .map(|i| {
                let p = namer.next_path(&da);
                fs::write(&p, format!("market|{i}:0_1_\n")).unwrap();
                p
            })
            .collect();
        let merger = SegmentMerger::new(namer, 1024, 1);
        let finals = merger.merge_to_final(MergeState::new(segments, &da, &db)).unwrap();

        let mut docs = Vec::new();
        for f in &finals {
            let text = fs::read_to_string(f).unwrap();
            let list = crate::posting::PostingList::decode(text.trim_end()).unwrap();
            docs.extend(list.documents().iter().map(|(d, _)| *d));
        }
        assert_eq!(docs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn parallel_pass_matches_sequential_output() {
        let root = tempdir().unwrap();
        let mut outputs = Vec::new();
        for workers in [1usize, 4] {
            let base = root.path().join(format!("w{workers}"));
            let (da, db) = (base.join("A"), base.join("B"));
            fs::create_dir_all(&da).unwrap();
            let namer = Arc::new(SegmentNamer::default());
            let segments: Vec<PathBuf> = (0..8u32)
                .map(|i| {
                    let p = namer.next_path(&da);
                    fs::write(&p, format!("alpha|{i}:0_1_\nbeta{}|{i}:1_1_\n", i % 3)).unwrap();
                    p
                })
                .collect();
            let merger = SegmentMerger::new(namer, 1024, workers);
            let state = merger.run_pass(MergeState::new(segments, &da, &db)).unwrap();
            let texts: Vec<(String, String)> = state
                .source_segments
                .iter()
                .map(|p| (p.file_name().unwrap().to_string_lossy().into_owned(), fs::read_to_string(p).unwrap()))
                .collect();
            outputs.push(texts);
        }
        assert_eq!(outputs[0], outputs[1]);
    }
}
