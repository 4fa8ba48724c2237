//! End-to-end index build: documents to segments, segments to the final
//! two, those two to the published bucket files.

use crate::config::BuildConfig;
use crate::error::Result;
use crate::index::MetaFile;
use crate::merge::{MergeState, SegmentMerger};
use crate::persist::{save_meta, IndexPaths};
use crate::segment::{SegmentNamer, SegmentWriter};
use crate::source::{CorpusReader, RawDocument};
use crate::split::{IndexSplitter, SplitSummary};
use crate::tokenizer::{stem_tokens, NoStem, Normalizer, PorterStemmer, Stem};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub index_dir: PathBuf,
    pub num_docs: u32,
    pub segments_written: u64,
    pub split: SplitSummary,
}

pub struct IndexBuilder {
    config: BuildConfig,
    stemmer: Box<dyn Stem>,
}

impl IndexBuilder {
    pub fn new(config: BuildConfig) -> Self {
        let stemmer: Box<dyn Stem> = if config.stem { Box::new(PorterStemmer::default()) } else { Box::new(NoStem) };
        Self { config, stemmer }
    }

    /// Swaps in another stemming function for stemmed builds.
    pub fn with_stemmer(mut self, stemmer: Box<dyn Stem>) -> Self {
        self.stemmer = stemmer;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Builds from a corpus directory or file into `output_root/index[Stem]`.
    pub fn build(&self, corpus: &Path, output_root: &Path) -> Result<BuildSummary> {
        let reader = CorpusReader::open(corpus)?;
        let normalizer = match reader.stopwords_file() {
            Some(path) => Normalizer::from_stopwords_file(&path)?,
            None => Normalizer::default(),
        };
        self.build_from(reader.documents(), reader.total_bytes(), &normalizer, output_root)
    }

    /// Builds from any document stream. The index is assembled in a staging
    /// directory and only renamed into place once its manifest is written; a
    /// failed build removes the staging area and leaves any previous index
    /// untouched.
    pub fn build_from<I>(&self, documents: I, corpus_bytes: u64, normalizer: &Normalizer, output_root: &Path) -> Result<BuildSummary>
    where
        I: IntoIterator<Item = Result<RawDocument>>,
    {
        let dir_name = IndexPaths::dir_name(self.config.stem);
        let staging = output_root.join(format!(".{dir_name}.staging"));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let target = IndexPaths::under(output_root, self.config.stem);
        let result = self
            .build_staged(documents, corpus_bytes, normalizer, &staging)
            .and_then(|summary| {
                publish(&summary.index_dir, &target.dir, &staging)?;
                Ok(summary)
            });
        match result {
            Ok(mut summary) => {
                if let Err(e) = fs::remove_dir_all(&staging) {
                    tracing::warn!(error = %e, dir = %staging.display(), "could not remove staging area");
                }
                summary.index_dir = target.dir;
                tracing::info!(dir = %summary.index_dir.display(), docs = summary.num_docs, "index published");
                Ok(summary)
            }
            Err(e) => {
                tracing::warn!(error = %e, "index build failed, discarding staging area");
                let _ = fs::remove_dir_all(&staging);
                Err(e)
            }
        }
    }

    fn build_staged<I>(&self, documents: I, corpus_bytes: u64, normalizer: &Normalizer, staging: &Path) -> Result<BuildSummary>
    where
        I: IntoIterator<Item = Result<RawDocument>>,
    {
        let dir_a = staging.join("A");
        let dir_b = staging.join("B");
        fs::create_dir_all(&dir_a)?;
        fs::create_dir_all(&dir_b)?;

        let batch_size = self.config.effective_batch_size(corpus_bytes);
        let namer = Arc::new(SegmentNamer::default());
        let mut writer = SegmentWriter::new(&dir_a, batch_size, namer.clone());
        tracing::info!(batch_size, stem = self.config.stem, "indexing documents");

        for doc in documents {
            let doc = doc?;
            let tokens = normalizer.normalize(&doc.text);
            let tokens = if self.config.stem { stem_tokens(tokens, self.stemmer.as_ref()) } else { tokens };
            writer.add_document(&doc.id, &tokens)?;
        }
        let num_docs = writer.documents_seen();
        let (segments, doc_stats) = writer.finish()?;
        tracing::info!(num_docs, segments = segments.len(), "documents indexed");

        let merger = SegmentMerger::new(namer.clone(), self.config.merge_buffer_bytes, self.config.merge_workers);
        let finals = merger.merge_to_final(MergeState::new(segments, &dir_a, &dir_b))?;

        let paths = IndexPaths::at(staging.join(IndexPaths::dir_name(self.config.stem)), self.config.stem);
        let splitter = IndexSplitter::new(self.config.min_total_tf, self.config.merge_buffer_bytes);
        let split = splitter.split(&finals, &doc_stats, &paths)?;

        let meta = MetaFile {
            num_docs,
            num_terms: split.kept_terms,
            min_total_tf: self.config.min_total_tf,
            stem: self.config.stem,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
            version: FORMAT_VERSION,
        };
        save_meta(&paths, &meta)?;

        Ok(BuildSummary { index_dir: paths.dir, num_docs, segments_written: namer.issued(), split })
    }
}

/// Moves a finished index from `staged` to `target`. A previously published
/// index is parked inside `staging` first and put back if the move fails.
fn publish(staged: &Path, target: &Path, staging: &Path) -> Result<()> {
    let parked = staging.join("previous");
    let had_previous = target.exists();
    if had_previous {
        fs::rename(target, &parked)?;
    }
    if let Err(e) = fs::rename(staged, target) {
        if had_previous {
            if let Err(restore) = fs::rename(&parked, target) {
                tracing::error!(error = %restore, dir = %target.display(), "could not restore previous index");
            }
        }
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn failed_publish_restores_previous_index() {
        let root = tempdir().unwrap();
        let target = root.path().join("index");
        let staging = root.path().join(".index.staging");
        fs::create_dir_all(&target).unwrap();
        fs::create_dir_all(&staging).unwrap();
        fs::write(target.join("meta.json"), "{}").unwrap();

        let missing = staging.join("index");
        assert!(publish(&missing, &target, &staging).is_err());
        assert_eq!(fs::read_to_string(target.join("meta.json")).unwrap(), "{}");
        assert!(!staging.join("previous").exists());
    }

    #[test]
    fn publish_replaces_previous_index() {
        let root = tempdir().unwrap();
        let target = root.path().join("index");
        let staging = root.path().join(".index.staging");
        let staged = staging.join("index");
        fs::create_dir_all(&target).unwrap();
        fs::create_dir_all(&staged).unwrap();
        fs::write(target.join("meta.json"), "old").unwrap();
        fs::write(staged.join("meta.json"), "new").unwrap();

        publish(&staged, &target, &staging).unwrap();
        assert_eq!(fs::read_to_string(target.join("meta.json")).unwrap(), "new");
        assert_eq!(fs::read_to_string(staging.join("previous").join("meta.json")).unwrap(), "old");
    }
}
