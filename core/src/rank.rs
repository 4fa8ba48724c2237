//! Query-time retrieval: bucket lookups, BM25 plus positional scoring and
//! top-K selection over a published index.

use crate::config::RankParams;
use crate::error::Result;
use crate::index::DocStats;
use crate::persist::{load_entities_for, load_index_header, IndexPaths};
use crate::posting::{split_line, DocNum, PostingList};
use crate::term::{self, fold, TermClass};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub score: f64,
    /// Up to five most frequent entities of the document.
    pub entities: Vec<String>,
}

/// Read-only view of an index: dictionary document frequencies and document
/// statistics held in memory, posting lines read from the bucket files per
/// query.
pub struct Ranker {
    paths: IndexPaths,
    params: RankParams,
    doc_freq: HashMap<String, u32>,
    docs: HashMap<DocNum, DocStats>,
    avg_len: f64,
}

impl Ranker {
    /// Opens the `index/` or `indexStem/` variant under `root`.
    pub fn open(root: &Path, stem: bool) -> Result<Self> {
        Self::with_params(IndexPaths::under(root, stem), RankParams::default())
    }

    pub fn with_params(paths: IndexPaths, params: RankParams) -> Result<Self> {
        let (meta, dictionary, docs) = load_index_header(&paths)?;
        let doc_freq = dictionary.into_iter().map(|e| (fold(&e.term), e.doc_freq)).collect();
        let avg_len = average_length(&docs);
        let docs: HashMap<DocNum, DocStats> = docs.into_iter().map(|d| (d.doc_num, d)).collect();
        tracing::info!(dir = %paths.dir.display(), num_docs = meta.num_docs, avg_len, "index opened");
        Ok(Self { paths, params, doc_freq, docs, avg_len })
    }

    pub fn num_docs(&self) -> usize {
        self.docs.len()
    }

    pub fn params(&self) -> &RankParams {
        &self.params
    }

    /// Ranks documents for already normalised query terms. Unknown terms
    /// contribute nothing; a query without known terms yields no hits.
    pub fn rank(&self, query_terms: &[String]) -> Result<Vec<SearchHit>> {
        let postings = self.lookup(query_terms)?;
        if postings.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: BTreeMap<DocNum, Vec<(usize, &[u32])>> = BTreeMap::new();
        for (t, list) in postings.iter().enumerate() {
            for (doc, positions) in list.documents() {
                candidates.entry(*doc).or_default().push((t, positions.as_slice()));
            }
        }

        let n = self.docs.len() as f64;
        let idfs: Vec<f64> = postings
            .iter()
            .map(|list| {
                let df = self.doc_freq.get(&fold(&list.term)).copied().unwrap_or_else(|| list.doc_freq());
                idf(n, df as f64)
            })
            .collect();

        let mut scored: Vec<(DocNum, f64)> = Vec::with_capacity(candidates.len());
        for (doc, matches) in candidates {
            let Some(stats) = self.docs.get(&doc) else { continue };
            let len = stats.length as f64;
            if len == 0.0 {
                continue;
            }
            let mut bm25 = 0.0;
            let mut position = 0.0;
            let mut all_positions: Vec<u32> = Vec::new();
            for (t, positions) in matches {
                let tf = positions.len() as f64;
                bm25 += bm25_term(idfs[t], tf, len, self.avg_len, &self.params);
                position += position_score(positions, len, postings[t].is_entity, &self.params);
                all_positions.extend_from_slice(positions);
            }
            all_positions.sort_unstable();
            position *= 1.0 + self.params.adjacency_bonus * adjacent_pairs(&all_positions) as f64;
            let score = self.params.bm25_weight * bm25 + self.params.position_weight * position;
            scored.push((doc, score));
        }

        let top = top_k(scored, self.params.top_k);
        let wanted: HashSet<DocNum> = top.iter().map(|(doc, _)| *doc).collect();
        let mut entities = load_entities_for(&self.paths, &wanted)?;
        Ok(top
            .into_iter()
            .filter_map(|(doc, score)| {
                let stats = self.docs.get(&doc)?;
                Some(SearchHit { doc_id: stats.doc_id.clone(), score, entities: entities.remove(&doc).unwrap_or_default() })
            })
            .collect())
    }

    /// Collects the posting line of every distinct query term. Terms are
    /// visited in index order so each bucket file is scanned forward once.
    fn lookup(&self, query_terms: &[String]) -> Result<Vec<PostingList>> {
        let mut terms: Vec<&str> = query_terms.iter().map(String::as_str).filter(|t| !t.is_empty()).collect();
        terms.sort_by(|a, b| term::compare(a, b));
        terms.dedup_by(|a, b| term::compare(a, b) == Ordering::Equal);

        let mut found = Vec::new();
        let mut cursor: Option<BucketCursor> = None;
        for t in terms {
            let class = TermClass::of(t);
            if cursor.as_ref().map_or(true, |c| c.class != class) {
                cursor = Some(BucketCursor::open(&self.paths, class)?);
            }
            if let Some(c) = cursor.as_mut() {
                if let Some(line) = c.seek(t)? {
                    found.push(PostingList::decode(&line)?);
                }
            }
        }
        tracing::debug!(terms = query_terms.len(), found = found.len(), "posting lookup");
        Ok(found)
    }
}

/// Forward-only scan over one bucket file. A missing file behaves as empty.
struct BucketCursor {
    class: TermClass,
    lines: Option<Lines<BufReader<File>>>,
    pending: Option<String>,
}

impl BucketCursor {
    fn open(paths: &IndexPaths, class: TermClass) -> Result<Self> {
        let lines = match File::open(paths.bucket(class)) {
            Ok(f) => Some(BufReader::new(f).lines()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(Self { class, lines, pending: None })
    }

    /// Advances to `target`; stops on the first larger term and keeps it for
    /// the next lookup.
    fn seek(&mut self, target: &str) -> Result<Option<String>> {
        loop {
            let line = match self.pending.take() {
                Some(line) => line,
                None => match self.lines.as_mut().and_then(Iterator::next) {
                    Some(line) => line?,
                    None => return Ok(None),
                },
            };
            if line.is_empty() {
                continue;
            }
            let (term, _) = split_line(&line)?;
            match term::compare(term, target) {
                Ordering::Less => continue,
                Ordering::Equal => return Ok(Some(line)),
                Ordering::Greater => {
                    self.pending = Some(line);
                    return Ok(None);
                }
            }
        }
    }
}

fn average_length(docs: &[DocStats]) -> f64 {
    if docs.is_empty() {
        return 0.0;
    }
    docs.iter().map(|d| d.length as f64).sum::<f64>() / docs.len() as f64
}

/// `log2(N / df)`; zero when the term is in every document or in none.
pub fn idf(num_docs: f64, doc_freq: f64) -> f64 {
    if doc_freq <= 0.0 || num_docs <= 0.0 {
        return 0.0;
    }
    (num_docs / doc_freq).log2()
}

pub fn bm25_term(idf: f64, tf: f64, doc_len: f64, avg_len: f64, params: &RankParams) -> f64 {
    let ratio = if avg_len > 0.0 { doc_len / avg_len } else { 1.0 };
    let numerator = tf * (params.k1 + 1.0);
    let denominator = tf + params.k1 * (1.0 - params.b + params.b * ratio);
    idf * numerator / denominator
}

/// Mean of `1 - pos/len` over the term's positions; entity terms add a flat
/// bonus to every position.
pub fn position_score(positions: &[u32], doc_len: f64, is_entity: bool, params: &RankParams) -> f64 {
    if positions.is_empty() || doc_len <= 0.0 {
        return 0.0;
    }
    let bonus = if is_entity { params.entity_bonus } else { 0.0 };
    let sum: f64 = positions.iter().map(|&p| 1.0 - p as f64 / doc_len + bonus).sum();
    sum / positions.len() as f64
}

/// Number of `p, p+1` neighbours in an ascending position list.
pub fn adjacent_pairs(sorted: &[u32]) -> usize {
    sorted.windows(2).filter(|w| w[1] == w[0] + 1).count()
}

/// Highest scores first; equal scores fall back to ascending document number.
pub fn top_k(mut scored: Vec<(DocNum, f64)>, k: usize) -> Vec<(DocNum, f64)> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}

/// One-shot query against the index variant under `index_root`.
pub fn run_query(query_terms: &[String], index_root: &Path, stem: bool) -> Result<Vec<SearchHit>> {
    Ranker::open(index_root, stem)?.rank(query_terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_vanishes_when_every_document_matches() {
        assert_eq!(idf(10.0, 10.0), 0.0);
        assert_eq!(idf(8.0, 2.0), 2.0);
        let p = RankParams::default();
        assert_eq!(bm25_term(idf(5.0, 5.0), 7.0, 10.0, 10.0, &p), 0.0);
    }

    #[test]
    fn bm25_saturates_with_frequency() {
        let p = RankParams::default();
        let one = bm25_term(1.0, 1.0, 10.0, 10.0, &p);
        let five = bm25_term(1.0, 5.0, 10.0, 10.0, &p);
        let fifty = bm25_term(1.0, 50.0, 10.0, 10.0, &p);
        assert!((one - 1.0).abs() < 1e-12);
        assert!(five > one && fifty > five);
        assert!(fifty < p.k1 + 1.0);
    }

    #[test]
    fn earlier_positions_score_higher() {
        let p = RankParams::default();
        let early = position_score(&[0], 10.0, false, &p);
        let late = position_score(&[9], 10.0, false, &p);
        assert!((early - 1.0).abs() < 1e-12);
        assert!((late - 0.1).abs() < 1e-12);
        assert!((position_score(&[0, 5], 10.0, true, &p) - 1.75).abs() < 1e-12);
    }

    #[test]
    fn counts_adjacent_positions() {
        assert_eq!(adjacent_pairs(&[1, 2, 3, 7, 9, 10]), 3);
        assert_eq!(adjacent_pairs(&[4]), 0);
        assert_eq!(adjacent_pairs(&[]), 0);
    }

    #[test]
    fn top_k_truncates_and_breaks_ties_by_document() {
        let scored: Vec<(DocNum, f64)> = (0..120).map(|d| (d, d as f64 * 0.5)).collect();
        let top = top_k(scored, 50);
        assert_eq!(top.len(), 50);
        assert_eq!(top[0].0, 119);
        assert!(top.windows(2).all(|w| w[0].1 > w[1].1));

        let tied = top_k(vec![(7, 1.0), (3, 1.0), (5, 2.0)], 50);
        assert_eq!(tied.iter().map(|(d, _)| *d).collect::<Vec<_>>(), vec![5, 3, 7]);
    }
}
