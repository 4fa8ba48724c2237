//! Batch querying: a file of topics in, TREC run lines out.

use lazy_static::lazy_static;
use regex::Regex;
use std::io::Write;
use std::path::Path;

use crate::error::{IndexError, Result};
use crate::rank::{Ranker, SearchHit};
use crate::tokenizer::{parse_query, Normalizer};

lazy_static! {
    static ref TOP_RE: Regex = Regex::new(r"(?s)<top>(.*?)</top>").expect("valid regex");
    static ref NUM_RE: Regex = Regex::new(r"<num>\s*(?:Number:)?\s*([^\s<]+)").expect("valid regex");
    static ref TITLE_RE: Regex = Regex::new(r"<title>([^<]*)").expect("valid regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTopic {
    pub id: String,
    pub text: String,
}

/// Reads TREC `<top>` blocks (number and title), or, when the file has none,
/// one `ID free text` query per line.
pub fn parse_topics(text: &str) -> Vec<QueryTopic> {
    if !TOP_RE.is_match(text) {
        return text
            .lines()
            .filter_map(|line| {
                let (id, query) = line.trim().split_once(char::is_whitespace)?;
                let query = collapse(query);
                (!query.is_empty()).then(|| QueryTopic { id: id.to_string(), text: query })
            })
            .collect();
    }

    let mut topics = Vec::new();
    for block in TOP_RE.captures_iter(text) {
        let body = &block[1];
        match (NUM_RE.captures(body), TITLE_RE.captures(body)) {
            (Some(num), Some(title)) => topics.push(QueryTopic { id: num[1].to_string(), text: collapse(&title[1]) }),
            _ => tracing::warn!("skipping topic without <num> or <title>"),
        }
    }
    topics
}

pub fn read_topics(path: &Path) -> Result<Vec<QueryTopic>> {
    let text = std::fs::read_to_string(path).map_err(|e| IndexError::input(path, e))?;
    Ok(parse_topics(&text))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ranks every topic in file order.
pub fn run_topics(
    ranker: &Ranker,
    normalizer: &Normalizer,
    topics: &[QueryTopic],
    stem: bool,
) -> Result<Vec<(String, Vec<SearchHit>)>> {
    let mut results = Vec::with_capacity(topics.len());
    for topic in topics {
        let terms = parse_query(normalizer, &topic.text, stem);
        let hits = ranker.rank(&terms)?;
        tracing::debug!(topic = %topic.id, hits = hits.len(), "topic ranked");
        results.push((topic.id.clone(), hits));
    }
    Ok(results)
}

/// Writes one `topic 0 doc rank score run` line per hit, ranks from 1.
pub fn write_run<W: Write>(out: &mut W, topic_id: &str, hits: &[SearchHit], run_id: &str) -> Result<()> {
    for (i, hit) in hits.iter().enumerate() {
        writeln!(out, "{topic_id} 0 {} {} {:.6} {run_id}", hit.doc_id, i + 1, hit.score)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trec_topic_blocks() {
        let text = "<top>\n<num> Number: 351\n<title> Falkland petroleum\n exploration\n\n<desc> Description:\nWhat is known\n</top>\n\n\
                    <top>\n<num> Number: 352 <title> British Chunnel impact\n</top>\n";
        let topics = parse_topics(text);
        assert_eq!(
            topics,
            vec![
                QueryTopic { id: "351".into(), text: "Falkland petroleum exploration".into() },
                QueryTopic { id: "352".into(), text: "British Chunnel impact".into() },
            ]
        );
    }

    #[test]
    fn falls_back_to_one_query_per_line() {
        let topics = parse_topics("q1 stock market\n\nq2   falling   prices\nlonely\n");
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[1], QueryTopic { id: "q2".into(), text: "falling prices".into() });
    }

    #[test]
    fn run_lines_follow_trec_layout() {
        let hits = vec![
            SearchHit { doc_id: "FBIS3-1".into(), score: 2.5, entities: Vec::new() },
            SearchHit { doc_id: "FBIS3-9".into(), score: 1.25, entities: Vec::new() },
        ];
        let mut out = Vec::new();
        write_run(&mut out, "351", &hits, "folio").unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "351 0 FBIS3-1 1 2.500000 folio\n351 0 FBIS3-9 2 1.250000 folio\n"
        );
    }
}
