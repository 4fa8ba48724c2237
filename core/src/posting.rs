use crate::error::{IndexError, Result};
use crate::term::looks_like_entity;
use std::fmt::Write as _;

pub type DocNum = u32;

/// Every occurrence of one term across the documents recorded so far.
///
/// Documents are kept in insertion order; positions inside a document are
/// kept ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingList {
    pub term: String,
    pub is_entity: bool,
    docs: Vec<(DocNum, Vec<u32>)>,
}

impl PostingList {
    pub fn new(term: impl Into<String>, is_entity: bool) -> Self {
        Self { term: term.into(), is_entity, docs: Vec::new() }
    }

    /// Appends `position` to the posting of `doc`.
    pub fn record(&mut self, doc: DocNum, position: u32) {
        let idx = match self.docs.iter().rposition(|(d, _)| *d == doc) {
            Some(idx) => idx,
            None => {
                self.docs.push((doc, Vec::new()));
                self.docs.len() - 1
            }
        };
        let positions = &mut self.docs[idx].1;
        match positions.last() {
            Some(&last) if last >= position => {
                if let Err(at) = positions.binary_search(&position) {
                    positions.insert(at, position);
                }
            }
            _ => positions.push(position),
        }
    }

    pub fn documents(&self) -> &[(DocNum, Vec<u32>)] {
        &self.docs
    }

    pub fn positions(&self, doc: DocNum) -> Option<&[u32]> {
        self.docs.iter().find(|(d, _)| *d == doc).map(|(_, p)| p.as_slice())
    }

    pub fn doc_freq(&self) -> u32 {
        self.docs.len() as u32
    }

    pub fn total_tf(&self) -> u64 {
        self.docs.iter().map(|(_, p)| p.len() as u64).sum()
    }

    /// Serialises to `TERM|doc:p1,p2_N_doc:p1_N_` without the trailing newline.
    pub fn encode(&self) -> String {
        let mut line = String::with_capacity(self.term.len() + 1 + self.docs.len() * 12);
        line.push_str(&self.term);
        line.push('|');
        for (doc, positions) in &self.docs {
            encode_block(&mut line, *doc, positions);
        }
        line
    }

    pub fn decode(line: &str) -> Result<Self> {
        let (term, blocks) = split_line(line)?;
        let mut docs = Vec::new();
        for block in Blocks::new(blocks) {
            let (doc, positions) = block?;
            docs.push((doc, positions));
        }
        Ok(Self { term: term.to_string(), is_entity: looks_like_entity(term), docs })
    }
}

fn encode_block(out: &mut String, doc: DocNum, positions: &[u32]) {
    let _ = write!(out, "{doc}:");
    for (i, pos) in positions.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{pos}");
    }
    let _ = write!(out, "_{}_", positions.len());
}

/// Splits a posting line into its term and its concatenated document blocks.
pub fn split_line(line: &str) -> Result<(&str, &str)> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let (term, blocks) = line
        .split_once('|')
        .ok_or_else(|| IndexError::format("posting", format!("missing '|' separator in {line:?}")))?;
    if term.is_empty() {
        return Err(IndexError::format("posting", "empty term"));
    }
    Ok((term, blocks))
}

/// Summary numbers of one posting line, validated without materialising positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStats {
    pub total_tf: u64,
    pub doc_freq: u32,
}

pub fn block_stats(blocks: &str) -> Result<LineStats> {
    let mut stats = LineStats::default();
    let mut rest = blocks;
    while !rest.is_empty() {
        let (_, positions, count, tail) = next_block(rest)?;
        let listed = if positions.is_empty() { 0 } else { positions.split(',').count() };
        if listed != count as usize {
            return Err(IndexError::format("posting", format!("block lists {listed} positions but counts {count}")));
        }
        stats.total_tf += count as u64;
        stats.doc_freq += 1;
        rest = tail;
    }
    Ok(stats)
}

/// Splits `doc:positions_count_rest` into its raw pieces.
fn next_block(rest: &str) -> Result<(DocNum, &str, u32, &str)> {
    let (doc, rest) = rest
        .split_once(':')
        .ok_or_else(|| IndexError::format("posting", "document block without ':'"))?;
    let (positions, rest) = rest
        .split_once('_')
        .ok_or_else(|| IndexError::format("posting", "document block without position terminator"))?;
    let (count, rest) = rest
        .split_once('_')
        .ok_or_else(|| IndexError::format("posting", "document block without count terminator"))?;
    let doc = doc
        .parse::<DocNum>()
        .map_err(|e| IndexError::format("posting", format!("document number {doc:?}: {e}")))?;
    let count = count
        .parse::<u32>()
        .map_err(|e| IndexError::format("posting", format!("frequency {count:?}: {e}")))?;
    Ok((doc, positions, count, rest))
}

/// Iterator over the `(doc, positions)` blocks of a posting line.
pub struct Blocks<'a> {
    rest: &'a str,
}

impl<'a> Blocks<'a> {
    pub fn new(blocks: &'a str) -> Self {
        Self { rest: blocks }
    }
}

impl Iterator for Blocks<'_> {
    type Item = Result<(DocNum, Vec<u32>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let parsed = next_block(self.rest).and_then(|(doc, raw, count, tail)| {
            let positions = if raw.is_empty() {
                Vec::new()
            } else {
                raw.split(',')
                    .map(|p| p.parse::<u32>().map_err(|e| IndexError::format("posting", format!("position {p:?}: {e}"))))
                    .collect::<Result<Vec<_>>>()?
            };
            if positions.len() != count as usize {
                return Err(IndexError::format(
                    "posting",
                    format!("document {doc} lists {} positions but counts {count}", positions.len()),
                ));
            }
            self.rest = tail;
            Ok((doc, positions))
        });
        if parsed.is_err() {
            self.rest = "";
        }
        Some(parsed)
    }
}
