use crate::error::{IndexError, Result};
use crate::posting::DocNum;
use serde::{Deserialize, Serialize};

/// Per-term line of the final dictionary:
/// `term_totalTF_documentFrequency_postingLineSize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub term: String,
    pub total_tf: u64,
    pub doc_freq: u32,
    /// Byte length of the term's posting line, newline excluded.
    pub line_bytes: u64,
}

impl DictionaryEntry {
    pub fn encode(&self) -> String {
        format!("{}_{}_{}_{}", self.term, self.total_tf, self.doc_freq, self.line_bytes)
    }

    /// Fields are split from the right so terms may contain `_`.
    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.rsplitn(4, '_');
        let line_bytes = fields.next();
        let doc_freq = fields.next();
        let total_tf = fields.next();
        let term = fields.next();
        match (term, total_tf, doc_freq, line_bytes) {
            (Some(term), Some(tf), Some(df), Some(size)) if !term.is_empty() => Ok(Self {
                term: term.to_string(),
                total_tf: parse_num("dictionary", tf)?,
                doc_freq: parse_num("dictionary", df)?,
                line_bytes: parse_num("dictionary", size)?,
            }),
            _ => Err(IndexError::format("dictionary", format!("expected 4 fields in {line:?}"))),
        }
    }
}

/// Per-document line of the statistics table:
/// `docNum_docID_maxTF_uniqueTermCount_docLength`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocStats {
    pub doc_num: DocNum,
    pub doc_id: String,
    pub max_tf: u32,
    pub unique_terms: u32,
    pub length: u32,
}

impl DocStats {
    pub fn encode(&self) -> String {
        format!("{}_{}_{}_{}_{}", self.doc_num, self.doc_id, self.max_tf, self.unique_terms, self.length)
    }

    /// The document number is the first field and the three counters the last
    /// three; everything in between is the external ID.
    pub fn parse(line: &str) -> Result<Self> {
        let bad = || IndexError::format("document details", format!("expected 5 fields in {line:?}"));
        let (doc_num, rest) = line.split_once('_').ok_or_else(bad)?;
        let mut tail = rest.rsplitn(4, '_');
        let length = tail.next().ok_or_else(bad)?;
        let unique_terms = tail.next().ok_or_else(bad)?;
        let max_tf = tail.next().ok_or_else(bad)?;
        let doc_id = tail.next().ok_or_else(bad)?;
        Ok(Self {
            doc_num: parse_num("document details", doc_num)?,
            doc_id: doc_id.to_string(),
            max_tf: parse_num("document details", max_tf)?,
            unique_terms: parse_num("document details", unique_terms)?,
            length: parse_num("document details", length)?,
        })
    }
}

pub(crate) fn parse_num<T: std::str::FromStr>(context: &'static str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| IndexError::format(context, format!("{raw:?}: {e}")))
}

/// Completion manifest; its presence marks an index directory as usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u64,
    pub min_total_tf: u64,
    pub stem: bool,
    pub created_at: String,
    pub version: u32,
}
