//! Letter-sharded inverted index: external-sort build pipeline and ranked
//! retrieval over its on-disk posting files.

pub mod config;
pub mod error;
pub mod index;
pub mod merge;
pub mod persist;
pub mod pipeline;
pub mod posting;
pub mod rank;
pub mod segment;
pub mod source;
pub mod split;
pub mod term;
pub mod tokenizer;
pub mod topics;

pub use config::{BuildConfig, RankParams};
pub use error::{IndexError, Result};
pub use index::{DictionaryEntry, DocStats, MetaFile};
pub use pipeline::{BuildSummary, IndexBuilder};
pub use posting::{DocNum, PostingList};
pub use rank::{run_query, Ranker, SearchHit};
pub use term::TermClass;
