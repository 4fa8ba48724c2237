use crate::error::{IndexError, Result};
use crate::index::{DictionaryEntry, DocStats, MetaFile};
use crate::posting::DocNum;
use crate::split::EntitySummary;
use crate::term::TermClass;
use std::collections::{HashMap, HashSet};
use std::fs::{create_dir_all, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const INDEX_DIR: &str = "index";
pub const INDEX_STEM_DIR: &str = "indexStem";

/// Names every artifact of one index variant.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub dir: PathBuf,
    pub stem: bool,
}

impl IndexPaths {
    /// The published variant under an output root: `root/index` or `root/indexStem`.
    pub fn under<P: AsRef<Path>>(root: P, stem: bool) -> Self {
        Self { dir: root.as_ref().join(Self::dir_name(stem)), stem }
    }

    /// An index laid out directly in `dir` (used for staging).
    pub fn at<P: AsRef<Path>>(dir: P, stem: bool) -> Self {
        Self { dir: dir.as_ref().to_path_buf(), stem }
    }

    pub fn dir_name(stem: bool) -> &'static str {
        if stem { INDEX_STEM_DIR } else { INDEX_DIR }
    }

    fn suffix(&self) -> &'static str {
        if self.stem { "Stem" } else { "" }
    }

    pub fn bucket(&self, class: TermClass) -> PathBuf {
        self.dir.join(format!("{}PostingFile{}.txt", class.bucket_name(), self.suffix()))
    }
    pub fn dictionary(&self) -> PathBuf { self.dir.join(format!("finalDictionary{}.txt", self.suffix())) }
    pub fn document_details(&self) -> PathBuf { self.dir.join(format!("documentDetails{}.txt", self.suffix())) }
    pub fn entities(&self) -> PathBuf { self.dir.join(format!("entities{}.txt", self.suffix())) }
    pub fn meta(&self) -> PathBuf { self.dir.join("meta.json") }
}

pub fn save_document_details(paths: &IndexPaths, docs: &[DocStats]) -> Result<()> {
    create_dir_all(&paths.dir)?;
    let mut sorted: Vec<&DocStats> = docs.iter().collect();
    sorted.sort_by_key(|d| d.doc_num);
    let mut f = BufWriter::new(File::create(paths.document_details())?);
    for doc in sorted {
        writeln!(f, "{}", doc.encode())?;
    }
    f.flush()?;
    Ok(())
}

pub fn load_document_details(paths: &IndexPaths) -> Result<Vec<DocStats>> {
    read_lines(&paths.document_details(), DocStats::parse)
}

pub fn load_dictionary(paths: &IndexPaths) -> Result<Vec<DictionaryEntry>> {
    read_lines(&paths.dictionary(), DictionaryEntry::parse)
}

fn read_lines<T>(path: &Path, parse: impl Fn(&str) -> Result<T>) -> Result<Vec<T>> {
    let f = File::open(path).map_err(|e| IndexError::input(path, e))?;
    let mut out = Vec::new();
    for line in BufReader::new(f).lines() {
        let line = line?;
        if line.is_empty() { continue; }
        out.push(parse(&line)?);
    }
    Ok(out)
}

/// Writes `docNum|ENTITY ONE,ENTITY TWO` lines in document order.
pub fn save_entities(paths: &IndexPaths, entities: &EntitySummary) -> Result<()> {
    create_dir_all(&paths.dir)?;
    let mut docs: Vec<&DocNum> = entities.keys().collect();
    docs.sort();
    let mut f = BufWriter::new(File::create(paths.entities())?);
    for doc in docs {
        let names: Vec<&str> = entities[doc].iter().map(|(_, term)| term.as_str()).collect();
        writeln!(f, "{doc}|{}", names.join(","))?;
    }
    f.flush()?;
    Ok(())
}

/// Entity summaries of the requested documents. An index built without the
/// summary file yields none.
pub fn load_entities_for(paths: &IndexPaths, wanted: &HashSet<DocNum>) -> Result<HashMap<DocNum, Vec<String>>> {
    let mut found = HashMap::new();
    if wanted.is_empty() {
        return Ok(found);
    }
    let f = match File::open(paths.entities()) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e.into()),
    };
    for line in BufReader::new(f).lines() {
        let line = line?;
        let Some((doc, names)) = line.split_once('|') else { continue };
        let doc: DocNum = crate::index::parse_num("entities", doc)?;
        if wanted.contains(&doc) {
            found.insert(doc, names.split(',').filter(|n| !n.is_empty()).map(str::to_string).collect());
            if found.len() == wanted.len() {
                break;
            }
        }
    }
    Ok(found)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.dir)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    f.sync_all()?;
    Ok(())
}

/// Reads the manifest, failing with `Incomplete` when the directory exists
/// but was never finished.
pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    if !paths.dir.is_dir() {
        return Err(IndexError::input(
            &paths.dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "index directory not found"),
        ));
    }
    let meta_path = paths.meta();
    if !meta_path.is_file() {
        return Err(IndexError::Incomplete { path: paths.dir.clone() });
    }
    let f = File::open(&meta_path).map_err(|e| IndexError::input(&meta_path, e))?;
    Ok(serde_json::from_reader(BufReader::new(f))?)
}

/// Load only the structures required to rank: manifest, dictionary, document statistics.
pub fn load_index_header(paths: &IndexPaths) -> Result<(MetaFile, Vec<DictionaryEntry>, Vec<DocStats>)> {
    let meta = load_meta(paths)?;
    let dict = load_dictionary(paths)?;
    let docs = load_document_details(paths)?;
    Ok((meta, dict, docs))
}
