use folio_core::tokenizer::{parse_query, stem_tokens, Normalizer, PorterStemmer};

#[test]
fn it_normalizes_and_stems() {
    let toks = Normalizer::default().normalize("Running runners run! The café's menu.");
    let stemmed = stem_tokens(toks, &PorterStemmer::default());
    let words: Vec<String> = stemmed.into_iter().map(|t| t.text).collect();
    assert!(words.contains(&"Run".to_string()));
    assert!(words.contains(&"run".to_string()));
    assert!(words.contains(&"café".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let toks = Normalizer::default().normalize("the quick brown fox and the lazy dog");
    let words: Vec<String> = toks.into_iter().map(|t| t.text).collect();
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert_eq!(words, vec!["quick", "brown", "fox", "lazy", "dog"]);
}

#[test]
fn corpus_stopword_list_replaces_builtin_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stop_words.txt");
    std::fs::write(&path, "fox\nDog\n").unwrap();
    let normalizer = Normalizer::from_stopwords_file(&path).unwrap();
    let words: Vec<String> = normalizer.normalize("the fox and the dog").into_iter().map(|t| t.text).collect();
    assert_eq!(words, vec!["the", "and", "the"]);
}

#[test]
fn queries_share_the_document_pipeline() {
    let n = Normalizer::default();
    assert_eq!(parse_query(&n, "the Markets are falling", true), vec!["Market", "fall"]);
    assert_eq!(parse_query(&n, "the Markets are falling", false), vec!["Markets", "falling"]);
}
