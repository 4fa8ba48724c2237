use criterion::{criterion_group, criterion_main, Criterion};
use folio_core::tokenizer::Normalizer;
use folio_core::PostingList;

fn bench_posting_codec(c: &mut Criterion) {
    let mut list = PostingList::new("market", false);
    for doc in 0..2_000u32 {
        for pos in (0..40u32).step_by(3) {
            list.record(doc, pos + doc % 7);
        }
    }
    let line = list.encode();
    c.bench_function("posting_encode", |b| b.iter(|| list.encode()));
    c.bench_function("posting_decode", |b| b.iter(|| PostingList::decode(&line).unwrap()));
}

fn bench_normalize(c: &mut Criterion) {
    let text = "Officials in New York City said the Federal Reserve would keep rates steady \
                while markets in 1990 fell 12% across the European Union and Latin America.";
    let normalizer = Normalizer::default();
    c.bench_function("normalize_paragraph", |b| b.iter(|| normalizer.normalize(text)));
}

criterion_group!(benches, bench_posting_codec, bench_normalize);
criterion_main!(benches);
