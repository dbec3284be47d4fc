use attrex::source::read_csv;
use attrex::{AttributeExtractor, DictionaryIndex, ExtractorConfig, IndexConfig};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn setup_extractor() -> AttributeExtractor<DictionaryIndex> {
    let entries = read_csv(demo_dictionary::dictionary_reader()).expect("Failed to read demo dictionary");
    let index = DictionaryIndex::in_memory(entries, &IndexConfig::default())
        .expect("Failed to build demo index");
    AttributeExtractor::new(index, ExtractorConfig::default()).expect("Invalid default config")
}

fn bench_extract(c: &mut Criterion) {
    let extractor = setup_extractor();

    let utterances = vec![
        ("single_exact", "merlot"),
        ("phrase_exact", "cabernet sauvignon"),
        ("phrase_typo", "caubernet sauvignon"),
        ("two_attributes", "red chateau lator"),
        ("no_match", "how are you"),
        ("long_sentence", "a bottle of opus one from napa valley and something sparkling"),
    ];

    let mut group = c.benchmark_group("extract");
    group.sample_size(20);

    for (name, utterance) in utterances {
        group.bench_function(name, |b| {
            b.iter(|| extractor.extract_attributes(black_box(utterance)).unwrap())
        });
    }
    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let extractor = setup_extractor();
    let sentences: Vec<&str> = demo_dictionary::cases()
        .iter()
        .map(|case| case.sentence.as_str())
        .collect();

    c.bench_function("extract_batch_demo_cases", |b| {
        b.iter(|| extractor.extract_batch(black_box(&sentences)))
    });
}

criterion_group!(benches, bench_extract, bench_batch);
criterion_main!(benches);
