use criterion::{Criterion, criterion_group, criterion_main};
use ragkit::chunker::{ChunkingConfig, ChunkingMethod, chunk};
use std::hint::black_box;

fn sample_document() -> String {
    let paragraph = "Retrieval-augmented generation grounds language models in stored \
                     documents. Each document is split into fragments. Fragments are \
                     embedded and indexed for similarity search. At query time the \
                     closest fragments are assembled into a prompt.";

    let mut text = String::new();
    for _ in 0..200 {
        text.push_str(paragraph);
        text.push_str("\n\n");
    }
    text
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let text = sample_document();

    for method in [
        ChunkingMethod::Sentence,
        ChunkingMethod::Token,
        ChunkingMethod::Paragraph,
    ] {
        let config = ChunkingConfig {
            method,
            ..ChunkingConfig::default()
        };
        c.bench_function(&format!("chunk_{method}"), |b| {
            b.iter(|| chunk(black_box(&text), black_box(&config)))
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
