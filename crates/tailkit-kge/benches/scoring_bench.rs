use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use tailkit_core::{EntityId, EntityVocab, GraphVocab, RelationId, RelationVocab};
use tailkit_kge::{predict_keywords, ModelState, TailScorer};

fn bench_scoring(c: &mut Criterion) {
    // 5000 entities, 40 relations, default dims
    let vocab = GraphVocab {
        entities: EntityVocab::from_names((0..5000).map(|i| format!("entity_{i}"))).unwrap(),
        relations: RelationVocab::from_names((0..40).map(|i| format!("relation_{i}"))).unwrap(),
    };
    let state = ModelState::init(vocab, 200, 200, false, &mut ChaCha8Rng::seed_from_u64(42));

    c.bench_function("score_tails_5000_entities", |b| {
        b.iter(|| state.score_tails(black_box(EntityId(17)), black_box(RelationId(3))))
    });

    let entities: BTreeSet<EntityId> = (0..8).map(EntityId).collect();
    let relations: BTreeSet<RelationId> = (0..12).map(RelationId).collect();
    c.bench_function("predict_keywords_8x12", |b| {
        b.iter(|| {
            predict_keywords(
                black_box(&state),
                state.vocab(),
                black_box(&entities),
                black_box(&relations),
                5,
            )
        })
    });
}

criterion_group!(benches, bench_scoring);
criterion_main!(benches);
