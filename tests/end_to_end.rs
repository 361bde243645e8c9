//! Asset files on disk → linking context → trained engine.

use proptest::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tailkit::prelude::*;

fn asset_dir() -> PathBuf {
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("end_to_end");
    fs::create_dir_all(dir.join("tables")).unwrap();
    fs::write(
        dir.join("tables/linking.csv"),
        "\u{feff}ヘルメット,ent_1,ent_2\n安全靴,ent_2\nノギス,ent_7\n",
    )
    .unwrap();
    fs::write(
        dir.join("tables/categories.csv"),
        "ヘルメット,1\nノギス,測定・測量用品\n",
    )
    .unwrap();
    fs::write(dir.join("tables/relations.csv"), "1,rel_1\n7,rel_2\n24,rel_2\n").unwrap();
    fs::write(
        dir.join("assets.json"),
        r#"{ "base_dir": "tables", "linking_table": "linking.csv",
             "category_table": "categories.csv", "relation_table": "relations.csv" }"#,
    )
    .unwrap();
    dir
}

fn engine() -> &'static KeywordEngine {
    static ENGINE: OnceLock<KeywordEngine> = OnceLock::new();
    ENGINE.get_or_init(|| {
        let dir = asset_dir();
        let assets = AssetConfig::from_json_file(dir.join("assets.json")).unwrap();
        let context = LinkingContext::load(&assets).unwrap();

        let feed = TripleFeed::parse_str(
            "ヘルメット,属性,耐衝撃性\n\
             安全靴,属性,滑り止め\n\
             ヘルメット,規格,JIS_T8131\n\
             安全靴,規格,JIS_T8101\n\
             ノギス,規格,JIS_B7507\n\
             ノギス,属性,デジタル\n\
             壊れた行\n",
        )
        .unwrap();
        assert_eq!(feed.malformed, 1);

        let config = TrainingConfig::default()
            .with_entity_dim(12)
            .with_relation_dim(6)
            .with_epochs(10)
            .with_early_stopping(None);
        let outcome = Trainer::new(config).train(&feed.facts).unwrap();
        KeywordEngine::new(context, outcome.into_shared()).with_top_k(2)
    })
}

#[test]
fn assets_resolve_relative_to_config() {
    let ctx = engine().context();
    assert_eq!(ctx.linking().len(), 3);
    let linked = ctx.link("ヘルメット").unwrap();
    assert_eq!(linked.bucket, BucketId::new(1));
    assert_eq!(linked.entities.len(), 2);
    assert_eq!(
        ctx.link("ノギス").unwrap().bucket,
        BucketId::new(7)
    );
}

#[test]
fn helmet_keywords() {
    let lookup = engine().predict_keywords("ヘルメット").unwrap();
    let keywords = lookup.keywords().unwrap();
    assert_eq!(keywords.len(), 2);
    for tails in keywords.values() {
        assert!(!tails.is_empty());
        assert!(tails.len() <= 2 * 2);
    }
}

#[test]
fn engine_is_shareable_across_threads() {
    let engine = Arc::new(engine().clone());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.predict_keywords("安全靴").unwrap())
        })
        .collect();
    let results: Vec<KeywordLookup> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn first_seen_ids_line_up_with_linking_tags() {
    // ent_7 is the seventh distinct name in the triple feed
    let model = engine().predictor().model().unwrap();
    assert_eq!(model.vocab().entities.text_of(EntityId(6)), Some("ノギス"));

    let lookup = engine().predict_keywords("ノギス").unwrap();
    let keywords = lookup.keywords().unwrap();
    assert_eq!(keywords.keys().collect::<Vec<_>>(), vec!["規格"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn unknown_categories_are_never_empty_mappings(category in "[a-z]{1,8}") {
        prop_assert_eq!(
            engine().predict_keywords(&category).unwrap(),
            KeywordLookup::CategoryNotFound
        );
    }
}
