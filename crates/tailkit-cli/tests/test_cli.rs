use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

const TRIPLES: &str = "\
ヘルメット\t属性\t耐衝撃性
ヘルメット\t属性\t軽量
ヘルメット\t規格\tJIS_T8131
安全靴\t属性\t滑り止め
安全靴\t規格\tJIS_T8101
";

/// Fresh directory with a triple file and the conventional table layout.
fn asset_dir(name: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("cli").join(name);
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    fs::create_dir_all(dir.join("Entity_linking"))?;
    fs::create_dir_all(dir.join("E&R"))?;

    fs::write(dir.join("kg_triples.txt"), TRIPLES)?;
    fs::write(
        dir.join("Entity_linking/product_to_entity.csv"),
        "ヘルメット,ent_1\n安全靴,ent_2\n",
    )?;
    fs::write(
        dir.join("category_table.csv"),
        "ヘルメット,安全保護具・作業服・安全靴\n安全靴,1\n",
    )?;
    fs::write(dir.join("relation_table.csv"), "1,rel_1\n24,rel_2\n")?;
    fs::write(
        dir.join("E&R/entity.csv"),
        "ヘルメット,ent_1\n安全靴,ent_2\n耐衝撃性,ent_3\n",
    )?;
    fs::write(dir.join("E&R/relation.csv"), "属性,rel_1\n規格,rel_2\n")?;
    Ok(dir)
}

fn train(dir: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let model = dir.join("model.bin");
    Command::cargo_bin("tailkit")?
        .arg("train")
        .arg(dir.join("kg_triples.txt"))
        .arg("-o")
        .arg(&model)
        .arg("--entity-catalog")
        .arg(dir.join("E&R/entity.csv"))
        .arg("--relation-catalog")
        .arg(dir.join("E&R/relation.csv"))
        .args(["--dim", "8", "--relation-dim", "4", "--epochs", "5", "--patience", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 5 triples"))
        .stdout(predicate::str::contains("Saved model"));
    assert!(model.exists());
    Ok(model)
}

#[test]
fn test_train_then_keywords() -> Result<(), Box<dyn std::error::Error>> {
    let dir = asset_dir("train_keywords")?;
    let model = train(&dir)?;

    let output = Command::cargo_bin("tailkit")?
        .arg("keywords")
        .arg("--model")
        .arg(&model)
        .arg("--base-dir")
        .arg(&dir)
        .args(["-k", "2", "ヘルメット", "ドリル"])
        .output()?;
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(json["ドリル"], "NOT_FOUND");
    let helmet = json["ヘルメット"].as_object().ok_or("expected a mapping")?;
    let mut keys: Vec<&String> = helmet.keys().collect();
    keys.sort();
    assert_eq!(keys, vec!["属性", "規格"]);
    for tails in helmet.values() {
        let tails = tails.as_array().ok_or("expected a list")?;
        assert!(!tails.is_empty() && tails.len() <= 2);
    }
    Ok(())
}

#[test]
fn test_stats_and_tails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = asset_dir("stats_tails")?;
    let model = train(&dir)?;

    Command::cargo_bin("tailkit")?
        .arg("stats")
        .arg(&model)
        .assert()
        .success()
        .stdout(predicate::str::contains("Entities:       7"))
        .stdout(predicate::str::contains("Relations:      2"))
        .stdout(predicate::str::contains("Entity dim:     8"));

    Command::cargo_bin("tailkit")?
        .arg("tails")
        .arg("--model")
        .arg(&model)
        .args(["ヘルメット", "属性", "-k", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Top 3 tails for (ヘルメット, 属性, ?)"));

    Command::cargo_bin("tailkit")?
        .arg("tails")
        .arg("--model")
        .arg(&model)
        .args(["ヘルメット", "色"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown relation"));
    Ok(())
}

#[test]
fn test_evaluate() -> Result<(), Box<dyn std::error::Error>> {
    let dir = asset_dir("evaluate")?;
    let model = train(&dir)?;

    Command::cargo_bin("tailkit")?
        .arg("evaluate")
        .arg("--model")
        .arg(&model)
        .arg(dir.join("kg_triples.txt"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Tail prediction: MRR:"))
        .stdout(predicate::str::contains("(n=5)"));
    Ok(())
}

#[test]
fn test_link_without_model() -> Result<(), Box<dyn std::error::Error>> {
    let dir = asset_dir("link")?;

    Command::cargo_bin("tailkit")?
        .arg("link")
        .arg("ヘルメット")
        .arg("--base-dir")
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Bucket:    1 (安全保護具・作業服・安全靴)"))
        .stdout(predicate::str::contains("Entities:  ent_1"))
        .stdout(predicate::str::contains("Relations: rel_1 rel_2"));

    Command::cargo_bin("tailkit")?
        .arg("link")
        .arg("ドリル")
        .arg("--base-dir")
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Entities:  NOT_FOUND"));
    Ok(())
}

#[test]
fn test_keywords_without_model() -> Result<(), Box<dyn std::error::Error>> {
    let dir = asset_dir("untrained")?;
    let missing = dir.join("missing.bin");

    Command::cargo_bin("tailkit")?
        .arg("keywords")
        .arg("--model")
        .arg(&missing)
        .arg("--base-dir")
        .arg(&dir)
        .arg("ヘルメット")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Model unavailable"));

    let output = Command::cargo_bin("tailkit")?
        .arg("keywords")
        .arg("--model")
        .arg(&missing)
        .arg("--base-dir")
        .arg(&dir)
        .arg("--allow-untrained")
        .arg("ヘルメット")
        .output()?;
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(json, serde_json::json!({ "ヘルメット": {} }));
    Ok(())
}

#[test]
fn test_train_seeds_ids_from_asset_catalogs() -> Result<(), Box<dyn std::error::Error>> {
    let dir = asset_dir("asset_catalogs")?;
    let config = dir.join("assets.json");
    fs::write(&config, r#"{ "base_dir": "." }"#)?;
    let model = dir.join("model.bin");

    Command::cargo_bin("tailkit")?
        .arg("train")
        .arg(dir.join("kg_triples.txt"))
        .arg("-o")
        .arg(&model)
        .arg("--assets")
        .arg(&config)
        .args(["--dim", "8", "--relation-dim", "4", "--epochs", "2", "--patience", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Asset catalogs: 3 entities, 2 relations"));

    Command::cargo_bin("tailkit")?
        .arg("link")
        .arg("ヘルメット")
        .arg("--model")
        .arg(&model)
        .arg("--base-dir")
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Entities:  ヘルメット(ent_1)"))
        .stdout(predicate::str::contains("Relations: 属性(rel_1) 規格(rel_2)"));
    Ok(())
}

#[test]
fn test_non_model_file_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = asset_dir("not_a_model")?;

    Command::cargo_bin("tailkit")?
        .arg("keywords")
        .arg("--model")
        .arg(dir.join("kg_triples.txt"))
        .arg("--base-dir")
        .arg(&dir)
        .arg("ヘルメット")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load model"));

    Command::cargo_bin("tailkit")?
        .arg("stats")
        .arg(dir.join("kg_triples.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load model"));
    Ok(())
}

#[test]
fn test_train_rejects_empty_input() -> Result<(), Box<dyn std::error::Error>> {
    let dir = asset_dir("empty")?;
    let empty = dir.join("empty.txt");
    fs::write(&empty, "# nothing here\n")?;

    Command::cargo_bin("tailkit")?
        .arg("train")
        .arg(&empty)
        .arg("-o")
        .arg(dir.join("model.bin"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Training failed"));
    Ok(())
}
