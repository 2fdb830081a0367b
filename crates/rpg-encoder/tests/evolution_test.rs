//! Evolution over a real git repository: commit-range diffing, the
//! change-ratio gate, and Delete→Modify→Insert application.

use rpg_core::config::EncoderConfig;
use rpg_encoder::encoder::{EncodeOptions, Encoder};
use rpg_encoder::evolution::{self, EvolveOptions};
use rpg_encoder::extractor::SemanticExtractor;
use rpg_encoder::router::SemanticRouter;
use std::fs;
use std::path::Path;

fn commit_all(repo: &git2::Repository, message: &str) -> git2::Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.update_all(["*"].iter(), None).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = git2::Signature::now("fixture", "fixture@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// A repo with enough entities that a three-file change stays under the
/// regeneration threshold.
fn write_initial(root: &Path) {
    for i in 0..6 {
        fs::write(
            root.join(format!("mod{i}.py")),
            format!("def task{i}(value):\n    return value + {i}\n"),
        )
        .unwrap();
    }
    fs::write(
        root.join("a.py"),
        "def one(x):\n    return x\n",
    )
    .unwrap();
    fs::write(
        root.join("b.py"),
        "def helper(y):\n    return y\n",
    )
    .unwrap();
}

fn write_second_state(root: &Path) {
    // Modify a.py, delete b.py, add c.py
    fs::write(
        root.join("a.py"),
        "def one(x):\n    return x * 2 + 1\n",
    )
    .unwrap();
    fs::remove_file(root.join("b.py")).unwrap();
    fs::write(
        root.join("c.py"),
        "def fresh(z):\n    return z - 1\n",
    )
    .unwrap();
}

fn encode_options() -> EncodeOptions {
    let mut options = EncodeOptions::default();
    options.discovery.respect_gitignore = false;
    options
}

#[tokio::test]
async fn test_evolve_applies_commit_range() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init(tmp.path()).unwrap();

    write_initial(tmp.path());
    commit_all(&repo, "initial");

    let config = EncoderConfig::default();
    let encoder = Encoder::new(None, None, &config);
    let mut rpg = encoder
        .encode(tmp.path(), &encode_options())
        .await
        .unwrap()
        .rpg;
    assert!(rpg.has_node("b.py:file"));

    write_second_state(tmp.path());
    commit_all(&repo, "churn");

    let extractor = SemanticExtractor::new(None, None, &config);
    let router = SemanticRouter::new(None, None);
    let options = EvolveOptions {
        commit_range: "HEAD~1..HEAD".to_string(),
        // The fixture graph is small; keep the gate out of the way
        force_regenerate_threshold: 10.0,
        ..EvolveOptions::default()
    };
    let report = evolution::evolve(&mut rpg, tmp.path(), &options, &extractor, &router, None)
        .await
        .unwrap();

    assert!(!report.requires_full_encode);
    assert!(report.errors.is_empty());

    // b.py (file + function) deleted
    assert_eq!(report.deleted, 2);
    assert!(!rpg.has_node("b.py:file"));
    assert!(evolution::resolve_node_id(&rpg, "b.py:function:helper").is_none());

    // c.py (file + function) inserted
    assert_eq!(report.inserted, 2);
    assert!(rpg.has_node("c.py:file"));
    assert!(evolution::resolve_node_id(&rpg, "c.py:function:fresh").is_some());

    // a.py file + function changed: each either updated in place or rerouted
    assert_eq!(report.modified + report.rerouted, 2);
    assert!(evolution::resolve_node_id(&rpg, "a.py:function:one").is_some());
}

#[tokio::test]
async fn test_change_ratio_gate_leaves_graph_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init(tmp.path()).unwrap();

    // Tiny graph: two files
    fs::write(tmp.path().join("a.py"), "def one(x):\n    return x\n").unwrap();
    fs::write(tmp.path().join("b.py"), "def two(y):\n    return y\n").unwrap();
    commit_all(&repo, "initial");

    let config = EncoderConfig::default();
    let encoder = Encoder::new(None, None, &config);
    let mut rpg = encoder
        .encode(tmp.path(), &encode_options())
        .await
        .unwrap()
        .rpg;
    let before = rpg.revision();

    // Churn everything: the change ratio blows past the default 0.5
    fs::remove_file(tmp.path().join("a.py")).unwrap();
    fs::remove_file(tmp.path().join("b.py")).unwrap();
    fs::write(tmp.path().join("c.py"), "def three(z):\n    return z\n").unwrap();
    fs::write(tmp.path().join("d.py"), "def four(w):\n    return w\n").unwrap();
    commit_all(&repo, "rewrite");

    let extractor = SemanticExtractor::new(None, None, &config);
    let router = SemanticRouter::new(None, None);
    let report = evolution::evolve(
        &mut rpg,
        tmp.path(),
        &EvolveOptions::default(),
        &extractor,
        &router,
        None,
    )
    .await
    .unwrap();

    assert!(report.requires_full_encode);
    assert_eq!(report.inserted + report.deleted + report.modified + report.rerouted, 0);
    assert_eq!(rpg.revision(), before);
}

#[tokio::test]
async fn test_evolve_empty_range_is_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init(tmp.path()).unwrap();
    write_initial(tmp.path());
    commit_all(&repo, "initial");

    let config = EncoderConfig::default();
    let encoder = Encoder::new(None, None, &config);
    let mut rpg = encoder
        .encode(tmp.path(), &encode_options())
        .await
        .unwrap()
        .rpg;
    let before = rpg.revision();

    let extractor = SemanticExtractor::new(None, None, &config);
    let router = SemanticRouter::new(None, None);
    let options = EvolveOptions {
        commit_range: "HEAD..HEAD".to_string(),
        ..EvolveOptions::default()
    };
    let report = evolution::evolve(&mut rpg, tmp.path(), &options, &extractor, &router, None)
        .await
        .unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.deleted, 0);
    assert_eq!(report.modified, 0);
    assert_eq!(report.rerouted, 0);
    assert_eq!(report.pruned_nodes, 0);
    assert_eq!(rpg.revision(), before);
}

#[tokio::test]
async fn test_evolve_rejects_bad_inputs() {
    let config = EncoderConfig::default();
    let extractor = SemanticExtractor::new(None, None, &config);
    let router = SemanticRouter::new(None, None);
    let mut rpg = rpg_core::graph::Rpg::new(rpg_core::config::RpgConfig::default());

    // Absent root path
    let err = evolution::evolve(
        &mut rpg,
        Path::new("/nonexistent/rpg-evolve"),
        &EvolveOptions::default(),
        &extractor,
        &router,
        None,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("root path"));

    // Not a commit range
    let tmp = tempfile::tempdir().unwrap();
    git2::Repository::init(tmp.path()).unwrap();
    let options = EvolveOptions {
        commit_range: "HEAD".to_string(),
        ..EvolveOptions::default()
    };
    let err = evolution::evolve(&mut rpg, tmp.path(), &options, &extractor, &router, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("commit range"));
}
