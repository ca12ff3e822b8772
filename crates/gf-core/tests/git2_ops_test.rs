use std::net::TcpListener;
use std::path::Path;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use git2::{Commit, Oid, Repository, Signature, Time};
use gf_core::git2_ops::{
    BlameError, CloneError, CloneOptions, Git2Cloner, Git2ReadOps, GitCloner, HistoryError, HistoryOptions,
    HistoryReader, RemoteUrl,
};
use gf_core::types::CommitOrder;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const T0: i64 = 1_700_000_000;

fn sig(name: &str, time: i64) -> Signature<'static> {
    let email = format!("{}@example.com", name.to_lowercase());
    Signature::new(name, &email, &Time::new(time, 120)).unwrap()
}

fn write_and_commit(
    repo: &Repository,
    files: &[(&str, &str)],
    author: &str,
    time: i64,
    message: &str,
) -> Oid {
    let workdir = repo.workdir().unwrap();
    let mut index = repo.index().unwrap();
    for (path, content) in files {
        let full = workdir.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full, content).unwrap();
        index.add_path(Path::new(path)).unwrap();
    }
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let parents: Vec<Commit> = repo
        .head()
        .ok()
        .and_then(|h| h.peel_to_commit().ok())
        .into_iter()
        .collect();
    let parent_refs: Vec<&Commit> = parents.iter().collect();
    let s = sig(author, time);
    repo.commit(Some("HEAD"), &s, &s, message, &tree, &parent_refs)
        .unwrap()
}

fn sample_repo() -> (tempfile::TempDir, Vec<Oid>) {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let c1 = write_and_commit(
        &repo,
        &[("src/main.rs", "fn main() {\n    println!(\"hi\");\n}\n")],
        "Alice",
        T0,
        "initial",
    );
    let c2 = write_and_commit(
        &repo,
        &[("src/main.rs", "fn main() {\n    println!(\"hello\");\n}\n")],
        "Bob",
        T0 + 60,
        "greet properly",
    );
    let c3 = write_and_commit(
        &repo,
        &[("README.md", "# sample\n"), ("logo.bin", "PNG\0\0\x01\x02")],
        "Carol",
        T0 + 120,
        "docs and logo",
    );
    (dir, vec![c1, c2, c3])
}

// ---------------------------------------------------------------------------
// Blame
// ---------------------------------------------------------------------------

#[test]
fn blame_attributes_each_line() {
    let (dir, commits) = sample_repo();
    let entries = Git2ReadOps::blame_file(dir.path(), "src/main.rs").unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(
        entries.iter().map(|e| e.line_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(entries[0].author_name, "Alice");
    assert_eq!(entries[0].commit_id, commits[0].to_string());
    assert_eq!(entries[1].author_name, "Bob");
    assert_eq!(entries[1].author_email, "bob@example.com");
    assert_eq!(entries[1].commit_id, commits[1].to_string());
    assert_eq!(entries[1].line_content, "    println!(\"hello\");");
    assert_eq!(entries[1].timestamp.timestamp(), T0 + 60);
    assert_eq!(entries[2].author_name, "Alice");
    assert_eq!(entries[2].line_content, "}");
}

#[test]
fn blame_classifies_failures() {
    let (dir, _) = sample_repo();
    std::fs::write(dir.path().join("scratch.txt"), "not committed\n").unwrap();

    let err = |path: &str| Git2ReadOps::blame_file(dir.path(), path).unwrap_err();
    assert!(matches!(err("missing.rs"), BlameError::NotFound(_)));
    assert!(matches!(err("scratch.txt"), BlameError::NotTracked(_)));
    assert!(matches!(err("logo.bin"), BlameError::Binary(_)));
    assert!(matches!(err("src"), BlameError::NotAFile(_)));
    assert!(matches!(err("../outside"), BlameError::InvalidPath(_)));
}

#[test]
fn blame_outside_a_repository_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = Git2ReadOps::blame_file(dir.path(), "a.txt").unwrap_err();
    assert!(matches!(err, BlameError::InvalidRepository(_)));
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[test]
fn history_is_newest_first_by_default() {
    let (dir, commits) = sample_repo();
    let reader = HistoryReader::open(dir.path()).unwrap();
    let records = reader.collect(&HistoryOptions::default()).unwrap();

    let shas: Vec<String> = records.iter().map(|r| r.sha.clone()).collect();
    let expected: Vec<String> = commits.iter().rev().map(|c| c.to_string()).collect();
    assert_eq!(shas, expected);

    let newest = &records[0];
    assert_eq!(newest.author_name, "Carol");
    assert_eq!(newest.message, "docs and logo");
    assert_eq!(newest.author_offset, 120);
    assert_eq!(newest.parents, vec![commits[1].to_string()]);
    assert!(!newest.is_merge);
    assert_eq!(newest.additions, None);
    assert!(records.last().unwrap().parents.is_empty());
}

#[test]
fn history_walk_is_restartable() {
    let (dir, _) = sample_repo();
    let reader = HistoryReader::open(dir.path()).unwrap();
    let opts = HistoryOptions::default();
    let first: Vec<_> = reader.commits(&opts).unwrap().map(Result::unwrap).collect();
    let second: Vec<_> = reader.commits(&opts).unwrap().map(Result::unwrap).collect();
    assert_eq!(first, second);
}

#[test]
fn history_options_shape_the_walk() {
    let (dir, commits) = sample_repo();
    let reader = HistoryReader::open(dir.path()).unwrap();

    let oldest = reader
        .collect(&HistoryOptions {
            order: CommitOrder::OldestFirst,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(oldest[0].sha, commits[0].to_string());

    let limited = reader
        .collect(&HistoryOptions {
            max_count: Some(2),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(limited.len(), 2);

    let with_stats = reader
        .collect(&HistoryOptions {
            include_stats: true,
            ..Default::default()
        })
        .unwrap();
    // "greet properly" swaps one line.
    assert_eq!(with_stats[1].additions, Some(1));
    assert_eq!(with_stats[1].deletions, Some(1));
    // The root commit counts every line as added.
    assert_eq!(with_stats[2].additions, Some(3));
}

#[test]
fn history_marks_merges() {
    let (dir, commits) = sample_repo();
    let repo = Repository::open(dir.path()).unwrap();
    let base = repo.find_commit(commits[0]).unwrap();
    let head = repo.find_commit(commits[2]).unwrap();
    let s = sig("Dave", T0 + 180);
    let side = repo
        .commit(None, &s, &s, "side", &base.tree().unwrap(), &[&base])
        .unwrap();
    let side = repo.find_commit(side).unwrap();
    let s = sig("Dave", T0 + 240);
    repo.commit(Some("HEAD"), &s, &s, "merge side", &head.tree().unwrap(), &[&head, &side])
        .unwrap();

    let reader = HistoryReader::open(dir.path()).unwrap();
    let records = reader.collect(&HistoryOptions::default()).unwrap();
    assert_eq!(records.len(), 5);
    assert!(records[0].is_merge);
    assert_eq!(records[0].parents.len(), 2);
}

#[test]
fn unborn_head_has_empty_history() {
    let dir = tempfile::tempdir().unwrap();
    Repository::init(dir.path()).unwrap();
    let reader = HistoryReader::open(dir.path()).unwrap();
    assert!(reader.collect(&HistoryOptions::default()).unwrap().is_empty());
}

#[test]
fn history_of_non_repository_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        HistoryReader::open(dir.path()),
        Err(HistoryError::InvalidRepository(_))
    ));
}

#[test]
fn repo_name_comes_from_directory_without_origin() {
    let (dir, _) = sample_repo();
    let reader = HistoryReader::open(dir.path()).unwrap();
    let expected = dir.path().file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(reader.repo_name(), expected);
}

// ---------------------------------------------------------------------------
// Clone
// ---------------------------------------------------------------------------

#[test]
fn local_clone_reports_monotonic_progress() {
    let (src, _) = sample_repo();
    let dest = tempfile::tempdir().unwrap();
    let target = dest.path().join("copy");

    let url = RemoteUrl::parse(src.path().to_str().unwrap()).unwrap();
    let mut seen = Vec::new();
    Git2Cloner
        .clone_repo(&url, &target, None, &CloneOptions::default(), &mut |p| {
            seen.push(p)
        })
        .unwrap();

    assert!(target.join("src/main.rs").is_file());
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");

    // The clone's history names the source repository via origin.
    let reader = HistoryReader::open(&target).unwrap();
    let src_name = src.path().file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(reader.repo_name(), src_name);
}

#[test]
fn clone_of_missing_source_fails() {
    let dest = tempfile::tempdir().unwrap();
    let url = RemoteUrl::parse("/definitely/not/a/repo").unwrap();
    let result = Git2Cloner.clone_repo(
        &url,
        &dest.path().join("copy"),
        None,
        &CloneOptions::default(),
        &mut |_| {},
    );
    assert!(result.is_err());
}

#[test]
fn clone_from_a_silent_server_times_out() {
    // Accepts connections and never answers.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
        }
    });

    let dest = tempfile::tempdir().unwrap();
    let target = dest.path().join("copy");
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let url = RemoteUrl::parse(&format!("http://127.0.0.1:{port}/acme/repo.git")).unwrap();
        let opts = CloneOptions {
            timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let started = Instant::now();
        let result = Git2Cloner.clone_repo(&url, &target, None, &opts, &mut |_| {});
        let _ = tx.send((result, started.elapsed()));
    });

    let (result, elapsed) = rx
        .recv_timeout(Duration::from_secs(20))
        .expect("clone against a silent server never returned");
    assert!(matches!(result, Err(CloneError::Timeout(1))), "{result:?}");
    assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
    assert_eq!(result.unwrap_err().to_string(), "clone timed out after 1s");
}
