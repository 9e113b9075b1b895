use crate::common::command::{
    BASE_TIME, bitcore_stdout, git_commit_tree, git_repository, git_stdout, git_tree,
    run_git_command,
};
use assert_fs::TempDir;
use bitcore::Repository;
use bitcore::artifacts::objects::object_id::ObjectId;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::Path;
use std::sync::Arc;

mod common;

/// Several revisions of similar files so the repack produces deltas
fn history_with_similar_blobs(dir: &Path) -> Vec<String> {
    let body: String = (0..200).map(|line| format!("line {line} of the file\n")).collect();

    let mut parents: Vec<String> = Vec::new();
    for revision in 0..5 {
        let content = format!("{body}revision {revision}\n");
        let tree = git_tree(dir, &[("big.txt", content.as_str()), ("notes/readme.md", "notes\n")]);
        let parent_refs: Vec<&str> = parents.last().map(String::as_str).into_iter().collect();
        let commit = git_commit_tree(
            dir,
            &tree,
            &parent_refs,
            &format!("revision {revision}"),
            BASE_TIME + revision,
        );
        parents.push(commit);
    }

    let head = parents.last().expect("no commits written");
    run_git_command(dir, &["update-ref", "refs/heads/master", head])
        .assert()
        .success();
    run_git_command(dir, &["tag", "-a", "-m", "packed tag", "v1.0", head])
        .assert()
        .success();
    run_git_command(dir, &["repack", "-a", "-d", "-q"])
        .assert()
        .success();
    run_git_command(dir, &["prune-packed"]).assert().success();

    let mut objects: Vec<String> = git_stdout(dir, &["rev-list", "--objects", "--all"])
        .lines()
        .filter_map(|line| line.split(' ').next())
        .map(str::to_string)
        .collect();
    objects.push(git_stdout(dir, &["rev-parse", "v1.0"]).trim().to_string());

    objects
}

#[rstest]
fn packed_objects_match_git(git_repository: TempDir) {
    let dir = git_repository.path();
    let objects = history_with_similar_blobs(dir);
    assert!(!objects.is_empty());
    assert!(std::fs::read_dir(dir.join(".git/objects/pack")).unwrap().count() >= 2);

    for object in &objects {
        for flag in ["-t", "-s", "-p"] {
            assert_eq!(
                bitcore_stdout(dir, &["cat-file", flag, object]),
                git_stdout(dir, &["cat-file", flag, object]),
                "cat-file {flag} {object}"
            );
        }
    }
}

#[rstest]
fn packed_objects_resolve_by_prefix(git_repository: TempDir) {
    let dir = git_repository.path();
    let objects = history_with_similar_blobs(dir);
    let commit = git_stdout(dir, &["rev-parse", "master"]).trim().to_string();
    assert!(objects.contains(&commit));

    assert_eq!(
        bitcore_stdout(dir, &["cat-file", "-t", &commit[..10]]),
        "commit\n"
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn packed_objects_can_be_read_concurrently(git_repository: TempDir) {
    let dir = git_repository.path();
    let objects = history_with_similar_blobs(dir);
    let repository = Arc::new(Repository::open(dir).unwrap());

    let readers = objects.iter().cycle().take(objects.len() * 4).map(|object| {
        let repository = Arc::clone(&repository);
        let oid = ObjectId::try_parse(object).unwrap();
        tokio::task::spawn_blocking(move || {
            let raw = repository.database().read_raw(&oid).unwrap();
            (oid, raw.oid())
        })
    });

    for result in futures::future::join_all(readers).await {
        let (requested, hashed) = result.unwrap();
        assert_eq!(requested, hashed);
    }
}
