use assert_cmd::Command;
use assert_fs::TempDir;
use rstest::fixture;
use std::path::Path;

pub const AUTHOR_NAME: &str = "A U Thor";
pub const AUTHOR_EMAIL: &str = "author@example.com";
pub const BASE_TIME: i64 = 1_700_000_000;

/// Identity and config isolation shared by both binaries
fn isolate(cmd: &mut Command, time: i64) {
    let date = format!("{time} +0000");
    cmd.envs([
        ("GIT_AUTHOR_NAME", AUTHOR_NAME),
        ("GIT_AUTHOR_EMAIL", AUTHOR_EMAIL),
        ("GIT_AUTHOR_DATE", date.as_str()),
        ("GIT_COMMITTER_NAME", AUTHOR_NAME),
        ("GIT_COMMITTER_EMAIL", AUTHOR_EMAIL),
        ("GIT_COMMITTER_DATE", date.as_str()),
        ("GIT_CONFIG_NOSYSTEM", "1"),
        ("GIT_CONFIG_GLOBAL", "/dev/null"),
    ]);
    for variable in [
        "GIT_DIR",
        "GIT_INDEX_FILE",
        "GIT_OBJECT_DIRECTORY",
        "GIT_ALTERNATE_OBJECT_DIRECTORIES",
    ] {
        cmd.env_remove(variable);
    }
}

#[fixture]
pub fn repository_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// A repository created by git itself
#[fixture]
pub fn git_repository(repository_dir: TempDir) -> TempDir {
    run_git_command(repository_dir.path(), &["init", "-q"])
        .assert()
        .success();
    run_git_command(
        repository_dir.path(),
        &["symbolic-ref", "HEAD", "refs/heads/master"],
    )
    .assert()
    .success();

    repository_dir
}

pub fn run_bitcore_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("bitcore").expect("Failed to find bitcore binary");
    isolate(&mut cmd, BASE_TIME);
    cmd.current_dir(dir);
    cmd.args(args);
    cmd
}

pub fn run_git_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new("git");
    isolate(&mut cmd, BASE_TIME);
    cmd.current_dir(dir);
    cmd.args(args);
    cmd
}

fn stdout_of(mut cmd: Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).expect("stdout is not UTF-8")
}

pub fn bitcore_stdout(dir: &Path, args: &[&str]) -> String {
    stdout_of(run_bitcore_command(dir, args))
}

pub fn git_stdout(dir: &Path, args: &[&str]) -> String {
    stdout_of(run_git_command(dir, args))
}

pub fn git_hash_blob(dir: &Path, content: &str) -> String {
    let mut cmd = run_git_command(dir, &["hash-object", "-w", "--stdin"]);
    cmd.write_stdin(content.to_string());
    stdout_of(cmd).trim().to_string()
}

/// Write a tree with git through a scratch index, leaving the real index alone
pub fn git_tree(dir: &Path, files: &[(&str, &str)]) -> String {
    let scratch = dir.join(".git").join("scratch-index");
    let _ = std::fs::remove_file(&scratch);

    for (path, content) in files {
        let blob = git_hash_blob(dir, content);
        let cacheinfo = format!("100644,{blob},{path}");
        run_git_command(dir, &["update-index", "--add", "--cacheinfo", &cacheinfo])
            .env("GIT_INDEX_FILE", &scratch)
            .assert()
            .success();
    }

    let mut cmd = run_git_command(dir, &["write-tree"]);
    cmd.env("GIT_INDEX_FILE", &scratch);
    let tree = stdout_of(cmd).trim().to_string();
    let _ = std::fs::remove_file(&scratch);

    tree
}

/// Commit `tree` with git at a fixed time, so ids are reproducible
pub fn git_commit_tree(dir: &Path, tree: &str, parents: &[&str], message: &str, time: i64) -> String {
    let mut args = vec!["commit-tree", tree, "-m", message];
    for parent in parents {
        args.extend(["-p", *parent]);
    }

    let mut cmd = run_git_command(dir, &args);
    isolate(&mut cmd, time);
    stdout_of(cmd).trim().to_string()
}

pub fn lines(output: &str) -> Vec<String> {
    output.lines().map(str::to_string).collect()
}
