use crate::areas::repository::Repository;
use anyhow::Context;
use std::io::Write;
use std::path::Path;

pub fn init(path: &Path, bare: bool, writer: &mut dyn Write) -> anyhow::Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let path = path.canonicalize()?;

    let repository = if bare {
        Repository::init_bare(&path)
    } else {
        Repository::init(&path)
    }
    .context("failed to initialize repository")?;

    writeln!(
        writer,
        "Initialized empty Git repository in {}/",
        repository.git_dir().display()
    )?;

    Ok(())
}
