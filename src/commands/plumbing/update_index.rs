use crate::areas::repository::Repository;
use crate::artifacts::index::index_entry::Stage;
use anyhow::{Context, bail};

#[derive(Debug, Clone, Default)]
pub struct UpdateIndexOptions {
    /// Stage paths that are not in the index yet
    pub add: bool,
    /// Drop entries whose file is gone from the working directory
    pub remove: bool,
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches("./").trim_end_matches('/')
}

impl Repository {
    pub fn update_index(&self, paths: &[String], options: &UpdateIndexOptions) -> anyhow::Result<()> {
        let workspace = self
            .workspace()
            .context("update-index needs a working directory")?;
        let mut index = self.index()?;

        for path in paths.iter().map(|path| normalize(path)) {
            let exists = workspace.resolve(path)?.symlink_metadata().is_ok();
            let tracked = index.get(path, Stage::Normal).is_some();

            match (exists, tracked) {
                (true, true) => index.add_by_path(path)?,
                (true, false) if options.add => index.add_by_path(path)?,
                (true, false) => {
                    bail!("{path}: cannot add to the index - missing --add option?")
                }
                (false, _) if options.remove => {
                    index.remove(path, None);
                }
                (false, _) => bail!("{path}: does not exist and --remove not passed"),
            }
        }

        index.write().context("failed to write the index")?;

        Ok(())
    }
}
