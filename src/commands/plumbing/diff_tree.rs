use crate::areas::repository::Repository;
use crate::artifacts::diff::tree_diff::DiffOptions;
use std::io::Write;

impl Repository {
    /// Recursive `--name-status` listing of the changes between two tree-ish objects
    pub fn diff_tree(
        &self,
        old: &str,
        new: &str,
        pathspec: &[String],
        writer: &mut dyn Write,
    ) -> anyhow::Result<()> {
        let old = self.revparse_single(old)?;
        let new = self.revparse_single(new)?;
        let options = DiffOptions {
            pathspec: pathspec.to_vec(),
        };

        for delta in self.diff_trees(Some(&old), Some(&new), &options)? {
            writeln!(writer, "{}\t{}", delta.status.as_char(), delta.path)?;
        }

        Ok(())
    }
}
