use crate::areas::repository::Repository;
use crate::artifacts::merge::file_merge::FileFavor;
use crate::artifacts::merge::tree_merge::MergeOptions;
use crate::commands::CommandStatus;
use std::io::Write;

impl Repository {
    /// Three-way merge of tree-ish objects
    ///
    /// Prints the merged tree id, or every conflicted path when the merge is not clean.
    pub fn merge_tree(
        &self,
        base: &str,
        ours: &str,
        theirs: &str,
        favor: FileFavor,
        writer: &mut dyn Write,
    ) -> anyhow::Result<CommandStatus> {
        let base = self.revparse_single(base)?;
        let ours = self.revparse_single(ours)?;
        let theirs = self.revparse_single(theirs)?;

        let index = self.merge_trees(Some(&base), &ours, &theirs, MergeOptions { favor })?;
        let conflicts = index.conflicts();
        if conflicts.is_empty() {
            writeln!(writer, "{}", index.create_tree()?)?;
            return Ok(CommandStatus::Success);
        }

        for conflict in &conflicts {
            writeln!(writer, "{}", conflict.path)?;
        }
        tracing::debug!(conflicts = conflicts.len(), "merge-tree left conflicts");

        Ok(CommandStatus::Failure)
    }
}
