use crate::areas::repository::Repository;

impl Repository {
    /// Replace the index with the contents of a tree-ish
    pub fn read_tree_into_index(&self, revision: &str) -> anyhow::Result<()> {
        let tree = self.database().peel_to_tree(&self.revparse_single(revision)?)?;

        let mut index = self.index()?;
        index.read_tree(&tree)?;
        index.write()?;

        Ok(())
    }
}
