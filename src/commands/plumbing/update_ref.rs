use crate::areas::repository::Repository;

impl Repository {
    /// Point `name` (or what it symbolically refers to) at a revision
    pub fn update_ref(&self, name: &str, revision: &str, old: Option<&str>) -> anyhow::Result<()> {
        let new = self.revparse_single(revision)?;
        let expected_old = old.map(|old| self.revparse_single(old)).transpose()?;

        self.refs().update(name, new, expected_old, None)?;

        Ok(())
    }
}
