use crate::areas::repository::Repository;
use crate::artifacts::objects::signature::{Signature, SignatureRole};
use anyhow::Context;
use std::io::Write;

impl Repository {
    /// Write a commit object from a tree and parents, without moving any reference
    pub fn commit_tree(
        &self,
        tree: &str,
        parents: &[String],
        message: &str,
        writer: &mut dyn Write,
    ) -> anyhow::Result<()> {
        let tree = self.database().peel_to_tree(&self.revparse_single(tree)?)?;
        let parents = parents
            .iter()
            .map(|parent| {
                let oid = self.revparse_single(parent)?;
                self.database().peel_to_commit(&oid)
            })
            .collect::<crate::errors::Result<Vec<_>>>()?;

        let author = Signature::load_from_env(SignatureRole::Author)
            .context("author identity unknown")?;
        let committer = Signature::load_from_env(SignatureRole::Committer)
            .context("committer identity unknown")?;

        let mut message = message.to_string();
        if !message.ends_with('\n') {
            message.push('\n');
        }

        let oid = self.create_commit(None, &author, &committer, &message, &tree, &parents)?;
        writeln!(writer, "{oid}")?;

        Ok(())
    }
}
