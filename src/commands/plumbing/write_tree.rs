use crate::areas::repository::Repository;
use std::io::Write;

impl Repository {
    pub fn write_tree(&self, writer: &mut dyn Write) -> anyhow::Result<()> {
        let root = self.index()?.create_tree()?;
        writeln!(writer, "{root}")?;

        Ok(())
    }
}
