use crate::areas::repository::Repository;
use bstr::{BStr, ByteSlice};
use std::io::Write;

impl Repository {
    /// List index paths; with `stage` also their mode, id and stage number
    pub fn ls_files(&self, stage: bool, writer: &mut dyn Write) -> anyhow::Result<()> {
        let index = self.index()?;

        let mut previous: Option<&BStr> = None;
        for entry in index.entries() {
            if stage {
                writeln!(
                    writer,
                    "{} {} {}\t{}",
                    entry.mode(),
                    entry.oid,
                    entry.stage.as_u16(),
                    entry.name
                )?;
            } else if previous != Some(entry.name.as_bstr()) {
                writeln!(writer, "{}", entry.name)?;
            }
            previous = Some(entry.name.as_bstr());
        }

        Ok(())
    }
}
