use crate::areas::repository::Repository;
use crate::artifacts::objects::object::ObjectBox;
use crate::artifacts::objects::object_type::ObjectType;
use crate::commands::CommandStatus;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatFileMode {
    /// `-p`
    Pretty,
    /// `-t`
    Type,
    /// `-s`
    Size,
    /// `-e`
    Exists,
}

impl Repository {
    pub fn cat_file(
        &self,
        revision: &str,
        mode: CatFileMode,
        writer: &mut dyn Write,
    ) -> anyhow::Result<CommandStatus> {
        if mode == CatFileMode::Exists {
            return Ok(CommandStatus::from_success(self.revparse_single(revision).is_ok()));
        }

        let oid = self.revparse_single(revision)?;
        match mode {
            CatFileMode::Type => {
                writeln!(writer, "{}", self.database().read_header(&oid)?.object_type)?
            }
            CatFileMode::Size => writeln!(writer, "{}", self.database().read_header(&oid)?.size)?,
            CatFileMode::Pretty => {
                let raw = self.database().read_raw(&oid)?;
                match raw.object_type {
                    ObjectType::Tree => {
                        let listing = ObjectBox::from_raw(&raw)?.display();
                        if !listing.is_empty() {
                            writeln!(writer, "{listing}")?;
                        }
                    }
                    _ => writer.write_all(&raw.data)?,
                }
            }
            CatFileMode::Exists => {}
        }

        Ok(CommandStatus::Success)
    }
}
