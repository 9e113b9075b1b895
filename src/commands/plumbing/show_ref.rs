use crate::areas::repository::Repository;
use crate::commands::CommandStatus;
use std::io::Write;

impl Repository {
    /// List references with the ids they resolve to; fails when there are none
    pub fn show_ref(&self, writer: &mut dyn Write) -> anyhow::Result<CommandStatus> {
        let references = self.refs().list(None)?;

        let mut shown = 0;
        for reference in &references {
            let oid = match reference.oid() {
                Some(oid) => *oid,
                None => match self.refs().resolve(reference.name().as_str()) {
                    Ok(oid) => oid,
                    Err(error) if error.is_not_found() => continue,
                    Err(error) => return Err(error.into()),
                },
            };
            writeln!(writer, "{oid} {}", reference.name())?;
            shown += 1;
        }

        Ok(CommandStatus::from_success(shown > 0))
    }
}
