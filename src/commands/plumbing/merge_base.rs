use crate::areas::repository::Repository;
use crate::commands::CommandStatus;
use std::io::Write;

impl Repository {
    /// Print the best common ancestor, or all of them with `all`
    pub fn merge_base_command(
        &self,
        one: &str,
        two: &str,
        all: bool,
        writer: &mut dyn Write,
    ) -> anyhow::Result<CommandStatus> {
        let one = self.revparse_single(one)?;
        let two = self.revparse_single(two)?;

        let mut bases = self.merge_bases(&one, &two)?;
        if !all {
            bases.truncate(1);
        }
        for base in &bases {
            writeln!(writer, "{base}")?;
        }

        Ok(CommandStatus::from_success(!bases.is_empty()))
    }
}
