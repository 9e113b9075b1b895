use crate::areas::repository::Repository;
use std::io::Write;

impl Repository {
    /// Point `name` at another reference, or print where it points when no target is given
    pub fn symbolic_ref(
        &self,
        name: &str,
        target: Option<&str>,
        writer: &mut dyn Write,
    ) -> anyhow::Result<()> {
        match target {
            Some(target) => {
                self.refs().create_symbolic(name, target, true, None)?;
            }
            None => match self.refs().find(name)?.symbolic_target() {
                Some(target) => writeln!(writer, "{target}")?,
                None => anyhow::bail!("ref {name} is not a symbolic ref"),
            },
        }

        Ok(())
    }
}
