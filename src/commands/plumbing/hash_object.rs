use crate::areas::repository::Repository;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use std::io::Write;
use std::path::Path;

/// Print the id of a file's content; with a repository the object is also stored
pub fn hash_object(
    repository: Option<&Repository>,
    file: &Path,
    object_type: ObjectType,
    writer: &mut dyn Write,
) -> anyhow::Result<()> {
    let content =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;

    let oid = match repository {
        Some(repository) => repository.database().write(&content, object_type)?,
        None => ObjectId::hash(object_type, &content),
    };
    writeln!(writer, "{oid}")?;

    Ok(())
}
