//! Reference values
//!
//! ## File Format
//!
//! A loose reference file contains either:
//! - A 40-character SHA-1 hash (direct reference)
//! - `ref: <name>` for symbolic references

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::refs::ref_name::RefName;
use crate::errors::{Error, Result};

const SYMREF_PREFIX: &str = "ref: ";

/// What a reference file points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    Direct(ObjectId),
    Symbolic(RefName),
}

impl RefTarget {
    /// Parse the content of a loose reference file
    pub fn parse(content: &str) -> Result<Self> {
        let content = content.trim_end();

        match content.strip_prefix(SYMREF_PREFIX) {
            Some(target) => Ok(RefTarget::Symbolic(RefName::try_parse(target.trim())?)),
            None => ObjectId::try_parse(content)
                .map(RefTarget::Direct)
                .map_err(|_| Error::invalid_argument(format!("invalid reference content {content:?}"))),
        }
    }

    /// File content, newline-terminated like git writes it
    pub fn serialize(&self) -> String {
        match self {
            RefTarget::Direct(oid) => format!("{oid}\n"),
            RefTarget::Symbolic(name) => format!("{SYMREF_PREFIX}{name}\n"),
        }
    }
}

/// A named reference together with its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    name: RefName,
    target: RefTarget,
}

impl Reference {
    pub fn new(name: RefName, target: RefTarget) -> Self {
        Reference { name, target }
    }

    pub fn name(&self) -> &RefName {
        &self.name
    }

    pub fn target(&self) -> &RefTarget {
        &self.target
    }

    pub fn oid(&self) -> Option<&ObjectId> {
        match &self.target {
            RefTarget::Direct(oid) => Some(oid),
            RefTarget::Symbolic(_) => None,
        }
    }

    pub fn symbolic_target(&self) -> Option<&RefName> {
        match &self.target {
            RefTarget::Symbolic(name) => Some(name),
            RefTarget::Direct(_) => None,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self.target, RefTarget::Symbolic(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use pretty_assertions::assert_eq;

    const OID: &str = "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0";

    #[test]
    fn parses_both_kinds() {
        assert_eq!(
            RefTarget::parse(&format!("{OID}\n")).unwrap(),
            RefTarget::Direct(ObjectId::try_parse(OID).unwrap())
        );
        assert_eq!(
            RefTarget::parse("ref: refs/heads/main\n").unwrap(),
            RefTarget::Symbolic(RefName::try_parse("refs/heads/main").unwrap())
        );
    }

    #[test]
    fn serialize_matches_git_layout() {
        let target = RefTarget::Symbolic(RefName::try_parse("refs/heads/main").unwrap());
        assert_eq!(target.serialize(), "ref: refs/heads/main\n");
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(
            RefTarget::parse("not a ref").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }
}
