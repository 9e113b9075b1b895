//! Reflog lines
//!
//! `<old oid> <new oid> <name> <<email>> <unix-seconds> <+hhmm>\t<message>`
//!
//! Creation and deletion are recorded with the all-zero id on the missing side.

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::signature::Signature;
use crate::errors::{Error, Result};

const NULL_OID: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflogEntry {
    pub old: Option<ObjectId>,
    pub new: Option<ObjectId>,
    pub committer: Signature,
    pub message: String,
}

impl ReflogEntry {
    pub fn new(
        old: Option<ObjectId>,
        new: Option<ObjectId>,
        committer: Signature,
        message: impl Into<String>,
    ) -> Self {
        ReflogEntry {
            old,
            new,
            committer,
            message: message.into(),
        }
    }

    /// One newline-terminated line; the message is flattened to a single line
    pub fn serialize(&self) -> String {
        let id = |oid: &Option<ObjectId>| oid.map_or_else(|| NULL_OID.to_string(), |oid| oid.to_string());
        let message = self.message.lines().collect::<Vec<_>>().join(" ");

        format!(
            "{} {} {}\t{}\n",
            id(&self.old),
            id(&self.new),
            self.committer.display(),
            message.trim()
        )
    }

    pub fn parse(line: &str) -> Result<Self> {
        let invalid = || Error::invalid_argument(format!("invalid reflog line {line:?}"));
        let line = line.trim_end_matches('\n');

        let (head, message) = line.split_once('\t').unwrap_or((line, ""));
        let (old, rest) = head.split_once(' ').ok_or_else(invalid)?;
        let (new, committer) = rest.split_once(' ').ok_or_else(invalid)?;

        let id = |value: &str| -> Result<Option<ObjectId>> {
            if value == NULL_OID {
                Ok(None)
            } else {
                ObjectId::try_parse(value).map(Some)
            }
        };

        Ok(ReflogEntry {
            old: id(old)?,
            new: id(new)?,
            committer: Signature::try_from(committer).map_err(|_| invalid())?,
            message: message.to_string(),
        })
    }
}
