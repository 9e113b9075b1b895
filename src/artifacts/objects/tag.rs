//! Git annotated tag object
//!
//! ## Format
//!
//! ```text
//! tag <size>\0
//! object <target-sha>
//! type <target-type>
//! tag <name>
//! tagger <name> <email> <timestamp> <timezone>
//!
//! <message>
//! ```
//!
//! Lightweight tags have no object of their own; they are plain references.

use crate::artifacts::objects::commit::{parse_headers, write_header};
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::signature::Signature;
use crate::errors::{Error, Result};
use bytes::Bytes;
use derive_new::new;
use std::io::BufRead;

#[derive(Debug, Clone, Eq, PartialEq, new)]
pub struct Tag {
    target: ObjectId,
    target_type: ObjectType,
    name: String,
    tagger: Option<Signature>,
    message: String,
}

impl Tag {
    pub fn target(&self) -> &ObjectId {
        &self.target
    }

    pub fn target_type(&self) -> ObjectType {
        self.target_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tagger(&self) -> Option<&Signature> {
        self.tagger.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn encode(&self) -> String {
        let mut content = String::new();

        write_header(&mut content, "object", &self.target.to_string());
        write_header(&mut content, "type", self.target_type.as_str());
        write_header(&mut content, "tag", &self.name);
        if let Some(tagger) = &self.tagger {
            write_header(&mut content, "tagger", &tagger.display());
        }
        content.push('\n');
        content.push_str(&self.message);

        content
    }
}

impl Packable for Tag {
    fn serialize(&self) -> Result<Bytes> {
        Ok(Bytes::from(self.encode()))
    }
}

impl Unpackable for Tag {
    fn deserialize(mut reader: impl BufRead) -> Result<Self> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        let content =
            String::from_utf8(content).map_err(|_| Error::malformed("tag is not valid UTF-8"))?;

        let (headers, message) = parse_headers(&content)?;
        let field = |name: &str| {
            headers
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };

        let target = field("object")
            .ok_or_else(|| Error::malformed("tag is missing the object line"))
            .and_then(|value| {
                ObjectId::try_parse(value)
                    .map_err(|_| Error::malformed(format!("invalid tag target {value:?}")))
            })?;
        let target_type = field("type")
            .ok_or_else(|| Error::malformed("tag is missing the type line"))
            .and_then(|value| {
                ObjectType::try_from(value)
                    .map_err(|_| Error::malformed(format!("invalid tag target type {value:?}")))
            })?;
        let name = field("tag")
            .ok_or_else(|| Error::malformed("tag is missing the tag line"))?
            .to_string();
        let tagger = field("tagger").map(Signature::try_from).transpose()?;

        Ok(Tag::new(target, target_type, name, tagger, message))
    }
}

impl Object for Tag {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn display(&self) -> String {
        self.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn annotated_tag_round_trips() {
        let raw = "object b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0\n\
                   type commit\n\
                   tag v1.0\n\
                   tagger T <t@example.com> 1700000000 +0000\n\
                   \n\
                   Release 1.0\n";

        let tag = Tag::deserialize(std::io::Cursor::new(raw.as_bytes())).unwrap();

        assert_eq!(tag.name(), "v1.0");
        assert_eq!(tag.target_type(), ObjectType::Commit);
        assert_eq!(tag.tagger().unwrap().name(), "T");
        assert_eq!(tag.message(), "Release 1.0\n");
        assert_eq!(tag.serialize().unwrap(), Bytes::from(raw));
    }

    #[test]
    fn tagger_is_optional() {
        let raw = "object b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0\ntype blob\ntag old\n\nold style\n";

        let tag = Tag::deserialize(std::io::Cursor::new(raw.as_bytes())).unwrap();

        assert!(tag.tagger().is_none());
        assert_eq!(tag.serialize().unwrap(), Bytes::from(raw));
    }

    #[test]
    fn missing_target_is_corrupt() {
        let error = Tag::deserialize(std::io::Cursor::new(b"type commit\ntag x\n\n".as_slice()))
            .unwrap_err();
        assert_eq!(error.kind(), crate::errors::ErrorKind::CorruptObject);
    }
}
