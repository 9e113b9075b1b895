//! Git commit object
//!
//! Commits represent snapshots of the repository at specific points in time.
//! They contain:
//! - A tree object ID (directory snapshot)
//! - Parent commit ID(s) (for history)
//! - Author and committer information
//! - Optional extra headers (`encoding`, `gpgsig`, `mergetag`, ...)
//! - Commit message
//!
//! ## Format
//!
//! On disk:
//! ```text
//! commit <size>\0
//! tree <tree-sha>
//! parent <parent-sha>
//! author <name> <email> <timestamp> <timezone>
//! committer <name> <email> <timestamp> <timezone>
//! gpgsig -----BEGIN PGP SIGNATURE-----
//!  <continuation lines start with a space>
//!
//! <commit message>
//! ```

use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::signature::Signature;
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::io::BufRead;

/// Header name and value; multi-line values are stored with plain `\n` separators
pub type Header = (String, String);

/// Split an object payload into its header fields and message
///
/// Continuation lines (starting with a space) are folded into the previous value.
pub(crate) fn parse_headers(content: &str) -> Result<(Vec<Header>, String)> {
    let (header_block, message) = match content.split_once("\n\n") {
        Some((headers, message)) => (headers, message.to_string()),
        None => (content.strip_suffix('\n').unwrap_or(content), String::new()),
    };

    let mut headers: Vec<Header> = Vec::new();
    for line in header_block.split('\n') {
        if let Some(continuation) = line.strip_prefix(' ') {
            let (_, value) = headers
                .last_mut()
                .ok_or_else(|| Error::malformed("continuation line without a header"))?;
            value.push('\n');
            value.push_str(continuation);
            continue;
        }

        let (key, value) = line
            .split_once(' ')
            .ok_or_else(|| Error::malformed(format!("invalid header line {line:?}")))?;
        headers.push((key.to_string(), value.to_string()));
    }

    Ok((headers, message))
}

pub(crate) fn write_header(content: &mut String, key: &str, value: &str) {
    content.push_str(key);
    content.push(' ');
    content.push_str(&value.replace('\n', "\n "));
    content.push('\n');
}

fn parse_oid_header(value: &str, key: &str) -> Result<ObjectId> {
    ObjectId::try_parse(value).map_err(|_| Error::malformed(format!("invalid {key} id {value:?}")))
}

/// Git commit object
///
/// Represents a snapshot of the repository with metadata.
/// Contains references to:
/// - The tree representing the state of files
/// - Parent commit(s) for history, first parent being the mainline
/// - Author and committer information
/// - Commit message, kept verbatim
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    /// Parent commit IDs (empty for initial commit, multiple for merge commits)
    parents: Vec<ObjectId>,
    /// Tree object ID representing the directory snapshot
    tree_oid: ObjectId,
    /// Author who wrote the changes
    author: Signature,
    /// Committer who recorded the commit
    committer: Signature,
    /// Headers after `committer`, in their original order
    extra_headers: Vec<Header>,
    /// Commit message
    message: String,
}

impl Commit {
    pub fn new(
        parents: Vec<ObjectId>,
        tree_oid: ObjectId,
        author: Signature,
        committer: Signature,
        message: String,
    ) -> Self {
        Commit {
            parents,
            tree_oid,
            author,
            committer,
            extra_headers: Vec::new(),
            message,
        }
    }

    pub fn with_extra_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((key.into(), value.into()));
        self
    }

    /// First line of the message, as shown by `git log --oneline`
    pub fn short_message(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// First paragraph of the message folded onto one line
    pub fn summary(&self) -> String {
        self.message
            .trim_start_matches('\n')
            .lines()
            .take_while(|line| !line.trim().is_empty())
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn author(&self) -> &Signature {
        &self.author
    }

    pub fn committer(&self) -> &Signature {
        &self.committer
    }

    pub fn extra_headers(&self) -> &[Header] {
        &self.extra_headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.extra_headers
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Committer time, the clock used for history ordering
    pub fn timestamp(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.committer.timestamp()
    }

    fn encode(&self) -> String {
        let mut content = String::new();

        write_header(&mut content, "tree", &self.tree_oid.to_string());
        for parent in &self.parents {
            write_header(&mut content, "parent", &parent.to_string());
        }
        write_header(&mut content, "author", &self.author.display());
        write_header(&mut content, "committer", &self.committer.display());
        for (key, value) in &self.extra_headers {
            write_header(&mut content, key, value);
        }
        content.push('\n');
        content.push_str(&self.message);

        content
    }
}

impl Packable for Commit {
    fn serialize(&self) -> Result<Bytes> {
        Ok(Bytes::from(self.encode()))
    }
}

impl Unpackable for Commit {
    fn deserialize(mut reader: impl BufRead) -> Result<Self> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        let content = String::from_utf8(content)
            .map_err(|_| Error::malformed("commit is not valid UTF-8"))?;

        let (headers, message) = parse_headers(&content)?;
        let mut headers = headers.into_iter().peekable();

        let tree_oid = match headers.next() {
            Some((key, value)) if key == "tree" => parse_oid_header(&value, "tree")?,
            _ => return Err(Error::malformed("commit does not start with a tree line")),
        };

        // Parse all parent lines (there can be 0, 1, or multiple parents)
        let mut parents = Vec::new();
        while let Some((_, value)) = headers.next_if(|(key, _)| key == "parent") {
            parents.push(parse_oid_header(&value, "parent")?);
        }

        let author = match headers.next() {
            Some((key, value)) if key == "author" => Signature::try_from(value.as_str())?,
            _ => return Err(Error::malformed("commit is missing the author line")),
        };
        let committer = match headers.next() {
            Some((key, value)) if key == "committer" => Signature::try_from(value.as_str())?,
            _ => return Err(Error::malformed("commit is missing the committer line")),
        };

        Ok(Commit {
            parents,
            tree_oid,
            author,
            committer,
            extra_headers: headers.collect(),
            message,
        })
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    fn display(&self) -> String {
        self.encode()
    }
}

/// Slim representation of a commit
///
/// Contains only what graph algorithms need: parents and the committer timestamp.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SlimCommit {
    /// The commit's object ID
    pub oid: ObjectId,
    /// The commit's parent object IDs
    pub parents: Vec<ObjectId>,
    /// Commit timestamp (needed for comparison)
    pub timestamp: chrono::DateTime<chrono::FixedOffset>,
}

impl SlimCommit {
    pub fn from_commit(oid: ObjectId, commit: &Commit) -> Self {
        SlimCommit {
            oid,
            parents: commit.parents().to_vec(),
            timestamp: commit.timestamp(),
        }
    }
}

impl PartialOrd for SlimCommit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SlimCommit {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.oid.cmp(&other.oid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    const TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";
    const PARENT: &str = "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0";

    #[fixture]
    fn signature() -> Signature {
        Signature::from_parts("A U Thor", "author@example.com", 1_112_911_993, -420).unwrap()
    }

    #[rstest]
    fn encodes_fields_in_canonical_order(signature: Signature) {
        let commit = Commit::new(
            vec![ObjectId::try_parse(PARENT).unwrap()],
            ObjectId::try_parse(TREE).unwrap(),
            signature.clone(),
            signature,
            "Initial commit\n".to_string(),
        );

        assert_eq!(
            commit.display(),
            format!(
                "tree {TREE}\nparent {PARENT}\n\
                 author A U Thor <author@example.com> 1112911993 -0700\n\
                 committer A U Thor <author@example.com> 1112911993 -0700\n\
                 \nInitial commit\n"
            )
        );
    }

    #[test]
    fn signed_commits_round_trip_byte_identically() {
        let raw = format!(
            "tree {TREE}\n\
             author A <a@b> 1 +0000\n\
             committer C <c@d> 2 +0100\n\
             gpgsig -----BEGIN PGP SIGNATURE-----\n \n iQEz\n -----END PGP SIGNATURE-----\n\
             \nSigned\n\nbody\n"
        );

        let commit = Commit::deserialize(std::io::Cursor::new(raw.as_bytes())).unwrap();

        assert!(commit.parents().is_empty());
        assert_eq!(
            commit.header("gpgsig"),
            Some("-----BEGIN PGP SIGNATURE-----\n\niQEz\n-----END PGP SIGNATURE-----")
        );
        assert_eq!(commit.short_message(), "Signed");
        assert_eq!(commit.summary(), "Signed");
        assert_eq!(commit.message(), "Signed\n\nbody\n");
        assert_eq!(commit.serialize().unwrap(), Bytes::from(raw));
    }

    #[rstest]
    #[case("one line\n", "one line")]
    #[case("wrapped\nsubject\n\nbody\n", "wrapped subject")]
    #[case("\n\nleading blank\n", "leading blank")]
    #[case("", "")]
    fn summary_folds_the_first_paragraph(signature: Signature, #[case] message: &str, #[case] expected: &str) {
        let commit = Commit::new(
            vec![],
            ObjectId::try_parse(TREE).unwrap(),
            signature.clone(),
            signature,
            message.to_string(),
        );
        assert_eq!(commit.summary(), expected);
    }

    #[test]
    fn merge_commits_keep_parent_order() {
        let raw = format!(
            "tree {TREE}\nparent {PARENT}\nparent {TREE}\n\
             author A <a@b> 1 +0000\ncommitter A <a@b> 1 +0000\n\nmerge\n"
        );

        let commit = Commit::deserialize(std::io::Cursor::new(raw.as_bytes())).unwrap();

        assert_eq!(commit.parents().len(), 2);
        assert_eq!(commit.parent().unwrap().to_string(), PARENT);
    }

    #[rstest]
    #[case("author A <a@b> 1 +0000\n\nmissing tree")]
    #[case("tree nothex\nauthor A <a@b> 1 +0000\ncommitter A <a@b> 1 +0000\n\nm")]
    #[case("tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\ncommitter A <a@b> 1 +0000\n\nm")]
    fn malformed_commits_are_corrupt(#[case] raw: &str) {
        let error = Commit::deserialize(std::io::Cursor::new(raw.as_bytes())).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::CorruptObject);
    }

    #[rstest]
    fn slim_commits_order_by_committer_time(signature: Signature) {
        let later = Signature::from_parts("B", "b@c", 1_112_911_999, 0).unwrap();
        let tree = ObjectId::try_parse(TREE).unwrap();
        let early = Commit::new(vec![], tree, later.clone(), signature, String::new());
        let late = Commit::new(vec![], tree, later.clone(), later, String::new());

        let early = SlimCommit::from_commit(ObjectId::try_parse(PARENT).unwrap(), &early);
        let late = SlimCommit::from_commit(tree, &late);
        assert!(early < late);
    }
}
