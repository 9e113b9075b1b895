use crate::areas::repository::Repository;
use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::refs::{ANCESTOR_REGEX, PARENT_REGEX, REF_ALIASES};
use crate::errors::{Error, Result};

/// Represents a revision expression that identifies a single object.
///
/// Supports multiple formats:
/// - Reference names: `main`, `refs/heads/main`, `v1.0`, `HEAD`
/// - Aliases: `@` (resolves to `HEAD`)
/// - Full or abbreviated object ids (4-40 hex characters)
/// - Parent notation: `<revision>^` and `<revision>^<n>` for the n-th parent
/// - Ancestor notation: `<revision>~<n>`, following first parents
///
/// # Parsing Strategy
///
/// Hex-looking strings are parsed as `Name` variants. During resolution a
/// matching reference wins; only when none exists is the string tried as an
/// object id prefix, which is how git disambiguates as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    /// A reference name or object id prefix
    Name(String),
    /// The n-th parent of a revision; `^0` is the commit itself
    Parent(Box<Revision>, usize),
    /// The n-th first-parent ancestor of a revision
    Ancestor(Box<Revision>, usize),
}

impl Revision {
    pub fn try_parse(revision: &str) -> Result<Revision> {
        let parent = regex::Regex::new(PARENT_REGEX)
            .map_err(|error| Error::invalid_argument(error.to_string()))?;
        let ancestor = regex::Regex::new(ANCESTOR_REGEX)
            .map_err(|error| Error::invalid_argument(error.to_string()))?;

        if let Some(captures) = parent.captures(revision) {
            let base = Self::try_parse(&captures[1])?;
            Ok(Revision::Parent(Box::new(base), Self::count(&captures[2])?))
        } else if let Some(captures) = ancestor.captures(revision) {
            let base = Self::try_parse(&captures[1])?;
            Ok(Revision::Ancestor(Box::new(base), Self::count(&captures[2])?))
        } else if revision.is_empty() || revision.contains(['^', '~']) {
            Err(Error::invalid_argument(format!("invalid revision {revision:?}")))
        } else {
            let name = *REF_ALIASES.get(revision).unwrap_or(&revision);
            Ok(Revision::Name(name.to_string()))
        }
    }

    fn count(digits: &str) -> Result<usize> {
        if digits.is_empty() {
            return Ok(1);
        }
        digits
            .parse()
            .map_err(|_| Error::invalid_argument(format!("invalid revision count {digits:?}")))
    }

    pub fn resolve(&self, repository: &Repository) -> Result<ObjectId> {
        match self {
            Revision::Name(name) => Self::resolve_name(name, repository),
            Revision::Parent(base, nth) => {
                let commit_oid = repository.database().peel_to_commit(&base.resolve(repository)?)?;
                if *nth == 0 {
                    return Ok(commit_oid);
                }

                let commit = repository.database().parse_object_as_commit(&commit_oid)?;
                commit.parents().get(nth - 1).copied().ok_or_else(|| {
                    Error::not_found(format!("parent {nth} of {}", commit_oid.to_short_oid()))
                })
            }
            Revision::Ancestor(base, generations) => {
                let mut oid = repository.database().peel_to_commit(&base.resolve(repository)?)?;
                for _ in 0..*generations {
                    let commit = repository.database().parse_object_as_commit(&oid)?;
                    oid = *commit.parent().ok_or_else(|| {
                        Error::not_found(format!("parent of {}", oid.to_short_oid()))
                    })?;
                }

                Ok(oid)
            }
        }
    }

    fn resolve_name(name: &str, repository: &Repository) -> Result<ObjectId> {
        if let Some(ref_name) = repository.refs().dwim(name)? {
            return repository.refs().resolve(ref_name.as_str());
        }

        if Self::looks_like_oid(name) {
            return repository.database().resolve_prefix(name);
        }

        Err(Error::not_found(format!(
            "revision {name:?}: unknown revision or path not in the working tree"
        )))
    }

    fn looks_like_oid(s: &str) -> bool {
        s.len() >= 4 && s.len() <= OBJECT_ID_LENGTH && s.chars().all(|c| c.is_ascii_hexdigit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn name(value: &str) -> Box<Revision> {
        Box::new(Revision::Name(value.to_string()))
    }

    #[rstest]
    #[case("main", Revision::Name("main".to_string()))]
    #[case("@", Revision::Name("HEAD".to_string()))]
    #[case("main^", Revision::Parent(name("main"), 1))]
    #[case("main^2", Revision::Parent(name("main"), 2))]
    #[case("main^0", Revision::Parent(name("main"), 0))]
    #[case("HEAD~3", Revision::Ancestor(name("HEAD"), 3))]
    #[case("HEAD~", Revision::Ancestor(name("HEAD"), 1))]
    #[case("@^^", Revision::Parent(Box::new(Revision::Parent(name("HEAD"), 1)), 1))]
    #[case("abc123~2^", Revision::Parent(Box::new(Revision::Ancestor(name("abc123"), 2)), 1))]
    fn parses_revision_expressions(#[case] input: &str, #[case] expected: Revision) {
        assert_eq!(Revision::try_parse(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("^")]
    #[case("~2")]
    fn rejects_empty_bases(#[case] input: &str) {
        assert!(Revision::try_parse(input).is_err());
    }

    #[rstest]
    #[case("abcd", true)]
    #[case("abc", false)]
    #[case("main", false)]
    #[case("0123456789abcdef0123456789abcdef01234567", true)]
    fn detects_object_id_candidates(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(Revision::looks_like_oid(input), expected);
    }
}
