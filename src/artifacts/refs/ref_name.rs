use crate::artifacts::refs::{INVALID_REF_NAME_REGEX, PSEUDO_REF_REGEX, REF_ALIASES, REFS_PREFIX};
use crate::errors::{Error, Result};

/// A fully qualified reference name such as `refs/heads/main` or `HEAD`
///
/// Names under `refs/` follow `git check-ref-format`; outside `refs/` only
/// all-caps pseudo refs (`HEAD`, `ORIG_HEAD`, ...) are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefName(String);

impl RefName {
    pub fn try_parse(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        let name = *REF_ALIASES.get(name).unwrap_or(&name);

        if name.is_empty() || name == "@" {
            return Err(Error::invalid_argument(format!("invalid reference name {name:?}")));
        }

        let invalid = regex::Regex::new(INVALID_REF_NAME_REGEX)
            .map_err(|error| Error::invalid_argument(error.to_string()))?;
        if invalid.is_match(name) {
            return Err(Error::invalid_argument(format!("invalid reference name {name:?}")));
        }

        if !name.starts_with(REFS_PREFIX) {
            let pseudo = regex::Regex::new(PSEUDO_REF_REGEX)
                .map_err(|error| Error::invalid_argument(error.to_string()))?;
            if !pseudo.is_match(name) {
                return Err(Error::invalid_argument(format!(
                    "reference name {name:?} must start with {REFS_PREFIX:?}"
                )));
            }
        }

        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last component, e.g. `main` for `refs/heads/main`
    pub fn short_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::proptest;
    use rstest::rstest;

    #[rstest]
    #[case("HEAD")]
    #[case("ORIG_HEAD")]
    #[case("refs/heads/main")]
    #[case("refs/heads/feature/new-thing")]
    #[case("refs/tags/v1.0")]
    fn accepts_valid_names(#[case] name: &str) {
        assert_eq!(RefName::try_parse(name).unwrap().as_str(), name);
    }

    #[test]
    fn at_sign_is_head() {
        assert_eq!(RefName::try_parse("@").unwrap().as_str(), "HEAD");
    }

    #[rstest]
    #[case("")]
    #[case("main")]
    #[case("refs/heads/")]
    #[case("refs//heads")]
    #[case("refs/heads/.hidden")]
    #[case("refs/heads/a..b")]
    #[case("refs/heads/x.lock")]
    #[case("refs/heads/x.lock/y")]
    #[case("refs/heads/trailing.")]
    #[case("refs/heads/a@{1}")]
    #[case("refs/heads/with space")]
    #[case("refs/heads/star*")]
    #[case("refs/heads/tilde~1")]
    fn rejects_invalid_names(#[case] name: &str) {
        assert!(RefName::try_parse(name).is_err());
    }

    proptest! {
        #[test]
        fn simple_branch_names_are_valid(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+"
        ) {
            let name = format!("refs/heads/{prefix}/{suffix}");
            assert!(RefName::try_parse(&name).is_ok());
        }

        #[test]
        fn special_characters_are_rejected(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+",
            special_char in r"[\*:\?\[\\^~]"
        ) {
            let name = format!("refs/heads/{prefix}{special_char}{suffix}");
            assert!(RefName::try_parse(&name).is_err());
        }
    }
}
