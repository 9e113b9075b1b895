//! Reference value types
//!
//! - `ref_name`: validated reference names (`git check-ref-format` rules)
//! - `reference`: direct and symbolic reference values
//! - `packed_refs`: the `packed-refs` file, including peeled `^` lines
//! - `reflog`: reflog lines
//! - `revision`: revision expressions (`main~2`, `HEAD^`, short ids)

pub mod packed_refs;
pub mod ref_name;
pub mod reference;
pub mod reflog;
pub mod revision;

/// Name of the HEAD reference
pub const HEAD: &str = "HEAD";

/// Prefix every non-pseudo reference lives under
pub const REFS_PREFIX: &str = "refs/";

/// Longest chain of symbolic references followed before giving up
pub const MAX_SYMREF_DEPTH: usize = 5;

pub const INVALID_REF_NAME_REGEX: &str =
    r"^\.|/\.|\.\.|^/|/$|//|\.lock$|\.lock/|\.$|@\{|[\x00-\x20\*:\?\[\\~\^\x7f]";
pub const PSEUDO_REF_REGEX: &str = r"^[A-Z][A-Z_]*$";
pub const PARENT_REGEX: &str = r"^(.+)\^(\d*)$";
pub const ANCESTOR_REGEX: &str = r"^(.+)~(\d*)$";
pub const REF_ALIASES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "@" => "HEAD",
};

/// Order in which a short name is expanded into a full reference name
pub const DWIM_RULES: [&str; 6] = [
    "{}",
    "refs/{}",
    "refs/tags/{}",
    "refs/heads/{}",
    "refs/remotes/{}",
    "refs/remotes/{}/HEAD",
];
