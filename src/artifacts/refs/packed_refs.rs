//! The `packed-refs` file
//!
//! ```text
//! # pack-refs with: peeled fully-peeled sorted
//! <oid> refs/tags/v1.0
//! ^<peeled oid>
//! <oid> refs/heads/main
//! ```
//!
//! A `^` line records what the annotated tag on the previous line peels to.

use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use std::collections::BTreeMap;

const DEFAULT_HEADER: &str = "# pack-refs with: peeled fully-peeled sorted ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedRef {
    pub oid: ObjectId,
    pub peeled: Option<ObjectId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedRefs {
    header: Option<String>,
    refs: BTreeMap<String, PackedRef>,
}

impl PackedRefs {
    pub fn parse(content: &str) -> Result<Self> {
        let mut packed = PackedRefs::default();
        let mut last: Option<String> = None;

        for line in content.lines() {
            if line.is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix('#') {
                packed.header = Some(format!("#{header}"));
                continue;
            }

            if let Some(peeled) = line.strip_prefix('^') {
                let entry = last
                    .as_ref()
                    .and_then(|name| packed.refs.get_mut(name))
                    .ok_or_else(|| Error::invalid_argument("packed-refs peel line without a ref"))?;
                entry.peeled = Some(ObjectId::try_parse(peeled.trim())?);
                continue;
            }

            let (oid, name) = line
                .split_once(' ')
                .ok_or_else(|| Error::invalid_argument(format!("invalid packed-refs line {line:?}")))?;
            packed.refs.insert(
                name.to_string(),
                PackedRef {
                    oid: ObjectId::try_parse(oid)?,
                    peeled: None,
                },
            );
            last = Some(name.to_string());
        }

        Ok(packed)
    }

    pub fn serialize(&self) -> String {
        let mut content = String::new();
        content.push_str(self.header.as_deref().unwrap_or(DEFAULT_HEADER));
        content.push('\n');

        for (name, entry) in &self.refs {
            content.push_str(&format!("{} {name}\n", entry.oid));
            if let Some(peeled) = entry.peeled {
                content.push_str(&format!("^{peeled}\n"));
            }
        }

        content
    }

    pub fn get(&self, name: &str) -> Option<&PackedRef> {
        self.refs.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<PackedRef> {
        self.refs.remove(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: PackedRef) {
        self.refs.insert(name.into(), entry);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.refs.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}
