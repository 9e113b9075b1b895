use crate::artifacts::database::backend::Backend;
use crate::artifacts::database::raw_object::RawObject;
use crate::artifacts::objects::object_id::{ObjectId, ShortObjectId};
use crate::errors::Result;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Process-local object storage, used for scratch databases and tests
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<ObjectId, RawObject>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn read(&self, oid: &ObjectId) -> Result<Option<RawObject>> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(oid)
            .cloned())
    }

    fn write(&self, raw: &RawObject) -> Result<ObjectId> {
        let oid = raw.oid();
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(oid)
            .or_insert_with(|| raw.clone());

        Ok(oid)
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn find_by_prefix(&self, prefix: &ShortObjectId) -> Result<Vec<ObjectId>> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|oid| prefix.matches(oid))
            .copied()
            .collect())
    }
}
