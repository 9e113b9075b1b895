//! Pluggable object storage
//!
//! A backend stores type-tagged payloads keyed by their object id. The object
//! database composes several of them and tries them in priority order.

use crate::artifacts::database::raw_object::{ObjectHeader, RawObject};
use crate::artifacts::objects::object_id::{ObjectId, ShortObjectId};
use crate::errors::{Error, Result};

pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Short label used in diagnostics
    fn name(&self) -> &str;

    /// Read an object, `Ok(None)` when this backend does not have it
    fn read(&self, oid: &ObjectId) -> Result<Option<RawObject>>;

    /// Read type and size without necessarily inflating the payload
    fn read_header(&self, oid: &ObjectId) -> Result<Option<ObjectHeader>> {
        Ok(self.read(oid)?.map(|raw| raw.header()))
    }

    fn exists(&self, oid: &ObjectId) -> Result<bool> {
        Ok(self.read_header(oid)?.is_some())
    }

    /// Store an object under the id of its content
    fn write(&self, raw: &RawObject) -> Result<ObjectId> {
        Err(Error::invalid_argument(format!(
            "backend {} is read-only, cannot store {}",
            self.name(),
            raw.oid()
        )))
    }

    fn is_writable(&self) -> bool {
        false
    }

    /// All ids this backend holds that start with `prefix`
    fn find_by_prefix(&self, prefix: &ShortObjectId) -> Result<Vec<ObjectId>>;

    /// Pick up objects added behind the backend's back (e.g. new packfiles)
    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}
