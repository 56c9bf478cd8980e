//! The Record trait implemented by every persisted type

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::filter::IndexValue;

/// A type that can be persisted in a [`crate::Store`]
///
/// Fields returned by [`Record::indexed_fields`] are queryable with
/// [`crate::Filter`]. A field that is absent from the map is treated as null,
/// so optional values should simply be left out when unset.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Unique identifier within the collection
    fn id(&self) -> &str;

    /// Last update timestamp (Unix milliseconds)
    fn updated_at(&self) -> i64;

    /// Name of the collection this record type lives in
    fn collection_name() -> &'static str;

    /// Field values to index for filtering
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}
