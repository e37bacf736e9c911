//! Turning wire documents into the values a cursor yields.

use std::marker::PhantomData;

use bson::Document;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// Converts one raw batch into typed documents.
///
/// Invoked once per incoming batch, possibly on the background fetch task.
pub trait DocumentMaterializer<T>: Send + Sync + 'static {
    fn materialize(&self, batch: Vec<Document>) -> Result<Vec<T>>;
}

/// Yields the BSON documents untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct BsonMaterializer;

impl DocumentMaterializer<Document> for BsonMaterializer {
    fn materialize(&self, batch: Vec<Document>) -> Result<Vec<Document>> {
        Ok(batch)
    }
}

/// Deserializes every document into `T` through serde.
#[derive(Debug)]
pub struct SerdeMaterializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeMaterializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeMaterializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DocumentMaterializer<T> for SerdeMaterializer<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn materialize(&self, batch: Vec<Document>) -> Result<Vec<T>> {
        batch
            .into_iter()
            .map(|doc| bson::from_document(doc).map_err(Into::into))
            .collect()
    }
}
