//! Owned in-memory table served over Flight
//!
//! A dataset is a schema plus an ordered list of record batches that all
//! carry that schema. Datasets are plain values: producing one twice gives
//! two datasets that share no array buffers.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct Dataset {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Dataset {
    /// Create a dataset, checking that every batch matches `schema`
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        for batch in &batches {
            if batch.schema().as_ref() != schema.as_ref() {
                return Err(CoreError::SchemaMismatch {
                    expected: schema.to_string(),
                    found: batch.schema().to_string(),
                });
            }
        }
        Ok(Self { schema, batches })
    }

    /// Create a dataset from a single batch
    pub fn from_batch(batch: RecordBatch) -> Self {
        Self {
            schema: batch.schema(),
            batches: vec![batch],
        }
    }

    /// Create a dataset with no rows
    pub fn empty(schema: SchemaRef) -> Self {
        Self {
            schema,
            batches: Vec::new(),
        }
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    /// Total row count across all batches
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}
