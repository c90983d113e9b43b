//! Constant datasets
//!
//! Every call builds new arrays, so two datasets returned by the same
//! function never share buffers.

use std::sync::Arc;

use arrow::array::{DictionaryArray, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Int32Type, Schema};
use arrow::record_batch::RecordBatch;

use crate::dataset::Dataset;
use crate::error::Result;

pub const INTS_TICKET: &[u8] = b"ints";
pub const DICTS_TICKET: &[u8] = b"dicts";
pub const MULTI_TICKET: &[u8] = b"multi";

/// Criteria under which the constant catalog advertises its single flight
pub const EXPECTED_CRITERIA: &[u8] = b"the expected criteria";

/// Descriptor path of the advertised flight
pub const ADVERTISED_PATH: &str = "/foo";

/// One column `some_ints`: [-10, -5, 0, 5, 10]
pub fn simple_ints_table() -> Result<Dataset> {
    let schema = Arc::new(Schema::new(vec![Field::new(
        "some_ints",
        DataType::Int64,
        true,
    )]));
    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(Int64Array::from(vec![-10, -5, 0, 5, 10]))],
    )?;
    Ok(Dataset::from_batch(batch))
}

/// One dictionary column `some_dicts` split over two batches:
/// ["baz", "foo", null] then ["quux", "baz"]
pub fn simple_dicts_table() -> Result<Dataset> {
    let schema = Arc::new(Schema::new(vec![Field::new(
        "some_dicts",
        DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
        true,
    )]));

    let chunks = [vec![Some(1), Some(0), None], vec![Some(2), Some(1)]];
    let mut batches = Vec::with_capacity(chunks.len());
    for keys in chunks {
        let values = Arc::new(StringArray::from(vec!["foo", "baz", "quux"]));
        let array = DictionaryArray::<Int32Type>::try_new(Int32Array::from(keys), values)?;
        batches.push(RecordBatch::try_new(schema.clone(), vec![Arc::new(array)])?);
    }

    Dataset::try_new(schema, batches)
}

/// Two columns: `a` (utf8) and `b` (int64), four rows
pub fn multiple_column_table() -> Result<Dataset> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("a", DataType::Utf8, true),
        Field::new("b", DataType::Int64, true),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec!["foo", "bar", "baz", "qux"])),
            Arc::new(Int64Array::from(vec![1, 2, 3, 4])),
        ],
    )?;
    Ok(Dataset::from_batch(batch))
}
