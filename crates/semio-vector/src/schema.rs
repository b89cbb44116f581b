use anyhow::{anyhow, Result};
use arrow_schema::{Schema, Field, DataType};
use std::sync::Arc;

use semio_core::{EmbeddingSchema, VectorField};

/// Arrow list sizes are `i32`; larger dimensions cannot be stored.
pub fn list_size(dim: usize) -> Result<i32> {
	i32::try_from(dim).map_err(|_| anyhow!("vector dimension {dim} exceeds the arrow list size limit"))
}

pub fn vector_type(dim: usize) -> Result<DataType> {
	Ok(DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), list_size(dim)?))
}

/// One row per `EmbeddingRecord`; absent vector variants are null.
pub fn build_arrow_schema(schema: &EmbeddingSchema) -> Result<Arc<Schema>> {
	let mut fields = vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("application_id", DataType::Utf8, false),
		Field::new("kind", DataType::Utf8, false),
		Field::new("source", DataType::Utf8, true),
		Field::new("chunk_text", DataType::Utf8, false),
		Field::new("metadata", DataType::Utf8, false),
	];
	for field in VectorField::ALL {
		fields.push(Field::new(field.column(), vector_type(schema.dim(field))?, true));
	}
	Ok(Arc::new(Schema::new(fields)))
}
