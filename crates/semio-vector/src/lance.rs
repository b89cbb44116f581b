//! LanceDB-backed `VectorStore`.
//!
//! The store owns a tokio runtime and blocks on it, so it must not be called
//! from inside another async runtime. Filters are pushed down as SQL
//! predicates and plain scans come back in insertion order.
use anyhow::{bail, Result};
use arrow_array::cast::AsArray;
use arrow_array::{Array, FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::DataType;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use semio_core::config::StoreSettings;
use semio_core::{DocumentIdentity, DocumentKind, EmbeddingRecord, EmbeddingSchema, Meta, StoreError, StoreFilter, StoreResult, VectorField, VectorStore, Vectors};

use crate::schema::{build_arrow_schema, list_size};

const IDENTITY_COLUMNS: [&str; 3] = ["application_id", "source", "kind"];

pub struct LanceVectorStore {
	rt: Runtime,
	db: Connection,
	table_name: String,
	schema: EmbeddingSchema,
}

impl LanceVectorStore {
	/// Connect to `uri` and create `table_name` if missing. An existing table
	/// whose vector columns disagree with `schema` is rejected.
	pub fn open(uri: &str, table_name: &str, schema: EmbeddingSchema) -> Result<Self> {
		let rt = Runtime::new()?;
		let db = rt.block_on(async { connect(uri).execute().await })?;
		rt.block_on(prepare_table(&db, table_name, &schema))?;
		Ok(Self { rt, db, table_name: table_name.to_string(), schema })
	}

	pub fn from_settings(store: &StoreSettings, schema: EmbeddingSchema, base: &Path) -> Result<Self> {
		let location = store.location(base)?;
		tracing::info!(location = %location, table = %store.table, "opening lance store");
		Self::open(&location, &store.table, schema)
	}

	/// Validate and append records; returns how many were written.
	pub fn insert(&self, records: &[EmbeddingRecord]) -> Result<usize> {
		if records.is_empty() { return Ok(0); }
		for r in records { r.validate(&self.schema)?; }
		let batch = self.records_to_batch(records)?;
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		self.rt.block_on(async {
			self.db.open_table(&self.table_name).execute().await?.add(reader).execute().await?;
			anyhow::Ok(())
		})?;
		tracing::debug!(table = %self.table_name, rows = records.len(), "appended records");
		Ok(records.len())
	}

	fn records_to_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch> {
		let mut ids = Vec::new(); let mut app_ids = Vec::new(); let mut kinds = Vec::new(); let mut sources = Vec::new(); let mut texts = Vec::new(); let mut metas = Vec::new();
		for r in records {
			ids.push(r.id.clone()); app_ids.push(r.application_id.clone()); kinds.push(r.kind.as_str().to_string());
			sources.push(r.source.clone()); texts.push(r.chunk_text.clone()); metas.push(serde_json::to_string(&r.metadata)?);
		}
		let mut columns: Vec<Arc<dyn Array>> = vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(StringArray::from(app_ids)),
			Arc::new(StringArray::from(kinds)),
			Arc::new(StringArray::from(sources)),
			Arc::new(StringArray::from(texts)),
			Arc::new(StringArray::from(metas)),
		];
		for field in VectorField::ALL {
			let values: Vec<Option<Vec<Option<f32>>>> = records.iter().map(|r| r.vectors.get(field).map(|v| v.iter().map(|&x| Some(x)).collect())).collect();
			let size = list_size(self.schema.dim(field))?;
			columns.push(Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(values.into_iter(), size)));
		}
		Ok(RecordBatch::try_new(build_arrow_schema(&self.schema)?, columns)?)
	}
}

/// Run `fut` to completion on `rt`, giving up with `StoreError::Timeout` once
/// `timeout` has elapsed.
pub(crate) fn bounded<T>(rt: &Runtime, timeout: Duration, fut: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
	rt.block_on(async {
		match tokio::time::timeout(timeout, fut).await {
			Ok(result) => result,
			Err(_) => Err(StoreError::Timeout(timeout)),
		}
	})
}

async fn prepare_table(db: &Connection, name: &str, schema: &EmbeddingSchema) -> Result<()> {
	let names = db.table_names().execute().await?;
	if !names.iter().any(|n| n == name) {
		let empty = RecordBatchIterator::new(vec![].into_iter(), build_arrow_schema(schema)?);
		db.create_table(name, Box::new(empty)).execute().await?;
		tracing::info!(table = %name, "created table");
		return Ok(());
	}
	let existing = db.open_table(name).execute().await?.schema().await?;
	for field in VectorField::ALL {
		let found = match existing.field_with_name(field.column()).map(|f| f.data_type()) {
			Ok(DataType::FixedSizeList(_, size)) => *size,
			_ => bail!("table '{}' has no {} list column", name, field.column()),
		};
		let expected = list_size(schema.dim(field))?;
		if found != expected {
			bail!("table '{}' stores {} with {} dimensions, configured {}", name, field.column(), found, expected);
		}
	}
	Ok(())
}

impl VectorStore for LanceVectorStore {
	fn schema(&self) -> EmbeddingSchema { self.schema }

	fn query(&self, filter: &StoreFilter, timeout: Duration) -> StoreResult<Vec<EmbeddingRecord>> {
		bounded(&self.rt, timeout, async {
			let t = self.db.open_table(&self.table_name).execute().await.map_err(unreachable_store)?;
			let mut q = t.query();
			if let Some(expr) = predicate(filter) { q = q.only_if(expr); }
			if let Some(limit) = filter.limit { q = q.limit(limit); }
			let mut stream = q.execute().await.map_err(backend)?;
			let mut out = Vec::new();
			while let Some(batch) = stream.try_next().await.map_err(backend)? { out.extend(decode_batch(&batch, &self.schema)?); }
			Ok(out)
		})
	}

	fn count(&self, filter: &StoreFilter, timeout: Duration) -> StoreResult<usize> {
		bounded(&self.rt, timeout, async {
			let t = self.db.open_table(&self.table_name).execute().await.map_err(unreachable_store)?;
			t.count_rows(predicate(filter)).await.map_err(backend)
		})
	}

	fn identities(&self, filter: &StoreFilter, timeout: Duration) -> StoreResult<Vec<DocumentIdentity>> {
		bounded(&self.rt, timeout, async {
			let t = self.db.open_table(&self.table_name).execute().await.map_err(unreachable_store)?;
			let mut q = t.query().select(Select::columns(&IDENTITY_COLUMNS));
			if let Some(expr) = predicate(filter) { q = q.only_if(expr); }
			if let Some(limit) = filter.limit { q = q.limit(limit); }
			let mut stream = q.execute().await.map_err(backend)?;
			let mut out = Vec::new();
			while let Some(batch) = stream.try_next().await.map_err(backend)? {
				let app_ids = string_col(&batch, "application_id")?;
				let sources = string_col(&batch, "source")?;
				let kinds = string_col(&batch, "kind")?;
				for i in 0..batch.num_rows() {
					let kind = kinds.value(i).parse::<DocumentKind>().map_err(|e| StoreError::Corrupt {
						id: format!("row {i} of {}", app_ids.value(i)),
						reason: e.to_string(),
					})?;
					let source = if sources.is_null(i) { None } else { Some(sources.value(i)) };
					out.push(DocumentIdentity::new(app_ids.value(i), source, kind));
				}
			}
			Ok(out)
		})
	}
}

fn unreachable_store(e: lancedb::Error) -> StoreError { StoreError::Unreachable(e.to_string()) }

fn backend(e: lancedb::Error) -> StoreError { StoreError::Backend(e.to_string()) }

fn quote_list<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
	values.into_iter().map(|v| format!("'{}'", v.replace('\'', "''"))).collect::<Vec<_>>().join(", ")
}

/// SQL predicate for a filter; `None` selects every row.
pub(crate) fn predicate(filter: &StoreFilter) -> Option<String> {
	let mut owner = Vec::new();
	if !filter.application_ids.is_empty() { owner.push(format!("application_id IN ({})", quote_list(&filter.application_ids))); }
	if !filter.sources.is_empty() {
		let mut by_source = format!("source IN ({})", quote_list(&filter.sources));
		if !filter.excluded_ids.is_empty() {
			by_source = format!("({by_source} AND application_id NOT IN ({}))", quote_list(&filter.excluded_ids));
		}
		owner.push(by_source);
	}
	let mut clauses = Vec::new();
	if !owner.is_empty() { clauses.push(format!("({})", owner.join(" OR "))); }
	if let Some(kind) = filter.kind { clauses.push(format!("kind = '{}'", kind.as_str())); }
	if clauses.is_empty() { None } else { Some(clauses.join(" AND ")) }
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> StoreResult<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| StoreError::Backend(format!("{name} column missing")))
}

/// Decode one scanned batch. Rows that break `schema` are reported as corrupt
/// rather than handed to scoring.
fn decode_batch(batch: &RecordBatch, schema: &EmbeddingSchema) -> StoreResult<Vec<EmbeddingRecord>> {
	let ids = string_col(batch, "id")?;
	let app_ids = string_col(batch, "application_id")?;
	let kinds = string_col(batch, "kind")?;
	let sources = string_col(batch, "source")?;
	let texts = string_col(batch, "chunk_text")?;
	let metas = string_col(batch, "metadata")?;
	let mut vector_cols = Vec::new();
	for field in VectorField::ALL {
		let col = batch
			.column_by_name(field.column())
			.and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
			.ok_or_else(|| StoreError::Backend(format!("{} column missing", field.column())))?;
		vector_cols.push((field, col));
	}
	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let id = ids.value(i).to_string();
		let corrupt = |reason: String| StoreError::Corrupt { id: id.clone(), reason };
		let kind = kinds.value(i).parse::<DocumentKind>().map_err(|e| corrupt(e.to_string()))?;
		let metadata: Meta = serde_json::from_str(metas.value(i)).map_err(|e| corrupt(e.to_string()))?;
		let mut vectors = Vectors::default();
		for (field, col) in &vector_cols {
			if col.is_null(i) { continue; }
			let list = col.value(i);
			vectors.set(*field, list.as_primitive::<arrow_array::types::Float32Type>().values().iter().copied().collect());
		}
		let record = EmbeddingRecord {
			id: id.clone(),
			application_id: app_ids.value(i).to_string(),
			kind,
			source: if sources.is_null(i) { None } else { Some(sources.value(i).to_string()) },
			chunk_text: texts.value(i).to_string(),
			metadata,
			vectors,
		};
		record.check_stored(schema)?;
		out.push(record);
	}
	Ok(out)
}
