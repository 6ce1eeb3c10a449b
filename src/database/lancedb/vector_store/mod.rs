
use super::VectorRecord;
use crate::{RagError, Result};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const TABLE_NAME: &str = "fragments";

/// Vector database store using LanceDB for similarity search.
///
/// The table schema is fixed at open time from the configured embedding
/// dimension; writes and searches with a different dimension are
/// rejected up front.
#[derive(Clone)]
pub struct VectorStore {
    connection: Connection,
    dimension: usize,
}

// Manual impl: `lancedb::Connection` does not implement `Debug`.
impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

/// A nearest-neighbor hit. `score` is cosine similarity, higher is
/// better.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub document_id: String,
    pub score: f32,
}

impl VectorStore {
    pub async fn open(db_path: &Path, dimension: usize) -> Result<Self> {
        debug!("Initializing LanceDB at path: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::Database(format!("Failed to create vector database directory: {e}"))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {e}")))?;

        let store = Self {
            connection,
            dimension,
        };
        store.initialize_table().await?;

        info!("Vector store initialized with dimension {}", dimension);
        Ok(store)
    }

    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {e}")))?;

        if table_names.contains(&TABLE_NAME.to_string()) {
            let existing = self.existing_vector_dimension().await?;
            if existing != self.dimension {
                return Err(RagError::Database(format!(
                    "Vector table holds {existing}-dimensional vectors but {} were configured",
                    self.dimension
                )));
            }
            debug!("Vector table already exists with matching dimension");
            return Ok(());
        }

        let schema = self.create_schema();
        self.connection
            .create_empty_table(TABLE_NAME, schema)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {e}")))?;

        debug!("Vector table created");
        Ok(())
    }

    async fn existing_vector_dimension(&self) -> Result<usize> {
        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open existing table: {e}")))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {e}")))?;

        for field in schema.fields() {
            if field.name() == "vector"
                && let DataType::FixedSizeList(_, size) = field.data_type()
            {
                return Ok(*size as usize);
            }
        }

        Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("document_id", DataType::Utf8, false),
        ]))
    }

    /// Store a batch of fragment vectors
    #[inline]
    pub async fn store(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            debug!("No vectors to store");
            return Ok(());
        }

        for record in &records {
            if record.vector.len() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: record.vector.len(),
                });
            }
        }

        debug!("Storing batch of {} vectors", records.len());

        let record_batch = self.create_record_batch(&records)?;

        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {e}")))?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert vectors: {e}")))?;

        debug!("Stored {} vectors", records.len());
        Ok(())
    }

    fn create_record_batch(&self, records: &[VectorRecord]) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut document_ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);

        for record in records {
            ids.push(record.id.as_str());
            document_ids.push(record.document_id.as_str());
            flat_values.extend_from_slice(&record.vector);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {e}")))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(document_ids)),
        ];

        RecordBatch::try_new(self.create_schema(), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {e}")))
    }

    /// Nearest-neighbor search by cosine similarity, optionally limited
    /// to a set of documents
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        document_filter: Option<&[String]>,
    ) -> Result<Vec<VectorHit>> {
        if query_vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        debug!("Searching for similar vectors with limit: {}", limit);

        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {e}")))?;

        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {e}")))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit);

        if let Some(document_ids) = document_filter {
            query = query.only_if(document_predicate(document_ids));
        }

        let mut stream = query
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {e}")))?;

        let mut hits = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {e}")))?
        {
            hits.extend(parse_search_batch(&batch)?);
        }

        debug!("Found {} vector hits", hits.len());
        Ok(hits)
    }

    /// Delete all vectors belonging to a document
    #[inline]
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        debug!("Deleting vectors for document: {}", document_id);

        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {e}")))?;

        let predicate = format!("document_id = '{}'", escape_literal(document_id));
        table
            .delete(&predicate)
            .await
            .map_err(|e| RagError::Database(format!("Failed to delete document vectors: {e}")))?;

        Ok(())
    }

    /// Total number of stored vectors
    #[inline]
    pub async fn count(&self) -> Result<u64> {
        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {e}")))?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {e}")))?;

        Ok(count as u64)
    }

    /// List all fragment ids that have vectors
    #[inline]
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {e}")))?;

        let mut stream = table
            .query()
            .select(Select::Columns(vec!["id".to_string()]))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list vector ids: {e}")))?;

        let mut ids = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read id stream: {e}")))?
        {
            let column = string_column(&batch, "id")?;
            for row in 0..batch.num_rows() {
                ids.push(column.value(row).to_string());
            }
        }

        Ok(ids)
    }

    /// Compact and reorganize table data. Readers opened before the
    /// operation keep seeing the previous table version.
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        debug!("Optimizing vector database");

        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {e}")))?;

        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| RagError::Database(format!("Failed to optimize table: {e}")))?;

        info!("Vector database optimization completed");
        Ok(())
    }

    /// Create an ANN index on the vector column
    #[inline]
    pub async fn create_vector_index(&self) -> Result<()> {
        debug!("Creating vector index");

        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {e}")))?;

        table
            .create_index(&["vector"], lancedb::index::Index::Auto)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create vector index: {e}")))?;

        info!("Vector index created successfully");
        Ok(())
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn document_predicate(document_ids: &[String]) -> String {
    let quoted = document_ids
        .iter()
        .map(|id| format!("'{}'", escape_literal(id)))
        .join(", ");
    format!("document_id IN ({quoted})")
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {name} column type")))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<VectorHit>> {
    let ids = string_column(batch, "id")?;
    let document_ids = string_column(batch, "document_id")?;

    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut hits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        // Cosine distance is 1 - cosine similarity
        hits.push(VectorHit {
            id: ids.value(row).to_string(),
            document_id: document_ids.value(row).to_string(),
            score: 1.0 - distance,
        });
    }

    Ok(hits)
}
