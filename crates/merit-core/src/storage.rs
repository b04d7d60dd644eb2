use crate::error::MeritError;
use crate::types::{Artifact, ProgressionRecord, QuizRecord, Redemption};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::{BTreeMap, HashMap};

/// Persistence backend configuration.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Keep all student documents in process memory only.
    Memory,
    /// Mirror every document to PostgreSQL and hydrate on startup.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Whole-document kinds persisted per student. Each document is written
/// all-or-nothing; there is no partial-field protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocKind {
    Progression,
    Artifacts,
    Redemptions,
    Quizzes,
}

impl DocKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Progression => "progression",
            Self::Artifacts => "artifacts",
            Self::Redemptions => "redemptions",
            Self::Quizzes => "quizzes",
        }
    }

    fn parse(value: &str) -> Result<Self, MeritError> {
        match value {
            "progression" => Ok(Self::Progression),
            "artifacts" => Ok(Self::Artifacts),
            "redemptions" => Ok(Self::Redemptions),
            "quizzes" => Ok(Self::Quizzes),
            other => Err(MeritError::Storage(format!(
                "unknown document kind '{other}' in storage"
            ))),
        }
    }
}

/// One student's complete persisted state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudentState {
    pub progression: ProgressionRecord,
    pub artifacts: BTreeMap<String, Artifact>,
    pub redemptions: BTreeMap<String, Redemption>,
    pub quizzes: BTreeMap<String, QuizRecord>,
}

impl StudentState {
    pub fn new(progression: ProgressionRecord) -> Self {
        Self {
            progression,
            artifacts: BTreeMap::new(),
            redemptions: BTreeMap::new(),
            quizzes: BTreeMap::new(),
        }
    }
}

/// A prepared mutation: the next authoritative state for one student plus the
/// set of documents it touched, and optionally the shared stock table.
#[derive(Debug, Clone)]
pub struct StateMutation {
    pub student_id: String,
    pub state: StudentState,
    pub docs: Vec<DocKind>,
    pub stock: Option<BTreeMap<String, u32>>,
}

impl StateMutation {
    pub fn new(student_id: impl Into<String>, state: StudentState, docs: Vec<DocKind>) -> Self {
        Self {
            student_id: student_id.into(),
            state,
            docs,
            stock: None,
        }
    }

    pub fn with_stock(mut self, stock: BTreeMap<String, u32>) -> Self {
        self.stock = Some(stock);
        self
    }
}

#[derive(Debug, Clone)]
enum StoreBackend {
    Memory,
    Postgres(PgDocumentStore),
}

/// Memory-authoritative state store with an optional PostgreSQL mirror.
///
/// Invariant handling:
/// - Every document of one mutation is written in a single transaction, and
///   only after durability succeeds is the in-memory state swapped — partial
///   visibility is impossible.
/// - On bootstrap, persisted rows are hydrated and their content hashes
///   re-verified; a mismatch aborts startup.
#[derive(Debug)]
pub struct StateStore {
    students: HashMap<String, StudentState>,
    stock: BTreeMap<String, u32>,
    backend: StoreBackend,
}

impl StateStore {
    /// Bootstrap the store. `initial_stock` seeds stock counts for items that
    /// have never been persisted; persisted counts win over seeds.
    pub async fn bootstrap(
        config: StoreConfig,
        initial_stock: BTreeMap<String, u32>,
    ) -> Result<Self, MeritError> {
        match config {
            StoreConfig::Memory => Ok(Self {
                students: HashMap::new(),
                stock: initial_stock,
                backend: StoreBackend::Memory,
            }),
            StoreConfig::Postgres {
                database_url,
                max_connections,
            } => {
                let store = PgDocumentStore::connect(&database_url, max_connections).await?;
                store.ensure_schema().await?;
                let students = store.load_students().await?;
                let mut stock = initial_stock;
                for (item_id, remaining) in store.load_stock().await? {
                    stock.insert(item_id, remaining);
                }
                Ok(Self {
                    students,
                    stock,
                    backend: StoreBackend::Postgres(store),
                })
            }
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match self.backend {
            StoreBackend::Memory => "memory",
            StoreBackend::Postgres(_) => "postgres",
        }
    }

    pub fn contains(&self, student_id: &str) -> bool {
        self.students.contains_key(student_id)
    }

    pub fn student(&self, student_id: &str) -> Option<&StudentState> {
        self.students.get(student_id)
    }

    pub fn students(&self) -> impl Iterator<Item = (&String, &StudentState)> {
        self.students.iter()
    }

    pub fn stock(&self) -> &BTreeMap<String, u32> {
        &self.stock
    }

    /// Persist-then-commit a prepared mutation.
    pub async fn commit(&mut self, mutation: StateMutation) -> Result<(), MeritError> {
        if let StoreBackend::Postgres(store) = &self.backend {
            store.write_mutation(&mutation).await?;
        }

        if let Some(stock) = mutation.stock {
            self.stock = stock;
        }
        self.students.insert(mutation.student_id, mutation.state);
        Ok(())
    }

    /// Delete every document of one student (account wipe support).
    pub async fn remove_student(&mut self, student_id: &str) -> Result<(), MeritError> {
        if let StoreBackend::Postgres(store) = &self.backend {
            store.delete_student(student_id).await?;
        }
        self.students.remove(student_id);
        Ok(())
    }
}

/// Content hash stored beside each document row and re-verified on hydration.
pub fn document_hash(payload: &serde_json::Value) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

fn doc_payload(state: &StudentState, kind: DocKind) -> Result<serde_json::Value, MeritError> {
    let result = match kind {
        DocKind::Progression => serde_json::to_value(&state.progression),
        DocKind::Artifacts => serde_json::to_value(&state.artifacts),
        DocKind::Redemptions => serde_json::to_value(&state.redemptions),
        DocKind::Quizzes => serde_json::to_value(&state.quizzes),
    };
    result.map_err(|e| MeritError::Serialization(e.to_string()))
}

fn decode_doc<T: serde::de::DeserializeOwned>(
    student_id: &str,
    kind: DocKind,
    payload: serde_json::Value,
) -> Result<T, MeritError> {
    serde_json::from_value(payload).map_err(|e| {
        MeritError::Storage(format!(
            "decode of {} document for '{student_id}' failed: {e}",
            kind.as_str()
        ))
    })
}

#[derive(Debug, Clone)]
struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    async fn connect(database_url: &str, max_connections: u32) -> Result<Self, MeritError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| MeritError::Storage(format!("postgres connect failed: {e}")))?;

        Ok(Self { pool })
    }

    async fn ensure_schema(&self) -> Result<(), MeritError> {
        // Whole documents per (student, kind); the application controls
        // serialization and hashing.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS merit_student_documents (
                student_id TEXT NOT NULL,
                doc_kind TEXT NOT NULL,
                payload JSONB NOT NULL,
                payload_hash TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (student_id, doc_kind)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MeritError::Storage(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS merit_catalog_stock (
                item_id TEXT PRIMARY KEY,
                remaining BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MeritError::Storage(format!("postgres schema create failed: {e}")))?;

        Ok(())
    }

    async fn write_mutation(&self, mutation: &StateMutation) -> Result<(), MeritError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MeritError::Storage(format!("postgres begin failed: {e}")))?;
        let now = Utc::now();

        for kind in &mutation.docs {
            let payload = doc_payload(&mutation.state, *kind)?;
            let hash = document_hash(&payload);
            sqlx::query(
                r#"
                INSERT INTO merit_student_documents
                    (student_id, doc_kind, payload, payload_hash, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (student_id, doc_kind) DO UPDATE SET
                    payload = EXCLUDED.payload,
                    payload_hash = EXCLUDED.payload_hash,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(&mutation.student_id)
            .bind(kind.as_str())
            .bind(&payload)
            .bind(&hash)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| MeritError::Storage(format!("postgres document write failed: {e}")))?;
        }

        if let Some(stock) = &mutation.stock {
            for (item_id, remaining) in stock {
                sqlx::query(
                    r#"
                    INSERT INTO merit_catalog_stock (item_id, remaining, updated_at)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (item_id) DO UPDATE SET
                        remaining = EXCLUDED.remaining,
                        updated_at = EXCLUDED.updated_at
                    "#,
                )
                .bind(item_id)
                .bind(i64::from(*remaining))
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| MeritError::Storage(format!("postgres stock write failed: {e}")))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| MeritError::Storage(format!("postgres commit failed: {e}")))
    }

    async fn load_students(&self) -> Result<HashMap<String, StudentState>, MeritError> {
        let rows = sqlx::query(
            "SELECT student_id, doc_kind, payload, payload_hash FROM merit_student_documents",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MeritError::Storage(format!("postgres load failed: {e}")))?;

        let mut grouped: HashMap<String, HashMap<DocKind, serde_json::Value>> = HashMap::new();
        for row in rows {
            let student_id: String = row
                .try_get("student_id")
                .map_err(|e| MeritError::Storage(format!("postgres decode failed: {e}")))?;
            let kind_str: String = row
                .try_get("doc_kind")
                .map_err(|e| MeritError::Storage(format!("postgres decode failed: {e}")))?;
            let payload: serde_json::Value = row
                .try_get("payload")
                .map_err(|e| MeritError::Storage(format!("postgres decode failed: {e}")))?;
            let stored_hash: String = row
                .try_get("payload_hash")
                .map_err(|e| MeritError::Storage(format!("postgres decode failed: {e}")))?;

            let kind = DocKind::parse(&kind_str)?;
            if document_hash(&payload) != stored_hash {
                return Err(MeritError::Storage(format!(
                    "hash mismatch for {} document of '{student_id}'",
                    kind.as_str()
                )));
            }
            grouped.entry(student_id).or_default().insert(kind, payload);
        }

        let mut students = HashMap::with_capacity(grouped.len());
        for (student_id, mut docs) in grouped {
            let progression_payload = docs.remove(&DocKind::Progression).ok_or_else(|| {
                MeritError::Storage(format!(
                    "student '{student_id}' has documents but no progression record"
                ))
            })?;
            let progression: ProgressionRecord =
                decode_doc(&student_id, DocKind::Progression, progression_payload)?;

            let mut state = StudentState::new(progression);
            if let Some(payload) = docs.remove(&DocKind::Artifacts) {
                state.artifacts = decode_doc(&student_id, DocKind::Artifacts, payload)?;
            }
            if let Some(payload) = docs.remove(&DocKind::Redemptions) {
                state.redemptions = decode_doc(&student_id, DocKind::Redemptions, payload)?;
            }
            if let Some(payload) = docs.remove(&DocKind::Quizzes) {
                state.quizzes = decode_doc(&student_id, DocKind::Quizzes, payload)?;
            }
            students.insert(student_id, state);
        }

        Ok(students)
    }

    async fn load_stock(&self) -> Result<BTreeMap<String, u32>, MeritError> {
        let rows = sqlx::query("SELECT item_id, remaining FROM merit_catalog_stock")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MeritError::Storage(format!("postgres stock load failed: {e}")))?;

        let mut stock = BTreeMap::new();
        for row in rows {
            let item_id: String = row
                .try_get("item_id")
                .map_err(|e| MeritError::Storage(format!("postgres decode failed: {e}")))?;
            let remaining: i64 = row
                .try_get("remaining")
                .map_err(|e| MeritError::Storage(format!("postgres decode failed: {e}")))?;
            let remaining: u32 = remaining
                .try_into()
                .map_err(|_| MeritError::Storage("negative stock count in storage".to_string()))?;
            stock.insert(item_id, remaining);
        }
        Ok(stock)
    }

    async fn delete_student(&self, student_id: &str) -> Result<(), MeritError> {
        sqlx::query("DELETE FROM merit_student_documents WHERE student_id = $1")
            .bind(student_id)
            .execute(&self.pool)
            .await
            .map_err(|e| MeritError::Storage(format!("postgres delete failed: {e}")))?;
        Ok(())
    }
}
