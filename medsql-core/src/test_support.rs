//! In-process doubles for the database and the generation service.

use crate::adapters::DatabaseAdapter;
use crate::error::{GenerationError, MedSqlError, SchemaFetchError};
use crate::generator::TextGenerator;
use crate::models::{
    BindValue, ColumnInfo, ExecutionOutcome, QueryMode, ScalarValue, SchemaSnapshot,
};
use crate::{ConnectionConfig, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

type Responder = Box<dyn Fn(&str, &[BindValue], QueryMode) -> Result<ExecutionOutcome> + Send + Sync>;

/// `patients(id, first_name, last_name)`
pub(crate) fn patients_snapshot() -> SchemaSnapshot {
    SchemaSnapshot::from_catalog_rows(vec![
        (
            "patients".to_string(),
            ColumnInfo::new("id", "integer", false, Some("nextval('patients_id_seq'::regclass)".to_string())),
        ),
        ("patients".to_string(), ColumnInfo::new("first_name", "text", false, None)),
        ("patients".to_string(), ColumnInfo::new("last_name", "text", true, None)),
    ])
}

/// Rows returned for any SELECT by the default responder.
pub(crate) fn patient_rows() -> ExecutionOutcome {
    ExecutionOutcome::Rows {
        columns: vec!["id".to_string(), "first_name".to_string(), "last_name".to_string()],
        rows: vec![vec![
            ScalarValue::Int(1),
            ScalarValue::Text("Asha".to_string()),
            ScalarValue::Null,
        ]],
    }
}

/// Database double recording every call it receives.
pub(crate) struct MockAdapter {
    schema: Mutex<std::result::Result<SchemaSnapshot, String>>,
    responder: Responder,
    fetches: AtomicUsize,
    namespaces: Mutex<Vec<String>>,
    executed: Mutex<Vec<(String, Vec<BindValue>, QueryMode)>>,
}

impl MockAdapter {
    pub(crate) fn with_schema(snapshot: SchemaSnapshot) -> Self {
        Self::new(Ok(snapshot), Box::new(default_responder))
    }

    pub(crate) fn unreachable() -> Self {
        Self::new(
            Err("connection refused".to_string()),
            Box::new(|_, _, _| {
                Err(MedSqlError::connection_failed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )))
            }),
        )
    }

    pub(crate) fn new(
        schema: std::result::Result<SchemaSnapshot, String>,
        responder: Responder,
    ) -> Self {
        Self {
            schema: Mutex::new(schema),
            responder,
            fetches: AtomicUsize::new(0),
            namespaces: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_schema(&self, schema: std::result::Result<SchemaSnapshot, String>) {
        *self.schema.lock().unwrap() = schema;
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn namespaces(&self) -> Vec<String> {
        self.namespaces.lock().unwrap().clone()
    }

    pub(crate) fn executed(&self) -> Vec<(String, Vec<BindValue>, QueryMode)> {
        self.executed.lock().unwrap().clone()
    }
}

/// Rows for SELECTs, an acknowledgement for anything else.
fn default_responder(sql: &str, _: &[BindValue], _: QueryMode) -> Result<ExecutionOutcome> {
    if sql.trim_start().to_ascii_uppercase().starts_with("SELECT") {
        Ok(patient_rows())
    } else {
        Ok(ExecutionOutcome::Acknowledgement { rows_affected: 1 })
    }
}

#[async_trait]
impl DatabaseAdapter for MockAdapter {
    async fn test_connection(&self) -> Result<()> {
        match &*self.schema.lock().unwrap() {
            Ok(_) => Ok(()),
            Err(message) => Err(MedSqlError::connection_failed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                message.clone(),
            ))),
        }
    }

    async fn fetch_schema(
        &self,
        namespace: &str,
    ) -> std::result::Result<SchemaSnapshot, SchemaFetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.namespaces.lock().unwrap().push(namespace.to_string());
        self.schema
            .lock()
            .unwrap()
            .clone()
            .map_err(SchemaFetchError::message)
    }

    async fn execute_bound(
        &self,
        sql: &str,
        args: &[BindValue],
        mode: QueryMode,
    ) -> Result<ExecutionOutcome> {
        self.executed
            .lock()
            .unwrap()
            .push((sql.to_string(), args.to_vec(), mode));
        (self.responder)(sql, args, mode)
    }

    fn engine_name(&self) -> &'static str {
        "Mock"
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::default()
    }
}

/// Generation double answering from a queue of scripted responses.
pub(crate) struct ScriptedGenerator {
    responses: Mutex<VecDeque<std::result::Result<String, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub(crate) fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = std::result::Result<String, GenerationError>>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn answering(sql: &str) -> Self {
        Self::new([Ok(sql.to_string())])
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::malformed_output("no scripted response")))
    }

    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "test"
    }
}
