//! Deterministic prompt construction.
//!
//! The prompt is a pure function of the snapshot, the request and the
//! [`PromptConfig`], which keeps the pipeline testable without calling the
//! generation service.

use crate::models::{QueryMode, QueryRequest, SchemaSnapshot};
use std::fmt::Write;

/// Bumped whenever the generation rules below change.
pub const PROMPT_RULES_VERSION: &str = "2";

/// Table hints for the hospital management database.
pub const HOSPITAL_TABLE_HINTS: &str = "\
- Appointments: patient_app_appointment
- Patients: patient_app_patient_details
- Revenue and billing: patient_app_billreports
- Inpatient procedures: inpatient_app_inpatient, inpatient_app_procedure
- Inventory and medicines: inventory_app_druginventory
- Users and doctors: user_app_user";

/// Prompt settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptConfig {
    /// Maximum rows a generated SELECT may return
    pub row_cap: u32,
    /// Free-form hints appended after the schema
    pub domain_context: Option<String>,
    /// SQL dialect named in the prompt
    pub dialect_name: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            row_cap: 100,
            domain_context: None,
            dialect_name: "PostgreSQL".to_string(),
        }
    }
}

impl PromptConfig {
    /// Defaults plus the hospital table hints.
    pub fn hospital() -> Self {
        Self {
            domain_context: Some(HOSPITAL_TABLE_HINTS.to_string()),
            ..Self::default()
        }
    }
}

/// Composes generation requests.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    config: PromptConfig,
}

impl PromptBuilder {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PromptConfig {
        &self.config
    }

    /// Builds the prompt for one request.
    ///
    /// Identical inputs always produce byte-identical output.
    pub fn build(&self, snapshot: &SchemaSnapshot, request: &QueryRequest) -> String {
        let mut prompt = String::new();
        let _ = writeln!(
            prompt,
            "You are a {} SQL generator for a hospital management system.",
            self.config.dialect_name
        );
        let _ = writeln!(prompt, "Rules version: {}", PROMPT_RULES_VERSION);
        prompt.push('\n');

        prompt.push_str("Database schema:\n");
        render_schema(&mut prompt, snapshot);

        if let Some(context) = self.config.domain_context.as_deref()
            && !context.trim().is_empty()
        {
            prompt.push_str("\nTable usage:\n");
            prompt.push_str(context.trim_end());
            prompt.push('\n');
        }

        prompt.push_str("\nRules:\n");
        for (number, rule) in self.rules(request.mode).iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", number + 1, rule);
        }

        prompt.push_str("\nConvert this request into a single SQL statement:\n");
        let _ = writeln!(prompt, "\"{}\"", request.text);
        prompt
    }

    fn rules(&self, mode: QueryMode) -> Vec<String> {
        let mut rules = vec![
            "Return only the SQL statement, without markdown fences, comments or explanations."
                .to_string(),
            "Write exactly one statement.".to_string(),
            "Match text case-insensitively with substrings, for example name ILIKE '%value%'."
                .to_string(),
            "Use explicit JOIN ... ON syntax when combining tables, never comma joins."
                .to_string(),
            format!(
                "End every SELECT with LIMIT {} unless it returns a single aggregate row or the request asks for fewer rows.",
                self.config.row_cap
            ),
        ];
        match mode {
            QueryMode::ReadOnly => rules.push(
                "Generate only a SELECT statement. Never insert, update, delete or change the schema."
                    .to_string(),
            ),
            QueryMode::ReadWrite => {
                rules.push(
                    "You may generate SELECT, INSERT, UPDATE or DELETE. Never change the schema."
                        .to_string(),
                );
                rules.push(
                    "Every UPDATE and DELETE must have a WHERE clause that targets specific rows."
                        .to_string(),
                );
            }
        }
        rules
    }
}

fn render_schema(prompt: &mut String, snapshot: &SchemaSnapshot) {
    if snapshot.is_empty() {
        prompt.push_str("(schema unavailable: use the table names given in the request)\n");
        return;
    }

    for (index, table) in snapshot.tables().iter().enumerate() {
        if index > 0 {
            prompt.push('\n');
        }
        let _ = writeln!(prompt, "Table: {}", table.name);
        for column in &table.columns {
            let nullability = if column.nullable { "NULL" } else { "NOT NULL" };
            let _ = write!(
                prompt,
                "- {}: {} ({})",
                column.name, column.declared_type, nullability
            );
            if let Some(default) = &column.default {
                let _ = write!(prompt, " DEFAULT {}", default);
            }
            prompt.push('\n');
        }
    }
}
