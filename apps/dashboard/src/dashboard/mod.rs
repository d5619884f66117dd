//! Dashboard controller. Owns the per-process view state:
//! the loaded sheet, the selected record, the current RAG session, the API key
//! and the opportunity state store.
//!
//! Network calls happen outside the controller. Callers take a ticket before
//! awaiting and hand it back with the result; a ticket that is no longer
//! current means the user moved on and the result is discarded.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Features;
use crate::documents::{merge_documents, BatchReport, DocumentSummary, FileFailure, UploadedDocument};
use crate::errors::AppError;
use crate::llm_client::LlmError;
use crate::markdown::render_markdown;
use crate::opportunities::{ChatMessage, Counts, Flags, OpportunityStore, StorageError};
use crate::rag::context::{assemble_context, assemble_retrieved_context};
use crate::rag::prompts::build_prompt;
use crate::rag::retrieval::{self, LOW_RELEVANCE_NOTICE};
use crate::sheets::Sheet;

pub mod handlers;
pub mod listing;

use listing::{RecordDetail, RecordQuery, RecordSummary};

/// Correlates a sheet load with the controller state it was started against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

/// Correlates a question with the session and request it was started against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionTicket {
    session: u64,
    request: u64,
}

/// Correlates an upload with the session it was started against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket {
    session: u64,
}

/// Everything needed to call the model without holding the controller lock.
#[derive(Debug)]
pub struct PendingQuestion {
    pub ticket: QuestionTicket,
    pub question: String,
    pub prompt: String,
    pub api_key: String,
    /// Set when a sheet-wide question found no sufficiently relevant record.
    pub notice: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoadSummary {
    pub records: usize,
    pub columns: usize,
    pub new_records: usize,
    pub pruned_entries: usize,
    pub selection_kept: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub selected: Option<RecordDetail>,
    pub documents: Vec<DocumentSummary>,
    pub transcript: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct UploadOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FileFailure>,
    pub documents: Vec<DocumentSummary>,
    /// Set when the session could not be saved; the documents are still usable.
    pub storage_warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatTurn {
    pub question: ChatMessage,
    pub answer: ChatMessage,
    pub storage_warning: Option<String>,
    pub notice: Option<String>,
}

pub struct Dashboard {
    sheet: Option<Sheet>,
    selected: Option<String>,
    documents: Vec<UploadedDocument>,
    transcript: Vec<ChatMessage>,
    api_key: Option<String>,
    store: OpportunityStore,
    features: Features,
    session_generation: u64,
    request_seq: u64,
    load_seq: u64,
}

impl Dashboard {
    pub fn new(store: OpportunityStore, features: Features, api_key: Option<String>) -> Self {
        Self {
            sheet: None,
            selected: None,
            documents: Vec::new(),
            transcript: Vec::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            store,
            features,
            session_generation: 0,
            request_seq: 0,
            load_seq: 0,
        }
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn set_api_key(&mut self, api_key: Option<String>) {
        self.api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        info!("Gemini API key {}", if self.api_key.is_some() { "set" } else { "cleared" });
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn counts(&self) -> Counts {
        self.store.counts()
    }

    pub fn sheet(&self) -> Option<&Sheet> {
        self.sheet.as_ref()
    }

    pub fn flags(&self, id: &str) -> Flags {
        self.store.flags(id)
    }

    // ── Sheet loading ────────────────────────────────────────────────────

    pub fn begin_load(&mut self) -> LoadTicket {
        self.load_seq += 1;
        LoadTicket(self.load_seq)
    }

    /// Installs a freshly fetched sheet, registering new ids as unread and
    /// pruning state for ids that disappeared.
    pub fn finish_load(&mut self, ticket: LoadTicket, sheet: Sheet) -> Result<LoadSummary, AppError> {
        if ticket.0 != self.load_seq {
            warn!("Discarding stale sheet load #{}", ticket.0);
            return Err(AppError::Superseded);
        }

        let new_records = self.store.register(sheet.ids())?;
        let current: HashSet<&str> = sheet.ids().collect();
        let pruned_entries = self.store.reconcile(&current)?;

        let selection_kept = self.selected.as_deref().map(|id| current.contains(id));
        if selection_kept == Some(false) {
            self.reset_session();
        }

        let summary = LoadSummary {
            records: sheet.records.len(),
            columns: sheet.headers.len(),
            new_records,
            pruned_entries,
            selection_kept: selection_kept.unwrap_or(false),
        };
        self.sheet = Some(sheet);
        info!(
            "Sheet installed: {} records ({} new, {} stale entries pruned)",
            summary.records, summary.new_records, summary.pruned_entries
        );
        Ok(summary)
    }

    // ── Records ──────────────────────────────────────────────────────────

    pub fn list(&self, query: &RecordQuery) -> Vec<RecordSummary> {
        self.sheet
            .as_ref()
            .map(|sheet| listing::list(sheet, &self.store, query))
            .unwrap_or_default()
    }

    pub fn detail(&self, id: &str) -> Result<RecordDetail, AppError> {
        let record = self
            .sheet
            .as_ref()
            .and_then(|s| s.find(id))
            .ok_or_else(|| AppError::NotFound(format!("Record {id} not found")))?;
        Ok(listing::detail(record, self.store.flags(id)))
    }

    fn require_record(&self, id: &str) -> Result<(), AppError> {
        self.detail(id).map(|_| ())
    }

    /// Selects a record: marks it read, starts a fresh session for it, and
    /// restores its saved transcript and documents when sessions are persisted.
    pub fn select(&mut self, id: &str) -> Result<SessionView, AppError> {
        self.require_record(id)?;
        self.reset_session();
        self.selected = Some(id.to_string());
        self.store.select(id)?;

        if self.features.session_persistence {
            if let Some(state) = self.store.state(id) {
                self.transcript = state.chat_history.clone().unwrap_or_default();
                self.documents = state.documents.clone().unwrap_or_default();
            }
            // Fall back to the mirrored favorite chat.
            if self.transcript.is_empty() {
                if let Some(chat) = self.store.favorite_chat(id) {
                    self.transcript = chat.to_vec();
                }
            }
        }
        debug!(
            "Session for {id}: {} messages, {} documents restored",
            self.transcript.len(),
            self.documents.len()
        );
        Ok(self.session_view())
    }

    pub fn toggle_favorite(&mut self, id: &str) -> Result<Flags, AppError> {
        self.require_record(id)?;
        self.store.toggle_favorite(id)?;
        Ok(self.store.flags(id))
    }

    pub fn toggle_reject(&mut self, id: &str) -> Result<Flags, AppError> {
        self.require_record(id)?;
        self.store.toggle_reject(id)?;
        Ok(self.store.flags(id))
    }

    // ── Session ──────────────────────────────────────────────────────────

    fn reset_session(&mut self) {
        self.selected = None;
        self.documents.clear();
        self.transcript.clear();
        self.session_generation += 1;
    }

    pub fn session_view(&self) -> SessionView {
        SessionView {
            selected: self.selected.as_deref().and_then(|id| self.detail(id).ok()),
            documents: self.documents.iter().map(DocumentSummary::from).collect(),
            transcript: self.transcript.clone(),
        }
    }

    pub fn ensure_documents_enabled(&self) -> Result<(), AppError> {
        if self.features.documents {
            Ok(())
        } else {
            Err(AppError::FeatureDisabled("document upload"))
        }
    }

    /// Takes a ticket for an upload; extraction runs without the lock held.
    pub fn begin_upload(&self) -> Result<SessionTicket, AppError> {
        self.ensure_documents_enabled()?;
        Ok(SessionTicket {
            session: self.session_generation,
        })
    }

    /// Adds extracted documents to the session the ticket was taken for.
    /// Extraction failures are reported alongside; a storage failure is
    /// reported as a warning, not an error.
    pub fn add_documents(
        &mut self,
        ticket: SessionTicket,
        report: BatchReport,
    ) -> Result<UploadOutcome, AppError> {
        self.ensure_documents_enabled()?;
        if ticket.session != self.session_generation {
            warn!(
                "Discarding {} documents uploaded to a previous session",
                report.succeeded()
            );
            return Err(AppError::Superseded);
        }
        let succeeded = report.succeeded();
        let failed = report.failed();
        merge_documents(&mut self.documents, report.documents);
        let storage_warning = self.save_session();
        Ok(UploadOutcome {
            succeeded,
            failed,
            failures: report.failures,
            documents: self.documents.iter().map(DocumentSummary::from).collect(),
            storage_warning,
        })
    }

    pub fn clear_documents(&mut self) -> Option<String> {
        self.documents.clear();
        self.save_session()
    }

    fn save_session(&mut self) -> Option<String> {
        let id = self.selected.clone()?;
        if !self.features.session_persistence {
            return None;
        }
        match self.store.save_session(&id, &self.transcript, &self.documents) {
            Ok(()) => None,
            Err(e @ StorageError::QuotaExceeded { .. }) => Some(e.to_string()),
            Err(e) => {
                warn!("Session for {id} not saved: {e}");
                Some(e.to_string())
            }
        }
    }

    /// Validates and prepares a question. Fails before any network call when
    /// chat is disabled, the question is blank, or no API key is set.
    pub fn begin_question(&mut self, question: &str) -> Result<PendingQuestion, AppError> {
        if !self.features.chat {
            return Err(AppError::FeatureDisabled("chat"));
        }
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("question cannot be empty".to_string()));
        }
        let api_key = self.api_key.clone().ok_or(LlmError::MissingApiKey)?;

        let record = self
            .selected
            .as_deref()
            .and_then(|id| self.sheet.as_ref().and_then(|s| s.find(id)));
        let mut notice = None;
        let context = match (record, self.sheet.as_ref()) {
            (None, Some(sheet)) if self.selected.is_none() => {
                let found = retrieval::retrieve(sheet, question, retrieval::TOP_N);
                debug!(
                    "Retrieved {} records (best score {:.2})",
                    found.records.len(),
                    found.best_score
                );
                if !found.is_relevant() {
                    notice = Some(LOW_RELEVANCE_NOTICE.to_string());
                }
                assemble_retrieved_context(&found.records, &self.documents)
            }
            _ => assemble_context(record, &self.documents),
        };
        debug!("Context assembled: {} chars", context.len());

        self.request_seq += 1;
        Ok(PendingQuestion {
            ticket: QuestionTicket {
                session: self.session_generation,
                request: self.request_seq,
            },
            question: question.to_string(),
            prompt: build_prompt(&context, question),
            api_key,
            notice,
        })
    }

    /// Records an answer if its ticket is still current.
    pub fn finish_question(
        &mut self,
        ticket: QuestionTicket,
        question: String,
        answer: String,
    ) -> Result<ChatTurn, AppError> {
        if ticket.session != self.session_generation || ticket.request != self.request_seq {
            warn!("Discarding answer for superseded question #{}", ticket.request);
            return Err(AppError::Superseded);
        }

        let html = render_markdown(&answer);
        let question = ChatMessage::user(question);
        let answer = ChatMessage::assistant(answer, html);
        self.transcript.push(question.clone());
        self.transcript.push(answer.clone());
        let storage_warning = self.save_session();

        Ok(ChatTurn {
            question,
            answer,
            storage_warning,
            notice: None,
        })
    }
}
