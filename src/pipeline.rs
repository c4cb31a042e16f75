//! End-to-end answer pipeline
//!
//! Sequences retrieval, fusion, reranking, context assembly, and
//! generation as a state machine with a global wall-clock deadline.
//! Degradations (single-source retrieval, rerank fallback, extractive
//! fallback) are recorded in the request trace instead of failing the
//! request; terminal failures carry the originating stage, the trace
//! id, and the timings gathered so far.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

use crate::config::RagConfig;
use crate::confidence::confidence_score;
use crate::context::ContextAssembler;
use crate::errors::{ErrorCode, RagError};
use crate::fusion::FusionEngine;
use crate::generation::{
    ExtractiveGenerator, GeneratedAnswer, Generator, OllamaGenerator, INSUFFICIENT_DATA_ANSWER,
};
use crate::rerank::{CrossEncoderClient, RelevanceScorer, Reranker};
use crate::retrieval::{LexicalIndexClient, SearchBackend, VectorIndexClient};
use crate::trace::{RequestTrace, StageTimer};
use crate::types::{
    AnswerResult, Citation, Context, Passage, RetrievalResult, Stage, StageOutcome,
};

/// Pipeline execution states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    Retrieving,
    Fusing,
    Reranking,
    Assembling,
    Generating,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Valid forward transitions; any non-terminal state may fail.
    pub fn can_advance_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Received, Retrieving)
                | (Retrieving, Fusing)
                | (Fusing, Reranking)
                | (Fusing, Done)
                | (Reranking, Assembling)
                | (Assembling, Generating)
                | (Assembling, Done)
                | (Generating, Done)
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Received => "received",
            PipelineState::Retrieving => "retrieving",
            PipelineState::Fusing => "fusing",
            PipelineState::Reranking => "reranking",
            PipelineState::Assembling => "assembling",
            PipelineState::Generating => "generating",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Shared view of the in-flight state, readable after the stage future
/// is cancelled at the global deadline.
#[derive(Clone)]
struct StateTracker(Arc<Mutex<PipelineState>>);

impl StateTracker {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(PipelineState::Received)))
    }

    fn advance(&self, next: PipelineState) {
        let mut state = self.0.lock().unwrap();
        debug_assert!(state.can_advance_to(next), "{} -> {}", state, next);
        *state = next;
    }

    fn current(&self) -> PipelineState {
        *self.0.lock().unwrap()
    }
}

/// Terminal pipeline failure with correlation data.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineFailure {
    pub code: ErrorCode,
    pub stage: PipelineState,
    pub error: String,
    pub debug: crate::types::DebugInfo,
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}: {} (trace {})",
            self.code, self.stage, self.error, self.debug.trace_id
        )
    }
}

impl std::error::Error for PipelineFailure {}

/// Question-answering orchestrator.
///
/// Backend clients are shared, read-mostly resources; all per-request
/// data flows are request-scoped values.
pub struct AnswerPipeline {
    lexical: Arc<dyn SearchBackend>,
    vector: Arc<dyn SearchBackend>,
    fusion: FusionEngine,
    reranker: Reranker,
    assembler: ContextAssembler,
    generator: Arc<dyn Generator>,
    fallback: ExtractiveGenerator,
    config: RagConfig,
}

impl AnswerPipeline {
    /// Assemble a pipeline from explicit collaborators (used by tests
    /// and embedders that bring their own backends).
    pub fn new(
        lexical: Arc<dyn SearchBackend>,
        vector: Arc<dyn SearchBackend>,
        scorer: Arc<dyn RelevanceScorer>,
        generator: Arc<dyn Generator>,
        config: RagConfig,
    ) -> Self {
        Self {
            lexical,
            vector,
            fusion: FusionEngine::with_config(config.fusion.clone()),
            reranker: Reranker::new(scorer, config.rerank.clone()),
            assembler: ContextAssembler::with_config(config.context.clone()),
            generator,
            fallback: ExtractiveGenerator::new(config.generation.extractive_sentences),
            config,
        }
    }

    /// Assemble a pipeline against the configured live backends.
    pub fn from_config(config: RagConfig) -> crate::errors::Result<Self> {
        let retrieval = &config.retrieval;
        let lexical = Arc::new(LexicalIndexClient::new(
            &retrieval.lexical_url,
            &retrieval.lexical_index,
            retrieval.search_timeout_ms,
        )?);
        let vector = Arc::new(VectorIndexClient::new(
            &retrieval.vector_url,
            &retrieval.vector_collection,
            &retrieval.embedding_url,
            &retrieval.embedding_model,
            retrieval.search_timeout_ms,
        )?);
        let scorer = Arc::new(CrossEncoderClient::new(
            &config.rerank.endpoint,
            config.rerank.timeout_ms,
        )?);
        let generator = Arc::new(OllamaGenerator::new(config.generation.clone())?);

        Ok(Self::new(lexical, vector, scorer, generator, config))
    }

    pub fn backends(&self) -> (&dyn SearchBackend, &dyn SearchBackend) {
        (self.lexical.as_ref(), self.vector.as_ref())
    }

    /// Answer a question. The single operation exposed by the core.
    ///
    /// NO_RESULTS is a success-shaped result carrying the fixed
    /// insufficient-data answer, never an `Err`.
    pub async fn answer(&self, question: &str) -> Result<AnswerResult, PipelineFailure> {
        let trace = RequestTrace::new();
        let state = StateTracker::new();

        // Validation fails fast, before any backend call.
        let question = match self.validate(question) {
            Ok(q) => q,
            Err(err) => return Err(self.failure(err, &state, &trace)),
        };

        state.advance(PipelineState::Retrieving);

        let deadline = Duration::from_millis(self.config.pipeline.deadline_ms);
        match timeout(deadline, self.run(&question, &trace, &state)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(self.failure(err, &state, &trace)),
            // Stage future dropped: outstanding backend calls are
            // cancelled, partial results discarded.
            Err(_) => Err(self.failure(
                RagError::Timeout {
                    duration_ms: self.config.pipeline.deadline_ms,
                },
                &state,
                &trace,
            )),
        }
    }

    fn validate(&self, question: &str) -> Result<String, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::MissingQuestion);
        }

        let chars = question.chars().count();
        let limits = &self.config.pipeline;
        if chars < limits.min_question_chars {
            return Err(RagError::InvalidQuestion(format!(
                "question is too short (minimum {} characters)",
                limits.min_question_chars
            )));
        }
        if chars > limits.max_question_chars {
            return Err(RagError::InvalidQuestion(format!(
                "question is too long (maximum {} characters)",
                limits.max_question_chars
            )));
        }

        Ok(question.to_string())
    }

    fn failure(
        &self,
        err: RagError,
        state: &StateTracker,
        trace: &RequestTrace,
    ) -> PipelineFailure {
        let stage = state.current();
        state.advance(PipelineState::Failed);
        PipelineFailure {
            code: err.code(),
            stage,
            error: err.to_string(),
            debug: trace.debug_info(0.0),
        }
    }

    async fn run(
        &self,
        question: &str,
        trace: &RequestTrace,
        state: &StateTracker,
    ) -> Result<AnswerResult, RagError> {
        // Stage 1: both retrieval sources, concurrently, each under its
        // own timeout. Wait for both; tolerate either failing.
        let (lexical, vector) = self.retrieve(question, trace).await?;

        // Stage 2: reciprocal rank fusion.
        state.advance(PipelineState::Fusing);
        let fused = self.fusion.fuse(&lexical, &vector);
        if fused.is_empty() {
            state.advance(PipelineState::Done);
            return Ok(self.no_results(trace));
        }

        // Stage 3: reranking, degrading to fused order on failure.
        state.advance(PipelineState::Reranking);
        let rerank_timer = StageTimer::start();
        let outcome = match self.reranker.rerank(question, &fused).await {
            Ok(reranked) => StageOutcome::Ok(reranked),
            Err(err) => StageOutcome::Degraded(
                self.fused_order_fallback(&fused),
                format!("reranker failed, using fused order: {}", err),
            ),
        };
        trace.record_rerank(rerank_timer.elapsed_ms());
        let (reranked, note) = outcome
            .into_parts()
            .map_err(|code| RagError::Generic(format!("rerank stage: {}", code)))?;
        if let Some(note) = note {
            trace.note_degradation(note);
        }

        // Stage 4: token-bounded context assembly.
        state.advance(PipelineState::Assembling);
        let context = self.assembler.assemble(&reranked);
        if context.is_empty() {
            state.advance(PipelineState::Done);
            return Ok(self.no_results(trace));
        }

        // Stage 5: grounded generation with extractive fallback.
        state.advance(PipelineState::Generating);
        let generation_timer = StageTimer::start();
        let outcome = self.generate(question, &context).await;
        trace.record_generation(generation_timer.elapsed_ms());
        let (generated, note) = outcome.into_parts().map_err(|_| {
            RagError::LlmFailed("generation and extractive fallback both failed".to_string())
        })?;
        if let Some(note) = note {
            trace.note_degradation(note);
        }

        let result = self.finish(generated, &context, &reranked, trace);
        state.advance(PipelineState::Done);
        Ok(result)
    }

    async fn retrieve(
        &self,
        question: &str,
        trace: &RequestTrace,
    ) -> Result<(RetrievalResult, RetrievalResult), RagError> {
        let per_call = Duration::from_millis(self.config.retrieval.search_timeout_ms);
        let top_n = self.config.retrieval.top_n;

        let lexical_call = async {
            let timer = StageTimer::start();
            let result = match timeout(per_call, self.lexical.search(question, top_n)).await {
                Ok(result) => result,
                Err(_) => Err(RagError::BackendUnavailable(
                    "lexical search timed out".to_string(),
                )),
            };
            trace.record_bm25(timer.elapsed_ms());
            result
        };

        let vector_call = async {
            let timer = StageTimer::start();
            let result = match timeout(per_call, self.vector.search(question, top_n)).await {
                Ok(result) => result,
                Err(_) => Err(RagError::BackendUnavailable(
                    "vector search timed out".to_string(),
                )),
            };
            trace.record_dense(timer.elapsed_ms());
            result
        };

        let (lexical, vector) = tokio::join!(lexical_call, vector_call);

        match (lexical, vector) {
            (Ok(lexical), Ok(vector)) => Ok((lexical, vector)),
            (Ok(lexical), Err(err)) => {
                trace.note_degradation(format!("vector backend failed: {}", err));
                Ok((lexical, RetrievalResult::empty(Stage::Vector)))
            }
            (Err(err), Ok(vector)) => {
                trace.note_degradation(format!("lexical backend failed: {}", err));
                Ok((RetrievalResult::empty(Stage::Lexical), vector))
            }
            (Err(lexical_err), Err(vector_err)) => Err(RagError::BackendUnavailable(format!(
                "both retrieval sources failed (lexical: {}; vector: {})",
                lexical_err, vector_err
            ))),
        }
    }

    /// Rerank fallback: fused order with rerank_score set from the
    /// fused score, truncated to the configured top-k.
    fn fused_order_fallback(&self, fused: &RetrievalResult) -> RetrievalResult {
        let passages: Vec<Passage> = fused
            .passages
            .iter()
            .take(self.reranker.config().top_k)
            .cloned()
            .map(|mut passage| {
                passage.rerank_score = passage.fused_score;
                passage
            })
            .collect();

        RetrievalResult {
            stage: Stage::Reranked,
            passages,
            elapsed_ms: 0,
        }
    }

    async fn generate(&self, question: &str, context: &Context) -> StageOutcome<GeneratedAnswer> {
        match self.generator.generate(question, context).await {
            Ok(answer) => StageOutcome::Ok(answer),
            Err(primary) => match self.fallback.generate(question, context).await {
                Ok(answer) => StageOutcome::Degraded(
                    answer,
                    format!("generation failed, used extractive fallback: {}", primary),
                ),
                Err(_) => StageOutcome::Failed(ErrorCode::LlmFailed),
            },
        }
    }

    /// Citation-consistency check and final assembly.
    fn finish(
        &self,
        generated: GeneratedAnswer,
        context: &Context,
        reranked: &RetrievalResult,
        trace: &RequestTrace,
    ) -> AnswerResult {
        // Every citation must correspond to a context passage; anything
        // else is dropped, never fabricated.
        let mut cited: Vec<String> = Vec::new();
        let mut dropped = 0;
        for id in &generated.cited_passage_ids {
            if context.passage(id).is_some() {
                if !cited.contains(id) {
                    cited.push(id.clone());
                }
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            trace.note_degradation(format!("{} citation(s) outside context dropped", dropped));
        }

        let answer_claims_evidence = generated.text.trim() != INSUFFICIENT_DATA_ANSWER;
        if cited.is_empty() && answer_claims_evidence {
            trace.flag_citations_incomplete();
        }

        let citations: Vec<Citation> = cited
            .iter()
            .filter_map(|id| context.passage(id))
            .map(Citation::from)
            .collect();

        let confidence = confidence_score(&cited, reranked);

        AnswerResult {
            answer: generated.text,
            citations,
            debug: trace.debug_info(confidence),
        }
    }

    fn no_results(&self, trace: &RequestTrace) -> AnswerResult {
        AnswerResult {
            answer: INSUFFICIENT_DATA_ANSWER.to_string(),
            citations: Vec::new(),
            debug: trace.debug_info(0.0),
        }
    }
}
