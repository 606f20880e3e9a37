//! Shared fakes and fixtures for session tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use promptcoach::models::{AnalysisRequest, AnalysisResponse, RewriteRequest, Suggestion};
use promptcoach::{
    Analyzer, Catalog, Error, ProgressStore, PromptSession, Result, Rewriter, SessionSettings,
    Technique, TechniqueId,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// 36 characters, relevant to `clarity/examples`.
pub const COVER_LETTER: &str = "Write a cover letter for a data role";

/// The cover letter prompt after the user pasted an example.
pub const COVER_LETTER_WITH_EXAMPLE: &str =
    "Write a cover letter for a data role. Here is one I liked: Dear team, ...";

pub const EXAMPLES: &str = "clarity/examples";
pub const ROLE: &str = "framing/role";
pub const XML_TAGS: &str = "structure/xml-tags";

/// Analyzer that answers from a script and records every request.
///
/// Requests are recorded when the call starts; the scripted answer is taken
/// after the delay, so a cancelled call consumes nothing. An empty script
/// answers with the no-op response.
#[derive(Default)]
pub struct ScriptedAnalyzer {
    script: Mutex<VecDeque<Result<AnalysisResponse>>>,
    requests: Mutex<Vec<AnalysisRequest>>,
    delay: Duration,
}

impl ScriptedAnalyzer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn push(&self, response: Result<AnalysisResponse>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> AnalysisRequest {
        self.requests.lock().unwrap().last().cloned().expect("no analysis call")
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(AnalysisResponse::noop()))
    }
}

/// Rewriter that streams fixed chunks, optionally failing at the end.
pub struct ScriptedRewriter {
    chunks: Vec<&'static str>,
    fail: bool,
    chunk_delay: Duration,
    requests: Mutex<Vec<RewriteRequest>>,
}

impl ScriptedRewriter {
    pub fn new(chunks: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            chunks,
            fail: false,
            chunk_delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(chunks: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            chunks,
            fail: true,
            chunk_delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(chunks: Vec<&'static str>, chunk_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            chunks,
            fail: false,
            chunk_delay,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<RewriteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Rewriter for ScriptedRewriter {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn rewrite(&self, request: &RewriteRequest, tx: mpsc::Sender<String>) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        for chunk in &self.chunks {
            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            if tx.send((*chunk).to_string()).await.is_err() {
                return Ok(());
            }
        }
        if self.fail {
            return Err(Error::OperationFailed {
                operation: "rewrite".to_string(),
                cause: "connection reset".to_string(),
            });
        }
        Ok(())
    }
}

pub fn technique(id: &str, threshold: u32) -> Technique {
    Technique {
        id: TechniqueId::new(id),
        title: id.to_string(),
        icon: None,
        surface_criteria: "surface".to_string(),
        satisfaction_criteria: "satisfy".to_string(),
        learning_threshold: threshold,
        detail: String::new(),
    }
}

pub fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::new([
            technique(EXAMPLES, 3),
            technique(ROLE, 1),
            technique(XML_TAGS, 2),
        ])
        .unwrap(),
    )
}

pub fn settings() -> SessionSettings {
    SessionSettings::default()
        .with_debounce(Duration::from_millis(800))
        .with_min_prompt_length(30)
        .with_analysis_timeout(Duration::from_secs(15))
        .with_satisfied_display(Duration::from_millis(1500))
}

pub fn session(analyzer: Arc<ScriptedAnalyzer>) -> PromptSession {
    session_with(settings(), analyzer, None, Arc::new(ProgressStore::in_memory()))
}

pub fn session_with(
    settings: SessionSettings,
    analyzer: Arc<ScriptedAnalyzer>,
    rewriter: Option<Arc<ScriptedRewriter>>,
    progress: Arc<ProgressStore>,
) -> PromptSession {
    let mut builder = PromptSession::builder(settings)
        .catalog(catalog())
        .progress(progress)
        .analyzer(analyzer);
    if let Some(rewriter) = rewriter {
        builder = builder.rewriter(rewriter);
    }
    builder.build().unwrap()
}

pub fn suggestion(id: Option<&str>) -> Suggestion {
    Suggestion {
        technique_id: id.map(TechniqueId::new),
        suggestion_text: "Paste a letter you liked".to_string(),
        suggestion_description: "An example sets tone and length better than adjectives."
            .to_string(),
        suggestion_examples: vec![
            "Here is a cover letter I liked: ...".to_string(),
            "Match the tone of this example: ...".to_string(),
        ],
    }
}

pub fn surface(id: Option<&str>) -> AnalysisResponse {
    AnalysisResponse {
        surface: Some(suggestion(id)),
        ..AnalysisResponse::noop()
    }
}

pub fn satisfied(id: &str) -> AnalysisResponse {
    AnalysisResponse {
        satisfied_id: Some(TechniqueId::new(id)),
        ..AnalysisResponse::noop()
    }
}

pub fn maintained(id: &str) -> AnalysisResponse {
    AnalysisResponse {
        maintained_id: Some(TechniqueId::new(id)),
        ..AnalysisResponse::noop()
    }
}

/// Handles events until `done` holds.
pub async fn step_until(session: &mut PromptSession, done: impl Fn(&PromptSession) -> bool) {
    tokio::time::timeout(Duration::from_secs(120), async {
        while !done(session) {
            let event = session.next_event().await.expect("event channel closed");
            session.handle_event(event);
        }
    })
    .await
    .expect("condition never reached");
}

/// Technique id of the chip on display.
pub fn chip_technique(session: &PromptSession) -> Option<String> {
    session
        .view()
        .chip
        .and_then(|chip| chip.technique_id)
        .map(|id| id.to_string())
}
