//! Testing utilities for the Alvara workspace
//!
//! Scripted model, seeded corpus and case fixtures.

#![allow(missing_docs)]

use alvara_agent::{GenerativeModel, ModelError, ModelStream, StreamDelta, ToolCall, TurnRequest};
use alvara_record::{CaseId, CaseKind, CaseRef, MemoryDirectory};
use alvara_retrieval::{LawCategory, MemoryCorpus, NewRegulation, RegulationCorpus};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

/// What the scripted model does on one `open_stream` call
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Stream these deltas, then end
    Stream(Vec<StreamDelta>),
    /// Stream these deltas, then never end
    Stall(Vec<StreamDelta>),
    /// Refuse to open with this status and message
    Fail { status: u16, message: String },
    /// Never answer
    Hang,
}

impl ScriptStep {
    pub fn text(chunks: &[&str]) -> Self {
        Self::Stream(chunks.iter().map(|c| StreamDelta::text(*c)).collect())
    }

    pub fn quota() -> Self {
        Self::Fail {
            status: 429,
            message: "RESOURCE_EXHAUSTED: quota exceeded".to_string(),
        }
    }
}

/// Model replaying a fixed script and recording every request
#[derive(Debug, Default)]
pub struct ScriptedModel {
    steps: Mutex<VecDeque<ScriptStep>>,
    requests: Mutex<Vec<TurnRequest>>,
    opened_at: Mutex<Vec<Instant>>,
}

impl ScriptedModel {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn opened_at(&self) -> Vec<Instant> {
        self.opened_at.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GenerativeModel for ScriptedModel {
    async fn open_stream(&self, request: TurnRequest) -> Result<ModelStream, ModelError> {
        self.requests.lock().unwrap().push(request);
        self.opened_at.lock().unwrap().push(Instant::now());
        let step = self.steps.lock().unwrap().pop_front();

        match step {
            Some(ScriptStep::Stream(deltas)) => {
                Ok(futures::stream::iter(deltas.into_iter().map(Ok)).boxed())
            }
            Some(ScriptStep::Stall(deltas)) => Ok(futures::stream::iter(deltas.into_iter().map(Ok))
                .chain(futures::stream::pending())
                .boxed()),
            Some(ScriptStep::Fail { status, message }) => Err(ModelError::Status { status, message }),
            Some(ScriptStep::Hang) => futures::future::pending().await,
            None => Err(ModelError::Stream("script exhausted".to_string())),
        }
    }
}

pub fn tool_call(name: &str, args: serde_json::Value, id: &str) -> StreamDelta {
    StreamDelta::tool_call(ToolCall {
        name: name.to_string(),
        args,
        id: id.to_string(),
    })
}

pub const CODIGO_DE_OBRAS: &str = "Código de Obras";
pub const PLANO_DIRETOR: &str = "Plano Diretor";

/// Corpus with the building code and the master plan
pub async fn seeded_corpus() -> MemoryCorpus {
    let corpus = MemoryCorpus::new();
    corpus
        .insert(
            NewRegulation::new(CODIGO_DE_OBRAS, LawCategory::CodigoObras).with_text(
                "Artigo 120. Todo compartimento sem abertura direta terá prisma de ventilação \
                 com área mínima de 4m². Artigo 22. Pé direito mínimo de 2,70m.",
            ),
        )
        .await
        .unwrap();
    corpus
        .insert(
            NewRegulation::new(PLANO_DIRETOR, LawCategory::PlanoDiretor).with_text(
                "Artigo 242. Áreas verdes e arborização obrigatória em lotes comerciais. \
                 Artigo 87. Loteamentos observarão perfis de vias não inferiores a 2%.",
            ),
        )
        .await
        .unwrap();
    corpus
}

pub const HABITE_PROTOCOL: &str = "2024/0153";
pub const LICENSING_PROTOCOL: &str = "2024.0777";

/// Directory with one occupancy-permit case and one licensing case
pub fn sample_directory() -> MemoryDirectory {
    MemoryDirectory::with_cases([
        CaseRef {
            case_id: CaseId::new("case-habite"),
            protocol: HABITE_PROTOCOL.to_string(),
            case_kind: CaseKind::HabiteSe,
        },
        CaseRef {
            case_id: CaseId::new("case-licenca"),
            protocol: LICENSING_PROTOCOL.to_string(),
            case_kind: CaseKind::Licensing,
        },
    ])
}

/// Report in the layout the auditor instruction asks for
pub const SAMPLE_REPORT: &str = "\
**1. IDENTIFICAÇÃO DO PROCESSO**
Protocolo: 2024/0153
Interessado: **Maria Souza**
Assunto: Habite-se residencial

**2. CHECKLIST DE EXISTÊNCIA DOCUMENTAL (Módulo A)**
• BCI: ✅ Apresentado (bci.pdf)
• CND: ❌ Não consta
- ART de Execução: ⚠️ Atenção, área divergente

3. ANÁLISE DE CONFRONTO (PROVA REAL)
* **Titularidade:** Escritura diz Maria vs Projeto diz Maria. (Parecer: OK)
* **Áreas:** Escritura 250m² vs Projeto 262m². Parecer: Erro na área construída
- ---
";
