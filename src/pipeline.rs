//! VisualizationPipeline: model reply -> validated, bound fragment in the artifact

use crate::accumulator::DocumentAccumulator;
use crate::binder::bind;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::extractor::extract_object;
use crate::merge::deep_merge;
use crate::model_client::ChatModel;
use crate::prompt::build_messages;
use crate::templates::TemplateRegistry;
use crate::types::*;
use crate::validator::{is_bound, validate};
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Main pipeline (thread-safe via Arc). Stateless apart from the artifact.
pub struct VisualizationPipeline {
    registry: &'static TemplateRegistry,
    accumulator: DocumentAccumulator,
    model: Option<Box<dyn ChatModel>>,
    write_retries: u32,
    retry_backoff: Duration,
    sample_rows: usize,
}

pub type SharedPipeline = Arc<VisualizationPipeline>;

/// Result of one conversational turn. Never aborts the conversation by itself.
#[derive(Debug)]
pub enum TurnOutcome {
    Appended(FragmentReceipt),
    Rejected { error: PipelineError, reply: String },
    ModelFailed(String),
}

impl TurnOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Rejected { error, .. } if error.is_fatal())
    }
}

impl VisualizationPipeline {
    /// Create a pipeline writing to the configured artifact
    pub fn new(config: &PipelineConfig, model: Option<Box<dyn ChatModel>>) -> SharedPipeline {
        Arc::new(Self {
            registry: TemplateRegistry::global(),
            accumulator: DocumentAccumulator::new(&config.output_path, config.title.clone()),
            model,
            write_retries: config.write_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            sample_rows: config.sample_rows,
        })
    }

    /// Pipeline without a chat model; only `process_reply` is usable
    pub fn new_simple(config: &PipelineConfig) -> SharedPipeline {
        Self::new(config, None)
    }

    pub fn accumulator(&self) -> &DocumentAccumulator {
        &self.accumulator
    }

    pub fn summarize(&self, dataset: &Dataset) -> DatasetSummary {
        DatasetSummary::from_dataset(dataset, self.sample_rows)
    }

    /// Extract, parse, select template, merge, validate. Touches no state.
    ///
    /// The returned spec has an empty data slot.
    pub fn assemble(&self, reply: &str) -> PipelineResult<(ChartKind, SpecTree)> {
        let object_text = extract_object(reply).ok_or(PipelineError::ExtractionFailed)?;
        let parsed: SpecTree = serde_json::from_str(object_text)?;
        let (kind, mut overlay) = split_envelope(parsed)?;
        let template = self.registry.lookup(kind);

        if overlay.remove("data").is_some() {
            warn!("Model spec carried a data slot; discarded before merge");
        }
        normalize_mark(&mut overlay, kind, template.spec());

        // model spec overlays the template: explicit model choices win
        let mut merged = deep_merge(template.spec(), &overlay);
        link_channels(&mut merged, template.linked_channels());
        prune_unbound_channels(&mut merged, kind);

        validate(&merged)?;
        debug!("Assembled {} spec with {} top-level keys", kind, merged.len());
        Ok((kind, merged))
    }

    /// Full core run for one reply: assemble, bind, append.
    ///
    /// On any error the artifact is left exactly as it was.
    pub async fn process_reply(
        &self,
        reply: &str,
        dataset: &Dataset,
    ) -> PipelineResult<FragmentReceipt> {
        let (kind, spec) = self.assemble(reply)?;
        let bound = bind(&spec, dataset)?;

        let fragment_id = self.accumulator.next_fragment_id();
        self.append_with_retry(&fragment_id, &bound).await?;

        info!(
            "Appended {} chart {} ({} rows) to {}",
            kind,
            fragment_id,
            dataset.len(),
            self.accumulator.path().display()
        );

        Ok(FragmentReceipt {
            fragment_id,
            chart_kind: kind,
            spec,
            rows_bound: dataset.len(),
            artifact: self.accumulator.path().to_path_buf(),
        })
    }

    /// One conversational turn: record input, ask the model, process its reply.
    ///
    /// Accepted specs are recorded unbound, so dataset rows never enter the
    /// transcript.
    pub async fn run_turn(
        &self,
        transcript: &mut Transcript,
        user_input: &str,
        dataset: &Dataset,
        summary: &DatasetSummary,
    ) -> TurnOutcome {
        let user_input = user_input.trim();
        if !user_input.is_empty() {
            transcript.push_user(user_input);
        }

        let Some(model) = self.model.as_ref() else {
            return TurnOutcome::ModelFailed("no chat model configured".to_string());
        };

        let messages = build_messages(summary, transcript);
        debug!("Calling {} with {} messages", model.name(), messages.len());

        let reply = match model.complete(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Chat model call failed: {:#}", e);
                return TurnOutcome::ModelFailed(format!("{:#}", e));
            }
        };

        match self.process_reply(&reply, dataset).await {
            Ok(receipt) => {
                let recorded = serde_json::to_string(&receipt.spec)
                    .unwrap_or_else(|_| reply.clone());
                transcript.push_assistant(recorded);
                TurnOutcome::Appended(receipt)
            }
            Err(error) => {
                info!("Reply rejected at {} stage: {}", error.stage(), error);
                let recorded = extract_object(&reply).unwrap_or(&reply).to_string();
                transcript.push_assistant(recorded);
                TurnOutcome::Rejected { error, reply }
            }
        }
    }

    async fn append_with_retry(&self, id: &FragmentId, bound: &SpecTree) -> PipelineResult<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.accumulator.append(id, bound).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.write_retries && is_retryable(&e) => {
                    attempt += 1;
                    warn!("Artifact write failed (attempt {}): {}", attempt, e);
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => {
                    error!("Giving up on artifact write: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

fn is_retryable(err: &PipelineError) -> bool {
    match err {
        PipelineError::ArtifactWriteFailed { source, .. } => source.kind() != ErrorKind::AlreadyExists,
        _ => false,
    }
}

/// Accept either a bare spec or `{"chart_type": ..., "spec": {...}}`.
///
/// A mark declared in the spec decides the kind; `chart_type` is the fallback.
fn split_envelope(mut parsed: SpecTree) -> PipelineResult<(ChartKind, SpecTree)> {
    if parsed.contains_key("chart_type") && !parsed.contains_key("mark") {
        let chart_type = parsed
            .get("chart_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let spec = match parsed.remove("spec") {
            Some(Value::Object(spec)) => spec,
            _ => SpecTree::new(),
        };
        let kind = match mark_type(&spec) {
            Some(mark) => ChartKind::from_key(mark)?,
            None => ChartKind::from_key(&chart_type)?,
        };
        return Ok((kind, spec));
    }
    let kind = ChartKind::from_spec(&parsed)?;
    Ok((kind, parsed))
}

/// Canonicalize the mark type (`pie` -> `arc`) and lift a bare string mark to
/// an object when the template's mark is an object, so its defaults survive.
fn normalize_mark(overlay: &mut SpecTree, kind: ChartKind, template: &SpecTree) {
    let template_mark_is_object = template.get("mark").map_or(false, Value::is_object);
    let replacement = match overlay.get("mark") {
        Some(Value::String(_)) if template_mark_is_object => Some(json!({ "type": kind.as_str() })),
        Some(Value::String(_)) => Some(json!(kind.as_str())),
        _ => None,
    };
    match replacement {
        Some(mark) => {
            overlay.insert("mark".to_string(), mark);
        }
        None => {
            if let Some(Value::Object(mark)) = overlay.get_mut("mark") {
                mark.insert("type".to_string(), json!(kind.as_str()));
            }
        }
    }
}

/// Copy `source`'s field into `channel` when the channel is left unbound.
///
/// An explicit `null` channel is an opt-out and stays unlinked.
fn link_channels(spec: &mut SpecTree, links: &[(&str, &str)]) {
    let Some(Value::Object(encoding)) = spec.get_mut("encoding") else {
        return;
    };
    for (channel, source) in links {
        match encoding.get(*channel) {
            Some(Value::Null) => continue,
            Some(def) if is_bound(def) => continue,
            _ => {}
        }
        let Some(field) = encoding
            .get(*source)
            .and_then(|def| def.get("field"))
            .filter(|f| !f.is_null())
            .cloned()
        else {
            continue;
        };
        if let Some(Value::Object(def)) = encoding.get_mut(*channel) {
            def.insert("field".to_string(), field);
        } else {
            encoding.insert(channel.to_string(), json!({ "field": field }));
        }
    }
}

/// Drop optional channel definitions that carry no binding (template leftovers)
/// and optional channels the model set to `null`
fn prune_unbound_channels(spec: &mut SpecTree, kind: ChartKind) {
    let Some(Value::Object(encoding)) = spec.get_mut("encoding") else {
        return;
    };
    let required = kind.required_channels();
    encoding.retain(|channel, def| {
        if required.contains(&channel.as_str()) {
            return true;
        }
        match def {
            Value::Null => false,
            Value::Object(_) => is_bound(def) || def.get("condition").is_some(),
            _ => true,
        }
    });
}
