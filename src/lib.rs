//! chartforge - chart specs from free-text model output
//!
//! Turns a chat model's reply into a validated Vega-Lite specification and
//! accumulates it in a persisted HTML dashboard:
//! - Balanced-object extraction from surrounding prose
//! - Per-chart-kind base templates, deep-merged under the model's spec
//! - Structural validation and late dataset binding
//! - Append-only, order-preserving artifact writes

pub mod types;
pub mod error;
pub mod extractor;
pub mod templates;
pub mod merge;
pub mod validator;
pub mod binder;
pub mod accumulator;
pub mod prompt;
pub mod model_client;
pub mod config;
pub mod pipeline;
pub mod server;

pub use types::*;
pub use error::{PipelineError, PipelineResult};
pub use extractor::extract_object;
pub use templates::{Template, TemplateRegistry};
pub use merge::deep_merge;
pub use validator::{validate, validate_structure};
pub use binder::{bind, bound_records};
pub use accumulator::DocumentAccumulator;
pub use model_client::{ChatModel, HttpChatModel, MockChatModel};
pub use config::{ModelConfig, PipelineConfig};
pub use pipeline::{SharedPipeline, TurnOutcome, VisualizationPipeline};
