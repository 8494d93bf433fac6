//! System prompts and message assembly for the chart-spec model call

use crate::types::{DatasetSummary, Role, Transcript, Turn};

const ASSISTANT_ROLE: &str = "You are an assistant that generates Vega-Lite JSON specifications based on user requests and provided data. \
Do **not** include the 'data' field with 'values' in your specifications. \
Assume that the data will be provided externally by the application. \
Focus solely on defining the visualization marks, encodings, and other specifications.";

const JSON_ONLY: &str = "Please respond **only** with the Vega-Lite JSON specification. \
Do **not** include any explanations, comments, or additional text. \
Ensure that the JSON is valid and properly formatted. \
Use one of the marks `line`, `bar` or `arc` and bind every encoding to a column by `field`.";

const NO_DATA_FIELD: &str = "Do **not** include the 'data' field in your Vega-Lite specification. \
The data will be injected separately by the application.";

/// System prompts followed by the full transcript, in order
pub fn build_messages(summary: &DatasetSummary, transcript: &Transcript) -> Vec<Turn> {
    let mut messages = system_prompts(summary);
    messages.extend(transcript.turns().iter().cloned());
    messages
}

fn system_prompts(summary: &DatasetSummary) -> Vec<Turn> {
    // sample rows get their own prompt below
    let overview = serde_json::json!({
        "columns": summary.columns,
        "row_count": summary.row_count,
    });
    let summary_json = serde_json::to_string_pretty(&overview).unwrap_or_default();
    let sample_json = serde_json::to_string_pretty(&summary.sample).unwrap_or_default();

    vec![
        Turn::new(Role::System, ASSISTANT_ROLE),
        Turn::new(Role::System, JSON_ONLY),
        Turn::new(
            Role::System,
            format!("Here is a summary of the data:\n{}", summary_json),
        ),
        Turn::new(
            Role::System,
            format!("Columns: {}", summary.columns.join(", ")),
        ),
        Turn::new(
            Role::System,
            format!("Here is a sample of the data:\n{}", sample_json),
        ),
        Turn::new(Role::System, NO_DATA_FIELD),
    ]
}
