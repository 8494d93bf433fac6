//! chartforge binary: interactive console loop or HTTP server

use anyhow::{Context, Result};
use chartforge::{
    server, Dataset, HttpChatModel, PipelineConfig, PipelineError, Transcript, TurnOutcome,
    VisualizationPipeline,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

struct Args {
    serve: bool,
    port: Option<u16>,
    data: Option<PathBuf>,
    output: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        serve: false,
        port: None,
        data: None,
        output: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--serve" => args.serve = true,
            "--port" => {
                let raw = iter.next().context("--port needs a value")?;
                args.port = Some(raw.parse().context("--port must be a number")?);
            }
            "--data" => args.data = Some(iter.next().context("--data needs a path")?.into()),
            "--output" => args.output = Some(iter.next().context("--output needs a path")?.into()),
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    println!("chartforge {}", env!("CARGO_PKG_VERSION"));

    let args = parse_args()?;
    let mut config = PipelineConfig::from_env()?;
    if let Some(output) = args.output {
        config.output_path = output;
    }

    if args.serve {
        let port = args.port.unwrap_or(config.port);
        let pipeline = VisualizationPipeline::new_simple(&config);
        println!("Serving on port {}, writing {}", port, config.output_path.display());
        return server::run_server(pipeline, port).await;
    }

    let data_path = args
        .data
        .context("interactive mode needs --data <records.json>")?;
    let raw = tokio::fs::read_to_string(&data_path)
        .await
        .with_context(|| format!("Failed to read {}", data_path.display()))?;
    let dataset: Dataset = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of records", data_path.display()))?;
    println!("Loaded {} records with columns: {}", dataset.len(), dataset.columns().join(", "));

    if config.model.api_key.is_none() {
        anyhow::bail!("OPENAI_API_KEY not found in the environment or .env");
    }
    let model = HttpChatModel::new(config.model.clone())?;
    let pipeline = VisualizationPipeline::new(&config, Some(Box::new(model)));
    pipeline.accumulator().ensure_initialized().await?;

    chat_loop(&pipeline, &dataset).await?;

    println!(
        "All visualizations have been saved to '{}'.",
        config.output_path.display()
    );
    Ok(())
}

async fn chat_loop(pipeline: &VisualizationPipeline, dataset: &Dataset) -> Result<()> {
    let summary = pipeline.summarize(dataset);
    let mut transcript = Transcript::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Start chatting with the assistant. Type 'exit' or 'quit' to end the session.");
    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("Ending the chat. Goodbye!");
            break;
        }

        match pipeline.run_turn(&mut transcript, input, dataset, &summary).await {
            TurnOutcome::Appended(receipt) => {
                println!("\n--- Merged Vega-Lite JSON ---");
                println!("{}", serde_json::to_string_pretty(&receipt.spec)?);
                println!(
                    "\nVisualization {} appended to '{}'.\n",
                    receipt.fragment_id,
                    receipt.artifact.display()
                );
            }
            TurnOutcome::Rejected {
                error: PipelineError::ExtractionFailed,
                reply,
            } => {
                println!("\nAssistant:\n{}\n", reply);
            }
            TurnOutcome::Rejected { error, .. } if error.is_fatal() => {
                return Err(error).context("Artifact could not be written");
            }
            TurnOutcome::Rejected { error, .. } => {
                println!("\nNo chart added ({} stage): {}\n", error.stage(), error);
            }
            TurnOutcome::ModelFailed(reason) => {
                println!("\nModel call failed: {}\n", reason);
            }
        }
    }
    Ok(())
}
