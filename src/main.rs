//! LocalRAG - Main CLI Entry Point

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use serde_json::json;

use localrag::{
    cli::{Args, Commands},
    config::RagConfig,
    pipeline::AnswerPipeline,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = RagConfig::load()?;

    match args.command {
        Commands::Ask { ref question } => ask(&config, question, args.json).await,
        Commands::Health => health(&config, args.json).await,
    }
}

async fn ask(config: &RagConfig, question: &str, json: bool) -> Result<()> {
    let pipeline = AnswerPipeline::from_config(config.clone())?;

    match pipeline.answer(question).await {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            println!("{}", result.answer);

            if !result.citations.is_empty() {
                println!("\n{}", "Sources:".bold());
                for citation in &result.citations {
                    let mut line = format!("  - {} ({})", citation.doc_title, citation.source);
                    if let Some(page) = citation.page {
                        line.push_str(&format!(", page {}", page));
                    }
                    println!("{}", line);
                }
            }

            let debug = &result.debug;
            println!(
                "\n{} trace={} confidence={:.2} total={}ms (bm25={}ms dense={}ms rerank={}ms gen={}ms)",
                "debug:".dimmed(),
                debug.trace_id,
                debug.confidence_score,
                debug.total_time_ms,
                debug.bm25_time_ms,
                debug.dense_time_ms,
                debug.rerank_time_ms,
                debug.generation_time_ms,
            );
            for note in &debug.degradations {
                println!("{} {}", "degraded:".yellow(), note);
            }

            Ok(())
        }
        Err(failure) => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "error": failure.error,
                        "code": failure.code,
                        "stage": failure.stage,
                        "trace_id": failure.debug.trace_id,
                    }))?
                );
            } else {
                eprintln!("{} {}", "error:".red().bold(), failure);
            }
            std::process::exit(1);
        }
    }
}

async fn health(config: &RagConfig, json: bool) -> Result<()> {
    let pipeline = AnswerPipeline::from_config(config.clone())?;
    let (lexical, vector) = pipeline.backends();

    let lexical_ok = lexical.health_check().await;
    let vector_ok = vector.health_check().await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "lexical": if lexical_ok { "healthy" } else { "unavailable" },
                "vector": if vector_ok { "healthy" } else { "unavailable" },
            }))?
        );
        return Ok(());
    }

    let render = |name: &str, ok: bool| {
        if ok {
            println!("  {} {}", "✓".green(), name);
        } else {
            println!("  {} {}", "✗".red(), name);
        }
    };

    println!("{}", "Backend health:".bold());
    render("lexical (BM25)", lexical_ok);
    render("vector (dense)", vector_ok);

    if !lexical_ok && !vector_ok {
        eprintln!(
            "{} no retrieval source available; questions will fail",
            "warning:".yellow().bold()
        );
        std::process::exit(1);
    }

    Ok(())
}
