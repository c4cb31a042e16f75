//! Command-line argument parsing for LocalRAG
//!
//! Provides clap-based CLI with ask and health subcommands.

use clap::{Parser, Subcommand};

/// LocalRAG - Ask questions over an indexed local document corpus
#[derive(Parser, Debug)]
#[command(name = "localrag")]
#[command(version = "0.1.0")]
#[command(about = "Citation-grounded question answering over local documents", long_about = None)]
pub struct Args {
    /// Emit machine-readable JSON instead of formatted output
    #[arg(long)]
    pub json: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a question and print the grounded answer with citations
    Ask {
        /// The question to answer (minimum 5 characters)
        #[arg(value_name = "QUESTION")]
        question: String,
    },

    /// Check availability of the retrieval and generation backends
    Health,
}
