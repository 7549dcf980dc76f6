use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;
use tree_ot::{DEFAULT_GRAVEYARD, Delta, Document, TransformContext, transform_delta_sets};

/// Apply and transform document tree deltas stored as JSON
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Applies a list of deltas to a document and prints the result
    Apply { document: PathBuf, deltas: PathBuf },
    /// Rebases the deltas in <A> past the concurrent deltas in <B>
    Transform {
        a: PathBuf,
        b: PathBuf,
        /// Let <A> win symmetric conflicts
        #[arg(long)]
        strong: bool,
        #[arg(long, default_value = DEFAULT_GRAVEYARD)]
        graveyard: String,
    },
    /// Applies two concurrent delta lists in both orders and compares the
    /// results; exits with 2 when they diverge
    Converge {
        document: PathBuf,
        a: PathBuf,
        b: PathBuf,
    },
}

type CliResult<T> = Result<T, Box<dyn Error>>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Apply { document, deltas } => apply_command(document, deltas),
        Commands::Transform {
            a,
            b,
            strong,
            graveyard,
        } => transform_command(a, b, *strong, graveyard),
        Commands::Converge { document, a, b } => converge_command(document, a, b),
    };
    match result {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(1);
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let content = fs::read_to_string(path)
        .map_err(|err| format!("cannot read {}: {err}", path.display()))?;
    let value = serde_json::from_str(&content)
        .map_err(|err| format!("cannot parse {}: {err}", path.display()))?;
    Ok(value)
}

fn apply_all(document: &mut Document, deltas: &[Delta]) -> CliResult<()> {
    for delta in deltas {
        document.apply_delta(delta)?;
    }
    Ok(())
}

fn apply_command(document: &Path, deltas: &Path) -> CliResult<i32> {
    let mut document: Document = read_json(document)?;
    let deltas: Vec<Delta> = read_json(deltas)?;
    apply_all(&mut document, &deltas)?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(0)
}

fn transform_command(a: &Path, b: &Path, strong: bool, graveyard: &str) -> CliResult<i32> {
    let a: Vec<Delta> = read_json(a)?;
    let b: Vec<Delta> = read_json(b)?;
    let context = TransformContext::new(strong, graveyard);
    let (rebased, _) = transform_delta_sets(&a, &b, &context);
    println!("{}", serde_json::to_string_pretty(&rebased)?);
    Ok(0)
}

fn converge_command(document: &Path, a: &Path, b: &Path) -> CliResult<i32> {
    let document: Document = read_json(document)?;
    let a: Vec<Delta> = read_json(a)?;
    let b: Vec<Delta> = read_json(b)?;
    let context = TransformContext::for_document(&document, true);
    let (a_after_b, b_after_a) = transform_delta_sets(&a, &b, &context);

    let mut a_first = document.clone();
    apply_all(&mut a_first, &a)?;
    apply_all(&mut a_first, &b_after_a)?;

    let mut b_first = document;
    apply_all(&mut b_first, &b)?;
    apply_all(&mut b_first, &a_after_b)?;

    if a_first.structurally_eq(&b_first) {
        println!("converged at version {}", a_first.version());
        Ok(0)
    } else {
        println!("diverged");
        Ok(2)
    }
}
