//! Build automation tasks for VulnGraph
//!
//! - Generating the CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for VulnGraph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<vulngraph_ingest::cli::Cli>();

    let content = format!(
        r#"# vulngraph-ingest CLI Reference

Generated from the CLI source code on {}.

## Quick Start

```bash
# Create the entity tables
vulngraph-ingest migrate

# Ingest downloaded NVD feed files without touching the database
vulngraph-ingest feed ./feeds --dry-run

# Fetch and ingest everything published in 2023 and 2024
NVD_API_KEY=... vulngraph-ingest api --start-year 2023 --end-year 2024
```

## Commands

{}

## Environment Variables

- `DATABASE_URL` - PostgreSQL connection string (default: `postgresql://localhost/vulngraph`)
- `INGEST_WORKERS` - Worker count for every task pool (default: `4`)
- `INGEST_RECORD_BATCH_SIZE` - Source records per adapt task (default: `500`)
- `INGEST_PERSIST_BATCH_SIZE` - Entities per write batch (default: `500`)
- `NVD_API_KEY` - Raises the API quota from 5 to 50 calls per 30 seconds
- `LOG_LEVEL`, `LOG_FORMAT`, `LOG_OUTPUT`, `LOG_DIR` - Logging

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
