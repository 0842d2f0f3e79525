use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tooltown_core::{pipeline, FileKind, OperationRequest, OperationResult, RequestScope};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tooltown",
    about = "PDF utilities on local files",
    version,
    author
)]
struct Cli {
    /// Directory for intermediate files
    #[arg(long, global = true, env = "TOOLTOWN_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge PDFs in the order given
    Merge {
        /// Input PDF files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Keep a range of pages
    Split {
        /// Input PDF file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// First page to keep (1-based)
        #[arg(short, long, default_value_t = 1)]
        start: i64,

        /// Last page to keep; defaults to the last page
        #[arg(short, long)]
        end: Option<i64>,
    },

    /// Rotate pages in a PDF
    Rotate {
        /// Input PDF file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Rotation angle (90, 180, 270)
        #[arg(short, long, default_value_t = 90)]
        angle: i64,

        /// Pages to rotate (e.g. "1,3,5"); all pages when omitted
        #[arg(short, long, value_delimiter = ',')]
        pages: Option<Vec<i64>>,
    },

    /// Stamp diagonal text on pages
    Watermark {
        /// Input PDF file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Watermark text
        #[arg(short, long)]
        text: String,

        /// Opacity between 0.1 and 1.0
        #[arg(long, default_value_t = 0.3)]
        opacity: f32,

        /// Pages to stamp; all pages when omitted
        #[arg(short, long, value_delimiter = ',')]
        pages: Option<Vec<i64>>,
    },

    /// Password-protect a PDF
    Encrypt {
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Password required to open the document
        #[arg(short, long)]
        user_password: String,

        /// Password for full access; defaults to the user password
        #[arg(long)]
        owner_password: Option<String>,
    },

    /// Remove password protection
    Decrypt {
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long)]
        password: String,
    },

    /// Reduce file size by recompressing images and streams
    Compress {
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// JPEG quality (10-100)
        #[arg(short, long, default_value_t = 80)]
        quality: u8,
    },

    /// Extract text from a PDF file
    ExtractText {
        /// Input PDF file
        input: PathBuf,

        /// Output text file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pages to extract (1-based); all pages when omitted
        #[arg(short, long, value_delimiter = ',')]
        pages: Option<Vec<i64>>,
    },

    /// Show document metadata
    Info {
        /// Input PDF file
        input: PathBuf,
    },

    /// Check whether a file is a usable PDF
    Validate {
        /// Input PDF file
        input: PathBuf,
    },
}

/// Runs one operation on local files through the same staging, validation
/// and cleanup path the HTTP service uses.
struct Runner {
    scratch_dir: PathBuf,
}

impl Runner {
    async fn run(
        &self,
        request: OperationRequest,
        inputs: &[PathBuf],
    ) -> Result<(OperationResult, RequestScope)> {
        let scope = RequestScope::new(&self.scratch_dir);
        let kind = request.input_kind();
        let content_type = match kind {
            FileKind::Pdf => "application/pdf",
            _ => "application/octet-stream",
        };

        let mut staged = Vec::with_capacity(inputs.len());
        for path in inputs {
            let file = scope
                .stager()
                .stage_path(path, content_type, kind)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            staged.push(file);
        }

        let result = pipeline::run(request, staged, scope.stager().clone()).await?;
        Ok((result, scope))
    }

    /// Runs `request` and copies the produced file to `output`.
    async fn write(
        &self,
        request: OperationRequest,
        inputs: &[PathBuf],
        output: &Path,
    ) -> Result<()> {
        let (result, scope) = self.run(request, inputs).await?;
        let OperationResult::Artifact(artifact) = result else {
            bail!("Operation did not produce a file");
        };
        tokio::fs::copy(&artifact.path, output)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;
        scope.finish();

        if artifact.repaired_input {
            eprintln!("Note: the input was damaged and has been repaired");
        }
        if let Some(report) = artifact.report {
            println!(
                "  {} -> {} bytes ({:.1}% smaller)",
                report.original_size,
                report.result_size,
                report.reduction_percent()
            );
        }
        Ok(())
    }

    async fn data(&self, request: OperationRequest, input: &Path) -> Result<Value> {
        let (result, scope) = self.run(request, &[input.to_path_buf()]).await?;
        scope.finish();
        match result {
            OperationResult::Data(value) => Ok(value),
            OperationResult::Artifact(_) => bail!("Operation did not produce a report"),
        }
    }
}

/// Plain text for the whole document, or page sections in page order.
fn render_text(value: &Value) -> String {
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        return text.to_string();
    }
    let Some(pages) = value.as_object() else {
        return String::new();
    };
    let mut sections: Vec<(i64, &str)> = pages
        .iter()
        .filter_map(|(key, text)| {
            let number = key.strip_prefix("page_")?.parse().ok()?;
            Some((number, text.as_str()?))
        })
        .collect();
    sections.sort_by_key(|(number, _)| *number);
    sections
        .iter()
        .map(|(number, text)| format!("--- Page {number} ---\n{text}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "tooltown_core=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runner = Runner {
        scratch_dir: cli
            .scratch_dir
            .unwrap_or_else(|| std::env::temp_dir().join("tooltown-cli")),
    };

    match cli.command {
        Commands::Merge { files, output } => {
            let count = files.len();
            runner.write(OperationRequest::Merge, &files, &output).await?;
            println!("✓ Merged {count} files into {}", output.display());
        }

        Commands::Split {
            input,
            output,
            start,
            end,
        } => {
            runner
                .write(OperationRequest::Split { start, end }, &[input], &output)
                .await?;
            println!("✓ Pages written to {}", output.display());
        }

        Commands::Rotate {
            input,
            output,
            angle,
            pages,
        } => {
            let request = OperationRequest::Rotate {
                degrees: angle,
                pages,
            };
            runner.write(request, &[input], &output).await?;
            println!("✓ Successfully rotated pages {angle} degrees in {}", output.display());
        }

        Commands::Watermark {
            input,
            output,
            text,
            opacity,
            pages,
        } => {
            let request = OperationRequest::Watermark {
                text,
                opacity,
                pages,
            };
            runner.write(request, &[input], &output).await?;
            println!("✓ Watermark applied in {}", output.display());
        }

        Commands::Encrypt {
            input,
            output,
            user_password,
            owner_password,
        } => {
            let request = OperationRequest::Encrypt {
                user_password,
                owner_password,
            };
            runner.write(request, &[input], &output).await?;
            println!("✓ Encrypted PDF written to {}", output.display());
        }

        Commands::Decrypt {
            input,
            output,
            password,
        } => {
            runner
                .write(OperationRequest::Decrypt { password }, &[input], &output)
                .await?;
            println!("✓ Decrypted PDF written to {}", output.display());
        }

        Commands::Compress {
            input,
            output,
            quality,
        } => {
            runner
                .write(OperationRequest::Compress { quality }, &[input], &output)
                .await?;
            println!("✓ Compressed PDF written to {}", output.display());
        }

        Commands::ExtractText {
            input,
            output,
            pages,
        } => {
            let value = runner.data(OperationRequest::ExtractText { pages }, &input).await?;
            let text = render_text(&value);
            if let Some(output_path) = output {
                std::fs::write(&output_path, &text)
                    .with_context(|| format!("Failed to write {}", output_path.display()))?;
                println!("✓ Text extracted to: {}", output_path.display());
            } else {
                println!("{text}");
            }
        }

        Commands::Info { input } => {
            let value = runner.data(OperationRequest::ReadMetadata, &input).await?;
            println!("PDF Information for: {}", input.display());
            println!("==========================================");
            if let Some(pages) = value.get("pages") {
                println!("Pages: {pages}");
            }
            if let Some(metadata) = value.get("metadata").and_then(Value::as_object) {
                for (key, entry) in metadata {
                    let text = entry
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| entry.to_string());
                    println!("{key}: {text}");
                }
            }
        }

        Commands::Validate { input } => {
            let value = runner.data(OperationRequest::Validate, &input).await?;
            let status = value.get("status").and_then(Value::as_str).unwrap_or("unknown");
            let message = value.get("message").and_then(Value::as_str).unwrap_or("");
            if value.get("is_valid").and_then(Value::as_bool) == Some(true) {
                println!("✓ {}: {status} ({message})", input.display());
            } else {
                eprintln!("✗ {}: {message}", input.display());
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
