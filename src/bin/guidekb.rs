//! CLI binary for guidekb.
//!
//! A thin shim over the library crate: maps flags to the two config
//! structs, implements the console [`Operator`] for interactive curation,
//! and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use guidekb::{
    curate, load_or_build, Answer, CorpusStore, CurationConfig, FlowchartAction, IndexPaths,
    Margins, OpenAiEmbedder, Operator, PageAction, PdfPageConverter, PdfSource, RawAction,
    RetrievalConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Interactive page-by-page curation, starting at page 12
  guidekb curate guideline.pdf --start 12

  # Unattended flowchart conversion of a page range
  guidekb batch guideline.pdf --start 30 --end 58

  # Build (or refresh) the vector index from the curated corpus
  guidekb index --rebuild

  # Ask a question over the indexed corpus
  guidekb ask "What is the first-line therapy for stage II disease?"

  # Show the retrieved chunks alongside the answer
  guidekb ask --show-context -k 5 "Which drugs are conditioned on EGFR?"

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (vision, generation, embeddings)
  ANTHROPIC_API_KEY       Anthropic API key (vision, generation)
  EMBEDDING_API_KEY       Separate key for the embedding endpoint
  EMBEDDING_BASE_URL      OpenAI-compatible embeddings base URL
  EMBEDDING_MODEL         Embedding model (default text-embedding-3-small)
  EDITOR                  External editor for manual correction (default nano)
  GUIDEKB_CORPUS          Corpus file path (same as --corpus)
  GUIDEKB_INDEX_DIR       Index directory (same as --index-dir)

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Curate pages:    guidekb curate guideline.pdf
  3. Ask questions:   guidekb ask "..."
"#;

/// Curate scanned guideline PDFs and answer questions over the corpus.
#[derive(Parser, Debug)]
#[command(
    name = "guidekb",
    version,
    about = "Curate a knowledge base from guideline PDFs and query it",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Corpus file the curation tools append to and the index reads from.
    #[arg(long, global = true, env = "GUIDEKB_CORPUS", default_value = "corpus.txt")]
    corpus: PathBuf,

    /// Directory holding the two index artifacts (vectors.json, chunks.json).
    #[arg(long, global = true, env = "GUIDEKB_INDEX_DIR", default_value = "index")]
    index_dir: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "GUIDEKB_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "GUIDEKB_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive page-by-page curation of a PDF.
    Curate {
        /// PDF file to curate.
        pdf: PathBuf,

        /// First page to review (1-based).
        #[arg(long, default_value_t = 1)]
        start: usize,

        /// Vision provider: openai, anthropic, gemini, ollama.
        #[arg(long, env = "GUIDEKB_PROVIDER")]
        provider: Option<String>,

        /// Vision model identifier.
        #[arg(long, env = "GUIDEKB_MODEL")]
        model: Option<String>,

        /// External editor program (overrides $EDITOR).
        #[arg(long)]
        editor: Option<String>,
    },

    /// Unattended flowchart conversion of a contiguous page range.
    Batch {
        /// PDF file to convert.
        pdf: PathBuf,

        /// First page of the range (1-based).
        #[arg(long, default_value_t = 1)]
        start: usize,

        /// Last page of the range, inclusive. Clamped to the page count.
        #[arg(long, default_value_t = usize::MAX)]
        end: usize,

        /// Vision provider: openai, anthropic, gemini, ollama.
        #[arg(long, env = "GUIDEKB_PROVIDER")]
        provider: Option<String>,

        /// Vision model identifier.
        #[arg(long, env = "GUIDEKB_MODEL")]
        model: Option<String>,
    },

    /// Build or refresh the vector index from the curated corpus.
    Index {
        /// Discard any persisted index and rebuild from the corpus.
        #[arg(long)]
        rebuild: bool,

        /// Sliding-window size in words.
        #[arg(long, default_value_t = 600)]
        chunk_size: usize,

        /// Window overlap in words (must be smaller than the window).
        #[arg(long, default_value_t = 100)]
        chunk_overlap: usize,
    },

    /// Ask a question over the indexed corpus.
    Ask {
        /// The question.
        question: String,

        /// Number of nearest chunks to retrieve.
        #[arg(short = 'k', long, default_value_t = 10)]
        top_k: usize,

        /// Print the retrieved chunks before the answer.
        #[arg(long)]
        show_context: bool,

        /// Generation provider: openai, anthropic, gemini, ollama.
        #[arg(long, env = "GUIDEKB_PROVIDER")]
        provider: Option<String>,

        /// Generation model identifier.
        #[arg(long, env = "GUIDEKB_MODEL")]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Curate {
            ref pdf,
            start,
            ref provider,
            ref model,
            ref editor,
        } => run_curate(&cli, pdf, start, provider, model, editor).await,
        Command::Batch {
            ref pdf,
            start,
            end,
            ref provider,
            ref model,
        } => run_batch_cmd(&cli, pdf, start, end, provider, model).await,
        Command::Index {
            rebuild,
            chunk_size,
            chunk_overlap,
        } => run_index(&cli, rebuild, chunk_size, chunk_overlap).await,
        Command::Ask {
            ref question,
            top_k,
            show_context,
            ref provider,
            ref model,
        } => run_ask(&cli, question, top_k, show_context, provider, model).await,
    }
}

// ── Console operator ─────────────────────────────────────────────────────

/// Interactive operator over stdin/stdout.
struct ConsoleOperator;

impl ConsoleOperator {
    /// Prompt for a single lowercase command character.
    fn command(&self, prompt: &str) -> String {
        print!("{prompt} ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return "q".to_string();
        }
        let trimmed = line.trim().to_lowercase();
        if trimmed.is_empty() {
            // EOF on stdin ends the session rather than spinning.
            if line.is_empty() {
                return "q".to_string();
            }
        }
        trimmed
    }

    fn number(&self, prompt: &str, current: f32) -> f32 {
        loop {
            let input = self.command(&format!("{prompt} [{current}]:"));
            if input.is_empty() {
                return current;
            }
            match input.parse::<f32>() {
                Ok(v) if v >= 0.0 => return v,
                _ => println!("  {}", red("enter a non-negative number")),
            }
        }
    }
}

impl Operator for ConsoleOperator {
    fn page_action(&mut self, page: usize, total: usize) -> PageAction {
        println!();
        println!("{}", bold(&format!("── Page {page}/{total} ──")));
        loop {
            match self
                .command("[r]aw text  [f]lowchart  [s]kip  [q]uit >")
                .as_str()
            {
                "r" => return PageAction::Raw,
                "f" => return PageAction::Flowchart,
                "s" => return PageAction::Skip,
                "q" => return PageAction::Quit,
                other => println!("  {}", red(&format!("unknown command '{other}'"))),
            }
        }
    }

    fn raw_action(&mut self, margins: &Margins) -> RawAction {
        println!(
            "{}",
            dim(&format!(
                "margins: top {} bottom {} left {} right {}",
                margins.top, margins.bottom, margins.left, margins.right
            ))
        );
        loop {
            match self
                .command("[a]ccept  [m]argins  [e]dit  [r]e-extract  [s]kip  [q]uit >")
                .as_str()
            {
                "a" => return RawAction::Accept,
                "m" => {
                    let top = self.number("  top margin (pt)", margins.top);
                    let bottom = self.number("  bottom margin (pt)", margins.bottom);
                    let left = self.number("  left margin (pt)", margins.left);
                    let right = self.number("  right margin (pt)", margins.right);
                    return RawAction::AdjustMargins(Margins::new(left, top, right, bottom));
                }
                "e" => return RawAction::Edit,
                "r" => return RawAction::Reextract,
                "s" => return RawAction::SkipPage,
                "q" => return RawAction::QuitMode,
                other => println!("  {}", red(&format!("unknown command '{other}'"))),
            }
        }
    }

    fn flowchart_action(&mut self) -> FlowchartAction {
        loop {
            match self
                .command("[a]ccept  [e]dit  [r]etry  [s]kip  [q]uit >")
                .as_str()
            {
                "a" => return FlowchartAction::Accept,
                "e" => return FlowchartAction::Edit,
                "r" => return FlowchartAction::Retry,
                "s" => return FlowchartAction::SkipPage,
                "q" => return FlowchartAction::QuitMode,
                other => println!("  {}", red(&format!("unknown command '{other}'"))),
            }
        }
    }

    fn confirm_save(&mut self, preview: &str) -> bool {
        println!("{}", cyan("── edited text ──"));
        println!("{preview}");
        println!("{}", cyan("─────────────────"));
        loop {
            match self.command("save to corpus? [y/n] >").as_str() {
                "y" => return true,
                "n" => return false,
                other => println!("  {}", red(&format!("unknown command '{other}'"))),
            }
        }
    }

    fn show(&mut self, heading: &str, body: &str) {
        println!("{}", cyan(&format!("── {heading} ──")));
        println!("{body}");
    }
}

// ── Subcommands ──────────────────────────────────────────────────────────

fn curation_config(
    provider: &Option<String>,
    model: &Option<String>,
    editor: &Option<String>,
) -> Result<CurationConfig> {
    let mut builder = CurationConfig::builder();
    if let Some(name) = provider {
        builder = builder.provider_name(name.clone());
    }
    if let Some(m) = model {
        builder = builder.model(m.clone());
    }
    if let Some(e) = editor {
        builder = builder.editor(e.clone());
    }
    builder.build().context("Invalid curation configuration")
}

async fn run_curate(
    cli: &Cli,
    pdf: &PathBuf,
    start: usize,
    provider: &Option<String>,
    model: &Option<String>,
    editor: &Option<String>,
) -> Result<()> {
    let config = curation_config(provider, model, editor)?;
    let llm = curate::resolve_provider(&config).context("No vision provider available")?;
    let source = PdfSource::open(pdf)
        .await
        .with_context(|| format!("Failed to open {}", pdf.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} {} pages, corpus {}",
            cyan("◆"),
            bold(&source.page_count().to_string()),
            dim(&cli.corpus.display().to_string())
        );
    }

    let converter = PdfPageConverter::new(source, config.clone(), llm);
    let store = CorpusStore::new(&cli.corpus);
    let mut operator = ConsoleOperator;

    let stats = guidekb::CurationSession::new(&converter, &store, &mut operator, &config)
        .run(start)
        .await
        .context("Curation session failed")?;

    if !cli.quiet {
        eprintln!(
            "{} {} pages committed, {} skipped",
            green("✔"),
            bold(&stats.committed.to_string()),
            stats.skipped
        );
    }
    Ok(())
}

async fn run_batch_cmd(
    cli: &Cli,
    pdf: &PathBuf,
    start: usize,
    end: usize,
    provider: &Option<String>,
    model: &Option<String>,
) -> Result<()> {
    let config = curation_config(provider, model, &None)?;
    let llm = curate::resolve_provider(&config).context("No vision provider available")?;
    let source = PdfSource::open(pdf)
        .await
        .with_context(|| format!("Failed to open {}", pdf.display()))?;

    let total = source.page_count();
    let last = end.min(total);
    let converter = PdfPageConverter::new(source, config, llm);
    let store = CorpusStore::new(&cli.corpus);

    let bar = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(last.saturating_sub(start.max(1)) as u64 + 1);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    };

    let stats = curate::run_batch(&converter, &store, start, end, |page, err| {
        match err {
            None => bar.println(format!("  {} page {page}", green("✓"))),
            Some(e) => bar.println(format!("  {} page {page}: {e}", red("✗"))),
        }
        bar.inc(1);
    })
    .await
    .context("Batch conversion failed")?;
    bar.finish_and_clear();

    if !cli.quiet {
        if stats.failed == 0 {
            eprintln!(
                "{} {} pages converted",
                green("✔"),
                bold(&stats.committed.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages converted  ({} failed)",
                cyan("⚠"),
                bold(&stats.committed.to_string()),
                stats.committed + stats.failed,
                red(&stats.failed.to_string()),
            );
        }
    }
    Ok(())
}

fn retrieval_config(chunk_size: usize, chunk_overlap: usize, top_k: usize) -> Result<RetrievalConfig> {
    RetrievalConfig::builder()
        .chunk_size(chunk_size)
        .chunk_overlap(chunk_overlap)
        .top_k(top_k)
        .build()
        .context("Invalid retrieval configuration")
}

async fn load_index(
    cli: &Cli,
    config: &RetrievalConfig,
    embedder: &OpenAiEmbedder,
    force_rebuild: bool,
) -> Result<(guidekb::VectorIndex, bool)> {
    let corpus = CorpusStore::new(&cli.corpus)
        .load()
        .with_context(|| format!("Failed to read corpus {}", cli.corpus.display()))?;
    let paths = IndexPaths::in_dir(&cli.index_dir);

    let spinner = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let s = ProgressBar::new_spinner();
        s.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        s.set_prefix("Index");
        s.set_message("loading or embedding…");
        s.enable_steady_tick(Duration::from_millis(80));
        s
    };

    let result = load_or_build(&paths, &corpus, config, embedder, force_rebuild)
        .await
        .context("Index build failed");
    spinner.finish_and_clear();
    result
}

async fn run_index(cli: &Cli, rebuild: bool, chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    let config = retrieval_config(chunk_size, chunk_overlap, 10)?;
    let embedder = OpenAiEmbedder::from_env().context("No embedding endpoint configured")?;
    let (index, rebuilt) = load_index(cli, &config, &embedder, rebuild).await?;

    if !cli.quiet {
        eprintln!(
            "{} {} chunks, dimension {}  {}",
            green("✔"),
            bold(&index.len().to_string()),
            index.dimension(),
            dim(if rebuilt { "(rebuilt)" } else { "(loaded)" }),
        );
    }
    Ok(())
}

async fn run_ask(
    cli: &Cli,
    question: &str,
    top_k: usize,
    show_context: bool,
    provider: &Option<String>,
    model: &Option<String>,
) -> Result<()> {
    let config = retrieval_config(600, 100, top_k)?;
    let embedder = OpenAiEmbedder::from_env().context("No embedding endpoint configured")?;
    let (index, _) = load_index(cli, &config, &embedder, false).await?;

    let curation = curation_config(provider, model, &None)?;
    let llm = curate::resolve_provider(&curation).context("No generation provider available")?;

    let Answer { text, support } =
        guidekb::answer(question, &index, &embedder, &llm, &config)
            .await
            .context("Question answering failed")?;

    if show_context {
        for (chunk, dist) in &support {
            println!(
                "{}",
                cyan(&format!(
                    "── chunk {} (page {}, d² = {dist:.4}) ──",
                    chunk.id, chunk.page
                ))
            );
            println!("{}", chunk.text);
            println!();
        }
    }

    println!("{text}");
    Ok(())
}
