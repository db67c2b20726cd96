//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use observa_chat::{check_credentials, LLMConfig, LLMConfigUpdate, PromptTemplate};
use observa_core::ObservaConfig;
use observa_ingest::{
    extract_region_text, split_sections, BoundingBox, ExtractMode, PlainTextDocument,
};
use observa_runtime::{
    export, BatchSummary, PartialRender, ProcessObserver, Record, SectionProcessor, Session,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// US Letter in PDF points. Plain-text pages carry no geometry, so any box
/// covers the whole page.
const FULL_PAGE: BoundingBox = BoundingBox {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

pub struct ProcessArgs {
    pub file: PathBuf,
    pub page: Option<usize>,
    pub name: Option<String>,
    pub credentials: Option<PathBuf>,
}

impl ProcessArgs {
    pub fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut file = None;
        let mut page = None;
        let mut name = None;
        let mut credentials = None;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--page" => {
                    let value = iter.next().context("--page needs a page number")?;
                    let n: usize = value
                        .parse()
                        .with_context(|| format!("Invalid page number: {}", value))?;
                    if n == 0 {
                        bail!("Pages are numbered from 1");
                    }
                    page = Some(n);
                }
                "--name" => name = Some(iter.next().context("--name needs a value")?.clone()),
                "--credentials" => {
                    credentials = Some(PathBuf::from(
                        iter.next().context("--credentials needs a file")?,
                    ))
                }
                other if other.starts_with("--") => bail!("Unknown option: {}", other),
                other => {
                    if file.replace(PathBuf::from(other)).is_some() {
                        bail!("Only one input file may be given");
                    }
                }
            }
        }

        Ok(Self {
            file: file.context("Missing input file")?,
            page,
            name,
            credentials,
        })
    }

    fn document_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".into())
        })
    }
}

/// Prints progress to stderr as sections complete.
struct LoggingObserver {
    partials: usize,
}

impl ProcessObserver for LoggingObserver {
    fn on_section_start(&mut self, index: usize, total: usize, title: &str) {
        self.partials = 0;
        info!("Section {} ({}/{})", title, index + 1, total);
    }

    fn on_partial(&mut self, title: &str, partial: &PartialRender<'_>) {
        self.partials += 1;
        if let PartialRender::Structured(items) = partial {
            debug!("Section {}: {} items parsed so far", title, items.len());
        }
    }

    fn on_section_done(&mut self, title: &str, records: &[Record]) {
        if records.iter().any(Record::is_error) {
            warn!("Section {} produced an error record", title);
        } else {
            info!(
                "Section {}: {} record(s) from {} chunks",
                title,
                records.len(),
                self.partials
            );
        }
    }

    fn on_progress(&mut self, fraction: f64) {
        eprintln!("progress: {:>3.0}%", fraction * 100.0);
    }
}

fn load_text(file: &Path, page: Option<usize>) -> anyhow::Result<String> {
    let doc = PlainTextDocument::from_file(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mode = match page {
        Some(n) => ExtractMode::CurrentPage(n - 1),
        None => ExtractMode::AllPages,
    };
    Ok(extract_region_text(&doc, FULL_PAGE, mode))
}

pub fn split(file: &Path) -> anyhow::Result<()> {
    let text = load_text(file, None)?;
    let sections = split_sections(&text);
    if sections.is_empty() {
        println!("No observation sections found in {}", file.display());
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&sections)?);
    Ok(())
}

pub async fn process(config: ObservaConfig, args: ProcessArgs) -> anyhow::Result<()> {
    let text = load_text(&args.file, args.page)?;
    let sections = split_sections(&text);
    if sections.is_empty() {
        bail!("No observation sections found in {}", args.file.display());
    }
    info!("Found {} sections", sections.len());

    let session = Session::open(config)?;
    if let Some(path) = &args.credentials {
        let raw = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let status = session.install_credentials(&raw).await?;
        info!("Credentials loaded, provider: {:?}", status.active_provider);
    }

    let backend = Arc::new(session.completion_client()?);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; remaining sections will be marked as errors");
            let _ = cancel_tx.send(true);
        }
    });

    let processor = SectionProcessor::new(backend)
        .with_timeout(session.config().section_timeout())
        .with_cancellation(cancel_rx);
    let prompt = session.prompt();
    let mut observer = LoggingObserver { partials: 0 };
    let processed = processor
        .process_sections(&sections, &prompt, &mut observer)
        .await;

    let summary = BatchSummary::from_sections(&processed);
    let written = export::write_all(
        &session.config().data_paths.exports,
        &args.document_name(),
        &processed,
    )?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    for path in written {
        println!("{}", path.display());
    }

    session.teardown();
    Ok(())
}

pub fn prompt(config: &ObservaConfig, args: &[String]) -> anyhow::Result<()> {
    let prompt_file = &config.data_paths.prompt_file;
    match args.first().map(String::as_str) {
        None | Some("show") => {
            let template = config
                .custom_prompt()
                .and_then(|text| PromptTemplate::new(text).ok())
                .unwrap_or_default();
            println!("{}", template.as_str());
        }
        Some("set") => {
            let source = args.get(1).context("Usage: observa prompt set <file>")?;
            let text = std::fs::read_to_string(source)
                .with_context(|| format!("Failed to read {}", source))?;
            let template = PromptTemplate::new(text)?;
            std::fs::write(prompt_file, template.as_str())?;
            info!("Prompt saved to {}", prompt_file.display());
        }
        Some("reset") => {
            if prompt_file.exists() {
                std::fs::remove_file(prompt_file)?;
            }
            info!("Prompt restored to default");
        }
        Some(other) => bail!("Unknown prompt action: {}", other),
    }
    Ok(())
}

/// Apply a JSON config update (same keys as the status view) and save it.
pub fn configure(config: &ObservaConfig, update_file: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(update_file)
        .with_context(|| format!("Failed to read {}", update_file.display()))?;
    let update: LLMConfigUpdate = serde_json::from_str(&raw)?;

    let mut llm = LLMConfig::load(&config.data_paths.llm_config_file);
    llm.apply_update(&update);
    llm.save()?;

    println!("{}", serde_json::to_string_pretty(&llm.to_response())?);
    Ok(())
}

pub async fn status(config: &ObservaConfig, check: bool) -> anyhow::Result<()> {
    let llm = LLMConfig::load(&config.data_paths.llm_config_file);
    println!("{}", serde_json::to_string_pretty(&llm.to_response())?);

    if check {
        let Some(target) = llm.resolve_provider() else {
            bail!("No LLM provider configured");
        };
        check_credentials(&target).await?;
        println!("Credentials for {} are valid", target.provider);
    }
    Ok(())
}
