//! `alvara` - licensing audit from the command line

use alvara_agent::{
    AgentMode, AgentState, AssistantConfig, AuditAssistant, GeminiClient, Lens, SaveAuditTool,
    ToolTable, TurnEvent, TurnInput,
};
use alvara_record::{
    parse_audit_markdown, AuditStateStore, CaseId, CaseKind, CockpitStatus, JsonFileBackend,
    MemoryDirectory, ParsedAudit, StepName,
};
use alvara_retrieval::{normalize_query, PostgrestCorpus, RetrievalClient, RetryScheduler};
use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("alvara")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Licensing audit assistant")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory of the audit record store"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("normalize")
                .about("Show the retrieval query for a question")
                .arg(Arg::new("text").required(true)),
        )
        .subcommand(
            Command::new("parse")
                .about("Parse a markdown audit report into cockpit items")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(Arg::new("case").long("case").help("Save the cockpit into this case"))
                .arg(
                    Arg::new("reviewed")
                        .long("reviewed")
                        .action(ArgAction::SetTrue)
                        .requires("case")
                        .help("Mark the cockpit as reviewed"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("ask")
                .about("Run one assistant turn, streaming the answer")
                .arg(Arg::new("text").required(true))
                .arg(
                    Arg::new("lens")
                        .long("lens")
                        .value_parser(|s: &str| s.parse::<Lens>())
                        .help("LOTEAMENTO, REFORMA, EDIFICACOES or COMERCIAL"),
                )
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .default_value("LICENSING")
                        .value_parser(|s: &str| s.parse::<AgentMode>())
                        .help("LICENSING or GENERAL"),
                ),
        )
        .subcommand(
            Command::new("laws")
                .about("List the regulation catalog"),
        )
        .subcommand(
            Command::new("start")
                .about("Start the audit wizard for a case")
                .arg(Arg::new("case").required(true))
                .arg(
                    Arg::new("kind")
                        .long("kind")
                        .default_value("licenca")
                        .help("Process type label, e.g. \"Habite-se\""),
                ),
        )
        .subcommand(
            Command::new("advance")
                .about("Validate a wizard step and move forward")
                .arg(Arg::new("case").required(true))
                .arg(
                    Arg::new("step")
                        .required(true)
                        .help("preliminary, documentation, cross_reference, responsibility"),
                )
                .arg(
                    Arg::new("next")
                        .required(true)
                        .value_parser(value_parser!(u8)),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<AssistantConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => AssistantConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AssistantConfig::new().with_env_overrides(),
    };
    if let Some(dir) = matches.get_one::<PathBuf>("store") {
        config = config.with_store_dir(dir);
    }
    Ok(config)
}

async fn open_store(dir: &Path) -> anyhow::Result<AuditStateStore> {
    let backend = JsonFileBackend::open(dir)
        .await
        .with_context(|| format!("opening record store {}", dir.display()))?;
    Ok(AuditStateStore::new(Arc::new(backend)))
}

fn retrieval_client(config: &AssistantConfig) -> anyhow::Result<Option<RetrievalClient>> {
    let (Some(url), Some(key)) = (&config.corpus.url, &config.corpus.anon_key) else {
        return Ok(None);
    };
    let corpus = PostgrestCorpus::new(url.clone(), key.clone())?.with_table(config.corpus.table.clone());
    Ok(Some(
        RetrievalClient::new(Arc::new(corpus))
            .with_limit(config.retrieval_limit)
            .with_retry(RetryScheduler::new(config.retry)),
    ))
}

fn status_mark(status: CockpitStatus) -> &'static str {
    match status {
        CockpitStatus::Ok => "OK",
        CockpitStatus::Error => "ERRO",
        CockpitStatus::Warning => "ATENÇÃO",
        CockpitStatus::Pending => "PENDENTE",
    }
}

fn render_cockpit(parsed: &ParsedAudit) -> String {
    let mut out = String::new();
    let header = &parsed.case_header;
    out.push_str(&format!("Protocolo:   {}\n", header.protocol));
    out.push_str(&format!("Interessado: {}\n", header.interested_party));
    out.push_str(&format!("Assunto:     {}\n", header.subject));
    for section in &parsed.sections {
        out.push_str(&format!("\n## {}\n", section.title));
        for item in &section.items {
            out.push_str(&format!("  [{:<8}] {}\n", status_mark(item.status), item.text));
        }
    }
    let tally = parsed.tally();
    out.push_str(&format!(
        "\n{} itens: {} ok, {} erro, {} atenção, {} pendente\n",
        parsed.item_count(),
        tally.ok,
        tally.error,
        tally.warning,
        tally.pending
    ));
    out
}

async fn run_parse(args: &ArgMatches, config: &AssistantConfig) -> anyhow::Result<()> {
    let Some(path) = args.get_one::<PathBuf>("file") else {
        bail!("missing report file");
    };
    let markdown = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let parsed = parse_audit_markdown(&markdown);

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&parsed)?);
    } else {
        print!("{}", render_cockpit(&parsed));
    }

    if let Some(case) = args.get_one::<String>("case") {
        let store = open_store(&config.store_dir).await?;
        let case_id = CaseId::new(case.as_str());
        store.merge_cockpit(&case_id, parsed).await?;
        if args.get_flag("reviewed") {
            store.mark_step_validated(&case_id, StepName::CockpitReviewed).await?;
        }
        info!(case_id = %case_id, "cockpit saved");
    }
    Ok(())
}

async fn run_ask(args: &ArgMatches, config: AssistantConfig) -> anyhow::Result<()> {
    let Some(text) = args.get_one::<String>("text") else {
        bail!("missing question");
    };
    let mode = args.get_one::<AgentMode>("mode").copied().unwrap_or_default();
    let mut input = TurnInput::licensing(text.clone()).with_mode(mode);
    if let Some(lens) = args.get_one::<Lens>("lens") {
        input = input.with_lens(*lens);
    }

    let model = Arc::new(GeminiClient::from_config(&config)?);
    let store = Arc::new(open_store(&config.store_dir).await?);
    let directory = Arc::new(MemoryDirectory::with_cases(config.cases.clone()));
    let tools = ToolTable::new().with_handler(Arc::new(SaveAuditTool::new(directory, store)));

    let mut assistant = AuditAssistant::new(model, &config).with_tools(tools);
    match retrieval_client(&config)? {
        Some(client) => assistant = assistant.with_retrieval(Arc::new(client)),
        None => warn!("regulation corpus not configured, answering without legislation"),
    }

    let (events, mut rx) = mpsc::channel(64);
    let turn = tokio::spawn(async move { assistant.process_turn(input, events).await });

    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::Chunk(chunk) => {
                write!(stdout, "{chunk}")?;
                stdout.flush()?;
            }
            TurnEvent::Sources(sources) => {
                for source in sources {
                    eprintln!("fonte: {} ({})", source.title, source.category);
                }
            }
        }
    }
    writeln!(stdout)?;

    let report = turn.await?;
    if let Some(tool) = &report.tool {
        info!(tool = %tool.call.name, result = %tool.result, "tool executed");
    }
    if report.state == AgentState::Error {
        bail!("turn ended in error");
    }
    Ok(())
}

async fn run_laws(config: &AssistantConfig) -> anyhow::Result<()> {
    let Some(client) = retrieval_client(config)? else {
        bail!("set SUPABASE_URL and SUPABASE_ANON_KEY to list the catalog");
    };
    for law in client.list_laws().await?.iter() {
        println!("{:<14} {}", law.category.to_string(), law.name);
    }
    Ok(())
}

async fn run_start(args: &ArgMatches, config: &AssistantConfig) -> anyhow::Result<()> {
    let (Some(case), Some(kind)) = (args.get_one::<String>("case"), args.get_one::<String>("kind"))
    else {
        bail!("missing case");
    };
    let store = open_store(&config.store_dir).await?;
    let record = store
        .start_audit(&CaseId::new(case.as_str()), CaseKind::from_process_type(kind))
        .await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn run_advance(args: &ArgMatches, config: &AssistantConfig) -> anyhow::Result<()> {
    let (Some(case), Some(step), Some(next)) = (
        args.get_one::<String>("case"),
        args.get_one::<String>("step"),
        args.get_one::<u8>("next"),
    ) else {
        bail!("missing arguments");
    };
    let step: StepName = step.parse()?;
    let store = open_store(&config.store_dir).await?;
    let record = store
        .advance_step(&CaseId::new(case.as_str()), step, *next)
        .await?;
    println!("wizard_step = {}", record.wizard_step);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    match matches.subcommand() {
        Some(("normalize", args)) => {
            if let Some(text) = args.get_one::<String>("text") {
                println!("{}", normalize_query(text));
            }
            Ok(())
        }
        Some(("parse", args)) => run_parse(args, &load_config(&matches)?).await,
        Some(("ask", args)) => run_ask(args, load_config(&matches)?).await,
        Some(("laws", _)) => run_laws(&load_config(&matches)?).await,
        Some(("start", args)) => run_start(args, &load_config(&matches)?).await,
        Some(("advance", args)) => run_advance(args, &load_config(&matches)?).await,
        Some((other, _)) => bail!("unknown command: {other}"),
        None => bail!("a command is required"),
    }
}
