use std::env;
use std::io;
use std::io::BufRead;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use concierge_core::persistence::FileStorage;
use concierge_core::store::WidgetStore;
use concierge_core::ModuleAction;
use concierge_core::ProductSummary;
use concierge_exec::Collaborators;
use concierge_exec::Concierge;
use concierge_exec::HttpSupportBackend;
use concierge_exec::OfflineBackend;
use concierge_exec::SimulatedIntentExecutor;
use concierge_exec::SupportBackend;
use concierge_exec::TracingAnalytics;
use serde_json::json;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

mod config;
mod host;
mod render;

use config::load_config;
use host::ConsoleCart;
use host::TerminalHost;
use render::Transcript;

struct Options {
    config: Option<PathBuf>,
    data_dir: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let Some(options) = parse_args(env::args().skip(1).collect())? else {
        return Ok(());
    };
    init_tracing();

    let config = load_config(options.config.as_deref())?;
    let data_dir = options.data_dir.unwrap_or_else(config::default_data_dir);
    let store = WidgetStore::load(
        Box::new(FileStorage::open(data_dir.join("session"))?),
        Box::new(FileStorage::open(data_dir.join("local"))?),
    );

    let backend: Arc<dyn SupportBackend> = match HttpSupportBackend::from_config(&config.backend)? {
        Some(backend) => Arc::new(backend),
        None => {
            tracing::info!("no backend.base_url configured; shortlist sync runs offline");
            Arc::new(OfflineBackend)
        }
    };
    let concierge = Concierge::new(
        store,
        &config,
        Collaborators {
            executor: Arc::new(SimulatedIntentExecutor),
            cart: Arc::new(ConsoleCart),
            analytics: Arc::new(TracingAnalytics),
            host: Arc::new(TerminalHost),
            backend,
        },
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(repl(&concierge))
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, Box<dyn std::error::Error>> {
    let mut options = Options {
        config: None,
        data_dir: None,
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(None);
            }
            "--version" | "-V" | "version" => {
                println!("concierge {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "--config" => {
                let Some(value) = args.get(i + 1) else {
                    return Err("--config requires a path".into());
                };
                options.config = Some(PathBuf::from(value));
                i += 2;
            }
            "--data-dir" => {
                let Some(value) = args.get(i + 1) else {
                    return Err("--data-dir requires a path".into());
                };
                options.data_dir = Some(PathBuf::from(value));
                i += 2;
            }
            other => {
                return Err(format!("unsupported argument: {other}").into());
            }
        }
    }
    Ok(Some(options))
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("concierge=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

enum Command {
    Say(String),
    Open,
    Close,
    Toggle,
    Filters(Value),
    Action(ModuleAction),
    Reset,
    State,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if !line.starts_with('/') {
        return Ok(Command::Say(line.to_string()));
    }
    let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let parse_json = |raw: &str| -> Result<Value, String> {
        serde_json::from_str(raw).map_err(|err| format!("invalid json: {err}"))
    };
    match head {
        "/open" => Ok(Command::Open),
        "/close" => Ok(Command::Close),
        "/toggle" => Ok(Command::Toggle),
        "/reset" => Ok(Command::Reset),
        "/state" => Ok(Command::State),
        "/help" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        "/filters" => parse_json(rest).map(Command::Filters),
        "/action" => {
            let raw = parse_json(rest)?;
            serde_json::from_value(raw)
                .map(Command::Action)
                .map_err(|err| format!("invalid module action: {err}"))
        }
        "/shortlist" => {
            let (verb, arg) = rest.split_once(' ').unwrap_or((rest, ""));
            let arg = arg.trim();
            let action = match verb {
                "add" => {
                    let product: ProductSummary = serde_json::from_value(parse_json(arg)?)
                        .map_err(|err| format!("invalid product: {err}"))?;
                    ModuleAction::ShortlistAdd { product }
                }
                "remove" if !arg.is_empty() => ModuleAction::ShortlistRemove {
                    id: arg.to_string(),
                },
                "clear" => ModuleAction::ShortlistClear,
                "share" => ModuleAction::ShortlistShare,
                "checkout" => ModuleAction::ShortlistCheckout,
                _ => return Err("usage: /shortlist add <json>|remove <id>|clear|share|checkout".into()),
            };
            Ok(Command::Action(action))
        }
        other => Err(format!("unknown command: {other} (try /help)")),
    }
}

async fn repl(concierge: &Concierge) -> Result<(), Box<dyn std::error::Error>> {
    let mut transcript = Transcript::default();
    let state = concierge.state();
    println!(
        "concierge {} (session {}, {} messages restored). Type /help for commands.",
        env!("CARGO_PKG_VERSION"),
        state.session.id,
        state.messages.len()
    );
    transcript.mark_all(&state);

    let stdin = io::stdin();
    loop {
        print!("you> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("  {message}");
                continue;
            }
        };
        let frames = concierge.frames_requested();
        match command {
            Command::Say(text) => concierge.submit_text(&text).await,
            Command::Open => concierge.open(),
            Command::Close => concierge.close(),
            Command::Toggle => concierge.toggle(),
            Command::Filters(filters) => concierge.set_filters(filters).await,
            Command::Action(ModuleAction::ShortlistAdd { product }) => {
                concierge.add_to_shortlist(product).await;
            }
            Command::Action(action) => {
                let origin = concierge.state().session.last_intent;
                concierge.handle_module_action(action, origin).await;
            }
            Command::Reset => {
                concierge.reset();
                transcript.clear();
                println!("  started session {}", concierge.state().session.id);
            }
            Command::State => print_state(concierge)?,
            Command::Help => print_commands(),
            Command::Quit => break,
        }

        if concierge.frames_requested() == frames {
            continue;
        }
        for rendered in transcript.render_new(&concierge.state()) {
            println!("{rendered}");
        }
    }
    Ok(())
}

fn print_state(concierge: &Concierge) -> Result<(), serde_json::Error> {
    let state = concierge.state();
    let summary = json!({
        "isOpen": state.is_open,
        "isProcessing": state.is_processing,
        "messages": state.messages.len(),
        "misses": concierge.miss_count(),
        "session": state.session,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn print_commands() {
    println!("  <text>                      ask the concierge");
    println!("  /open | /close | /toggle    widget visibility");
    println!("  /filters <json>             search with filters");
    println!("  /shortlist add <json>       save a product");
    println!("  /shortlist remove <id>");
    println!("  /shortlist clear|share|checkout");
    println!("  /action <json>              raw module action {{\"type\", \"data\"}}");
    println!("  /reset                      start a new session");
    println!("  /state                      print widget state");
    println!("  /quit");
}

fn print_help() {
    println!("concierge {}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  concierge [--config PATH] [--data-dir PATH]");
    println!("  concierge --help");
    println!("  concierge --version");
}
