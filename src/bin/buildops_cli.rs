//!
//! buildops CLI binary
//! -------------------
//! Operator tool for poking the dashboard API through the same authenticated
//! client the dashboard uses: sign in, pick a tenant, issue requests, watch
//! token refresh happen. Runs one command with `-c`, otherwise starts a REPL.

use std::sync::Arc;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use buildops::cli::{execute, parse_command, HELP};
use buildops::config::{AuthMode, ClientConfig};
use buildops::session::{AuthSessionManager, Credentials, FileStorage, MemoryStorage, SessionStorage};
use buildops::HttpClient;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--api <url>] [--mode header|cookie] [--session-dir <dir>] [--user <u> --password <p>] [--tenant <id>] [-c \"<command>\"]\n\nFlags:\n  --api <url>            API base (default: $BUILDOPS_API_BASE)\n  --mode <mode>          header (bearer token, default) or cookie\n  --session-dir <dir>    keep session tokens in files under <dir> across runs; removed on logout (default: in memory)\n  --user/--password      sign in before running anything\n  --tenant <id>          select a tenant after sign-in\n  -c, --command <cmd>    run a single command and exit\n  -h, --help             show this help\n\n{HELP}"
    );
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("invalid log filter")?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "buildops_cli".to_string());
    let mut api: Option<String> = None;
    let mut mode: Option<AuthMode> = None;
    let mut session_dir: Option<String> = None;
    let mut user: Option<String> = None;
    let mut password: Option<String> = None;
    let mut tenant: Option<String> = None;
    let mut command: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        if flag == "-h" || flag == "--help" {
            print_usage(&program);
            return Ok(());
        }
        let Some(value) = args.get(i + 1).cloned() else {
            eprintln!("{} requires a value", flag);
            print_usage(&program);
            std::process::exit(2);
        };
        match flag {
            "--api" => api = Some(value),
            "--mode" => mode = Some(value.parse()?),
            "--session-dir" => session_dir = Some(value),
            "--user" => user = Some(value),
            "--password" => password = Some(value),
            "--tenant" => tenant = Some(value),
            "-c" | "--command" => command = Some(value),
            unk => {
                eprintln!("Unrecognized argument: {}", unk);
                print_usage(&program);
                std::process::exit(2);
            }
        }
        i += 2;
    }

    // environment first, flags on top
    let mut config = ClientConfig::from_env_with_base(api).context("invalid configuration (pass --api or set BUILDOPS_API_BASE)")?;
    if let Some(m) = mode { config = config.with_auth_mode(m); }
    if let Some(dir) = session_dir { config = config.with_session_dir(dir); }

    let storage: Arc<dyn SessionStorage> = match &config.session_dir {
        Some(dir) => Arc::new(FileStorage::new(dir)),
        None => Arc::new(MemoryStorage::new()),
    };
    info!(target: "buildops", "buildops cli: api={} mode={}", config.api_base, config.auth_mode.as_str());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;
    let client = HttpClient::with_storage(config, storage)?;
    let session = AuthSessionManager::new(client);

    if let Some(claims) = session.bootstrap() {
        println!("resumed session for {}", claims.user_id);
    }
    if let (Some(u), Some(p)) = (user, password) {
        rt.block_on(session.login(&Credentials::new(u, p))).context("sign-in failed")?;
    }
    if let Some(t) = tenant {
        session.switch_tenant(&t);
    }

    if let Some(line) = command {
        let cmd = parse_command(&line)?;
        rt.block_on(execute(&session, cmd))?;
        return Ok(());
    }
    run_repl(&rt, &session)
}

fn run_repl(rt: &tokio::runtime::Runtime, session: &AuthSessionManager) -> Result<()> {
    let mut editor = DefaultEditor::new().context("failed to initialise line editor")?;
    println!("buildops interpreter. Type 'help' for commands.");
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() { continue; }
        let _ = editor.add_history_entry(line.as_str());
        let cmd = match parse_command(&line) {
            Ok(cmd) => cmd,
            Err(e) => { eprintln!("{}", e); continue; }
        };
        match rt.block_on(execute(session, cmd)) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("error: {:#}", e),
        }
    }
    Ok(())
}
