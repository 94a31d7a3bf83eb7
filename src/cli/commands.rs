//! CLI command handlers.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;

use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use log::{debug, info};
use serde::Serialize;

use super::args::{Args, Commands};
use super::report;
use crate::app::{probe_vpn_status, App};
use crate::auth::{PortalIdentity, SessionManager};
use crate::config::{self, Config, Overrides};
use crate::constants;
use crate::core::downloader::download_config;
use crate::core::health::check_server_health;
use crate::core::interfaces::{AddressDiscovery, InterfaceProbe, SystemCandidateSource};
use crate::core::telemetry::fetch_server_observed;
use crate::core::transport::HttpTransport;
use crate::core::DiagnosticsEngine;
use crate::error::DiagnosticsError;
use crate::state::{
    DiagnosticsReport, NetworkMetrics, ServerHealth, ServerObservedStatus, SessionState,
    SessionStore, VpnStatus,
};

/// Resolved settings shared by every command.
struct Context {
    config: Config,
    config_dir: PathBuf,
    json: bool,
    transport: HttpTransport,
}

impl Context {
    fn from_args(args: &Args) -> Result<Self> {
        let config_path = args
            .config
            .clone()
            .unwrap_or_else(config::default_config_path);
        let config_dir = config_path
            .parent()
            .map_or_else(config::app_config_dir, std::path::Path::to_path_buf);

        let health_interval_secs = match &args.command {
            Some(Commands::Watch { health_interval }) => *health_interval,
            _ => None,
        };
        let config = Config::load(&config_path)?.apply_overrides(Overrides {
            portal_url: args.portal_url.clone(),
            vpn_network: args.vpn_network.clone(),
            health_interval_secs,
        })?;
        debug!(
            "CLI: portal {} (vpn network {})",
            config.portal_url, config.vpn_network
        );

        let transport = HttpTransport::new(config.request_timeout())
            .wrap_err("failed to initialise HTTP client")?;

        Ok(Self {
            config,
            config_dir,
            json: args.json,
            transport,
        })
    }

    fn session_manager(&self) -> SessionManager {
        let provider = Arc::new(PortalIdentity::new(
            self.transport.clone(),
            self.config.portal_url.clone(),
        ));
        let manager = SessionManager::new(provider, SessionStore::new())
            .with_session_file(config::session_file_path(&self.config_dir));
        manager.restore();
        manager
    }

    /// Current session, refreshed against the portal; errors when signed out.
    fn require_session(&self, manager: &SessionManager) -> Result<SessionState> {
        let session = manager.refresh();
        if !session.authenticated {
            bail!(constants::CLI_MSG_NOT_SIGNED_IN);
        }
        Ok(session)
    }

    fn discovery(&self) -> InterfaceProbe<SystemCandidateSource> {
        InterfaceProbe::new(SystemCandidateSource, self.config.rendezvous_server.clone())
    }
}

/// One-shot status output for `--json`.
#[derive(Serialize)]
struct StatusOutput<'a> {
    vpn: &'a VpnStatus,
    server: &'a ServerHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_observed: Option<&'a ServerObservedStatus>,
}

/// Snapshot line emitted by `watch --json`.
#[derive(Serialize)]
struct WatchOutput<'a> {
    authenticated: bool,
    vpn: &'a VpnStatus,
    server: &'a ServerHealth,
    metrics: &'a NetworkMetrics,
    diagnostics: &'a DiagnosticsReport,
}

/// Runs the command selected on the command line.
///
/// # Errors
///
/// Returns configuration, session, and command failures for display.
pub fn dispatch(args: Args) -> Result<()> {
    let ctx = Context::from_args(&args)?;

    match args.command.unwrap_or(Commands::Status) {
        Commands::Status => status(&ctx),
        Commands::Diagnose => diagnose(&ctx),
        Commands::Watch { .. } => watch(&ctx),
        Commands::Login { credential } => login(&ctx, &credential),
        Commands::Logout => {
            ctx.session_manager().sign_out();
            println!("Signed out.");
            Ok(())
        }
        Commands::Whoami => whoami(&ctx),
        Commands::DownloadConfig { dir } => download(&ctx, dir),
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

fn status(ctx: &Context) -> Result<()> {
    let manager = ctx.session_manager();
    ctx.require_session(&manager)?;

    let discovery = ctx.discovery();
    let prefix = ctx.config.vpn_prefix();

    // The interface probe and the portal requests are independent.
    let (vpn, health, observed) = thread::scope(|s| {
        let vpn = s.spawn(|| probe_vpn_status(&discovery, &prefix));
        let health = check_server_health(&ctx.transport, &ctx.config.portal_url);
        let observed = fetch_server_observed(&ctx.transport, &ctx.config.portal_url);
        (vpn.join(), health, observed)
    });
    let Ok(vpn) = vpn else {
        bail!("VPN status probe panicked");
    };

    if ctx.json {
        return print_json(
            &StatusOutput {
                vpn: &vpn,
                server: &health,
                server_observed: observed.as_ref(),
            },
            true,
        );
    }
    print!("{}", report::render_status(&vpn, &health, observed.as_ref()));
    Ok(())
}

fn diagnose(ctx: &Context) -> Result<()> {
    let manager = ctx.session_manager();
    ctx.require_session(&manager)?;

    if !ctx.json {
        println!("Running diagnostics against {}...\n", ctx.config.portal_url);
    }
    let engine = DiagnosticsEngine::new(
        Arc::new(ctx.transport.clone()),
        ctx.config.portal_url.clone(),
    );
    let report = engine.run_diagnostics()?;

    if ctx.json {
        return print_json(&report, true);
    }
    print!("{}", report::render_diagnostics(&report));
    Ok(())
}

fn watch(ctx: &Context) -> Result<()> {
    let manager = Arc::new(ctx.session_manager());
    manager.refresh();
    let store = manager.store().clone();
    let discovery: Arc<dyn AddressDiscovery> = Arc::new(ctx.discovery());

    let mut app = App::new(
        ctx.config.clone(),
        store,
        Arc::new(ctx.transport.clone()),
        discovery,
    )
    .with_session_manager(manager);

    if !ctx.json {
        eprintln!("{}", constants::CLI_MSG_WATCH_HINT);
    }
    app.start();
    if !app.authenticated {
        eprintln!("{}", constants::CLI_MSG_NOT_SIGNED_IN);
    }
    info!("CLI: watching {}", ctx.config.portal_url);

    let input = spawn_input_reader();
    let mut last_printed = String::new();
    loop {
        let mut changed = app.process_external();
        for line in input.try_iter() {
            match handle_watch_input(&mut app, &line) {
                WatchInput::Ignored => {}
                WatchInput::Started => changed = true,
                WatchInput::Refused(notice) => eprintln!("{notice}"),
            }
        }
        if changed {
            let frame = if ctx.json {
                serde_json::to_string(&WatchOutput {
                    authenticated: app.authenticated,
                    vpn: &app.vpn,
                    server: &app.health,
                    metrics: &app.metrics,
                    diagnostics: &app.diagnostics,
                })?
            } else {
                render_watch_frame(&app)
            };
            if frame != last_printed {
                println!("{frame}");
                last_printed = frame;
            }
        }
        thread::sleep(constants::WATCH_TICK_RATE);
    }
}

/// What a line typed during `watch` did.
#[derive(Debug, PartialEq, Eq)]
enum WatchInput {
    Ignored,
    Started,
    Refused(&'static str),
}

/// Enter (an empty line) asks for a diagnostics re-run.
fn handle_watch_input(app: &mut App, line: &str) -> WatchInput {
    if !line.trim().is_empty() {
        return WatchInput::Ignored;
    }
    match app.request_diagnostics() {
        Ok(()) => {
            debug!("CLI: manual diagnostics run started");
            WatchInput::Started
        }
        Err(DiagnosticsError::AlreadyRunning) => {
            WatchInput::Refused(constants::CLI_MSG_DIAGNOSTICS_RUNNING)
        }
        Err(DiagnosticsError::NotAuthenticated) => {
            WatchInput::Refused(constants::CLI_MSG_NOT_SIGNED_IN)
        }
    }
}

/// Forwards stdin lines until stdin closes or the receiver is gone.
fn spawn_input_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines().map_while(std::result::Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn render_watch_frame(app: &App) -> String {
    if !app.authenticated {
        return constants::CLI_MSG_NOT_SIGNED_IN.to_string();
    }
    format!(
        "{}{}\n{}",
        report::render_status(&app.vpn, &app.health, None),
        report::render_metrics(&app.metrics),
        report::render_diagnostics(&app.diagnostics)
    )
}

fn login(ctx: &Context, credential: &str) -> Result<()> {
    let manager = ctx.session_manager();
    let session = manager.sign_in(credential)?;
    if ctx.json {
        return print_json(&session, true);
    }
    println!("{}", report::render_session(&session));
    Ok(())
}

fn whoami(ctx: &Context) -> Result<()> {
    let manager = ctx.session_manager();
    let session = manager.refresh();
    if ctx.json {
        return print_json(&session, true);
    }
    println!("{}", report::render_session(&session));
    Ok(())
}

fn download(ctx: &Context, dir: Option<PathBuf>) -> Result<()> {
    let manager = ctx.session_manager();
    let session = ctx.require_session(&manager)?;
    let dest = dir.unwrap_or_else(|| ctx.config.download_dir());

    if !ctx.json {
        println!("{}", constants::CLI_MSG_DOWNLOADING);
    }
    let path = download_config(
        ctx.transport.client(),
        &ctx.config.portal_url,
        &session,
        &dest,
    )?;

    if ctx.json {
        return print_json(&serde_json::json!({ "path": path }), true);
    }
    println!("{}{}", constants::CLI_MSG_DOWNLOAD_SAVED, path.display());
    Ok(())
}
