mod controller;
mod view;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueHint};
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use play_session::auth::{OAuthRefresher, SCOPES};
use play_session::config::{Config, DEFAULT_CLIENT_ID, DEFAULT_DEVICE_NAME, DEFAULT_REDIRECT_URI};
use play_session::gate::StatusLineLauncher;
use play_session::player::librespot::{device_id_for, LibrespotLoader};
use play_session::player::SdkGuard;
use play_session::session::{PlayRoute, Session};
use play_session::token::SessionTokenProvider;
use play_session::web_api::WebApi;

use controller::AppController;
use view::{AppView, Notice};

const TOKEN_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// OAuth client id of the Spotify application
    #[arg(long, env = "PLAY_SESSION_CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    client_id: String,

    /// OAuth redirect URI registered for the application
    #[arg(long, env = "PLAY_SESSION_REDIRECT_URI", default_value = DEFAULT_REDIRECT_URI)]
    redirect_uri: String,

    /// Name of the playback device as it appears to Spotify Connect clients
    #[arg(long, env = "PLAY_SESSION_DEVICE_NAME", default_value = DEFAULT_DEVICE_NAME)]
    device_name: String,

    /// Credential and audio cache directory
    #[arg(long, env = "PLAY_SESSION_CACHE_DIR", value_hint = ValueHint::DirPath, default_value = ".cache")]
    cache_dir: PathBuf,

    /// Log directory
    #[arg(long, env = "PLAY_SESSION_LOG_DIR", value_hint = ValueHint::DirPath, default_value = ".logs")]
    log_dir: PathBuf,

    /// Give up bringing the device up after this many seconds
    #[arg(long, env = "PLAY_SESSION_INIT_TIMEOUT_SECS", default_value_t = 15)]
    init_timeout_secs: u64,

    /// Give up on a single playback command after this many seconds
    #[arg(long, env = "PLAY_SESSION_COMMAND_TIMEOUT_SECS", default_value_t = 10)]
    command_timeout_secs: u64,

    /// Progress clock and redraw interval in milliseconds
    #[arg(long, env = "PLAY_SESSION_TICK_MS", default_value_t = 250)]
    tick_ms: u64,

    /// Spotify URI or share link to start playing after sign-in
    #[arg(long, value_name = "URI")]
    play: Option<String>,

    /// Discard the cached refresh token and sign in through the browser
    #[arg(long, default_value_t = false)]
    fresh_login: bool,
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Config {
            client_id: args.client_id.clone(),
            redirect_uri: args.redirect_uri.clone(),
            device_name: args.device_name.clone(),
            cache_dir: args.cache_dir.clone(),
            log_dir: args.log_dir.clone(),
            init_timeout: Duration::from_secs(args.init_timeout_secs),
            command_timeout: Duration::from_secs(args.command_timeout_secs),
            tick: Duration::from_millis(args.tick_ms.max(10)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from(&args);

    let _log_guard = match play_session::logging::init_logging(&config.log_dir) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("=== Play Session Starting ===");

    // Step 1: credentials
    let refresher = Arc::new(OAuthRefresher::new(&config));
    if args.fresh_login {
        refresher.forget();
    }
    let signed_in = refresher.sign_in().await?;
    let tokens = Arc::new(SessionTokenProvider::new(refresher.clone()));
    tokens
        .sign_in(signed_in.access_token, signed_in.refresh_token)
        .await;

    // Step 2: session core
    let api = Arc::new(WebApi::new(tokens.clone(), SCOPES));
    let loader = LibrespotLoader::new(device_id_for(&config.device_name), Some(config.cache_dir.clone()));
    let sdk_guard = Arc::new(SdkGuard::new(loader));
    let launcher = Arc::new(StatusLineLauncher::default());
    let session = Arc::new(Session::new(
        &config,
        tokens.clone(),
        api,
        sdk_guard,
        launcher.clone(),
    ));

    let mut controller = AppController::new(session.clone(), launcher, config.device_name.clone());

    // Bring the device up in the background so the screen shows "connecting"
    let (signed_in_tx, signed_in_rx) = tokio::sync::oneshot::channel();
    {
        let session = session.clone();
        let play = args.play.clone();
        tokio::spawn(async move {
            let result = sign_in_and_play(&session, play.as_deref()).await;
            let _ = signed_in_tx.send(result);
        });
    }

    // Keep the credential fresh while the screen is up
    {
        let tokens = tokens.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TOKEN_CHECK_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = tokens.refresh_if_needed().await {
                    tracing::warn!(error = %e, "Token refresh check failed");
                }
            }
        });
    }

    tracing::info!("Starting TUI...");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut controller, signed_in_rx, config.tick).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = ?err, "Application error");
    }

    session.sign_out().await;
    tracing::info!("Play Session shutting down");
    Ok(())
}

async fn sign_in_and_play(session: &Session, play: Option<&str>) -> Result<(), String> {
    if let Err(e) = session.sign_in().await {
        tracing::error!(error = %e, "Sign-in failed");
        return Err(e.user_message());
    }
    let Some(uri) = play else {
        return Ok(());
    };
    match session.play_or_handoff(uri).await {
        Ok(PlayRoute::Streamed(outcome)) => {
            tracing::info!(uri, outcome = ?outcome, "Started playback");
            Ok(())
        }
        Ok(PlayRoute::HandedOff { web_url }) => {
            tracing::info!(uri, url = %web_url, "Playback handed off");
            Ok(())
        }
        Err(e) => Err(e.user_message()),
    }
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    controller: &mut AppController,
    mut signed_in: tokio::sync::oneshot::Receiver<Result<(), String>>,
    tick: Duration,
) -> io::Result<()> {
    let mut sign_in_pending = true;

    loop {
        if sign_in_pending {
            match signed_in.try_recv() {
                Ok(Ok(())) => sign_in_pending = false,
                Ok(Err(message)) => {
                    sign_in_pending = false;
                    controller.set_notice(Notice::Error(message));
                }
                Err(tokio::sync::oneshot::error::TryRecvError::Empty) => {}
                Err(tokio::sync::oneshot::error::TryRecvError::Closed) => sign_in_pending = false,
            }
        }

        let view = controller.view().await;
        terminal.draw(|f| AppView::render(f, &view))?;

        if event::poll(tick)? {
            if let Event::Key(key) = event::read()? {
                controller.handle_key_event(key).await;
            }
        }

        if controller.should_quit() {
            break;
        }
    }

    Ok(())
}
