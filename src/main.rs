use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use jutsu_engine::{
    catalog::JutsuCatalog,
    config::Settings,
    detection::{
        synthetic::BACKDROP, ChannelClassifier, Classifier, ScriptedClassifier, StaticLandmarks,
        SyntheticCamera,
    },
    effects::ChromaKeySegmenter,
    error::{AppError, FrameError},
    local::{run_headless, LocalApp, LocalLoop},
    services::{BackgroundWorkers, InMemoryScoreService, ScoreService},
    session::{Session, SessionConfig},
    streaming::{ServerContext, StreamingServer, SyntheticBackend},
};

#[derive(Parser)]
#[command(name = "jutsu-engine", version, about)]
struct Cli {
    /// TOML or JSON settings file, layered under `JUTSU__*` variables.
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve frame records to network peers.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Every connection performs its jutsu on a loop.
        #[arg(long)]
        demo: bool,
    },
    /// Local game window, or a headless loop.
    Play {
        #[arg(long)]
        jutsu: Option<String>,
        #[arg(long)]
        headless: bool,
        /// Stop the headless loop after this many ticks.
        #[arg(long)]
        ticks: Option<u64>,
        #[arg(long)]
        demo: bool,
    },
    /// Print the jutsu catalog as JSON.
    Catalog,
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_catalog(settings: &Settings) -> Result<JutsuCatalog, AppError> {
    Ok(match &settings.catalog_path {
        Some(path) => JutsuCatalog::load(path)?,
        None => JutsuCatalog::official(),
    })
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for ctrl-c: {}", e);
            return;
        }
        info!("Shutting down");
        trigger.cancel();
    });
    token
}

async fn serve(
    mut settings: Settings,
    catalog: JutsuCatalog,
    host: Option<String>,
    port: Option<u16>,
    demo: bool,
) -> Result<(), AppError> {
    if let Some(host) = host {
        settings.streaming.host = host;
    }
    if let Some(port) = port {
        settings.streaming.port = port;
    }
    let class_names = catalog
        .sign_vocabulary()
        .iter()
        .map(|sign| sign.to_string())
        .collect();
    let mut backend = SyntheticBackend::new(
        settings.local.camera_width,
        settings.local.camera_height,
        class_names,
    );
    if demo {
        let jutsu = &settings.streaming.client.current_jutsu;
        backend = backend.with_demo(catalog.require(jutsu)?.sequence.clone());
    }
    let context = Arc::new(ServerContext {
        catalog: Arc::new(catalog),
        settings,
        backend: Arc::new(backend),
    });
    let server = StreamingServer::bind(context).await?;
    server.serve(cancel_on_ctrl_c()).await
}

async fn play(
    settings: Settings,
    catalog: JutsuCatalog,
    jutsu: Option<String>,
    headless: bool,
    ticks: Option<u64>,
    demo: bool,
) -> Result<(), AppError> {
    let catalog = Arc::new(catalog);
    let mut config = SessionConfig::from_settings(&settings);
    if let Some(jutsu) = jutsu {
        config = config.with_initial_jutsu(jutsu);
    }
    let session = Session::new(
        catalog.clone(),
        config,
        Ok(Box::new(ChromaKeySegmenter::new(BACKDROP))),
    )?;
    let vocabulary = catalog.sign_vocabulary();
    let class_names: Vec<String> = vocabulary.iter().map(|sign| sign.to_string()).collect();

    let service: Arc<dyn ScoreService> = Arc::new(InMemoryScoreService::new());
    let workers = BackgroundWorkers::new(
        Handle::current(),
        service,
        settings.workers.result_buffer,
        settings.challenge.leaderboard_limit,
    );
    let camera = SyntheticCamera::new(settings.local.camera_width, settings.local.camera_height);

    let mut injector = None;
    let classifier: Box<dyn Classifier> = if demo {
        Box::new(
            ScriptedClassifier::performing(&session.definition().sequence, 20, 10, 1)
                .looping()
                .with_class_names(class_names),
        )
    } else {
        let (classifier, sign_injector) = ChannelClassifier::new(class_names);
        injector = Some(sign_injector);
        Box::new(classifier)
    };

    let game = LocalLoop::new(
        session,
        Box::new(camera),
        classifier,
        Box::new(StaticLandmarks::centered()),
        workers,
        settings.local.player_name.clone(),
        settings.sequence.min_confidence,
    )
    .with_mirror(settings.local.mirror);

    if headless {
        run_headless(game, settings.local.target_fps, ticks, cancel_on_ctrl_c()).await;
        return Ok(());
    }
    tokio::task::block_in_place(move || LocalApp::new(game, injector, vocabulary).run())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_logging(&settings.log_level);
    let catalog = load_catalog(&settings)?;

    match cli.command {
        Command::Serve { host, port, demo } => serve(settings, catalog, host, port, demo).await,
        Command::Play {
            jutsu,
            headless,
            ticks,
            demo,
        } => play(settings, catalog, jutsu, headless, ticks, demo).await,
        Command::Catalog => {
            let json = serde_json::to_string_pretty(&catalog).map_err(FrameError::from)?;
            println!("{}", json);
            Ok(())
        }
    }
}
