use roadspeed::api::{self, ApiState};
use roadspeed::config::{self, DEFAULT_USER_AGENT};
use roadspeed::enrichment::nominatim::NominatimGeocoder;
use roadspeed::enrichment::speed_limit::overpass::OverpassLookup;
use roadspeed::error::AppError;
use roadspeed::location::mock::ScriptedProvider;
use roadspeed::location::replay::ReplayProvider;
use roadspeed::location::{AuthorizationStatus, LocationProvider};
use roadspeed::pipeline::{LocationPipeline, PipelineCommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Level;

const COMMAND_CHANNEL_CAPACITY: usize = 32;

fn init_tracing(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default().map_err(AppError::from)?;
    init_tracing(&config.logging.level);
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "roadspeed starting"
    );

    let speed_limit_lookup = OverpassLookup::new(
        config.speed_limit_endpoint(),
        config.speed_limit_timeout(),
        DEFAULT_USER_AGENT,
    )
    .map_err(|err| AppError::HttpClient(err.to_string()))?;
    let geocoder = NominatimGeocoder::new(
        config.geocoder_endpoint(),
        config.geocoder_timeout(),
        DEFAULT_USER_AGENT,
    )
    .map_err(|err| AppError::HttpClient(err.to_string()))?;

    let mut pipeline = LocationPipeline::new(
        config.pipeline_config(),
        config.settings.clone(),
        Arc::new(speed_limit_lookup),
        Arc::new(geocoder),
    );
    let (command_tx, mut command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

    if config.trip_auto_start() {
        command_tx
            .send(PipelineCommand::StartTrip)
            .await
            .map_err(|_| AppError::CommandChannelClosed)?;
    }

    let mut provider = load_provider(&config).await;
    let api_state = ApiState {
        snapshot: pipeline.subscribe(),
        commands: command_tx,
    };

    tokio::spawn(async move {
        let outcome = pipeline.run(provider.as_mut(), &mut command_rx).await;
        tracing::info!(?outcome, "Location pipeline finished");
        pipeline.serve_commands(&mut command_rx).await;
    });

    let app = api::router(api_state);
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Replay the configured recording, or fall back to a provider that never
/// authorizes so the API still reports the pipeline state.
async fn load_provider(config: &config::Config) -> Box<dyn LocationProvider> {
    let Some(path) = config.replay_path() else {
        tracing::warn!("No replay path configured in [location].replay_path");
        return Box::new(ScriptedProvider::new(AuthorizationStatus::NotDetermined, Vec::new()));
    };
    match ReplayProvider::from_path(path, config.playback_rate()).await {
        Ok(provider) => Box::new(provider),
        Err(err) => {
            tracing::warn!(
                error = %err,
                path = %path.display(),
                "Failed to load location replay"
            );
            Box::new(ScriptedProvider::new(AuthorizationStatus::NotDetermined, Vec::new()))
        }
    }
}
