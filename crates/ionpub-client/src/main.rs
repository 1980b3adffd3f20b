use anyhow::Result;
use clap::Parser;
use ionpub_client::config::{Args, PublisherConfig};
use ionpub_client::peer::PeerEngine;
use ionpub_client::{transport, Session};
use ionpub_media::{FileTrack, LocalTrack};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ionpub=debug,ionpub_client=debug,ionpub_media=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = PublisherConfig::load(&args)?;

    if let Err(e) = run(config).await {
        tracing::error!("{:#}", e);
        return Err(e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run(config: PublisherConfig) -> Result<()> {
    let url = config.signaling_url();

    tracing::info!("Publishing to room {} via {}", config.room, url);

    let (transport, reader) = transport::connect(&url).await?;

    let (engine, events) = PeerEngine::new(&config.ice_servers).await?;
    let tracks = open_tracks(&config)?;
    for track in &tracks {
        engine.attach_track(track.as_ref()).await?;
    }

    let session = Session::new(
        config.room.clone(),
        Arc::new(transport),
        Arc::new(engine),
        tracks,
    );
    session.start(reader, events);

    if let Err(e) = session.join().await {
        if let Err(close_err) = session.close().await {
            tracing::warn!("Shutdown failed: {}", close_err);
        }
        return Err(anyhow::anyhow!("Failed to join room {}: {}", config.room, e));
    }

    session.run_until_shutdown(shutdown_signal()).await?;
    Ok(())
}

fn open_tracks(config: &PublisherConfig) -> Result<Vec<Arc<dyn LocalTrack>>> {
    let stream_id = Uuid::new_v4().to_string();
    let mut tracks: Vec<Arc<dyn LocalTrack>> = Vec::new();

    if let Some(path) = &config.video {
        tracks.push(Arc::new(FileTrack::video_ivf(path, &stream_id, config.loop_media)?));
    }
    if let Some(path) = &config.audio {
        tracks.push(Arc::new(FileTrack::audio_ogg(path, &stream_id, config.loop_media)?));
    }

    if tracks.is_empty() {
        tracing::warn!("No media files configured, joining without tracks");
    }

    Ok(tracks)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
