mod app;
mod config;
mod protocol;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use slopemap_renderer::{CpuRenderer, TerrainRenderer, TerrainShading};
use slopemap_shared::GradingTables;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let Some(renderer) = init_renderer().await else {
        return;
    };
    tracing::info!(backend = renderer.backend(), "terrain renderer ready");

    let state = AppState::new(renderer);
    let app = app::build_app(state);

    let addr = format!("0.0.0.0:{}", config::server_port());
    tracing::info!("slopemap server listening on {addr}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind TCP listener");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server failed");
    }

    tracing::info!("Server shut down gracefully");
}

/// GPU renderer when an adapter exists, otherwise the CPU path if allowed.
async fn init_renderer() -> Option<Arc<dyn TerrainShading>> {
    let tables = GradingTables::downhill();
    let cpu_fallback = config::cpu_fallback_enabled();

    let gpu_tables = tables.clone();
    let gpu = match tokio::task::spawn_blocking(move || TerrainRenderer::new_blocking(&gpu_tables))
        .await
    {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "renderer initialisation task failed");
            return None;
        }
    };

    match gpu {
        Ok(gpu) if gpu.is_supported() || !cpu_fallback => {
            if !gpu.is_supported() {
                tracing::warn!("GPU shaders unsupported and CPU_FALLBACK disabled, tiles will be transparent");
            }
            tracing::info!(adapter = gpu.adapter_name(), "using GPU terrain renderer");
            Some(Arc::new(gpu) as Arc<dyn TerrainShading>)
        }
        Ok(_) => {
            tracing::warn!("GPU shaders unsupported, falling back to CPU shading");
            Some(Arc::new(CpuRenderer::new(tables)) as Arc<dyn TerrainShading>)
        }
        Err(e) if cpu_fallback => {
            tracing::warn!(error = %e, "no usable GPU, falling back to CPU shading");
            Some(Arc::new(CpuRenderer::new(tables)) as Arc<dyn TerrainShading>)
        }
        Err(e) => {
            tracing::error!(error = %e, "no usable GPU and CPU_FALLBACK disabled");
            None
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
