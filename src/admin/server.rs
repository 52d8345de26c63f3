/// HTTP listener for the admin page.
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::admin::{AdminContext, router};

pub async fn run(port: u16, ctx: Arc<AdminContext>) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind admin page to {addr}"))?;
    info!("Admin page listening on http://{}", addr);
    serve(listener, ctx).await
}

/// Serve the admin routes on an already bound listener until the task is aborted
pub async fn serve(listener: TcpListener, ctx: Arc<AdminContext>) -> Result<()> {
    axum::serve(listener, router(ctx))
        .await
        .context("admin page server stopped")
}
