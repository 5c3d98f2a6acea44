//! Artwork: resolves cover images for library items and serves them over
//! the optional HTTP endpoint some MPD clients use
//! (`GET http://host:port/path/to/cover.jpg`).

use std::fs;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use color_eyre::Result;
use color_eyre::eyre::Context;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::system::System;

const COVER_NAMES: &[&str] = &["cover.png", "cover.jpg", "folder.jpg", "folder.png"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtworkFormat {
    Png,
    Jpeg,
}

impl ArtworkFormat {
    pub fn mime(self) -> &'static str {
        match self {
            ArtworkFormat::Png => "image/png",
            ArtworkFormat::Jpeg => "image/jpeg",
        }
    }
}

impl System {
    /// Cover image for a library item: the first cover/folder file next to
    /// it on disk.
    pub fn artwork_for_item(&self, file_id: i64) -> Option<(Vec<u8>, ArtworkFormat)> {
        let row = self.media_by_id(file_id)?;
        let dir = camino::Utf8Path::new(&row.path).parent()?;
        for name in COVER_NAMES {
            let candidate = dir.join(name);
            if let Ok(bytes) = fs::read(&candidate) {
                debug!("artwork for item {file_id}: {candidate}");
                let format = if bytes.starts_with(b"\x89PNG") {
                    ArtworkFormat::Png
                } else {
                    ArtworkFormat::Jpeg
                };
                return Some((bytes, format));
            }
        }
        None
    }
}

/// Serves artwork over HTTP. Requests name some file below an album
/// directory; everything after the last slash is dropped and the rest is
/// prefix-matched against the library.
pub async fn serve(system: Arc<Mutex<System>>, port: u16) -> Result<()> {
    let app = Router::new()
        .route("/{*path}", get(artwork))
        .with_state(system);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .wrap_err("Could not bind artwork HTTP port")?;
    info!("artwork endpoint on port {port}");
    axum::serve(listener, app)
        .await
        .wrap_err("Artwork HTTP server failed")
}

async fn artwork(Path(path): Path<String>, State(system): State<Arc<Mutex<System>>>) -> Response {
    let dir = match path.rsplit_once('/') {
        Some((dir, _file)) => dir.to_owned(),
        None => path,
    };
    debug!("artwork request for path: {dir}");

    let system = system.lock().await;
    let Some(item_id) = system.file_id_by_virtual_path_match(&dir) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match system.artwork_for_item(item_id) {
        Some((bytes, format)) => {
            ([(header::CONTENT_TYPE, format.mime())], bytes).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
