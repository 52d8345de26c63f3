/// Google Photos shared-album source: lists the album, rotates through its images and
/// prepares each one for a grayscale panel.
use chrono::{DateTime, Local, NaiveDateTime};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PhotosConfig;
use crate::content::{ContentSnapshot, ContentSource, FetchError};

const SEARCH_URL: &str = "https://photoslibrary.googleapis.com/v1/mediaItems:search";
const ALBUMS_URL: &str = "https://photoslibrary.googleapis.com/v1/albums";
const PAGE_SIZE: u32 = 100;
const ALBUM_PAGE_SIZE: u32 = 50;
/// Album listings are reused this long; download URLs expire after about an hour
const LISTING_TTL: Duration = Duration::from_secs(60 * 60);
/// Share of darkest and lightest pixels ignored when stretching contrast
const AUTOCONTRAST_CUTOFF: f32 = 2.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    pub base_url: String,
    #[serde(default)]
    pub media_metadata: MediaMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub creation_time: Option<String>,
    /// Present for photos, absent for videos
    pub photo: Option<serde_json::Value>,
}

impl MediaItem {
    fn is_image(&self) -> bool {
        self.media_metadata.photo.is_some()
    }

    fn created(&self) -> Option<NaiveDateTime> {
        let raw = self.media_metadata.creation_time.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Local).naive_local())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    page_size: u32,
    share_token: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    media_items: Vec<MediaItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    #[serde(default = "untitled")]
    pub title: String,
    /// The API sends this 64-bit count as a string
    #[serde(default)]
    pub media_items_count: Option<String>,
}

fn untitled() -> String {
    "Untitled".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumsResponse {
    #[serde(default)]
    albums: Vec<Album>,
    next_page_token: Option<String>,
}

/// OAuth token file as written by the setup tooling
#[derive(Debug, Deserialize)]
struct TokenFile {
    #[serde(alias = "access_token")]
    token: String,
}

pub struct PhotoSource {
    client: reqwest::Client,
    share_token: Option<String>,
    token_file: PathBuf,
    /// Size of the panel region the photo must fit
    target: (u32, u32),
    access_token: Option<String>,
    listing: Vec<MediaItem>,
    listed_at: Option<Instant>,
    next: usize,
}

impl PhotoSource {
    pub fn new(config: &PhotosConfig, target: (u32, u32), timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            share_token: config.share_token.clone(),
            token_file: config.token_file.clone(),
            target,
            access_token: None,
            listing: Vec::new(),
            listed_at: None,
            next: 0,
        }
    }

    fn listing_is_stale(&self) -> bool {
        self.listing.is_empty() || self.listed_at.is_none_or(|at| at.elapsed() >= LISTING_TTL)
    }

    async fn refresh_listing(&mut self, access_token: &str, share_token: &str) -> Result<(), FetchError> {
        info!("Refreshing shared album listing");
        let response = self
            .client
            .post(SEARCH_URL)
            .bearer_auth(access_token)
            .json(&SearchRequest {
                page_size: PAGE_SIZE,
                share_token,
            })
            .send()
            .await?;
        if let Some(e) = FetchError::from_status(response.status()) {
            return Err(e);
        }
        let listing = images(response.json::<SearchResponse>().await?);
        info!("Found {} photos in the shared album", listing.len());
        if listing.is_empty() {
            return Err(FetchError::Empty);
        }

        self.listing = listing;
        self.listed_at = Some(Instant::now());
        self.next %= self.listing.len();
        Ok(())
    }

    /// Read the OAuth access token from the token file. Album listing needs only this.
    pub async fn load_access_token(&mut self) -> Result<(), FetchError> {
        let raw = tokio::fs::read_to_string(&self.token_file)
            .await
            .map_err(|e| {
                FetchError::NotConfigured(format!("token file {}: {}", self.token_file.display(), e))
            })?;
        let token: TokenFile = serde_json::from_str(&raw)
            .map_err(|e| FetchError::Auth(format!("unreadable token file: {e}")))?;
        if token.token.trim().is_empty() {
            return Err(FetchError::Auth("token file holds an empty token".into()));
        }
        self.access_token = Some(token.token);
        Ok(())
    }

    /// Every album of the account behind the token file, following all pages
    pub async fn list_albums(&self) -> Result<Vec<Album>, FetchError> {
        let Some(access_token) = self.access_token.as_deref() else {
            return Err(FetchError::Auth("not authenticated".into()));
        };

        let mut albums = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(ALBUMS_URL)
                .bearer_auth(access_token)
                .query(&[("pageSize", ALBUM_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let response = request.send().await?;
            if let Some(e) = FetchError::from_status(response.status()) {
                return Err(e);
            }
            let page = response.json::<AlbumsResponse>().await?;
            albums.extend(page.albums);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        info!("Found {} albums", albums.len());
        Ok(albums)
    }

    async fn download(&self, item: &MediaItem) -> Result<DynamicImage, FetchError> {
        let url = format!("{}=w{}-h{}", item.base_url, self.target.0, self.target.1);
        debug!("Downloading {}", item.filename);
        let response = self.client.get(&url).send().await?;
        if let Some(e) = FetchError::from_status(response.status()) {
            return Err(e);
        }
        let bytes = response.bytes().await?;
        image::load_from_memory(&bytes).map_err(|e| FetchError::Malformed(e.to_string()))
    }
}

impl ContentSource for PhotoSource {
    fn name(&self) -> &'static str {
        "google-photos"
    }

    async fn authenticate(&mut self) -> Result<(), FetchError> {
        if self.share_token.is_none() {
            return Err(FetchError::NotConfigured(
                "GOOGLE_PHOTOS_SHARE_TOKEN is not set; pick an album on the admin page".into(),
            ));
        }
        self.load_access_token().await
    }

    async fn fetch(&mut self) -> Result<ContentSnapshot, FetchError> {
        let (Some(access_token), Some(share_token)) =
            (self.access_token.clone(), self.share_token.clone())
        else {
            return Err(FetchError::Auth("not authenticated".into()));
        };

        if self.listing_is_stale() {
            match self.refresh_listing(&access_token, &share_token).await {
                Ok(()) => {}
                Err(e) if !e.is_auth() && !self.listing.is_empty() => {
                    warn!("Album listing refresh failed, reusing old listing: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        let item = self.listing[self.next].clone();
        self.next = (self.next + 1) % self.listing.len();

        let image = self.download(&item).await?;
        let photo = prepare_photo(&image, self.target.0, self.target.1);
        info!("Loaded photo {}", item.filename);
        Ok(snapshot_for(&item, photo, Local::now().naive_local()))
    }
}

/// Printable album table: title, id and photo count per album
pub fn describe_albums(albums: &[Album]) -> String {
    let rule = "-".repeat(50);
    let mut out = format!("{rule}\n");
    for album in albums {
        out.push_str(&format!(
            "Title: {}\nID: {}\nPhotos: {}\n{rule}\n",
            album.title,
            album.id,
            album.media_items_count.as_deref().unwrap_or("0")
        ));
    }
    out
}

fn images(response: SearchResponse) -> Vec<MediaItem> {
    response
        .media_items
        .into_iter()
        .filter(MediaItem::is_image)
        .collect()
}

fn snapshot_for(item: &MediaItem, photo: GrayImage, now: NaiveDateTime) -> ContentSnapshot {
    let mut snapshot = ContentSnapshot::new(now)
        .with_field("photo_id", item.id.as_str())
        .with_field("filename", item.filename.as_str());
    if let Some(created) = item.created() {
        snapshot = snapshot.with_field("created", created);
    }
    snapshot.with_photo(photo)
}

/// Fit `image` inside `width` x `height` on white, in grayscale, with stretched contrast
pub fn prepare_photo(image: &DynamicImage, width: u32, height: u32) -> GrayImage {
    let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));
    let gray = image.to_luma8();
    let (iw, ih) = gray.dimensions();
    if iw == 0 || ih == 0 || width == 0 || height == 0 {
        return canvas;
    }

    let scale = f64::min(width as f64 / iw as f64, height as f64 / ih as f64);
    let fit_w = ((iw as f64 * scale) as u32).clamp(1, width);
    let fit_h = ((ih as f64 * scale) as u32).clamp(1, height);
    let resized = imageops::resize(&gray, fit_w, fit_h, FilterType::Lanczos3);
    imageops::overlay(
        &mut canvas,
        &resized,
        ((width - fit_w) / 2) as i64,
        ((height - fit_h) / 2) as i64,
    );

    autocontrast(&mut canvas, AUTOCONTRAST_CUTOFF);
    canvas
}

/// Stretch the histogram to the full range after dropping `cutoff` percent from each end
pub fn autocontrast(image: &mut GrayImage, cutoff: f32) {
    let mut histogram = [0u64; 256];
    for px in image.pixels() {
        histogram[px[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    let cut = (total as f64 * cutoff as f64 / 100.0) as u64;

    let mut remaining = cut;
    for count in histogram.iter_mut() {
        if remaining == 0 {
            break;
        }
        let taken = remaining.min(*count);
        *count -= taken;
        remaining -= taken;
    }
    let mut remaining = cut;
    for count in histogram.iter_mut().rev() {
        if remaining == 0 {
            break;
        }
        let taken = remaining.min(*count);
        *count -= taken;
        remaining -= taken;
    }

    let lo = histogram.iter().position(|&c| c > 0);
    let hi = histogram.iter().rposition(|&c| c > 0);
    let (Some(lo), Some(hi)) = (lo, hi) else {
        return;
    };
    if hi <= lo {
        return;
    }

    let scale = 255.0 / (hi - lo) as f32;
    let offset = -(lo as f32) * scale;
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = (i as f32 * scale + offset).round().clamp(0.0, 255.0) as u8;
    }
    for px in image.pixels_mut() {
        px[0] = lut[px[0] as usize];
    }
}
