//! Resolves thumbnail placeholders once the table body has been written.
//!
//! Each distinct image URL is fetched once as its own task, and the outcome
//! goes to every placeholder showing that URL. A semaphore bounds how many
//! requests are in flight and the view's lifecycle flag cancels the whole
//! set when the view is torn down.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cell_renderer::{escape_html, ImagePlaceholder};

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Base64 image payload for `url`, or `None` when the server has no image
    async fn fetch(&self, url: &str) -> Result<Option<String>>;
}

/// Fetches thumbnails from the status API
pub struct HttpImageFetcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpImageFetcher {
    pub fn new(base_url: &str, token: Option<String>, timeout_secs: u64) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<String>> {
        let mut request = self.client.get(self.absolute(url));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("Image request failed with {}", response.status()));
        }

        let body: Value = response.json().await?;
        Ok(image_payload(&body))
    }
}

/// The image endpoint answers with a bare JSON string; anything else means no image
pub fn image_payload(body: &Value) -> Option<String> {
    match body {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// Base64 encoded image
    Image(String),
    NoImage,
    Failed(String),
}

impl ImageOutcome {
    /// Markup replacing the loading placeholder
    pub fn to_html(&self, placeholder: &ImagePlaceholder) -> String {
        let url = escape_html(&placeholder.url);
        match self {
            ImageOutcome::Image(data) => format!(
                r#"<a id="{}" class="thumbnail-link" href="{}" data-src="{}"><img class="thumbnail" src="data:image/png;base64,{}" alt="{}"></a>"#,
                placeholder.id,
                url,
                url,
                escape_html(data),
                escape_html(&placeholder.column_id)
            ),
            ImageOutcome::NoImage => format!(
                r#"<span id="{}" class="badge bg-secondary">No image</span>"#,
                placeholder.id
            ),
            ImageOutcome::Failed(reason) => format!(
                r#"<span id="{}" class="badge bg-danger" title="{}">Error loading image</span>"#,
                placeholder.id,
                escape_html(reason)
            ),
        }
    }
}

/// Cancellation flag shared by everything a page view spawned
#[derive(Clone)]
pub struct ViewLifecycle {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for ViewLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewLifecycle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

pub struct ImageResolver {
    fetcher: Arc<dyn ImageFetcher>,
    max_concurrent: usize,
}

impl ImageResolver {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, max_concurrent: usize) -> Self {
        Self {
            fetcher,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Fetch every distinct URL once; results come back in completion order
    pub async fn resolve(
        &self,
        placeholders: Vec<ImagePlaceholder>,
        lifecycle: &ViewLifecycle,
    ) -> Vec<(ImagePlaceholder, ImageOutcome)> {
        if placeholders.is_empty() || lifecycle.is_cancelled() {
            return Vec::new();
        }

        let total = placeholders.len();
        let groups = group_by_url(placeholders);
        debug!(
            target: "images",
            "Resolving {} thumbnails from {} urls ({} at a time)",
            total,
            groups.len(),
            self.max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for (url, sharing) in groups {
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            let cancelled = lifecycle.subscribe();

            tasks.spawn(async move {
                let work = async move {
                    let _permit = semaphore.acquire_owned().await.ok()?;
                    Some(fetch_outcome(fetcher.as_ref(), &url).await)
                };

                tokio::select! {
                    _ = wait_cancelled(cancelled) => None,
                    outcome = work => outcome.map(|o| (sharing, o)),
                }
            });
        }

        let mut resolved = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            if lifecycle.is_cancelled() {
                debug!(target: "images", "View torn down, dropping {} pending image urls", tasks.len());
                tasks.abort_all();
                break;
            }
            match joined {
                Ok(Some((sharing, outcome))) => resolved.extend(
                    sharing
                        .into_iter()
                        .map(|placeholder| (placeholder, outcome.clone())),
                ),
                Ok(None) => {}
                Err(e) => warn!(target: "images", "Thumbnail task failed: {}", e),
            }
        }
        resolved
    }
}

/// Placeholders grouped by URL, in first-seen order
fn group_by_url(placeholders: Vec<ImagePlaceholder>) -> Vec<(String, Vec<ImagePlaceholder>)> {
    let mut groups: Vec<(String, Vec<ImagePlaceholder>)> = Vec::new();
    for placeholder in placeholders {
        match groups.iter_mut().find(|(url, _)| *url == placeholder.url) {
            Some((_, sharing)) => sharing.push(placeholder),
            None => groups.push((placeholder.url.clone(), vec![placeholder])),
        }
    }
    groups
}

/// Completes once the lifecycle flag is set
async fn wait_cancelled(mut receiver: watch::Receiver<bool>) {
    loop {
        let cancelled = *receiver.borrow_and_update();
        if cancelled {
            return;
        }
        if receiver.changed().await.is_err() {
            // Sender gone without cancelling: nothing left to wait for
            std::future::pending::<()>().await;
        }
    }
}

async fn fetch_outcome(fetcher: &dyn ImageFetcher, url: &str) -> ImageOutcome {
    match fetcher.fetch(url).await {
        Ok(Some(data)) => ImageOutcome::Image(data),
        Ok(None) => ImageOutcome::NoImage,
        Err(e) => {
            warn!(target: "images", "Failed to fetch image {}: {}", url, e);
            ImageOutcome::Failed(e.to_string())
        }
    }
}
