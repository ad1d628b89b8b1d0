//! STAC imagery catalog client.
//!
//! The catalog session is opened once with [`ImageryClient::connect`] and the
//! established client is then shared by every pipeline run.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    AreaOfInterest, CaptureMetadata, PipelineError, PipelineResult, PipelineStage, RawCapture,
};

use crate::config::ImageryConfig;
use crate::external::http::RetryingFetcher;
use crate::external::npy;

/// Catalog properties carrying the calendar acquisition day, in lookup order
const ACQUISITION_DATE_KEYS: [&str; 2] = ["landsat:date_acquired", "DATE_ACQUIRED"];

/// Stop following `next` links after this many pages
const MAX_SEARCH_PAGES: usize = 50;

/// Capture metadata plus where to download its pixels from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureHandle {
    pub metadata: CaptureMetadata,
    pub href: String,
}

impl AsRef<CaptureMetadata> for CaptureHandle {
    fn as_ref(&self) -> &CaptureMetadata {
        &self.metadata
    }
}

/// Anything that can list captures over an area and download them
#[async_trait]
pub trait ImagerySource: Send + Sync {
    /// Captures intersecting `area` strictly under `max_cloud_cover` percent
    async fn query(
        &self,
        area: &AreaOfInterest,
        max_cloud_cover: f64,
    ) -> PipelineResult<Vec<CaptureHandle>>;

    async fn fetch_raster(&self, handle: &CaptureHandle) -> PipelineResult<RawCapture>;
}

/// State of the one-time catalog handshake
#[derive(Debug, Clone, Serialize)]
pub struct ImagerySession {
    pub endpoint: String,
    pub collection: String,
    pub established_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// STAC payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SearchParams {
    bbox: Vec<f64>,
    collections: Vec<String>,
    query: serde_json::Value,
    limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sortby: Option<serde_json::Value>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ItemCollection {
    #[serde(default)]
    features: Vec<StacItem>,
    #[serde(default)]
    links: Vec<StacLink>,
}

impl ItemCollection {
    fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }
}

#[derive(Debug, Deserialize)]
struct StacItem {
    id: String,
    properties: ItemProperties,
    #[serde(default)]
    assets: HashMap<String, StacAsset>,
}

#[derive(Debug, Deserialize)]
struct ItemProperties {
    datetime: Option<String>,
    #[serde(rename = "eo:cloud_cover")]
    cloud_cover: Option<f64>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StacAsset {
    href: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StacLink {
    rel: String,
    href: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    body: Option<serde_json::Value>,
    #[serde(default)]
    merge: Option<bool>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Established STAC catalog client
#[derive(Clone)]
pub struct ImageryClient {
    fetcher: RetryingFetcher,
    config: ImageryConfig,
    session: ImagerySession,
}

impl ImageryClient {
    /// Perform the catalog handshake: the API root must answer and the
    /// configured collection must exist.
    pub async fn connect(config: &ImageryConfig) -> PipelineResult<Self> {
        let fetcher = RetryingFetcher::new(
            "imagery",
            PipelineStage::RasterFetch,
            config.request_timeout(),
            config.max_retries,
            config.backoff_base(),
        )?;
        let endpoint = config.api_endpoint.trim_end_matches('/').to_string();

        let root = with_api_key(fetcher.client().get(&endpoint), config);
        fetcher
            .send(root, &endpoint)
            .await
            .map_err(|e| e.at_stage(PipelineStage::CaptureSelection))?;

        let collection_url = format!("{}/collections/{}", endpoint, config.collection);
        let collection = with_api_key(fetcher.client().get(&collection_url), config);
        fetcher
            .send(collection, &collection_url)
            .await
            .map_err(|e| match e {
                PipelineError::Upstream { service, reason, .. } => PipelineError::Upstream {
                    stage: PipelineStage::CaptureSelection,
                    service,
                    reason: format!("collection '{}' unavailable: {}", config.collection, reason),
                },
                other => other.at_stage(PipelineStage::CaptureSelection),
            })?;

        let session = ImagerySession {
            endpoint,
            collection: config.collection.clone(),
            established_at: Utc::now(),
        };
        tracing::info!(
            endpoint = %session.endpoint,
            collection = %session.collection,
            "Imagery session established"
        );

        Ok(Self {
            fetcher,
            config: config.clone(),
            session,
        })
    }

    pub fn session(&self) -> &ImagerySession {
        &self.session
    }

    fn search_params(&self, area: &AreaOfInterest, max_cloud_cover: f64) -> SearchParams {
        SearchParams {
            bbox: area.bbox().to_vec(),
            collections: vec![self.config.collection.clone()],
            query: serde_json::json!({ "eo:cloud_cover": { "lt": max_cloud_cover } }),
            limit: self.config.max_items.min(100),
            // Newest first, so capped listings keep the recent captures
            sortby: Some(serde_json::json!([
                { "field": "properties.datetime", "direction": "desc" }
            ])),
            extra: HashMap::new(),
        }
    }

    async fn post_search(&self, url: &str, params: &SearchParams) -> PipelineResult<ItemCollection> {
        let request = with_api_key(self.fetcher.client().post(url).json(params), &self.config);
        let response = self.fetcher.send(request, url).await?;
        response
            .json()
            .await
            .map_err(|e| catalog_error(format!("parsing STAC response: {}", e.without_url())))
    }

    async fn follow_next(
        &self,
        link: &StacLink,
        params: &SearchParams,
    ) -> PipelineResult<ItemCollection> {
        let method = link.method.as_deref().unwrap_or("GET").to_uppercase();
        if method != "POST" {
            let request = with_api_key(self.fetcher.client().get(&link.href), &self.config);
            let response = self.fetcher.send(request, &link.href).await?;
            return response.json().await.map_err(|e| {
                catalog_error(format!("parsing pagination response: {}", e.without_url()))
            });
        }

        let next = match (&link.body, link.merge.unwrap_or(false)) {
            (Some(body), true) => merge_params(params, body)?,
            (Some(body), false) => {
                serde_json::from_value(body.clone())
                    .map_err(|e| catalog_error(format!("bad pagination body: {}", e)))?
            }
            (None, _) => params.clone(),
        };
        self.post_search(&link.href, &next).await
    }
}

fn catalog_error(reason: String) -> PipelineError {
    PipelineError::Upstream {
        stage: PipelineStage::CaptureSelection,
        service: "imagery".to_string(),
        reason,
    }
}

fn with_api_key(request: reqwest::RequestBuilder, config: &ImageryConfig) -> reqwest::RequestBuilder {
    match &config.api_key {
        Some(key) => request.header("x-api-key", key),
        None => request,
    }
}

fn merge_params(params: &SearchParams, body: &serde_json::Value) -> PipelineResult<SearchParams> {
    let bad = |e: serde_json::Error| catalog_error(format!("bad pagination body: {}", e));
    let mut base = serde_json::to_value(params).map_err(bad)?;
    if let (Some(base_obj), Some(link_obj)) = (base.as_object_mut(), body.as_object()) {
        for (k, v) in link_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    serde_json::from_value(base).map_err(bad)
}

#[async_trait]
impl ImagerySource for ImageryClient {
    async fn query(
        &self,
        area: &AreaOfInterest,
        max_cloud_cover: f64,
    ) -> PipelineResult<Vec<CaptureHandle>> {
        let params = self.search_params(area, max_cloud_cover);
        let search_url = format!("{}/search", self.session.endpoint);

        // Every page is read before capping: catalogs without the sort
        // extension may list the newest captures last
        let mut items = Vec::new();
        let mut page = self.post_search(&search_url, &params).await?;
        let mut pages = 1;
        loop {
            let next = page.next_link().cloned();
            items.append(&mut page.features);
            let Some(link) = next else { break };
            if pages >= MAX_SEARCH_PAGES {
                tracing::warn!(pages, items = items.len(), "Catalog pagination cut short");
                break;
            }
            page = self.follow_next(&link, &params).await?;
            pages += 1;
            if page.features.is_empty() {
                break;
            }
        }

        let total = items.len();
        let mut handles: Vec<CaptureHandle> = items
            .into_iter()
            .filter_map(|item| capture_from_item(item, &self.config.asset_key))
            // Catalogs do not all honor the query extension
            .filter(|h| h.metadata.cloud_cover_percent < max_cloud_cover)
            .collect();
        shared::order_by_recency(&mut handles);
        handles.truncate(self.config.max_items);

        tracing::info!(
            items = total,
            pages,
            usable = handles.len(),
            max_cloud_cover,
            "Catalog search complete"
        );
        Ok(handles)
    }

    async fn fetch_raster(&self, handle: &CaptureHandle) -> PipelineResult<RawCapture> {
        let bytes = self.fetcher.fetch_bytes(&handle.href).await?;
        tracing::info!(capture_id = %handle.metadata.id, bytes = bytes.len(), "Raster downloaded");
        let metadata = handle.metadata.clone();
        tokio::task::spawn_blocking(move || npy::decode_raster(&bytes, metadata))
            .await
            .map_err(|e| PipelineError::MalformedRaster(format!("decoder task failed: {}", e)))?
    }
}

/// Convert a catalog item; items lacking a timestamp, cloud cover or the
/// raster asset are skipped.
fn capture_from_item(item: StacItem, asset_key: &str) -> Option<CaptureHandle> {
    let timestamp = item
        .properties
        .datetime
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    let (Some(timestamp), Some(cloud_cover)) = (timestamp, item.properties.cloud_cover) else {
        tracing::debug!(item = %item.id, "Skipping item without datetime or cloud cover");
        return None;
    };
    let Some(asset) = item.assets.get(asset_key) else {
        tracing::debug!(item = %item.id, asset_key, "Skipping item without raster asset");
        return None;
    };

    let mut metadata = CaptureMetadata::new(item.id.clone(), timestamp, cloud_cover);
    if let Some(date) = acquisition_date(&item.properties.extra) {
        metadata = metadata.with_acquisition_date(date);
    }

    Some(CaptureHandle {
        metadata,
        href: asset.href.clone(),
    })
}

fn acquisition_date(properties: &HashMap<String, serde_json::Value>) -> Option<NaiveDate> {
    ACQUISITION_DATE_KEYS
        .iter()
        .filter_map(|key| properties.get(*key))
        .filter_map(|value| value.as_str())
        .find_map(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok())
}
