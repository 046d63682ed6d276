//! Template sources — template links, image download and detemplatizing.
//!
//! DESIGN
//! ======
//! A template link is a canvas URL whose fragment carries the placement:
//! `#template=<image url>&tw=<true width>&ox=<x>&oy=<y>&title=<title>`.
//! The linked image is often "styled": every canvas pixel is drawn as a
//! `block × block` tile. [`detemplatize`] recovers one pixel per tile.
//!
//! Downloads go through [`ImageFetcher`] so queries can be tested without a
//! network. Decoding and palette reduction are CPU-bound and run on the
//! blocking pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use url::Url;

use super::template::{Template, TemplateError, TemplateMeta};
use crate::error::{ErrorCode, ErrorKind};
use crate::palette::{ALPHA_THRESHOLD, Palette};

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default cap on a downloaded template image body.
pub const MAX_TEMPLATE_BYTES: usize = 32 * 1024 * 1024;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TemplateSourceError {
    #[error("invalid template link: {0}")]
    InvalidLink(String),
    #[error("template link is missing `{0}`")]
    MissingParameter(&'static str),
    #[error("template link has invalid `{name}`: {value}")]
    InvalidParameter { name: &'static str, value: String },
    #[error("http client build failed: {0}")]
    HttpClientBuild(String),
    #[error("couldn't download {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("{url} returned status {status}")]
    BadStatus { url: String, status: u16 },
    #[error("{0} doesn't contain an image")]
    NotAnImage(String),
    #[error("{url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: usize },
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("template task failed: {0}")]
    Task(String),
}

impl ErrorCode for TemplateSourceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidLink(_) => "E_TEMPLATE_LINK",
            Self::MissingParameter(_) => "E_TEMPLATE_LINK_MISSING",
            Self::InvalidParameter { .. } => "E_TEMPLATE_LINK_PARAM",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT",
            Self::Fetch { .. } => "E_TEMPLATE_FETCH",
            Self::BadStatus { .. } => "E_TEMPLATE_STATUS",
            Self::NotAnImage(_) => "E_TEMPLATE_NOT_IMAGE",
            Self::TooLarge { .. } => "E_TEMPLATE_TOO_LARGE",
            Self::Decode(_) => "E_TEMPLATE_DECODE",
            Self::Template(e) => e.error_code(),
            Self::Task(_) => "E_TASK",
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            Self::HttpClientBuild(_) | Self::Task(_) => ErrorKind::Fatal,
            Self::Template(e) => e.kind(),
            _ => ErrorKind::Input,
        }
    }
}

/// Placement parameters read from a template link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLink {
    pub link: String,
    pub image_url: String,
    pub true_width: u32,
    pub ox: i64,
    pub oy: i64,
    pub title: Option<String>,
}

/// Downloads image bytes.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TemplateSourceError>;
}

// =============================================================================
// LINKS
// =============================================================================

/// Read the placement fragment of a template link.
///
/// # Errors
///
/// Fails if the link is not an absolute http(s) URL, or `template`, `tw`,
/// `ox` or `oy` is missing or malformed.
pub fn parse_template_link(raw: &str) -> Result<TemplateLink, TemplateSourceError> {
    let link = parse_http_url(raw.trim())?;
    let fragment = link.fragment().unwrap_or_default();

    let mut params: HashMap<String, String> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }

    let image_url = required(&params, "template")?;
    parse_http_url(image_url)?;

    Ok(TemplateLink {
        link: link.to_string(),
        image_url: image_url.to_owned(),
        true_width: parse_param(&params, "tw")?,
        ox: parse_param(&params, "ox")?,
        oy: parse_param(&params, "oy")?,
        title: params.get("title").filter(|t| !t.is_empty()).cloned(),
    })
}

fn parse_http_url(raw: &str) -> Result<Url, TemplateSourceError> {
    let url = Url::parse(raw).map_err(|e| TemplateSourceError::InvalidLink(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TemplateSourceError::InvalidLink(format!("{raw}: unsupported scheme")));
    }
    Ok(url)
}

fn required<'a>(params: &'a HashMap<String, String>, name: &'static str) -> Result<&'a str, TemplateSourceError> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or(TemplateSourceError::MissingParameter(name))
}

fn parse_param<T: std::str::FromStr>(params: &HashMap<String, String>, name: &'static str) -> Result<T, TemplateSourceError> {
    let value = required(params, name)?;
    value
        .trim()
        .parse()
        .map_err(|_| TemplateSourceError::InvalidParameter { name, value: value.to_owned() })
}

// =============================================================================
// DETEMPLATIZE
// =============================================================================

/// Recover the plain image of a styled template whose canvas width is
/// `true_width`. Each output pixel is the first pixel of its tile (row-major)
/// with alpha above the threshold, made opaque; tiles without one stay
/// transparent. Unstyled images are returned unchanged.
#[must_use]
pub fn detemplatize(image: &RgbaImage, true_width: u32) -> RgbaImage {
    if true_width == 0 || image.width() / true_width <= 1 {
        return image.clone();
    }
    let block = image.width() / true_width;
    let true_height = image.height() / block;

    RgbaImage::from_fn(true_width, true_height, |x, y| {
        (0..block)
            .flat_map(|j| (0..block).map(move |i| (x * block + i, y * block + j)))
            .map(|(px, py)| *image.get_pixel(px, py))
            .find(|px| px[3] > ALPHA_THRESHOLD)
            .map_or(Rgba([0, 0, 0, 0]), |px| Rgba([px[0], px[1], px[2], u8::MAX]))
    })
}

/// Decode any supported image format to RGBA.
///
/// # Errors
///
/// Returns [`TemplateSourceError::Decode`] for unreadable bytes.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, TemplateSourceError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

// =============================================================================
// FETCH
// =============================================================================

/// [`ImageFetcher`] over HTTP. Bodies above `max_bytes` are rejected, by
/// `Content-Length` when the server sends one and while streaming otherwise.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    http: reqwest::Client,
    max_bytes: usize,
}

impl HttpImageFetcher {
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, TemplateSourceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| TemplateSourceError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, max_bytes: MAX_TEMPLATE_BYTES })
    }

    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TemplateSourceError> {
        let fetch_error = |e: reqwest::Error| TemplateSourceError::Fetch { url: url.to_owned(), message: e.to_string() };

        let mut response = self.http.get(url).send().await.map_err(fetch_error)?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(TemplateSourceError::BadStatus { url: url.to_owned(), status });
        }

        let is_image = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("image"));
        if !is_image {
            return Err(TemplateSourceError::NotAnImage(url.to_owned()));
        }

        let too_large = || TemplateSourceError::TooLarge { url: url.to_owned(), limit: self.max_bytes };
        let limit = u64::try_from(self.max_bytes).unwrap_or(u64::MAX);
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(fetch_error)? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

// =============================================================================
// RESOLVE
// =============================================================================

/// Turn a template link into a [`Template`]: download, decode,
/// detemplatize, then reduce onto `palette`.
///
/// # Errors
///
/// Any link, download, decode or build failure.
pub async fn resolve_template(
    raw_link: &str,
    fetcher: &dyn ImageFetcher,
    palette: Arc<Palette>,
) -> Result<Template, TemplateSourceError> {
    let link = parse_template_link(raw_link)?;
    let bytes = fetcher.fetch(&link.image_url).await?;

    tokio::task::spawn_blocking(move || {
        let image = detemplatize(&decode_image(&bytes)?, link.true_width);
        let meta = TemplateMeta { title: link.title, source_url: Some(link.link), preview_url: Some(link.image_url) };
        Ok(Template::build(image, (link.ox, link.oy), &palette, meta)?)
    })
    .await
    .map_err(|e| TemplateSourceError::Task(e.to_string()))?
}

#[cfg(test)]
#[path = "template_source_test.rs"]
mod tests;
