//! Candidate validation: fetches a candidate image, measures it and
//! applies the quality gate.

use crate::scrape::{Accept, NetworkClient};
use image::ImageReader;
use std::io::Cursor;

/// Smallest area usable as a display-size cover (about 300x300).
/// Candidates must be strictly larger.
pub const MIN_COVER_PIXELS: u64 = 90_000;

/// Bytes of a fetched candidate, kept so the winner is not downloaded twice
#[derive(Clone, Debug, PartialEq)]
pub struct ImageAsset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Validation {
    pub accepted: bool,
    pub width: u32,
    pub height: u32,
    pub asset: Option<ImageAsset>,
}

impl Validation {
    pub fn rejected() -> Self {
        Self {
            accepted: false,
            width: 0,
            height: 0,
            asset: None,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

pub fn passes_quality_gate(width: u32, height: u32) -> bool {
    width as u64 * height as u64 > MIN_COVER_PIXELS
}

/// Checks if bytes look like HTML content (case-insensitive check of first 50 bytes).
fn is_html_content(bytes: &[u8]) -> bool {
    let check_len = bytes.len().min(50);
    let prefix = bytes[0..check_len].trim_ascii_start().to_ascii_lowercase();

    prefix.starts_with(b"<!doctype") || prefix.starts_with(b"<html")
}

/// Decodes only the header, so large covers stay cheap to measure.
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.is_empty() || is_html_content(bytes) {
        return None;
    }

    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
        .filter(|(w, h)| *w > 0 && *h > 0)
}

#[derive(Clone)]
pub struct Validator {
    net: NetworkClient,
    head_precheck: bool,
}

impl Validator {
    pub fn new(net: NetworkClient, head_precheck: bool) -> Self {
        Self { net, head_precheck }
    }

    /// Never fails: network errors and undecodable bodies are soft
    /// rejections with zero dimensions.
    pub fn validate(&self, url: &str) -> Validation {
        if self.head_precheck {
            match self.net.head(url, Accept::Image) {
                Ok(resp) => {
                    if let Some(ct) = resp.content_type() {
                        if !ct.starts_with("image/") && ct != "application/octet-stream" {
                            log::debug!("{url}: not an image ({ct}), skipping download");
                            return Validation::rejected();
                        }
                    }
                }
                // plenty of CDNs refuse HEAD, fall through to GET
                Err(err) => log::debug!("{url}: HEAD failed: {err}"),
            }
        }

        let resp = match self.net.get(url, Accept::Image, None) {
            Ok(resp) => resp,
            Err(err) => {
                log::debug!("{url}: {err}");
                return Validation::rejected();
            }
        };

        let Some((width, height)) = image_dimensions(&resp.body) else {
            log::debug!("{url}: could not decode image ({} bytes)", resp.body.len());
            return Validation::rejected();
        };

        let accepted = passes_quality_gate(width, height);
        log::debug!(
            "{url}: {width}x{height} {}",
            if accepted { "accepted" } else { "below quality gate" }
        );

        Validation {
            accepted,
            width,
            height,
            asset: Some(ImageAsset {
                content_type: resp.content_type(),
                bytes: resp.body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::NetworkConfig,
        tests::mock::{png_bytes, MockTransport, Reply},
    };
    use std::sync::Arc;

    fn validator(mock: &Arc<MockTransport>, head_precheck: bool) -> Validator {
        let config = NetworkConfig {
            retry_delay_ms: 0,
            block_private_ips: false,
            ..Default::default()
        };
        Validator::new(
            NetworkClient::with_transport(&config, mock.clone()),
            head_precheck,
        )
    }

    #[test]
    fn test_quality_gate_boundary() {
        assert!(!passes_quality_gate(300, 300));
        assert!(passes_quality_gate(301, 300));
        assert!(!passes_quality_gate(200, 200));
        assert!(passes_quality_gate(500, 500));
        assert!(!passes_quality_gate(0, 0));
    }

    #[test]
    fn test_image_dimensions() {
        assert_eq!(image_dimensions(&png_bytes(120, 80)), Some((120, 80)));
        assert_eq!(image_dimensions(&[]), None);
        assert_eq!(image_dimensions(b"<!DOCTYPE html><html></html>"), None);
        assert_eq!(image_dimensions(b"\x89PNG garbage"), None);
    }

    #[test]
    fn test_large_image_accepted() {
        let mock = Arc::new(MockTransport::new());
        mock.on("https://img.test/big.png", Reply::image(500, 500));

        let v = validator(&mock, true).validate("https://img.test/big.png");
        assert!(v.accepted);
        assert_eq!((v.width, v.height), (500, 500));

        let asset = v.asset.unwrap();
        assert_eq!(asset.content_type.as_deref(), Some("image/png"));
        assert!(!asset.bytes.is_empty());
    }

    #[test]
    fn test_small_image_rejected_with_dimensions() {
        let mock = Arc::new(MockTransport::new());
        mock.on("https://img.test/small.png", Reply::image(200, 200));

        let v = validator(&mock, false).validate("https://img.test/small.png");
        assert!(!v.accepted);
        assert_eq!(v.area(), 40_000);
        assert!(v.asset.is_some());
    }

    #[test]
    fn test_html_body_is_soft_rejection() {
        let mock = Arc::new(MockTransport::new());
        mock.on("https://img.test/page", Reply::html("<html>login</html>"));

        let v = validator(&mock, false).validate("https://img.test/page");
        assert_eq!(v, Validation::rejected());
    }

    #[test]
    fn test_head_precheck_skips_download() {
        let mock = Arc::new(MockTransport::new());
        mock.on("https://img.test/page", Reply::html("<html>login</html>"));

        let v = validator(&mock, true).validate("https://img.test/page");
        assert_eq!(v, Validation::rejected());

        let methods = mock
            .requests()
            .iter()
            .map(|r| r.method)
            .collect::<Vec<_>>();
        assert_eq!(methods, vec![crate::scrape::Method::Head]);
    }

    #[test]
    fn test_default_config_makes_one_request_per_candidate() {
        let mock = Arc::new(MockTransport::new());
        mock.on("https://img.test/big.png", Reply::image(500, 500));

        let head_precheck = crate::config::CascadeConfig::default().head_precheck;
        let v = validator(&mock, head_precheck).validate("https://img.test/big.png");

        assert!(v.accepted);
        assert_eq!(mock.total_calls(), 1);
    }

    #[test]
    fn test_rate_limited_head_is_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.on_sequence(
            "https://img.test/big.png",
            vec![Reply::status(503), Reply::image(500, 500)],
        );

        let v = validator(&mock, true).validate("https://img.test/big.png");
        assert!(v.accepted);

        let methods = mock
            .requests()
            .iter()
            .map(|r| r.method)
            .collect::<Vec<_>>();
        assert_eq!(
            methods,
            vec![crate::scrape::Method::Head, crate::scrape::Method::Get]
        );
    }

    #[test]
    fn test_network_failure_is_soft_rejection() {
        let mock = Arc::new(MockTransport::new());
        mock.on("https://img.test/gone.jpg", Reply::status(404));

        let v = validator(&mock, true).validate("https://img.test/gone.jpg");
        assert_eq!(v, Validation::rejected());
    }
}
