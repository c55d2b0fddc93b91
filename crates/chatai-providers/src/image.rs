//! Image ingestion for the vision backend.
//!
//! Downloads an image, sniffs its real format from the byte signature (never
//! the URL or `Content-Type`), and normalizes it to something the vision API
//! accepts: JPEG and PNG pass through untouched, GIF is reduced to its first
//! frame and re-encoded as JPEG, everything else is rejected.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::ImageFormat;
use tracing::debug;

/// Formats accepted by the vision backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }
}

/// Image bytes ready to attach to a prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedImage {
    pub data: Vec<u8>,
    pub kind: ImageKind,
}

/// Why an image could not be used.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("image request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("image download returned {0}")]
    Status(u16),
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("unsupported image type: {0}")]
    Unsupported(String),
}

/// Anything that can turn an image URL into attachable bytes.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError>;
}

/// HTTP-backed [`ImageSource`].
pub struct ImageFetcher {
    client: reqwest::Client,
}

impl ImageFetcher {
    pub fn new() -> Self {
        Self {
            client: crate::http_client(Duration::from_secs(30)),
        }
    }
}

impl Default for ImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageSource for ImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        debug!(url = %url, size = bytes.len(), "image downloaded");
        normalize(bytes.to_vec())
    }
}

/// Sniff the format and transcode when needed.
pub fn normalize(data: Vec<u8>) -> Result<FetchedImage, FetchError> {
    let format = image::guess_format(&data)
        .map_err(|_| FetchError::Unsupported("unknown".to_string()))?;

    match format {
        ImageFormat::Jpeg => Ok(FetchedImage {
            data,
            kind: ImageKind::Jpeg,
        }),
        ImageFormat::Png => Ok(FetchedImage {
            data,
            kind: ImageKind::Png,
        }),
        ImageFormat::Gif => {
            // Decoding a GIF yields its first frame.
            let frame = image::load_from_memory_with_format(&data, ImageFormat::Gif)?;
            let mut out = Cursor::new(Vec::new());
            frame.to_rgb8().write_to(&mut out, ImageFormat::Jpeg)?;
            Ok(FetchedImage {
                data: out.into_inner(),
                kind: ImageKind::Jpeg,
            })
        }
        other => Err(FetchError::Unsupported(
            other.to_mime_type().to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    fn sample_png() -> Vec<u8> {
        encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([200, 10, 10]))),
            ImageFormat::Png,
        )
    }

    fn sample_jpeg() -> Vec<u8> {
        encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 200, 10]))),
            ImageFormat::Jpeg,
        )
    }

    fn sample_gif() -> Vec<u8> {
        encode(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 10, 200, 255]))),
            ImageFormat::Gif,
        )
    }

    #[test]
    fn test_png_passes_through() {
        let png = sample_png();
        let fetched = normalize(png.clone()).unwrap();
        assert_eq!(fetched.kind, ImageKind::Png);
        assert_eq!(fetched.data, png);
    }

    #[test]
    fn test_jpeg_passes_through() {
        let jpeg = sample_jpeg();
        let fetched = normalize(jpeg.clone()).unwrap();
        assert_eq!(fetched.kind, ImageKind::Jpeg);
        assert_eq!(fetched.data, jpeg);
    }

    #[test]
    fn test_gif_becomes_jpeg() {
        let fetched = normalize(sample_gif()).unwrap();
        assert_eq!(fetched.kind, ImageKind::Jpeg);
        assert_eq!(
            image::guess_format(&fetched.data).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_unknown_bytes_rejected() {
        let err = normalize(b"definitely not an image".to_vec()).unwrap_err();
        assert!(matches!(err, FetchError::Unsupported(_)));
        assert!(err.to_string().starts_with("unsupported image type"));
    }

    #[test]
    fn test_other_image_format_rejected() {
        // BMP signature
        let mut bmp = b"BM".to_vec();
        bmp.extend_from_slice(&[0u8; 64]);
        let err = normalize(bmp).unwrap_err();
        assert!(matches!(err, FetchError::Unsupported(ref t) if t == "image/bmp"));
    }

    #[test]
    fn test_truncated_gif_is_decode_error() {
        let mut gif = sample_gif();
        gif.truncate(12);
        assert!(matches!(normalize(gif), Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(ImageKind::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(ImageKind::Png.mime_type(), "image/png");
    }

    #[tokio::test]
    async fn test_fetch_sniffs_bytes_not_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photo.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "image/jpeg")
                    .set_body_bytes(sample_png()),
            )
            .mount(&server)
            .await;

        let fetcher = ImageFetcher::new();
        let fetched = fetcher
            .fetch(&format!("{}/photo.jpg", server.uri()))
            .await
            .unwrap();
        assert_eq!(fetched.kind, ImageKind::Png);
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = ImageFetcher::new();
        let err = fetcher
            .fetch(&format!("{}/missing.png", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
    }

    #[tokio::test]
    async fn test_fetch_network_error() {
        let fetcher = ImageFetcher::new();
        let err = fetcher.fetch("http://127.0.0.1:1/x.png").await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }
}
