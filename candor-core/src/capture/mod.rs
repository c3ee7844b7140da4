//! Sealed capture: hash the captured bytes, then optionally locate.
//!
//! The hash is computed from exactly the bytes the camera produced, before any
//! location lookup and with no transform in between. Location is best effort:
//! a denied permission or a failing sensor leaves the location empty and never
//! fails the capture. Coordinates are fuzzed before they enter
//! [`CaptureMetadata`]; no higher-precision value is kept.

mod file;
mod mock;

pub use file::{FileCamera, NoLocation};
pub use mock::{FixedLocation, FixtureCamera};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::inflight::InFlight;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Capture already in progress")]
    Busy,

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Location error: {0}")]
    Location(String),

    #[error("Invalid image hash: {0}")]
    InvalidHash(String),
}

/// SHA-256 digest of the captured image bytes.
///
/// The raw form is the digest in output order (byte 0 first), which is the
/// layout the ledger instruction expects for its `[u8; 32]` argument.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHash([u8; 32]);

impl ImageHash {
    /// Hash the full byte content of an image.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let result = hasher.finalize();

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&result);
        Self(digest)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex digest.
    pub fn from_hex(hex_str: &str) -> Result<Self, CaptureError> {
        hex::decode(hex_str.trim())
            .map_err(|e| CaptureError::InvalidHash(format!("not hex: {e}")))?
            .try_into()
            .map(Self)
            .map_err(|v: Vec<u8>| {
                CaptureError::InvalidHash(format!("expected 32 bytes, got {}", v.len()))
            })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageHash({})", self.to_hex())
    }
}

impl Serialize for ImageHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ImageHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex_str = String::deserialize(deserializer)?;
        Self::from_hex(&hex_str).map_err(serde::de::Error::custom)
    }
}

/// Read-only handle to captured image data, owned by the capture source.
#[derive(Clone)]
pub struct ImageRef {
    uri: String,
    bytes: Arc<[u8]>,
}

impl ImageRef {
    pub fn new(uri: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            uri: uri.into(),
            bytes: bytes.into(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRef")
            .field("uri", &self.uri)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Position as reported by the device sensor, before fuzzing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub mocked: bool,
}

/// Privacy-reduced location attached to a capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Location {
    latitude: f64,
    longitude: f64,
    #[serde(rename = "location_accuracy")]
    accuracy: Option<f64>,
    #[serde(rename = "is_mocked")]
    mocked: bool,
}

impl Location {
    /// Fuzz a raw sensor position to `precision` decimal places.
    pub fn fuzzed(position: RawPosition, precision: u32) -> Self {
        Self {
            latitude: fuzz_coordinate(position.latitude, precision),
            longitude: fuzz_coordinate(position.longitude, precision),
            accuracy: position.accuracy,
            mocked: position.mocked,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Sensor-reported accuracy in meters. Informational only.
    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    /// Sensor reported a mock location provider. Informational only.
    pub fn is_mocked(&self) -> bool {
        self.mocked
    }
}

/// Hash the exact bytes of an image.
pub fn hash_image(bytes: &[u8]) -> ImageHash {
    ImageHash::of(bytes)
}

/// Round a coordinate to `precision` decimal places. One-way.
pub fn fuzz_coordinate(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Output of a sealed capture. Immutable: re-verifying means capturing again.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureMetadata {
    #[serde(rename = "image_uri", serialize_with = "serialize_image_uri")]
    image: ImageRef,
    image_hash: ImageHash,
    location: Option<Location>,
    timestamp: i64,
}

fn serialize_image_uri<S: Serializer>(image: &ImageRef, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(image.uri())
}

impl CaptureMetadata {
    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    pub fn image_hash(&self) -> &ImageHash {
        &self.image_hash
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Capture time in Unix seconds, stamped right after hashing.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Device camera.
#[async_trait]
pub trait CameraSource: Send + Sync {
    async fn take_picture(&self) -> Result<ImageRef, CaptureError>;
}

/// Device location sensor.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Ask for foreground location permission. `Ok(false)` means denied.
    async fn request_permission(&self) -> Result<bool, CaptureError>;

    async fn current_position(&self) -> Result<RawPosition, CaptureError>;
}

/// One camera session: takes pictures and seals them.
pub struct Capturer<C, L> {
    camera: C,
    location: L,
    precision: u32,
    in_flight: InFlight,
}

impl<C: CameraSource, L: LocationSource> Capturer<C, L> {
    pub fn new(camera: C, location: L, precision: u32) -> Self {
        Self {
            camera,
            location,
            precision,
            in_flight: InFlight::new(),
        }
    }

    /// Take a picture and seal it. A second call while one is outstanding is
    /// rejected with [`CaptureError::Busy`].
    #[instrument(level = "debug", skip(self))]
    pub async fn capture(&self, wants_location: bool) -> Result<CaptureMetadata, CaptureError> {
        let _guard = self.in_flight.try_acquire().ok_or(CaptureError::Busy)?;

        let image = self.camera.take_picture().await?;
        if image.is_empty() {
            return Err(CaptureError::Camera("camera returned no image data".into()));
        }
        debug!(uri = image.uri(), bytes = image.len(), "Picture taken");

        Ok(self.seal(image, wants_location).await)
    }

    /// Seal already-captured bytes: hash first, then the optional location.
    pub async fn seal(&self, image: ImageRef, wants_location: bool) -> CaptureMetadata {
        let image_hash = ImageHash::of(image.bytes());
        let timestamp = Utc::now().timestamp();

        let location = if wants_location {
            self.locate().await
        } else {
            None
        };

        info!(
            image_hash = %image_hash,
            has_location = location.is_some(),
            timestamp,
            "Capture sealed"
        );

        CaptureMetadata {
            image,
            image_hash,
            location,
            timestamp,
        }
    }

    async fn locate(&self) -> Option<Location> {
        match self.location.request_permission().await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Location permission denied");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Location permission request failed");
                return None;
            }
        }

        match self.location.current_position().await {
            Ok(position) => Some(Location::fuzzed(position, self.precision)),
            Err(e) => {
                warn!(error = %e, "Location lookup failed, continuing without it");
                None
            }
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.in_flight.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn position(latitude: f64, longitude: f64) -> RawPosition {
        RawPosition {
            latitude,
            longitude,
            accuracy: Some(12.5),
            mocked: false,
        }
    }

    #[test]
    fn test_hash_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            ImageHash::of(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_hex_and_bytes_agree() {
        let hash = ImageHash::of(b"pixels");
        let parsed = ImageHash::from_hex(&hash.to_hex()).expect("valid hex");
        assert_eq!(parsed, hash);
        assert_eq!(hash.as_bytes()[0], u8::from_str_radix(&hash.to_hex()[..2], 16).unwrap());
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(matches!(
            ImageHash::from_hex("zz"),
            Err(CaptureError::InvalidHash(_))
        ));
        assert!(matches!(
            ImageHash::from_hex("abcd"),
            Err(CaptureError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_fuzz_coordinate() {
        assert_eq!(fuzz_coordinate(37.774929, 3), 37.775);
        assert_eq!(fuzz_coordinate(-122.419416, 3), -122.419);
        assert_eq!(fuzz_coordinate(48.8566, 3), 48.857);
        assert_eq!(fuzz_coordinate(0.0, 3), 0.0);
    }

    #[test]
    fn test_fuzzed_location_keeps_informational_fields() {
        let location = Location::fuzzed(position(37.774929, -122.419416), 3);
        assert_eq!(location.latitude(), 37.775);
        assert_eq!(location.longitude(), -122.419);
        assert_eq!(location.accuracy(), Some(12.5));
        assert!(!location.is_mocked());
    }

    #[tokio::test]
    async fn test_capture_with_location() {
        let capturer = Capturer::new(
            FixtureCamera::new("file:///photo.jpg", b"jpeg-bytes".to_vec()),
            FixedLocation::granted(position(37.774929, -122.419416)),
            3,
        );

        let metadata = capturer.capture(true).await.expect("capture");
        assert_eq!(metadata.image_hash(), &ImageHash::of(b"jpeg-bytes"));
        let location = metadata.location().expect("location");
        assert_eq!(location.latitude(), 37.775);
        assert_eq!(location.longitude(), -122.419);
        assert!(!capturer.is_capturing());
    }

    #[tokio::test]
    async fn test_location_not_requested() {
        let location = FixedLocation::granted(position(1.0, 2.0));
        let capturer = Capturer::new(
            FixtureCamera::new("file:///a.jpg", b"a".to_vec()),
            location.clone(),
            3,
        );

        let metadata = capturer.capture(false).await.expect("capture");
        assert!(metadata.location().is_none());
        assert_eq!(location.permission_requests(), 0);
    }

    #[tokio::test]
    async fn test_denied_permission_yields_no_location() {
        let capturer = Capturer::new(
            FixtureCamera::new("file:///a.jpg", b"a".to_vec()),
            FixedLocation::denied(),
            3,
        );

        let metadata = capturer.capture(true).await.expect("capture succeeds");
        assert!(metadata.location().is_none());
    }

    #[tokio::test]
    async fn test_failing_sensor_never_aborts_capture() {
        let capturer = Capturer::new(
            FixtureCamera::new("file:///a.jpg", b"a".to_vec()),
            FixedLocation::failing(),
            3,
        );

        let metadata = capturer.capture(true).await.expect("capture succeeds");
        assert!(metadata.location().is_none());
    }

    #[tokio::test]
    async fn test_empty_picture_is_rejected() {
        let capturer = Capturer::new(
            FixtureCamera::new("file:///empty.jpg", Vec::new()),
            NoLocation,
            3,
        );
        assert!(matches!(
            capturer.capture(false).await,
            Err(CaptureError::Camera(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_capture_is_busy() {
        let capturer = Capturer::new(
            FixtureCamera::new("file:///a.jpg", b"a".to_vec()),
            FixedLocation::granted(position(1.0, 2.0)).with_delay(Duration::from_millis(50)),
            3,
        );

        let (first, second) = tokio::join!(capturer.capture(true), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            capturer.capture(true).await
        });

        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), CaptureError::Busy);
    }
}
