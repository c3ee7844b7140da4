//! Fixture capture sources for tests and offline runs.
//! WARNING: these never touch real hardware.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{CameraSource, CaptureError, ImageRef, LocationSource, RawPosition};

/// Camera that always returns the same bytes.
#[derive(Debug, Clone)]
pub struct FixtureCamera {
    image: ImageRef,
}

impl FixtureCamera {
    pub fn new(uri: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            image: ImageRef::new(uri, bytes),
        }
    }
}

#[async_trait]
impl CameraSource for FixtureCamera {
    async fn take_picture(&self) -> Result<ImageRef, CaptureError> {
        Ok(self.image.clone())
    }
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Granted(RawPosition),
    Denied,
    Failing,
}

/// Location source with a fixed answer and an optional artificial delay.
#[derive(Debug, Clone)]
pub struct FixedLocation {
    behavior: Behavior,
    delay: Duration,
    permission_requests: Arc<AtomicU32>,
}

impl FixedLocation {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            permission_requests: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Permission granted, sensor returns `position`.
    pub fn granted(position: RawPosition) -> Self {
        Self::with_behavior(Behavior::Granted(position))
    }

    /// Permission denied.
    pub fn denied() -> Self {
        Self::with_behavior(Behavior::Denied)
    }

    /// Permission granted, sensor errors.
    pub fn failing() -> Self {
        Self::with_behavior(Behavior::Failing)
    }

    /// Delay every sensor response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn permission_requests(&self) -> u32 {
        self.permission_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationSource for FixedLocation {
    async fn request_permission(&self) -> Result<bool, CaptureError> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        Ok(!matches!(self.behavior, Behavior::Denied))
    }

    async fn current_position(&self) -> Result<RawPosition, CaptureError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behavior {
            Behavior::Granted(position) => Ok(position),
            Behavior::Denied => Err(CaptureError::Location("permission denied".into())),
            Behavior::Failing => Err(CaptureError::Location("sensor unavailable".into())),
        }
    }
}
