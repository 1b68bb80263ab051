//! # Pipeline Wiring
//!
//! Owns a [`Reconstructor`] and a [`Dispatcher`] and forwards commits from
//! one to the other, so hosts integrate against a single entry point per
//! input source:
//!
//! - `feed_key` / `feed_text` for the HID (keyboard-wedge) stream
//! - `dispatch_camera` for camera decodes (already discrete values)
//! - `poll_idle` from the host's timer tick
//!
//! A scanner-health ping fires on every accepted HID commit. Camera
//! decodes do not ping it: the indicator answers "is the hardware scanner
//! alive", not "did any scan happen".

use std::sync::Arc;

use tracing::debug;

use crate::clock::Clock;
use crate::dispatcher::{DispatchOutcome, Dispatcher, DispatcherConfig, ScanHost};
use crate::reconstructor::{CommittedScan, Reconstructor, ReconstructorConfig};

/// Reconstructor + dispatcher, wired.
pub struct ScanPipeline {
    reconstructor: Reconstructor,
    dispatcher: Dispatcher,
    health_ping: Option<Box<dyn FnMut() + Send>>,
}

impl ScanPipeline {
    pub fn new(
        reconstructor_config: ReconstructorConfig,
        dispatcher_config: DispatcherConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ScanPipeline {
            reconstructor: Reconstructor::new(reconstructor_config, Arc::clone(&clock)),
            dispatcher: Dispatcher::new(dispatcher_config, clock),
            health_ping: None,
        }
    }

    /// Installs the scanner-health callback (e.g. refreshes a status dot).
    pub fn with_health_ping(mut self, ping: Box<dyn FnMut() + Send>) -> Self {
        self.health_ping = Some(ping);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn reconstructor(&self) -> &Reconstructor {
        &self.reconstructor
    }

    /// Feeds one discrete key event; dispatches if it completed a scan.
    pub async fn feed_key<H: ScanHost>(
        &mut self,
        host: &mut H,
        key: &str,
    ) -> Option<DispatchOutcome> {
        let scan = self.reconstructor.feed_key(key)?;
        Some(self.dispatch_hid(host, scan).await)
    }

    /// Feeds the cumulative text-field value; dispatches every completed
    /// scan it yields, returning the outcomes in order.
    pub async fn feed_text<H: ScanHost>(
        &mut self,
        host: &mut H,
        value: &str,
    ) -> Vec<DispatchOutcome> {
        let scans = self.reconstructor.feed_text(value);
        let mut outcomes = Vec::with_capacity(scans.len());
        for scan in scans {
            outcomes.push(self.dispatch_hid(host, scan).await);
        }
        outcomes
    }

    /// Host timer tick: commits and dispatches an idle buffer if due.
    pub async fn poll_idle<H: ScanHost>(&mut self, host: &mut H) -> Option<DispatchOutcome> {
        let scan = self.reconstructor.poll_idle()?;
        Some(self.dispatch_hid(host, scan).await)
    }

    /// Camera decodes bypass the reconstructor: the decoder already emits
    /// discrete values, and frame repeats are handled by the duplicate
    /// windows downstream.
    pub async fn dispatch_camera<H: ScanHost>(
        &mut self,
        host: &mut H,
        value: &str,
        format: Option<String>,
    ) -> DispatchOutcome {
        debug!(value, "camera decode");
        self.dispatcher
            .dispatch(host, CommittedScan::camera(value, format))
            .await
    }

    async fn dispatch_hid<H: ScanHost>(
        &mut self,
        host: &mut H,
        scan: CommittedScan,
    ) -> DispatchOutcome {
        if let Some(ping) = &mut self.health_ping {
            ping();
        }
        self.dispatcher.dispatch(host, scan).await
    }
}
