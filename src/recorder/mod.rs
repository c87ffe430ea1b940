//! Recorder: a transport that records live exchanges or replays them from a cassette

mod capture;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use hyper::{Request, Response};
use tracing::{debug, info, warn};

use crate::cassette::{Cassette, Interaction};
use crate::config::{Config, Mode};
use crate::matcher::Matcher;
use crate::transport::{collect_body, full, Body, HttpTransport, Transport};
use crate::{Result, TapedeckError};

use capture::{capture_request, capture_response, synthesize_response};

/// Records or replays HTTP interactions for one cassette
///
/// The mode is fixed at construction. In [`Mode::Recording`] every request goes
/// to the wrapped transport and the exchange is appended to the cassette; in
/// [`Mode::Replaying`] requests are answered from the cassette and the network
/// is never touched. After [`Recorder::stop`] the recorder refuses requests.
pub struct Recorder {
    cassette: Cassette,
    mode: Mode,
    transport: Arc<dyn Transport>,
    stopped: AtomicBool,
}

impl Recorder {
    /// Create a recorder bound to the fixture `name`
    ///
    /// Recording starts from an empty cassette; replaying loads the fixture.
    /// When `transport` is `None` a default [`HttpTransport`] is used.
    ///
    /// # Errors
    ///
    /// Returns [`TapedeckError::Load`] if replaying and the fixture cannot be
    /// loaded
    pub fn new(name: &str, mode: Mode, transport: Option<Arc<dyn Transport>>) -> Result<Self> {
        let cassette = match mode {
            Mode::Recording => Cassette::new(name),
            Mode::Replaying => Cassette::load(name)?,
        };

        let transport =
            transport.unwrap_or_else(|| Arc::new(HttpTransport::new()) as Arc<dyn Transport>);

        info!("Recorder started: cassette '{}' ({:?})", name, mode);

        Ok(Self {
            cassette,
            mode,
            transport,
            stopped: AtomicBool::new(false),
        })
    }

    /// Create a recorder using mode, cassette directory and transport settings
    /// from `config`
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the fixture cannot be
    /// loaded for replay
    pub fn from_config(name: &str, config: &Config) -> Result<Self> {
        config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::with_config(&config.transport));
        Self::new(&config.cassette_name(name), config.mode, Some(transport))
    }

    /// Replace the matcher used for replay lookups
    pub fn set_matcher(&mut self, matcher: impl Matcher + 'static) {
        self.cassette.set_matcher(matcher);
    }

    /// Operating mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The bound cassette
    #[must_use]
    pub fn cassette(&self) -> &Cassette {
        &self.cassette
    }

    /// Whether [`Recorder::stop`] has been called
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Handle one outgoing request
    ///
    /// # Errors
    ///
    /// - [`TapedeckError::Stopped`] once the recorder is stopped
    /// - whatever the wrapped transport returned, unchanged, when recording
    /// - [`TapedeckError::InteractionNotFound`] when replaying and no
    ///   unconsumed interaction matches
    pub async fn intercept(&self, request: Request<Body>) -> Result<Response<Body>> {
        if self.is_stopped() {
            return Err(TapedeckError::Stopped);
        }

        match self.mode {
            Mode::Recording => self.record(request).await,
            Mode::Replaying => self.replay(request).await,
        }
    }

    /// Stop the recorder, persisting the cassette when recording
    ///
    /// A replaying recorder leaves the fixture untouched, since its cassette
    /// only holds what was left unconsumed. Calling stop again re-saves the
    /// same sequence.
    ///
    /// # Errors
    ///
    /// Returns [`TapedeckError::Persistence`] if the cassette cannot be saved
    pub fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            debug!("Recorder for '{}' already stopped", self.cassette.name());
        }

        if self.mode.is_recording() {
            self.cassette.save()?;
        }

        info!(
            "Recorder stopped: cassette '{}' ({:?})",
            self.cassette.name(),
            self.mode
        );

        Ok(())
    }

    async fn record(&self, request: Request<Body>) -> Result<Response<Body>> {
        let (parts, body) = request.into_parts();
        let body = collect_body(body).await?;
        let captured_request = capture_request(&parts, body.clone());

        let response = self
            .transport
            .round_trip(Request::from_parts(parts, full(body)))
            .await?;

        let (parts, body) = response.into_parts();
        let body = collect_body(body).await?;
        let captured_response = capture_response(&parts, body.clone());

        debug!(
            "Recorded interaction: {} {} -> {}",
            captured_request.method, captured_request.url, captured_response.code
        );

        self.cassette
            .append(Interaction::new(captured_request, captured_response));

        Ok(Response::from_parts(parts, full(body)))
    }

    async fn replay(&self, request: Request<Body>) -> Result<Response<Body>> {
        let (parts, body) = request.into_parts();
        let body = collect_body(body).await?;
        let live = capture_request(&parts, body);

        match self.cassette.find_and_consume(&live) {
            Ok(interaction) => {
                debug!(
                    "Replayed interaction: {} {} -> {}",
                    live.method, live.url, interaction.response.code
                );
                synthesize_response(interaction.response)
            }
            Err(e) => {
                warn!(
                    "No recorded interaction for {} {} (cassette: {})",
                    live.method,
                    live.url,
                    self.cassette.name()
                );
                Err(e)
            }
        }
    }
}

impl Transport for Recorder {
    fn round_trip(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>>> {
        Box::pin(self.intercept(request))
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("cassette", &self.cassette)
            .field("mode", &self.mode)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
