//! Request matching strategies for replay lookups

use crate::cassette::CapturedRequest;

/// Decides whether a live request corresponds to a recorded one
///
/// Implementations must be pure: the same pair of requests always yields the
/// same answer, and evaluating a match never has side effects. Exactly one
/// matcher is in effect per cassette; it is configuration and is never
/// persisted with the fixture.
pub trait Matcher: Send + Sync {
    /// Return `true` when `live` should be served by `recorded`
    fn matches(&self, live: &CapturedRequest, recorded: &CapturedRequest) -> bool;
}

impl<F> Matcher for F
where
    F: Fn(&CapturedRequest, &CapturedRequest) -> bool + Send + Sync,
{
    fn matches(&self, live: &CapturedRequest, recorded: &CapturedRequest) -> bool {
        self(live, recorded)
    }
}

/// Matches on method and exact URL string (query string included)
///
/// Headers, form values and bodies are deliberately not compared, so a
/// fixture keeps working when a client adds a header or tweaks a payload.
/// Tests that need stricter correlation install their own [`Matcher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMatcher;

impl Matcher for DefaultMatcher {
    fn matches(&self, live: &CapturedRequest, recorded: &CapturedRequest) -> bool {
        live.method == recorded.method && live.url == recorded.url
    }
}
