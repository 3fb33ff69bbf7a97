use std::fmt;

/// Locale used when nothing else has been configured.
pub const DEFAULT_LOCALE: &str = "en";

/// Authenticated caller, as seen by guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Unique identifier of the user or service account.
    pub id: String,
    /// Role key checked by role guards (e.g. `"admin"`).
    pub role: String,
}

impl Actor {
    #[must_use]
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }
}

/// Language tag used to resolve human-readable details.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locale(String);

impl Locale {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Replaces this locale with `other` unless `other` is empty.
    ///
    /// This is the rule every `UseCase::set_locale` follows: an unset locale
    /// never erases one that was configured earlier.
    pub fn apply(&mut self, other: &Locale) {
        if !other.is_empty() {
            self.0.clone_from(&other.0);
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self(DEFAULT_LOCALE.to_string())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trace identity inherited by nested operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    /// Distributed trace identifier. Empty until the first span is started.
    pub trace_id: String,
    /// Identifier of the innermost active span, if any.
    pub span_id: Option<String>,
}

/// Per-request carrier threaded through every use case and DAG step.
///
/// All fields are owned, so a clone is a full, independent copy. Work handed to
/// another task must receive a [`RequestContext::snapshot`], never a reference
/// to the live carrier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Transport-assigned request identifier (e.g. `X-Request-Id`).
    pub request_id: String,
    /// Authenticated caller. `None` for anonymous requests.
    pub actor: Option<Actor>,
    /// Trace identity of the enclosing span.
    pub trace: TraceContext,
}

impl RequestContext {
    #[must_use]
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Returns a copy whose trace identity is `trace`.
    #[must_use]
    pub fn with_trace(&self, trace: TraceContext) -> Self {
        Self {
            trace,
            ..self.clone()
        }
    }

    /// Frozen copy for work that outlives the current request.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_locale_does_not_erase_configured_one() {
        let mut locale = Locale::new("es");
        locale.apply(&Locale::new(""));
        assert_eq!(locale.as_str(), "es");

        locale.apply(&Locale::new("  "));
        assert_eq!(locale.as_str(), "es");

        locale.apply(&Locale::new("fr"));
        assert_eq!(locale.as_str(), "fr");
    }

    #[test]
    fn default_locale_is_english() {
        assert_eq!(Locale::default().as_str(), DEFAULT_LOCALE);
    }

    #[test]
    fn with_trace_keeps_request_identity() {
        let ctx = RequestContext::new("req-1").with_actor(Actor::new("u1", "admin"));
        let child = ctx.with_trace(TraceContext {
            trace_id: "t1".to_string(),
            span_id: Some("s1".to_string()),
        });

        assert_eq!(child.request_id, "req-1");
        assert_eq!(child.actor, ctx.actor);
        assert_eq!(child.trace.trace_id, "t1");
        assert!(ctx.trace.trace_id.is_empty());
    }

    #[test]
    fn snapshot_is_independent_of_the_original() {
        let mut ctx = RequestContext::new("req-2").with_actor(Actor::new("u1", "user"));
        let frozen = ctx.snapshot();

        ctx.actor = None;
        ctx.request_id.push_str("-mutated");

        assert_eq!(frozen.request_id, "req-2");
        assert_eq!(frozen.actor, Some(Actor::new("u1", "user")));
    }
}
