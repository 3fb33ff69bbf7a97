//! Composable authorization guards.
//!
//! A [`Guard`] inspects the calling [`Actor`] and the use-case input and either
//! lets the call through (`None`) or names the reason it was refused. A
//! [`GuardSet`] evaluates its guards in registration order and stops at the
//! first refusal. [`Guarded`] runs a guard set in front of a use case body.

use std::borrow::Cow;

use async_trait::async_trait;
use tracing::debug;

use crate::context::{Actor, Locale, RequestContext};
use crate::result::{AppStatus, UseCaseResult};
use crate::traits::UseCase;

// ---------------------------------------------------------------------------
// GuardFailure
// ---------------------------------------------------------------------------

/// Refusal reason produced by a guard.
///
/// `key` is a locale-independent message key resolved by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("guard refused access: {key}")]
pub struct GuardFailure {
    key: Cow<'static, str>,
}

impl GuardFailure {
    pub const ACTOR_MISSING: Self = Self::new("guard.actor_missing");
    pub const ROLE_DENIED: Self = Self::new("guard.role_denied");
    pub const SELF_ACCESS_DENIED: Self = Self::new("guard.self_access_denied");
    pub const RESOURCE_NOT_OWNED: Self = Self::new("guard.resource_not_owned");

    #[must_use]
    pub const fn new(key: &'static str) -> Self {
        Self {
            key: Cow::Borrowed(key),
        }
    }

    /// Failure with a key built at runtime.
    #[must_use]
    pub fn custom(key: impl Into<String>) -> Self {
        Self {
            key: Cow::Owned(key.into()),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

// ---------------------------------------------------------------------------
// Guard trait
// ---------------------------------------------------------------------------

/// Authorization predicate over an actor and an input of type `I`.
pub trait Guard<I: ?Sized>: Send + Sync {
    /// Returns `None` to allow the call, or the reason it is refused.
    fn check(&self, actor: &Actor, input: &I) -> Option<GuardFailure>;
}

impl<I: ?Sized, F> Guard<I> for F
where
    F: Fn(&Actor, &I) -> Option<GuardFailure> + Send + Sync,
{
    fn check(&self, actor: &Actor, input: &I) -> Option<GuardFailure> {
        self(actor, input)
    }
}

// ---------------------------------------------------------------------------
// Built-in guards
// ---------------------------------------------------------------------------

/// Allows actors whose role is in the allow-list.
#[derive(Debug, Clone)]
pub struct RoleGuard {
    allowed: Vec<String>,
}

impl RoleGuard {
    pub fn new<R: Into<String>>(roles: impl IntoIterator<Item = R>) -> Self {
        Self {
            allowed: roles.into_iter().map(Into::into).collect(),
        }
    }
}

impl<I: ?Sized> Guard<I> for RoleGuard {
    fn check(&self, actor: &Actor, _input: &I) -> Option<GuardFailure> {
        if self.allowed.iter().any(|role| *role == actor.role) {
            None
        } else {
            Some(GuardFailure::ROLE_DENIED)
        }
    }
}

/// Allows actors acting on their own identifier.
///
/// The input is the scalar identifier being accessed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfAccessGuard;

impl<I: AsRef<str> + ?Sized> Guard<I> for SelfAccessGuard {
    fn check(&self, actor: &Actor, input: &I) -> Option<GuardFailure> {
        if !actor.id.is_empty() && actor.id == input.as_ref() {
            None
        } else {
            Some(GuardFailure::SELF_ACCESS_DENIED)
        }
    }
}

/// Inputs that name the user owning the resource they touch.
pub trait OwnedResource {
    /// Owner identifier, or `None` when the input carries none.
    fn user_id(&self) -> Option<&str>;
}

/// Allows actors that own the resource referenced by the input.
///
/// Fails closed: an input without an owner id is refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnedResourceGuard;

impl<I: OwnedResource + ?Sized> Guard<I> for OwnedResourceGuard {
    fn check(&self, actor: &Actor, input: &I) -> Option<GuardFailure> {
        match input.user_id() {
            Some(owner) if !owner.is_empty() && owner == actor.id => None,
            _ => Some(GuardFailure::RESOURCE_NOT_OWNED),
        }
    }
}

// ---------------------------------------------------------------------------
// GuardSet
// ---------------------------------------------------------------------------

/// Ordered, short-circuiting sequence of guards bound to one actor.
pub struct GuardSet<I: ?Sized> {
    actor: Option<Actor>,
    guards: Vec<Box<dyn Guard<I>>>,
}

impl<I: ?Sized> GuardSet<I> {
    /// Creates an empty set, which always passes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            actor: None,
            guards: Vec::new(),
        }
    }

    /// Appends a guard. Guards run in the order they were added.
    #[must_use]
    pub fn with(mut self, guard: impl Guard<I> + 'static) -> Self {
        self.guards.push(Box::new(guard));
        self
    }

    /// Binds the actor every subsequent `validate` call checks against.
    pub fn set_actor(&mut self, actor: Actor) {
        self.actor = Some(actor);
    }

    #[must_use]
    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Evaluates against the bound actor.
    pub fn validate(&self, input: &I) -> Option<GuardFailure> {
        self.validate_as(self.actor.as_ref(), input)
    }

    /// Evaluates against an explicit actor, leaving the bound one untouched.
    ///
    /// Returns the first refusal in registration order. A non-empty set with no
    /// actor refuses with [`GuardFailure::ACTOR_MISSING`].
    pub fn validate_as(&self, actor: Option<&Actor>, input: &I) -> Option<GuardFailure> {
        if self.guards.is_empty() {
            return None;
        }
        let Some(actor) = actor else {
            return Some(GuardFailure::ACTOR_MISSING);
        };
        self.guards.iter().find_map(|guard| guard.check(actor, input))
    }
}

impl<I: ?Sized> Default for GuardSet<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ?Sized> std::fmt::Debug for GuardSet<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardSet")
            .field("actor", &self.actor)
            .field("guards", &self.guards.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Guarded use case
// ---------------------------------------------------------------------------

/// Use case wrapper that authorizes the request actor before running the body.
///
/// A refusal yields an [`AppStatus::Unauthorized`] result whose message is the
/// guard's key; the wrapped body is never entered.
pub struct Guarded<U: UseCase> {
    inner: U,
    guards: GuardSet<U::Input>,
}

impl<U: UseCase> Guarded<U> {
    pub fn new(inner: U, guards: GuardSet<U::Input>) -> Self {
        Self { inner, guards }
    }

    pub fn inner(&self) -> &U {
        &self.inner
    }
}

#[async_trait]
impl<U: UseCase> UseCase for Guarded<U> {
    type Input = U::Input;
    type Output = U::Output;

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn set_locale(&mut self, locale: &Locale) {
        self.inner.set_locale(locale);
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        locale: &Locale,
        input: Self::Input,
    ) -> UseCaseResult<Self::Output> {
        if let Some(failure) = self.guards.validate_as(ctx.actor.as_ref(), &input) {
            debug!(
                use_case = self.inner.name(),
                request_id = %ctx.request_id,
                reason = failure.key(),
                "guard refused request"
            );
            return UseCaseResult::failure(AppStatus::Unauthorized, failure.key());
        }
        self.inner.execute(ctx, locale, input).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;

    struct Document {
        owner: Option<String>,
    }

    impl OwnedResource for Document {
        fn user_id(&self) -> Option<&str> {
            self.owner.as_deref()
        }
    }

    fn user(id: &str) -> Actor {
        Actor::new(id, "user")
    }

    #[test]
    fn empty_set_always_passes() {
        let guards: GuardSet<str> = GuardSet::new();
        assert!(guards.validate("anything").is_none());
        assert!(guards.validate_as(None, "anything").is_none());
    }

    #[test]
    fn non_empty_set_without_actor_fails_closed() {
        let guards: GuardSet<str> = GuardSet::new().with(RoleGuard::new(["admin"]));
        assert_eq!(guards.validate("x"), Some(GuardFailure::ACTOR_MISSING));
    }

    #[test]
    fn role_guard_checks_allow_list() {
        let mut guards: GuardSet<str> = GuardSet::new().with(RoleGuard::new(["admin", "staff"]));
        guards.set_actor(Actor::new("u1", "staff"));
        assert!(guards.validate("x").is_none());

        guards.set_actor(Actor::new("u1", "user"));
        assert_eq!(guards.validate("x"), Some(GuardFailure::ROLE_DENIED));
    }

    #[test]
    fn self_access_guard_compares_ids() {
        let mut guards: GuardSet<String> = GuardSet::new().with(SelfAccessGuard);
        guards.set_actor(user("u1"));

        assert!(guards.validate(&"u1".to_string()).is_none());
        assert_eq!(
            guards.validate(&"u2".to_string()),
            Some(GuardFailure::SELF_ACCESS_DENIED)
        );
    }

    #[test]
    fn self_access_guard_refuses_empty_actor_id() {
        let mut guards: GuardSet<str> = GuardSet::new().with(SelfAccessGuard);
        guards.set_actor(user(""));
        assert_eq!(guards.validate(""), Some(GuardFailure::SELF_ACCESS_DENIED));
    }

    #[test]
    fn owned_resource_guard_fails_closed_without_owner() {
        let mut guards: GuardSet<Document> = GuardSet::new().with(OwnedResourceGuard);
        guards.set_actor(user("u1"));

        let mine = Document {
            owner: Some("u1".to_string()),
        };
        let theirs = Document {
            owner: Some("u2".to_string()),
        };
        let orphan = Document { owner: None };

        assert!(guards.validate(&mine).is_none());
        assert_eq!(
            guards.validate(&theirs),
            Some(GuardFailure::RESOURCE_NOT_OWNED)
        );
        assert_eq!(
            guards.validate(&orphan),
            Some(GuardFailure::RESOURCE_NOT_OWNED)
        );
    }

    #[test]
    fn role_failure_short_circuits_before_self_access() {
        let reached = Arc::new(AtomicU32::new(0));
        let probe = {
            let reached = Arc::clone(&reached);
            move |actor: &Actor, input: &String| {
                reached.fetch_add(1, Ordering::SeqCst);
                SelfAccessGuard.check(actor, input)
            }
        };

        let mut guards: GuardSet<String> = GuardSet::new()
            .with(RoleGuard::new(["admin"]))
            .with(probe);
        guards.set_actor(user("u1"));

        let failure = guards.validate(&"u2".to_string());
        assert_eq!(failure, Some(GuardFailure::ROLE_DENIED));
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn closure_guards_can_build_custom_keys() {
        let mut guards: GuardSet<u32> = GuardSet::new().with(|_: &Actor, amount: &u32| {
            (*amount > 100).then(|| GuardFailure::custom("guard.amount_over_limit"))
        });
        guards.set_actor(user("u1"));

        assert!(guards.validate(&10).is_none());
        assert_eq!(
            guards.validate(&500).map(|f| f.key().to_string()),
            Some("guard.amount_over_limit".to_string())
        );
    }

    proptest! {
        #[test]
        fn validate_returns_first_failure_in_order(outcomes in proptest::collection::vec(proptest::option::of(0_u8..8), 0..12)) {
            let mut guards: GuardSet<()> = GuardSet::new();
            for outcome in outcomes.clone() {
                guards = guards.with(move |_: &Actor, _: &()| {
                    outcome.map(|code| GuardFailure::custom(format!("guard.{code}")))
                });
            }
            guards.set_actor(user("u1"));

            let expected = outcomes
                .iter()
                .find_map(|o| o.map(|code| format!("guard.{code}")));
            let actual = guards.validate(&()).map(|f| f.key().to_string());
            prop_assert_eq!(actual, expected);
        }
    }

    // -- Guarded --------------------------------------------------------------

    struct DeleteAccount {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl UseCase for DeleteAccount {
        type Input = String;
        type Output = ();

        fn set_locale(&mut self, _locale: &Locale) {}

        async fn execute(
            &self,
            _ctx: &RequestContext,
            _locale: &Locale,
            _input: String,
        ) -> UseCaseResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            UseCaseResult::success(AppStatus::Success, ())
        }
    }

    #[tokio::test]
    async fn guarded_refuses_before_body() {
        let calls = Arc::new(AtomicU32::new(0));
        let use_case = Guarded::new(
            DeleteAccount {
                calls: Arc::clone(&calls),
            },
            GuardSet::new().with(SelfAccessGuard),
        );

        let ctx = RequestContext::new("r1").with_actor(user("u1"));
        let result = use_case
            .execute(&ctx, &Locale::default(), "u2".to_string())
            .await;

        assert_eq!(result.status(), Some(AppStatus::Unauthorized));
        assert_eq!(
            result.error().map(|e| e.message.as_str()),
            Some("guard.self_access_denied")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn guarded_runs_body_when_allowed() {
        let calls = Arc::new(AtomicU32::new(0));
        let use_case = Guarded::new(
            DeleteAccount {
                calls: Arc::clone(&calls),
            },
            GuardSet::new().with(SelfAccessGuard),
        );

        let ctx = RequestContext::new("r1").with_actor(user("u1"));
        let result = use_case
            .execute(&ctx, &Locale::default(), "u1".to_string())
            .await;

        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
