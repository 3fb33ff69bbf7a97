use async_trait::async_trait;

use crate::context::{Locale, RequestContext};
use crate::result::UseCaseResult;

/// Contract every business operation implements.
///
/// A use case is a plain, independently testable unit. Its only visible effects
/// are the returned [`UseCaseResult`] and explicit collaborator calls made by the
/// body (repository writes, email sends). It must be callable repeatedly and
/// must not keep state between calls beyond what was injected at construction.
#[async_trait]
pub trait UseCase: Send + Sync + 'static {
    /// Input accepted by [`UseCase::execute`].
    type Input: Send + 'static;
    /// Payload of a successful result.
    type Output: Send + 'static;

    /// Operation name used for spans, metric labels, and logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Configures the locale for details resolution.
    ///
    /// An empty locale is a no-op; implementations delegate to [`Locale::apply`].
    fn set_locale(&mut self, locale: &Locale);

    /// Runs the operation.
    async fn execute(
        &self,
        ctx: &RequestContext,
        locale: &Locale,
        input: Self::Input,
    ) -> UseCaseResult<Self::Output>;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::result::{AppStatus, UseCaseError};

    /// Issues the two tokens of a login, stopping at the first failure.
    trait TokenIssuer: Send + Sync {
        fn access_token(&self, user_id: &str) -> Result<String, UseCaseError>;
        fn refresh_token(&self, user_id: &str) -> Result<String, UseCaseError>;
    }

    struct FlakyIssuer {
        fail_access: bool,
        refresh_calls: AtomicU32,
    }

    impl TokenIssuer for FlakyIssuer {
        fn access_token(&self, user_id: &str) -> Result<String, UseCaseError> {
            if self.fail_access {
                Err(UseCaseError::provider("token.signing_failed"))
            } else {
                Ok(format!("access-{user_id}"))
            }
        }

        fn refresh_token(&self, user_id: &str) -> Result<String, UseCaseError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("refresh-{user_id}"))
        }
    }

    struct IssueTokens {
        issuer: Arc<FlakyIssuer>,
        locale: Locale,
    }

    impl IssueTokens {
        fn tokens(&self, user_id: &str) -> Result<(String, String), UseCaseError> {
            let access = self.issuer.access_token(user_id)?;
            let refresh = self.issuer.refresh_token(user_id)?;
            Ok((access, refresh))
        }
    }

    #[async_trait]
    impl UseCase for IssueTokens {
        type Input = String;
        type Output = (String, String);

        fn name(&self) -> &'static str {
            "issue_tokens"
        }

        fn set_locale(&mut self, locale: &Locale) {
            self.locale.apply(locale);
        }

        async fn execute(
            &self,
            _ctx: &RequestContext,
            _locale: &Locale,
            user_id: String,
        ) -> UseCaseResult<(String, String)> {
            UseCaseResult::from_outcome(AppStatus::Success, self.tokens(&user_id))
        }
    }

    fn issue_tokens(fail_access: bool) -> IssueTokens {
        IssueTokens {
            issuer: Arc::new(FlakyIssuer {
                fail_access,
                refresh_calls: AtomicU32::new(0),
            }),
            locale: Locale::default(),
        }
    }

    #[tokio::test]
    async fn stops_after_first_collaborator_error() {
        let use_case = issue_tokens(true);
        let result = use_case
            .execute(&RequestContext::new("r1"), &Locale::default(), "u1".into())
            .await;

        assert_eq!(result.status(), Some(AppStatus::ProviderError));
        assert!(result.data().is_none());
        assert_eq!(use_case.issuer.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn runs_every_collaborator_on_success() {
        let use_case = issue_tokens(false);
        let result = use_case
            .execute(&RequestContext::new("r1"), &Locale::default(), "u1".into())
            .await;

        assert_eq!(
            result.data(),
            Some(&("access-u1".to_string(), "refresh-u1".to_string()))
        );
        assert_eq!(use_case.issuer.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_locale_ignores_empty_values() {
        let mut use_case = issue_tokens(false);
        use_case.set_locale(&Locale::new("pt"));
        use_case.set_locale(&Locale::new(""));
        assert_eq!(use_case.locale.as_str(), "pt");
    }

    #[test]
    fn default_name_is_type_name() {
        struct Nameless;

        #[async_trait]
        impl UseCase for Nameless {
            type Input = ();
            type Output = ();

            fn set_locale(&mut self, _locale: &Locale) {}

            async fn execute(
                &self,
                _ctx: &RequestContext,
                _locale: &Locale,
                _input: (),
            ) -> UseCaseResult<()> {
                UseCaseResult::new()
            }
        }

        assert!(Nameless.name().ends_with("Nameless"));
    }
}
