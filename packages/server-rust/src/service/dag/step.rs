use std::sync::Arc;

use backbone_core::{Locale, UseCase, UseCaseResult};

use super::DagEnv;
use crate::service::instrument::instrument_dag_step;

/// A named use case waiting to be placed into a [`super::Dag`].
pub struct Step<U> {
    name: &'static str,
    use_case: U,
}

impl<U: UseCase> Step<U> {
    #[must_use]
    pub fn new(name: &'static str, use_case: U) -> Self {
        Self { name, use_case }
    }

    /// Step named after the use case itself.
    #[must_use]
    pub fn from_use_case(use_case: U) -> Self {
        Self {
            name: use_case.name(),
            use_case,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Applies the DAG locale and freezes the use case for shared execution.
    pub(super) fn bind(mut self, locale: &Locale) -> BoundStep<U> {
        self.use_case.set_locale(locale);
        BoundStep {
            name: self.name,
            use_case: Arc::new(self.use_case),
        }
    }
}

/// Step fixed inside a built DAG.
pub(super) struct BoundStep<U> {
    pub(super) name: &'static str,
    use_case: Arc<U>,
}

impl<U> Clone for BoundStep<U> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            use_case: Arc::clone(&self.use_case),
        }
    }
}

impl<U: UseCase> BoundStep<U> {
    /// Executes the step against the DAG carrier, instrumented when configured.
    pub(super) async fn run(&self, env: &DagEnv, input: U::Input) -> UseCaseResult<U::Output> {
        match &env.instrumentation {
            Some(instrumentation) => {
                instrument_dag_step(
                    self.name,
                    self.use_case.as_ref(),
                    &env.ctx,
                    &env.locale,
                    input,
                    instrumentation,
                )
                .await
            }
            None => self.use_case.execute(&env.ctx, &env.locale, input).await,
        }
    }
}
