//! Typed use-case pipelines.
//!
//! A [`Dag`] chains steps so that one step's data becomes the next step's
//! input. Edge types are checked by the compiler: `then` only accepts a use
//! case whose `Input` is the current `Output`.
//!
//! ```text
//! Dag::new(parse, locale, ctx)          Dag<String, i32>
//!     .then(double)                     Dag<String, i32>
//!     .then_background(notify, "n")     Dag<String, i32>  (notify runs on the executor)
//!     .then(render)                     Dag<String, String>
//! ```
//!
//! A DAG is consumed by `execute`, so each one runs exactly once.

mod parallel;
mod step;

use std::sync::Arc;

use backbone_core::{AppStatus, Locale, RequestContext, UseCase, UseCaseError, UseCaseResult};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, warn};

pub use step::Step;
use step::BoundStep;

use super::instrument::Instrumentation;
use super::worker::{BackgroundError, BackgroundExecutor, TaskOutcome};

/// Shared environment of one DAG run.
#[derive(Debug, Clone, Default)]
pub struct DagEnv {
    pub ctx: RequestContext,
    pub locale: Locale,
    /// Required by `then_background`; without it background steps fail.
    pub executor: Option<Arc<BackgroundExecutor>>,
    /// When set, every step runs under the instrumentation wrapper.
    pub instrumentation: Option<Arc<Instrumentation>>,
}

impl DagEnv {
    #[must_use]
    pub fn new(ctx: RequestContext, locale: Locale) -> Self {
        Self {
            ctx,
            locale,
            executor: None,
            instrumentation: None,
        }
    }

    #[must_use]
    pub fn with_executor(mut self, executor: Arc<BackgroundExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    #[must_use]
    pub fn with_instrumentation(mut self, instrumentation: Arc<Instrumentation>) -> Self {
        self.instrumentation = Some(instrumentation);
        self
    }

    /// Owned copy handed to work that outlives the request.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        Self {
            ctx: self.ctx.snapshot(),
            ..self.clone()
        }
    }
}

type RunFn<I, O> = Box<dyn FnOnce(I) -> BoxFuture<'static, UseCaseResult<O>> + Send>;

/// Composed pipeline from `I` to `O`.
pub struct Dag<I, O> {
    env: Arc<DagEnv>,
    steps: Vec<&'static str>,
    run: RunFn<I, O>,
}

impl<I: Send + 'static, O: Send + 'static> Dag<I, O> {
    /// Starts a DAG with `first` as its entry step.
    #[must_use]
    pub fn new<U>(first: Step<U>, locale: Locale, ctx: RequestContext) -> Self
    where
        U: UseCase<Input = I, Output = O>,
    {
        Self::with_env(first, DagEnv::new(ctx, locale))
    }

    #[must_use]
    pub fn with_env<U>(first: Step<U>, env: DagEnv) -> Self
    where
        U: UseCase<Input = I, Output = O>,
    {
        let env = Arc::new(env);
        let step = first.bind(&env.locale);
        let steps = vec![step.name];
        let run_env = Arc::clone(&env);
        Self {
            env,
            steps,
            run: Box::new(move |input| async move { step.run(&run_env, input).await }.boxed()),
        }
    }

    /// Step names in execution order.
    #[must_use]
    pub fn steps(&self) -> &[&'static str] {
        &self.steps
    }

    #[must_use]
    pub fn env(&self) -> &DagEnv {
        &self.env
    }

    /// Appends `next`, fed with this DAG's data.
    ///
    /// `next` only runs when everything before it succeeded; otherwise the
    /// upstream failure is returned unchanged.
    #[must_use]
    pub fn then<U>(self, next: Step<U>) -> Dag<I, U::Output>
    where
        U: UseCase<Input = O>,
    {
        let step = next.bind(&self.env.locale);
        let run_env = Arc::clone(&self.env);
        let upstream = self.run;
        let mut steps = self.steps;
        steps.push(step.name);

        Dag {
            env: self.env,
            steps,
            run: Box::new(move |input| {
                async move {
                    let data = match upstream(input).await.into_continuation() {
                        Ok(data) => data,
                        Err(failure) => {
                            debug!(step = step.name, "upstream failed, step skipped");
                            return failure;
                        }
                    };
                    step.run(&run_env, data).await
                }
                .boxed()
            }),
        }
    }

    /// Runs the pipeline.
    pub async fn execute(self, input: I) -> UseCaseResult<O> {
        let steps = self.steps.len();
        let result = (self.run)(input).await;
        debug!(
            request_id = %self.env.ctx.request_id,
            steps,
            status = result.status().map_or("pending", AppStatus::as_str),
            "dag finished"
        );
        result
    }

    /// Runs the pipeline and splits the result into a plain `Result`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step.
    pub async fn try_execute(self, input: I) -> Result<Option<O>, UseCaseError> {
        self.execute(input).await.into_result()
    }
}

impl<I: Send + 'static, O: Clone + Send + 'static> Dag<I, O> {
    /// Appends `next` as a background continuation.
    ///
    /// On upstream success, `next` is submitted to the executor with a copy of
    /// the data and a snapshot of the carrier, and the upstream result is
    /// returned without waiting for it. Failures of `next` are logged by the
    /// executor and never reach this DAG's result. If the task cannot be
    /// submitted the DAG fails with an internal error.
    #[must_use]
    pub fn then_background<U>(self, next: Step<U>, task_name: &'static str) -> Self
    where
        U: UseCase<Input = O>,
    {
        let step = next.bind(&self.env.locale);
        let run_env = Arc::clone(&self.env);
        let upstream = self.run;
        let mut steps = self.steps;
        steps.push(step.name);

        Dag {
            env: self.env,
            steps,
            run: Box::new(move |input| {
                async move {
                    let result = upstream(input).await;
                    if result.has_error() {
                        return result;
                    }
                    let Some(data) = result.data().cloned() else {
                        return UseCaseResult::failure(
                            AppStatus::InternalError,
                            "upstream step produced no data",
                        );
                    };

                    match schedule(&run_env, step, task_name, data).await {
                        Ok(()) => result,
                        Err(err) => {
                            warn!(task = task_name, error = %err, "background step not scheduled");
                            UseCaseResult::failure(
                                AppStatus::InternalError,
                                format!("background step '{task_name}' not scheduled: {err}"),
                            )
                        }
                    }
                }
                .boxed()
            }),
        }
    }
}

async fn schedule<U: UseCase>(
    env: &DagEnv,
    step: BoundStep<U>,
    task_name: &'static str,
    data: U::Input,
) -> Result<(), BackgroundError> {
    let executor = env
        .executor
        .as_ref()
        .ok_or(BackgroundError::NotConfigured)?;
    let frozen = env.snapshot();
    executor
        .submit(task_name, async move {
            TaskOutcome::from(step.run(&frozen, data).await)
        })
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
