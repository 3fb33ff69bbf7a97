//! Parallel fan-out of one step over many inputs.
//!
//! Each input runs as its own tokio task. Outputs come back in input order
//! whatever the completion order, and a failing branch never cancels its
//! siblings; the combined result is the first failure by input index.

use std::sync::Arc;

use backbone_core::{AppStatus, Locale, RequestContext, UseCase, UseCaseResult};
use futures_util::FutureExt;
use tracing::error;

use super::step::{BoundStep, Step};
use super::{Dag, DagEnv};

impl<I: Send + 'static, O: Send + 'static> Dag<Vec<I>, Vec<O>> {
    /// DAG whose entry step runs once per input, concurrently.
    #[must_use]
    pub fn parallel<U>(step: Step<U>, env: DagEnv) -> Self
    where
        U: UseCase<Input = I, Output = O>,
    {
        let env = Arc::new(env);
        let step = step.bind(&env.locale);
        let steps = vec![step.name];
        let run_env = Arc::clone(&env);
        Self {
            env,
            steps,
            run: Box::new(move |inputs| run_branches(step, run_env, inputs).boxed()),
        }
    }

    /// Shorthand for `parallel` with a fresh environment.
    #[must_use]
    pub fn new_parallel<U>(step: Step<U>, locale: Locale, ctx: RequestContext) -> Self
    where
        U: UseCase<Input = I, Output = O>,
    {
        Self::parallel(step, DagEnv::new(ctx, locale))
    }
}

impl<I: Send + 'static, O: Send + 'static> Dag<Vec<I>, O> {
    /// Runs the pipeline with `n` copies of `input`.
    pub async fn fan_out(self, input: I, n: usize) -> UseCaseResult<O>
    where
        I: Clone,
    {
        self.execute(vec![input; n]).await
    }
}

impl<I: Send + 'static, X: Send + 'static> Dag<I, Vec<X>> {
    /// Appends `next`, run concurrently once per element of this DAG's data.
    #[must_use]
    pub fn then_parallel<U>(self, next: Step<U>) -> Dag<I, Vec<U::Output>>
    where
        U: UseCase<Input = X>,
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
                    match upstream(input).await.into_continuation() {
                        Ok(items) => run_branches(step, run_env, items).await,
                        Err(failure) => failure,
                    }
                }
                .boxed()
            }),
        }
    }
}

async fn run_branches<U: UseCase>(
    step: BoundStep<U>,
    env: Arc<DagEnv>,
    inputs: Vec<U::Input>,
) -> UseCaseResult<Vec<U::Output>> {
    let branches: Vec<_> = inputs
        .into_iter()
        .map(|input| {
            let step = step.clone();
            let env = Arc::clone(&env);
            tokio::spawn(async move { step.run(&env, input).await })
        })
        .collect();

    let mut outputs = Vec::with_capacity(branches.len());
    let mut first_failure = None;
    for (index, branch) in branches.into_iter().enumerate() {
        let result = match branch.await {
            Ok(result) => result,
            Err(err) => {
                error!(step = step.name, index, error = %err, "parallel branch aborted");
                UseCaseResult::failure(
                    AppStatus::InternalError,
                    format!("parallel branch {index} of '{}' produced no result", step.name),
                )
            }
        };
        match result.into_continuation() {
            Ok(output) => outputs.push(output),
            Err(failure) => {
                if first_failure.is_none() {
                    first_failure = Some(failure);
                }
            }
        }
    }

    first_failure.unwrap_or_else(|| UseCaseResult::success(AppStatus::Success, outputs))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    struct Constant;

    #[async_trait]
    impl UseCase for Constant {
        type Input = ();
        type Output = u32;

        fn name(&self) -> &'static str {
            "constant"
        }

        fn set_locale(&mut self, _locale: &Locale) {}

        async fn execute(&self, _: &RequestContext, _: &Locale, _input: ()) -> UseCaseResult<u32> {
            UseCaseResult::success(AppStatus::Success, 42)
        }
    }

    /// Sleeps inversely to its input so later inputs finish first.
    struct SlowSquare {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl UseCase for SlowSquare {
        type Input = u64;
        type Output = u64;

        fn set_locale(&mut self, _locale: &Locale) {}

        async fn execute(&self, _: &RequestContext, _: &Locale, n: u64) -> UseCaseResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50 - n * 10)).await;
            if n == 2 || n == 3 {
                return UseCaseResult::failure(AppStatus::Conflict, format!("square.conflict.{n}"));
            }
            UseCaseResult::success(AppStatus::Success, n * n)
        }
    }

    struct Split;

    #[async_trait]
    impl UseCase for Split {
        type Input = String;
        type Output = Vec<u64>;

        fn set_locale(&mut self, _locale: &Locale) {}

        async fn execute(&self, _: &RequestContext, _: &Locale, s: String) -> UseCaseResult<Vec<u64>> {
            match s.split(',').map(str::parse).collect::<Result<Vec<u64>, _>>() {
                Ok(items) => UseCaseResult::success(AppStatus::Success, items),
                Err(_) => UseCaseResult::failure(AppStatus::InvalidInput, "list.invalid"),
            }
        }
    }

    fn square(calls: &Arc<AtomicU32>) -> Step<SlowSquare> {
        Step::new(
            "square",
            SlowSquare {
                calls: Arc::clone(calls),
            },
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn constant_step_fans_out_n_times() {
        let dag = Dag::new_parallel(
            Step::new("constant", Constant),
            Locale::default(),
            RequestContext::new("r1"),
        );
        let result = dag.fan_out((), 5).await;
        assert_eq!(result.data(), Some(&vec![42; 5]));
    }

    #[tokio::test]
    async fn outputs_keep_input_order() {
        let calls = Arc::new(AtomicU32::new(0));
        let dag = Dag::parallel(
            square(&calls),
            DagEnv::new(RequestContext::new("r1"), Locale::default()),
        );
        let result = dag.execute(vec![0, 1, 4]).await;
        assert_eq!(result.data(), Some(&vec![0, 1, 16]));
    }

    #[tokio::test]
    async fn failing_branch_does_not_cancel_siblings() {
        let calls = Arc::new(AtomicU32::new(0));
        let dag = Dag::parallel(
            square(&calls),
            DagEnv::new(RequestContext::new("r1"), Locale::default()),
        );
        let result = dag.execute(vec![0, 1, 2, 3, 4]).await;

        // Input 3 finishes before input 2, but the lower index wins.
        assert_eq!(result.error().unwrap().message, "square.conflict.2");
        assert_eq!(result.status(), Some(AppStatus::Conflict));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let calls = Arc::new(AtomicU32::new(0));
        let dag = Dag::parallel(
            square(&calls),
            DagEnv::new(RequestContext::new("r1"), Locale::default()),
        );
        let result = dag.execute(Vec::new()).await;
        assert_eq!(result.data(), Some(&Vec::new()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn then_parallel_fans_out_upstream_items() {
        let calls = Arc::new(AtomicU32::new(0));
        let dag = Dag::new(Step::new("split", Split), Locale::default(), RequestContext::new("r1"))
            .then_parallel(square(&calls));

        assert_eq!(dag.steps(), ["split", "square"]);
        let result = dag.execute("4,1,0".to_string()).await;
        assert_eq!(result.data(), Some(&vec![16, 1, 0]));
    }

    #[tokio::test]
    async fn then_parallel_skips_on_upstream_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = Dag::new(Step::new("split", Split), Locale::default(), RequestContext::new("r1"))
            .then_parallel(square(&calls))
            .execute("a,b".to_string())
            .await;

        assert_eq!(result.status(), Some(AppStatus::InvalidInput));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
