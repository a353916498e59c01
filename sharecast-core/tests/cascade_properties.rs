//! Behavioural tests for the getter cascade
//!
//! Each backend here counts its calls so ordering and short-circuiting can
//! be asserted, not just the final result.

use async_trait::async_trait;
use sharecast_core::{
    cascade, CascadeGetter, Context, ContextError, ExtendedDataSquare, Getter, GetterError, Root,
    Share,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Clone, Copy, Debug)]
enum Step {
    /// Returns a square with every share filled with this byte
    Succeed(u8),
    /// Fails with a plain backend error
    Fail,
    /// Fails with its own deadline error, whatever the caller's context says
    Timeout,
    /// Returns the caller's context error, or a backend error if still live
    Done,
    /// Sleeps for the given time, then succeeds, unless the caller gives up first
    Slow(u64, u8),
}

struct Backend {
    id: usize,
    step: Step,
    calls: AtomicUsize,
}

impl Backend {
    fn new(id: usize, step: Step) -> Arc<Self> {
        Arc::new(Self {
            id,
            step,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn square(fill: u8) -> ExtendedDataSquare {
    let shares = (0..4).map(|_| Share::new(vec![fill; 8])).collect();
    ExtendedDataSquare::new(2, shares).unwrap()
}

fn root() -> Root {
    square(0).root()
}

#[async_trait]
impl Getter for Backend {
    async fn get_share(
        &self,
        ctx: &Context,
        root: &Root,
        row: usize,
        col: usize,
    ) -> Result<Share, GetterError> {
        let eds = self.get_eds(ctx, root).await?;
        eds.cell(row, col).cloned().ok_or(GetterError::OutOfBounds {
            row,
            col,
            width: eds.width(),
        })
    }

    async fn get_eds(
        &self,
        ctx: &Context,
        _root: &Root,
    ) -> Result<ExtendedDataSquare, GetterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.step {
            Step::Succeed(fill) => Ok(square(fill)),
            Step::Fail => Err(GetterError::Exchange(format!("backend {} failed", self.id))),
            Step::Timeout => Err(ContextError::DeadlineExceeded.into()),
            Step::Done => Err(ctx
                .err()
                .map(GetterError::from)
                .unwrap_or_else(|| GetterError::Storage(format!("backend {} live", self.id)))),
            Step::Slow(ms, fill) => {
                tokio::select! {
                    err = ctx.done() => Err(err.into()),
                    _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(square(fill)),
                }
            }
        }
    }
}

fn backends(steps: &[Step]) -> Vec<Arc<Backend>> {
    steps
        .iter()
        .enumerate()
        .map(|(id, step)| Backend::new(id, *step))
        .collect()
}

fn as_getters(backends: &[Arc<Backend>]) -> Vec<Arc<dyn Getter>> {
    backends
        .iter()
        .map(|b| b.clone() as Arc<dyn Getter>)
        .collect()
}

async fn run(ctx: &Context, backends: &[Arc<Backend>]) -> Result<ExtendedDataSquare, GetterError> {
    let getters = as_getters(backends);
    let root = root();
    cascade(ctx, &getters, |ctx, getter| getter.get_eds(ctx, &root)).await
}

fn separators(err: &GetterError) -> usize {
    err.to_string().matches('\n').count()
}

#[tokio::test]
async fn test_first_success_wins_and_later_backends_are_skipped() {
    init_tracing();

    let backends = backends(&[Step::Fail, Step::Timeout, Step::Succeed(7), Step::Succeed(9), Step::Fail]);
    let eds = run(&Context::background(), &backends).await.unwrap();

    assert_eq!(eds, square(7));
    let calls: Vec<usize> = backends.iter().map(|b| b.calls()).collect();
    assert_eq!(calls, vec![1, 1, 1, 0, 0]);
}

#[tokio::test]
async fn test_success_position_does_not_change_result() {
    init_tracing();

    for n in 1..=6 {
        for pos in 0..n {
            let steps: Vec<Step> = (0..n)
                .map(|i| if i == pos { Step::Succeed(42) } else if i < pos { Step::Fail } else { Step::Timeout })
                .collect();
            let backends = backends(&steps);

            let eds = run(&Context::background(), &backends).await.unwrap();
            assert_eq!(eds, square(42), "success at {} of {}", pos + 1, n);
            for (i, b) in backends.iter().enumerate() {
                assert_eq!(b.calls(), usize::from(i <= pos));
            }
        }
    }
}

#[tokio::test]
async fn test_exhaustion_keeps_every_cause_in_order() {
    init_tracing();

    for n in 1..=5 {
        let backends = backends(&vec![Step::Fail; n]);
        let err = run(&Context::background(), &backends).await.unwrap_err();

        assert_eq!(separators(&err), n - 1);
        match &err {
            GetterError::Exhausted(list) => {
                assert_eq!(list.len(), n);
                for (i, cause) in list.iter().enumerate() {
                    assert_eq!(cause.to_string(), format!("exchange error: backend {} failed", i));
                }
            }
            other => panic!("expected exhausted error, got {other:?}"),
        }
        assert!(backends.iter().all(|b| b.calls() == 1));
    }
}

#[tokio::test]
async fn test_precanceled_context_returns_only_cancellation() {
    init_tracing();

    for steps in [
        vec![Step::Done, Step::Done, Step::Done],
        vec![Step::Fail, Step::Timeout, Step::Fail],
        vec![Step::Succeed(1), Step::Fail],
    ] {
        let ctx = Context::background();
        ctx.cancel();
        let backends = backends(&steps);

        let err = run(&ctx, &backends).await.unwrap_err();
        assert_eq!(separators(&err), 0);
        assert!(matches!(err, GetterError::Context(ContextError::Canceled)));
        assert!(backends.iter().all(|b| b.calls() == 0));
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_call_stops_the_cascade() {
    init_tracing();

    let ctx = Context::background();
    let backends = backends(&[Step::Fail, Step::Slow(10_000, 1), Step::Succeed(2)]);

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = run(&ctx, &backends).await.unwrap_err();
    assert!(matches!(err, GetterError::Context(ContextError::Canceled)));
    assert_eq!(backends[2].calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_caller_deadline_is_reported_as_deadline() {
    init_tracing();

    let ctx = Context::background().with_timeout(Duration::from_millis(50));
    let backends = backends(&[Step::Slow(1_000, 1), Step::Succeed(2)]);

    let err = run(&ctx, &backends).await.unwrap_err();
    assert_eq!(separators(&err), 0);
    assert!(matches!(err, GetterError::Context(ContextError::DeadlineExceeded)));
    assert_eq!(backends[1].calls(), 0);
}

#[tokio::test]
async fn test_backend_timeout_with_live_context_keeps_cascading() {
    init_tracing();

    let ctx = Context::background().with_timeout(Duration::from_secs(60));
    let backends = backends(&[Step::Timeout, Step::Timeout, Step::Succeed(3)]);

    let eds = run(&ctx, &backends).await.unwrap();
    assert_eq!(eds, square(3));
    assert!(ctx.err().is_none());
}

#[tokio::test]
async fn test_empty_list_is_a_failure() {
    init_tracing();

    let err = run(&Context::background(), &[]).await.unwrap_err();
    assert!(matches!(err, GetterError::NoGetters));

    let getter = CascadeGetter::new(Vec::new());
    assert!(getter.is_empty());
    let err = getter
        .get_share(&Context::background(), &root(), 0, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, GetterError::NoGetters));
}

#[tokio::test]
async fn test_scenario_fail_fail_succeed() {
    init_tracing();

    let backends = backends(&[Step::Fail, Step::Fail, Step::Succeed(0x58)]);
    let eds = run(&Context::background(), &backends).await.unwrap();
    assert_eq!(eds, square(0x58));
}

#[tokio::test]
async fn test_scenario_success_after_four_failures() {
    init_tracing();

    let backends = backends(&[
        Step::Timeout,
        Step::Fail,
        Step::Timeout,
        Step::Timeout,
        Step::Succeed(5),
    ]);
    let eds = run(&Context::background(), &backends).await.unwrap();
    assert_eq!(eds, square(5));
    assert!(backends.iter().all(|b| b.calls() == 1));
}

#[tokio::test]
async fn test_scenario_fail_timeout_fail_aggregates() {
    init_tracing();

    let backends = backends(&[Step::Fail, Step::Timeout, Step::Fail]);
    let err = run(&Context::background(), &backends).await.unwrap_err();

    info!("aggregated error:\n{}", err);
    assert_eq!(separators(&err), 2);
}

#[tokio::test]
async fn test_scenario_all_report_context_done() {
    init_tracing();

    let ctx = Context::background().child();
    ctx.cancel();
    let backends = backends(&[Step::Done, Step::Done, Step::Done]);

    let err = run(&ctx, &backends).await.unwrap_err();
    assert_eq!(separators(&err), 0);
    assert_eq!(err.to_string(), "context canceled");
}

#[tokio::test]
async fn test_nested_cascade_acts_as_one_getter() {
    init_tracing();

    let inner_backends = backends(&[Step::Fail, Step::Fail]);
    let inner: Arc<dyn Getter> = Arc::new(CascadeGetter::new(as_getters(&inner_backends)));
    let last = Backend::new(9, Step::Succeed(4));
    let outer = CascadeGetter::new(vec![inner, last.clone() as Arc<dyn Getter>]);

    let eds = outer.get_eds(&Context::background(), &root()).await.unwrap();
    assert_eq!(eds, square(4));
    assert_eq!(last.calls(), 1);

    // The inner cascade's failure shows up as a single cause
    let failing = CascadeGetter::new(vec![
        Arc::new(CascadeGetter::new(as_getters(&backends(&[Step::Fail, Step::Fail])))) as Arc<dyn Getter>,
        Backend::new(2, Step::Fail) as Arc<dyn Getter>,
    ]);
    match failing.get_eds(&Context::background(), &root()).await.unwrap_err() {
        GetterError::Exhausted(list) => {
            assert_eq!(list.len(), 2);
            assert!(matches!(list.errors()[0], GetterError::Exhausted(_)));
        }
        other => panic!("expected exhausted error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_calls_are_independent() {
    init_tracing();

    let backends = backends(&[Step::Fail, Step::Succeed(6)]);
    let getter = CascadeGetter::new(as_getters(&backends));

    let mut handles = Vec::new();
    for i in 0..16 {
        let getter = getter.clone();
        handles.push(tokio::spawn(async move {
            let ctx = Context::background();
            if i % 2 == 0 {
                ctx.cancel();
            }
            (i, getter.get_share(&ctx, &root(), 1, 1).await)
        }));
    }

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        if i % 2 == 0 {
            assert!(matches!(result, Err(GetterError::Context(ContextError::Canceled))));
        } else {
            assert_eq!(result.unwrap(), Share::new(vec![6u8; 8]));
        }
    }
    assert_eq!(backends[0].calls(), 8);
    assert_eq!(backends[1].calls(), 8);
}
