use super::*;
use crate::mock_runtime::{MockRuntime, RuntimeCall};
use std::time::Duration;
use tracing_test::traced_test;

fn test_config() -> LocalStackConfig {
    LocalStackConfig::default().without_readiness_probe()
}

fn fixture(runtime: &MockRuntime) -> LocalStackFixture {
    LocalStackFixture::with_runtime(test_config(), runtime.boxed())
}

fn stop_count(runtime: &MockRuntime) -> usize {
    runtime.count(|c| matches!(c, RuntimeCall::Stop(_)))
}

mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_new_fixture_is_uninitialized() {
        let fixture = fixture(&MockRuntime::new());
        assert_eq!(fixture.state(), FixtureState::Uninitialized);
        assert!(fixture.endpoint().is_none());
    }

    #[tokio::test]
    async fn test_start_moves_to_running_and_exposes_endpoint() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);

        let endpoint = fixture.start().await.expect("start should succeed");

        assert_eq!(fixture.state(), FixtureState::Running);
        assert_eq!(fixture.endpoint(), Some(endpoint.clone()));
        assert_eq!(
            fixture.container().map(|c| c.host_port()),
            Some(endpoint.host_port)
        );

        fixture.teardown().await.expect("teardown should succeed");
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);
        fixture.start().await.expect("start should succeed");

        let err = fixture.start().await.unwrap_err();

        assert!(matches!(
            err,
            Error::AlreadyInitialized(FixtureState::Running)
        ));
        assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Create(_))), 1);

        fixture.teardown().await.expect("teardown should succeed");
    }

    #[tokio::test]
    async fn test_teardown_stops_container_and_clears_handle() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);
        let endpoint = fixture.start().await.expect("start should succeed");

        fixture.teardown().await.expect("teardown should succeed");

        assert_eq!(fixture.state(), FixtureState::Stopped);
        assert!(fixture.container().is_none());
        assert!(runtime
            .calls()
            .contains(&RuntimeCall::Stop(endpoint.container_id)));
    }

    #[tokio::test]
    async fn test_teardown_twice_is_noop_on_second_call() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);
        fixture.start().await.expect("start should succeed");

        fixture.teardown().await.expect("first teardown should succeed");
        fixture.teardown().await.expect("second teardown should be a no-op");

        assert_eq!(stop_count(&runtime), 1);
        assert_eq!(fixture.state(), FixtureState::Stopped);
    }

    #[tokio::test]
    async fn test_teardown_without_start_is_noop() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);

        fixture.teardown().await.expect("teardown should be a no-op");

        assert!(runtime.calls().is_empty());
        assert_eq!(fixture.state(), FixtureState::Stopped);
    }

    #[tokio::test]
    async fn test_pull_failure_leaves_failed_state_and_noop_teardown() {
        let runtime = MockRuntime::new();
        runtime.state().fail_pull = true;
        let mut fixture = fixture(&runtime);

        let err = fixture.start().await.unwrap_err();
        assert!(matches!(err, Error::ImagePull { .. }));
        assert_eq!(fixture.state(), FixtureState::Failed);
        assert!(fixture.endpoint().is_none());

        fixture.teardown().await.expect("teardown should be a no-op");

        assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Create(_))), 0);
        assert_eq!(stop_count(&runtime), 0);
        assert_eq!(fixture.state(), FixtureState::Failed);
    }

    #[tokio::test]
    async fn test_failed_stop_is_reported_once_and_not_retried() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);
        fixture.start().await.expect("start should succeed");
        runtime.state().fail_stop = true;

        let err = fixture.teardown().await.unwrap_err();
        assert!(matches!(err, Error::ContainerStop { .. }));

        fixture.teardown().await.expect("second teardown should be a no-op");
        assert_eq!(stop_count(&runtime), 1);
        assert_eq!(fixture.state(), FixtureState::Stopped);
    }

    #[tokio::test]
    async fn test_external_cancellation_fails_start() {
        let runtime = MockRuntime::new();
        runtime.state().hang_on_start = true;
        let cancel = CancellationToken::new();
        let mut fixture = fixture(&runtime).with_cancellation(cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let err = fixture.start().await.unwrap_err();
        canceller.await.expect("canceller task should finish");

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(fixture.state(), FixtureState::Failed);
        fixture.teardown().await.expect("teardown should be a no-op");
        assert_eq!(stop_count(&runtime), 0);
    }

    #[tokio::test]
    async fn test_independent_fixtures_get_independent_containers() {
        let runtime = MockRuntime::new();
        let mut first = fixture(&runtime);
        let mut second = fixture(&runtime);

        let (a, b) = tokio::join!(first.start(), second.start());
        let a = a.expect("first fixture should start");
        let b = b.expect("second fixture should start");
        assert_ne!(a.container_id, b.container_id);

        first.teardown().await.expect("first teardown should succeed");
        second.teardown().await.expect("second teardown should succeed");
        assert_eq!(stop_count(&runtime), 2);
    }
}

mod blocking_teardown_tests {
    use super::*;

    #[test]
    fn test_blocking_teardown_outside_runtime() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);
        let setup = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("setup runtime should build");
        setup
            .block_on(fixture.start())
            .expect("start should succeed");
        drop(setup);

        fixture
            .teardown_blocking()
            .expect("blocking teardown should succeed");

        assert_eq!(fixture.state(), FixtureState::Stopped);
        assert_eq!(stop_count(&runtime), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_teardown_inside_multi_thread_runtime() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);
        fixture.start().await.expect("start should succeed");

        fixture
            .teardown_blocking()
            .expect("blocking teardown should succeed");

        assert_eq!(fixture.state(), FixtureState::Stopped);
        assert_eq!(stop_count(&runtime), 1);
    }

    #[tokio::test]
    async fn test_blocking_teardown_inside_current_thread_runtime_is_refused() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);
        fixture.start().await.expect("start should succeed");

        let err = fixture.teardown_blocking().unwrap_err();

        assert!(matches!(err, Error::BlockingTeardownUnsupported));
        assert_eq!(fixture.state(), FixtureState::Running);
        assert_eq!(stop_count(&runtime), 0);

        fixture.teardown().await.expect("async teardown should succeed");
        assert_eq!(stop_count(&runtime), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_and_async_teardown_converge() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);
        fixture.start().await.expect("start should succeed");

        fixture
            .teardown_blocking()
            .expect("blocking teardown should succeed");
        fixture.teardown().await.expect("async teardown should be a no-op");
        fixture
            .teardown_blocking()
            .expect("blocking teardown should be a no-op");

        assert_eq!(stop_count(&runtime), 1);
    }

    #[test]
    fn test_blocking_teardown_without_start_is_noop() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);

        fixture
            .teardown_blocking()
            .expect("blocking teardown should be a no-op");

        assert!(runtime.calls().is_empty());
        assert_eq!(fixture.state(), FixtureState::Stopped);
    }
}

mod drop_tests {
    use super::*;

    #[tokio::test]
    #[traced_test]
    async fn test_dropping_running_fixture_stops_container() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);
        fixture.start().await.expect("start should succeed");

        drop(fixture);

        assert_eq!(stop_count(&runtime), 1);
        assert!(logs_contain("dropped while running"));
    }

    #[test]
    fn test_drop_stops_container_before_current_thread_runtime_shuts_down() {
        let runtime = MockRuntime::new();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime should build");

        rt.block_on(async {
            let mut fixture = fixture(&runtime);
            fixture.start().await.expect("start should succeed");
            drop(fixture);
        });
        drop(rt);

        assert_eq!(stop_count(&runtime), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropping_running_fixture_in_multi_thread_runtime_stops_container() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);
        fixture.start().await.expect("start should succeed");

        drop(fixture);

        for _ in 0..50 {
            if stop_count(&runtime) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(stop_count(&runtime), 1);
    }

    #[test]
    fn test_dropping_running_fixture_outside_runtime_stops_container() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);
        let setup = tokio::runtime::Runtime::new().expect("setup runtime should build");
        setup
            .block_on(fixture.start())
            .expect("start should succeed");
        drop(setup);

        drop(fixture);

        assert_eq!(stop_count(&runtime), 1);
    }

    #[tokio::test]
    async fn test_dropping_torn_down_fixture_does_nothing() {
        let runtime = MockRuntime::new();
        let mut fixture = fixture(&runtime);
        fixture.start().await.expect("start should succeed");
        fixture.teardown().await.expect("teardown should succeed");

        drop(fixture);
        tokio::task::yield_now().await;

        assert_eq!(stop_count(&runtime), 1);
    }
}

mod run_collection_tests {
    use super::*;

    #[tokio::test]
    async fn test_run_collection_tears_down_after_success() {
        let runtime = MockRuntime::new();

        let port = run_collection(fixture(&runtime), |endpoint| async move {
            assert!(endpoint.service_url.starts_with("http://localhost:"));
            Ok(endpoint.host_port)
        })
        .await
        .expect("collection should succeed");

        assert_ne!(port, 0);
        assert_eq!(stop_count(&runtime), 1);
    }

    #[tokio::test]
    async fn test_run_collection_tears_down_after_body_error() {
        let runtime = MockRuntime::new();

        let result: anyhow::Result<()> = run_collection(fixture(&runtime), |_endpoint| async {
            anyhow::bail!("assertion in collection failed")
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("assertion in collection failed"));
        assert_eq!(stop_count(&runtime), 1);
    }

    #[tokio::test]
    async fn test_run_collection_tears_down_after_panic() {
        let runtime = MockRuntime::new();
        let observed = runtime.clone();

        let handle = tokio::spawn(async move {
            run_collection(fixture(&runtime), |_endpoint| async {
                if true {
                    panic!("test body panicked");
                }
                Ok(())
            })
            .await
        });

        let join_err = handle.await.unwrap_err();
        assert!(join_err.is_panic());
        assert_eq!(stop_count(&observed), 1);
    }

    #[tokio::test]
    async fn test_run_collection_skips_body_when_start_fails() {
        let runtime = MockRuntime::new();
        runtime.state().fail_create = true;
        let mut body_ran = false;

        let result = run_collection(fixture(&runtime), |_endpoint| {
            body_ran = true;
            async { Ok(()) }
        })
        .await;

        assert!(result.is_err());
        assert!(!body_ran);
        assert_eq!(stop_count(&runtime), 0);
    }

    #[tokio::test]
    async fn test_run_collection_reports_teardown_failure() {
        let runtime = MockRuntime::new();
        let observed = runtime.clone();

        let result = run_collection(fixture(&runtime), |_endpoint| async move {
            observed.state().fail_stop = true;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to stop container"));
    }
}
