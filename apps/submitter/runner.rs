use crate::forms::FormHandle;
use serde::Serialize;
use std::future::Future;
use tokio::sync::watch;
use tracing::error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AsyncRunState {
    #[default]
    Idle,
    Running,
    Error,
}

/// Drives the loading indicator around an arbitrary async step.
///
/// `run` takes `&mut self`, so one runner serves one invocation at a time;
/// concurrent triggers need their own runner.
#[derive(Debug)]
pub struct ActionRunner {
    state: watch::Sender<AsyncRunState>,
}

impl Default for ActionRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRunner {
    pub fn new() -> Self {
        let (state, _) = watch::channel(AsyncRunState::Idle);
        Self { state }
    }

    pub fn state(&self) -> AsyncRunState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AsyncRunState> {
        self.state.subscribe()
    }

    /// Runs `action` with the form handle. On success the state returns to
    /// idle and `on_complete` is called; on failure the error is logged and
    /// the state becomes `Error`.
    pub async fn run<A, Fut, C>(
        &mut self,
        form: &FormHandle,
        action: A,
        on_complete: Option<C>,
    ) -> AsyncRunState
    where
        A: FnOnce(FormHandle) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
        C: FnOnce(),
    {
        self.state.send_replace(AsyncRunState::Running);

        match action(form.clone()).await {
            Ok(()) => {
                self.state.send_replace(AsyncRunState::Idle);
                if let Some(on_complete) = on_complete {
                    on_complete();
                }
            }
            Err(e) => {
                error!(error = %e, error_chain = ?e, "Async form action failed");
                self.state.send_replace(AsyncRunState::Error);
            }
        }

        self.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_success_returns_to_idle_and_completes() {
        let mut runner = ActionRunner::new();
        let observer = runner.subscribe();
        let form = FormHandle::default();
        let completed = Cell::new(false);

        let state = runner
            .run(
                &form,
                |form| async move {
                    assert_eq!(*observer.borrow(), AsyncRunState::Running);
                    form.set_value("applicant", "0xdef0000000000000000000000000000000000456");
                    Ok(())
                },
                Some(|| completed.set(true)),
            )
            .await;

        assert_eq!(state, AsyncRunState::Idle);
        assert!(completed.get());
        assert_eq!(
            form.get("applicant").as_deref(),
            Some("0xdef0000000000000000000000000000000000456")
        );
    }

    #[tokio::test]
    async fn test_failure_sets_error_and_skips_completion() {
        let mut runner = ActionRunner::new();
        let form = FormHandle::default();
        let completed = Cell::new(false);

        let state = runner
            .run(
                &form,
                |_| async { Err(anyhow!("upload failed")) },
                Some(|| completed.set(true)),
            )
            .await;

        assert_eq!(state, AsyncRunState::Error);
        assert_eq!(runner.state(), AsyncRunState::Error);
        assert!(!completed.get());
    }

    #[tokio::test]
    async fn test_run_without_completion() {
        let mut runner = ActionRunner::new();
        let state = runner
            .run(&FormHandle::default(), |_| async { Ok(()) }, None::<fn()>)
            .await;
        assert_eq!(state, AsyncRunState::Idle);
    }
}
