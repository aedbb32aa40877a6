use std::{ops::ControlFlow, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use futures::FutureExt;
use reqwest::Client;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinHandle,
    time::timeout,
};
use tokio_cron_scheduler::JobScheduler;

use crate::{
    actions::{ActionError, ActionOutcome, UserActionHandler},
    ai::SnifferClient,
    auth::SessionManager,
    config::AppConfig,
    console::{render_snapshot, render_summary, ConsoleCommand, HELP_TEXT},
    domain::SyncState,
    gmail::{GmailGateway, ListFilter},
    infrastructure::shutdown::{Shutdown, ShutdownListener, ShutdownReason},
    sync::{SnapshotStore, SyncError, SyncOrchestrator, SyncOutcome},
    tasks::scheduler::{configure_refresh_jobs, RefreshCallback},
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SpamSnifferApp {
    config: Arc<AppConfig>,
    orchestrator: Arc<SyncOrchestrator>,
    actions: Arc<UserActionHandler>,
    sessions: Arc<SessionManager>,
    scheduler: JobScheduler,
    shutdown: Shutdown,
}

impl SpamSnifferApp {
    pub async fn initialize(config: AppConfig, shutdown: Shutdown) -> Result<Self> {
        let config = Arc::new(config);

        let http_client = Client::builder()
            .user_agent(format!("spam-sniffer/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let gateway = Arc::new(GmailGateway::new(
            http_client.clone(),
            config.gmail.api_base.clone(),
        ));
        let classifier = Arc::new(SnifferClient::new(http_client, config.classifier.clone())?);

        let sessions = Arc::new(SessionManager::new());
        let store = Arc::new(SnapshotStore::new());
        let filter = ListFilter {
            query: config.gmail.unread_filter.clone(),
            max_messages: config.gmail.max_messages,
        };

        let orchestrator = Arc::new(SyncOrchestrator::new(
            gateway.clone(),
            classifier,
            sessions.clone(),
            store.clone(),
            filter,
            config.sync.clone(),
        ));
        let actions = Arc::new(UserActionHandler::new(gateway, sessions.clone(), store));

        let scheduler = configure_refresh_jobs(
            &config.scheduler.cron_specs,
            build_refresh_callback(orchestrator.clone()),
        )
        .await?;

        Ok(Self {
            config,
            orchestrator,
            actions,
            sessions,
            scheduler,
            shutdown,
        })
    }

    pub async fn run(self) -> Result<()> {
        let SpamSnifferApp {
            config,
            orchestrator,
            actions,
            sessions,
            mut scheduler,
            shutdown,
        } = self;

        tracing::info!(target: "app", "spam sniffer starting");

        let profile = orchestrator
            .sign_in(&config.gmail.access_token)
            .await
            .context("sign-in with GMAIL_ACCESS_TOKEN failed")?;
        println!("Signed in as {}", profile.email_address);

        let mut renderer = spawn_renderer(&orchestrator, shutdown.subscribe());
        spawn_sync(orchestrator.clone());

        let console = Console {
            orchestrator: orchestrator.clone(),
            actions,
            sessions,
            shutdown: shutdown.clone(),
        };
        console.run(shutdown.subscribe()).await;
        tracing::info!(
            target: "app",
            reason = %shutdown.reason().unwrap_or(ShutdownReason::UserQuit),
            "stopping"
        );

        match timeout(SHUTDOWN_TIMEOUT, scheduler.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(target: "scheduler", ?err, "failed to stop refresh scheduler");
            }
            Err(_) => {
                tracing::warn!(
                    target: "scheduler",
                    "refresh scheduler did not stop within {:?}",
                    SHUTDOWN_TIMEOUT
                );
            }
        }

        orchestrator.sign_out();

        let renderer_sleep = tokio::time::sleep(SHUTDOWN_TIMEOUT);
        tokio::pin!(renderer_sleep);
        tokio::select! {
            res = &mut renderer => {
                if let Err(err) = res {
                    if err.is_panic() {
                        tracing::error!(target: "app", "snapshot renderer panicked");
                    }
                }
            }
            _ = &mut renderer_sleep => {
                tracing::warn!(target: "app", "snapshot renderer did not stop within {:?}", SHUTDOWN_TIMEOUT);
                renderer.abort();
            }
        }

        tracing::info!(target: "app", "spam sniffer stopped");
        Ok(())
    }
}

struct Console {
    orchestrator: Arc<SyncOrchestrator>,
    actions: Arc<UserActionHandler>,
    sessions: Arc<SessionManager>,
    shutdown: Shutdown,
}

impl Console {
    async fn run(&self, mut shutdown: ShutdownListener) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        println!("{HELP_TEXT}");

        loop {
            if !stdin_open {
                // Headless: keep refreshing on schedule until a signal arrives.
                shutdown.notified().await;
                break;
            }

            let line = tokio::select! {
                _ = shutdown.notified() => break,
                line = lines.next_line() => line,
            };

            match line {
                Ok(Some(line)) => match line.parse::<ConsoleCommand>() {
                    Ok(command) => {
                        if self.handle(command).await.is_break() {
                            break;
                        }
                    }
                    Err(err) => println!("{err}"),
                },
                Ok(None) => {
                    tracing::debug!(target: "app", "stdin closed; running headless");
                    stdin_open = false;
                }
                Err(err) => {
                    tracing::warn!(target: "app", error = %err, "failed to read stdin; running headless");
                    stdin_open = false;
                }
            }
        }
        self.shutdown.trigger(ShutdownReason::UserQuit);
    }

    async fn handle(&self, command: ConsoleCommand) -> ControlFlow<()> {
        match command {
            ConsoleCommand::Help => println!("{HELP_TEXT}"),
            ConsoleCommand::Refresh => {
                spawn_sync(self.orchestrator.clone());
            }
            ConsoleCommand::Show => print!("{}", render_snapshot(&self.orchestrator.snapshot())),
            ConsoleCommand::Status => {
                let account = match self.sessions.profile() {
                    Some(profile) => profile.email_address,
                    None => self.sessions.state().label().to_string(),
                };
                println!("account: {account}");
                println!("{}", render_summary(&self.orchestrator.snapshot()));
            }
            ConsoleCommand::Read(id) => {
                let result = self.actions.mark_read(&id).await;
                report_action(&id, "marked as read", result);
            }
            ConsoleCommand::Delete(id) => {
                let result = self.actions.delete(&id).await;
                report_action(&id, "moved to trash", result);
            }
            ConsoleCommand::Quit => {
                self.shutdown.trigger(ShutdownReason::UserQuit);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

fn report_action(id: &str, done: &str, result: Result<ActionOutcome, ActionError>) {
    match result {
        Ok(ActionOutcome::Removed) => println!("{id} {done}"),
        Ok(ActionOutcome::AlreadyAbsent) => println!("{id} is no longer in the list"),
        Err(err) => {
            tracing::warn!(target: "app", id, error = %err, "user action failed");
            println!("{}", err.user_message());
        }
    }
}

/// Logs every published snapshot and prints the full list whenever a cycle settles.
fn spawn_renderer(orchestrator: &SyncOrchestrator, mut shutdown: ShutdownListener) -> JoinHandle<()> {
    let mut updates = orchestrator.subscribe();
    tokio::spawn(async move {
        let mut last_state = SyncState::Idle;
        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let snapshot = updates.borrow_and_update().clone();
            tracing::debug!(target: "app", summary = %render_summary(&snapshot), "snapshot updated");
            if snapshot.state != last_state && matches!(snapshot.state, SyncState::Ready | SyncState::Failed) {
                print!("{}", render_snapshot(&snapshot));
            }
            last_state = snapshot.state;
        }
    })
}

fn spawn_sync(orchestrator: Arc<SyncOrchestrator>) -> JoinHandle<()> {
    tokio::spawn(async move { run_sync(&orchestrator).await })
}

async fn run_sync(orchestrator: &SyncOrchestrator) {
    match orchestrator.sync().await {
        Ok(SyncOutcome::Completed(report)) => {
            for (id, reason) in &report.fetch_failures {
                tracing::warn!(target: "app", id = %id, reason = %reason, "message skipped this cycle");
            }
            tracing::info!(
                target: "app",
                generation = report.generation,
                fetched = report.fetched,
                classified = report.classified,
                unclassified = report.classification_failures.len(),
                "refresh finished"
            );
        }
        Ok(SyncOutcome::Superseded { generation }) => {
            tracing::debug!(target: "app", generation, "refresh superseded by a newer one");
        }
        Err(SyncError::Auth(err)) => {
            tracing::warn!(target: "app", error = %err, "refresh needs a signed-in session");
            println!("Refresh skipped: {err}. Restart with a fresh GMAIL_ACCESS_TOKEN.");
        }
        Err(err) => {
            tracing::error!(target: "app", error = %err, "refresh failed");
            println!("Refresh failed: {err}");
        }
    }
}

fn build_refresh_callback(orchestrator: Arc<SyncOrchestrator>) -> RefreshCallback {
    Arc::new(move || {
        let orchestrator = orchestrator.clone();
        async move {
            if orchestrator.snapshot().state.is_running() {
                tracing::debug!(target: "scheduler", "previous refresh still running; skipping tick");
                return;
            }
            run_sync(&orchestrator).await;
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClassifier, FakeGateway, Harness};

    fn console(harness: &Harness, shutdown: &Shutdown) -> Console {
        Console {
            orchestrator: harness.orchestrator.clone(),
            actions: harness.actions.clone(),
            sessions: harness.sessions.clone(),
            shutdown: shutdown.clone(),
        }
    }

    #[tokio::test]
    async fn quit_stops_the_console_and_requests_shutdown() {
        let harness = Harness::signed_in(FakeGateway::with_messages(&["a"]), FakeClassifier::new()).await;
        let (shutdown, _) = Shutdown::new();
        let console = console(&harness, &shutdown);

        assert!(console.handle(ConsoleCommand::Status).await.is_continue());
        assert_eq!(shutdown.reason(), None);

        assert!(console.handle(ConsoleCommand::Quit).await.is_break());
        assert_eq!(shutdown.reason(), Some(ShutdownReason::UserQuit));
    }

    #[tokio::test]
    async fn refresh_while_signed_out_is_reported_without_touching_the_mailbox() {
        let harness = Harness::new(FakeGateway::with_messages(&["a"]), FakeClassifier::new());
        run_sync(&harness.orchestrator).await;
        assert!(harness.gateway.calls().is_empty());
        assert_eq!(harness.orchestrator.snapshot().state, SyncState::Idle);
    }

    #[tokio::test]
    async fn delete_command_goes_through_the_action_handler() {
        let harness = Harness::signed_in(FakeGateway::with_messages(&["a", "b"]), FakeClassifier::new()).await;
        harness.orchestrator.sync().await.unwrap();
        let (shutdown, _) = Shutdown::new();
        let console = console(&harness, &shutdown);

        let flow = console.handle(ConsoleCommand::Delete("a".into())).await;
        assert!(flow.is_continue());
        assert!(!harness.orchestrator.snapshot().contains("a"));
        assert_eq!(harness.gateway.calls_matching("trash:a"), 1);
    }
}
