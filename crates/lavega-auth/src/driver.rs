//! Runs navigation effects in the background and posts their results back
//! onto the [`AppStore`] channel.

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::login::{LoginInitiator, SharedAuthorizationAgent};
use crate::navigation::{Action, AppStore, Effect};
use crate::session::SessionResolver;

/// Executes [`Effect`]s against the resolver and login initiator.
#[derive(Clone)]
pub struct SessionDriver {
    resolver: SessionResolver,
    login: LoginInitiator,
    agent: SharedAuthorizationAgent,
    cancel: CancellationToken,
}

impl SessionDriver {
    pub fn new(
        resolver: SessionResolver,
        login: LoginInitiator,
        agent: SharedAuthorizationAgent,
    ) -> Self {
        Self {
            resolver,
            login,
            agent,
            cancel: CancellationToken::new(),
        }
    }

    pub fn resolver(&self) -> &SessionResolver {
        &self.resolver
    }

    /// Token cancelled when the hosting screen goes away.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Abandon in-flight work. Pending refreshes write nothing.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Perform one effect and return the action that reports it.
    pub async fn run(&self, effect: Effect) -> Action {
        match effect {
            Effect::ResolveSession => {
                Action::SessionResolved(self.resolver.resolve(&self.cancel).await)
            }
            Effect::StartLogin => {
                let result = self
                    .login
                    .login(self.agent.as_ref(), &self.cancel)
                    .await
                    .map(|_| ())
                    .map_err(|e| {
                        tracing::warn!(error = %e, "Login failed");
                        e.to_string()
                    });
                Action::LoginFinished(result)
            }
            Effect::Logout => {
                self.resolver.logout().await;
                Action::LoggedOut
            }
        }
    }

    /// Run an effect on a background task.
    pub fn spawn(&self, effect: Effect, sender: UnboundedSender<Action>) -> JoinHandle<()> {
        let driver = self.clone();
        tokio::spawn(async move {
            let action = driver.run(effect).await;
            if sender.send(action).is_err() {
                tracing::debug!(?effect, "App store dropped before effect finished");
            }
        })
    }

    /// Dispatch `action` and keep applying effect results until nothing is
    /// left in flight.
    pub async fn settle(&self, store: &mut AppStore, action: Action) {
        let mut in_flight = 0usize;
        for effect in store.dispatch(action) {
            self.spawn(effect, store.sender());
            in_flight += 1;
        }

        while in_flight > 0 {
            let Some(action) = store.next_action().await else {
                break;
            };
            in_flight -= 1;
            for effect in store.dispatch(action) {
                self.spawn(effect, store.sender());
                in_flight += 1;
            }
        }
    }
}
