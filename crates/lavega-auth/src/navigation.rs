//! Screen navigation as a reducer.
//!
//! The front end holds one [`AppState`]; user input and finished background
//! work arrive as [`Action`]s, and [`reduce`] returns the next state plus the
//! [`Effect`]s to run. Effects report back through the [`AppStore`] channel.

use tokio::sync::mpsc;

use crate::session::{LogoutReason, Resolution, SessionState};

/// The three destinations of the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Splash,
    Login,
    Home,
}

impl Screen {
    /// Route name of the destination.
    pub fn route(&self) -> &'static str {
        match self {
            Screen::Splash => "splash",
            Screen::Login => "login",
            Screen::Home => "home",
        }
    }
}

impl std::fmt::Display for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.route())
    }
}

/// Where a finished resolution sends the user.
pub fn destination(state: &SessionState) -> Screen {
    match state {
        SessionState::Authenticated(_) => Screen::Home,
        SessionState::Unauthenticated | SessionState::Unknown => Screen::Login,
    }
}

/// Everything the front end renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub screen: Screen,
    pub session: SessionState,
    pub loading: bool,
    /// Message for the login screen after a failed attempt or forced logout.
    pub notice: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            screen: Screen::Splash,
            session: SessionState::Unknown,
            loading: true,
            notice: None,
        }
    }
}

/// Inputs to the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// The app started on the splash screen.
    Launched,
    /// A resolution pass finished.
    SessionResolved(Resolution),
    /// The user pressed "Login with Google".
    LoginRequested,
    /// The login attempt finished.
    LoginFinished(Result<(), String>),
    /// The user pressed "Logout".
    LogoutRequested,
    /// Tokens were cleared after a logout request.
    LoggedOut,
}

/// Background work requested by the reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ResolveSession,
    StartLogin,
    Logout,
}

/// Compute the next state.
pub fn reduce(state: &AppState, action: Action) -> (AppState, Vec<Effect>) {
    let mut next = state.clone();
    let mut effects = Vec::new();

    match action {
        Action::Launched => {
            next = AppState::default();
            effects.push(Effect::ResolveSession);
        }
        Action::SessionResolved(resolution) => {
            if !matches!(state.screen, Screen::Splash | Screen::Home) {
                tracing::debug!(screen = %state.screen, "Dropping stale session resolution");
                return (next, effects);
            }
            next.screen = destination(&resolution.state);
            next.loading = false;
            next.notice = match resolution.logout {
                Some(reason @ (LogoutReason::RefreshFailed | LogoutReason::RefreshExhausted)) => {
                    Some(format!("Session expired ({}). Please log in again.", reason))
                }
                _ => None,
            };
            next.session = match resolution.state {
                SessionState::Unknown => SessionState::Unauthenticated,
                other => other,
            };
        }
        Action::LoginRequested => {
            if state.screen == Screen::Login && !state.loading {
                next.loading = true;
                next.notice = None;
                effects.push(Effect::StartLogin);
            }
        }
        Action::LoginFinished(Ok(())) => {
            if state.screen == Screen::Login {
                next.screen = Screen::Home;
                next.session = SessionState::Unknown;
                next.loading = true;
                effects.push(Effect::ResolveSession);
            }
        }
        Action::LoginFinished(Err(message)) => {
            next.loading = false;
            next.notice = Some(message);
        }
        Action::LogoutRequested => {
            if state.screen == Screen::Home && !state.loading {
                next.loading = true;
                effects.push(Effect::Logout);
            }
        }
        Action::LoggedOut => {
            next.screen = Screen::Login;
            next.session = SessionState::Unauthenticated;
            next.loading = false;
            next.notice = None;
        }
    }

    if next.screen != state.screen {
        tracing::info!(from = %state.screen, to = %next.screen, "Navigate");
    }
    (next, effects)
}

/// Owns the app state and the channel background effects report on.
pub struct AppStore {
    state: AppState,
    sender: mpsc::UnboundedSender<Action>,
    receiver: mpsc::UnboundedReceiver<Action>,
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStore {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            state: AppState::default(),
            sender,
            receiver,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Sender for effect results.
    pub fn sender(&self) -> mpsc::UnboundedSender<Action> {
        self.sender.clone()
    }

    /// Apply an action and return the effects it requested.
    pub fn dispatch(&mut self, action: Action) -> Vec<Effect> {
        let (next, effects) = reduce(&self.state, action);
        self.state = next;
        effects
    }

    /// Wait for the next action posted by a background effect.
    pub async fn next_action(&mut self) -> Option<Action> {
        self.receiver.recv().await
    }
}
