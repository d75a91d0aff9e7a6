//! Screen table, navigation commands and the serialized dispatcher.
//!
//! Handlers never touch the stack. They produce a [`NavCommand`] and send it
//! to the [`Dispatcher`], whose task is the stack's only owner.

use std::fmt;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Screens of the app, with their route names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Login,
    Signup,
    DifferentSignup,
    Home,
    UserType,
    CreateProfile,
    ViewProfiles,
    MapMyPlaces,
}

impl Screen {
    pub const INITIAL: Screen = Screen::Login;

    pub fn route_name(self) -> &'static str {
        match self {
            Screen::Login => "LoginScreen",
            Screen::Signup => "SignupScreen",
            Screen::DifferentSignup => "DifferentSignupScreen",
            Screen::Home => "HomeScreen",
            Screen::UserType => "UserTypeScreen",
            Screen::CreateProfile => "CreateProfileScreen",
            Screen::ViewProfiles => "ViewProfilesScreen",
            Screen::MapMyPlaces => "MapMyPlacesScreen",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.route_name())
    }
}

/// Navigation intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    Stay,
    Push(Screen),
    /// Swap the top screen instead of pushing (no way back to it).
    Replace(Screen),
    Back,
}

/// Stack of visited screens. The root is never popped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavStack {
    screens: Vec<Screen>,
}

impl NavStack {
    pub fn new(root: Screen) -> Self {
        Self {
            screens: vec![root],
        }
    }

    pub fn current(&self) -> Screen {
        // Non-empty: `back` never removes the root.
        self.screens.last().copied().unwrap_or(Screen::INITIAL)
    }

    pub fn depth(&self) -> usize {
        self.screens.len()
    }

    pub fn screens(&self) -> &[Screen] {
        &self.screens
    }

    pub fn push(&mut self, screen: Screen) {
        self.screens.push(screen);
    }

    pub fn replace(&mut self, screen: Screen) {
        match self.screens.last_mut() {
            Some(top) => *top = screen,
            None => self.screens.push(screen),
        }
    }

    /// Pops the top screen. Returns false at the root.
    pub fn back(&mut self) -> bool {
        if self.screens.len() > 1 {
            self.screens.pop();
            true
        } else {
            false
        }
    }

    /// Applies a command. Returns true if the stack changed.
    pub fn apply(&mut self, command: NavCommand) -> bool {
        match command {
            NavCommand::Stay => false,
            NavCommand::Push(screen) => {
                self.push(screen);
                true
            }
            NavCommand::Replace(screen) => {
                self.replace(screen);
                true
            }
            NavCommand::Back => self.back(),
        }
    }
}

impl Default for NavStack {
    fn default() -> Self {
        Self::new(Screen::INITIAL)
    }
}

enum Message {
    Apply {
        command: NavCommand,
        cancel: CancellationToken,
    },
    Snapshot(oneshot::Sender<(NavStack, usize)>),
}

/// Owns the navigation stack and applies commands one at a time.
pub struct Dispatcher;

impl Dispatcher {
    /// Spawns the dispatcher task on the current runtime.
    ///
    /// The task exits once every handle has been dropped.
    pub fn spawn(stack: NavStack) -> DispatcherHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(stack, rx));
        DispatcherHandle { tx }
    }
}

async fn run(mut stack: NavStack, mut rx: mpsc::UnboundedReceiver<Message>) {
    let mut applied = 0usize;
    while let Some(message) = rx.recv().await {
        match message {
            Message::Apply { command, cancel } => {
                if cancel.is_cancelled() {
                    debug!(?command, "Dropping navigation from cancelled invocation");
                    continue;
                }
                if stack.apply(command) {
                    applied += 1;
                    debug!(?command, current = %stack.current(), "Navigation applied");
                }
            }
            Message::Snapshot(reply) => {
                let _ = reply.send((stack.clone(), applied));
            }
        }
    }
}

/// Sending side of the dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl DispatcherHandle {
    /// Queues a command. It is dropped if `cancel` fires before it is applied.
    pub fn dispatch(&self, command: NavCommand, cancel: CancellationToken) {
        if command == NavCommand::Stay {
            return;
        }
        let _ = self.tx.send(Message::Apply { command, cancel });
    }

    /// Stack state after every command queued so far.
    pub async fn snapshot(&self) -> NavStack {
        self.query().await.0
    }

    /// Number of commands that changed the stack.
    pub async fn applied(&self) -> usize {
        self.query().await.1
    }

    async fn query(&self) -> (NavStack, usize) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Message::Snapshot(reply_tx)).is_err() {
            return (NavStack::default(), 0);
        }
        reply_rx.await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_names() {
        assert_eq!(Screen::INITIAL.route_name(), "LoginScreen");
        assert_eq!(Screen::Home.to_string(), "HomeScreen");
        assert_eq!(Screen::MapMyPlaces.route_name(), "MapMyPlacesScreen");
    }

    #[test]
    fn test_replace_swaps_top() {
        let mut stack = NavStack::default();
        stack.push(Screen::Signup);
        stack.replace(Screen::Home);

        assert_eq!(stack.screens(), &[Screen::Login, Screen::Home]);
        assert!(stack.back());
        assert_eq!(stack.current(), Screen::Login);
    }

    #[test]
    fn test_back_keeps_root() {
        let mut stack = NavStack::default();
        assert!(!stack.back());
        assert!(!stack.apply(NavCommand::Back));
        assert_eq!(stack.depth(), 1);
    }

    #[tokio::test]
    async fn test_dispatcher_applies_in_order() {
        let handle = Dispatcher::spawn(NavStack::default());
        let token = CancellationToken::new();

        handle.dispatch(NavCommand::Push(Screen::UserType), token.clone());
        handle.dispatch(NavCommand::Push(Screen::CreateProfile), token.clone());
        handle.dispatch(NavCommand::Stay, token.clone());
        handle.dispatch(NavCommand::Replace(Screen::Home), token);

        let stack = handle.snapshot().await;
        assert_eq!(
            stack.screens(),
            &[Screen::Login, Screen::UserType, Screen::Home]
        );
        assert_eq!(handle.applied().await, 3);
    }

    #[tokio::test]
    async fn test_cancelled_command_is_dropped() {
        let handle = Dispatcher::spawn(NavStack::default());
        let token = CancellationToken::new();
        token.cancel();

        handle.dispatch(NavCommand::Replace(Screen::Home), token);

        assert_eq!(handle.snapshot().await.current(), Screen::Login);
        assert_eq!(handle.applied().await, 0);
    }
}
