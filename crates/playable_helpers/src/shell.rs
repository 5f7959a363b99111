use std::sync::{Arc, LazyLock};

use bevy::prelude::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use web_sys::MessageEvent;

/// Messages the playable posts to the page embedding it. The embedding
/// shell owns store redirection and analytics; the playable only reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlayableMessage {
    Ready,
    InstallIntent,
    SessionEnded { merges: u32, rewards: u32 },
}

/// Commands the embedding shell may send down to the playable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ShellCommand {
    ToggleSound,
    EndSession,
}

pub static SHELL_COMMAND_QUEUE: LazyLock<Arc<Mutex<Vec<ShellCommand>>>> =
    LazyLock::new(|| Arc::new(Mutex::new(Vec::new())));

#[cfg(not(target_arch = "wasm32"))]
pub static PLAYABLE_MESSAGE_QUEUE: LazyLock<Arc<Mutex<Vec<PlayableMessage>>>> =
    LazyLock::new(|| Arc::new(Mutex::new(Vec::new())));

#[cfg(target_arch = "wasm32")]
pub fn listen_shell_commands() {
    let Some(window) = web_sys::window() else {
        error!("no global `window` exists, shell commands unavailable");
        return;
    };

    let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
        let command: Result<ShellCommand, serde_wasm_bindgen::Error> =
            serde_wasm_bindgen::from_value(event.data());

        let Ok(command) = command else {
            // Pages routinely broadcast unrelated messages; ignore them.
            return;
        };

        SHELL_COMMAND_QUEUE.lock().push(command);
    }) as Box<dyn FnMut(MessageEvent)>);

    if let Err(err) = window.add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
    {
        error!("failed to add message event listener: {err:?}");
        return;
    }

    closure.forget(); // Leaks memory, but ensures the closure lives for the lifetime of the program
}

#[cfg(not(target_arch = "wasm32"))]
pub fn send_playable_message(message: PlayableMessage) {
    PLAYABLE_MESSAGE_QUEUE.lock().push(message);
}

#[cfg(target_arch = "wasm32")]
pub fn send_playable_message(message: PlayableMessage) {
    let Some(window) = web_sys::window() else {
        error!("{message:?} not sent, no global `window` exists");
        return;
    };

    let Ok(message_str) = serde_wasm_bindgen::to_value(&message) else {
        error!("Could not serialize {message:?}");
        return;
    };

    let Ok(Some(parent_window)) = window.parent() else {
        error!("{message:?} not sent, parent_window not found.");
        return;
    };

    if let Err(err) = parent_window.post_message(&message_str, "*") {
        error!("Could not post message {message_str:?}. {err:?}");
    }
}

/// Drains shell commands received since the last call. Systems in the
/// playable turn these into their own events.
pub fn drain_shell_commands() -> Vec<ShellCommand> {
    SHELL_COMMAND_QUEUE.lock().drain(..).collect()
}

fn ready() {
    send_playable_message(PlayableMessage::Ready);
}

pub struct ShellBridgePlugin;

impl Plugin for ShellBridgePlugin {
    fn build(&self, app: &mut App) {
        #[cfg(target_arch = "wasm32")]
        {
            app.add_systems(Startup, listen_shell_commands);
        }
        app.add_systems(PostStartup, ready);
    }
}
