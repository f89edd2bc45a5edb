//! Voice session controller
//!
//! Owns the listening lifecycle and the wake-word state machine, keeps the
//! command history and routes parsed commands either to the built-in
//! system/conversation handlers or to a registered [`CommandHandler`].

use crate::commands::{Command, CommandInterpreter, CommandType};
use crate::config::Config;
use crate::error::{ErrorCallback, VoxError, VoxResult};
use crate::history::CommandHistory;
use crate::listener::{Listener, TextCallback};
use crate::normalizer::TextNormalizer;
use crate::tts::{Speaker, DEFAULT_VOLUME};
use crate::utils::fuzzy::match_voice;
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info};

pub const APOLOGY: &str = "Sorry, I encountered an error processing that command.";
pub const WAKE_ACK: &str = "Yes?";

/// Receives commands the session does not handle itself
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Returns the text to speak back
    async fn handle(&self, command: &Command) -> anyhow::Result<String>;
}

/// Fired whenever the wake word is heard
pub type WakeCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    WakeWordMode,
    ActiveMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub listening: bool,
    pub wake_word_mode: bool,
    pub wake_word: String,
    pub phase: SessionPhase,
    pub history_count: usize,
    pub supported_commands: usize,
    pub queued_utterances: usize,
}

/// What happened to one recognized utterance
#[derive(Debug, Clone, PartialEq)]
pub enum UtteranceOutcome {
    /// Empty, or no wake word while one is required
    Ignored,
    /// Only the wake word was spoken
    WakeOnly,
    Handled { command: Command, reply: String },
}

struct SessionState {
    listening: bool,
    wake_word_mode: bool,
    history: CommandHistory,
}

/// Shared between the session and the listener callback
struct SessionCore {
    interpreter: CommandInterpreter,
    normalizer: TextNormalizer,
    speaker: Arc<Speaker>,
    state: Mutex<SessionState>,
    handler: RwLock<Option<Arc<dyn CommandHandler>>>,
    on_wake: RwLock<Option<WakeCallback>>,
    on_error: ErrorCallback,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionCore {
    fn wake_word_mode(&self) -> bool {
        lock(&self.state).wake_word_mode
    }

    fn set_wake_word_mode(&self, enabled: bool) {
        lock(&self.state).wake_word_mode = enabled;
    }

    async fn process_utterance(&self, text: &str) -> UtteranceOutcome {
        let mut text = self.normalizer.normalize(text);
        if text.is_empty() {
            return UtteranceOutcome::Ignored;
        }
        info!("🎙️ Processing speech: '{}'", text);

        if self.wake_word_mode() {
            if !self.normalizer.contains_wake_word(&text) {
                debug!("No wake word in '{}', ignoring", text);
                return UtteranceOutcome::Ignored;
            }

            self.speaker.speak(WAKE_ACK, false);
            let on_wake = self
                .on_wake
                .read()
                .ok()
                .and_then(|guard| guard.clone());
            if let Some(on_wake) = on_wake {
                on_wake();
            }

            text = self.normalizer.strip_wake_word(&text);
            if text.is_empty() {
                return UtteranceOutcome::WakeOnly;
            }
        }

        let command = self.interpreter.parse(&text);
        lock(&self.state).history.push(command.clone());

        let reply = self.execute(&command).await;
        if !reply.is_empty() {
            self.speaker.speak(&reply, false);
        }
        UtteranceOutcome::Handled { command, reply }
    }

    async fn execute(&self, command: &Command) -> String {
        match command.kind {
            CommandType::SystemControl => self.handle_system(command).await,
            CommandType::Conversation => conversation_reply(&command.action).to_string(),
            _ => self.delegate(command).await,
        }
    }

    async fn delegate(&self, command: &Command) -> String {
        let handler = self.handler.read().ok().and_then(|guard| guard.clone());
        let Some(handler) = handler else {
            return format!("Command recognized: {}. No handler available.", command.action);
        };

        match AssertUnwindSafe(handler.handle(command)).catch_unwind().await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                error!("❌ Handler failed for {}: {:#}", command.action, e);
                (self.on_error)(&VoxError::Handler(format!("{:#}", e)));
                APOLOGY.to_string()
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                error!("❌ Handler panicked for {}: {}", command.action, message);
                (self.on_error)(&VoxError::Handler(message));
                APOLOGY.to_string()
            }
        }
    }

    async fn handle_system(&self, command: &Command) -> String {
        match command.action.as_str() {
            "start_listening" => {
                self.set_wake_word_mode(false);
                "Continuous listening activated. I'm listening for commands.".to_string()
            }
            "stop_listening" => {
                self.set_wake_word_mode(true);
                format!(
                    "Switching to wake word mode. Say '{}' to get my attention.",
                    self.normalizer.wake_word()
                )
            }
            "change_voice" => {
                let wanted = command.param("voice_name").unwrap_or_default().to_lowercase();
                let voices = self.speaker.voices().await;
                match match_voice(&wanted, &voices) {
                    Some(voice) => {
                        self.speaker.set_voice(Some(voice.clone()));
                        format!("Voice changed to {}", voice)
                    }
                    None => format!("Voice '{}' not found", wanted),
                }
            }
            "change_speech_rate" => {
                match parse_rate(command.param("rate").unwrap_or_default()) {
                    Some(rate) => {
                        self.speaker.set_rate(rate);
                        format!("Speech rate set to {} words per minute", rate)
                    }
                    None => "I didn't understand the speech rate".to_string(),
                }
            }
            "toggle_mute" => {
                if self.speaker.volume() > 0.0 {
                    self.speaker.set_volume(0.0);
                    "Muted".to_string()
                } else {
                    self.speaker.set_volume(DEFAULT_VOLUME);
                    "Unmuted".to_string()
                }
            }
            other => format!("System command {} not implemented", other),
        }
    }
}

fn conversation_reply(action: &str) -> &'static str {
    match action {
        "greeting" => "Hello! I'm ready to help you with AgenticSeek.",
        "thanks" => "You're welcome! Happy to help.",
        "goodbye" => "Goodbye! Have a great day.",
        "help" => "I can help you control Cursor, manage memory, watch files, browse the web, write code, and more. Just speak naturally!",
        _ => "I understand you're trying to chat, but I'm not sure how to respond to that.",
    }
}

/// Spoken rate: slow, normal, fast or the first number mentioned
pub fn parse_rate(spoken: &str) -> Option<u32> {
    let spoken = spoken.to_lowercase();
    if spoken.contains("slow") {
        return Some(150);
    }
    if spoken.contains("fast") {
        return Some(250);
    }
    if spoken.contains("normal") {
        return Some(200);
    }
    let digits: String = spoken
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// The voice session: listener, speaker and command routing
pub struct VoiceSession {
    core: Arc<SessionCore>,
    listener: Listener,
}

impl VoiceSession {
    pub fn new(
        listener: Listener,
        speaker: Arc<Speaker>,
        config: &Config,
        on_error: ErrorCallback,
    ) -> Self {
        let core = SessionCore {
            interpreter: CommandInterpreter::new(),
            normalizer: TextNormalizer::new(&config.wake_word, &config.voice_corrections),
            speaker,
            state: Mutex::new(SessionState {
                listening: false,
                wake_word_mode: true,
                history: CommandHistory::new(config.history_capacity),
            }),
            handler: RwLock::new(None),
            on_wake: RwLock::new(None),
            on_error,
        };

        Self {
            core: Arc::new(core),
            listener,
        }
    }

    /// Register the handler for tool and agent commands, replacing any previous one
    pub fn set_handler(&self, handler: Arc<dyn CommandHandler>) {
        match self.core.handler.write() {
            Ok(mut slot) => *slot = Some(handler),
            Err(poisoned) => *poisoned.into_inner() = Some(handler),
        }
    }

    pub fn on_wake_word(&self, callback: WakeCallback) {
        match self.core.on_wake.write() {
            Ok(mut slot) => *slot = Some(callback),
            Err(poisoned) => *poisoned.into_inner() = Some(callback),
        }
    }

    /// Begin continuous capture. Returns `false` if already listening.
    pub fn start(&self) -> VoxResult<bool> {
        let mut state = lock(&self.core.state);
        if state.listening {
            return Ok(false);
        }

        let core = Arc::clone(&self.core);
        let on_text: TextCallback = Arc::new(move |text: String| {
            let core = Arc::clone(&core);
            async move {
                core.process_utterance(&text).await;
            }
            .boxed()
        });

        self.listener.start_continuous(on_text)?;
        state.listening = true;
        let wake_word_mode = state.wake_word_mode;
        drop(state);

        let greeting = if wake_word_mode {
            format!(
                "Voice control ready. Say '{}' to get my attention.",
                self.core.normalizer.wake_word()
            )
        } else {
            "Voice control ready. I'm listening for commands.".to_string()
        };
        self.core.speaker.speak(&greeting, false);
        info!("🎧 Voice session started ({:?})", self.phase());
        Ok(true)
    }

    /// Stop capture and return to idle. Returns `false` if not listening.
    ///
    /// Blocks while the capture thread is joined; use [`Self::shutdown`]
    /// from async code.
    pub fn stop(&self) -> bool {
        if !self.leave_listening() {
            return false;
        }
        self.listener.stop_continuous();
        self.announce_stopped();
        true
    }

    fn leave_listening(&self) -> bool {
        let mut state = lock(&self.core.state);
        std::mem::replace(&mut state.listening, false)
    }

    fn announce_stopped(&self) {
        self.core.speaker.speak("Voice control stopped.", false);
        info!("🛑 Voice session stopped");
    }

    /// Flip between wake-word and continuous mode without touching capture
    pub fn toggle_mode(&self) -> bool {
        let wake_word_mode = {
            let mut state = lock(&self.core.state);
            state.wake_word_mode = !state.wake_word_mode;
            state.wake_word_mode
        };
        let mode = if wake_word_mode { "wake word" } else { "continuous" };
        self.core
            .speaker
            .speak(&format!("Switched to {} mode.", mode), false);
        wake_word_mode
    }

    /// Run one recognized utterance through wake-word filtering and dispatch
    pub async fn process_utterance(&self, text: &str) -> UtteranceOutcome {
        self.core.process_utterance(text).await
    }

    pub fn phase(&self) -> SessionPhase {
        let state = lock(&self.core.state);
        match (state.listening, state.wake_word_mode) {
            (false, _) => SessionPhase::Idle,
            (true, true) => SessionPhase::WakeWordMode,
            (true, false) => SessionPhase::ActiveMode,
        }
    }

    pub fn is_listening(&self) -> bool {
        lock(&self.core.state).listening
    }

    pub fn is_wake_word_mode(&self) -> bool {
        self.core.wake_word_mode()
    }

    pub fn status(&self) -> SessionStatus {
        let phase = self.phase();
        let state = lock(&self.core.state);
        SessionStatus {
            listening: state.listening,
            wake_word_mode: state.wake_word_mode,
            wake_word: self.core.normalizer.wake_word().to_string(),
            phase,
            history_count: state.history.len(),
            supported_commands: self.core.interpreter.pattern_count(),
            queued_utterances: self.core.speaker.queue_len(),
        }
    }

    /// Most recent commands, oldest first
    pub fn history(&self, limit: usize) -> Vec<Command> {
        lock(&self.core.state).history.recent(limit)
    }

    pub fn speaker(&self) -> &Arc<Speaker> {
        &self.core.speaker
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Stop listening and flush the speaker without blocking the runtime
    pub async fn shutdown(&self) {
        if self.leave_listening() {
            self.listener.stop_continuous_async().await;
            self.announce_stopped();
        }
        self.core.speaker.shutdown().await;
        info!("Voice session shutdown complete");
    }
}
