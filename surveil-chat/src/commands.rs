//! Command dispatch: `TelegramRootPlugin`'s `handle_command`/`handle_message`
//! decorated methods (`_bot_start*`, `_bot_try_auth`, `_bot_user_left`),
//! generalised over the capability traits below instead of concrete camera/
//! light plugins.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use surveil_auth::{AuthAttemptResult, AuthStatus, AuthStore};

use crate::root::ChatRoot;
use crate::schedule::DetectCommand;
use crate::transport::ChatTransport;

/// Enqueues a still capture. Absent when no still-capture plugin is loaded.
pub trait StillControl: Send + Sync {
    fn request_photo(&self);
}

/// Requests a motion clip of the configured duration. Absent when no
/// recorder plugin is loaded.
pub trait RecorderControl: Send + Sync {
    fn request_video(&self);
}

/// Toggles motion detection. Absent when no detector plugin is loaded.
pub trait DetectorControl: Send + Sync {
    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;
}

/// Drives the PWM accessory light. Absent when no light plugin is loaded.
pub trait LightControl: Send + Sync {
    fn on(&self);
    fn off(&self);
    fn set_value(&self, value: f64);
    fn pulse(&self);
    fn is_lit(&self) -> bool;
}

pub struct CommandRouter<T: ChatTransport> {
    chat: Arc<ChatRoot<T>>,
    auth: Arc<AuthStore>,
    still: Option<Arc<dyn StillControl>>,
    recorder: Option<Arc<dyn RecorderControl>>,
    detector: Option<Arc<dyn DetectorControl>>,
    light: Option<Arc<dyn LightControl>>,
}

impl<T: ChatTransport> CommandRouter<T> {
    pub fn new(chat: Arc<ChatRoot<T>>, auth: Arc<AuthStore>) -> Self {
        CommandRouter {
            chat,
            auth,
            still: None,
            recorder: None,
            detector: None,
            light: None,
        }
    }

    pub fn with_still(mut self, still: Arc<dyn StillControl>) -> Self {
        self.still = Some(still);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn RecorderControl>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn DetectorControl>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_light(mut self, light: Arc<dyn LightControl>) -> Self {
        self.light = Some(light);
        self
    }

    /// `/start`. Returns the freshly generated password when auth was just
    /// begun, so the caller can print it to the operator console (the
    /// original's `print(...)`) — it is never sent over chat.
    pub fn handle_start(&self, chat_id: i64, user: &str) -> Option<String> {
        match self.auth.status_of(chat_id) {
            AuthStatus::Unknown => {
                let pwd = self
                    .auth
                    .mutate(chat_id, |s| s.start_auth(user.to_string()))
                    .ok()
                    .and_then(|r| r.ok());
                self.chat
                    .send_message(chat_id, "Reply with the pass that you can read on the console.");
                pwd
            }
            AuthStatus::Ongoing => {
                self.chat
                    .send_message(chat_id, "Reply with the pass that you can read on the console.");
                None
            }
            AuthStatus::Authorized | AuthStatus::Denied => {
                self.chat.send_message(chat_id, "Ratcam is active.");
                None
            }
        }
    }

    /// Free-text message while status is `Ongoing`: an authentication
    /// attempt.
    pub fn handle_auth_attempt(&self, chat_id: i64, password: &str) -> AuthAttemptResult {
        let result = self
            .auth
            .mutate(chat_id, |s| s.try_auth(password))
            .ok()
            .and_then(|r| r.ok())
            .unwrap_or(AuthAttemptResult::AlreadyAuthenticated);
        let text = match result {
            AuthAttemptResult::Authenticated => "Authenticated.",
            AuthAttemptResult::WrongToken => "Incorrect password.",
            AuthAttemptResult::Expired => "Your password expired.",
            AuthAttemptResult::TooManyRetries => "Number of attempts exceeded.",
            AuthAttemptResult::AlreadyAuthenticated => "I did not understand.",
        };
        self.chat.send_message(chat_id, text);
        result
    }

    fn require_authorized(&self, chat_id: i64) -> bool {
        self.auth.status_of(chat_id) == AuthStatus::Authorized
    }

    /// `/photo`.
    pub fn handle_photo(&self, chat_id: i64) {
        if !self.require_authorized(chat_id) {
            return;
        }
        match &self.still {
            Some(still) => still.request_photo(),
            None => {
                self.chat.send_message(chat_id, "Cannot take a photo, Still is not loaded.");
            }
        }
    }

    /// `/video`.
    pub fn handle_video(&self, chat_id: i64) {
        if !self.require_authorized(chat_id) {
            return;
        }
        match &self.recorder {
            Some(recorder) => recorder.request_video(),
            None => {
                self.chat
                    .send_message(chat_id, "Cannot take a video, BufferedRecorder is not loaded.");
            }
        }
    }

    /// `/detect [on|off [never|at HH:MM]]`.
    pub fn handle_detect(&self, chat_id: i64, user: &str, args: &[&str]) {
        if !self.require_authorized(chat_id) {
            return;
        }
        let detector = match &self.detector {
            Some(d) => d,
            None => {
                self.chat
                    .send_message(chat_id, "Cannot control detection, MotionDetector is not loaded.");
                return;
            }
        };
        let command = match DetectCommand::parse(args) {
            Some(c) => c,
            None => {
                self.chat.send_message(chat_id, "I did not understand.");
                return;
            }
        };
        match command {
            DetectCommand::Query => {
                let text = if detector.is_enabled() { "Detection is ON." } else { "Detection is OFF." };
                self.chat.send_message(chat_id, text);
            }
            DetectCommand::Toggle { enable } => {
                detector.set_enabled(enable);
                let desc = if enable { "ON" } else { "OFF" };
                self.chat
                    .broadcast_message(&self.auth.authorised_chat_ids(), &format!("User {} turned {} detection.", user, desc));
            }
            DetectCommand::ClearSchedule { enable } => {
                let desc = if enable { "ON" } else { "OFF" };
                self.chat.broadcast_message(
                    &self.auth.authorised_chat_ids(),
                    &format!("User {} deleted detection {} schedule.", user, desc),
                );
            }
            DetectCommand::Schedule { enable, at } => {
                let desc = if enable { "ON" } else { "OFF" };
                self.chat.broadcast_message(
                    &self.auth.authorised_chat_ids(),
                    &format!(
                        "User {} scheduled to turn detection {} at {:02}:{:02}:{:02}.",
                        user, desc, at.hour, at.minute, at.second
                    ),
                );
            }
        }
    }

    /// `/light [on|off|<0..1>|pulse]`.
    pub fn handle_light(&self, chat_id: i64, args: &[&str]) {
        if !self.require_authorized(chat_id) {
            return;
        }
        let light = match &self.light {
            Some(l) => l,
            None => {
                self.chat.send_message(chat_id, "Cannot control the light, PWMLed is not loaded.");
                return;
            }
        };
        if args.is_empty() {
            let text = if light.is_lit() { "Light is ON." } else { "Light is OFF." };
            self.chat.send_message(chat_id, text);
            return;
        }
        match args[0].trim().to_ascii_lowercase().as_str() {
            "on" => light.on(),
            "off" => light.off(),
            "pulse" => light.pulse(),
            other => match other.parse::<f64>() {
                Ok(v) if (0.0..=1.0).contains(&v) => light.set_value(v),
                _ => {
                    self.chat.send_message(chat_id, "I did not understand.");
                    return;
                }
            },
        }
    }

    /// `left_chat_member` event: revoke auth once the bot is the sole
    /// remaining member.
    pub fn handle_left_chat_member(&self, chat_id: i64, remaining_members: u32) {
        if remaining_members <= 1 {
            let _ = self.auth.mutate(chat_id, |s| s.revoke_auth());
        }
    }
}
