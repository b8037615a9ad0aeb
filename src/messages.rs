//! The application's message set: year changes, audio cues, help, credits, web views and
//! controller input.
use crate::Missive;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to an audio asset owned by the host's audio system
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AudioClip(pub String);

impl AudioClip {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// A selectable year, its display label and the clip that plays with it
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct YearData {
    pub year: i32,
    pub label: String,
    pub audio_clip: AudioClip,
}

impl YearData {
    pub fn new(year: i32, label: impl Into<String>, audio_clip: AudioClip) -> Self {
        Self {
            year,
            label: label.into(),
            audio_clip,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ControllerType {
    Right,
    Left,
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerType::Right => f.write_str("Right"),
            ControllerType::Left => f.write_str("Left"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ButtonType {
    Trigger,
    Grip,
    TouchPad,
    /// A on the right controller, X on the left
    ButtonOne,
    /// B on the right controller, Y on the left
    ButtonTwo,
    StartMenu,
}

impl fmt::Display for ButtonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ButtonType::Trigger => "Trigger",
            ButtonType::Grip => "Grip",
            ButtonType::TouchPad => "TouchPad",
            ButtonType::ButtonOne => "ButtonOne",
            ButtonType::ButtonTwo => "ButtonTwo",
            ButtonType::StartMenu => "StartMenu",
        };
        f.write_str(name)
    }
}

/// The selected year changed
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct YearChanged {
    pub data: YearData,
}

/// The help panel was toggled
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct HelpToggled {
    pub state: bool,
}

/// The current year's audio cue should play
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct AudioCueRequested;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct CreditsRequested;

/// A web view should open on `url`
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct WebViewRequested {
    pub url: String,
}

/// A controller button was released
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct InputReceived {
    pub controller: ControllerType,
    pub button: ButtonType,
}

impl fmt::Display for InputReceived {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.controller, self.button)
    }
}

impl Missive for YearChanged {}
impl Missive for HelpToggled {}
impl Missive for AudioCueRequested {}
impl Missive for CreditsRequested {}
impl Missive for WebViewRequested {}
impl Missive for InputReceived {}
