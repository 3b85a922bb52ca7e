//! Record and replay of a control session.
//!
//! While recording, every effective state (one per tick) is appended to the
//! session buffer. Playing substitutes the buffered states, front to back,
//! for whatever the operator currently sends; only the operator's `stop`
//! flag is still honoured.
//!
//! Flags count when pressed: one held over several ticks acts once.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::state::ControlState;

/// Upper bound on one encoded record in a session file.
const MAX_RECORD_LEN: usize = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecorderMode {
    Idle,
    Recording,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Keep the buffer when recording stops, so it can be played back.
    pub retain_on_stop: bool,
    /// Recording stops by itself once this many states are buffered.
    pub max_len: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        RecorderConfig {
            retain_on_stop: true,
            // ten minutes at 50 Hz
            max_len: 30_000,
        }
    }
}

/// Operator flags seen on the previous incoming state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Flags {
    stop: bool,
    record: bool,
    play: bool,
}

impl Flags {
    fn of(state: &ControlState) -> Self {
        Flags {
            stop: state.stop,
            record: state.record,
            play: state.play,
        }
    }

    /// Flags that became true since `previous`.
    fn rising(self, previous: Flags) -> Flags {
        Flags {
            stop: self.stop && !previous.stop,
            record: self.record && !previous.record,
            play: self.play && !previous.play,
        }
    }
}

pub struct SessionRecorder {
    config: RecorderConfig,
    mode: RecorderMode,
    buffer: VecDeque<ControlState>,
    held: Flags,
    // buffer holds a recording made here that was not played since
    fresh_recording: bool,
}

impl SessionRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        SessionRecorder {
            config,
            mode: RecorderMode::Idle,
            buffer: VecDeque::new(),
            held: Flags::default(),
            fresh_recording: false,
        }
    }

    pub fn mode(&self) -> RecorderMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn states(&self) -> impl Iterator<Item = &ControlState> {
        self.buffer.iter()
    }

    /// Returns the tick's effective state and whether the mode changed.
    pub fn tick(&mut self, incoming: ControlState) -> (ControlState, bool) {
        let previous = self.mode;
        self.transition(&incoming);

        let effective = match self.mode {
            RecorderMode::Idle => incoming,
            RecorderMode::Recording => {
                if self.buffer.len() >= self.config.max_len {
                    warn!("session buffer full at {} states, recording stopped", self.buffer.len());
                    self.mode = RecorderMode::Idle;
                } else {
                    self.buffer.push_back(incoming.clone());
                }
                incoming
            }
            RecorderMode::Playing => match self.buffer.pop_front() {
                Some(recorded) => recorded,
                None => {
                    info!("[SESSION] playback finished");
                    self.mode = RecorderMode::Idle;
                    incoming
                }
            },
        };

        (effective, self.mode != previous)
    }

    /// Mode flags are edge-triggered: a flag acts only on the tick it
    /// turns on, so a held flag repeated tick after tick is inert.
    fn transition(&mut self, incoming: &ControlState) {
        let flags = Flags::of(incoming);
        let pressed = flags.rising(self.held);
        self.held = flags;

        match self.mode {
            RecorderMode::Idle => {
                if pressed.record {
                    info!("[SESSION] recording");
                    self.buffer.clear();
                    self.fresh_recording = true;
                    self.mode = RecorderMode::Recording;
                } else if pressed.play {
                    if self.buffer.is_empty() {
                        debug!("play requested with an empty session, ignored");
                    } else {
                        info!("[SESSION] playing {} states", self.buffer.len());
                        self.fresh_recording = false;
                        self.mode = RecorderMode::Playing;
                    }
                }
            }
            RecorderMode::Recording => {
                if pressed.stop {
                    info!("[SESSION] stopped recording after {} states", self.buffer.len());
                    if !self.config.retain_on_stop {
                        self.buffer.clear();
                        self.fresh_recording = false;
                    }
                    self.mode = RecorderMode::Idle;
                }
            }
            RecorderMode::Playing => {
                if pressed.stop {
                    info!("[SESSION] playback stopped, {} states abandoned", self.buffer.len());
                    self.buffer.clear();
                    self.mode = RecorderMode::Idle;
                }
            }
        }
    }

    /// True while recording, or once a recording has ended and has not
    /// been played or replaced since. A preloaded or partly played buffer
    /// is never a new recording.
    pub fn has_new_recording(&self) -> bool {
        self.fresh_recording && !self.buffer.is_empty()
    }

    /// Replaces the buffer with a saved session. Ignored unless idle.
    pub fn preload(&mut self, states: Vec<ControlState>) {
        if self.mode != RecorderMode::Idle {
            warn!("cannot preload a session while {:?}", self.mode);
            return;
        }
        self.buffer = states.into_iter().take(self.config.max_len).collect();
        self.fresh_recording = false;
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let mut writer = BufWriter::new(File::create(path)?);
        write_session(&mut writer, self.buffer.iter())?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_from(&mut self, path: impl AsRef<Path>) -> Result<usize, SessionError> {
        let states = read_session(BufReader::new(File::open(path)?))?;
        self.preload(states);
        Ok(self.buffer.len())
    }
}

/// Writes each state as a 4-byte big-endian length followed by its JSON.
pub fn write_session<'a, W: Write>(
    writer: &mut W,
    states: impl IntoIterator<Item = &'a ControlState>,
) -> Result<(), SessionError> {
    for (index, state) in states.into_iter().enumerate() {
        let bytes = serde_json::to_vec(state).map_err(|source| SessionError::Record { index, source })?;
        if bytes.len() > MAX_RECORD_LEN {
            return Err(SessionError::RecordTooLarge { index, len: bytes.len() });
        }
        writer.write_all(&(bytes.len() as u32).to_be_bytes())?;
        writer.write_all(&bytes)?;
    }
    Ok(())
}

/// Reads records until end of input. A truncated length prefix ends the
/// session; a truncated record body is an error.
pub fn read_session<R: Read>(mut reader: R) -> Result<Vec<ControlState>, SessionError> {
    let mut states = Vec::new();
    let mut prefix = [0u8; 4];
    loop {
        match reader.read_exact(&mut prefix) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let index = states.len();
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_RECORD_LEN {
            return Err(SessionError::RecordTooLarge { index, len });
        }
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        let state = serde_json::from_slice(&body).map_err(|source| SessionError::Record { index, source })?;
        states.push(state);
    }
    Ok(states)
}
