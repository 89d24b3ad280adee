// Copyright (c) 2019-present the aural-core contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Simple process-wide logger. Writes to stdout; callers can additionally
//! subscribe via an mpsc channel to mirror messages into an engine console.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::fmt::{Debug, Display};
use std::io::{self, Write};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

/// A message sent to every listener.
pub struct LogMessage {
    pub kind: MessageKind,
    pub content: String,
    pub time: Duration,
}

lazy_static! {
    static ref LOG: Mutex<Log> = Mutex::new(Log {
        verbosity: MessageKind::Information,
        listeners: Default::default(),
        time_origin: Instant::now(),
    });
}

/// Matches `log_level` of the configuration surface (`error`, `warning`, `info`);
/// `debug` is treated as `Information` with an unfiltered verbosity floor.
#[derive(Copy, Clone, PartialOrd, PartialEq, Eq, Ord, Hash, Debug)]
#[repr(u32)]
pub enum MessageKind {
    Information = 0,
    Warning = 1,
    Error = 2,
}

impl MessageKind {
    fn as_str(self) -> &'static str {
        match self {
            MessageKind::Information => "[INFO]: ",
            MessageKind::Warning => "[WARNING]: ",
            MessageKind::Error => "[ERROR]: ",
        }
    }
}

pub struct Log {
    verbosity: MessageKind,
    listeners: Vec<Sender<LogMessage>>,
    time_origin: Instant,
}

impl Log {
    fn writeln_internal<S>(&mut self, kind: MessageKind, message: S)
    where
        S: AsRef<str>,
    {
        if (kind as u32) < self.verbosity as u32 {
            return;
        }

        let mut msg = message.as_ref().to_owned();

        self.listeners.retain(|listener| {
            listener
                .send(LogMessage {
                    kind,
                    content: msg.clone(),
                    time: Instant::now() - self.time_origin,
                })
                .is_ok()
        });

        msg.insert_str(0, kind.as_str());
        msg.push('\n');
        let _ = io::stdout().write_all(msg.as_bytes());
    }

    pub fn info<S: AsRef<str>>(msg: S) {
        LOG.lock().writeln_internal(MessageKind::Information, msg)
    }

    pub fn warn<S: AsRef<str>>(msg: S) {
        LOG.lock().writeln_internal(MessageKind::Warning, msg)
    }

    pub fn err<S: AsRef<str>>(msg: S) {
        LOG.lock().writeln_internal(MessageKind::Error, msg)
    }

    pub fn set_verbosity(kind: MessageKind) {
        LOG.lock().verbosity = kind;
    }

    pub fn add_listener(listener: Sender<LogMessage>) {
        LOG.lock().listeners.push(listener)
    }

    /// Logs and absorbs a recoverable error instead of propagating it.
    /// Typical use: `Log::verify(backend.set_gain(handle, gain))`.
    pub fn verify<T, E>(result: Result<T, E>)
    where
        E: Debug,
    {
        if let Err(e) = result {
            Self::err(format!("Operation failed! Reason: {e:?}"));
        }
    }

    pub fn verify_message<S, T, E>(result: Result<T, E>, msg: S)
    where
        E: Debug,
        S: Display,
    {
        if let Err(e) = result {
            Self::err(format!("{msg}. Reason: {e:?}"));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn verbosity_filters_messages() {
        let (tx, rx) = mpsc::channel();
        Log::add_listener(tx);
        Log::set_verbosity(MessageKind::Error);
        Log::info("should be filtered");
        Log::err("should pass");
        Log::set_verbosity(MessageKind::Information);

        let mut saw_error = false;
        while let Ok(msg) = rx.try_recv() {
            assert_eq!(msg.kind, MessageKind::Error);
            saw_error = true;
        }
        assert!(saw_error);
    }

    #[test]
    fn verify_absorbs_error() {
        let result: Result<(), &str> = Err("boom");
        Log::verify(result);
    }
}
