use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::mpsc::{self, Receiver, Sender};
use log::{debug, info};
use crate::GpioResult;
use crate::keypad::{KeyEvent, KeyIdentity};

/// The consumer of key events.
///
/// Events of one scan arrive one at a time, in row-major order, each
/// delivered before the next one is produced.
pub trait EventSink<K>: Debug + Send {
    /// Announces every key the keypad can produce. Called once, before the first scan.
    fn register(&mut self, capabilities: &BTreeSet<K>) -> GpioResult<()> {
        let _ = capabilities;
        Ok(())
    }

    /// Receives a single press or release.
    fn report(&mut self, event: KeyEvent<K>);
}

/// Forwards events to a [Receiver] on another thread.
#[derive(Debug)]
pub struct ChannelSink<K> {
    sender: Sender<KeyEvent<K>>,
}

impl<K: KeyIdentity> ChannelSink<K> {
    pub fn new() -> (Self, Receiver<KeyEvent<K>>) {
        let (sender, receiver) = mpsc::channel();
        (ChannelSink { sender }, receiver)
    }
}

impl<K: KeyIdentity> EventSink<K> for ChannelSink<K> {
    fn register(&mut self, capabilities: &BTreeSet<K>) -> GpioResult<()> {
        debug!("Channel sink registered for {} keys: {:?}", capabilities.len(), capabilities);
        Ok(())
    }

    fn report(&mut self, event: KeyEvent<K>) {
        if self.sender.send(event).is_err() {
            debug!("Event receiver is gone, dropping {:?}", event);
        }
    }
}

/// Writes every event to the log at info level.
#[derive(Debug, Default)]
pub struct LogSink;

impl<K: KeyIdentity> EventSink<K> for LogSink {
    fn register(&mut self, capabilities: &BTreeSet<K>) -> GpioResult<()> {
        info!("Keypad reports {:?}", capabilities);
        Ok(())
    }

    fn report(&mut self, event: KeyEvent<K>) {
        info!("{:?} {}", event.key, if event.pressed { "pressed" } else { "released" });
    }
}
