//! Audio playback to system speakers.
//!
//! The [`Player`] capability is deliberately narrow: play a decodable
//! blob blocking until done, preempt it, observe whether something is
//! playing. The ordered playback stage drives it from a blocking-pool
//! thread so the async runtime is never starved.

use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tracing::info;

use crate::error::{AgentError, Result};

/// Blocking audio playback capability.
pub trait Player: Send + Sync {
    /// Decode and play a blob, blocking until the device finishes or
    /// [`stop`](Self::stop) preempts it.
    fn play(&self, samples: &[u8]) -> Result<()>;

    /// Preempt the current playback, if any.
    fn stop(&self);

    /// Whether a blob is currently playing.
    fn is_playing(&self) -> bool;
}

/// System speaker output via rodio.
///
/// The OS output stream lives on a dedicated thread for the process
/// lifetime; dropping it would silence the device mid-playback.
pub struct SpeakerPlayer {
    handle: OutputStreamHandle,
    current: Mutex<Option<Sink>>,
    playing: AtomicBool,
}

impl SpeakerPlayer {
    /// Open the default output device.
    pub fn new() -> Result<Self> {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    if tx.send(Ok(handle)).is_err() {
                        return;
                    }
                    // Keep the stream alive; parking is the thread's job.
                    let _stream = stream;
                    loop {
                        std::thread::park();
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(AgentError::Audio(format!(
                        "no output device: {e}"
                    ))));
                }
            })?;

        let handle = rx
            .recv()
            .map_err(|_| AgentError::Audio("audio thread died during startup".into()))??;
        info!("speaker output ready");

        Ok(Self {
            handle,
            current: Mutex::new(None),
            playing: AtomicBool::new(false),
        })
    }
}

impl Player for SpeakerPlayer {
    fn play(&self, samples: &[u8]) -> Result<()> {
        let source = Decoder::new(Cursor::new(samples.to_vec()))
            .map_err(|e| AgentError::Audio(format!("undecodable audio blob: {e}")))?;
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| AgentError::Audio(format!("cannot open sink: {e}")))?;
        sink.append(source);

        self.playing.store(true, Ordering::SeqCst);
        *self.current.lock().expect("sink lock") = Some(sink);

        // Wait until the sink drains or stop() takes it away.
        loop {
            {
                let guard = self.current.lock().expect("sink lock");
                match guard.as_ref() {
                    Some(sink) if !sink.empty() => {}
                    _ => break,
                }
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        self.playing.store(false, Ordering::SeqCst);
        self.current.lock().expect("sink lock").take();
        Ok(())
    }

    fn stop(&self) {
        if let Some(sink) = self.current.lock().expect("sink lock").take() {
            sink.stop();
        }
        self.playing.store(false, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}
