#[cfg(feature = "sound")]
pub mod tone;

use log::{info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;

/// Audible notification played when a timed lux session ends.
pub trait Alarm: Send + Sync {
    fn play(&self);
    fn stop(&self);
}

enum AlarmCommand {
    Play,
    Stop,
}

/// Owns a dedicated thread for the non-`Send` audio output objects and
/// forwards commands to it. Without the `sound` feature the thread only logs.
pub struct AlarmHandle {
    tx: Arc<Mutex<Option<Sender<AlarmCommand>>>>,
    is_playing: Arc<AtomicBool>,
}

impl AlarmHandle {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
            is_playing: Arc::new(AtomicBool::new(false)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AlarmCommand>, String> {
        if let Some(tx) = self.tx.lock().map_err(|e| e.to_string())?.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AlarmCommand>();
        let is_playing = Arc::clone(&self.is_playing);

        thread::Builder::new()
            .name("alarm".to_string())
            .spawn(move || {
                let mut output = AlarmOutput::default();
                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AlarmCommand::Play => {
                            output.stop();
                            if let Err(err) = output.play() {
                                warn!("Alarm output unavailable: {err}");
                            }
                            is_playing.store(true, Ordering::SeqCst);
                        }
                        AlarmCommand::Stop => {
                            output.stop();
                            is_playing.store(false, Ordering::SeqCst);
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        let tx_clone = tx.clone();
        *self.tx.lock().map_err(|e| e.to_string())? = Some(tx);
        Ok(tx_clone)
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::SeqCst)
    }
}

impl Default for AlarmHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Alarm for AlarmHandle {
    fn play(&self) {
        match self.ensure_thread() {
            Ok(tx) => {
                let _ = tx.send(AlarmCommand::Play);
            }
            Err(err) => warn!("Failed to start alarm thread: {err}"),
        }
    }

    fn stop(&self) {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(AlarmCommand::Stop);
        }
    }
}

#[cfg(feature = "sound")]
#[derive(Default)]
struct AlarmOutput {
    _stream: Option<rodio::OutputStream>,
    sink: Option<rodio::Sink>,
}

#[cfg(feature = "sound")]
impl AlarmOutput {
    fn play(&mut self) -> Result<(), String> {
        let (stream, handle) = rodio::OutputStream::try_default()
            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
        let sink = rodio::Sink::try_new(&handle)
            .map_err(|e| format!("Failed to create audio sink: {}", e))?;
        sink.append(tone::AlarmTone::new());
        sink.play();
        self._stream = Some(stream);
        self.sink = Some(sink);
        info!("Alarm playing");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
            info!("Alarm stopped");
        }
        self._stream = None;
    }
}

#[cfg(not(feature = "sound"))]
#[derive(Default)]
struct AlarmOutput {
    playing: bool,
}

#[cfg(not(feature = "sound"))]
impl AlarmOutput {
    fn play(&mut self) -> Result<(), String> {
        self.playing = true;
        info!("Alarm (built without sound output)");
        Ok(())
    }

    fn stop(&mut self) {
        if std::mem::take(&mut self.playing) {
            info!("Alarm stopped");
        }
    }
}
