pub mod controller;
pub mod loop_worker;

use async_trait::async_trait;
use log::warn;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

pub use controller::SensingController;

/// Source of ambient light readings in lux. `None` ends the stream.
#[async_trait]
pub trait LightSensor: Send {
    async fn next_reading(&mut self) -> Option<f32>;
}

/// Reads one lux value per line. Blank and unparsable lines are skipped.
pub struct LineLightSensor<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send> LineLightSensor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

impl LineLightSensor<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LightSensor for LineLightSensor<R> {
    async fn next_reading(&mut self) -> Option<f32> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(err) => {
                    warn!("light sensor input failed: {err}");
                    return None;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match trimmed.parse::<f32>() {
                Ok(lux) if lux.is_finite() => return Some(lux),
                _ => warn!("ignoring light sensor line {trimmed:?}"),
            }
        }
    }
}
