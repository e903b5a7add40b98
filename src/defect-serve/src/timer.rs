//! Wall-clock timing of pipeline stages, reported through the log.

use std::time::{Duration, Instant};

use log::{debug, info};

/// Times one stage of the pipeline.
///
/// Dropping a timer without stopping it logs nothing, so a stage that bails
/// out with `?` leaves only its "starting" line behind.
pub struct Timer {
    stage: String,
    started: Instant,
}

impl Timer {
    pub fn start(stage: impl Into<String>) -> Self {
        let stage = stage.into();
        debug!("{}: starting", stage);

        Timer {
            stage,
            started: Instant::now(),
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Log how long the stage took and return it.
    pub fn stop(self) -> Duration {
        let elapsed = self.started.elapsed();
        info!("{} duration: {} msec", self.stage, elapsed.as_millis());
        elapsed
    }
}
