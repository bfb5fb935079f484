use crate::prelude::{SaftError, SaftResult};
use std::time::{Duration, Instant};

/// Stopwatch used to time pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    start: Option<Instant>,
    stop: Option<Instant>,
}

impl Timer {
    /// Creates a timer that is already running.
    pub fn started() -> Self {
        Self {
            start: Some(Instant::now()),
            stop: None,
        }
    }

    pub fn start(&mut self) -> SaftResult<()> {
        if self.start.is_some() {
            return Err(SaftError::NotReady("timer already started".into()));
        }
        self.start = Some(Instant::now());
        Ok(())
    }

    pub fn stop(&mut self) -> SaftResult<()> {
        if self.start.is_none() {
            return Err(SaftError::NotReady("timer not started".into()));
        }
        if self.stop.is_some() {
            return Err(SaftError::NotReady("timer already stopped".into()));
        }
        self.stop = Some(Instant::now());
        Ok(())
    }

    pub fn elapsed(&self) -> SaftResult<Duration> {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => Ok(stop - start),
            (None, _) => Err(SaftError::NotReady("timer not started".into())),
            (Some(_), None) => Err(SaftError::NotReady("timer not stopped".into())),
        }
    }

    /// Stops the timer and returns the elapsed seconds.
    pub fn stop_secs(&mut self) -> SaftResult<f64> {
        self.stop()?;
        Ok(self.elapsed()?.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_timer_measures_after_stop() {
        let mut timer = Timer::started();
        timer.stop().unwrap();
        assert!(timer.elapsed().is_ok());
    }

    #[test]
    fn misuse_is_reported() {
        let mut timer = Timer::started();
        assert!(matches!(timer.start(), Err(SaftError::NotReady(_))));
        assert!(matches!(timer.elapsed(), Err(SaftError::NotReady(_))));
        timer.stop().unwrap();
        assert!(matches!(timer.stop(), Err(SaftError::NotReady(_))));

        let mut idle = Timer::default();
        assert!(idle.stop().is_err());
    }
}
