use std::{collections::VecDeque, path::PathBuf, sync::Arc, time::Duration};

use crate::{
    dataset,
    error::{Error, Result},
    models::{DomainSample, EventRecord},
};

use super::{ReadInterrupt, SleepInterrupt, SourceAdapter};

const MAX_PACING_SLEEP_SECS: f64 = 0.2;

/// Replays one game's events from the dataset CSV, paced by event time.
pub struct EventLogSource {
    path: PathBuf,
    game_id: i64,
    playback_speed: f64,
    events: VecDeque<EventRecord>,
    last_ts: Option<f64>,
    opened: bool,
    pause: Arc<SleepInterrupt>,
}

impl EventLogSource {
    pub fn new(path: PathBuf, game_id: i64, playback_speed: f64) -> Self {
        let playback_speed = if playback_speed.is_finite() && playback_speed > 0.0 {
            playback_speed
        } else {
            1.0
        };
        Self {
            path,
            game_id,
            playback_speed,
            events: VecDeque::new(),
            last_ts: None,
            opened: false,
            pause: Arc::new(SleepInterrupt::new()),
        }
    }

    /// Wall-clock pause before emitting an event `delta` stream-seconds after the previous one.
    fn pacing(&self, delta: f64) -> Option<Duration> {
        if delta <= 0.0 {
            return None;
        }
        let secs = (delta / self.playback_speed).min(MAX_PACING_SLEEP_SECS);
        Some(Duration::from_secs_f64(secs))
    }
}

impl SourceAdapter for EventLogSource {
    fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        let events = dataset::load_game_events(&self.path, self.game_id)
            .map_err(|err| Error::SourceUnavailable(err.to_string()))?;
        self.events = events.into();
        self.last_ts = None;
        self.opened = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<(DomainSample, f64)>> {
        if !self.opened {
            return Err(Error::SourceUnavailable(format!(
                "event log {} is not open",
                self.path.display()
            )));
        }
        if self.pause.is_interrupted() {
            return Ok(None);
        }
        let Some(event) = self.events.pop_front() else {
            return Ok(None);
        };

        let ts = event.time_seconds;
        if let Some(prev) = self.last_ts {
            if let Some(pause) = self.pacing(ts - prev) {
                if !self.pause.sleep(pause) {
                    return Ok(None);
                }
            }
        }
        self.last_ts = Some(ts);
        Ok(Some((DomainSample::Event(event), ts)))
    }

    fn close(&mut self) {
        self.events.clear();
        self.last_ts = None;
        self.opened = false;
    }

    fn interrupter(&self) -> Option<Arc<dyn ReadInterrupt>> {
        let handle: Arc<dyn ReadInterrupt> = self.pause.clone();
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, time::Instant};

    fn dataset(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("events.csv");
        fs::write(
            &path,
            "game_id,game_episode,action_id,time_seconds,type_name,result_name,start_x,start_y,end_x,end_y\n\
             5,1_1,2,3.0,Pass,Successful,10,10,20,10\n\
             5,1_1,1,1.0,Pass,Successful,10,10,20,10\n\
             6,1_1,1,0.0,Pass,Successful,10,10,20,10\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_reads_game_in_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = EventLogSource::new(dataset(dir.path()), 5, 1000.0);
        source.open().unwrap();
        source.open().unwrap();

        let (_, first) = source.read().unwrap().unwrap();
        let (sample, second) = source.read().unwrap().unwrap();
        assert_eq!((first, second), (1.0, 3.0));
        assert!(matches!(sample, DomainSample::Event(ref e) if e.action_id == Some(2)));
        assert!(source.read().unwrap().is_none());

        source.close();
        source.close();
    }

    #[test]
    fn test_pacing_is_capped() {
        let source = EventLogSource::new(PathBuf::from("unused.csv"), 1, 1.0);
        assert_eq!(source.pacing(0.0), None);
        assert_eq!(source.pacing(60.0), Some(Duration::from_millis(200)));

        let fast = EventLogSource::new(PathBuf::from("unused.csv"), 1, 10.0);
        assert_eq!(fast.pacing(1.0), Some(Duration::from_millis(100)));

        let coerced = EventLogSource::new(PathBuf::from("unused.csv"), 1, 0.0);
        assert_eq!(coerced.playback_speed, 1.0);
    }

    #[test]
    fn test_large_gap_sleeps_at_most_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");
        fs::write(
            &path,
            "game_id,game_episode,action_id,time_seconds,type_name,result_name,start_x,start_y,end_x,end_y\n\
             1,1_1,1,0.0,Pass,Successful,,,,\n\
             1,1_1,2,900.0,Pass,Successful,,,,\n",
        )
        .unwrap();

        let mut source = EventLogSource::new(path, 1, 1.0);
        source.open().unwrap();
        source.read().unwrap();
        let started = Instant::now();
        source.read().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_interrupt_ends_replay() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = EventLogSource::new(dataset(dir.path()), 5, 1.0);
        source.open().unwrap();
        assert!(source.read().unwrap().is_some());

        source.interrupter().unwrap().interrupt();
        let started = Instant::now();
        assert!(source.read().unwrap().is_none());
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = EventLogSource::new(dir.path().join("nope.csv"), 1, 1.0);
        assert!(matches!(source.open(), Err(Error::SourceUnavailable(_))));
        assert!(matches!(source.read(), Err(Error::SourceUnavailable(_))));
    }
}
