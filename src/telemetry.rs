use std::time::Duration;

/// Events emitted by the runner as it walks the query sequence
#[derive(Debug, Clone)]
pub enum StepEvent {
    /// A step was about to be sent to the server
    Started { step: &'static str },
    /// A step came back successfully
    Finished {
        step: &'static str,
        documents: u64,
        duration: Duration,
    },
}

/// Statistics aggregated from step events
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub steps_started: usize,
    pub steps_completed: usize,
    pub documents_returned: u64,
    pub total_duration: Duration,
    pub slowest: Option<(&'static str, Duration)>,
    last_started: Option<&'static str>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a step event
    pub fn update(&mut self, event: &StepEvent) {
        match event {
            StepEvent::Started { step } => {
                self.steps_started += 1;
                self.last_started = Some(*step);
                tracing::debug!(step, "step started");
            }
            StepEvent::Finished {
                step,
                documents,
                duration,
            } => {
                self.steps_completed += 1;
                self.documents_returned += documents;
                self.total_duration += *duration;
                if self.slowest.is_none_or(|(_, slowest)| *duration > slowest) {
                    self.slowest = Some((*step, *duration));
                }
                tracing::info!(step, documents, elapsed = ?duration, "step finished");
            }
        }
    }

    /// The step that started but never finished, if any
    pub fn failed_step(&self) -> Option<&'static str> {
        if self.steps_started > self.steps_completed {
            self.last_started
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_slowest_step() {
        let mut stats = RunStats::new();
        for (step, documents, millis) in [("genre", 3, 4), ("decade", 5, 9), ("author", 1, 2)] {
            stats.update(&StepEvent::Started { step });
            stats.update(&StepEvent::Finished {
                step,
                documents,
                duration: Duration::from_millis(millis),
            });
        }

        assert_eq!(stats.steps_completed, 3);
        assert_eq!(stats.documents_returned, 9);
        assert_eq!(stats.total_duration, Duration::from_millis(15));
        assert_eq!(stats.slowest, Some(("decade", Duration::from_millis(9))));
        assert_eq!(stats.failed_step(), None);
    }

    #[test]
    fn test_started_without_finish_is_reported_as_failed() {
        let mut stats = RunStats::new();
        stats.update(&StepEvent::Started { step: "genre" });
        stats.update(&StepEvent::Finished {
            step: "genre",
            documents: 2,
            duration: Duration::from_millis(1),
        });
        stats.slowest = None;
        stats.update(&StepEvent::Started { step: "reprice" });
        assert_eq!(stats.failed_step(), Some("reprice"));
        assert_eq!(stats.steps_completed, 1);
        assert_eq!(stats.slowest, None);
    }
}
