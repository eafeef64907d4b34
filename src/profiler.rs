use std::time::{Duration, Instant};

/// Opt-in frame profiler. Accumulates per-phase wall time and logs a
/// summary once per second; disabled it costs two branches per call.
pub struct Profiler {
    enabled: bool,
    phases: Vec<(&'static str, Duration)>,
    current: Option<(&'static str, Instant)>,
    frames: u32,
    last_report: Instant,
}

impl Profiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            phases: Vec::new(),
            current: None,
            frames: 0,
            last_report: Instant::now(),
        }
    }

    pub fn begin_phase(&mut self, name: &'static str) {
        if !self.enabled {
            return;
        }
        self.close_phase();
        self.current = Some((name, Instant::now()));
    }

    fn close_phase(&mut self) {
        let Some((name, start)) = self.current.take() else {
            return;
        };
        let elapsed = start.elapsed();
        match self.phases.iter_mut().find(|(n, _)| *n == name) {
            Some((_, total)) => *total += elapsed,
            None => self.phases.push((name, elapsed)),
        }
    }

    pub fn end_frame(&mut self) {
        if !self.enabled {
            return;
        }
        self.close_phase();
        self.frames += 1;

        let since_report = self.last_report.elapsed();
        if since_report < Duration::from_secs(1) {
            return;
        }
        let frames = self.frames.max(1);
        let summary: Vec<String> = self
            .phases
            .iter()
            .map(|(name, total)| format!("{name} {:.2}ms", total.as_secs_f64() * 1000.0 / frames as f64))
            .collect();
        log::info!(
            "{:.0} fps | {}",
            frames as f64 / since_report.as_secs_f64(),
            summary.join(" | ")
        );
        self.phases.clear();
        self.frames = 0;
        self.last_report = Instant::now();
    }
}
