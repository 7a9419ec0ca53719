use rigidsync_kernel::FrameReport;

/// Ring buffer of sub-steps taken per frame, for spotting catch-up spikes.
#[derive(Debug)]
pub struct SubstepHistory {
    history: Vec<u32>,
    capacity: usize,
    index: usize,
    filled: bool,
}

impl SubstepHistory {
    /// `capacity` is raised to at least one frame.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: vec![0; capacity],
            capacity,
            index: 0,
            filled: false,
        }
    }

    pub fn record(&mut self, substeps: u32) {
        self.history[self.index] = substeps;
        self.index = (self.index + 1) % self.capacity;
        if self.index == 0 {
            self.filled = true;
        }
    }

    pub fn record_report(&mut self, report: &FrameReport) {
        self.record(report.substeps);
    }

    fn recorded(&self) -> &[u32] {
        &self.history[..self.count()]
    }

    pub fn average(&self) -> f32 {
        let recorded = self.recorded();
        if recorded.is_empty() {
            return 0.0;
        }
        recorded.iter().map(|&n| n as f32).sum::<f32>() / recorded.len() as f32
    }

    pub fn max(&self) -> u32 {
        self.recorded().iter().copied().max().unwrap_or(0)
    }

    /// Frames in the window that ran more than one sub-step.
    pub fn catch_up_frames(&self) -> usize {
        self.recorded().iter().filter(|&&n| n > 1).count()
    }

    pub fn count(&self) -> usize {
        if self.filled {
            self.capacity
        } else {
            self.index
        }
    }
}
