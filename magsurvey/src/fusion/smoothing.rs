use crate::measurement::RawField;

/// Readings collected during one sampling window.
#[derive(Debug, Clone, Default)]
pub struct ReadingWindow {
    alpha: Option<f64>,
    current: Option<RawField>,
    count: usize,
}

impl ReadingWindow {
    /// `alpha` is the EMA weight of each new reading; `None` keeps only the last.
    pub fn new(alpha: Option<f64>) -> Self {
        Self {
            alpha,
            current: None,
            count: 0,
        }
    }

    pub fn push(&mut self, reading: RawField) {
        self.current = Some(match (self.alpha, self.current) {
            (Some(alpha), Some(prev)) => RawField {
                x: alpha * reading.x + (1.0 - alpha) * prev.x,
                y: alpha * reading.y + (1.0 - alpha) * prev.y,
                z: alpha * reading.z + (1.0 - alpha) * prev.z,
            },
            _ => reading,
        });
        self.count += 1;
    }

    pub fn current(&self) -> Option<RawField> {
        self.current
    }

    /// Number of readings since the window started.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Starts a new window.
    pub fn reset(&mut self) {
        self.current = None;
        self.count = 0;
    }
}
