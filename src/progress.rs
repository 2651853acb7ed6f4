/// Receives progress of a long running parse.
///
/// `maximum_found` is reported once the number of steps is known, `progress_made` before each
/// step is started.
pub trait Progress {
    fn maximum_found(&self, steps: usize);
    fn progress_made(&self, step: usize, description: &str);
}

/// No progress reporting.
impl Progress for () {
    fn maximum_found(&self, _steps: usize) {}
    fn progress_made(&self, _step: usize, _description: &str) {}
}

/// Progress written to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn maximum_found(&self, steps: usize) {
        tracing::info!("{} steps to go", steps);
    }

    fn progress_made(&self, step: usize, description: &str) {
        tracing::info!("[{}] {}", step, description);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Remembers everything reported to it.
    #[derive(Debug, Default)]
    pub struct RecordedProgress {
        pub maximum: RefCell<Option<usize>>,
        pub steps: RefCell<Vec<(usize, String)>>,
    }

    impl Progress for RecordedProgress {
        fn maximum_found(&self, steps: usize) {
            *self.maximum.borrow_mut() = Some(steps);
        }

        fn progress_made(&self, step: usize, description: &str) {
            self.steps.borrow_mut().push((step, description.to_owned()));
        }
    }

    #[test]
    fn test_recorded_progress() {
        let progress = RecordedProgress::default();
        progress.maximum_found(2);
        progress.progress_made(1, "Pass 1 of PRG/prg000.asm");

        assert_eq!(*progress.maximum.borrow(), Some(2));
        assert_eq!(progress.steps.borrow().len(), 1);
    }
}
