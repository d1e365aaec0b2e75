// Iteration budget and failure accounting for one step loop.

pub struct LoopController {
    max_iterations: u32,
    iteration: u32,
    failure_count: u32,
}

impl LoopController {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            iteration: 0,
            failure_count: 0,
        }
    }

    /// Start the next iteration; returns its 1-based index, or `None` once the budget is spent.
    pub fn next_iteration(&mut self) -> Option<u32> {
        if self.iteration >= self.max_iterations {
            return None;
        }
        self.iteration += 1;
        Some(self.iteration)
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn should_stop(&self) -> bool {
        self.iteration >= self.max_iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_hard() {
        let mut ctl = LoopController::new(2);
        assert_eq!(ctl.next_iteration(), Some(1));
        ctl.record_failure();
        assert_eq!(ctl.next_iteration(), Some(2));
        assert!(ctl.should_stop());
        assert_eq!(ctl.next_iteration(), None);
        assert_eq!(ctl.failure_count(), 1);

        assert_eq!(LoopController::new(0).next_iteration(), None);
    }
}
