use tracing::debug;

type Release = Box<dyn FnOnce()>;

/// Scoped acquisition for protocol objects and mappings.
///
/// Each acquired resource registers a labelled release action. Actions run in reverse
/// registration order, exactly once: either through [`ReleaseStack::release`] on the
/// graceful path or from `Drop` when an error unwinds the setup.
#[derive(Default)]
pub struct ReleaseStack {
    actions: Vec<(&'static str, Release)>,
}

impl ReleaseStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, label: &'static str, release: F)
    where
        F: FnOnce() + 'static,
    {
        debug!("Acquired {}", label);
        self.actions.push((label, Box::new(release)));
    }

    /// Labels in the order they would be released.
    pub fn pending(&self) -> Vec<&'static str> {
        self.actions.iter().rev().map(|(label, _)| *label).collect()
    }

    pub fn release(mut self) {
        self.unwind();
    }

    fn unwind(&mut self) {
        while let Some((label, release)) = self.actions.pop() {
            debug!("Releasing {}", label);
            release();
        }
    }
}

impl Drop for ReleaseStack {
    fn drop(&mut self) {
        self.unwind();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |label: &'static str| {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(label)) as Box<dyn FnOnce()>
        };
        (log, make)
    }

    fn overlay_stack(make: &impl Fn(&'static str) -> Box<dyn FnOnce()>) -> ReleaseStack {
        let mut stack = ReleaseStack::new();
        stack.push("surface", make("destroy surface"));
        stack.push("layer surface", make("destroy role"));
        stack.push("buffer", make("destroy buffer"));
        stack.push("mapping", make("unmap"));
        stack
    }

    #[test]
    fn test_release_runs_in_reverse_order() {
        let (log, make) = recorder();
        let stack = overlay_stack(&make);
        assert_eq!(
            stack.pending(),
            vec!["mapping", "buffer", "layer surface", "surface"]
        );

        stack.release();

        assert_eq!(
            *log.borrow(),
            vec!["unmap", "destroy buffer", "destroy role", "destroy surface"]
        );
    }

    #[test]
    fn test_drop_releases_partial_setup() {
        let (log, make) = recorder();
        {
            let mut stack = ReleaseStack::new();
            stack.push("surface", make("destroy surface"));
            stack.push("layer surface", make("destroy role"));
            // Setup fails here; the stack goes out of scope.
        }
        assert_eq!(*log.borrow(), vec!["destroy role", "destroy surface"]);
    }

    #[test]
    fn test_release_is_exactly_once() {
        let (log, make) = recorder();
        let stack = overlay_stack(&make);
        stack.release();
        // `release` consumed the stack; its Drop must not replay anything.
        assert_eq!(log.borrow().len(), 4);
    }

    #[test]
    fn test_empty_stack() {
        let stack = ReleaseStack::new();
        assert!(stack.pending().is_empty());
        stack.release();
    }
}
