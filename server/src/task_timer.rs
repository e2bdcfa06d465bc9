use std::{
    cell::RefCell,
    collections::BTreeMap,
    rc::Rc,
    time::{Duration, Instant},
};

type Task = Box<dyn FnOnce()>;

/// A scheduler for functions to be called after an amount of ticks; a tick
/// is one second.
///
/// Each worker owns one instance, driven by a [`run`][TaskTimer::run] task
/// on its event loop. Tasks expiring in the same tick run in scheduling
/// order; ids grow monotonically and reset to zero when the map drains.
/// Everything happens on the worker thread, so the interior state is
/// `Rc<RefCell<...>>` and the timer is not `Send`.
#[derive(Clone, Default)]
pub struct TaskTimer {
    inner: Rc<RefCell<Inner>>,
}

#[derive(Default)]
struct Inner {
    tasks: BTreeMap<u64, (Instant, Task)>,
    highest_id: u64,
}

impl std::fmt::Debug for TaskTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTimer")
            .field("pending", &self.inner.borrow().tasks.len())
            .finish()
    }
}

impl TaskTimer {
    /// construct a timer with no pending tasks
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to run after `timeout_seconds` ticks. The returned
    /// id cancels it; ids are not recycled until the task map empties.
    pub fn schedule(&self, timeout_seconds: u64, task: impl FnOnce() + 'static) -> u64 {
        let mut inner = self.inner.borrow_mut();
        inner.highest_id += 1;
        let id = inner.highest_id;
        let deadline = Instant::now() + Duration::from_secs(timeout_seconds);
        inner.tasks.insert(id, (deadline, Box::new(task)));
        log::trace!("task_timer scheduled {id}");
        id
    }

    /// Remove a scheduled task if it has not run yet.
    pub fn cancel(&self, id: u64) {
        self.inner.borrow_mut().tasks.remove(&id);
        log::trace!("task_timer cancelled {id}");
    }

    /// Run every task whose deadline has passed, in scheduling order, and
    /// erase it. Called once per tick.
    pub fn process_tasks(&self) {
        let now = Instant::now();
        let due: Vec<u64> = {
            let inner = self.inner.borrow();
            inner
                .tasks
                .iter()
                .filter(|(_, (deadline, _))| *deadline < now)
                .map(|(id, _)| *id)
                .collect()
        };

        for id in due {
            let task = self.inner.borrow_mut().tasks.remove(&id);
            if let Some((_, task)) = task {
                log::trace!("task_timer firing {id}");
                task();
            }
        }

        let mut inner = self.inner.borrow_mut();
        if inner.tasks.is_empty() {
            inner.highest_id = 0;
        }
    }

    /// how many tasks are waiting
    pub fn pending(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    /// Tick forever at one-second granularity. Spawned once per worker.
    pub async fn run(self) {
        loop {
            async_io::Timer::after(Duration::from_secs(1)).await;
            self.process_tasks();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn fifo_within_a_tick() {
        let timer = TaskTimer::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let log = log.clone();
            timer.schedule(0, move || log.borrow_mut().push(label));
        }

        std::thread::sleep(Duration::from_millis(10));
        timer.process_tasks();
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn cancel_prevents_execution() {
        let timer = TaskTimer::new();
        let fired = Rc::new(RefCell::new(false));
        let id = {
            let fired = fired.clone();
            timer.schedule(0, move || *fired.borrow_mut() = true)
        };
        timer.cancel(id);
        std::thread::sleep(Duration::from_millis(10));
        timer.process_tasks();
        assert!(!*fired.borrow());
    }

    #[test]
    fn unexpired_tasks_stay() {
        let timer = TaskTimer::new();
        timer.schedule(60, || {});
        timer.process_tasks();
        assert_eq!(timer.pending(), 1);
    }

    #[test]
    fn ids_reset_when_drained() {
        let timer = TaskTimer::new();
        let a = timer.schedule(0, || {});
        assert_eq!(a, 1);
        let b = timer.schedule(0, || {});
        assert_eq!(b, 2);
        std::thread::sleep(Duration::from_millis(10));
        timer.process_tasks();
        let c = timer.schedule(0, || {});
        assert_eq!(c, 1);
    }
}
