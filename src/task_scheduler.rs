use std::{
    thread,
    sync::{Arc, Mutex, atomic::{AtomicBool, Ordering}},
    time::{Duration, Instant},
};
use threadpool::ThreadPool;


/// A periodic job returns the delay before its next run.
pub type FnTask = dyn Fn() -> Duration + Send + 'static;


pub struct Task {
    name: &'static str,
    job: Arc<Mutex<FnTask>>,
    next_time: Instant,
    running: bool,
}

impl Task {
    pub fn new<F>(name: &'static str, job: F, delay: Duration) -> Self where
        F: Fn() -> Duration + Send + 'static {

        Task {
            name,
            job: Arc::new(Mutex::new(job)),
            next_time: Instant::now() + delay,
            running: false,
        }
    }

    fn ready(&self, now: Instant) -> bool {
        !self.running && now >= self.next_time
    }

    fn finish_job(&mut self, next_delay: Duration) {
        self.next_time = Instant::now() + next_delay;
        self.running = false;
    }

    fn mark_as_busy(&mut self) {
        self.running = true;
    }

    fn get_job(&self) -> Arc<Mutex<FnTask>> {
        self.job.clone()
    }
}


pub struct TaskSchedulerBuilder {
    tasks: Vec<Arc<Mutex<Task>>>,
    n_workers: usize,
    period_resolution: Duration,
}

impl TaskSchedulerBuilder {
    pub fn new() -> Self {
        TaskSchedulerBuilder {
            tasks: Vec::new(),
            n_workers: 2,
            period_resolution: Duration::from_secs(1),
        }
    }

    pub fn n_workers(mut self, cnt: usize) -> Self {
        self.n_workers = cnt.max(1);
        self
    }

    pub fn period_resolution(mut self, period: Duration) -> Self {
        self.period_resolution = period;
        self
    }

    pub fn add_task(&mut self, task: Task) {
        info!("Register task: {}", task.name);
        self.tasks.push(Arc::new(Mutex::new(task)));
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn build(self) -> TaskScheduler {
        TaskScheduler::new(self)
    }
}


pub struct TaskScheduler {
    scheduler: thread::JoinHandle<()>,
    running: Arc<AtomicBool>,
}

impl TaskScheduler {
    fn new(builder: TaskSchedulerBuilder) -> Self {
        let tasks = builder.tasks;
        let n_workers = builder.n_workers;
        let period_resolution = builder.period_resolution;

        let running = Arc::new(AtomicBool::new(true));
        let t_running = running.clone();

        let scheduler_job = move || {
            let pool = ThreadPool::new(n_workers);

            while t_running.load(Ordering::SeqCst) {
                let now = Instant::now();

                for m_task in &tasks {
                    let mut task = match m_task.lock() {
                        Ok(task) => task,
                        Err(_) => continue,
                    };

                    if task.ready(now) {
                        task.mark_as_busy();
                        debug!("Start task: {}", task.name);

                        let job = task.get_job();
                        let t_task = m_task.clone();
                        pool.execute(move || {
                            let next_delay = match job.lock() {
                                Ok(job) => (*job)(),
                                Err(_) => Duration::from_secs(60),
                            };
                            if let Ok(mut task) = t_task.lock() {
                                task.finish_job(next_delay);
                            }
                        });
                    }
                }

                thread::sleep(period_resolution);
            }

            pool.join();
        };

        TaskScheduler {
            scheduler: thread::spawn(scheduler_job),
            running,
        }
    }

    pub fn join(self) {
        self.running.store(false, Ordering::SeqCst);

        if self.scheduler.join().is_err() {
            error!("Task scheduler panicked");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn runs_due_tasks_repeatedly() {
        let counter = Arc::new(AtomicUsize::new(0));
        let t_counter = counter.clone();

        let mut builder = TaskSchedulerBuilder::new()
            .period_resolution(Duration::from_millis(5));
        builder.add_task(Task::new("count", move || {
            t_counter.fetch_add(1, Ordering::SeqCst);
            Duration::from_millis(5)
        }, Duration::from_millis(0)));

        let scheduler = builder.build();
        thread::sleep(Duration::from_millis(200));
        scheduler.join();

        assert!(counter.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn delayed_task_waits() {
        let counter = Arc::new(AtomicUsize::new(0));
        let t_counter = counter.clone();

        let mut builder = TaskSchedulerBuilder::new()
            .period_resolution(Duration::from_millis(5));
        builder.add_task(Task::new("late", move || {
            t_counter.fetch_add(1, Ordering::SeqCst);
            Duration::from_secs(60)
        }, Duration::from_secs(60)));

        assert_eq!(builder.task_count(), 1);

        let scheduler = builder.build();
        thread::sleep(Duration::from_millis(50));
        scheduler.join();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
