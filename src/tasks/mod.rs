pub mod dispatch_loop;
pub mod lifecycle;
pub mod scheduler;
pub mod task_runner;
