use core::fmt::Debug;

/// A unit of work: handling one datagram
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs the work the endpoint hands off while polling.
///
/// Work for different datagrams may run concurrently; the exchange
/// engine locks what it shares.
pub trait Executor: Debug + Send + Sync {
  /// Run a job, now or later
  fn execute(&self, job: Job);
}

/// Runs every job on the calling thread, before `execute` returns
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Inline;

impl Executor for Inline {
  fn execute(&self, job: Job) {
    job()
  }
}

/// Runs every job on a thread of its own
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Threaded;

impl Executor for Threaded {
  fn execute(&self, job: Job) {
    let spawned = std::thread::Builder::new().name("croak-job".into())
                                             .spawn(job);
    if let Err(e) = spawned {
      log::error!("failed to spawn a thread for a job: {}", e);
    }
  }
}
