//! Logging in tests is important for troubleshooting, but works very differently then in
//! production.
//!
//! Each test gets its own `tracing` dispatcher writing into a buffer, so its log output isn't
//! interleaved with that of other tests running in parallel, and so tests can make assertions
//! about what was logged.
use crate::Result;
use std::{
    cell::RefCell,
    future::Future,
    io::Write,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing_subscriber::fmt::MakeWriter;

/// An implementation of `MakeWriter` that captures all log events for a single test
#[derive(Clone)]
struct TestWriter {
    log_events: Arc<Mutex<Vec<u8>>>,
}

impl TestWriter {
    fn new() -> Self {
        Self {
            log_events: Arc::new(Mutex::new(Vec::<u8>::new())),
        }
    }

    /// Clear the writer's buffer, returning the current contents as a string
    /// Panics of non-UTF8 text has been written to the buffer
    fn take_string(&self) -> String {
        let mut guard = self.log_events.lock().unwrap();

        let buffer: Vec<u8> = std::mem::take(&mut guard);

        String::from_utf8(buffer).unwrap()
    }
}

impl<'a> Write for &'a TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.log_events.lock().unwrap();

        guard.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for TestWriter {
    type Writer = &'a Self;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}

/// Run a test with logging enabled, printing the captured log events when it finishes.
///
/// This takes the place of `tokio::test`.  See [`capture_logs`] for how the runtime and logging
/// are set up.
pub fn test_with_logging(test: impl Future<Output = Result<()>>) -> Result<()> {
    let ((), log_events) = capture_logs(test)?;

    println!("Log events from this test: \n{}", log_events);

    Ok(())
}

/// Run a future to completion with a dedicated tokio runtime and `tracing` dispatcher, returning
/// its output along with everything it logged.
///
/// All threads of the runtime, including the blocking pool that external commands run on, are
/// set up to use the test's dispatcher, so events from `spawn_blocking` closures are captured
/// too.  If the future panics, the captured log is printed before the panic is resumed.
///
/// Log events are rendered without ANSI colors, with their span context, so assertions can look
/// for plain substrings like `microceph: Creating keys`.
pub fn capture_logs<T>(test: impl Future<Output = Result<T>>) -> Result<(T, String)> {
    let test_writer = TestWriter::new();

    let dispatch = {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{fmt, EnvFilter};

        let format = fmt::layer()
            .with_ansi(false)
            .with_level(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(false)
            .with_writer(test_writer.clone());

        // Get the log filter from the RUST_LOG env var, or if not set use a reasonable default
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("h2=warn,hyper=info,rustls=info,aws=info,debug"))?;

        let subscriber = tracing_subscriber::registry().with(filter).with(format);

        tracing::Dispatch::new(subscriber)
    };

    let dispatch = Arc::new(dispatch);

    let result = tracing::dispatcher::with_default(&dispatch, || {
        std::thread_local! {
            static THREAD_DISPATCHER_GUARD: RefCell<Option<tracing::subscriber::DefaultGuard>> = RefCell::new(None);
        }

        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all();
        {
            let dispatch = dispatch.clone();
            builder.on_thread_start(move || {
                let dispatch = dispatch.clone();

                THREAD_DISPATCHER_GUARD.with(|cell| {
                    cell.replace(Some(tracing::dispatcher::set_default(&dispatch)));
                })
            });
        }

        builder.on_thread_stop(|| {
            THREAD_DISPATCHER_GUARD.with(|cell| cell.replace(None));
        });

        let runtime = builder.build()?;

        // It's not realistic to require all test futures to be explicitly unwind safe
        let result = std::panic::catch_unwind(AssertUnwindSafe(move || {
            let result = runtime.block_on(test);
            runtime.shutdown_timeout(Duration::from_secs(10));

            result
        }));

        match result {
            Ok(result) => result,
            Err(err) => {
                println!(
                    "Log events from this test: \n{}",
                    test_writer.take_string()
                );
                std::panic::resume_unwind(err)
            }
        }
    })?;

    Ok((result, test_writer.take_string()))
}
