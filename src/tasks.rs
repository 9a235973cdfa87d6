use std::{
    collections::VecDeque,
    io::{BufReader, Write},
    net::TcpStream,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Condvar, Mutex,
    },
    time::Duration,
};

use http::{
    header::{CONNECTION, CONTENT_LENGTH},
    HeaderValue, Version,
};
use tracing::{debug, error};

use crate::{
    http_utils::{take_request, IntoRawBytes, ParseError},
    layers::{Layer, LayerGroup},
    response::Recorder,
    Request, Response, Router,
};

/// How long a culled thread waits for work before exiting.
const IDLE: Duration = Duration::from_secs(5);

pub(crate) trait Task {
    fn run(self: Box<Self>);
}

/// One accepted connection, served request by request until either side closes it.
pub(crate) struct ConnectionTask {
    pub stream: TcpStream,

    pub router: Arc<Router>,

    pub response_layer: Arc<LayerGroup<Response>>,

    pub timeout: Duration,

    pub max_body: usize,
}

impl Task for ConnectionTask {
    fn run(self: Box<Self>) {
        let ConnectionTask {
            stream,
            router,
            response_layer,
            timeout,
            max_body,
        } = *self;

        let peer = stream.peer_addr().ok();

        if let Err(e) = stream
            .set_read_timeout(Some(timeout))
            .and_then(|_| stream.set_write_timeout(Some(timeout)))
        {
            debug!(?peer, error = %e, "failed to set connection timeout");
            return;
        }

        let mut writer = match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                debug!(?peer, error = %e, "failed to clone connection");
                return;
            }
        };

        let mut reader = BufReader::new(stream);

        loop {
            let request = match take_request(&mut reader, max_body) {
                Ok(r) => r,
                Err(ParseError::Closed) => return,
                Err(e) => {
                    debug!(?peer, error = %e, "closing connection");

                    let mut response = Response::new(Vec::new());
                    *response.status_mut() = e.status();
                    response
                        .headers_mut()
                        .insert(CONTENT_LENGTH, HeaderValue::from(0));
                    response
                        .headers_mut()
                        .insert(CONNECTION, HeaderValue::from_static("close"));

                    let _ = writer.write_all(&response.into_raw_bytes());

                    return;
                }
            };

            let keep_alive = keep_alive(&request);

            let mut recorder = Recorder::new();

            router.dispatch(&mut recorder, request);

            let mut response = recorder.into_response();

            response_layer.execute(&mut response);

            let connection = if keep_alive { "keep-alive" } else { "close" };
            response
                .headers_mut()
                .insert(CONNECTION, HeaderValue::from_static(connection));

            if let Err(e) = writer
                .write_all(&response.into_raw_bytes())
                .and_then(|_| writer.flush())
            {
                debug!(?peer, error = %e, "failed to write response");
                return;
            }

            if !keep_alive {
                return;
            }
        }
    }
}

/// HTTP/1.1 connections persist unless the client asks to close, HTTP/1.0 ones only when the
/// client asks to keep them.
pub(crate) fn keep_alive(request: &Request) -> bool {
    let header = request
        .headers()
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase);

    match header.as_deref() {
        Some("close") => false,
        Some("keep-alive") => true,
        _ => request.version() == Version::HTTP_11,
    }
}

struct Shared {
    /// Pool of tasks that need to be run
    pool: Mutex<VecDeque<Box<dyn Task + Send + 'static>>>,

    /// Conditional var used to sleep and wake threads
    condvar: Condvar,

    /// Total number of threads currently waiting for a task
    waiting_tasks: AtomicUsize,
}

impl Shared {
    fn waiting(&self) {
        self.waiting_tasks.fetch_add(1, Ordering::Release);
    }

    fn release(&self) {
        self.waiting_tasks.fetch_sub(1, Ordering::Release);
    }
}

#[derive(Clone)]
pub(crate) struct TaskPool {
    shared: Arc<Shared>,
    min_threads: usize,
}

impl TaskPool {
    pub fn new(min_threads: usize) -> Self {
        let pool = TaskPool {
            shared: Arc::new(Shared {
                pool: Mutex::new(VecDeque::new()),
                condvar: Condvar::new(),
                waiting_tasks: AtomicUsize::new(0),
            }),
            min_threads,
        };

        for _ in 0..min_threads {
            pool.spawn_thread(false, None);
        }

        pool
    }

    /// Spawns a thread on the task pool. Culled threads exit after idling.
    ///
    /// # Panics
    ///
    /// This function will panic on poisoned `Mutex`. A task panicking does not poison it: tasks
    /// run outside the lock and their panics are caught.
    fn spawn_thread(&self, should_cull: bool, initial_task: Option<Box<dyn Task + Send>>) {
        let shared = self.shared.clone();

        std::thread::spawn(move || {
            if let Some(task) = initial_task {
                run_guarded(task);
            }

            loop {
                let mut pool = shared.pool.lock().unwrap();

                shared.waiting();

                while pool.is_empty() {
                    if should_cull {
                        let (new, timeout) = shared.condvar.wait_timeout(pool, IDLE).unwrap();

                        if timeout.timed_out() && new.is_empty() {
                            shared.release();
                            return;
                        }

                        pool = new;
                    } else {
                        pool = shared.condvar.wait(pool).unwrap();
                    }
                }

                shared.release();

                let Some(task) = pool.pop_front() else {
                    continue;
                };

                drop(pool);

                run_guarded(task);
            }
        });
    }

    /// Adds a task to the task pool and spawns a thread if there is none available
    ///
    /// # Panics
    /// This function can panic if the mutex is poisoned.
    pub fn send_task<T>(&self, task: T)
    where
        T: Task + Send + 'static,
    {
        if self.shared.waiting_tasks.load(Ordering::Acquire) == 0 {
            self.spawn_thread(true, Some(Box::new(task)));
        } else {
            self.shared.pool.lock().unwrap().push_back(Box::new(task));
            self.shared.condvar.notify_one();
        }
    }

    pub fn min_threads(&self) -> usize {
        self.min_threads
    }
}

fn run_guarded(task: Box<dyn Task + Send>) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task.run())) {
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("unknown fault");

        error!(fault = message, "task panicked, connection dropped");
    }
}
