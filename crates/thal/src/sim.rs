//! Hosted tile simulator.
//!
//! One [`Tile`] owns a fixed set of OS threads, one per worker context.
//! The thread that calls [`Tile::run`] becomes the tile's supervisor for
//! the duration of the call. The free functions re-exported from the crate
//! root then behave like the tile instructions:
//!
//! - `runall` publishes the entry point and vertex base, then releases
//!   every parked worker.
//! - `sync` spins until every worker context is idle again.
//! - `get_csr` and `vertex_base` read per-thread "registers" that a worker
//!   loads before it enters the routine.
//! - `trap`, `exit` and `exitz` end the current context without
//!   returning.
//!
//! HOW A ROUND WORKS:
//!   Supervisor                         Worker context n
//!   ----------                         ----------------
//!   job = (entry, base)                parked, seen == round
//!   pending = workers
//!   round += 1 (Release)  ───────────► round != seen (Acquire)
//!   unpark all                         load $WSR / vertex base
//!                                      entry()
//!   sync: spin while pending != 0 ◄─── pending -= 1 (Release)
//!
//! The Release/Acquire pair on `round` is the simulator's stand-in for the
//! hand-off fence of the real `runall`; the pair on `pending` is the one
//! of `sync`.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};

use spin::{Mutex, Once};
use thiserror::Error;

use crate::consts::{
    CSR_W_WSR__CTXTID_M1__MASK, CSR_W_WSR__CTXTID_M1__SHIFT, CSR_W_WSR__INDEX, NUM_WORKERS,
};
use crate::EntryPoint;

/// Busy-wait iterations before a waiting supervisor starts yielding.
const SPIN_LIMIT: u32 = 128;

/// Source of unique tile ids (used for default tile names).
static NEXT_TILE_ID: AtomicU32 = AtomicU32::new(0);

// ── Public types ────────────────────────────────────────────────

/// The hardware context an event happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    Supervisor,
    /// Worker context with the given `CTXTID_M1` value.
    Worker(u32),
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::Supervisor => f.write_str("supervisor"),
            Context::Worker(id) => write!(f, "worker {}", id),
        }
    }
}

/// A fault raised on the tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// A patched breakpoint (`trap`) was raised.
    Breakpoint { context: Context, code: u8 },
    /// Host code running in a context panicked.
    Panicked { context: Context, message: String },
}

/// How a worker context left its last entry routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The routine issued `exit` with this flag, as the trampoline does.
    Returned(bool),
    /// The routine issued `exitz`.
    Exited,
    /// The routine raised a patched breakpoint.
    Trapped(u8),
    /// Host code panicked; the message is kept in [`Tile::faults`].
    Panicked,
}

/// Errors reported by the simulator.
#[derive(Debug, Error)]
pub enum TileError {
    #[error("a tile has 1..={max} worker contexts, {requested} requested")]
    InvalidWorkerCount { requested: usize, max: usize },

    #[error("failed to spawn a worker context thread: {0}")]
    Spawn(#[from] io::Error),

    #[error("breakpoint PBRK{code} raised on {context}")]
    Breakpoint { context: Context, code: u8 },

    #[error("{context} panicked: {message}")]
    WorkerPanicked { context: Context, message: String },

    #[error("exit instruction issued from the supervisor context")]
    SupervisorExit,
}

impl From<Fault> for TileError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Breakpoint { context, code } => TileError::Breakpoint { context, code },
            Fault::Panicked { context, message } => TileError::WorkerPanicked { context, message },
        }
    }
}

/// Tile construction parameters.
#[derive(Debug, Clone)]
pub struct TileConfig {
    workers: usize,
    name: Option<String>,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            workers: NUM_WORKERS,
            name: None,
        }
    }
}

impl TileConfig {
    /// A full tile with `NUM_WORKERS` worker contexts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of worker contexts, `1..=NUM_WORKERS`.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Name used for worker thread names and log lines.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ── Tile state ──────────────────────────────────────────────────

/// Unwind payload that ends a context without returning.
enum Halt {
    Trap(u8),
    /// `exit` with the routine's flag.
    Return(bool),
    /// `exitz`.
    Exit,
}

/// What the last `runall` asked the workers to do.
#[derive(Clone, Copy)]
struct Job {
    entry: EntryPoint,
    /// Vertex base as an address; raw pointers are not `Send`.
    base: usize,
}

/// State shared by the supervisor and every worker context of one tile.
struct Shared {
    name: String,
    workers: usize,
    /// Dispatch round counter, bumped by every `runall`.
    round: AtomicU64,
    /// Worker contexts still running the current round.
    pending: AtomicUsize,
    job: Mutex<Option<Job>>,
    shutdown: AtomicBool,
    threads: Once<Vec<Thread>>,
    exits: Mutex<Vec<Option<WorkerExit>>>,
    completions: Vec<AtomicU64>,
    faults: Mutex<Vec<Fault>>,
}

impl Shared {
    fn new(name: String, workers: usize) -> Self {
        Self {
            name,
            workers,
            round: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            job: Mutex::new(None),
            shutdown: AtomicBool::new(false),
            threads: Once::new(),
            exits: Mutex::new(vec![None; workers]),
            completions: (0..workers).map(|_| AtomicU64::new(0)).collect(),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Spin until no worker context is running.
    fn wait_idle(&self) {
        let mut spins = 0;
        while self.pending.load(Ordering::Acquire) != 0 {
            backoff(&mut spins);
        }
    }

    fn launch(&self, job: Job) {
        let busy = self.pending.load(Ordering::Acquire);
        if busy != 0 {
            log::warn!(
                "{}: runall issued while {} worker contexts are busy, serialising",
                self.name,
                busy
            );
            self.wait_idle();
        }

        *self.job.lock() = Some(job);
        self.pending.store(self.workers, Ordering::Relaxed);
        let round = self.round.fetch_add(1, Ordering::Release) + 1;
        log::trace!("{}: round {} on {} workers", self.name, round, self.workers);

        if let Some(threads) = self.threads.get() {
            for thread in threads {
                thread.unpark();
            }
        }
    }

    fn record_fault(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }

    fn wake_for_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(threads) = self.threads.get() {
            for thread in threads {
                thread.unpark();
            }
        }
    }
}

/// Per-thread stand-in for the worker's `$WSR` and `$mvertex_base`.
#[derive(Clone, Copy)]
struct WorkerRegs {
    wsr: u32,
    vertex_base: *const (),
}

impl WorkerRegs {
    const IDLE: WorkerRegs = WorkerRegs {
        wsr: 0,
        vertex_base: ptr::null(),
    };
}

/// Which tile, if any, the current thread belongs to.
enum Role {
    Supervisor(Arc<Shared>),
    Worker { shared: Arc<Shared>, ctx: u32 },
}

thread_local! {
    static ROLE: RefCell<Option<Role>> = const { RefCell::new(None) };
    static REGS: Cell<WorkerRegs> = const { Cell::new(WorkerRegs::IDLE) };
}

fn backoff(spins: &mut u32) {
    if *spins < SPIN_LIMIT {
        *spins += 1;
        core::hint::spin_loop();
    } else {
        thread::yield_now();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("<non-string panic payload>")
    }
}

/// The tile the current thread supervises. Panics on any other thread:
/// the simulator has no way to model issuing a supervisor instruction
/// from elsewhere.
fn supervised_tile(instruction: &str) -> Arc<Shared> {
    ROLE.with(|role| match &*role.borrow() {
        Some(Role::Supervisor(shared)) => Arc::clone(shared),
        Some(Role::Worker { ctx, .. }) => {
            panic!("`{}` issued from worker context {}", instruction, ctx)
        }
        None => panic!(
            "`{}` issued outside a tile; run supervisor code inside `Tile::run`",
            instruction
        ),
    })
}

fn current_context() -> Option<(Arc<Shared>, Context)> {
    ROLE.with(|role| match &*role.borrow() {
        Some(Role::Supervisor(shared)) => Some((Arc::clone(shared), Context::Supervisor)),
        Some(Role::Worker { shared, ctx }) => Some((Arc::clone(shared), Context::Worker(*ctx))),
        None => None,
    })
}

// ── Worker context loop ─────────────────────────────────────────

fn worker_main(shared: Arc<Shared>, ctx: u32) {
    ROLE.with(|role| {
        *role.borrow_mut() = Some(Role::Worker {
            shared: Arc::clone(&shared),
            ctx,
        })
    });

    let mut seen = 0u64;
    loop {
        // Idle: parked until the next `runall` or shutdown.
        let round = loop {
            if shared.shutdown.load(Ordering::Acquire) {
                return;
            }
            let round = shared.round.load(Ordering::Acquire);
            if round != seen {
                break round;
            }
            thread::park();
        };
        seen = round;

        let Some(job) = *shared.job.lock() else {
            continue;
        };

        REGS.with(|regs| {
            regs.set(WorkerRegs {
                wsr: (ctx << CSR_W_WSR__CTXTID_M1__SHIFT) & CSR_W_WSR__CTXTID_M1__MASK,
                vertex_base: job.base as *const (),
            })
        });

        let entry = job.entry;
        let exit = match panic::catch_unwind(move || -> Infallible { entry() }) {
            Ok(never) => match never {},
            Err(payload) => match payload.downcast::<Halt>() {
                Ok(halt) => match *halt {
                    Halt::Trap(code) => WorkerExit::Trapped(code),
                    Halt::Return(flag) => WorkerExit::Returned(flag),
                    Halt::Exit => WorkerExit::Exited,
                },
                Err(payload) => {
                    shared.record_fault(Fault::Panicked {
                        context: Context::Worker(ctx),
                        message: panic_message(&*payload),
                    });
                    WorkerExit::Panicked
                }
            },
        };
        REGS.with(|regs| regs.set(WorkerRegs::IDLE));

        shared.exits.lock()[ctx as usize] = Some(exit);
        shared.completions[ctx as usize].fetch_add(1, Ordering::Relaxed);
        shared.pending.fetch_sub(1, Ordering::Release);
    }
}

// ── Tile ────────────────────────────────────────────────────────

/// A simulated tile: a fixed set of worker contexts plus whichever thread
/// is currently inside [`Tile::run`] as supervisor.
pub struct Tile {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl Tile {
    /// Spawn the worker contexts. They stay parked until the first `runall`.
    pub fn new(config: TileConfig) -> Result<Self, TileError> {
        let workers = config.workers;
        if workers == 0 || workers > NUM_WORKERS {
            return Err(TileError::InvalidWorkerCount {
                requested: workers,
                max: NUM_WORKERS,
            });
        }

        let id = NEXT_TILE_ID.fetch_add(1, Ordering::Relaxed);
        let name = config.name.unwrap_or_else(|| format!("tile{}", id));
        let shared = Arc::new(Shared::new(name, workers));

        let mut handles = Vec::with_capacity(workers);
        for ctx in 0..workers {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("{}/w{}", shared.name, ctx))
                .spawn(move || worker_main(worker_shared, ctx as u32));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    shared.shutdown.store(true, Ordering::Release);
                    for handle in handles {
                        handle.thread().unpark();
                        let _ = handle.join();
                    }
                    return Err(err.into());
                }
            }
        }
        shared
            .threads
            .call_once(|| handles.iter().map(|handle| handle.thread().clone()).collect());

        log::debug!("{}: {} worker contexts up", shared.name, workers);
        Ok(Self { shared, handles })
    }

    /// Run `supervisor` as this tile's supervisor thread.
    ///
    /// Returns once the closure has returned and every round it started has
    /// drained. The first fault raised during the call is reported as an
    /// error; the closure's value is dropped in that case.
    pub fn run<R>(&self, supervisor: impl FnOnce() -> R) -> Result<R, TileError> {
        let fault_mark = self.shared.faults.lock().len();
        let previous = ROLE.with(|role| {
            role.replace(Some(Role::Supervisor(Arc::clone(&self.shared))))
        });

        let outcome = panic::catch_unwind(AssertUnwindSafe(supervisor));

        // Rounds are fire-and-forget; let the last one land before the
        // caller inspects the vertex.
        self.shared.wait_idle();
        ROLE.with(|role| *role.borrow_mut() = previous);

        let first_fault = || self.shared.faults.lock().get(fault_mark).cloned();
        match outcome {
            Ok(value) => match first_fault() {
                Some(fault) => Err(fault.into()),
                None => Ok(value),
            },
            Err(payload) => match payload.downcast::<Halt>() {
                Ok(halt) => match *halt {
                    Halt::Trap(code) => Err(first_fault()
                        .map(TileError::from)
                        .unwrap_or(TileError::Breakpoint {
                            context: Context::Supervisor,
                            code,
                        })),
                    Halt::Return(_) | Halt::Exit => Err(TileError::SupervisorExit),
                },
                Err(payload) => panic::resume_unwind(payload),
            },
        }
    }

    /// Tile name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Number of worker contexts.
    pub fn workers(&self) -> usize {
        self.shared.workers
    }

    /// How each worker context left its last routine (`None` if it has
    /// never run one).
    pub fn exits(&self) -> Vec<Option<WorkerExit>> {
        self.shared.exits.lock().clone()
    }

    /// Number of routines each worker context has completed.
    pub fn completions(&self) -> Vec<u64> {
        self.shared
            .completions
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .collect()
    }

    /// Every fault raised on this tile so far, oldest first.
    pub fn faults(&self) -> Vec<Fault> {
        self.shared.faults.lock().clone()
    }
}

impl Drop for Tile {
    fn drop(&mut self) {
        self.shared.wake_for_shutdown();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        log::debug!("{}: shut down", self.shared.name);
    }
}

// ── Instructions ────────────────────────────────────────────────

/// Read a worker CSR. Only `$WSR` is modelled; other indices read as zero.
#[inline]
pub fn get_csr<const INDEX: u32>() -> u32 {
    match INDEX {
        CSR_W_WSR__INDEX => REGS.with(|regs| regs.get().wsr),
        _ => 0,
    }
}

/// The vertex base loaded by the `runall` that started this worker. Null
/// outside a worker routine.
#[inline]
pub fn vertex_base() -> *const () {
    REGS.with(|regs| regs.get().vertex_base)
}

/// Start `entry` on every worker context of the supervised tile.
///
/// # Safety
///
/// `base` must stay valid for as long as the started workers use it.
pub unsafe fn runall(entry: EntryPoint, base: *const ()) {
    supervised_tile("runall").launch(Job {
        entry,
        base: base as usize,
    });
}

/// Block the supervisor until every worker context is idle.
pub fn sync<const ZONE: u32>() {
    let tile = supervised_tile("sync");
    log::trace!("{}: sync zone {}", tile.name, ZONE);
    tile.wait_idle();
}

/// `sync` then `runall`.
///
/// # Safety
///
/// As for [`runall`].
pub unsafe fn sync_and_runall<const ZONE: u32>(entry: EntryPoint, base: *const ()) {
    sync::<ZONE>();
    runall(entry, base);
}

/// Raise patched breakpoint `CODE`: record it on the tile and end the
/// current context.
pub fn trap<const CODE: u8>() -> ! {
    if let Some((shared, context)) = current_context() {
        log::warn!("{}: PBRK{} raised on {}", shared.name, CODE, context);
        shared.record_fault(Fault::Breakpoint { context, code: CODE });
    }
    panic::resume_unwind(Box::new(Halt::Trap(CODE)))
}

/// End the current worker routine with `flag` as its final status.
pub fn exit(flag: bool) -> ! {
    panic::resume_unwind(Box::new(Halt::Return(flag)))
}

/// End the current worker routine.
pub fn exitz() -> ! {
    panic::resume_unwind(Box::new(Halt::Exit))
}

/// Whether the current thread is one of a tile's worker contexts.
pub fn in_worker() -> bool {
    ROLE.with(|role| matches!(&*role.borrow(), Some(Role::Worker { .. })))
}
