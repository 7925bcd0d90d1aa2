/// Declare marker types that bind a vertex method as a worker entry.
///
/// The method must have the shape `fn(&self, WorkerId) -> bool`.
///
/// ```ignore
/// worker_entry! {
///     /// Fill one output slot per worker.
///     pub struct Fill for MyVertex => fill;
///     struct Clear for MyVertex => clear;
/// }
///
/// sync_and_start_on_all_workers::<Fill>(&VERTEX);
/// ```
#[macro_export]
macro_rules! worker_entry {
    ($($(#[$meta:meta])* $vis:vis struct $name:ident for $vertex:ty => $method:ident;)+) => {
        $(
            $(#[$meta])*
            $vis struct $name;

            impl $crate::dispatch::WorkerEntry for $name {
                type Vertex = $vertex;

                #[inline(always)]
                fn run(vertex: &$vertex, worker: $crate::context::WorkerId) -> bool {
                    <$vertex>::$method(vertex, worker)
                }
            }
        )+
    };
}

/// Trap when a condition does not hold.
///
/// Raises PBRK0 unless another breakpoint is given. There is no message and
/// no unwinding: the debugger picks the tile up at the trap.
///
/// ```ignore
/// tile_assert!(offset < LEN);
/// tile_assert!(ready, PatchedBreakpoint::Pbrk1);
/// ```
#[macro_export]
macro_rules! tile_assert {
    ($cond:expr $(,)?) => {
        $crate::tile_assert!($cond, $crate::trap::PatchedBreakpoint::Pbrk0)
    };
    ($cond:expr, $breakpoint:expr $(,)?) => {
        if !$cond {
            $crate::trap::trap($breakpoint);
        }
    };
}
