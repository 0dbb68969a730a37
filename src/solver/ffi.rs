//! Native binding to the `mtsp-vrp-c` shared library.
//!
//! The C entry point takes a bare function pointer for the fractional
//! callback with no user-data argument, so the active capture closure is
//! parked in a process-wide slot for the duration of the call. Calls are
//! serialized on a lock of their own; the callback may fire from a
//! solver-owned thread, which is why the slot is a mutex and not a
//! thread-local.

use std::sync::Mutex;

use libc::{c_double, c_int, size_t};

use super::{RawMtspSolver, RawSolveOutput, RawSolveRequest};

extern "C" {
    fn solve_mtsp_vrp(
        number_of_agents: size_t,
        number_of_nodes: size_t,
        start_positions: *const size_t,
        end_positions: *const size_t,
        weights: *const c_int,
        optimization_mode: c_int,
        timeout_ms: c_int,
        number_of_threads: size_t,
        lower_bound: *mut c_double,
        upper_bound: *mut c_double,
        paths: *mut size_t,
        path_offsets: *mut size_t,
        fractional_callback: Option<unsafe extern "C" fn(*const c_double) -> c_int>,
    ) -> c_int;
}

struct ActiveCallback {
    /// Borrow of the gateway's capture closure, erased to 'static. Valid
    /// only while the owning solve call is blocked inside `solve_mtsp_vrp`;
    /// the slot is cleared before that frame returns.
    sink: *mut (dyn FnMut(&[f64]) -> i32 + 'static),
    /// Element count of the delivered tensor (A * N * N).
    expected: usize,
}

// The sink is only dereferenced under the slot mutex, and only while the
// installing call frame is alive.
unsafe impl Send for ActiveCallback {}

static ACTIVE_CALLBACK: Mutex<Option<ActiveCallback>> = Mutex::new(None);

// Serializes whole native calls so the callback slot never has two owners.
static CALL_LOCK: Mutex<()> = Mutex::new(());

unsafe extern "C" fn fractional_trampoline(values: *const c_double) -> c_int {
    if values.is_null() {
        return 0;
    }
    let mut slot = match ACTIVE_CALLBACK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    match slot.as_mut() {
        Some(active) => {
            let tensor = std::slice::from_raw_parts(values, active.expected);
            (*active.sink)(tensor)
        }
        None => 0,
    }
}

struct SlotGuard;

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slot = match ACTIVE_CALLBACK.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = None;
    }
}

/// [`RawMtspSolver`] backed by the `solve_mtsp_vrp` C entry point.
#[derive(Debug, Default)]
pub struct NativeMtspSolver;

impl NativeMtspSolver {
    pub fn new() -> Self {
        NativeMtspSolver
    }
}

impl RawMtspSolver for NativeMtspSolver {
    fn solve_raw(
        &self,
        request: &RawSolveRequest<'_>,
        output: &mut RawSolveOutput<'_>,
        on_fractional: Option<&mut dyn FnMut(&[f64]) -> i32>,
    ) -> i32 {
        let _call = match CALL_LOCK.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let callback = if let Some(sink) = on_fractional {
            let erased: *mut (dyn FnMut(&[f64]) -> i32 + '_) = sink;
            // The borrow outlives the FFI call below, and SlotGuard clears
            // the slot before this frame returns.
            let erased: *mut (dyn FnMut(&[f64]) -> i32 + 'static) =
                unsafe { std::mem::transmute(erased) };
            let mut slot = match ACTIVE_CALLBACK.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *slot = Some(ActiveCallback {
                sink: erased,
                expected: request.num_agents * request.num_nodes * request.num_nodes,
            });
            Some(fractional_trampoline as unsafe extern "C" fn(*const c_double) -> c_int)
        } else {
            None
        };
        let _slot_guard = SlotGuard;

        unsafe {
            solve_mtsp_vrp(
                request.num_agents,
                request.num_nodes,
                request.start_positions.as_ptr(),
                request.end_positions.as_ptr(),
                request.weights.as_ptr(),
                request.optimization_mode,
                request.timeout_ms,
                request.num_threads,
                &mut *output.lower_bound,
                &mut *output.upper_bound,
                output.paths.as_mut_ptr(),
                output.offsets.as_mut_ptr(),
                callback,
            )
        }
    }
}
