//! C ABI surface for host applications loading the tracer as a shared
//! library. Handles are boxed [`Perf`] guards; null or dangling handles
//! are ignored, nothing unwinds across the boundary.

use std::ffi::{c_char, c_void, CStr};

use crate::scope::{self, Perf};

#[no_mangle]
pub extern "C" fn rdkperf_init() {
    scope::init();
}

#[no_mangle]
pub extern "C" fn rdkperf_shutdown() {
    scope::shutdown();
}

#[no_mangle]
pub extern "C" fn rdkperf_start(name: *const c_char) -> *mut c_void {
    if name.is_null() {
        return std::ptr::null_mut();
    }
    let name = unsafe { CStr::from_ptr(name) }.to_string_lossy();
    Box::into_raw(Box::new(Perf::new(&name))) as *mut c_void
}

#[no_mangle]
pub extern "C" fn rdkperf_stop(handle: *mut c_void) {
    if handle.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(handle as *mut Perf) });
}

#[no_mangle]
pub extern "C" fn rdkperf_set_threshold(handle: *mut c_void, threshold_us: u32) {
    if handle.is_null() {
        return;
    }
    let perf = unsafe { &mut *(handle as *mut Perf) };
    perf.set_threshold(threshold_us);
}

#[no_mangle]
pub extern "C" fn rdkperf_report_process(pid: i32) {
    scope::report_process(pid);
}

#[no_mangle]
pub extern "C" fn rdkperf_report_thread(tid: u64) {
    scope::report_thread(tid);
}

#[no_mangle]
pub extern "C" fn rdkperf_close_thread(tid: u64) {
    scope::close_thread(tid);
}

#[no_mangle]
pub extern "C" fn rdkperf_close_process(pid: i32) {
    scope::close_process(pid);
}
