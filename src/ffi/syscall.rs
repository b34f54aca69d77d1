use std::ffi::CStr;
use std::io::{Error, Result};
use std::mem::MaybeUninit;

use libc::{mq_attr, mqd_t, rusage, sigaction, siginfo_t, timespec, timeval};

pub fn getpid() -> i32 {
    unsafe { libc::getpid() }
}

pub fn pthread_self() -> u64 {
    unsafe { libc::pthread_self() as u64 }
}

pub fn pthread_getname(buf: &mut [u8]) -> Result<()> {
    let thread = unsafe { libc::pthread_self() };
    let errno = unsafe { libc::pthread_getname_np(thread, buf.as_mut_ptr() as _, buf.len()) };
    if errno == 0 {
        Ok(())
    } else {
        Err(Error::from_raw_os_error(errno))
    }
}

pub fn pthread_setname(name: &CStr) -> Result<()> {
    let thread = unsafe { libc::pthread_self() };
    let errno = unsafe { libc::pthread_setname_np(thread, name.as_ptr()) };
    if errno == 0 {
        Ok(())
    } else {
        Err(Error::from_raw_os_error(errno))
    }
}

pub fn gettimeofday() -> Result<timeval> {
    let mut tv = MaybeUninit::<timeval>::uninit();
    let result = unsafe { libc::gettimeofday(tv.as_mut_ptr(), std::ptr::null_mut()) };
    if result != -1 {
        Ok(unsafe { tv.assume_init() })
    } else {
        Err(Error::last_os_error())
    }
}

// Per-thread CPU accounting, not whole-process.
pub fn getrusage_thread() -> Result<rusage> {
    let mut usage = MaybeUninit::<rusage>::uninit();
    let result = unsafe { libc::getrusage(libc::RUSAGE_THREAD, usage.as_mut_ptr()) };
    if result != -1 {
        Ok(unsafe { usage.assume_init() })
    } else {
        Err(Error::last_os_error())
    }
}

pub fn clock_realtime() -> Result<timespec> {
    let mut ts = MaybeUninit::<timespec>::uninit();
    let result = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, ts.as_mut_ptr()) };
    if result != -1 {
        Ok(unsafe { ts.assume_init() })
    } else {
        Err(Error::last_os_error())
    }
}

pub fn mq_open(name: &CStr, flags: i32, mode: u32, attr: Option<&mut mq_attr>) -> Result<mqd_t> {
    let attr = match attr {
        Some(attr) => attr as *mut mq_attr,
        None => std::ptr::null_mut(),
    };
    let mqd = unsafe { libc::mq_open(name.as_ptr(), flags, mode as libc::mode_t, attr) };
    if mqd != -1 {
        Ok(mqd)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn mq_close(mqd: mqd_t) -> Result<()> {
    let result = unsafe { libc::mq_close(mqd) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn mq_unlink(name: &CStr) -> Result<()> {
    let result = unsafe { libc::mq_unlink(name.as_ptr()) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn mq_getattr(mqd: mqd_t) -> Result<mq_attr> {
    let mut attr = MaybeUninit::<mq_attr>::uninit();
    let result = unsafe { libc::mq_getattr(mqd, attr.as_mut_ptr()) };
    if result != -1 {
        Ok(unsafe { attr.assume_init() })
    } else {
        Err(Error::last_os_error())
    }
}

pub fn mq_send(mqd: mqd_t, buf: &[u8], priority: u32) -> Result<()> {
    let result = unsafe { libc::mq_send(mqd, buf.as_ptr() as _, buf.len(), priority) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn mq_receive(mqd: mqd_t, buf: &mut [u8]) -> Result<usize> {
    let mut priority = 0;
    let bytes = unsafe { libc::mq_receive(mqd, buf.as_mut_ptr() as _, buf.len(), &mut priority) };
    if bytes != -1 {
        Ok(bytes as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn mq_timedreceive(mqd: mqd_t, buf: &mut [u8], abs_timeout: &timespec) -> Result<usize> {
    let mut priority = 0;
    let bytes = unsafe {
        libc::mq_timedreceive(
            mqd,
            buf.as_mut_ptr() as _,
            buf.len(),
            &mut priority,
            abs_timeout,
        )
    };
    if bytes != -1 {
        Ok(bytes as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn sigaction_siginfo(
    signum: i32,
    handler: unsafe extern "C" fn(i32, *mut siginfo_t, *mut libc::c_void),
) -> Result<()> {
    let mut action = unsafe { MaybeUninit::<sigaction>::zeroed().assume_init() };
    action.sa_sigaction = handler as usize;
    action.sa_flags = libc::SA_SIGINFO;
    let result = unsafe { libc::sigaction(signum, &action, std::ptr::null_mut()) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}
