//! Real-time scheduling helpers for the tracking loop (Linux SCHED_FIFO / mlockall).

#[cfg(target_os = "linux")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>) {
    use libc::{
        MCL_CURRENT, MCL_FUTURE, SCHED_FIFO, mlockall, sched_get_priority_max,
        sched_get_priority_min, sched_param, sched_setscheduler,
    };
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt {
        return;
    }

    #[inline]
    fn is_retryable_memlock_error(err: &std::io::Error) -> bool {
        matches!(err.raw_os_error(), Some(code) if code == libc::EPERM || code == libc::ENOMEM)
    }

    #[inline]
    fn memlock_limit_hint() -> Option<String> {
        unsafe {
            let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
            let rc = libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr());
            if rc == 0 {
                let r = rlim.assume_init();
                if r.rlim_cur == libc::RLIM_INFINITY {
                    Some("memlock limit: unlimited".to_string())
                } else {
                    Some(format!("memlock limit: {} KiB", r.rlim_cur / 1024))
                }
            } else {
                None
            }
        }
    }

    // Lock current and future pages, falling back to current only.
    fn try_apply_mem_lock() -> eyre::Result<&'static str> {
        let rc = unsafe { mlockall(MCL_CURRENT | MCL_FUTURE) };
        if rc == 0 {
            return Ok("all (current|future)");
        }
        let err = std::io::Error::last_os_error();
        if is_retryable_memlock_error(&err) && unsafe { mlockall(MCL_CURRENT) } == 0 {
            return Ok("current");
        }
        let mut msg = format!("mlockall(current|future) failed: {err}");
        if is_retryable_memlock_error(&err) {
            if let Some(h) = memlock_limit_hint() {
                msg.push_str(&format!("; {h}"));
            }
            msg.push_str("; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'");
        }
        Err(eyre::eyre!(msg))
    }

    // Apply SCHED_FIFO priority, clamped to the system range.
    fn try_apply_fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
        let (min, max) = unsafe {
            let min = sched_get_priority_min(SCHED_FIFO);
            let max = sched_get_priority_max(SCHED_FIFO);
            if min < 0 || max < 0 { (1, 99) } else { (min, max) }
        };
        let prio_val = prio.unwrap_or(max).clamp(min, max);
        let param = sched_param {
            sched_priority: prio_val,
        };
        let rc = unsafe { sched_setscheduler(0, SCHED_FIFO, &param) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            return Err(eyre::eyre!(
                "{err}; hint: needs CAP_SYS_NICE or root ('sudo setcap cap_sys_nice=ep /path/to/steer')"
            ));
        }
        Ok(prio_val)
    }

    RT_ONCE.get_or_init(|| {
        match try_apply_mem_lock() {
            Ok(mode) => tracing::info!(mode, "RT: memory locked"),
            Err(err) => tracing::warn!(error = %err, "mlockall failed"),
        }
        match try_apply_fifo_priority(prio) {
            Ok(p) => tracing::info!(prio = p, "RT: SCHED_FIFO applied"),
            Err(err) => {
                let prio_dbg = prio
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "(max)".into());
                tracing::warn!(prio = %prio_dbg, error = %err, "sched_setscheduler(SCHED_FIFO) failed");
            }
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(rt: bool, _prio: Option<i32>) {
    if rt {
        tracing::warn!("real-time mode is only supported on Linux; continuing without it");
    }
}
