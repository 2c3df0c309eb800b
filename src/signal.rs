//! Unix signal handling (SIGINT).
//!
//! The first SIGINT is left to the running command, which should fail and
//! be reported as interrupted, so the walk can stop and flush its build
//! records and trace.  A second SIGINT kills us as usual.

fn sigint_action(handler: libc::sighandler_t) {
    // Safety: registering a signal handler is libc unsafe code.
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = handler;
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
    }
}

extern "C" fn sigint_handler(_sig: libc::c_int) {
    sigint_action(libc::SIG_DFL);
}

pub fn register_sigint() {
    sigint_action(sigint_handler as libc::sighandler_t);
}
