use devstack_core::orchestrator::CancelFlag;

/// Set the returned flag on Ctrl-C.
///
/// The listener runs on its own thread with a current-thread runtime so the
/// orchestrator and its blocking HTTP probes stay on the main thread, outside
/// any async context.
pub fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::warn!("Ctrl-C handling unavailable: {e}");
                return;
            }
        };
        rt.block_on(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ninterrupted: stopping after the current probe; started services keep running");
                flag.cancel();
            }
        });
    });
    cancel
}
