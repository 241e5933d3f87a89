/// Entry point for the autoupload control panel
fn main() {
    // A panic in the panel must not take the worker down with it; the PID
    // record stays in place so the next session adopts the running worker.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {:?}", panic_info);
        std::process::exit(1);
    }));

    if let Err(e) = autoupload_lib::run() {
        eprintln!("autoupload: {:#}", e);
        std::process::exit(1);
    }
}
