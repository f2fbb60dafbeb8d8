fn main() {
    if let Err(e) = pure_glance_lib::run() {
        log::error!("[STARTUP] {}", e);
        eprintln!("pure-glance: {}", e);
        std::process::exit(1);
    }
}
