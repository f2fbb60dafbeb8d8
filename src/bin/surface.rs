//! `pure-glance-surface`: the offscreen detection surface.
//!
//! Spawned by the coordinator. Reads `detect-face` requests on stdin and
//! answers on stdout; logs go to stderr.

use pure_glance_lib::detector::{surface, NoFaceDetector};
use std::sync::Arc;

fn main() {
    env_logger::init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("pure-glance-surface: failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(surface::serve(
        Arc::new(NoFaceDetector),
        tokio::io::BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    ));

    if let Err(e) = result {
        log::error!("[SURFACE] {}", e);
        std::process::exit(1);
    }
}
