//! Spawns a single instance that prints every message it receives, then
//! stops after the third one.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use procrt::context::{message, StepDirective};
use procrt::{Pool, Process};

fn main() {
    env_logger::init();
    let pool = Pool::builder().size(1).build();
    let process = Process::new();
    let remaining = Arc::new(AtomicUsize::new(3));
    process
        .wrap(
            Arc::new(move |msg| {
                let n = *msg.downcast::<u32>().unwrap();
                println!("echo: {}", n);
                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    Ok(StepDirective::Stop)
                } else {
                    Ok(StepDirective::Continue)
                }
            }),
            None,
        )
        .unwrap();
    process.setpool(Some(pool.clone()));
    process.spawn(1).unwrap();

    for n in 0..3u32 {
        process.input().push(message(n)).unwrap();
    }

    std::thread::sleep(std::time::Duration::from_millis(200));
    pool.kill();
}
