//! Spawns several instances sharing one input channel and shows that
//! messages are distributed across them rather than all landing on one.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use procrt::context::{message, StepDirective};
use procrt::{Pool, Process};

fn main() {
    env_logger::init();
    let pool = Pool::builder().size(4).build();
    let process = Process::new();
    let handled = Arc::new(AtomicUsize::new(0));
    let handled_in_entry = handled.clone();
    process
        .wrap(
            Arc::new(move |msg| {
                let n = *msg.downcast::<u32>().unwrap();
                println!(
                    "worker on thread {:?} handled message {}",
                    std::thread::current().id(),
                    n
                );
                handled_in_entry.fetch_add(1, Ordering::SeqCst);
                Ok(StepDirective::Stop)
            }),
            None,
        )
        .unwrap();
    process.setpool(Some(pool.clone()));
    process.spawn(8).unwrap();

    for n in 0..8u32 {
        process.input().push(message(n)).unwrap();
    }

    while handled.load(Ordering::SeqCst) < 8 {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    for _ in 0..4 {
        pool.kill();
    }
}
