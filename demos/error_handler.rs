//! Shows that a panicking instance is reported to its process's error
//! handler instead of taking the whole pool down.
use std::sync::Arc;

use procrt::context::{message, StepDirective};
use procrt::failure::Failure;
use procrt::{Pool, Process};

fn main() {
    env_logger::init();
    let pool = Pool::builder().size(1).build();
    let process = Process::new();
    process
        .wrap(
            Arc::new(|_msg| -> Result<StepDirective, Failure> {
                panic!("something went wrong in here")
            }),
            Some(Arc::new(|failure: &Failure| {
                eprintln!("instance failed: {}", failure);
            })),
        )
        .unwrap();
    process.setpool(Some(pool.clone()));
    process.spawn(1).unwrap();
    process.input().push(message(())).unwrap();

    std::thread::sleep(std::time::Duration::from_millis(200));
    println!("pool is still alive: {}", !pool.is_dead());
    pool.kill();
}
