//! Spawns a process whose instance, upon receiving a message, creates and
//! spawns a second process -- showing parent discovery across that
//! boundary.
use std::sync::Arc;

use procrt::context::{message, StepDirective};
use procrt::{Pool, Process};

fn main() {
    env_logger::init();
    let pool = Pool::builder().size(2).build();

    let parent = Process::new();
    parent
        .wrap(
            Arc::new(move |_msg| {
                let child =
                    Process::spawn_new(Arc::new(|_msg| Ok(StepDirective::Stop)), None, 1).unwrap();
                println!("parent has child: {}", child.parent().is_some());
                Ok(StepDirective::Stop)
            }),
            None,
        )
        .unwrap();
    parent.setpool(Some(pool.clone()));
    parent.spawn(1).unwrap();
    parent.send(message(())).unwrap();

    std::thread::sleep(std::time::Duration::from_millis(200));
    pool.kill();
    pool.kill();
}
