//! Shows a pool growing under a burst of demand and the cleaner shrinking it back afterwards.
//!
//! The cleaner runs on a compressed schedule here so the whole cycle takes a couple of seconds
//! instead of minutes. The metrics collected by the pool are printed at the end.

use std::thread;
use std::time::Duration;

use new_zealand::nz;
use nm::Report;
use recycle_pool::{CleanerConfig, Pool};

fn main() {
    let pool = Pool::builder()
        .stack()
        .capacity(200_usize)
        .half_life(Duration::from_millis(200))
        .cleaner_config(
            CleanerConfig::new()
                .tick_interval(Duration::from_millis(20))
                .update_every(nz!(1_u32))
                .clean_every(nz!(2_u32)),
        )
        .build(|| Vec::<u8>::with_capacity(16 * 1024));

    println!("Burst: taking 100 buffers at once");

    let burst = (0..100).map(|_| pool.get()).collect::<Vec<_>>();
    println!("  {:?}", pool.stats());

    for buffer in burst {
        pool.put(buffer);
    }
    println!("  after returning them: {:?}", pool.stats());

    println!("Steady state: one buffer at a time");

    for round in 0..10 {
        for _ in 0..50 {
            let mut buffer = pool.checkout();
            buffer.clear();
            buffer.extend_from_slice(b"payload");
        }

        thread::sleep(Duration::from_millis(200));

        let stats = pool.stats();
        println!(
            "  round {round}: {} idle, demand estimate {:.2}",
            stats.in_pool, stats.estimated_demand
        );
    }

    pool.close();
    println!("Closed: {:?}", pool.stats());

    println!();
    println!("{}", Report::collect());
}
