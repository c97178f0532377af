//! Basic usage of the object pool with each storage backend.

use recycle_pool::{Pool, Stack, StorageBackend};

fn main() {
    // Reuses the most recently returned object first.
    let stack_pool = Pool::with_stack_capacity(String::new, 8_usize);

    let mut greeting = stack_pool.get();
    greeting.push_str("hello");
    println!("stack pool handed out: {greeting:?}");

    stack_pool.put(greeting);

    // The same allocation comes back, contents and all. Callers reset objects themselves.
    let reused = stack_pool.get();
    println!("stack pool handed out again: {reused:?}");
    stack_pool.put(reused);

    // Reuses objects in the order they were returned.
    let queue_pool = Pool::with_queue(String::new);

    let items = ["a", "b", "c"].map(|label| {
        let mut item = queue_pool.get();
        item.push_str(label);
        item
    });

    for item in items {
        queue_pool.put(item);
    }

    let order = (0..3).map(|_| queue_pool.get()).collect::<Vec<_>>();
    println!("queue pool handed out in order: {order:?}");

    // The default backend does not promise any order. A guard returns the object on drop.
    let buffered_pool = Pool::new(|| vec![0_u8; 256]);

    {
        let mut buffer = buffered_pool.checkout();
        buffer.fill(0xAB);
    }

    println!("buffered pool stats: {:?}", buffered_pool.stats());

    // The backends are usable on their own as well.
    let backend: Box<dyn StorageBackend<&str>> = Box::new(Stack::new(2_usize.into()));
    backend.put("first").expect("the stack has room");
    backend.put("second").expect("the stack has room");
    println!("third put into a full stack: {:?}", backend.put("third"));
}
