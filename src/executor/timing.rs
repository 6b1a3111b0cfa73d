//! Wall-clock timing of calls

use std::future::Future;
use std::time::{Duration, Instant};

/// Call `f` and return how long it took along with its result
pub fn timed<R>(f: impl FnOnce() -> R) -> (Duration, R) {
    let start = Instant::now();
    let ret = f();
    (start.elapsed(), ret)
}

/// Await `fut` and return how long it took along with its output
pub async fn timed_async<F: Future>(fut: F) -> (Duration, F::Output) {
    let start = Instant::now();
    let ret = fut.await;
    (start.elapsed(), ret)
}
