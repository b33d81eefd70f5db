// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::any::Any;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::{anyhow, Result};
use crossbeam::channel::{bounded, Receiver};
use crossbeam::thread::scope;

use crate::errors::Error;

/// Create and execute a worker pool.
/// A preprocessor thread feeds `items` into one FIFO queue, `threads`
/// workers drain it and send their results to a single postprocessor,
/// which consumes them one at a time. All threads are joined before
/// returning.
/// # Arguments
/// * `work` - Closure processing one item. Failures and panics are logged
///   together with the item and counted; they do not stop the other items.
/// * `postprocessor` - Consumes all results. Its failure stops the pool and
///   is returned.
///
/// Returns the number of failed items.
pub(crate) fn worker_pool<T, R, W, Post>(
    items: Vec<T>,
    threads: usize,
    capacity: usize,
    work: W,
    postprocessor: Post,
) -> Result<usize>
where
    T: Send + Display,
    R: Send,
    W: Fn(T) -> Result<R> + Sync,
    Post: FnOnce(Receiver<R>) -> Result<()> + Send,
{
    let work = &work;
    scope(|scope| -> Result<usize> {
        let (in_sender, in_receiver) = bounded(capacity.max(1));
        let (out_sender, out_receiver) = bounded(capacity.max(1));

        let preprocessor = scope.spawn(move |_| -> Result<()> {
            for item in items {
                in_sender
                    .send(item)
                    .map_err(|_| anyhow!("all workers have stopped"))?;
            }
            // tell consuming threads that we are done
            drop(in_sender);
            Ok(())
        });

        let workers: Vec<_> = (0..threads.max(1))
            .map(|_| {
                let receiver = in_receiver.clone();
                let sender = out_sender.clone();
                scope.spawn(move |_| {
                    let mut failures = 0;
                    for item in receiver {
                        let label = item.to_string();
                        match catch_unwind(AssertUnwindSafe(|| work(item))) {
                            Ok(Ok(result)) => {
                                if sender.send(result).is_err() {
                                    // postprocessor is gone, its error is reported below
                                    break;
                                }
                            }
                            Ok(Err(e)) => {
                                error!("Failed to process {}: {:#}", label, e);
                                failures += 1;
                            }
                            Err(payload) => {
                                error!("Panic while processing {}: {}", label, panic_message(&*payload));
                                failures += 1;
                            }
                        }
                    }
                    failures
                })
            })
            .collect();
        drop(in_receiver);
        drop(out_sender);

        let postprocessor = scope.spawn(move |_| postprocessor(out_receiver));

        let mut failures = 0;
        let mut panicked = false;
        for worker in workers {
            match worker.join() {
                Ok(n) => failures += n,
                Err(_) => panicked = true,
            }
        }
        let processed = postprocessor.join().map_err(|_| Error::WorkerPanicked)?;
        let fed = preprocessor.join().map_err(|_| Error::WorkerPanicked)?;
        if panicked {
            return Err(Error::WorkerPanicked.into());
        }
        processed?;
        fed?;
        Ok(failures)
    })
    .map_err(|_| Error::WorkerPanicked)?
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown cause"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_all_items_processed_once() {
        let seen = Mutex::new(Vec::new());
        let failures = worker_pool(
            (0..100).collect(),
            4,
            2,
            |item: usize| Ok(item * 2),
            |results| {
                seen.lock().unwrap().extend(results);
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(failures, 0);
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, (0..100).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_failures_are_counted_not_fatal() {
        let done = Mutex::new(0);
        let failures = worker_pool(
            (0..10).collect(),
            3,
            1,
            |item: usize| {
                if item % 3 == 0 {
                    return Err(anyhow!("item {} is broken", item));
                }
                Ok(item)
            },
            |results| {
                *done.lock().unwrap() += results.iter().count();
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(failures, 4);
        assert_eq!(done.into_inner().unwrap(), 6);
    }

    #[test]
    fn test_postprocessor_error_stops_pool() {
        let result = worker_pool(
            (0..50).collect(),
            2,
            1,
            |item: usize| Ok(item),
            |results: Receiver<usize>| {
                for item in results {
                    if item > 5 {
                        return Err(anyhow!("disk full"));
                    }
                }
                Ok(())
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_panicking_item_is_counted() {
        let done = Mutex::new(Vec::new());
        let failures = worker_pool(
            (0..8).collect(),
            2,
            1,
            |item: usize| {
                if item == 3 {
                    panic!("index out of bounds in item {}", item);
                }
                Ok(item)
            },
            |results| {
                done.lock().unwrap().extend(results);
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(failures, 1);
        let mut done = done.into_inner().unwrap();
        done.sort_unstable();
        assert_eq!(done, vec![0, 1, 2, 4, 5, 6, 7]);
    }
}
