use odm_search::Semaphore;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn waiters_are_served_in_arrival_order() {
    let semaphore = Semaphore::shared(1);
    let order = Arc::new(Mutex::new(Vec::new()));
    let gate = semaphore.acquire(Some("gate")).await;

    let mut tasks = Vec::new();
    for i in 0..5 {
        let semaphore = Arc::clone(&semaphore);
        let order = Arc::clone(&order);
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire(None).await;
            order.lock().push(i);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }));
        // Queue positions follow spawn order
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(semaphore.waiting(), 5);

    drop(gate);
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(semaphore.available(), 1);
}

#[tokio::test(start_paused = true)]
async fn held_never_exceeds_capacity_under_load() {
    let semaphore = Semaphore::shared(3);
    let peak = Arc::new(Mutex::new(0usize));

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let semaphore = Arc::clone(&semaphore);
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                let _permit = semaphore.acquire(None).await;
                {
                    let mut peak = peak.lock();
                    *peak = (*peak).max(semaphore.held());
                }
                tokio::time::sleep(Duration::from_millis(1 + i % 4)).await;
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*peak.lock(), 3);
    assert_eq!(semaphore.available(), 3);
    assert_eq!(semaphore.waiting(), 0);
}

#[derive(Debug, Clone)]
enum Op {
    Acquire,
    Release(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Acquire), any::<usize>().prop_map(Op::Release)]
}

proptest! {
    #[test]
    fn free_plus_held_is_capacity(capacity in 1usize..6, ops in prop::collection::vec(op(), 0..64)) {
        let semaphore = Semaphore::shared(capacity);
        let mut permits = Vec::new();

        for op in ops {
            match op {
                Op::Acquire => {
                    let granted = semaphore.try_acquire(None);
                    prop_assert_eq!(granted.is_some(), permits.len() < capacity);
                    permits.extend(granted);
                }
                Op::Release(i) if !permits.is_empty() => {
                    permits.swap_remove(i % permits.len());
                }
                Op::Release(_) => {}
            }
            prop_assert_eq!(semaphore.held(), permits.len());
            prop_assert_eq!(semaphore.available() + semaphore.held(), capacity);
        }

        drop(permits);
        prop_assert_eq!(semaphore.available(), capacity);
    }
}
