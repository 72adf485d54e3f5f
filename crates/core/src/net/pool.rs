use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;

use super::error::PoolError;
use super::frame::Connection;

/// FIFO pool of idle connections.
#[derive(Debug)]
pub struct ConnectionPool<C = Connection> {
    idle: Mutex<VecDeque<C>>,
    available: Semaphore,
}

impl<C> Default for ConnectionPool<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ConnectionPool<C> {
    pub fn new() -> Self {
        Self {
            idle: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
        }
    }

    fn idle(&self) -> MutexGuard<'_, VecDeque<C>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn acquire(&self, timeout: Duration) -> Result<C, PoolError> {
        loop {
            let permit = match tokio::time::timeout(timeout, self.available.acquire()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(PoolError::Closed),
                Err(_) => return Err(PoolError::Timeout(timeout)),
            };
            permit.forget();

            // A permit is only ever added after a push, so this pops unless
            // `close` drained the queue in between.
            if let Some(connection) = self.idle().pop_front() {
                return Ok(connection);
            }
            if self.is_closed() {
                return Err(PoolError::Closed);
            }
        }
    }

    /// Return a connection to the back of the queue. A closed pool drops it and
    /// returns false.
    pub fn release(&self, connection: C) -> bool {
        if self.is_closed() {
            return false;
        }
        self.idle().push_back(connection);
        self.available.add_permits(1);
        true
    }

    pub fn close(&self) {
        self.available.close();
        self.idle().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.available.is_closed()
    }

    pub fn idle_len(&self) -> usize {
        self.idle().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn borrows_in_fifo_order() {
        let pool = ConnectionPool::new();
        for n in 1..=3 {
            pool.release(n);
        }

        let timeout = Duration::from_millis(50);
        assert_eq!(pool.acquire(timeout).await, Ok(1));
        assert_eq!(pool.acquire(timeout).await, Ok(2));
        pool.release(1);
        assert_eq!(pool.acquire(timeout).await, Ok(3));
        assert_eq!(pool.acquire(timeout).await, Ok(1));
    }

    #[tokio::test]
    async fn empty_pool_times_out() {
        let pool: ConnectionPool<u8> = ConnectionPool::new();
        let timeout = Duration::from_millis(20);
        assert_eq!(pool.acquire(timeout).await, Err(PoolError::Timeout(timeout)));
    }

    #[tokio::test]
    async fn waiter_receives_released_connection() {
        let pool = Arc::new(ConnectionPool::new());
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(Duration::from_secs(1)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.release("conn");
        assert_eq!(waiter.await.unwrap(), Ok("conn"));
    }

    #[tokio::test]
    async fn close_rejects_waiters_and_releases() {
        let pool = Arc::new(ConnectionPool::new());
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.close();
        assert_eq!(waiter.await.unwrap(), Err(PoolError::Closed));
        assert!(!pool.release(7));
        assert_eq!(pool.idle_len(), 0);
    }
}
