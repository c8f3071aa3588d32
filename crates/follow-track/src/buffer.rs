use crate::{Error, Result};
use std::sync::{Arc, Mutex, PoisonError};

/// A capability that hands out pixel buffers for captured frames.
///
/// The frame producer is written against this trait only, the concrete provider is picked from
/// configuration at startup.
pub trait BufferProvider: Send + Sync {
    /// Provider identifier used in logs.
    fn name(&self) -> &'static str;

    /// Obtain a zeroed buffer of exactly `len` bytes.
    fn allocate(&self, len: usize) -> Result<PixelBuffer>;
}

/// Owned pixel storage.
///
/// Dropping a buffer releases it: heap buffers are freed, pooled buffers go back to the pool that
/// issued them. Cloning always produces a plain heap copy that is independent of any pool.
pub struct PixelBuffer {
    data: Vec<u8>,
    home: Option<Arc<Pool>>,
}

impl PixelBuffer {
    /// Wrap an existing heap allocation.
    pub fn from_vec(data: Vec<u8>) -> PixelBuffer {
        PixelBuffer { data, home: None }
    }

    /// Returns the number of bytes held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns whether the buffer was issued by a pool.
    pub fn is_pooled(&self) -> bool {
        self.home.is_some()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Clone for PixelBuffer {
    fn clone(&self) -> Self {
        PixelBuffer::from_vec(self.data.clone())
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("len", &self.data.len())
            .field("pooled", &self.home.is_some())
            .finish()
    }
}

impl Drop for PixelBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.home.take() {
            pool.give_back(std::mem::take(&mut self.data));
        }
    }
}

/// Allocates every buffer on the heap.
#[derive(Debug, Default, Clone)]
pub struct HeapProvider;

impl HeapProvider {
    pub fn new() -> HeapProvider {
        HeapProvider
    }
}

impl BufferProvider for HeapProvider {
    fn name(&self) -> &'static str {
        "heap"
    }

    fn allocate(&self, len: usize) -> Result<PixelBuffer> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|err| Error::allocation(format!("heap allocation of {len} bytes: {err}")))?;
        data.resize(len, 0);
        Ok(PixelBuffer::from_vec(data))
    }
}

#[derive(Debug)]
struct Pool {
    block_size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl Pool {
    fn give_back(&self, mut block: Vec<u8>) {
        block.clear();
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(block);
    }
}

/// A fixed set of equally sized blocks allocated once up front.
///
/// Models a contiguous device heap: requests larger than a block, or made while every block is
/// checked out, fail instead of growing the pool.
#[derive(Debug, Clone)]
pub struct PoolProvider {
    pool: Arc<Pool>,
    blocks: usize,
}

impl PoolProvider {
    /// Returns a new PoolProvider
    ///
    /// # Parameters
    ///
    /// * `blocks`: Number of buffers in the pool.
    /// * `block_size`: Capacity in bytes of each buffer.
    pub fn new(blocks: usize, block_size: usize) -> PoolProvider {
        let free = (0..blocks)
            .map(|_| Vec::with_capacity(block_size))
            .collect::<Vec<_>>();

        PoolProvider {
            pool: Arc::new(Pool {
                block_size,
                free: Mutex::new(free),
            }),
            blocks,
        }
    }

    /// Returns the capacity in bytes of each block
    pub fn block_size(&self) -> usize {
        self.pool.block_size
    }

    /// Returns the total number of blocks
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Returns the number of blocks not currently checked out
    pub fn available(&self) -> usize {
        self.pool
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl BufferProvider for PoolProvider {
    fn name(&self) -> &'static str {
        "pool"
    }

    fn allocate(&self, len: usize) -> Result<PixelBuffer> {
        if len > self.pool.block_size {
            return Err(Error::allocation(format!(
                "request of {len} bytes exceeds pool block size {}",
                self.pool.block_size
            )));
        }

        let mut block = self
            .pool
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or_else(|| {
                Error::allocation(format!("all {} pool blocks are in use", self.blocks))
            })?;
        block.resize(len, 0);

        Ok(PixelBuffer {
            data: block,
            home: Some(self.pool.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn heap_allocate() {
        let buffer = HeapProvider::new().allocate(12).unwrap();
        assert_eq!(buffer.len(), 12);
        assert!(!buffer.is_pooled());
        assert!(buffer.as_slice().iter().all(|b| *b == 0));
    }

    #[test]
    fn pool_returns_blocks_on_drop() {
        let provider = PoolProvider::new(2, 16);
        let a = provider.allocate(16).unwrap();
        let b = provider.allocate(8).unwrap();
        assert_eq!(provider.available(), 0);
        assert!(a.is_pooled());
        assert_eq!(b.len(), 8);

        assert!(matches!(provider.allocate(4), Err(Error::Allocation(_))));

        drop(a);
        assert_eq!(provider.available(), 1);
        drop(b);
        assert_eq!(provider.available(), 2);
    }

    #[test]
    fn pool_rejects_oversized() {
        let provider = PoolProvider::new(1, 16);
        assert!(matches!(provider.allocate(17), Err(Error::Allocation(_))));
        assert_eq!(provider.available(), 1);
    }

    #[test]
    fn pool_clone_is_heap_copy() {
        let provider = PoolProvider::new(1, 4);
        let mut buffer = provider.allocate(4).unwrap();
        buffer.as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);

        let copy = buffer.clone();
        drop(buffer);

        assert!(!copy.is_pooled());
        assert_eq!(copy.as_slice(), &[1, 2, 3, 4]);
        assert_eq!(provider.available(), 1);
    }

    #[test]
    fn pool_block_is_zeroed_on_reuse() {
        let provider = PoolProvider::new(1, 4);
        let mut buffer = provider.allocate(4).unwrap();
        buffer.as_mut_slice().copy_from_slice(&[9, 9, 9, 9]);
        drop(buffer);

        let buffer = provider.allocate(4).unwrap();
        assert_eq!(buffer.as_slice(), &[0, 0, 0, 0]);
    }
}
