// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

use crate::{
    mpi::{MemoryBlock, Mpi, PoolId},
    Error,
};
use log::{debug, error, info};
use std::sync::Arc;

/// A preallocated pool of DMA memory blocks.
///
/// The pool is created once at initialisation and destroyed when the last
/// reference goes away. Every [`PooledBlock`] holds a reference, so the
/// pool cannot be destroyed while a block is out.
pub struct BufferPool {
    mpi: Arc<dyn Mpi>,
    id: PoolId,
    block_size: u64,
    count: u32,
}

impl BufferPool {
    /// Preallocate `count` blocks of `block_size` bytes.
    ///
    /// Failure here is not recoverable; callers abort initialisation.
    pub fn create(mpi: Arc<dyn Mpi>, block_size: u64, count: u32) -> Result<Arc<Self>, Error> {
        let id = mpi.create_pool(block_size, count)?;
        info!("created memory pool: {} blocks of {} bytes", count, block_size);
        Ok(Arc::new(BufferPool {
            mpi,
            id,
            block_size,
            count,
        }))
    }

    /// Take one block of at least `size` bytes out of the pool.
    pub fn acquire(self: &Arc<Self>, size: u64) -> Result<PooledBlock, Error> {
        if size > self.block_size {
            return Err(Error::InvalidArgument(format!(
                "requested {} bytes from a pool of {} byte blocks",
                size, self.block_size
            )));
        }
        let block = self.mpi.get_block(self.id, size)?;
        Ok(PooledBlock {
            pool: Arc::clone(self),
            block,
        })
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn mpi(&self) -> &Arc<dyn Mpi> {
        &self.mpi
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        match self.mpi.destroy_pool(self.id) {
            Ok(()) => info!("destroyed memory pool"),
            Err(err) => error!("failed to destroy memory pool: {}", err),
        }
    }
}

/// A block on loan from a [`BufferPool`]; returned on drop.
pub struct PooledBlock {
    pool: Arc<BufferPool>,
    block: MemoryBlock,
}

impl PooledBlock {
    pub fn block(&self) -> MemoryBlock {
        self.block
    }

    /// The DMA-buf fd to attach to a capture plane.
    pub fn fd(&self) -> Result<i32, Error> {
        self.pool.mpi.block_to_fd(self.block)
    }
}

impl std::fmt::Debug for PooledBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PooledBlock").field(&self.block).finish()
    }
}

impl Drop for PooledBlock {
    fn drop(&mut self) {
        match self.pool.mpi.release_block(self.block) {
            Ok(()) => debug!("released memory block {:#x}", self.block.as_raw()),
            Err(err) => error!("failed to release memory block: {}", err),
        }
    }
}
