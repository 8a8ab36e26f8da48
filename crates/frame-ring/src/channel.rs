//! Producer and consumer ends of a frame ring.
//!
//! Both ends reserve a slot in two steps: `acquire_*_slot` takes a token and
//! the mutex, `commit` touches the slot, releases the mutex and signals the
//! peer. Dropping an uncommitted slot releases the mutex and gives the token
//! back, so an abandoned reservation never leaks capacity.

use crate::codec::{ControlBlock, SlotHeader};
use crate::config::ChannelConfig;
use crate::errors::ChannelError;
use crate::layout::{CONTROL_SIZE, SlotLayout};
use crate::names::ChannelNames;
use crate::region::SharedRegion;
use crate::ring::{self, Produced, Ring};
use crate::sync::{MutexGuard, SyncSet, Token};
use crate::types::{Detection, Frame, Image};
use common::span_debug;
use std::time::Duration;

/// What a reservation does with its token when it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    /// Hand the complementary token to the peer.
    Publish,
    /// Put the token back on our own side.
    Return,
    /// Keep the token: it did not correspond to a usable slot.
    Discard,
}

struct Endpoint {
    region: SharedRegion,
    sync: SyncSet,
    layout: SlotLayout,
}

impl Endpoint {
    fn ensure_alive(&self) -> Result<(), ChannelError> {
        if self.region.is_alive()? {
            Ok(())
        } else {
            Err(ChannelError::Disconnected)
        }
    }

    fn reserve(
        &mut self,
        token: Token,
        timeout: Option<Duration>,
    ) -> Result<Reservation<'_>, ChannelError> {
        self.ensure_alive()?;

        if !self.sync.acquire(token, timeout)? {
            return Err(ChannelError::Timeout);
        }

        // The owner posts a wake-up token when it tears the channel down.
        let locked = match self.ensure_alive() {
            Ok(()) => self.sync.lock().map_err(ChannelError::from),
            Err(e) => Err(e),
        };
        let guard = match locked {
            Ok(guard) => guard,
            Err(e) => {
                if returns_token(&e)
                    && let Err(post) = self.sync.signal(token)
                {
                    tracing::error!(error = %post, ?token, "Failed to return token");
                }
                return Err(e);
            }
        };

        Ok(Reservation {
            region: &mut self.region,
            sync: &self.sync,
            layout: self.layout,
            token,
            guard: Some(guard),
        })
    }

    fn control(&self) -> Result<ControlBlock, ChannelError> {
        self.ensure_alive()?;
        let guard = self.sync.lock()?;
        let control = ControlBlock::decode(&self.region.bytes()[..CONTROL_SIZE]);
        guard.unlock()?;
        Ok(control)
    }
}

/// Whether a token taken before `err` should go back to its semaphore.
/// After a disconnect there is nobody left to hand it to.
fn returns_token(err: &ChannelError) -> bool {
    !matches!(err, ChannelError::Disconnected)
}

/// A token plus the mutex, held until released.
struct Reservation<'a> {
    region: &'a mut SharedRegion,
    sync: &'a SyncSet,
    layout: SlotLayout,
    token: Token,
    guard: Option<MutexGuard<'a>>,
}

impl Reservation<'_> {
    fn ring(&mut self) -> Result<Ring<'_>, ChannelError> {
        Ok(Ring::new(self.region.bytes_mut(), self.layout)?)
    }

    fn control(&self) -> ControlBlock {
        ControlBlock::decode(&self.region.bytes()[..CONTROL_SIZE])
    }

    /// Release the mutex first, then deal with the token.
    fn finish(&mut self, release: Release) -> Result<(), ChannelError> {
        let Some(guard) = self.guard.take() else {
            return Ok(());
        };
        guard.unlock()?;

        match release {
            Release::Publish => self.sync.signal(self.token.complement())?,
            Release::Return => self.sync.signal(self.token)?,
            Release::Discard => {}
        }
        Ok(())
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.guard.is_some()
            && let Err(e) = self.finish(Release::Return)
        {
            tracing::error!(error = %e, "Failed to release abandoned slot reservation");
        }
    }
}

/// A reserved slot the producer may fill.
pub struct WriteSlot<'a> {
    inner: Reservation<'a>,
}

impl WriteSlot<'_> {
    /// Index of the slot that `commit` will fill.
    pub fn index(&self) -> usize {
        self.inner.control().write_index as usize % self.inner.layout.queue_size()
    }

    /// Serialize the frame into the slot and publish it to the consumer.
    pub fn commit(
        mut self,
        frame_id: i32,
        image: &Image,
        detections: &[Detection],
    ) -> Result<Produced, ChannelError> {
        let produced = self.inner.ring()?.produce(frame_id, image, detections);
        match produced {
            Ok(produced) => {
                self.inner.finish(Release::Publish)?;
                tracing::debug!(
                    frame_id,
                    slot = produced.slot,
                    detections = produced.detections_written,
                    "Frame written"
                );
                Ok(produced)
            }
            Err(e) => {
                tracing::error!(error = %e, frame_id, "Ring refused write");
                self.inner.finish(Release::Discard)?;
                Err(e.into())
            }
        }
    }
}

/// A reserved slot the consumer may drain.
pub struct ReadSlot<'a> {
    inner: Reservation<'a>,
}

impl ReadSlot<'_> {
    /// Index of the slot that `commit` will drain.
    pub fn index(&self) -> usize {
        self.inner.control().read_index as usize % self.inner.layout.queue_size()
    }

    /// Header of the pending frame, without consuming it.
    pub fn header(&self) -> Option<SlotHeader> {
        ring::peek_header(self.inner.region.bytes(), &self.inner.layout)
    }

    /// Copy the frame out of the slot and hand the slot back to the producer.
    pub fn commit(mut self) -> Result<Frame, ChannelError> {
        let consumed = self.inner.ring()?.consume();
        match consumed {
            Ok(consumed) => {
                self.inner.finish(Release::Publish)?;
                tracing::trace!(
                    frame_id = consumed.frame.frame_id,
                    slot = consumed.slot,
                    detections = consumed.frame.detections.len(),
                    degraded = consumed.frame.degraded,
                    "Frame read"
                );
                Ok(consumed.frame)
            }
            Err(e) => {
                tracing::error!(error = %e, "Ring refused read");
                self.inner.finish(Release::Discard)?;
                Err(e.into())
            }
        }
    }
}

/// Owning end of a channel: creates the shared objects and removes them on drop.
pub struct FrameProducer {
    endpoint: Endpoint,
    names: ChannelNames,
}

impl FrameProducer {
    /// Create the region and primitives, replacing leftovers from an earlier
    /// run. Peers still attached to those leftovers see `Disconnected`.
    pub fn create(names: &ChannelNames, layout: SlotLayout) -> Result<Self, ChannelError> {
        SharedRegion::unlink(&names.region)?;
        SyncSet::unlink(names)?;

        let mut region = SharedRegion::create(&names.region, layout.total_size())?;
        Ring::new(region.bytes_mut(), layout)?.init();
        let sync = SyncSet::create(names, layout.queue_size())?;

        tracing::info!(
            region = %names.region.display(),
            queue_size = layout.queue_size(),
            slot_size = layout.slot_size(),
            total_size = layout.total_size(),
            "Frame ring created"
        );

        Ok(Self {
            endpoint: Endpoint {
                region,
                sync,
                layout,
            },
            names: names.clone(),
        })
    }

    pub fn from_config(config: &ChannelConfig) -> Result<Self, ChannelError> {
        Self::create(&config.names, config.layout)
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.endpoint.layout
    }

    pub fn names(&self) -> &ChannelNames {
        &self.names
    }

    /// Block until a slot is free, then hold it.
    pub fn acquire_write_slot(&mut self) -> Result<WriteSlot<'_>, ChannelError> {
        let inner = self.endpoint.reserve(Token::Empty, None)?;
        Ok(WriteSlot { inner })
    }

    pub fn acquire_write_slot_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<WriteSlot<'_>, ChannelError> {
        let inner = self.endpoint.reserve(Token::Empty, Some(timeout))?;
        Ok(WriteSlot { inner })
    }

    /// Block until a slot is free, serialize the frame into it and publish it.
    pub fn write_frame(
        &mut self,
        frame_id: i32,
        image: &Image,
        detections: &[Detection],
    ) -> Result<(), ChannelError> {
        let _s = span_debug!("write_frame");
        self.acquire_write_slot()?
            .commit(frame_id, image, detections)?;
        Ok(())
    }

    pub fn write_frame_timeout(
        &mut self,
        frame_id: i32,
        image: &Image,
        detections: &[Detection],
        timeout: Duration,
    ) -> Result<(), ChannelError> {
        let _s = span_debug!("write_frame");
        self.acquire_write_slot_timeout(timeout)?
            .commit(frame_id, image, detections)?;
        Ok(())
    }

    /// Snapshot of the control block, taken under the mutex.
    pub fn control(&self) -> Result<ControlBlock, ChannelError> {
        self.endpoint.control()
    }
}

impl Drop for FrameProducer {
    fn drop(&mut self) {
        if let Err(e) = SharedRegion::unlink(&self.names.region) {
            tracing::warn!(error = %e, "Failed to remove frame ring region");
        }
        if let Err(e) = SyncSet::unlink(&self.names) {
            tracing::warn!(error = %e, "Failed to remove frame ring semaphores");
        }

        // Wake a peer blocked on either token so it notices the removal.
        for token in [Token::Empty, Token::Full] {
            if let Err(e) = self.endpoint.sync.signal(token) {
                tracing::debug!(error = %e, ?token, "Failed to post wake-up token");
            }
        }

        tracing::info!(region = %self.names.region.display(), "Frame ring removed");
    }
}

/// Attached end of a channel. Dropping it leaves the shared objects alone.
pub struct FrameConsumer {
    endpoint: Endpoint,
}

impl FrameConsumer {
    /// Attach to a ring created by a producer.
    ///
    /// Fails with `NotFound` if the producer has not created the objects yet.
    /// A region larger than the layout means the producer runs with other
    /// constants and is refused with `LayoutMismatch`. A smaller one is
    /// accepted; slots past its end read as degraded frames.
    pub fn attach(names: &ChannelNames, layout: SlotLayout) -> Result<Self, ChannelError> {
        let region = SharedRegion::open(&names.region)?;
        if region.len() > layout.total_size() {
            return Err(ChannelError::LayoutMismatch {
                expected: layout.total_size(),
                actual: region.len(),
            });
        }
        if region.len() < layout.total_size() {
            tracing::warn!(
                expected = layout.total_size(),
                actual = region.len(),
                "Region shorter than configured layout"
            );
        }
        let sync = SyncSet::open(names)?;

        tracing::info!(
            region = %names.region.display(),
            queue_size = layout.queue_size(),
            "Attached to frame ring"
        );

        Ok(Self {
            endpoint: Endpoint {
                region,
                sync,
                layout,
            },
        })
    }

    pub fn from_config(config: &ChannelConfig) -> Result<Self, ChannelError> {
        Self::attach(&config.names, config.layout)
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.endpoint.layout
    }

    /// Block until a slot is filled, then hold it.
    pub fn acquire_read_slot(&mut self) -> Result<ReadSlot<'_>, ChannelError> {
        let inner = self.endpoint.reserve(Token::Full, None)?;
        Ok(ReadSlot { inner })
    }

    pub fn acquire_read_slot_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<ReadSlot<'_>, ChannelError> {
        let inner = self.endpoint.reserve(Token::Full, Some(timeout))?;
        Ok(ReadSlot { inner })
    }

    /// Block until a frame is available and return an owned copy of it.
    pub fn read_frame(&mut self) -> Result<Frame, ChannelError> {
        let _s = span_debug!("read_frame");
        self.acquire_read_slot()?.commit()
    }

    pub fn read_frame_timeout(&mut self, timeout: Duration) -> Result<Frame, ChannelError> {
        let _s = span_debug!("read_frame");
        self.acquire_read_slot_timeout(timeout)?.commit()
    }

    /// Snapshot of the control block, taken under the mutex.
    pub fn control(&self) -> Result<ControlBlock, ChannelError> {
        self.endpoint.control()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::RingError;
    use crate::semaphore::SemaphoreError;
    use nix::errno::Errno;
    use std::io;

    #[test]
    fn test_token_returned_unless_disconnected() {
        assert!(!returns_token(&ChannelError::Disconnected));
        assert!(returns_token(&ChannelError::IoError(io::Error::other("fstat"))));
        assert!(returns_token(&ChannelError::SemaphoreError(
            SemaphoreError::OperationFailed(Errno::EPERM)
        )));
        assert!(returns_token(&ChannelError::Desynchronized(RingError::Empty {
            count: 0
        })));
    }
}
