//! Ordered queue of replies waiting on one connection.
//!
//! The server answers in request order, so only the head reply may read the channel.
//! Reaching a later reply first force-drains every reply ahead of it:
//!
//! - a reply whose result is still reachable is buffered off the wire and moved, together
//!   with its buffer, into the result's hand-off cell;
//! - a reply nobody holds any more is skipped frame by frame.
use std::{
    collections::VecDeque,
    sync::{Mutex, Weak},
};

use log::debug;

use crate::{error::Result, protocol::ServerMessage};

use super::{
    lock,
    reply::{FrameSource, Reply, ReplyId},
};

/// Receives a reply that had to leave the wire while its result was still alive.
pub(crate) type Handoff = Mutex<Option<Evicted>>;

/// A reply together with the frames read off the wire on its behalf.
#[derive(Debug)]
pub(crate) struct Evicted {
    pub reply: Reply,
    pub frames: VecDeque<ServerMessage>,
}

#[derive(Debug)]
struct Slot {
    reply: Reply,
    handoff: Weak<Handoff>,
}

#[derive(Debug, Default)]
pub(crate) struct ReplyQueue {
    slots: VecDeque<Slot>,
    next_id: ReplyId,
}

impl ReplyQueue {
    /// Queues the reply to a request that was just written.
    pub fn enqueue(&mut self, handoff: Weak<Handoff>) -> ReplyId {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.push_back(Slot {
            reply: Reply::new(id),
            handoff,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: ReplyId) -> bool {
        self.slots.iter().any(|slot| slot.reply.id() == id)
    }

    pub fn head_mut(&mut self) -> Option<&mut Reply> {
        self.slots.front_mut().map(|slot| &mut slot.reply)
    }

    /// Makes `id` the head, draining every reply ahead of it.
    ///
    /// Returns `false` when `id` is no longer queued.
    pub fn activate(&mut self, id: ReplyId, src: &mut dyn FrameSource) -> Result<bool> {
        if !self.contains(id) {
            return Ok(false);
        }
        while let Some(head) = self.slots.front() {
            if head.reply.id() == id {
                return Ok(true);
            }
            self.evict_head(src)?;
        }
        Ok(false)
    }

    /// Removes the head once it is fully drained or discarded.
    pub fn retire(&mut self, id: ReplyId) -> bool {
        match self.slots.front() {
            Some(head) if head.reply.id() == id && head.reply.is_complete() => {
                debug!("reply {id} retired as {:?}", head.reply.state());
                self.slots.pop_front();
                true
            }
            _ => false,
        }
    }

    /// Drains the whole queue, as before closing the channel.
    pub fn drain_all(&mut self, src: &mut dyn FrameSource) -> Result<()> {
        while !self.is_empty() {
            self.evict_head(src)?;
        }
        Ok(())
    }

    /// Fails every queued reply after the channel broke.
    pub fn abort_all(&mut self) {
        for mut slot in self.slots.drain(..) {
            slot.reply.abort();
            debug!("reply {} aborted", slot.reply.id());
        }
    }

    fn evict_head(&mut self, src: &mut dyn FrameSource) -> Result<()> {
        let Some(mut slot) = self.slots.pop_front() else {
            return Ok(());
        };
        let id = slot.reply.id();

        match slot.handoff.upgrade() {
            Some(handoff) => {
                let frames = slot.reply.buffer_remaining(src)?;
                debug!("reply {id} evicted with {} buffered frames", frames.len());
                *lock(&handoff)? = Some(Evicted {
                    reply: slot.reply,
                    frames,
                });
            }
            None => {
                slot.reply.discard_remaining(src)?;
                debug!("reply {id} discarded");
            }
        }
        Ok(())
    }
}
