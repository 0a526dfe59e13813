//! In-process group where every worker is an OS thread and messages travel over channels.
use crossbeam::channel::{self, Receiver, Sender};
use std::collections::VecDeque;
use std::fmt::{self, Debug};

use super::message::Envelope;
use super::{Channel, Communicator, NetworkError, Tag};
use crate::prelude::*;
use crate::types::{HasDataType, WorkerId};

enum Packet {
    Message(Envelope),

    /// Sent by a worker to every peer when its communicator is dropped. Channels are FIFO
    /// per sender, so every message of that worker precedes this packet.
    Departed(WorkerId),
}

#[derive(Default)]
struct Mailbox {
    // Messages that arrived before a matching receive, in arrival order.
    pending: VecDeque<Envelope>,
    departed: HashSet<WorkerId>,
}

pub struct LocalCommunicator {
    my_id: WorkerId,
    outboxes: Vec<Sender<Packet>>,
    inbox: Receiver<Packet>,
    mailbox: Mutex<Mailbox>,
}

impl Debug for LocalCommunicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mailbox = self.mailbox.lock();

        f.debug_struct("LocalCommunicator")
            .field("my_id", &self.my_id)
            .field("num_workers", &self.outboxes.len())
            .field("pending", &mailbox.pending.len())
            .field("departed", &mailbox.departed.len())
            .finish()
    }
}

impl LocalCommunicator {
    /// Creates the communicators of a group of `num_workers` workers, ordered by rank.
    pub fn group(num_workers: usize) -> Result<Vec<Self>, NetworkError> {
        if num_workers == 0 {
            return Err(NetworkError::EmptyGroup);
        }

        let (outboxes, inboxes): (Vec<_>, Vec<_>) =
            (0..num_workers).map(|_| channel::unbounded()).unzip();

        Ok(enumerate(inboxes)
            .map(|(rank, inbox)| Self {
                my_id: WorkerId::new(rank),
                outboxes: outboxes.clone(),
                inbox,
                mailbox: default(),
            })
            .collect())
    }

    fn peers(&self) -> impl Iterator<Item = WorkerId> + '_ {
        (0..self.outboxes.len())
            .map(WorkerId::new)
            .filter(move |&peer| peer != self.my_id)
    }

    fn check_valid_node(&self, peer: WorkerId) -> Result<(), NetworkError> {
        if peer.get() < self.outboxes.len() {
            Ok(())
        } else {
            Err(NetworkError::InvalidRank(peer))
        }
    }

    fn check_valid_tag(&self, tag: Tag) -> Result<(), NetworkError> {
        if tag.0 >= 0 {
            Ok(())
        } else {
            Err(NetworkError::InvalidTag(tag))
        }
    }

    fn post(&self, dst: WorkerId, envelope: Envelope) -> Result<(), NetworkError> {
        trace!(
            "sending message to node {} ({})",
            dst,
            envelope.channel
        );

        self.outboxes[dst.get()]
            .send(Packet::Message(envelope))
            .map_err(|_| NetworkError::PeerLeft(dst))
    }

    /// Blocks until a message matching `src` and `channel` is available and returns its
    /// position in the pending queue.
    ///
    /// Fails once no matching message can arrive anymore: `src` has left the group, or, if
    /// `src` is `None`, every peer has.
    fn wait_for(&self, src: Option<WorkerId>, channel: Channel) -> Result<usize, NetworkError> {
        let mut mailbox = self.mailbox.lock();

        loop {
            if let Some(index) = mailbox.pending.iter().position(|m| m.matches(src, channel)) {
                return Ok(index);
            }

            match src {
                Some(src) if mailbox.departed.contains(&src) => {
                    return Err(NetworkError::PeerLeft(src));
                }
                None if mailbox.departed.len() + 1 >= self.outboxes.len() => {
                    return Err(NetworkError::Disconnected);
                }
                _ => {}
            }

            match self.inbox.recv().map_err(|_| NetworkError::Disconnected)? {
                Packet::Message(envelope) => {
                    trace!(
                        "received message from node {} ({})",
                        envelope.source,
                        envelope.channel
                    );
                    mailbox.pending.push_back(envelope);
                }
                Packet::Departed(peer) => {
                    debug!("node {} left the group", peer);
                    mailbox.departed.insert(peer);
                }
            }
        }
    }

    fn take(&self, src: WorkerId, channel: Channel) -> Result<Envelope, NetworkError> {
        let index = self.wait_for(Some(src), channel)?;

        self.mailbox
            .lock()
            .pending
            .remove(index)
            .ok_or(NetworkError::Disconnected)
    }
}

impl Drop for LocalCommunicator {
    fn drop(&mut self) {
        for peer in self.peers() {
            // The peer may have left already.
            let _ = self.outboxes[peer.get()].send(Packet::Departed(self.my_id));
        }
    }
}

impl Communicator for LocalCommunicator {
    fn my_id(&self) -> WorkerId {
        self.my_id
    }

    fn num_workers(&self) -> usize {
        self.outboxes.len()
    }

    fn broadcast<T: HasDataType>(
        &self,
        root: WorkerId,
        buffer: &mut [T],
    ) -> Result<(), NetworkError> {
        self.check_valid_node(root)?;

        if root == self.my_id {
            for dst in self.peers() {
                self.post(dst, Envelope::new(root, Channel::Broadcast, buffer))?;
            }

            Ok(())
        } else {
            self.take(root, Channel::Broadcast)?.decode_into(buffer)
        }
    }

    fn send<T: HasDataType>(
        &self,
        dst: WorkerId,
        tag: Tag,
        buffer: &[T],
    ) -> Result<(), NetworkError> {
        self.check_valid_node(dst)?;
        self.check_valid_tag(tag)?;

        self.post(dst, Envelope::new(self.my_id, Channel::Tagged(tag), buffer))
    }

    fn probe<T: HasDataType>(
        &self,
        src: Option<WorkerId>,
        tag: Tag,
    ) -> Result<(WorkerId, usize), NetworkError> {
        if let Some(src) = src {
            self.check_valid_node(src)?;
        }
        self.check_valid_tag(tag)?;

        let index = self.wait_for(src, Channel::Tagged(tag))?;
        let mailbox = self.mailbox.lock();
        let envelope = &mailbox.pending[index];

        Ok((envelope.source, envelope.element_count::<T>()?))
    }

    fn recv<T: HasDataType>(
        &self,
        src: WorkerId,
        tag: Tag,
        buffer: &mut [T],
    ) -> Result<(), NetworkError> {
        self.check_valid_node(src)?;
        self.check_valid_tag(tag)?;

        self.take(src, Channel::Tagged(tag))?.decode_into(buffer)
    }

    /// Every worker notifies every peer and then waits for a notification from each of them.
    fn barrier(&self) -> Result<(), NetworkError> {
        trace!("node {} waiting at barrier", self.my_id);

        for peer in self.peers() {
            self.post(peer, Envelope::new::<i32>(self.my_id, Channel::Barrier, &[]))?;
        }

        for peer in self.peers() {
            self.take(peer, Channel::Barrier)?;
        }

        Ok(())
    }
}

/// Runs `worker_main` once for every worker of a new local group of `num_workers` workers,
/// each on its own thread, and returns the results ordered by rank.
///
/// A worker whose `worker_main` returns early leaves the group. Peers blocked on a transfer
/// with it, or in [`barrier`](Communicator::barrier), then fail with
/// [`NetworkError::PeerLeft`] instead of waiting forever.
pub fn execute_local<F, R>(num_workers: usize, worker_main: F) -> Result<Vec<R>>
where
    F: Fn(LocalCommunicator) -> R + Sync,
    R: Send,
{
    let comms = LocalCommunicator::group(num_workers)?;
    let worker_main = &worker_main;

    let outcome = crossbeam::scope(|scope| -> Result<Vec<R>> {
        let mut handles = vec![];

        for comm in comms {
            let name = format!("worker-{}", comm.my_id());
            let handle = scope
                .builder()
                .name(name)
                .spawn(move |_| worker_main(comm))?;

            handles.push(handle);
        }

        let mut results = Vec::with_capacity(handles.len());
        for (rank, handle) in enumerate(handles) {
            match handle.join() {
                Ok(result) => results.push(result),
                Err(_) => bail!("worker {} panicked", rank),
            }
        }

        Ok(results)
    });

    match outcome {
        Ok(results) => results,
        Err(_) => bail!("worker thread panicked"),
    }
}
