//! Single-flight FIFO operation queue
//!
//! Serializes access to a shared value (the protocol session) across any
//! number of concurrent callers:
//!
//! ```text
//!  enqueue()      enqueue()      enqueue()
//!     │              │              │
//!     ▼              ▼              ▼
//! ┌────────┐     ┌────────┐     ┌────────┐
//! │ id 7   │ ──▶ │ id 8   │ ──▶ │ id 9   │      line (FIFO)
//! │running │     │ front  │     │waiting │
//! └────────┘     └────────┘     └────────┘
//!     │
//!     ▼
//!  Turn ──▶ &mut S      dropped ──▶ id 8 runs
//! ```
//!
//! A position in the line is reserved synchronously by [`OperationQueue::enqueue`].
//! Awaiting the returned [`Ticket`] resolves to a [`Turn`] once every earlier
//! ticket has finished. Whatever the holder does with the value, success or
//! failure, dropping the turn lets the next ticket run.
//!
//! The line has no fixed depth. Only counters are stored: ticket numbers
//! increase monotonically and the queue remembers which one is at the front.
//! When the front ticket starts running or is abandoned, the waiting tickets
//! report their numbers as they are next polled and the lowest becomes the
//! new front. Waiters park in a [`MultiWakerRegistration`], which wakes
//! everyone on overflow; each ticket re-checks its own number, so order is
//! kept either way.
//!
//! A ticket that is never polled holds up the election, so tickets should
//! be awaited or dropped promptly.

use core::cell::RefCell;
use core::future::Future;
use core::ops::{Deref, DerefMut};
use core::pin::Pin;
use core::task::{Context, Poll};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_sync::waitqueue::MultiWakerRegistration;

use crate::fmt::trace;

/// Parked wakers kept before the registration wakes everyone
const WAKER_SLOTS: usize = 8;

#[derive(Clone, Copy)]
struct Election {
    reported: usize,
    lowest: u64,
}

struct Line {
    next_id: u64,
    /// Tickets issued and not yet running
    waiting: usize,
    running: bool,
    /// Lowest waiting ticket, once known
    front: Option<u64>,
    election: Option<Election>,
    epoch: u32,
    wakers: MultiWakerRegistration<WAKER_SLOTS>,
}

impl Line {
    const fn new() -> Self {
        Self {
            next_id: 0,
            waiting: 0,
            running: false,
            front: None,
            election: None,
            epoch: 0,
            wakers: MultiWakerRegistration::new(),
        }
    }

    fn issue(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        if self.waiting == 0 {
            self.front = Some(id);
        }
        self.waiting += 1;
        id
    }

    /// Forget the front and ask every waiting ticket for its number
    fn elect(&mut self) {
        self.front = None;
        self.election = None;
        if self.waiting > 0 {
            self.epoch = self.epoch.wrapping_add(1);
            self.election = Some(Election {
                reported: 0,
                lowest: u64::MAX,
            });
        }
        self.wakers.wake();
    }

    fn report(&mut self, id: u64, seen: &mut Option<u32>) {
        let epoch = self.epoch;
        if let Some(election) = self.election.as_mut() {
            if *seen != Some(epoch) {
                *seen = Some(epoch);
                election.reported += 1;
                election.lowest = election.lowest.min(id);
            }
            self.settle();
        }
    }

    fn settle(&mut self) {
        let Some(election) = self.election else {
            return;
        };
        if self.waiting == 0 {
            self.election = None;
        } else if election.reported >= self.waiting {
            self.election = None;
            self.front = Some(election.lowest);
            self.wakers.wake();
        }
    }

    fn is_next(&self, id: u64) -> bool {
        !self.running && self.front == Some(id)
    }

    fn start(&mut self) {
        self.running = true;
        self.waiting -= 1;
        self.elect();
    }

    fn leave(&mut self, id: u64, seen: Option<u32>, running: bool) {
        if running {
            self.running = false;
            self.wakers.wake();
            return;
        }

        self.waiting -= 1;
        if self.front == Some(id) {
            self.elect();
            return;
        }
        let epoch = self.epoch;
        if let Some(election) = self.election.as_mut() {
            if seen == Some(epoch) {
                if election.lowest == id {
                    self.elect();
                    return;
                }
                election.reported -= 1;
            }
            self.settle();
        }
    }
}

/// FIFO queue granting exclusive access to `S`, one holder at a time
pub struct OperationQueue<S> {
    line: BlockingMutex<CriticalSectionRawMutex, RefCell<Line>>,
    value: Mutex<CriticalSectionRawMutex, S>,
}

impl<S> OperationQueue<S> {
    /// Create a queue guarding `value`
    pub const fn new(value: S) -> Self {
        Self {
            line: BlockingMutex::new(RefCell::new(Line::new())),
            value: Mutex::new(value),
        }
    }

    /// Reserve the next position in the line
    pub fn enqueue(&self) -> Ticket<'_, S> {
        let id = self.line.lock(|line| line.borrow_mut().issue());
        trace!("queue: ticket {} enqueued", id);

        Ticket {
            slot: Some(Slot {
                queue: self,
                id,
                seen: None,
                running: false,
            }),
        }
    }

    /// Wait for a turn
    ///
    /// The position is reserved when the returned future is first polled.
    pub async fn turn(&self) -> Turn<'_, S> {
        self.enqueue().await
    }

    /// Number of tickets in the line, including the running one
    pub fn len(&self) -> usize {
        self.line.lock(|line| {
            let line = line.borrow();
            line.waiting + usize::from(line.running)
        })
    }

    /// True when no ticket is waiting or running
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the queue and return the guarded value
    pub fn into_inner(self) -> S {
        self.value.into_inner()
    }
}

/// Position in the line; leaving the line on drop
struct Slot<'a, S> {
    queue: &'a OperationQueue<S>,
    id: u64,
    /// Election this ticket last reported in
    seen: Option<u32>,
    running: bool,
}

impl<S> Drop for Slot<'_, S> {
    fn drop(&mut self) {
        self.queue
            .line
            .lock(|line| line.borrow_mut().leave(self.id, self.seen, self.running));
        trace!("queue: ticket {} left", self.id);
    }
}

/// A reserved position in an [`OperationQueue`]
///
/// Resolves to a [`Turn`] when every earlier ticket has finished. Dropping
/// a ticket before it resolves gives up its position.
#[must_use = "a ticket holds its place in line until dropped"]
pub struct Ticket<'a, S> {
    slot: Option<Slot<'a, S>>,
}

impl<S> Ticket<'_, S> {
    /// Ticket number, increasing in enqueue order
    pub fn id(&self) -> Option<u64> {
        self.slot.as_ref().map(|slot| slot.id)
    }
}

impl<'a, S> Future for Ticket<'a, S> {
    type Output = Turn<'a, S>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        // Polled again after completion
        let Some(slot) = this.slot.as_mut() else {
            return Poll::Pending;
        };
        let queue = slot.queue;
        let id = slot.id;

        let next = queue.line.lock(|line| {
            let mut line = line.borrow_mut();
            line.report(id, &mut slot.seen);
            let next = line.is_next(id);
            if !next {
                line.wakers.register(cx.waker());
            }
            next
        });
        if !next {
            return Poll::Pending;
        }

        // The previous turn unlocks the value before it leaves the line
        let Ok(guard) = queue.value.try_lock() else {
            cx.waker().wake_by_ref();
            return Poll::Pending;
        };
        queue.line.lock(|line| line.borrow_mut().start());
        slot.running = true;
        trace!("queue: ticket {} running", id);

        match this.slot.take() {
            Some(slot) => Poll::Ready(Turn { guard, _slot: slot }),
            None => Poll::Pending,
        }
    }
}

/// Exclusive access to the queued value
///
/// The next ticket in line runs once this is dropped.
pub struct Turn<'a, S> {
    guard: MutexGuard<'a, CriticalSectionRawMutex, S>,
    // Dropped after `guard`, so the value is unlocked before the next
    // ticket is woken
    _slot: Slot<'a, S>,
}

impl<S> Deref for Turn<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.guard
    }
}

impl<S> DerefMut for Turn<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_futures::join::{join, join3, join_array};
    use embassy_futures::select::select;
    use embassy_futures::yield_now;

    async fn record(queue: &OperationQueue<std::vec::Vec<u32>>, tag: u32, delay: usize) {
        let mut turn = queue.turn().await;
        turn.push(tag * 10);
        for _ in 0..delay {
            yield_now().await;
        }
        turn.push(tag * 10 + 1);
    }

    #[test]
    fn test_fifo_despite_latency() {
        let queue = OperationQueue::new(std::vec::Vec::new());

        block_on(join3(
            record(&queue, 1, 5),
            record(&queue, 2, 0),
            record(&queue, 3, 2),
        ));

        // No interleaving and strict enqueue order
        assert_eq!(queue.into_inner(), vec![10, 11, 20, 21, 30, 31]);
    }

    #[test]
    fn test_line_has_no_fixed_depth() {
        async fn append(queue: &OperationQueue<std::vec::Vec<usize>>, tag: usize) {
            let mut turn = queue.turn().await;
            yield_now().await;
            turn.push(tag);
        }

        let queue = OperationQueue::new(std::vec::Vec::new());
        block_on(join_array(core::array::from_fn::<_, 64, _>(|tag| {
            append(&queue, tag)
        })));

        assert_eq!(queue.into_inner(), (0..64).collect::<std::vec::Vec<_>>());
    }

    #[test]
    fn test_failure_does_not_poison() {
        let queue = OperationQueue::new(0u32);

        async fn bump(queue: &OperationQueue<u32>, fail: bool) -> Result<u32, &'static str> {
            let mut turn = queue.turn().await;
            yield_now().await;
            if fail {
                return Err("nack");
            }
            *turn += 1;
            Ok(*turn)
        }

        let (a, b, c) = block_on(join3(
            bump(&queue, false),
            bump(&queue, true),
            bump(&queue, false),
        ));
        assert_eq!(a, Ok(1));
        assert_eq!(b, Err("nack"));
        assert_eq!(c, Ok(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_ids_follow_enqueue_order() {
        let queue = OperationQueue::new(());
        let first = queue.enqueue();
        let second = queue.enqueue();
        assert_eq!(first.id(), Some(0));
        assert_eq!(second.id(), Some(1));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_dropped_ticket_leaves_line() {
        let queue = OperationQueue::new(5u8);
        let first = queue.enqueue();
        let second = queue.enqueue();
        let third = queue.enqueue();
        assert_eq!(queue.len(), 3);

        drop(second);
        assert_eq!(queue.len(), 2);

        drop(first);
        let turn = block_on(third);
        assert_eq!(*turn, 5);
        assert_eq!(queue.len(), 1);

        drop(turn);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_ticket_dropped_while_another_runs() {
        let queue = OperationQueue::new(0u8);
        let first = queue.enqueue();
        let second = queue.enqueue();
        let third = queue.enqueue();

        let turn = block_on(first);
        drop(second);
        assert_eq!(queue.len(), 2);
        drop(turn);

        let mut turn = block_on(third);
        *turn += 1;
        drop(turn);
        assert!(queue.is_empty());
        assert_eq!(queue.into_inner(), 1);
    }

    #[test]
    fn test_front_waiter_gives_up() {
        let queue = OperationQueue::new(std::vec::Vec::new());

        let holder = async {
            let mut turn = queue.turn().await;
            for _ in 0..4 {
                yield_now().await;
            }
            turn.push("holder");
        };
        // Gives up on its second poll, while still waiting
        let quitter = async {
            let _ = select(queue.turn(), yield_now()).await;
        };
        let last = async {
            queue.turn().await.push("last");
        };
        block_on(join3(holder, quitter, last));

        assert!(queue.is_empty());
        assert_eq!(queue.into_inner(), vec!["holder", "last"]);
    }

    #[test]
    fn test_waiter_runs_after_turn_released() {
        let queue = OperationQueue::new(std::vec::Vec::new());

        let holder = async {
            let mut turn = queue.turn().await;
            for _ in 0..3 {
                yield_now().await;
            }
            turn.push("first");
        };
        let waiter = async {
            let mut turn = queue.turn().await;
            turn.push("second");
        };
        block_on(join(holder, waiter));

        assert_eq!(queue.into_inner(), vec!["first", "second"]);
    }
}
