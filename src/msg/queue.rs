//! `MsgQueue`/`MsgQueueLite`: the FIFO primitives stages communicate over (`spec.md`
//! §4.3, §5).
//!
//! `MsgQueue` is the cross-thread boundary: a mutex plus a condition variable gives
//! blocking `Enqueue`/`Dequeue` semantics. `MsgQueueLite` shares the same linked-list
//! bookkeeping but has no lock, for single-threaded use only — per `spec.md` §5 it must
//! never be shared across threads, and its `Dequeue` asserts rather than blocking on an
//! empty queue.

use crate::msg::Msg;
use std::collections::{HashSet, VecDeque};
use std::sync::{Condvar, Mutex};

/// Shared enqueue/dequeue/clear bookkeeping used by both queue flavours (`SPEC_FULL.md`
/// §B.3: the source factors this into a common base so `MsgQueue` and `MsgQueueLite`
/// share splice logic instead of duplicating it).
#[derive(Default)]
struct LinkedMsgList {
    items: VecDeque<Msg>,
    in_queue: HashSet<usize>,
}

impl LinkedMsgList {
    fn push_back(&mut self, msg: Msg) {
        let id = msg.identity();
        assert!(
            self.in_queue.insert(id),
            "message enqueued while already present in this queue (double-queue, `spec.md` §4.1)"
        );
        self.items.push_back(msg);
    }

    fn push_front(&mut self, msg: Msg) {
        let id = msg.identity();
        assert!(
            self.in_queue.insert(id),
            "message enqueued while already present in this queue (double-queue, `spec.md` §4.1)"
        );
        self.items.push_front(msg);
    }

    fn pop_front(&mut self) -> Option<Msg> {
        let msg = self.items.pop_front()?;
        self.in_queue.remove(&msg.identity());
        Some(msg)
    }

    fn clear(&mut self) {
        self.items.clear();
        self.in_queue.clear();
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A blocking, cross-thread FIFO (`spec.md` §4.3, §5: "mutex + semaphore"; a condition
/// variable gives the same wake-one-waiter behaviour in safe Rust).
#[derive(Default)]
pub struct MsgQueue {
    list: Mutex<LinkedMsgList>,
    not_empty: Condvar,
}

impl MsgQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `msg` to the tail. Asserts if `msg` is already queued here.
    pub fn enqueue(&self, msg: Msg) {
        let mut list = self.list.lock().unwrap();
        list.push_back(msg);
        self.not_empty.notify_one();
    }

    /// Prepends `msg` to the head, moving it to the front of the queue once
    /// (`spec.md` §4.3 `EnqueueAtHead`).
    pub fn enqueue_at_head(&self, msg: Msg) {
        let mut list = self.list.lock().unwrap();
        list.push_front(msg);
        self.not_empty.notify_one();
    }

    /// Blocks until a message is available, then returns it.
    pub fn dequeue(&self) -> Msg {
        let mut list = self.list.lock().unwrap();
        loop {
            if let Some(msg) = list.pop_front() {
                return msg;
            }
            list = self.not_empty.wait(list).unwrap();
        }
    }

    /// Non-blocking dequeue; `None` if empty.
    pub fn try_dequeue(&self) -> Option<Msg> {
        self.list.lock().unwrap().pop_front()
    }

    pub fn clear(&self) {
        self.list.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.list.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A non-blocking, single-threaded FIFO (`spec.md` §4.3, §5). Must not be shared across
/// threads; `dequeue` on an empty queue is a programmer error.
#[derive(Default)]
pub struct MsgQueueLite {
    list: std::cell::RefCell<LinkedMsgList>,
}

impl MsgQueueLite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, msg: Msg) {
        self.list.borrow_mut().push_back(msg);
    }

    pub fn enqueue_at_head(&self, msg: Msg) {
        self.list.borrow_mut().push_front(msg);
    }

    /// Asserts the queue is non-empty (`spec.md` §4.3: "asserts on empty `Dequeue`").
    pub fn dequeue(&self) -> Msg {
        self.list
            .borrow_mut()
            .pop_front()
            .expect("MsgQueueLite::dequeue on an empty queue")
    }

    pub fn clear(&self) {
        self.list.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.list.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::pool::Pool;
    use crate::msg::types::QuitBody;

    fn quit_msg(pool: &Pool<QuitBody>) -> Msg {
        Msg::Quit(pool.allocate(|_| {}))
    }

    #[test]
    fn fifo_order_is_preserved() {
        let pool: Pool<QuitBody> = Pool::new("quit", 8);
        let q = MsgQueue::new();
        let msgs: Vec<Msg> = (0..5).map(|_| quit_msg(&pool)).collect();
        let ids: Vec<usize> = msgs.iter().map(|m| m.identity()).collect();
        for m in msgs {
            q.enqueue(m);
        }
        for expected in ids {
            assert_eq!(q.dequeue().identity(), expected);
        }
    }

    #[test]
    fn enqueue_at_head_moves_item_to_front_once() {
        let pool: Pool<QuitBody> = Pool::new("quit", 8);
        let q = MsgQueue::new();
        let a = quit_msg(&pool);
        let b = quit_msg(&pool);
        let c = quit_msg(&pool);
        let (a_id, b_id, c_id) = (a.identity(), b.identity(), c.identity());
        q.enqueue(a);
        q.enqueue(b);
        q.enqueue_at_head(c);
        assert_eq!(q.dequeue().identity(), c_id);
        assert_eq!(q.dequeue().identity(), a_id);
        assert_eq!(q.dequeue().identity(), b_id);
    }

    #[test]
    #[should_panic(expected = "double-queue")]
    fn double_enqueue_asserts() {
        let pool: Pool<QuitBody> = Pool::new("quit", 8);
        let q = MsgQueue::new();
        let msg = quit_msg(&pool);
        let dup = msg.clone();
        q.enqueue(msg);
        q.enqueue(dup);
    }

    #[test]
    fn dequeue_blocks_until_an_enqueue_wakes_it() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let pool: Pool<QuitBody> = Pool::new("quit", 2);
        let q = Arc::new(MsgQueue::new());
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.dequeue());

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        q.enqueue(quit_msg(&pool));
        handle.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "empty queue")]
    fn lite_queue_asserts_on_empty_dequeue() {
        let q = MsgQueueLite::new();
        q.dequeue();
    }
}
