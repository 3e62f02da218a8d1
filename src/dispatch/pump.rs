//! A per-thread message pump: blocks on a queue and recognises three
//! messages (`CALLABLE`, `ASYNC_CALLABLE`, `QUIT`).

use std::sync::mpsc;
use std::thread::ThreadId;

use crate::dispatch::{AsyncCallable, Callable, Dispatcher};

pub(crate) enum Message {
    Callable(Callable),
    AsyncCallable(Box<dyn AsyncCallable>),
    Quit,
}

/// The sending half of a pump's queue, handed to the [`Dispatcher`] so other
/// threads can post to this one.
pub(crate) type PumpSender = mpsc::Sender<Message>;

/// Owns the receiving half of one thread's queue and runs its pump loop.
pub struct MessagePump {
    thread_id: ThreadId,
    rx: mpsc::Receiver<Message>,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for MessagePump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePump")
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

impl MessagePump {
    pub(crate) fn new(
        thread_id: ThreadId,
        rx: mpsc::Receiver<Message>,
        dispatcher: Dispatcher,
    ) -> MessagePump {
        MessagePump {
            thread_id,
            rx,
            dispatcher,
        }
    }

    /// Block processing messages until `QUIT` is received. On `QUIT`,
    /// drains whatever is already queued — running any `CALLABLE`s found —
    /// before returning, rather than leaking them: every chain must still
    /// terminate even if its thread is shutting down underneath it.
    pub fn run(self) {
        log::trace!("({:?}) message pump starting", self.thread_id);
        loop {
            match self.rx.recv() {
                Ok(Message::Callable(c)) => c.invoke(),
                Ok(Message::AsyncCallable(mut a)) => {
                    a.on_enter(self.dispatcher.clone());
                    // `a` may have posted `QUIT` to itself from inside
                    // `on_enter` already (a task that resolves
                    // synchronously); the loop notices on its next recv.
                }
                Ok(Message::Quit) => break,
                Err(_) => {
                    log::warn!(
                        "({:?}) message pump's dispatcher was dropped without QUIT",
                        self.thread_id
                    );
                    break;
                }
            }
        }
        self.drain();
        crate::registry::teardown_current_thread();
        log::trace!("({:?}) message pump stopped", self.thread_id);
    }

    fn drain(&self) {
        while let Ok(message) = self.rx.try_recv() {
            match message {
                Message::Callable(c) => c.invoke(),
                Message::AsyncCallable(mut a) => {
                    // An async callable arriving after QUIT cannot be
                    // entered on this (now-stopping) thread; tell it so it
                    // can release whatever it would otherwise have held.
                    a.on_terminated();
                }
                Message::Quit => {}
            }
        }
    }
}
