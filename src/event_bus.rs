use crate::events::*;
use crate::logging::Logger;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::TryRecvError;
use std::thread;
use std::thread::JoinHandle;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

pub(crate) struct EventHandlers {
    pub(crate) submit_transaction_handlers: Vec<HandlerPtr<SubmitTransactionEvent>>,
    pub(crate) transaction_ready_handlers: Vec<HandlerPtr<TransactionReadyEvent>>,
    pub(crate) add_transaction_handlers: Vec<HandlerPtr<AddTransactionEvent>>,
    pub(crate) prune_transactions_handlers: Vec<HandlerPtr<PruneTransactionsEvent>>,
    pub(crate) mine_block_handlers: Vec<HandlerPtr<MineBlockEvent>>,
    pub(crate) snapshot_handlers: Vec<HandlerPtr<SnapshotEvent>>,
    pub(crate) revert_handlers: Vec<HandlerPtr<RevertEvent>>,
    pub(crate) pause_handlers: Vec<HandlerPtr<PauseEvent>>,
    pub(crate) resume_handlers: Vec<HandlerPtr<ResumeEvent>>,
}

impl EventHandlers {
    /// Collect the registered handlers of every event type, prepending the default logging
    /// handler of each type if `log_events` is set.
    pub(crate) fn new(
        log_events: bool,
        on_submit_transaction: Option<HandlerPtr<SubmitTransactionEvent>>,
        on_transaction_ready: Option<HandlerPtr<TransactionReadyEvent>>,
        on_add_transaction: Option<HandlerPtr<AddTransactionEvent>>,
        on_prune_transactions: Option<HandlerPtr<PruneTransactionsEvent>>,
        on_mine_block: Option<HandlerPtr<MineBlockEvent>>,
        on_snapshot: Option<HandlerPtr<SnapshotEvent>>,
        on_revert: Option<HandlerPtr<RevertEvent>>,
        on_pause: Option<HandlerPtr<PauseEvent>>,
        on_resume: Option<HandlerPtr<ResumeEvent>>,
    ) -> EventHandlers {
        fn collect<T: Logger>(log_events: bool, registered: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
            let mut handlers = Vec::new();
            if log_events {
                handlers.push(T::get_logger());
            }
            if let Some(handler) = registered {
                handlers.push(handler);
            }
            handlers
        }

        EventHandlers {
            submit_transaction_handlers: collect(log_events, on_submit_transaction),
            transaction_ready_handlers: collect(log_events, on_transaction_ready),
            add_transaction_handlers: collect(log_events, on_add_transaction),
            prune_transactions_handlers: collect(log_events, on_prune_transactions),
            mine_block_handlers: collect(log_events, on_mine_block),
            snapshot_handlers: collect(log_events, on_snapshot),
            revert_handlers: collect(log_events, on_revert),
            pause_handlers: collect(log_events, on_pause),
            resume_handlers: collect(log_events, on_resume),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.submit_transaction_handlers.is_empty()
            && self.transaction_ready_handlers.is_empty()
            && self.add_transaction_handlers.is_empty()
            && self.prune_transactions_handlers.is_empty()
            && self.mine_block_handlers.is_empty()
            && self.snapshot_handlers.is_empty()
            && self.revert_handlers.is_empty()
            && self.pause_handlers.is_empty()
            && self.resume_handlers.is_empty()
    }

    pub fn fire_handlers(&self, event: Event) {
        match event {
            Event::SubmitTransaction(submit_transaction_event) => self
                .submit_transaction_handlers
                .iter()
                .for_each(|handler| handler(&submit_transaction_event)),

            Event::TransactionReady(transaction_ready_event) => self
                .transaction_ready_handlers
                .iter()
                .for_each(|handler| handler(&transaction_ready_event)),

            Event::AddTransaction(add_transaction_event) => self
                .add_transaction_handlers
                .iter()
                .for_each(|handler| handler(&add_transaction_event)),

            Event::PruneTransactions(prune_transactions_event) => self
                .prune_transactions_handlers
                .iter()
                .for_each(|handler| handler(&prune_transactions_event)),

            Event::MineBlock(mine_block_event) => self
                .mine_block_handlers
                .iter()
                .for_each(|handler| handler(&mine_block_event)),

            Event::Snapshot(snapshot_event) => self
                .snapshot_handlers
                .iter()
                .for_each(|handler| handler(&snapshot_event)),

            Event::Revert(revert_event) => self
                .revert_handlers
                .iter()
                .for_each(|handler| handler(&revert_event)),

            Event::Pause(pause_event) => self
                .pause_handlers
                .iter()
                .for_each(|handler| handler(&pause_event)),

            Event::Resume(resume_event) => self
                .resume_handlers
                .iter()
                .for_each(|handler| handler(&resume_event)),
        }
    }
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        if let Ok(event) = event_subscriber.try_recv() {
            event_handlers.fire_handlers(event)
        }
    })
}
