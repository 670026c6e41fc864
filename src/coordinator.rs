/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The request coordinator: the single logical writer over the chain.
//!
//! Every state-mutating operation — submission, mining, pause/resume, snapshot/revert, time
//! control — is sent to the coordinator thread as a [`Request`] and runs to completion
//! before the next request starts. Requests are served strictly FIFO, which is what gives
//! the chain its ordering guarantees: pool insertions apply in completion order, blocks are
//! produced in strictly increasing number order, and the checkpoint stack only ever belongs
//! to one in-flight operation. Read-only historical queries do not pass through here; they
//! run concurrently through the [`ChainCamera`](crate::chain::ChainCamera).

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::chain::{Blockchain, ChainError, MineCapacity, MineSummary};
use crate::config::SubmissionMode;
use crate::consensus::ConsensusSeal;
use crate::engine::ExecutionEngine;
use crate::pool::Admission;
use crate::state::kv_store::KVStore;
use crate::types::basic::{CryptoHash, SnapshotId, Timestamp};
use crate::types::transaction::Transaction;

pub(crate) enum Request {
    SubmitTransaction {
        tx: Transaction,
        reply: Sender<Result<CryptoHash, ChainError>>,
    },
    FindTransaction {
        hash: CryptoHash,
        reply: Sender<Result<Option<Transaction>, ChainError>>,
    },
    Mine {
        capacity: MineCapacity,
        timestamp: Option<Timestamp>,
        only_one_block: bool,
        reply: Sender<Result<MineSummary, ChainError>>,
    },
    Pause {
        reply: Sender<()>,
    },
    Resume {
        reply: Sender<()>,
    },
    Snapshot {
        reply: Sender<SnapshotId>,
    },
    RevertTo {
        id: SnapshotId,
        reply: Sender<Result<(), ChainError>>,
    },
    SetNextTimestamp {
        timestamp: Timestamp,
        reply: Sender<()>,
    },
    IncreaseTime {
        seconds: u64,
        reply: Sender<u64>,
    },
    ClearPool {
        reply: Sender<()>,
    },
}

pub(crate) struct Coordinator<K: KVStore, E: ExecutionEngine<K>, S: ConsensusSeal> {
    chain: Blockchain<K>,
    engine: E,
    seal: S,
    submission_mode: SubmissionMode,
    automine: bool,
    requests: Receiver<Request>,
    drain: Receiver<()>,
    shutdown: Receiver<()>,
}

impl<K: KVStore, E: ExecutionEngine<K>, S: ConsensusSeal> Coordinator<K, E, S> {
    pub(crate) fn new(
        chain: Blockchain<K>,
        engine: E,
        seal: S,
        submission_mode: SubmissionMode,
        automine: bool,
        requests: Receiver<Request>,
        drain: Receiver<()>,
        shutdown: Receiver<()>,
    ) -> Coordinator<K, E, S> {
        Coordinator {
            chain,
            engine,
            seal,
            submission_mode,
            automine,
            requests,
            drain,
            shutdown,
        }
    }

    /// Start the coordinator thread. It serves requests FIFO until told to shut down.
    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || loop {
            match self.shutdown.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    panic!("coordinator thread disconnected from main thread")
                }
            }

            match self.requests.recv_timeout(Duration::from_millis(10)) {
                Ok(request) => self.handle(request),
                Err(RecvTimeoutError::Timeout) => self.drain_signals(),
                Err(RecvTimeoutError::Disconnected) => return,
            }
        })
    }

    /// Consume accumulated drain signals from the pool. With automine on, work that became
    /// executable outside a submission (a promoted future transaction, a resume with waiting
    /// work) triggers block production here.
    fn drain_signals(&mut self) {
        let mut signalled = false;
        while self.drain.try_recv().is_ok() {
            signalled = true;
        }
        if signalled
            && self.automine
            && !self.chain.is_paused()
            && self.chain.pool().has_executable()
        {
            let _ = self.chain.mine(
                &mut self.engine,
                &self.seal,
                MineCapacity::FillBlock,
                None,
                false,
            );
        }
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::SubmitTransaction { tx, reply } => {
                let admitted = self.chain.submit_transaction(tx);
                match self.submission_mode {
                    SubmissionMode::Strict => {
                        // Inclusion before reply: the submitter learns the hash of a mined
                        // transaction.
                        if let Ok((_, Admission::Executable)) = &admitted {
                            if !self.chain.is_paused() {
                                let _ = self.chain.mine(
                                    &mut self.engine,
                                    &self.seal,
                                    MineCapacity::FillBlock,
                                    None,
                                    true,
                                );
                            }
                        }
                        let _ = reply.send(admitted.map(|(hash, _)| hash));
                    }
                    SubmissionMode::Eager => {
                        let mine_now = self.automine
                            && !self.chain.is_paused()
                            && matches!(&admitted, Ok((_, Admission::Executable)));
                        let _ = reply.send(admitted.map(|(hash, _)| hash));
                        if mine_now {
                            let _ = self.chain.mine(
                                &mut self.engine,
                                &self.seal,
                                MineCapacity::FillBlock,
                                None,
                                true,
                            );
                        }
                    }
                }
            }
            Request::FindTransaction { hash, reply } => {
                let _ = reply.send(self.chain.find_transaction(&hash));
            }
            Request::Mine {
                capacity,
                timestamp,
                only_one_block,
                reply,
            } => {
                let _ = reply.send(self.chain.mine(
                    &mut self.engine,
                    &self.seal,
                    capacity,
                    timestamp,
                    only_one_block,
                ));
            }
            Request::Pause { reply } => {
                self.chain.pause();
                let _ = reply.send(());
            }
            Request::Resume { reply } => {
                self.chain.resume();
                let _ = reply.send(());
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.chain.snapshot());
            }
            Request::RevertTo { id, reply } => {
                let _ = reply.send(self.chain.revert_to(id));
            }
            Request::SetNextTimestamp { timestamp, reply } => {
                self.chain.set_next_timestamp(timestamp);
                let _ = reply.send(());
            }
            Request::IncreaseTime { seconds, reply } => {
                let _ = reply.send(self.chain.increase_time(seconds));
            }
            Request::ClearPool { reply } => {
                self.chain.clear_pool();
                let _ = reply.send(());
            }
        }
    }
}
