// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use crate::domain::cache::ReputationCache;
use crate::domain::errors::ProviderError;
use crate::domain::lookups::engine::ScanEngine;
use crate::domain::models::{LookupMode, LookupOutcome, LookupResults};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub enum AnalyserMessage {
    AnalyseUrl(String),
    RecordOutcome(LookupOutcome),
    AggregateResults(RpcReplyPort<LookupResults>),
}

pub struct AnalyserArguments {
    expected: usize,
    mode: LookupMode,
    cancellation: CancellationToken,
}

pub struct AnalyserState {
    expected: usize,
    mode: LookupMode,
    cancellation: CancellationToken,
    outcomes: Vec<LookupOutcome>,
    pending_reply: Option<RpcReplyPort<LookupResults>>,
}

/// Fans lookups out, one task per URL, and gathers every outcome, failed ones included.
pub struct UrlRepAnalyser {
    engine: Arc<ScanEngine>,
}

impl UrlRepAnalyser {
    pub fn new(engine: Arc<ScanEngine>) -> Self {
        Self { engine }
    }

    pub fn cache(&self) -> Arc<ReputationCache> {
        self.engine.cache()
    }

    pub async fn analyse_urls(
        self,
        urls: Vec<String>,
        mode: LookupMode,
        cancellation: CancellationToken,
    ) -> anyhow::Result<LookupResults> {
        let arguments = AnalyserArguments {
            expected: urls.len(),
            mode,
            cancellation,
        };

        let (actor, handle) = Actor::spawn(None, self, arguments).await?;

        for url in urls {
            actor.cast(AnalyserMessage::AnalyseUrl(url))?
        }

        let results = ractor::call!(actor, AnalyserMessage::AggregateResults)?;
        handle.await?;
        Ok(results)
    }

    fn reply_when_done(myself: &ActorRef<AnalyserMessage>, state: &mut AnalyserState) {
        if state.outcomes.len() < state.expected {
            return;
        }

        let Some(reply) = state.pending_reply.take() else {
            return;
        };

        log::info!("[urlrep.actor] computing aggregated results for {} URLs", state.expected);
        let results = LookupResults::new(std::mem::take(&mut state.outcomes));

        if reply.send(results).is_err() {
            log::error!("[urlrep.actor] cannot reply with results");
        }

        myself.stop(None);
    }
}

impl Actor for UrlRepAnalyser {
    type Msg = AnalyserMessage;
    type State = AnalyserState;
    type Arguments = AnalyserArguments;

    async fn pre_start(
        &self,
        _: ActorRef<Self::Msg>,
        arguments: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(AnalyserState {
            expected: arguments.expected,
            mode: arguments.mode,
            cancellation: arguments.cancellation,
            outcomes: Vec::with_capacity(arguments.expected),
            pending_reply: None,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            AnalyserMessage::AnalyseUrl(url) => {
                log::info!("[urlrep.actor] starting lookup for {}", url);

                let engine = self.engine.clone();
                let mode = state.mode;
                let cancellation = state.cancellation.clone();
                let lookup_url = url.clone();

                let lookup = tokio::spawn(async move { engine.execute(&lookup_url, mode, &cancellation).await });

                tokio::spawn(async move {
                    let outcome = lookup.await.unwrap_or_else(|incoming| {
                        Err(ProviderError::server(0, format!("lookup task crashed : {}", incoming)))
                    });

                    log::info!("[urlrep.actor] finished lookup for {}", url);

                    if myself.cast(AnalyserMessage::RecordOutcome((url, outcome))).is_err() {
                        log::error!("[urlrep.actor] cannot record lookup outcome");
                    }
                });
            },
            AnalyserMessage::RecordOutcome(outcome) => {
                state.outcomes.push(outcome);
                Self::reply_when_done(&myself, state);
            },
            AnalyserMessage::AggregateResults(reply) => {
                state.pending_reply = Some(reply);
                Self::reply_when_done(&myself, state);
            },
        }

        Ok(())
    }
}
