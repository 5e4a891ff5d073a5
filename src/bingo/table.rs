//! Table task
//!
//! Each table is a tokio task that owns one [`Round`]. Commands arrive over
//! an mpsc channel and are answered on oneshot channels, so marking and
//! evaluation never race with a draw. The task sleeps until the round's next
//! deadline (countdown end, next draw, or settlement retry); when the task
//! exits its timers go with it.

use crate::bingo::round::{Round, RoundSettings};
use crate::bingo::types::{CardId, MarkOutcome, PlayerView, RoundSnapshot, SeatTicket, TableId};
use crate::errors::{LedgerError, RoundError, RoundResult};
use crate::events::{HallEvent, RoundEvent};
use crate::hall::HallRegistry;
use crate::ledger::types::{Money, PlayerId, RoundId, SettlementRecord};
use crate::ledger::LedgerCoordinator;
use crate::metrics::HallMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 256;

pub enum TableCommand {
    Join {
        player: PlayerId,
        reply: oneshot::Sender<RoundResult<SeatTicket>>,
    },
    Verify {
        player: PlayerId,
        reply: oneshot::Sender<RoundResult<()>>,
    },
    Revoke {
        player: PlayerId,
        reply: oneshot::Sender<RoundResult<()>>,
    },
    Mark {
        player: PlayerId,
        card_id: CardId,
        cell: usize,
        reply: oneshot::Sender<RoundResult<MarkOutcome>>,
    },
    Unmark {
        player: PlayerId,
        card_id: CardId,
        cell: usize,
        reply: oneshot::Sender<RoundResult<MarkOutcome>>,
    },
    SetAutoMark {
        player: PlayerId,
        enabled: bool,
        reply: oneshot::Sender<RoundResult<()>>,
    },
    PlayerView {
        player: PlayerId,
        reply: oneshot::Sender<RoundResult<PlayerView>>,
    },
    Snapshot {
        reply: oneshot::Sender<RoundSnapshot>,
    },
    Reset {
        reply: oneshot::Sender<RoundResult<RoundSnapshot>>,
    },
}

/// Shared dependencies of every table task
#[derive(Clone)]
pub struct TableContext {
    pub ledger: Arc<LedgerCoordinator>,
    pub registry: Arc<HallRegistry>,
    pub events: broadcast::Sender<HallEvent>,
    pub metrics: Arc<HallMetrics>,
    pub settings: RoundSettings,
    pub auto_verify: bool,
    pub settlement_retry: Duration,
}

/// Cheap, cloneable address of a running table
#[derive(Clone, Debug)]
pub struct TableHandle {
    table_id: TableId,
    round_id: RoundId,
    tier: Money,
    sender: mpsc::Sender<TableCommand>,
}

impl TableHandle {
    /// Start a table task for `tier`.
    pub fn spawn(tier: Money, seed: u64, ctx: TableContext) -> TableHandle {
        let table_id = TableId::new();
        let round = Round::new(table_id, tier, ctx.settings.clone(), seed);
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        let handle = TableHandle {
            table_id,
            round_id: round.id(),
            tier,
            sender,
        };

        ctx.metrics.active_tables.inc();
        info!("Opened table {} for tier {} (round {})", table_id, tier, round.id());
        let actor = TableActor {
            round,
            ctx,
            settle_attempts: 0,
            retry_at: None,
        };
        tokio::spawn(actor.run(receiver));
        handle
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn round_id(&self) -> RoundId {
        self.round_id
    }

    pub fn tier(&self) -> Money {
        self.tier
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> TableCommand) -> RoundResult<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(make(reply))
            .await
            .map_err(|_| RoundError::TableUnavailable(self.table_id))?;
        response
            .await
            .map_err(|_| RoundError::TableUnavailable(self.table_id))
    }

    pub async fn join(&self, player: PlayerId) -> RoundResult<SeatTicket> {
        self.request(|reply| TableCommand::Join { player, reply }).await?
    }

    pub async fn verify(&self, player: PlayerId) -> RoundResult<()> {
        self.request(|reply| TableCommand::Verify { player, reply }).await?
    }

    pub async fn revoke(&self, player: PlayerId) -> RoundResult<()> {
        self.request(|reply| TableCommand::Revoke { player, reply }).await?
    }

    pub async fn mark(&self, player: PlayerId, card_id: CardId, cell: usize) -> RoundResult<MarkOutcome> {
        self.request(|reply| TableCommand::Mark {
            player,
            card_id,
            cell,
            reply,
        })
        .await?
    }

    pub async fn unmark(&self, player: PlayerId, card_id: CardId, cell: usize) -> RoundResult<MarkOutcome> {
        self.request(|reply| TableCommand::Unmark {
            player,
            card_id,
            cell,
            reply,
        })
        .await?
    }

    pub async fn set_auto_mark(&self, player: PlayerId, enabled: bool) -> RoundResult<()> {
        self.request(|reply| TableCommand::SetAutoMark { player, enabled, reply })
            .await?
    }

    pub async fn player_view(&self, player: PlayerId) -> RoundResult<PlayerView> {
        self.request(|reply| TableCommand::PlayerView { player, reply }).await?
    }

    pub async fn snapshot(&self) -> RoundResult<RoundSnapshot> {
        self.request(|reply| TableCommand::Snapshot { reply }).await
    }

    pub async fn reset(&self) -> RoundResult<RoundSnapshot> {
        self.request(|reply| TableCommand::Reset { reply }).await?
    }
}

enum Flow {
    Continue,
    Stop,
}

struct TableActor {
    round: Round,
    ctx: TableContext,
    settle_attempts: u32,
    retry_at: Option<Instant>,
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl TableActor {
    async fn run(mut self, mut commands: mpsc::Receiver<TableCommand>) {
        loop {
            let wake = match (self.round.next_deadline(), self.retry_at) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };

            let flow = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => Flow::Stop,
                },
                _ = sleep_until_some(wake) => {
                    self.round.on_deadline(Instant::now());
                    Flow::Continue
                }
            };
            self.publish();

            if matches!(flow, Flow::Stop) || self.try_settle() {
                break;
            }
        }
        self.close();
    }

    fn handle(&mut self, command: TableCommand) -> Flow {
        let now = Instant::now();
        match command {
            TableCommand::Join { player, reply } => {
                let _ = reply.send(self.join(player, now));
            }
            TableCommand::Verify { player, reply } => {
                let _ = reply.send(self.round.verify(&player, now));
            }
            TableCommand::Revoke { player, reply } => {
                let _ = reply.send(self.round.revoke(&player));
            }
            TableCommand::Mark {
                player,
                card_id,
                cell,
                reply,
            } => {
                let _ = reply.send(self.round.mark(&player, card_id, cell));
            }
            TableCommand::Unmark {
                player,
                card_id,
                cell,
                reply,
            } => {
                let _ = reply.send(self.round.unmark(&player, card_id, cell));
            }
            TableCommand::SetAutoMark { player, enabled, reply } => {
                let _ = reply.send(self.round.set_auto_mark(&player, enabled));
            }
            TableCommand::PlayerView { player, reply } => {
                let _ = reply.send(self.round.player_view(&player));
            }
            TableCommand::Snapshot { reply } => {
                let _ = reply.send(self.round.snapshot(now));
            }
            TableCommand::Reset { reply } => {
                // A decided round is torn down only after its ledger commit.
                if let Some(pending) = self.round.settlement_request() {
                    warn!(
                        "Refusing reset of table {}: round {} awaits settlement (winner {:?}, prize {})",
                        self.round.table_id(),
                        self.round.id(),
                        pending.winner.as_ref().map(|w| w.player.as_str()),
                        pending.prize_pool
                    );
                    let _ = reply.send(Err(RoundError::SettlementPending(self.round.id())));
                    return Flow::Continue;
                }
                let unsettled = self.round.seat_count();
                warn!(
                    "Resetting table {} (round {}); {} seats forfeit their stakes",
                    self.round.table_id(),
                    self.round.id(),
                    unsettled
                );
                let _ = reply.send(Ok(self.round.snapshot(now)));
                self.ctx.metrics.rounds_reset.inc();
                self.emit(RoundEvent::TableReset);
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Debit first, seat second. A seated player gets their ticket back
    /// without touching the wallet.
    fn join(&mut self, player: PlayerId, now: Instant) -> RoundResult<SeatTicket> {
        if self.round.is_seated(&player) {
            debug!("{} already seated at table {}", player, self.round.table_id());
            return self.round.ticket(&player);
        }
        self.round.check_joinable(&player)?;
        self.ctx
            .ledger
            .debit_stake(&player, &self.round.id(), self.round.tier())?;

        let ticket = self.round.seat(player.clone())?;
        if self.ctx.auto_verify {
            self.round.verify(&player, now)?;
            return self.round.ticket(&player);
        }
        Ok(ticket)
    }

    /// Try to settle a decided round. Returns `true` once it is settled.
    fn try_settle(&mut self) -> bool {
        let Some(request) = self.round.settlement_request() else {
            return false;
        };
        let now = Instant::now();
        if self.retry_at.is_some_and(|at| now < at) {
            return false;
        }

        // A previous attempt may have committed before failing to answer.
        if self.settle_attempts > 0 {
            if let Ok(Some(record)) = self.ctx.ledger.settlement(&request.round_id) {
                self.finish(&record);
                return true;
            }
        }
        self.settle_attempts += 1;

        let result = match self.ctx.ledger.settle_round(&request) {
            Err(LedgerError::AlreadySettled(round_id)) => match self.ctx.ledger.settlement(&round_id) {
                Ok(Some(record)) => Ok(record),
                Ok(None) => Err(LedgerError::AlreadySettled(round_id)),
                Err(e) => Err(e),
            },
            other => other,
        };

        match result {
            Ok(record) => {
                self.finish(&record);
                true
            }
            Err(e) => {
                if e.is_transient() {
                    warn!("Settlement of round {} failed, retrying: {}", request.round_id, e);
                } else {
                    error!("Settlement of round {} failed: {}", request.round_id, e);
                }
                self.ctx.metrics.settlement_retries.inc();
                self.retry_at = Some(now + self.ctx.settlement_retry);
                self.emit(RoundEvent::SettlementDelayed { reason: e.to_string() });
                false
            }
        }
    }

    fn finish(&mut self, record: &SettlementRecord) {
        self.round.complete_settlement(record);
        self.retry_at = None;
        self.ctx.metrics.rounds_settled.inc();
        self.publish();
    }

    fn emit(&self, event: RoundEvent) {
        // No subscribers is fine.
        let _ = self.ctx.events.send(HallEvent {
            table_id: self.round.table_id(),
            round_id: self.round.id(),
            tier: self.round.tier(),
            event,
        });
    }

    fn publish(&mut self) {
        for event in self.round.take_events() {
            match &event {
                RoundEvent::DrawingStarted { .. } => {
                    self.ctx.metrics.rounds_started.inc();
                    let table_id = self.round.table_id();
                    self.ctx
                        .registry
                        .open
                        .remove_if(&self.round.tier(), |_, open| *open == table_id);
                }
                RoundEvent::NumberDrawn { .. } => self.ctx.metrics.numbers_drawn.inc(),
                _ => {}
            }
            self.emit(event);
        }
    }

    /// Drop every registry entry that points at this table.
    fn close(self) {
        let table_id = self.round.table_id();
        let registry = &self.ctx.registry;
        registry.tables.remove(&table_id);
        registry
            .open
            .remove_if(&self.round.tier(), |_, open| *open == table_id);
        for player in self.round.players() {
            registry.seats.remove_if(player, |_, seated| *seated == table_id);
        }
        self.ctx.metrics.active_tables.dec();
        info!("Closed table {} (round {})", table_id, self.round.id());
    }
}
