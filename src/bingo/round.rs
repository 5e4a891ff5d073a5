//! Round state machine
//!
//! `Waiting -> Countdown -> InProgress -> Settled`. A [`Round`] is plain data
//! mutated by its owning table task; every method takes the current instant
//! instead of reading a clock so the machine can be driven step by step.
//! Events produced along the way are buffered and drained with
//! [`Round::take_events`].

use crate::bingo::caller::{CallerState, NumberCaller};
use crate::bingo::card::{card_seed, column_letter, Card, CELL_COUNT, FREE_INDEX};
use crate::bingo::patterns::winning_pattern;
use crate::bingo::types::{
    CardId, CardView, CellSet, MarkOutcome, PlayerRoundId, PlayerView, RoundPhase, RoundSnapshot,
    SeatTicket, TableId, Verification,
};
use crate::errors::{RoundError, RoundResult};
use crate::events::RoundEvent;
use crate::ledger::types::{Money, PlayerId, RoundId, SettlementRecord, SettlementRequest, WinnerRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Tunables a round is created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSettings {
    pub min_players: usize,
    pub max_players: usize,
    pub countdown: Duration,
    pub draw_interval: Duration,
    pub cards_per_player: u8,
    pub commission_bps: u32,
    pub auto_mark_default: bool,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            min_players: 5,
            max_players: 200,
            countdown: Duration::from_secs(60),
            draw_interval: Duration::from_secs(4),
            cards_per_player: 2,
            commission_bps: 3_000,
            auto_mark_default: false,
        }
    }
}

/// Split of the Active stakes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolSummary {
    pub total_stake: Money,
    pub prize_pool: Money,
    pub commission: Money,
}

impl PoolSummary {
    pub fn compute(total_stake: Money, commission_bps: u32) -> Self {
        let prize_pool = total_stake.share_bps(10_000u32.saturating_sub(commission_bps));
        Self {
            total_stake,
            prize_pool,
            commission: total_stake.saturating_sub(prize_pool),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Countdown { ends_at: Instant },
    InProgress,
    Settled,
}

#[derive(Debug, Clone)]
struct PlayCard {
    id: CardId,
    card: Card,
    marks: CellSet,
}

impl PlayCard {
    fn view(&self) -> CardView {
        CardView {
            card_id: self.id,
            card: self.card.clone(),
            marked: self.marks.iter().collect(),
        }
    }
}

/// A player's seat in this round
#[derive(Debug, Clone)]
struct PlayerRound {
    id: PlayerRoundId,
    player: PlayerId,
    stake: Money,
    verification: Verification,
    admission_seq: Option<u64>,
    cards: Vec<PlayCard>,
    auto_mark: bool,
}

impl PlayerRound {
    fn is_active(&self) -> bool {
        self.verification == Verification::Active
    }
}

pub struct Round {
    id: RoundId,
    table_id: TableId,
    tier: Money,
    seed: u64,
    settings: RoundSettings,
    phase: Phase,
    seats: Vec<PlayerRound>,
    next_admission: u64,
    caller: NumberCaller,
    frozen_pool: Option<PoolSummary>,
    decided: Option<Option<WinnerRecord>>,
    events: Vec<RoundEvent>,
}

fn caller_seed(round_seed: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"bingohall:caller");
    hasher.update(round_seed.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

impl Round {
    pub fn new(table_id: TableId, tier: Money, settings: RoundSettings, seed: u64) -> Self {
        let caller = NumberCaller::new(caller_seed(seed), settings.draw_interval);
        Self {
            id: RoundId::new(),
            table_id,
            tier,
            seed,
            settings,
            phase: Phase::Waiting,
            seats: Vec::new(),
            next_admission: 0,
            caller,
            frozen_pool: None,
            decided: None,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> RoundId {
        self.id
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn tier(&self) -> Money {
        self.tier
    }

    pub fn phase(&self) -> RoundPhase {
        match self.phase {
            Phase::Waiting => RoundPhase::Waiting,
            Phase::Countdown { .. } => RoundPhase::Countdown,
            Phase::InProgress => RoundPhase::InProgress,
            Phase::Settled => RoundPhase::Settled,
        }
    }

    pub fn caller(&self) -> &NumberCaller {
        &self.caller
    }

    pub fn admitted(&self) -> usize {
        self.seats.iter().filter(|s| s.is_active()).count()
    }

    pub fn seat_count(&self) -> usize {
        self.seats.len()
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerId> {
        self.seats.iter().map(|s| &s.player)
    }

    pub fn is_seated(&self, player: &PlayerId) -> bool {
        self.seats.iter().any(|s| &s.player == player)
    }

    /// Live split before drawing starts, frozen split afterwards.
    pub fn pool(&self) -> PoolSummary {
        self.frozen_pool.unwrap_or_else(|| {
            let total = self
                .seats
                .iter()
                .filter(|s| s.is_active())
                .map(|s| s.stake)
                .sum();
            PoolSummary::compute(total, self.settings.commission_bps)
        })
    }

    pub fn take_events(&mut self) -> Vec<RoundEvent> {
        std::mem::take(&mut self.events)
    }

    /// Earliest instant at which [`Round::on_deadline`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.decided.is_some() {
            return None;
        }
        match self.phase {
            Phase::Countdown { ends_at } => Some(ends_at),
            Phase::InProgress => self.caller.next_draw_at(),
            Phase::Waiting | Phase::Settled => None,
        }
    }

    /// Check whether a new seat can be taken, before any money moves.
    pub fn check_joinable(&self, player: &PlayerId) -> RoundResult<()> {
        if !self.phase().accepts_joins() {
            return Err(RoundError::RoundClosed);
        }
        if !self.is_seated(player) && self.seats.len() >= self.settings.max_players {
            return Err(RoundError::TableFull);
        }
        Ok(())
    }

    /// Ticket for a player already seated here.
    pub fn ticket(&self, player: &PlayerId) -> RoundResult<SeatTicket> {
        let seat = self.find_seat(player)?;
        Ok(self.ticket_for(seat))
    }

    /// Seat a player whose stake has been debited. Cards are dealt here.
    pub fn seat(&mut self, player: PlayerId) -> RoundResult<SeatTicket> {
        if self.is_seated(&player) {
            return self.ticket(&player);
        }
        self.check_joinable(&player)?;

        let seat_index = self.seats.len() as u32;
        let cards = (0..self.settings.cards_per_player)
            .map(|i| PlayCard {
                id: CardId(i),
                card: Card::from_seed(card_seed(self.seed, seat_index, i)),
                marks: CellSet::with_free(),
            })
            .collect();

        let seat = PlayerRound {
            id: PlayerRoundId::new(),
            player: player.clone(),
            stake: self.tier,
            verification: Verification::Waiting,
            admission_seq: None,
            cards,
            auto_mark: self.settings.auto_mark_default,
        };
        let ticket = self.ticket_for(&seat);
        self.seats.push(seat);

        debug!("Seated {} at table {} (round {})", player, self.table_id, self.id);
        self.events.push(RoundEvent::PlayerSeated {
            player,
            verification: Verification::Waiting,
        });
        Ok(ticket)
    }

    /// Waiting -> Active. Reaching the minimum starts the countdown; a
    /// player verified while drawing is admitted without growing the pool.
    pub fn verify(&mut self, player: &PlayerId, now: Instant) -> RoundResult<()> {
        if self.decided.is_some() || self.phase == Phase::Settled {
            return Err(RoundError::RoundClosed);
        }
        let admission = self.next_admission;
        let drawing = self.phase == Phase::InProgress;
        let drawn = self.caller.drawn().to_vec();

        let seat = self.find_seat_mut(player)?;
        if seat.is_active() {
            return Err(RoundError::AlreadyVerified(player.clone()));
        }
        seat.verification = Verification::Active;
        seat.admission_seq = Some(admission);
        if drawing && seat.auto_mark {
            catch_up(seat, &drawn);
        }
        self.next_admission += 1;

        let admitted = self.admitted();
        info!("Player {} verified at table {} ({} admitted)", player, self.table_id, admitted);
        self.events.push(RoundEvent::PlayerVerified {
            player: player.clone(),
            admitted,
        });

        match self.phase {
            Phase::Waiting if admitted >= self.settings.min_players => {
                let ends_at = now + self.settings.countdown;
                self.phase = Phase::Countdown { ends_at };
                info!("Countdown started at table {}", self.table_id);
                self.events.push(RoundEvent::CountdownStarted {
                    ends_in_ms: self.settings.countdown.as_millis() as u64,
                });
            }
            Phase::InProgress => self.evaluate(),
            _ => {}
        }
        Ok(())
    }

    /// Active -> Waiting, only before drawing starts.
    pub fn revoke(&mut self, player: &PlayerId) -> RoundResult<()> {
        if !self.phase().accepts_joins() {
            return Err(RoundError::RoundClosed);
        }
        let seat = self.find_seat_mut(player)?;
        if !seat.is_active() {
            return Err(RoundError::NotVerified(player.clone()));
        }
        seat.verification = Verification::Waiting;
        seat.admission_seq = None;

        let admitted = self.admitted();
        info!("Verification revoked for {} at table {}", player, self.table_id);
        self.events.push(RoundEvent::VerificationRevoked {
            player: player.clone(),
            admitted,
        });

        if matches!(self.phase, Phase::Countdown { .. }) && admitted < self.settings.min_players {
            self.phase = Phase::Waiting;
            info!("Countdown aborted at table {}", self.table_id);
            self.events.push(RoundEvent::CountdownAborted { admitted });
        }
        Ok(())
    }

    /// Fire whatever timer is due at `now`.
    pub fn on_deadline(&mut self, now: Instant) {
        if self.decided.is_some() {
            return;
        }
        match self.phase {
            Phase::Countdown { ends_at } if now >= ends_at => self.start_drawing(now),
            Phase::InProgress => {
                if self.caller.next_draw_at().is_some_and(|at| now >= at) {
                    self.draw_next(now);
                }
            }
            _ => {}
        }
    }

    /// Countdown -> InProgress. Freezes the pool and schedules the first draw.
    pub fn start_drawing(&mut self, now: Instant) {
        if !matches!(self.phase, Phase::Countdown { .. } | Phase::Waiting) {
            return;
        }
        let pool = self.pool();
        self.frozen_pool = Some(pool);
        self.phase = Phase::InProgress;
        self.caller.start(now);

        let admitted = self.admitted();
        info!(
            "Round {} drawing at table {}: {} players, pool {} (stake {})",
            self.id, self.table_id, admitted, pool.prize_pool, pool.total_stake
        );
        self.events.push(RoundEvent::DrawingStarted {
            admitted,
            total_stake: pool.total_stake,
            prize_pool: pool.prize_pool,
        });
    }

    /// Draw one number, auto-mark, and evaluate every Active card.
    pub fn draw_next(&mut self, now: Instant) -> Option<u8> {
        if self.phase != Phase::InProgress || self.decided.is_some() {
            return None;
        }
        let number = self.caller.draw(now)?;
        let sequence = self.caller.drawn().len();
        debug!("Table {} drew {} ({}/75)", self.table_id, number, sequence);
        self.events.push(RoundEvent::NumberDrawn {
            number,
            letter: column_letter(number).unwrap_or('?'),
            sequence,
        });

        for seat in self.seats.iter_mut().filter(|s| s.is_active() && s.auto_mark) {
            for card in seat.cards.iter_mut() {
                if let Some(index) = card.card.position_of(number) {
                    card.marks.insert(index);
                }
            }
        }

        self.evaluate();
        if self.decided.is_none() && self.caller.state() == CallerState::Exhausted {
            info!("Round {} exhausted the pool without a winner", self.id);
            self.decided = Some(None);
            self.events.push(RoundEvent::PoolExhausted);
        }
        Some(number)
    }

    pub fn mark(&mut self, player: &PlayerId, card_id: CardId, cell: usize) -> RoundResult<MarkOutcome> {
        self.check_markable(player, cell)?;
        let drawn = self.caller.drawn_set();
        let card = self.card_mut(player, card_id)?;

        if cell != FREE_INDEX {
            let number = card.card.number_at(cell).ok_or(RoundError::CellOutOfRange(cell))?;
            if !drawn.contains(number) {
                return Err(RoundError::NumberNotCalled(number));
            }
            card.marks.insert(cell);
        }
        let bingo = winning_pattern(&card.card, card.marks, drawn).is_some();

        if bingo {
            self.evaluate();
        }
        Ok(MarkOutcome {
            card_id,
            cell,
            marked: true,
            bingo,
        })
    }

    pub fn unmark(&mut self, player: &PlayerId, card_id: CardId, cell: usize) -> RoundResult<MarkOutcome> {
        if cell == FREE_INDEX {
            return Err(RoundError::FreeCellLocked);
        }
        self.check_markable(player, cell)?;
        let card = self.card_mut(player, card_id)?;
        card.marks.remove(cell);
        Ok(MarkOutcome {
            card_id,
            cell,
            marked: false,
            bingo: false,
        })
    }

    /// Toggle auto-marking. Turning it on while drawing marks every number
    /// already called.
    pub fn set_auto_mark(&mut self, player: &PlayerId, enabled: bool) -> RoundResult<()> {
        let drawing = self.phase == Phase::InProgress && self.decided.is_none();
        let drawn = self.caller.drawn().to_vec();
        let seat = self.find_seat_mut(player)?;
        seat.auto_mark = enabled;
        if enabled && drawing && seat.is_active() {
            catch_up(seat, &drawn);
            self.evaluate();
        }
        Ok(())
    }

    /// Stakes debited for seats that never made it into the pool.
    pub fn forfeited_stake(&self) -> Money {
        let seated: Money = self.seats.iter().map(|s| s.stake).sum();
        seated.saturating_sub(self.pool().total_stake)
    }

    /// Settlement to hand to the ledger once the round is decided.
    pub fn settlement_request(&self) -> Option<SettlementRequest> {
        if self.phase == Phase::Settled {
            return None;
        }
        let winner = self.decided.clone()?;
        let pool = self.pool();
        Some(SettlementRequest {
            round_id: self.id,
            table_id: self.table_id,
            tier: self.tier,
            winner,
            total_stake: pool.total_stake,
            prize_pool: pool.prize_pool,
            forfeited_stake: self.forfeited_stake(),
            drawn_numbers: self.caller.drawn().to_vec(),
            caller_state: self.caller.state(),
        })
    }

    /// InProgress -> Settled, after the ledger committed `record`.
    pub fn complete_settlement(&mut self, record: &SettlementRecord) {
        if self.phase == Phase::Settled {
            return;
        }
        self.phase = Phase::Settled;
        let prize = if record.winner.is_some() {
            record.prize_pool
        } else {
            Money::ZERO
        };
        info!(
            "Round {} settled at table {}: winner {:?}, prize {}",
            self.id,
            self.table_id,
            record.winner.as_ref().map(|w| w.player.as_str()),
            prize
        );
        self.events.push(RoundEvent::RoundSettled {
            winner: record.winner.as_ref().map(|w| w.player.clone()),
            prize,
            commission: record.commission,
            forfeited: record.forfeited_stake,
        });
    }

    pub fn player_view(&self, player: &PlayerId) -> RoundResult<PlayerView> {
        let seat = self.find_seat(player)?;
        Ok(PlayerView {
            ticket: self.ticket_for(seat),
            auto_mark: seat.auto_mark,
            phase: self.phase(),
            drawn_numbers: self.caller.drawn().to_vec(),
            prize_pool: self.pool().prize_pool,
        })
    }

    pub fn snapshot(&self, now: Instant) -> RoundSnapshot {
        let pool = self.pool();
        let countdown_remaining_ms = match self.phase {
            Phase::Countdown { ends_at } => Some(ends_at.saturating_duration_since(now).as_millis() as u64),
            _ => None,
        };
        let winner = self
            .decided
            .as_ref()
            .and_then(|w| w.as_ref())
            .map(|w| w.player.clone());

        RoundSnapshot {
            table_id: self.table_id,
            round_id: self.id,
            tier: self.tier,
            phase: self.phase(),
            admitted: self.admitted(),
            waiting: self.seats.len() - self.admitted(),
            total_stake: pool.total_stake,
            prize_pool: pool.prize_pool,
            commission: pool.commission,
            countdown_remaining_ms,
            drawn_numbers: self.caller.drawn().to_vec(),
            caller_state: self.caller.state(),
            winner,
        }
    }

    fn ticket_for(&self, seat: &PlayerRound) -> SeatTicket {
        SeatTicket {
            table_id: self.table_id,
            round_id: self.id,
            player_round_id: seat.id,
            tier: seat.stake,
            verification: seat.verification,
            cards: seat.cards.iter().map(PlayCard::view).collect(),
        }
    }

    fn find_seat(&self, player: &PlayerId) -> RoundResult<&PlayerRound> {
        self.seats
            .iter()
            .find(|s| &s.player == player)
            .ok_or_else(|| RoundError::NotSeated(player.clone()))
    }

    fn find_seat_mut(&mut self, player: &PlayerId) -> RoundResult<&mut PlayerRound> {
        self.seats
            .iter_mut()
            .find(|s| &s.player == player)
            .ok_or_else(|| RoundError::NotSeated(player.clone()))
    }

    fn card_mut(&mut self, player: &PlayerId, card_id: CardId) -> RoundResult<&mut PlayCard> {
        self.find_seat_mut(player)?
            .cards
            .iter_mut()
            .find(|c| c.id == card_id)
            .ok_or(RoundError::UnknownCard(card_id))
    }

    fn check_markable(&self, player: &PlayerId, cell: usize) -> RoundResult<()> {
        if cell >= CELL_COUNT {
            return Err(RoundError::CellOutOfRange(cell));
        }
        let seat = self.find_seat(player)?;
        if !seat.is_active() {
            return Err(RoundError::NotVerified(player.clone()));
        }
        if self.phase != Phase::InProgress {
            return Err(RoundError::NotInProgress);
        }
        if self.decided.is_some() {
            return Err(RoundError::RoundClosed);
        }
        Ok(())
    }

    /// Scan Active seats in admission order, cards in order; the first
    /// completed pattern wins and halts the caller.
    fn evaluate(&mut self) {
        if self.decided.is_some() || self.phase != Phase::InProgress {
            return;
        }
        let drawn = self.caller.drawn_set();

        let mut order: Vec<&PlayerRound> = self.seats.iter().filter(|s| s.is_active()).collect();
        order.sort_by_key(|s| s.admission_seq);

        let found = order.into_iter().find_map(|seat| {
            seat.cards.iter().find_map(|card| {
                winning_pattern(&card.card, card.marks, drawn).map(|pattern| {
                    (
                        WinnerRecord {
                            player: seat.player.clone(),
                            player_round_id: seat.id,
                            card_id: card.id,
                            pattern: pattern.kind,
                        },
                        card.card.clone(),
                    )
                })
            })
        });

        if let Some((winner, card)) = found {
            self.caller.halt();
            info!(
                "Bingo at table {}: {} with card {} ({})",
                self.table_id, winner.player, winner.card_id, winner.pattern
            );
            self.events.push(RoundEvent::WinnerFound {
                player: winner.player.clone(),
                card_id: winner.card_id,
                card,
                pattern: winner.pattern,
            });
            self.decided = Some(Some(winner));
        }
    }
}

fn catch_up(seat: &mut PlayerRound, drawn: &[u8]) {
    for card in seat.cards.iter_mut() {
        for &number in drawn {
            if let Some(index) = card.card.position_of(number) {
                card.marks.insert(index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bingo::patterns::is_winner;

    fn phone(i: usize) -> PlayerId {
        PlayerId::parse(&format!("09{:08}", i)).unwrap()
    }

    fn settings() -> RoundSettings {
        RoundSettings {
            min_players: 3,
            auto_mark_default: true,
            ..RoundSettings::default()
        }
    }

    fn round_with(players: usize, verified: usize, now: Instant) -> Round {
        let mut round = Round::new(TableId::new(), Money::whole(10), settings(), 7);
        for i in 0..players {
            round.seat(phone(i)).unwrap();
        }
        for i in 0..verified {
            round.verify(&phone(i), now).unwrap();
        }
        round
    }

    fn drive_to_decision(round: &mut Round, mut now: Instant) -> Instant {
        while round.settlement_request().is_none() {
            now += round.settings.draw_interval;
            round.on_deadline(now);
        }
        now
    }

    #[test]
    fn test_countdown_starts_at_minimum() {
        let now = Instant::now();
        let mut round = round_with(3, 2, now);
        assert_eq!(round.phase(), RoundPhase::Waiting);
        assert_eq!(round.next_deadline(), None);

        round.verify(&phone(2), now).unwrap();
        assert_eq!(round.phase(), RoundPhase::Countdown);
        assert_eq!(round.next_deadline(), Some(now + Duration::from_secs(60)));
    }

    #[test]
    fn test_later_admission_does_not_reset_countdown() {
        let now = Instant::now();
        let mut round = round_with(4, 3, now);
        let deadline = round.next_deadline();

        round.verify(&phone(3), now + Duration::from_secs(30)).unwrap();
        assert_eq!(round.next_deadline(), deadline);
    }

    #[test]
    fn test_revoke_below_minimum_aborts_countdown() {
        let now = Instant::now();
        let mut round = round_with(3, 3, now);
        round.take_events();

        round.revoke(&phone(1)).unwrap();
        assert_eq!(round.phase(), RoundPhase::Waiting);
        assert_eq!(round.next_deadline(), None);
        assert!(round
            .take_events()
            .contains(&RoundEvent::CountdownAborted { admitted: 2 }));
    }

    #[test]
    fn test_unverified_player_cannot_mark() {
        let now = Instant::now();
        let mut round = round_with(4, 3, now);
        round.on_deadline(now + Duration::from_secs(60));

        assert_eq!(
            round.mark(&phone(3), CardId(0), 0),
            Err(RoundError::NotVerified(phone(3)))
        );
    }

    #[test]
    fn test_pool_frozen_at_start_and_late_admission_excluded() {
        let now = Instant::now();
        let mut round = round_with(4, 3, now);
        let start = now + Duration::from_secs(60);
        round.on_deadline(start);
        assert_eq!(round.phase(), RoundPhase::InProgress);

        let frozen = round.pool();
        assert_eq!(frozen.total_stake, Money::whole(30));
        assert_eq!(frozen.prize_pool, Money::whole(21));
        assert_eq!(frozen.commission, Money::whole(9));

        round.verify(&phone(3), start).unwrap();
        assert_eq!(round.admitted(), 4);
        assert_eq!(round.pool(), frozen);
    }

    #[test]
    fn test_join_rejected_once_drawing() {
        let now = Instant::now();
        let mut round = round_with(3, 3, now);
        round.on_deadline(now + Duration::from_secs(60));
        assert_eq!(round.seat(phone(9)), Err(RoundError::RoundClosed));
        // Already-seated players still get their ticket back.
        assert!(round.seat(phone(0)).is_ok());
    }

    #[test]
    fn test_first_draw_after_one_interval() {
        let now = Instant::now();
        let mut round = round_with(3, 3, now);
        let start = now + Duration::from_secs(60);
        round.on_deadline(start);
        assert!(round.caller().drawn().is_empty());

        round.on_deadline(start + Duration::from_secs(3));
        assert!(round.caller().drawn().is_empty());

        round.on_deadline(start + Duration::from_secs(4));
        assert_eq!(round.caller().drawn().len(), 1);
    }

    #[test]
    fn test_auto_mark_produces_a_winner_in_admission_order() {
        let now = Instant::now();
        let mut round = round_with(5, 5, now);
        let start = now + Duration::from_secs(60);
        round.on_deadline(start);
        drive_to_decision(&mut round, start);

        let request = round.settlement_request().unwrap();
        let winner = request.winner.clone().expect("auto-mark always finds a winner");
        assert_eq!(request.caller_state, CallerState::Halted);

        // Nobody admitted before the winner holds a completed card.
        let drawn = round.caller().drawn_set();
        let mut order: Vec<&PlayerRound> = round.seats.iter().collect();
        order.sort_by_key(|s| s.admission_seq);
        let first_complete = order
            .iter()
            .find(|s| s.cards.iter().any(|c| is_winner(&c.card, c.marks, drawn)))
            .unwrap();
        assert_eq!(first_complete.player, winner.player);
        assert_eq!(round.next_deadline(), None);
    }

    #[test]
    fn test_no_marks_exhausts_pool() {
        let now = Instant::now();
        let mut round = Round::new(
            TableId::new(),
            Money::whole(20),
            RoundSettings {
                min_players: 1,
                auto_mark_default: false,
                ..RoundSettings::default()
            },
            3,
        );
        round.seat(phone(1)).unwrap();
        round.verify(&phone(1), now).unwrap();
        round.on_deadline(now + Duration::from_secs(60));
        drive_to_decision(&mut round, now + Duration::from_secs(60));

        let request = round.settlement_request().unwrap();
        assert_eq!(request.winner, None);
        assert_eq!(request.drawn_numbers.len(), 75);
        assert_eq!(request.caller_state, CallerState::Exhausted);
        assert!(round.take_events().contains(&RoundEvent::PoolExhausted));
    }

    #[test]
    fn test_manual_marks_need_called_numbers() {
        let now = Instant::now();
        let mut round = Round::new(
            TableId::new(),
            Money::whole(10),
            RoundSettings {
                min_players: 1,
                auto_mark_default: false,
                ..RoundSettings::default()
            },
            11,
        );
        let ticket = round.seat(phone(1)).unwrap();
        round.verify(&phone(1), now).unwrap();
        let start = now + Duration::from_secs(60);
        round.on_deadline(start);
        round.on_deadline(start + Duration::from_secs(4));
        let called = round.caller().last_drawn().unwrap();

        let card = &ticket.cards[0].card;
        let uncalled_cell = (0..CELL_COUNT)
            .find(|&i| card.number_at(i).is_some_and(|n| n != called))
            .unwrap();
        assert!(matches!(
            round.mark(&phone(1), CardId(0), uncalled_cell),
            Err(RoundError::NumberNotCalled(_))
        ));
        assert_eq!(
            round.unmark(&phone(1), CardId(0), FREE_INDEX),
            Err(RoundError::FreeCellLocked)
        );
        assert_eq!(
            round.mark(&phone(1), CardId(5), 0),
            Err(RoundError::UnknownCard(CardId(5)))
        );

        if let Some(cell) = card.position_of(called) {
            let outcome = round.mark(&phone(1), CardId(0), cell).unwrap();
            assert!(outcome.marked);
            let outcome = round.unmark(&phone(1), CardId(0), cell).unwrap();
            assert!(!outcome.marked);
        }
    }

    #[test]
    fn test_unadmitted_stakes_reported_as_forfeited() {
        let now = Instant::now();
        let mut round = round_with(4, 3, now);
        let start = now + Duration::from_secs(60);
        round.on_deadline(start);
        drive_to_decision(&mut round, start);

        let request = round.settlement_request().unwrap();
        assert_eq!(request.total_stake, Money::whole(30));
        assert_eq!(request.forfeited_stake, Money::whole(10));
    }

    #[test]
    fn test_auto_mark_is_off_unless_enabled() {
        let mut round = Round::new(TableId::new(), Money::whole(10), RoundSettings::default(), 5);
        round.seat(phone(1)).unwrap();
        assert!(!round.player_view(&phone(1)).unwrap().auto_mark);

        round.set_auto_mark(&phone(1), true).unwrap();
        assert!(round.player_view(&phone(1)).unwrap().auto_mark);
    }

    #[test]
    fn test_complete_settlement_closes_round() {
        let now = Instant::now();
        let mut round = round_with(3, 3, now);
        let start = now + Duration::from_secs(60);
        round.on_deadline(start);
        drive_to_decision(&mut round, start);

        let request = round.settlement_request().unwrap();
        let record = SettlementRecord {
            round_id: request.round_id,
            table_id: request.table_id,
            tier: request.tier,
            winner: request.winner.clone(),
            prize_pool: request.prize_pool,
            total_stake: request.total_stake,
            commission: request.total_stake.saturating_sub(request.prize_pool),
            forfeited_stake: request.forfeited_stake,
            drawn_numbers: request.drawn_numbers.clone(),
            caller_state: request.caller_state,
            settled_at: chrono::Utc::now(),
        };
        round.complete_settlement(&record);

        assert_eq!(round.phase(), RoundPhase::Settled);
        assert!(round.settlement_request().is_none());
        assert_eq!(round.verify(&phone(9), now), Err(RoundError::RoundClosed));
    }
}
